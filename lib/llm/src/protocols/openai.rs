// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! OpenAI compatible request and response shapes.

use serde::{Deserialize, Serialize};

pub mod completions;
pub mod models;

/// Token accounting for a single request.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletionUsage {
    /// Number of tokens generated over every choice.
    pub completion_tokens: u32,

    /// Number of tokens in the prompt.
    pub prompt_tokens: u32,

    /// `prompt_tokens + completion_tokens`
    pub total_tokens: u32,
}

impl CompletionUsage {
    /// Counts that do not fit in a `u32` saturate at `u32::MAX`.
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        let prompt_tokens = u32::try_from(prompt_tokens).unwrap_or(u32::MAX);
        let completion_tokens = u32::try_from(completion_tokens).unwrap_or(u32::MAX);
        CompletionUsage {
            completion_tokens,
            prompt_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_totals() {
        let usage = CompletionUsage::new(5, 3);
        assert_eq!(usage.total_tokens, 8);
    }

    #[test]
    fn test_usage_saturates() {
        let usage = CompletionUsage::new(u32::MAX as usize, 3);
        assert_eq!(usage.prompt_tokens, u32::MAX);
        assert_eq!(usage.completion_tokens, 3);
        assert_eq!(usage.total_tokens, u32::MAX);

        let usage = CompletionUsage::new(1, usize::MAX);
        assert_eq!(usage.completion_tokens, u32::MAX);
        assert_eq!(usage.total_tokens, u32::MAX);
    }
}
