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

//! # Ember LLM Protocols
//!
//! The message formats exchanged with clients over the OpenAI compatible HTTP API and, internally,
//! with the generation engine.

pub mod common;
pub mod openai;

/// The token ID type
pub type TokenIdType = u32;

/// The LLM responses have multiple different fields and nests of objects to get to the actual
/// text completion returned. This trait can be applied to the `choice` level objects to extract
/// the completion text.
///
/// To avoid an optional, if no completion text is found, the [`ContentProvider::content`] should
/// return an empty string.
pub trait ContentProvider {
    fn content(&self) -> String;
}

/// Lossy decoding of a partial multi-byte sequence yields U+FFFD; clients never see it.
pub fn strip_replacement_chars(text: &str) -> String {
    text.replace('\u{FFFD}', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_replacement_chars() {
        assert_eq!(strip_replacement_chars("caf\u{FFFD}"), "caf");
        assert_eq!(strip_replacement_chars("\u{FFFD}a\u{FFFD}b"), "ab");
        assert_eq!(strip_replacement_chars("plain"), "plain");
    }
}
