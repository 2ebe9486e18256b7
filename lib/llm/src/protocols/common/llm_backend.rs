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

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::protocols::TokenIdType;

pub use super::{FinishReason, SamplingParams};

/// Candidate token id to log-probability for one generated position.
pub type TopLogprobs = HashMap<TokenIdType, f32>;

/// What the generation engine is asked to do: continue `prompt_token_ids` under `sampling`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt_token_ids: Vec<TokenIdType>,
    pub sampling: SamplingParams,
}

/// The cumulative state of every choice of one request at a point in time.
///
/// Snapshots are monotonic: for a given choice, `text` and `token_ids` only grow, and once a
/// `finish_reason` is set no further updates for that choice follow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GenerationSnapshot {
    /// The token ids of the prompt the engine is continuing.
    pub prompt_token_ids: Vec<TokenIdType>,

    /// One entry per choice present in this update. Not necessarily sorted by index.
    pub outputs: Vec<ChoiceOutput>,
}

/// Cumulative output of a single choice.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ChoiceOutput {
    /// Choice index in `0..n`.
    pub index: u32,

    /// Decoded text of all tokens generated so far.
    pub text: String,

    /// All token ids generated so far.
    pub token_ids: Vec<TokenIdType>,

    /// Per generated position, the candidate map. Present only when logprobs were requested,
    /// in which case it has the same length as `token_ids`.
    pub logprobs: Option<Vec<TopLogprobs>>,

    /// `None` while the choice is still generating.
    pub finish_reason: Option<FinishReason>,
}

impl ChoiceOutput {
    pub fn new(index: u32, text: impl Into<String>, token_ids: Vec<TokenIdType>) -> Self {
        ChoiceOutput {
            index,
            text: text.into(),
            token_ids,
            logprobs: None,
            finish_reason: None,
        }
    }

    pub fn with_logprobs(mut self, logprobs: Vec<TopLogprobs>) -> Self {
        self.logprobs = Some(logprobs);
        self
    }

    pub fn finished(mut self, reason: FinishReason) -> Self {
        self.finish_reason = Some(reason);
        self
    }

    pub fn is_finished(&self) -> bool {
        self.finish_reason.is_some()
    }
}
