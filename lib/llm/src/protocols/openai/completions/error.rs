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

use thiserror::Error;

use crate::protocols::TokenIdType;

/// Everything that can go wrong between accepting a completion request and writing its
/// response. Client disconnects are not errors; they end a request as aborted.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// The request asks for a feature this service does not implement.
    #[error("{0}")]
    UnsupportedFeature(String),

    /// The sampling parameters or prompt length are out of range.
    #[error("{0}")]
    InvalidParameters(String),

    #[error("token {token_id} at position {position} is missing from its own candidate map")]
    MissingCandidate {
        position: usize,
        token_id: TokenIdType,
    },

    #[error("got {tokens} token ids but {logprobs} logprob maps")]
    LogprobsMismatch { tokens: usize, logprobs: usize },

    #[error("logprobs were requested but the engine did not report them")]
    MissingLogprobs,

    #[error("token {0} is not in the tokenizer vocabulary")]
    UnknownToken(TokenIdType),

    #[error("choice index {index} is out of range for n={n}")]
    ChoiceOutOfRange { index: u32, n: usize },

    #[error("the engine finished without producing any output")]
    EmptyGeneration,

    /// Opaque failure raised by the engine or the plumbing around it.
    #[error(transparent)]
    Engine(#[from] anyhow::Error),
}

impl CompletionError {
    /// Client errors are the caller's fault and map to a 4xx status; everything else is a 5xx.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CompletionError::UnsupportedFeature(_) | CompletionError::InvalidParameters(_)
        )
    }
}
