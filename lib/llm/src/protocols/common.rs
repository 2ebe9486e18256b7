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

//! Engine-facing types shared by every front end.

use serde::{Deserialize, Serialize};
use validator::Validate;

pub mod llm_backend;

/// Why the engine stopped producing tokens for a choice.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    /// A stop string, stop token or end-of-sequence token was produced.
    Stop,

    /// `max_tokens` or the context length was reached.
    Length,

    /// The request was aborted before it finished.
    Abort,
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FinishReason::Stop => write!(f, "stop"),
            FinishReason::Length => write!(f, "length"),
            FinishReason::Abort => write!(f, "abort"),
        }
    }
}

impl std::str::FromStr for FinishReason {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stop" => Ok(FinishReason::Stop),
            "length" => Ok(FinishReason::Length),
            "abort" => Ok(FinishReason::Abort),
            _ => Err(anyhow::anyhow!("Invalid FinishReason variant: '{}'", s)),
        }
    }
}

/// Largest number of parallel choices a single request may ask for.
pub const MAX_N: u32 = 128;

/// Largest number of top candidates a client may ask for per position.
pub const MAX_LOGPROBS: u32 = 5;

/// Default sampling temperature when the request does not set one.
pub const DEFAULT_TEMPERATURE: f32 = 1.0;

/// Default nucleus sampling mass when the request does not set one.
pub const DEFAULT_TOP_P: f32 = 1.0;

/// Sampling and stopping parameters handed to the generation engine.
///
/// Built from an OpenAI request; [`Validate`] enforces the ranges the engine accepts.
#[derive(Serialize, Deserialize, Validate, Debug, Clone, PartialEq)]
pub struct SamplingParams {
    /// Number of parallel choices to generate.
    #[validate(range(min = 1, max = 128, message = "n must be in [1, 128]"))]
    pub n: u32,

    /// Zero means greedy sampling.
    #[validate(range(min = 0.0, message = "temperature must be non-negative"))]
    pub temperature: f32,

    /// Cumulative probability of the candidates to consider, in (0, 1].
    #[validate(range(exclusive_min = 0.0, max = 1.0, message = "top_p must be in (0, 1]"))]
    pub top_p: f32,

    #[validate(range(min = -2.0, max = 2.0, message = "presence_penalty must be in [-2, 2]"))]
    pub presence_penalty: f32,

    #[validate(range(min = -2.0, max = 2.0, message = "frequency_penalty must be in [-2, 2]"))]
    pub frequency_penalty: f32,

    /// Maximum number of tokens to generate per choice.
    #[validate(range(min = 1, message = "max_tokens must be at least 1"))]
    pub max_tokens: u32,

    /// Strings that end generation when produced.
    pub stop: Vec<String>,

    /// When set, the engine reports this many top candidates per generated position.
    #[validate(range(max = 5, message = "logprobs must be at most 5"))]
    pub logprobs: Option<u32>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        SamplingParams {
            n: 1,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            max_tokens: 16,
            stop: Vec::new(),
            logprobs: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_reason_wire_names() {
        for reason in [FinishReason::Stop, FinishReason::Length, FinishReason::Abort] {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{reason}\""));
            assert_eq!(reason.to_string().parse::<FinishReason>().unwrap(), reason);
        }
        assert!("eos".parse::<FinishReason>().is_err());
    }

    #[test]
    fn test_sampling_params_ranges() {
        assert!(SamplingParams::default().validate().is_ok());
        assert!(SamplingParams { n: MAX_N, ..Default::default() }.validate().is_ok());

        let cases = [
            SamplingParams { n: 0, ..Default::default() },
            SamplingParams { n: MAX_N + 1, ..Default::default() },
            SamplingParams { n: u32::MAX, ..Default::default() },
            SamplingParams { temperature: -0.1, ..Default::default() },
            SamplingParams { top_p: 0.0, ..Default::default() },
            SamplingParams { top_p: 1.5, ..Default::default() },
            SamplingParams { presence_penalty: 2.5, ..Default::default() },
            SamplingParams { frequency_penalty: -3.0, ..Default::default() },
            SamplingParams { max_tokens: 0, ..Default::default() },
            SamplingParams { logprobs: Some(MAX_LOGPROBS + 1), ..Default::default() },
        ];

        for params in cases {
            assert!(params.validate().is_err(), "{params:?} should be rejected");
        }
    }
}
