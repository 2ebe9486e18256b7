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

use std::collections::BTreeMap;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use validator::Validate;

mod aggregator;
mod delta;
mod error;
mod logprobs;

pub use aggregator::DeltaAggregator;
pub use delta::{ChoiceDelta, ChoiceState, DeltaGenerator};
pub use error::CompletionError;
pub use logprobs::create_logprobs;

use super::CompletionUsage;
use crate::protocols::{common::SamplingParams, ContentProvider, TokenIdType};

/// The `object` tag carried by every completion payload.
pub const OBJECT_TEXT_COMPLETION: &str = "text_completion";

/// The prompt of a completion request: raw text, or text the caller already tokenized.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Prompt {
    Text(String),
    TokenIds(Vec<TokenIdType>),
}

impl Default for Prompt {
    fn default() -> Self {
        Prompt::Text(String::new())
    }
}

impl From<&str> for Prompt {
    fn from(text: &str) -> Self {
        Prompt::Text(text.to_string())
    }
}

impl From<String> for Prompt {
    fn from(text: String) -> Self {
        Prompt::Text(text)
    }
}

impl From<Vec<TokenIdType>> for Prompt {
    fn from(token_ids: Vec<TokenIdType>) -> Self {
        Prompt::TokenIds(token_ids)
    }
}

/// `stop` accepts either a single string or a list of strings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum StopSequence {
    Single(String),
    Many(Vec<String>),
}

impl StopSequence {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            StopSequence::Single(stop) => vec![stop],
            StopSequence::Many(stops) => stops,
        }
    }
}

/// Legacy OpenAI completions request body.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Builder)]
#[builder(default)]
pub struct CompletionRequest {
    #[serde(default)]
    #[builder(setter(into))]
    pub model: String,

    #[serde(default)]
    #[builder(setter(into))]
    pub prompt: Prompt,

    /// Not supported; rejected when non-empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(setter(into, strip_option))]
    pub suffix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(setter(strip_option))]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(setter(strip_option))]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(setter(strip_option))]
    pub top_p: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(setter(strip_option))]
    pub n: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(setter(strip_option))]
    pub stream: Option<bool>,

    /// Presence alone turns on logprob reporting; the value caps the candidates per position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(setter(strip_option))]
    pub logprobs: Option<u32>,

    /// Not supported; rejected when true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(setter(strip_option))]
    pub echo: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(setter(strip_option))]
    pub stop: Option<StopSequence>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(setter(strip_option))]
    pub presence_penalty: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(setter(strip_option))]
    pub frequency_penalty: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(setter(into, strip_option))]
    pub user: Option<String>,
}

impl CompletionRequest {
    pub fn builder() -> CompletionRequestBuilder {
        CompletionRequestBuilder::default()
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    pub fn wants_logprobs(&self) -> bool {
        self.logprobs.is_some()
    }

    /// Reject the features this service does not implement.
    pub fn check_supported(&self) -> Result<(), CompletionError> {
        if self.echo.unwrap_or(false) {
            return Err(CompletionError::UnsupportedFeature(
                "echo is not currently supported".to_string(),
            ));
        }
        if self.suffix.as_deref().is_some_and(|suffix| !suffix.is_empty()) {
            return Err(CompletionError::UnsupportedFeature(
                "suffix is not currently supported".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the engine's sampling parameters; a missing or zero `max_tokens` takes
    /// `default_max_tokens`.
    pub fn sampling_params(&self, default_max_tokens: u32) -> Result<SamplingParams, CompletionError> {
        self.check_supported()?;

        let defaults = SamplingParams::default();
        let params = SamplingParams {
            n: self.n.unwrap_or(defaults.n),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            top_p: self.top_p.unwrap_or(defaults.top_p),
            presence_penalty: self.presence_penalty.unwrap_or(defaults.presence_penalty),
            frequency_penalty: self.frequency_penalty.unwrap_or(defaults.frequency_penalty),
            max_tokens: match self.max_tokens {
                Some(max_tokens) if max_tokens > 0 => max_tokens,
                _ => default_max_tokens,
            },
            stop: self.stop.clone().map(StopSequence::into_vec).unwrap_or_default(),
            logprobs: self.logprobs,
        };

        params
            .validate()
            .map_err(|err| CompletionError::InvalidParameters(err.to_string()))?;

        Ok(params)
    }
}

/// Legacy OpenAI CompletionResponse
/// Represents a completion response from the API.
/// Note: both the streamed and non-streamed response objects share the same
/// shape (unlike the chat endpoint).
///
/// Field order is the wire order.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct CompletionResponse {
    /// A unique identifier for the completion.
    pub id: String,

    /// The list of completion choices the model generated for the input prompt.
    pub choices: Vec<CompletionChoice>,

    /// The Unix timestamp (in seconds) of when the completion was created.
    pub created: u64,

    /// The model used for completion.
    pub model: String,

    /// The object type, which is always "text_completion"
    pub object: String,

    /// This fingerprint represents the backend configuration that the model runs with.
    pub system_fingerprint: Option<String>,

    /// Usage statistics for the completion request. Streamed chunks carry none.
    pub usage: Option<CompletionUsage>,
}

/// Legacy OpenAI CompletionResponse Choice component
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Builder)]
pub struct CompletionChoice {
    #[builder(default, setter(into, strip_option))]
    pub finish_reason: Option<String>,

    #[builder(default = "0")]
    pub index: u32,

    #[builder(default, setter(strip_option))]
    pub logprobs: Option<LogprobResult>,

    #[builder(setter(into))]
    pub text: String,
}

impl ContentProvider for CompletionChoice {
    fn content(&self) -> String {
        self.text.clone()
    }
}

impl CompletionChoice {
    pub fn builder() -> CompletionChoiceBuilder {
        CompletionChoiceBuilder::default()
    }
}

/// Legacy OpenAI LogprobResult component
///
/// The four sequences are aligned by position. Offsets count characters, not bytes.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct LogprobResult {
    pub text_offset: Vec<usize>,
    pub token_logprobs: Vec<f32>,
    pub tokens: Vec<String>,
    pub top_logprobs: Vec<BTreeMap<String, f32>>,
}

impl LogprobResult {
    pub fn with_capacity(capacity: usize) -> Self {
        LogprobResult {
            text_offset: Vec::with_capacity(capacity),
            token_logprobs: Vec::with_capacity(capacity),
            tokens: Vec::with_capacity(capacity),
            top_logprobs: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Stamps the request-level fields on every response of one request.
#[derive(Debug, Clone, Builder)]
pub struct ResponseFactory {
    #[builder(setter(into))]
    pub model: String,

    #[builder(default)]
    pub system_fingerprint: Option<String>,

    #[builder(setter(into), default = "new_request_id()")]
    pub id: String,

    #[builder(default = "OBJECT_TEXT_COMPLETION.to_string()")]
    pub object: String,

    #[builder(default = "chrono::Utc::now().timestamp() as u64")]
    pub created: u64,
}

impl ResponseFactory {
    pub fn builder() -> ResponseFactoryBuilder {
        ResponseFactoryBuilder::default()
    }

    pub fn make_response(
        &self,
        choices: Vec<CompletionChoice>,
        usage: Option<CompletionUsage>,
    ) -> CompletionResponse {
        CompletionResponse {
            id: self.id.clone(),
            choices,
            created: self.created,
            model: self.model.clone(),
            object: self.object.clone(),
            system_fingerprint: self.system_fingerprint.clone(),
            usage,
        }
    }
}

/// A fresh request id: `cmpl-` followed by 24 random hex characters.
pub fn new_request_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("cmpl-{}", &hex[..24])
}

/// How a streamed chunk is rendered on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkEncoding {
    /// Every field is present; absent values are explicit `null`s.
    Full,

    /// Fields holding `null` are left out entirely, at any depth.
    OmitNone,
}

/// One streamed event: a single-choice [`CompletionResponse`] plus its wire encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionChunk {
    pub response: CompletionResponse,
    pub encoding: ChunkEncoding,
}

impl CompletionChunk {
    pub fn choice(&self) -> Option<&CompletionChoice> {
        self.response.choices.first()
    }

    pub fn is_terminal(&self) -> bool {
        self.encoding == ChunkEncoding::OmitNone
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        match self.encoding {
            ChunkEncoding::Full => serde_json::to_string(&self.response),
            ChunkEncoding::OmitNone => {
                let value = serde_json::to_value(&self.response)?;
                serde_json::to_string(&strip_nulls(value))
            }
        }
    }
}

fn strip_nulls(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(strip_nulls).collect())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(encoding: ChunkEncoding, logprobs: Option<LogprobResult>) -> CompletionChunk {
        let factory = ResponseFactory::builder()
            .model("test-model")
            .id("cmpl-0123456789abcdef01234567")
            .created(1_700_000_000)
            .build()
            .unwrap();
        let choice = CompletionChoice {
            finish_reason: Some("stop".to_string()),
            index: 0,
            logprobs,
            text: " world!".to_string(),
        };
        CompletionChunk {
            response: factory.make_response(vec![choice], None),
            encoding,
        }
    }

    #[test]
    fn test_full_chunk_keeps_nulls_in_field_order() {
        let json = chunk(ChunkEncoding::Full, None).to_json().unwrap();
        assert_eq!(
            json,
            r#"{"id":"cmpl-0123456789abcdef01234567","choices":[{"finish_reason":"stop","index":0,"logprobs":null,"text":" world!"}],"created":1700000000,"model":"test-model","object":"text_completion","system_fingerprint":null,"usage":null}"#
        );
    }

    #[test]
    fn test_terminal_chunk_omits_nulls() {
        let json = chunk(ChunkEncoding::OmitNone, None).to_json().unwrap();
        assert_eq!(
            json,
            r#"{"id":"cmpl-0123456789abcdef01234567","choices":[{"finish_reason":"stop","index":0,"text":" world!"}],"created":1700000000,"model":"test-model","object":"text_completion"}"#
        );

        // an empty record stays present, with every sequence empty
        let json = chunk(ChunkEncoding::OmitNone, Some(LogprobResult::default()))
            .to_json()
            .unwrap();
        assert!(json.contains(
            r#""logprobs":{"text_offset":[],"token_logprobs":[],"tokens":[],"top_logprobs":[]}"#
        ));
    }

    #[test]
    fn test_request_id_format() {
        let id = new_request_id();
        let hex = id.strip_prefix("cmpl-").unwrap();
        assert_eq!(hex.len(), 24);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_request_id());
    }

    #[test]
    fn test_request_deserializes_prompt_and_stop_variants() {
        let request: CompletionRequest = serde_json::from_str(
            r#"{"model":"m","prompt":"Hello","stop":"\n","n":2,"logprobs":0}"#,
        )
        .unwrap();
        assert_eq!(request.prompt, Prompt::Text("Hello".to_string()));
        assert_eq!(request.stop, Some(StopSequence::Single("\n".to_string())));
        assert!(request.wants_logprobs());
        assert!(!request.is_streaming());

        let request: CompletionRequest =
            serde_json::from_str(r#"{"model":"m","prompt":[1,2,3],"stop":["a","b"]}"#).unwrap();
        assert_eq!(request.prompt, Prompt::TokenIds(vec![1, 2, 3]));
        assert_eq!(
            request.stop.map(StopSequence::into_vec),
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_unsupported_features_rejected() {
        let request = CompletionRequest::builder().echo(true).build().unwrap();
        let err = request.sampling_params(128).unwrap_err();
        assert!(matches!(err, CompletionError::UnsupportedFeature(_)));
        assert!(err.is_client_error());

        let request = CompletionRequest::builder().suffix("tail").build().unwrap();
        assert!(matches!(
            request.check_supported(),
            Err(CompletionError::UnsupportedFeature(_))
        ));

        // an empty suffix is the same as none
        let request = CompletionRequest::builder().suffix("").build().unwrap();
        assert!(request.check_supported().is_ok());
    }

    #[test]
    fn test_sampling_params_defaults_and_validation() {
        let request = CompletionRequest::builder()
            .max_tokens(0)
            .stop(StopSequence::Single("###".to_string()))
            .build()
            .unwrap();
        let params = request.sampling_params(128).unwrap();
        assert_eq!(params.max_tokens, 128);
        assert_eq!(params.n, 1);
        assert_eq!(params.stop, vec!["###".to_string()]);

        let request = CompletionRequest::builder().top_p(0.0).build().unwrap();
        let err = request.sampling_params(128).unwrap_err();
        assert!(matches!(err, CompletionError::InvalidParameters(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_unbounded_choice_count_rejected() {
        let request: CompletionRequest = serde_json::from_str(
            r#"{"model":"m","prompt":"hi","n":4294967295,"stream":true}"#,
        )
        .unwrap();
        let err = request.sampling_params(128).unwrap_err();
        assert!(matches!(err, CompletionError::InvalidParameters(_)));
    }
}
