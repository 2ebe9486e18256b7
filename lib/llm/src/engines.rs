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
use std::env;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use std::time::Duration;

use async_stream::stream;

use ember_runtime::engine::{
    async_trait, AsyncEngine, AsyncEngineContext, AsyncEngineContextProvider, ResponseStream,
};
use ember_runtime::pipeline::{Error, ManyOut, SingleIn};

use crate::protocols::common::llm_backend::{
    ChoiceOutput, FinishReason, GenerationRequest, GenerationSnapshot, TopLogprobs,
};
use crate::protocols::TokenIdType;
use crate::tokenizers::{traits::Decoder, Tokenizer};

/// The stream of cumulative snapshots produced for one request.
pub type SnapshotStream = ManyOut<anyhow::Result<GenerationSnapshot>>;

/// A generation engine: turns a tokenized prompt into a stream of cumulative snapshots, and can
/// be told to abandon a request by id.
///
/// The request id is the id of the [`SingleIn`] context the request arrived with.
#[async_trait]
pub trait GenerationEngine:
    AsyncEngine<SingleIn<GenerationRequest>, SnapshotStream, Error> + Send + Sync
{
    /// Ask the engine to stop working on `request_id`. Cooperative: snapshots already in
    /// flight may still be delivered. Unknown ids are ignored.
    async fn abort(&self, request_id: &str) -> Result<(), Error>;
}

//
// Example echo engine
//

/// How long to sleep between echoed tokens.
/// Default is 10ms which gives us 100 tok/s.
/// Can be configured via the EMBER_TOKEN_ECHO_DELAY_MS environment variable.
pub static TOKEN_ECHO_DELAY: LazyLock<Duration> = LazyLock::new(|| {
    const DEFAULT_DELAY_MS: u64 = 10;

    let delay_ms = env::var("EMBER_TOKEN_ECHO_DELAY_MS")
        .ok()
        .and_then(|val| val.parse::<u64>().ok())
        .unwrap_or(DEFAULT_DELAY_MS);

    Duration::from_millis(delay_ms)
});

type Inflight = Arc<Mutex<HashMap<String, Arc<dyn AsyncEngineContext>>>>;

/// Engine that echoes the prompt tokens back, one token per snapshot, for every choice.
///
/// Generation stops with `length` when `max_tokens` is shorter than the prompt and with `stop`
/// otherwise. When logprobs are requested every position reports its own token at 0.0.
/// Useful for exercising the HTTP service without a model.
pub struct EchoEngine {
    tokenizer: Tokenizer,
    delay: Duration,
    inflight: Inflight,
}

impl EchoEngine {
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self::with_delay(tokenizer, *TOKEN_ECHO_DELAY)
    }

    pub fn with_delay(tokenizer: Tokenizer, delay: Duration) -> Self {
        EchoEngine {
            tokenizer,
            delay,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of requests currently producing snapshots.
    pub fn inflight_count(&self) -> usize {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Removes a request from the in-flight table when its stream is dropped.
struct InflightEntry {
    id: String,
    inflight: Inflight,
}

impl Drop for InflightEntry {
    fn drop(&mut self) {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

fn echo_snapshot(
    prompt_token_ids: &[TokenIdType],
    text: &str,
    generated: &[TokenIdType],
    n: u32,
    with_logprobs: bool,
    finish_reason: Option<FinishReason>,
) -> GenerationSnapshot {
    let outputs = (0..n)
        .map(|index| ChoiceOutput {
            index,
            text: text.to_string(),
            token_ids: generated.to_vec(),
            logprobs: with_logprobs.then(|| {
                generated
                    .iter()
                    .map(|&id| TopLogprobs::from([(id, 0.0)]))
                    .collect()
            }),
            finish_reason,
        })
        .collect();

    GenerationSnapshot {
        prompt_token_ids: prompt_token_ids.to_vec(),
        outputs,
    }
}

#[async_trait]
impl AsyncEngine<SingleIn<GenerationRequest>, SnapshotStream, Error> for EchoEngine {
    async fn generate(&self, request: SingleIn<GenerationRequest>) -> Result<SnapshotStream, Error> {
        let (request, context) = request.into_parts();
        let ctx = context.context();

        let entry = InflightEntry {
            id: ctx.id().to_string(),
            inflight: self.inflight.clone(),
        };
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry.id.clone(), ctx.clone());

        let tokenizer = self.tokenizer.clone();
        let delay = self.delay;
        let watcher = ctx.clone();

        let output = stream! {
            let _entry = entry;
            let GenerationRequest { prompt_token_ids, sampling } = request;
            let with_logprobs = sampling.logprobs.is_some();
            let limit = prompt_token_ids.len().min(sampling.max_tokens as usize);
            let reason = if limit < prompt_token_ids.len() {
                FinishReason::Length
            } else {
                FinishReason::Stop
            };

            if limit == 0 {
                yield Ok(echo_snapshot(&prompt_token_ids, "", &[], sampling.n, with_logprobs, Some(reason)));
                return;
            }

            for end in 1..=limit {
                tokio::time::sleep(delay).await;

                let generated = &prompt_token_ids[..end - 1];
                if watcher.is_stopped() {
                    tracing::debug!(request_id = watcher.id(), "echo generation aborted");
                    let text = tokenizer.decode(generated, false).unwrap_or_default();
                    yield Ok(echo_snapshot(&prompt_token_ids, &text, generated, sampling.n, with_logprobs, Some(FinishReason::Abort)));
                    return;
                }

                let generated = &prompt_token_ids[..end];
                let text = match tokenizer.decode(generated, false) {
                    Ok(text) => text,
                    Err(err) => {
                        yield Err(err);
                        return;
                    }
                };
                let finish_reason = (end == limit).then_some(reason);
                yield Ok(echo_snapshot(&prompt_token_ids, &text, generated, sampling.n, with_logprobs, finish_reason));
            }
        };

        Ok(ResponseStream::new(Box::pin(output), ctx))
    }
}

#[async_trait]
impl GenerationEngine for EchoEngine {
    async fn abort(&self, request_id: &str) -> Result<(), Error> {
        let ctx = self
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(request_id)
            .cloned();

        match ctx {
            Some(ctx) => {
                tracing::debug!(request_id, "aborting echo generation");
                ctx.stop_generating();
            }
            None => tracing::trace!(request_id, "abort for unknown request"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::protocols::common::SamplingParams;
    use crate::tokenizers::{traits, Encoding, Result};

    struct Letters;

    impl traits::Encoder for Letters {
        fn encode(&self, input: &str) -> Result<Encoding> {
            Ok(Encoding {
                token_ids: input.bytes().map(u32::from).collect(),
                tokens: input.chars().map(String::from).collect(),
                spans: vec![],
            })
        }
    }

    impl traits::Decoder for Letters {
        fn decode(&self, token_ids: &[TokenIdType], _skip_special_tokens: bool) -> Result<String> {
            Ok(token_ids.iter().map(|&id| char::from(id as u8)).collect())
        }
    }

    impl traits::Vocabulary for Letters {
        fn id_to_token(&self, token_id: TokenIdType) -> Option<String> {
            Some(char::from(token_id as u8).to_string())
        }
    }

    impl traits::Tokenizer for Letters {}

    fn engine() -> EchoEngine {
        EchoEngine::with_delay(Tokenizer::from(Arc::new(Letters)), Duration::ZERO)
    }

    fn request(prompt: &str, sampling: SamplingParams) -> SingleIn<GenerationRequest> {
        SingleIn::with_id(
            GenerationRequest {
                prompt_token_ids: prompt.bytes().map(u32::from).collect(),
                sampling,
            },
            "cmpl-echo",
        )
    }

    #[tokio::test]
    async fn test_echo_is_cumulative_per_choice() {
        let sampling = SamplingParams {
            n: 2,
            max_tokens: 16,
            logprobs: Some(1),
            ..Default::default()
        };
        let stream = engine().generate(request("abc", sampling)).await.unwrap();
        let snapshots: Vec<_> = stream.map(|s| s.unwrap()).collect().await;

        assert_eq!(snapshots.len(), 3);
        let texts: Vec<_> = snapshots.iter().map(|s| s.outputs[1].text.clone()).collect();
        assert_eq!(texts, vec!["a", "ab", "abc"]);

        let last = snapshots.last().unwrap();
        assert_eq!(last.outputs.len(), 2);
        assert_eq!(last.outputs[0].finish_reason, Some(FinishReason::Stop));
        assert_eq!(last.outputs[0].logprobs.as_ref().map(Vec::len), Some(3));
        assert!(snapshots[0].outputs[0].finish_reason.is_none());
    }

    #[tokio::test]
    async fn test_echo_stops_at_max_tokens() {
        let sampling = SamplingParams {
            max_tokens: 2,
            ..Default::default()
        };
        let stream = engine().generate(request("hello", sampling)).await.unwrap();
        let last = stream.map(|s| s.unwrap()).collect::<Vec<_>>().await.pop().unwrap();
        assert_eq!(last.outputs[0].text, "he");
        assert_eq!(last.outputs[0].finish_reason, Some(FinishReason::Length));
        assert!(last.outputs[0].logprobs.is_none());
    }

    #[tokio::test]
    async fn test_abort_by_request_id() {
        let engine = engine();
        let mut stream = engine
            .generate(request("hello world", SamplingParams::default()))
            .await
            .unwrap();
        assert_eq!(engine.inflight_count(), 1);

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.outputs[0].text, "h");

        engine.abort("cmpl-echo").await.unwrap();
        engine.abort("cmpl-unknown").await.unwrap();

        let rest: Vec<_> = stream.map(|s| s.unwrap()).collect().await;
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].outputs[0].finish_reason, Some(FinishReason::Abort));
        assert_eq!(rest[0].outputs[0].text, "h");
        assert_eq!(engine.inflight_count(), 0);
    }
}
