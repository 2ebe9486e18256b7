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

//! Completion request lifecycle.
//!
//! [`CompletionsHandler`] takes a validated OpenAI request through
//! `Pending -> Streaming | Aggregating -> Completed | Aborted`:
//!
//! - the `stream` flag picks the path once, at entry;
//! - in the aggregating path the disconnect signal is checked before each snapshot is consumed,
//!   and a disconnect aborts the engine by request id without producing a response;
//! - in the streaming path the caller owns the pull loop, so a caller that stops pulling stops
//!   generation by calling [`CompletionStream::abort`].
//!
//! A request runs at most once. Nothing is retried.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use ember_runtime::pipeline::{AsyncEngine, SingleIn};

use crate::config::CompletionsConfig;
use crate::engines::GenerationEngine;
use crate::protocols::common::llm_backend::GenerationRequest;
use crate::protocols::openai::completions::{
    new_request_id, CompletionChunk, CompletionError, CompletionRequest, CompletionResponse,
    DeltaAggregator, DeltaGenerator, Prompt, ResponseFactory, OBJECT_TEXT_COMPLETION,
};
use crate::tokenizers::{traits::Encoder, Tokenizer};

/// Lazily produced chunks of one streamed completion.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<CompletionChunk, CompletionError>> + Send>>;

/// Tells the controller whether the client is still waiting for the response.
pub trait DisconnectSignal: Send + Sync {
    fn is_disconnected(&self) -> bool;
}

impl DisconnectSignal for CancellationToken {
    fn is_disconnected(&self) -> bool {
        self.is_cancelled()
    }
}

/// How a completion request ended.
pub enum CompletionOutcome {
    /// `stream=true`: chunks to forward as they are pulled.
    Stream(CompletionStream),

    /// `stream=false`: the aggregated response.
    Response(CompletionResponse),

    /// The client went away while the response was being aggregated.
    Aborted,
}

impl std::fmt::Debug for CompletionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompletionOutcome::Stream(stream) => f
                .debug_tuple("Stream")
                .field(&stream.request_id)
                .finish(),
            CompletionOutcome::Response(response) => {
                f.debug_tuple("Response").field(response).finish()
            }
            CompletionOutcome::Aborted => write!(f, "Aborted"),
        }
    }
}

/// The chunk stream of one request, with the handle needed to abort it.
pub struct CompletionStream {
    request_id: String,
    chunks: ChunkStream,
    engine: Arc<dyn GenerationEngine>,
}

impl CompletionStream {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Ask the engine to stop generating for this request.
    ///
    /// The returned future owns what it needs, so it can be awaited while the stream itself is
    /// still borrowed elsewhere.
    pub fn abort(&self) -> impl Future<Output = anyhow::Result<()>> + Send + 'static {
        let engine = self.engine.clone();
        let request_id = self.request_id.clone();
        async move { engine.abort(&request_id).await }
    }
}

impl Stream for CompletionStream {
    type Item = Result<CompletionChunk, CompletionError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        self.chunks.as_mut().poll_next(cx)
    }
}

/// Drives completion requests against one engine.
#[derive(Clone)]
pub struct CompletionsHandler {
    engine: Arc<dyn GenerationEngine>,
    tokenizer: Tokenizer,
    config: CompletionsConfig,
}

impl CompletionsHandler {
    pub fn new(
        engine: Arc<dyn GenerationEngine>,
        tokenizer: Tokenizer,
        config: CompletionsConfig,
    ) -> Self {
        Self {
            engine,
            tokenizer,
            config,
        }
    }

    pub fn model_name(&self) -> &str {
        &self.config.model_name
    }

    /// Validate the request and turn it into what the engine consumes. Nothing reaches the
    /// engine when this fails.
    pub fn prepare(&self, request: &CompletionRequest) -> Result<GenerationRequest, CompletionError> {
        request.check_supported()?;
        let sampling = request.sampling_params(self.config.default_max_tokens)?;

        let prompt_token_ids = match &request.prompt {
            Prompt::Text(text) => self.tokenizer.encode(text)?.token_ids,
            Prompt::TokenIds(token_ids) => token_ids.clone(),
        };

        if let Some(max_model_len) = self.config.max_model_len {
            let prompt_tokens = prompt_token_ids.len() as u64;
            let requested = prompt_tokens + u64::from(sampling.max_tokens);
            if requested > u64::from(max_model_len) {
                return Err(CompletionError::InvalidParameters(format!(
                    "This model's maximum context length is {max_model_len} tokens. However, you requested {requested} tokens ({prompt_tokens} in the messages, {} in the completion). Please reduce the length of the messages or completion.",
                    sampling.max_tokens
                )));
            }
        }

        Ok(GenerationRequest {
            prompt_token_ids,
            sampling,
        })
    }

    /// Run a request under a fresh request id.
    pub async fn complete(
        &self,
        request: CompletionRequest,
        disconnect: &dyn DisconnectSignal,
    ) -> Result<CompletionOutcome, CompletionError> {
        self.complete_with_id(request, new_request_id(), disconnect)
            .await
    }

    /// Run a request under `request_id`, which is also the engine's abort key.
    pub async fn complete_with_id(
        &self,
        request: CompletionRequest,
        request_id: String,
        disconnect: &dyn DisconnectSignal,
    ) -> Result<CompletionOutcome, CompletionError> {
        let streaming = request.is_streaming();
        tracing::debug!(%request_id, streaming, "completion request");

        let generation = self.prepare(&request).inspect_err(|err| {
            tracing::warn!(%request_id, "rejected completion request: {err}");
        })?;

        let n = generation.sampling.n;
        let enable_logprobs = request.wants_logprobs();
        let factory = ResponseFactory {
            model: if request.model.is_empty() {
                self.config.model_name.clone()
            } else {
                request.model
            },
            system_fingerprint: None,
            id: request_id.clone(),
            object: OBJECT_TEXT_COMPLETION.to_string(),
            created: chrono::Utc::now().timestamp() as u64,
        };

        let snapshots = self
            .engine
            .generate(SingleIn::with_id(generation, request_id.clone()))
            .await
            .inspect_err(|err| tracing::error!(%request_id, "engine failed to start: {err}"))?;

        if streaming {
            let generator = DeltaGenerator::new(factory, n, enable_logprobs, self.tokenizer.clone());
            return Ok(CompletionOutcome::Stream(CompletionStream {
                request_id,
                chunks: Box::pin(generator.apply(snapshots)),
                engine: self.engine.clone(),
            }));
        }

        let mut aggregator = DeltaAggregator::new(factory, enable_logprobs, self.tokenizer.clone());
        let mut snapshots = snapshots;
        while let Some(snapshot) = snapshots.next().await {
            if disconnect.is_disconnected() {
                tracing::info!(%request_id, "client disconnected; aborting generation");
                if let Err(err) = self.engine.abort(&request_id).await {
                    tracing::warn!(%request_id, "failed to abort generation: {err}");
                }
                return Ok(CompletionOutcome::Aborted);
            }

            let snapshot = snapshot.inspect_err(|err| {
                tracing::error!(%request_id, "engine failed during generation: {err}");
            })?;
            aggregator.observe(snapshot);
        }

        Ok(CompletionOutcome::Response(aggregator.finish()?))
    }
}
