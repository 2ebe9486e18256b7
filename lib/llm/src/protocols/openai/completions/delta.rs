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

use async_stream::try_stream;
use futures::{Stream, StreamExt};

use super::{
    create_logprobs, ChunkEncoding, CompletionChoice, CompletionChunk, CompletionError,
    LogprobResult, ResponseFactory,
};
use crate::protocols::{
    common::llm_backend::{ChoiceOutput, GenerationSnapshot, TopLogprobs},
    strip_replacement_chars, TokenIdType,
};
use crate::tokenizers::Tokenizer;

/// Finish reason reported on every streamed chunk while a choice is in progress.
pub const STREAM_FINISH_REASON: &str = "stop";

/// What one choice has already emitted during a streaming pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChoiceState {
    previous_text: String,
    previous_token_count: usize,
}

/// The part of a cumulative choice output that is new since the previous snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceDelta<'a> {
    pub text: String,
    pub token_ids: &'a [TokenIdType],
    pub logprobs: Option<&'a [TopLogprobs]>,

    /// Character length of the text emitted before this delta.
    pub base_offset: usize,
}

impl ChoiceState {
    pub fn previous_text(&self) -> &str {
        &self.previous_text
    }

    pub fn previous_token_count(&self) -> usize {
        self.previous_token_count
    }

    /// Compute the delta against the cumulative `text`, `token_ids` and `logprobs`, then
    /// remember them as the new baseline.
    pub fn advance<'a>(
        &mut self,
        text: &str,
        token_ids: &'a [TokenIdType],
        logprobs: Option<&'a [TopLogprobs]>,
    ) -> ChoiceDelta<'a> {
        debug_assert!(
            text.starts_with(&self.previous_text),
            "cumulative text must extend the previous text"
        );

        let base_offset = self.previous_text.chars().count();
        let delta = ChoiceDelta {
            text: text.chars().skip(base_offset).collect(),
            token_ids: &token_ids[self.previous_token_count.min(token_ids.len())..],
            logprobs: logprobs.map(|maps| &maps[self.previous_token_count.min(maps.len())..]),
            base_offset,
        };

        self.previous_text = text.to_string();
        self.previous_token_count = token_ids.len();

        delta
    }
}

/// Turns the cumulative snapshots of one request into streamed completion chunks.
///
/// Owns one [`ChoiceState`] per choice for the lifetime of the streaming pass.
#[derive(Debug)]
pub struct DeltaGenerator {
    factory: ResponseFactory,
    states: Vec<ChoiceState>,
    enable_logprobs: bool,
    tokenizer: Tokenizer,
}

impl DeltaGenerator {
    pub fn new(factory: ResponseFactory, n: u32, enable_logprobs: bool, tokenizer: Tokenizer) -> Self {
        Self {
            factory,
            states: vec![ChoiceState::default(); n as usize],
            enable_logprobs,
            tokenizer,
        }
    }

    pub fn id(&self) -> &str {
        &self.factory.id
    }

    pub fn state(&self, index: u32) -> Option<&ChoiceState> {
        self.states.get(index as usize)
    }

    /// Encode one choice of a snapshot: a content chunk, followed by a terminal chunk when the
    /// choice finished in this snapshot.
    pub fn encode_choice(
        &mut self,
        output: &ChoiceOutput,
    ) -> Result<(CompletionChunk, Option<CompletionChunk>), CompletionError> {
        let n = self.states.len();
        let state = self
            .states
            .get_mut(output.index as usize)
            .ok_or(CompletionError::ChoiceOutOfRange {
                index: output.index,
                n,
            })?;

        let logprob_maps = match (self.enable_logprobs, output.logprobs.as_deref()) {
            (false, _) => None,
            (true, Some(maps)) => Some(maps),
            (true, None) => return Err(CompletionError::MissingLogprobs),
        };

        let text = strip_replacement_chars(&output.text);
        let delta = state.advance(&text, &output.token_ids, logprob_maps);

        let logprobs = match delta.logprobs {
            Some(maps) => Some(create_logprobs(
                &self.tokenizer,
                delta.token_ids,
                maps,
                delta.base_offset,
            )?),
            None => None,
        };

        let chunk = self.chunk(
            output.index,
            delta.text.clone(),
            logprobs,
            ChunkEncoding::Full,
        );

        let terminal = output.finish_reason.map(|reason| {
            tracing::trace!(request_id = self.id(), index = output.index, %reason, "choice finished");
            let logprobs = self.enable_logprobs.then(LogprobResult::default);
            self.chunk(output.index, delta.text, logprobs, ChunkEncoding::OmitNone)
        });

        Ok((chunk, terminal))
    }

    fn chunk(
        &self,
        index: u32,
        text: String,
        logprobs: Option<LogprobResult>,
        encoding: ChunkEncoding,
    ) -> CompletionChunk {
        let choice = CompletionChoice {
            finish_reason: Some(STREAM_FINISH_REASON.to_string()),
            index,
            logprobs,
            text,
        };
        CompletionChunk {
            response: self.factory.make_response(vec![choice], None),
            encoding,
        }
    }

    /// Lazily encode a snapshot stream. Choices are visited in ascending index order within
    /// each snapshot, and a choice's terminal chunk directly follows its last content chunk.
    /// The first error ends the stream.
    pub fn apply<S>(
        mut self,
        snapshots: S,
    ) -> impl Stream<Item = Result<CompletionChunk, CompletionError>> + Send
    where
        S: Stream<Item = anyhow::Result<GenerationSnapshot>> + Send + Unpin + 'static,
    {
        try_stream! {
            let mut snapshots = snapshots;
            while let Some(snapshot) = snapshots.next().await {
                let mut snapshot = snapshot.map_err(CompletionError::Engine)?;
                snapshot.outputs.sort_by_key(|output| output.index);

                for output in &snapshot.outputs {
                    let (chunk, terminal) = self.encode_choice(output)?;
                    yield chunk;
                    if let Some(terminal) = terminal {
                        yield terminal;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_advance_yields_suffix_and_updates_state() {
        let mut state = ChoiceState::default();
        let ids = [1, 2];
        let delta = state.advance("Hello,", &ids, None);
        assert_eq!(delta.text, "Hello,");
        assert_eq!(delta.token_ids, &[1, 2]);
        assert_eq!(delta.base_offset, 0);

        let ids = [1, 2, 3];
        let delta = state.advance("Hello, world!", &ids, None);
        assert_eq!(delta.text, " world!");
        assert_eq!(delta.token_ids, &[3]);
        assert_eq!(delta.base_offset, 6);
        assert!(delta.logprobs.is_none());

        assert_eq!(state.previous_text(), "Hello, world!");
        assert_eq!(state.previous_token_count(), 3);
    }

    #[test]
    fn test_advance_counts_characters_not_bytes() {
        let mut state = ChoiceState::default();
        state.advance("naïve", &[1], None);

        let maps: Vec<TopLogprobs> = vec![HashMap::from([(1, -0.5)]), HashMap::from([(2, -0.1)])];
        let delta = state.advance("naïve café", &[1, 2], Some(&maps));
        assert_eq!(delta.text, " café");
        assert_eq!(delta.base_offset, 5);
        assert_eq!(delta.logprobs.map(<[_]>::len), Some(1));
    }

    #[test]
    fn test_advance_without_new_tokens_is_empty() {
        let mut state = ChoiceState::default();
        state.advance("abc", &[7], None);
        let delta = state.advance("abc", &[7], None);
        assert!(delta.text.is_empty());
        assert!(delta.token_ids.is_empty());
    }
}
