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

use futures::{Stream, StreamExt};

use super::{create_logprobs, CompletionChoice, CompletionError, CompletionResponse, ResponseFactory};
use crate::protocols::{
    common::llm_backend::{ChoiceOutput, GenerationSnapshot},
    openai::CompletionUsage,
    strip_replacement_chars, TokenIdType,
};
use crate::tokenizers::Tokenizer;

/// Folds the cumulative snapshots of one request into a single [`CompletionResponse`].
///
/// Snapshots are cumulative, so only the most recent output of each choice matters.
#[derive(Debug)]
pub struct DeltaAggregator {
    factory: ResponseFactory,
    enable_logprobs: bool,
    tokenizer: Tokenizer,
    prompt_token_ids: Option<Vec<TokenIdType>>,
    choices: BTreeMap<u32, ChoiceOutput>,
}

impl DeltaAggregator {
    pub fn new(factory: ResponseFactory, enable_logprobs: bool, tokenizer: Tokenizer) -> Self {
        Self {
            factory,
            enable_logprobs,
            tokenizer,
            prompt_token_ids: None,
            choices: BTreeMap::new(),
        }
    }

    /// Record a snapshot, replacing the previous state of every choice it carries.
    pub fn observe(&mut self, snapshot: GenerationSnapshot) {
        self.prompt_token_ids = Some(snapshot.prompt_token_ids);
        for output in snapshot.outputs {
            self.choices.insert(output.index, output);
        }
    }

    /// Build the final response from everything observed so far.
    pub fn finish(self) -> Result<CompletionResponse, CompletionError> {
        let Some(prompt_token_ids) = self.prompt_token_ids else {
            return Err(CompletionError::EmptyGeneration);
        };

        let mut completion_tokens: usize = 0;
        let mut choices = Vec::with_capacity(self.choices.len());

        for (index, output) in self.choices {
            completion_tokens = completion_tokens.saturating_add(output.token_ids.len());

            let logprobs = if self.enable_logprobs {
                let maps = output
                    .logprobs
                    .as_deref()
                    .ok_or(CompletionError::MissingLogprobs)?;
                Some(create_logprobs(&self.tokenizer, &output.token_ids, maps, 0)?)
            } else {
                None
            };

            choices.push(CompletionChoice {
                finish_reason: output.finish_reason.map(|reason| reason.to_string()),
                index,
                logprobs,
                text: strip_replacement_chars(&output.text),
            });
        }

        let usage = CompletionUsage::new(prompt_token_ids.len(), completion_tokens);
        Ok(self.factory.make_response(choices, Some(usage)))
    }

    /// Drain a snapshot stream and build the final response. The first error wins.
    pub async fn apply<S>(mut self, snapshots: S) -> Result<CompletionResponse, CompletionError>
    where
        S: Stream<Item = anyhow::Result<GenerationSnapshot>> + Unpin,
    {
        let mut snapshots = snapshots;
        while let Some(snapshot) = snapshots.next().await {
            self.observe(snapshot?);
        }
        self.finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use futures::stream;

    use super::*;
    use crate::protocols::common::FinishReason;
    use crate::tokenizers::{traits, Encoding, Result};

    struct Vocab;

    impl traits::Encoder for Vocab {
        fn encode(&self, _input: &str) -> Result<Encoding> {
            unimplemented!()
        }
    }

    impl traits::Decoder for Vocab {
        fn decode(&self, token_ids: &[TokenIdType], _skip_special_tokens: bool) -> Result<String> {
            Ok(token_ids.iter().map(|id| format!("t{id}")).collect())
        }
    }

    impl traits::Vocabulary for Vocab {
        fn id_to_token(&self, token_id: TokenIdType) -> Option<String> {
            Some(format!("t{token_id}"))
        }
    }

    impl traits::Tokenizer for Vocab {}

    fn aggregator(enable_logprobs: bool) -> DeltaAggregator {
        let factory = ResponseFactory::builder()
            .model("meta/llama-3.1-8b")
            .id("cmpl-test")
            .created(1234567890)
            .build()
            .unwrap();
        DeltaAggregator::new(factory, enable_logprobs, Tokenizer::from(Arc::new(Vocab)))
    }

    fn snapshot(outputs: Vec<ChoiceOutput>) -> anyhow::Result<GenerationSnapshot> {
        Ok(GenerationSnapshot {
            prompt_token_ids: vec![10, 11, 12, 13],
            outputs,
        })
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let result = aggregator(false).apply(stream::empty()).await;
        assert!(matches!(result, Err(CompletionError::EmptyGeneration)));
    }

    #[tokio::test]
    async fn test_last_snapshot_wins() {
        let snapshots = stream::iter(vec![
            snapshot(vec![ChoiceOutput::new(0, "Hello,", vec![1, 2])]),
            snapshot(vec![
                ChoiceOutput::new(0, "Hello, world!\u{FFFD}", vec![1, 2, 3]).finished(FinishReason::Length),
            ]),
        ]);

        let response = aggregator(false).apply(snapshots).await.unwrap();
        assert_eq!(response.id, "cmpl-test");
        assert_eq!(response.object, "text_completion");
        assert_eq!(response.choices.len(), 1);

        let choice = &response.choices[0];
        assert_eq!(choice.text, "Hello, world!");
        assert_eq!(choice.finish_reason.as_deref(), Some("length"));
        assert!(choice.logprobs.is_none());

        let usage = response.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 4);
        assert_eq!(usage.completion_tokens, 3);
        assert_eq!(usage.total_tokens, 7);
    }

    #[tokio::test]
    async fn test_multiple_choices_sorted_with_full_logprobs() {
        let maps = |ids: &[TokenIdType]| {
            ids.iter()
                .map(|&id| HashMap::from([(id, -0.5), (99, -3.0)]))
                .collect::<Vec<_>>()
        };
        let snapshots = stream::iter(vec![snapshot(vec![
            ChoiceOutput::new(1, "t5", vec![5])
                .with_logprobs(maps(&[5]))
                .finished(FinishReason::Stop),
            ChoiceOutput::new(0, "t1t2", vec![1, 2])
                .with_logprobs(maps(&[1, 2]))
                .finished(FinishReason::Stop),
        ])]);

        let response = aggregator(true).apply(snapshots).await.unwrap();
        let indices: Vec<u32> = response.choices.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1]);

        let logprobs = response.choices[0].logprobs.as_ref().unwrap();
        assert_eq!(logprobs.tokens, vec!["t1", "t2"]);
        assert_eq!(logprobs.text_offset, vec![0, 2]);
        assert_eq!(logprobs.top_logprobs[1].get("t99"), Some(&-3.0));

        assert_eq!(response.usage.unwrap().completion_tokens, 3);
    }

    #[tokio::test]
    async fn test_engine_error_propagates() {
        let snapshots = stream::iter(vec![
            snapshot(vec![ChoiceOutput::new(0, "a", vec![1])]),
            Err(anyhow::anyhow!("engine exploded")),
        ]);
        let err = aggregator(false).apply(snapshots).await.unwrap_err();
        assert!(matches!(err, CompletionError::Engine(_)));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_missing_logprobs() {
        let mut aggregator = aggregator(true);
        aggregator.observe(GenerationSnapshot {
            prompt_token_ids: vec![],
            outputs: vec![ChoiceOutput::new(0, "t1", vec![1])],
        });
        assert!(matches!(
            aggregator.finish(),
            Err(CompletionError::MissingLogprobs)
        ));
    }
}
