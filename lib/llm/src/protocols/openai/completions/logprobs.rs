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

use super::{CompletionError, LogprobResult};
use crate::protocols::{common::llm_backend::TopLogprobs, TokenIdType};
use crate::tokenizers::{traits::Vocabulary, Tokenizer};

/// Build the OpenAI logprobs record for a run of generated tokens.
///
/// `top_logprobs[i]` is the candidate map of the position that produced `token_ids[i]` and must
/// contain `token_ids[i]` itself. Offsets start at `initial_text_offset` and advance by the
/// character length of each token's vocabulary entry. Empty input yields an empty record.
pub fn create_logprobs(
    tokenizer: &Tokenizer,
    token_ids: &[TokenIdType],
    top_logprobs: &[TopLogprobs],
    initial_text_offset: usize,
) -> Result<LogprobResult, CompletionError> {
    if token_ids.len() != top_logprobs.len() {
        return Err(CompletionError::LogprobsMismatch {
            tokens: token_ids.len(),
            logprobs: top_logprobs.len(),
        });
    }

    let mut result = LogprobResult::with_capacity(token_ids.len());
    let mut offset = initial_text_offset;

    for (position, (&token_id, candidates)) in token_ids.iter().zip(top_logprobs).enumerate() {
        let token = display_token(tokenizer, token_id)?;
        let logprob = *candidates
            .get(&token_id)
            .ok_or(CompletionError::MissingCandidate { position, token_id })?;

        let top = candidates
            .iter()
            .map(|(&id, &logprob)| Ok((display_token(tokenizer, id)?, logprob)))
            .collect::<Result<BTreeMap<_, _>, CompletionError>>()?;

        result.text_offset.push(offset);
        offset += token.chars().count();

        result.tokens.push(token);
        result.token_logprobs.push(logprob);
        result.top_logprobs.push(top);
    }

    Ok(result)
}

fn display_token(tokenizer: &Tokenizer, token_id: TokenIdType) -> Result<String, CompletionError> {
    tokenizer
        .id_to_token(token_id)
        .ok_or(CompletionError::UnknownToken(token_id))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::*;
    use crate::tokenizers::{traits, Encoding, Result};

    /// Fixed vocabulary, one entry per id.
    struct Vocab(Vec<&'static str>);

    impl traits::Encoder for Vocab {
        fn encode(&self, _input: &str) -> Result<Encoding> {
            unimplemented!()
        }
    }

    impl traits::Decoder for Vocab {
        fn decode(&self, token_ids: &[TokenIdType], _skip_special_tokens: bool) -> Result<String> {
            Ok(token_ids.iter().map(|&id| self.0[id as usize]).collect())
        }
    }

    impl traits::Vocabulary for Vocab {
        fn id_to_token(&self, token_id: TokenIdType) -> Option<String> {
            self.0.get(token_id as usize).map(|t| t.to_string())
        }
    }

    impl traits::Tokenizer for Vocab {}

    fn tokenizer() -> Tokenizer {
        Tokenizer::from(Arc::new(Vocab(vec!["<s>", "Hello", ",", " wörld", "!"])))
    }

    fn candidates(entries: &[(TokenIdType, f32)]) -> TopLogprobs {
        entries.iter().copied().collect::<HashMap<_, _>>()
    }

    #[test]
    fn test_offsets_advance_by_token_chars() {
        let maps = vec![
            candidates(&[(1, -0.1), (2, -2.5)]),
            candidates(&[(2, -0.2)]),
            candidates(&[(3, -0.3), (4, -1.0)]),
            candidates(&[(4, -0.4)]),
        ];
        let record = create_logprobs(&tokenizer(), &[1, 2, 3, 4], &maps, 7).unwrap();

        assert_eq!(record.tokens, vec!["Hello", ",", " wörld", "!"]);
        assert_eq!(record.token_logprobs, vec![-0.1, -0.2, -0.3, -0.4]);
        // " wörld" is six characters but seven bytes
        assert_eq!(record.text_offset, vec![7, 12, 13, 19]);
        assert_eq!(record.text_offset[0], 7);
        for i in 1..record.len() {
            assert_eq!(
                record.text_offset[i] - record.text_offset[i - 1],
                record.tokens[i - 1].chars().count()
            );
        }

        assert_eq!(record.top_logprobs[0].len(), 2);
        assert_eq!(record.top_logprobs[0].get(","), Some(&-2.5));
        assert_eq!(record.top_logprobs[2].get("!"), Some(&-1.0));
    }

    #[test]
    fn test_empty_input_is_empty_record() {
        let record = create_logprobs(&tokenizer(), &[], &[], 42).unwrap();
        assert!(record.is_empty());
        assert_eq!(record, LogprobResult::default());
    }

    #[test]
    fn test_chosen_token_missing_from_candidates() {
        let maps = vec![candidates(&[(1, -0.1)]), candidates(&[(4, -0.4)])];
        let err = create_logprobs(&tokenizer(), &[1, 2], &maps, 0).unwrap_err();
        assert!(matches!(
            err,
            CompletionError::MissingCandidate {
                position: 1,
                token_id: 2
            }
        ));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_length_mismatch_and_unknown_token() {
        let err = create_logprobs(&tokenizer(), &[1, 2], &[candidates(&[(1, 0.0)])], 0)
            .unwrap_err();
        assert!(matches!(
            err,
            CompletionError::LogprobsMismatch {
                tokens: 2,
                logprobs: 1
            }
        ));

        let err = create_logprobs(&tokenizer(), &[9], &[candidates(&[(9, 0.0)])], 0)
            .unwrap_err();
        assert!(matches!(err, CompletionError::UnknownToken(9)));
    }
}
