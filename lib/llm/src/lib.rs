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

//! # Ember LLM
//!
//! The `ember-llm` crate serves OpenAI compatible text completions on top of a generation engine
//! that emits cumulative per-choice snapshots.
//!
//! The interesting work happens between the engine and the wire: the streaming path turns each
//! snapshot into minimal per-choice deltas, the unary path folds the snapshots into a single
//! response with usage accounting, and both can attach token log-probabilities with text offsets.

pub mod completions;
pub mod config;
pub mod engines;
pub mod http;
pub mod protocols;
pub mod tokenizers;

pub use completions::{CompletionOutcome, CompletionStream, CompletionsHandler, DisconnectSignal};
pub use config::CompletionsConfig;
pub use protocols::openai::completions::CompletionError;
