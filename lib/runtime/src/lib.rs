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

//! Ember Runtime
//!
//! The process-level plumbing shared by the ember crates: the [`engine::AsyncEngine`] family of
//! traits, the per-request [`pipeline::Context`] that carries the cancellation controller, the
//! logging setup and the runtime configuration.

pub use anyhow::{anyhow as error, bail, Context as ErrorContext, Error, Ok as OK, Result};

pub mod config;
pub use config::RuntimeConfig;

pub mod engine;
pub mod logging;
pub mod pipeline;

pub use tokio_util::sync::CancellationToken;
