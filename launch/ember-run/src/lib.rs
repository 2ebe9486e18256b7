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

use std::sync::Arc;

use anyhow::Context;

use ember_llm::{
    completions::CompletionsHandler, config::CompletionsConfig, engines::EchoEngine,
    http::service::service_v2, tokenizers::Tokenizer,
};
use ember_runtime::CancellationToken;

mod flags;
pub use flags::Flags;

/// Build the HTTP service described by `flags` and serve until Ctrl-C.
pub async fn run(flags: Flags) -> anyhow::Result<()> {
    let mut config = CompletionsConfig::from_settings(flags.completions_config.as_deref())?;
    if let Some(model_name) = flags.model_name.filter(|name| !name.is_empty()) {
        config.model_name = model_name;
    }

    let tokenizer_path = flags
        .tokenizer
        .to_str()
        .context("tokenizer path is not valid UTF-8")?;
    let tokenizer = Tokenizer::from_file(tokenizer_path)
        .with_context(|| format!("failed loading tokenizer from {tokenizer_path}"))?;

    let engine = Arc::new(EchoEngine::new(tokenizer.clone()));
    let model_name = config.model_name.clone();
    let handler = CompletionsHandler::new(engine, tokenizer, config);

    let http_service = service_v2::HttpService::builder()
        .port(flags.http_port)
        .host(flags.host)
        .enable_cmpl_endpoints(true)
        .build()?;
    http_service
        .model_manager()
        .add_completions_model(&model_name, handler)?;
    tracing::info!(model_name, "serving completions");

    let cancel_token = CancellationToken::new();
    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("received Ctrl-C, shutting down");
                signal_token.cancel();
            }
            Err(err) => tracing::error!("unable to listen for Ctrl-C: {err}"),
        }
    });

    http_service.run(cancel_token).await
}
