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

use std::path::Path;

use anyhow::Result;
use derive_builder::Builder;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// `max_tokens` applied when a request omits it, as the OpenAI legacy API does.
pub const DEFAULT_MAX_TOKENS: u32 = 128;

/// Completions configuration
/// Settings of the completions layer that are not part of any single request
#[derive(Serialize, Deserialize, Validate, Debug, Builder, Clone, PartialEq)]
#[builder(build_fn(private, name = "build_internal"), derive(Debug, Serialize))]
pub struct CompletionsConfig {
    /// `max_tokens` used when the request leaves it unset or zero
    #[validate(range(min = 1))]
    #[builder(default = "DEFAULT_MAX_TOKENS")]
    #[builder_field_attr(serde(skip_serializing_if = "Option::is_none"))]
    pub default_max_tokens: u32,

    /// Context length of the served model. When set, requests whose prompt plus `max_tokens`
    /// exceed it are rejected before generation.
    #[validate(range(min = 1))]
    #[builder(default)]
    #[builder_field_attr(serde(skip_serializing_if = "Option::is_none"))]
    pub max_model_len: Option<u32>,

    /// Model name reported in `/v1/models` and used when a request leaves `model` empty
    #[validate(length(min = 1))]
    #[builder(setter(into), default = "String::from(\"echo\")")]
    #[builder_field_attr(serde(skip_serializing_if = "Option::is_none"))]
    pub model_name: String,
}

impl CompletionsConfig {
    pub fn builder() -> CompletionsConfigBuilder {
        CompletionsConfigBuilder::default()
    }

    fn figment(path: Option<&Path>) -> Figment {
        let figment = Figment::new().merge(Serialized::defaults(CompletionsConfig::default()));
        let figment = match path {
            Some(path) => figment.merge(Toml::file(path)),
            None => figment.merge(Toml::file("/opt/ember/etc/completions.toml")),
        };
        figment.merge(Env::prefixed("EMBER_COMPLETIONS_"))
    }

    /// Load the completions configuration
    /// Configuration is priorities in the following order, where the last has the lowest priority:
    /// 1. Environment variables prefixed with `EMBER_COMPLETIONS_` (top priority)
    /// 2. The TOML file at `path`, or `/opt/ember/etc/completions.toml` when no path is given
    /// 3. Built-in defaults
    pub fn from_settings(path: Option<&Path>) -> Result<CompletionsConfig> {
        let config: CompletionsConfig = Self::figment(path).extract()?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for CompletionsConfig {
    fn default() -> Self {
        CompletionsConfig {
            default_max_tokens: DEFAULT_MAX_TOKENS,
            max_model_len: None,
            model_name: "echo".to_string(),
        }
    }
}

impl CompletionsConfigBuilder {
    /// Build and validate the completions configuration
    pub fn build(&self) -> Result<CompletionsConfig> {
        let config = self.build_internal()?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompletionsConfig::builder().build().unwrap();
        assert_eq!(config, CompletionsConfig::default());
        assert_eq!(config.default_max_tokens, 128);
    }

    #[test]
    fn test_file_then_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "completions.toml",
                r#"
                default_max_tokens = 64
                max_model_len = 2048
                model_name = "tiny"
                "#,
            )?;
            jail.set_env("EMBER_COMPLETIONS_MODEL_NAME", "from-env");

            let config =
                CompletionsConfig::from_settings(Some(Path::new("completions.toml"))).unwrap();
            assert_eq!(config.default_max_tokens, 64);
            assert_eq!(config.max_model_len, Some(2048));
            assert_eq!(config.model_name, "from-env");
            Ok(())
        });
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(CompletionsConfig::builder()
            .default_max_tokens(0u32)
            .build()
            .is_err());
        assert!(CompletionsConfig::builder().model_name("").build().is_err());
        assert!(CompletionsConfig::builder()
            .max_model_len(Some(0))
            .build()
            .is_err());
    }
}
