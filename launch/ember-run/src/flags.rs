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

use std::path::PathBuf;

/// Serve OpenAI compatible text completions over HTTP
#[derive(clap::Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Flags {
    /// Path to a Hugging Face `tokenizer.json`
    #[arg(long)]
    pub tokenizer: PathBuf,

    /// The name of the model we are serving. Overrides `model_name` from the completions config.
    #[arg(long)]
    pub model_name: Option<String>,

    /// HTTP port
    #[arg(long, default_value = "8080")]
    pub http_port: u16,

    /// Address the HTTP service binds to
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// TOML file with the completions settings. Defaults to `/opt/ember/etc/completions.toml`.
    /// `EMBER_COMPLETIONS_*` environment variables take precedence over both.
    #[arg(long)]
    pub completions_config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_defaults() {
        let flags = Flags::try_parse_from(["ember-run", "--tokenizer", "tokenizer.json"]).unwrap();
        assert_eq!(flags.tokenizer, PathBuf::from("tokenizer.json"));
        assert_eq!(flags.http_port, 8080);
        assert_eq!(flags.host, "0.0.0.0");
        assert!(flags.model_name.is_none());
        assert!(flags.completions_config.is_none());
    }

    #[test]
    fn test_all_flags() {
        let flags = Flags::try_parse_from([
            "ember-run",
            "--tokenizer",
            "/models/tokenizer.json",
            "--model-name",
            "tiny",
            "--http-port",
            "9000",
            "--host",
            "127.0.0.1",
            "--completions-config",
            "completions.toml",
        ])
        .unwrap();
        assert_eq!(flags.model_name.as_deref(), Some("tiny"));
        assert_eq!(flags.http_port, 9000);
        assert_eq!(flags.host, "127.0.0.1");
        assert_eq!(
            flags.completions_config,
            Some(PathBuf::from("completions.toml"))
        );
    }

    #[test]
    fn test_tokenizer_is_required() {
        assert!(Flags::try_parse_from(["ember-run"]).is_err());
    }
}
