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

//! Logging setup shared by every ember binary.
//!
//! Filters come from `EMBER_LOG` (default `info`) and from the `log_level`/`log_filters`
//! keys of `/opt/ember/etc/logging.toml`, or of the TOML file named by
//! `EMBER_LOGGING_CONFIG_PATH` when that is set.
//!
//! Output is compact text on stderr, or one JSON object per line when `EMBER_LOGGING_JSONL`
//! is truthy. Timestamps are always UTC.
//!
//! ```toml
//! log_level = "error"
//!
//! [log_filters]
//! "ember_llm::http" = "debug"
//! "ember_llm::completions" = "trace"
//! ```

use std::collections::HashMap;
use std::sync::Once;

use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::fmt::{self, format::Writer, time::FormatTime};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const FILTER_ENV: &str = "EMBER_LOG";
const CONFIG_PATH_ENV: &str = "EMBER_LOGGING_CONFIG_PATH";
const SYSTEM_CONFIG_PATH: &str = "/opt/ember/etc/logging.toml";

static INIT: Once = Once::new();

#[derive(Serialize, Deserialize, Debug)]
struct LoggingConfig {
    log_level: String,
    log_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let quiet = [
            ("h2", "error"),
            ("tower", "error"),
            ("hyper_util", "error"),
            ("tokenizers", "warn"),
        ];
        LoggingConfig {
            log_level: "info".to_string(),
            log_filters: quiet
                .into_iter()
                .map(|(module, level)| (module.to_string(), level.to_string()))
                .collect(),
        }
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init() {
    INIT.call_once(|| {
        let filter = build_filter(load_config());

        if crate::config::jsonl_logging_enabled() {
            let layer = fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
                .with_file(cfg!(debug_assertions))
                .with_line_number(cfg!(debug_assertions))
                .with_timer(UtcTime)
                .with_writer(std::io::stderr)
                .with_filter(filter);
            tracing_subscriber::registry().with(layer).init();
        } else {
            let layer = fmt::layer()
                .compact()
                .with_ansi(!crate::config::disable_ansi_logging())
                .with_timer(UtcTime)
                .with_writer(std::io::stderr)
                .with_filter(filter);
            tracing_subscriber::registry().with(layer).init();
        }
    });
}

fn build_filter(config: LoggingConfig) -> EnvFilter {
    let default_directive = config
        .log_level
        .parse::<Directive>()
        .unwrap_or_else(|_| LevelFilter::INFO.into());

    let mut filter = EnvFilter::builder()
        .with_default_directive(default_directive)
        .with_env_var(FILTER_ENV)
        .from_env_lossy();

    for (module, level) in config.log_filters {
        match format!("{module}={level}").parse::<Directive>() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("Ignoring log filter '{module}={level}': {e}"),
        }
    }
    filter
}

fn load_config() -> LoggingConfig {
    let mut figment = Figment::new()
        .merge(Serialized::defaults(LoggingConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH));
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        figment = figment.merge(Toml::file(path));
    }

    figment.extract().unwrap_or_else(|err| {
        eprintln!("Invalid logging configuration, using defaults: {err}");
        LoggingConfig::default()
    })
}

/// RFC 3339 UTC timestamps with millisecond precision.
struct UtcTime;

impl FormatTime for UtcTime {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"))
    }
}
