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

//! HTTP Service for OpenAI Completions
//!
//! The service serves a [`CompletionsHandler`] per model name. Each handler owns the engine,
//! tokenizer and configuration used to run a request, so the HTTP layer only routes, streams
//! and counts.
//!
//! Routes:
//! - `POST /v1/completions`
//! - `GET /v1/models`
//! - `GET /metrics`

mod openai;

pub mod error;
pub mod metrics;
pub mod service_v2;

pub use axum;
pub use error::ServiceHttpError;
pub use metrics::Metrics;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::completions::CompletionsHandler;

#[derive(Clone)]
pub struct ModelManager {
    state: Arc<DeploymentState>,
}

impl ModelManager {
    pub fn new() -> Result<Self, prometheus::Error> {
        let state = Arc::new(DeploymentState::new()?);
        Ok(Self { state })
    }

    pub fn state(&self) -> Arc<DeploymentState> {
        self.state.clone()
    }

    pub fn has_model(&self, model: &str) -> bool {
        self.state.completion_handlers().contains(model)
    }

    pub fn list_completions_models(&self) -> Vec<String> {
        self.state.completion_handlers().list()
    }

    /// Serve `handler` under `model`. The first model added also answers requests that leave
    /// `model` empty.
    pub fn add_completions_model(
        &self,
        model: &str,
        handler: CompletionsHandler,
    ) -> Result<(), ServiceHttpError> {
        let mut handlers = self.state.completion_handlers();
        handlers.add(model, handler)?;
        if handlers.default.is_none() {
            handlers.set_default(model);
        }
        Ok(())
    }

    pub fn remove_completions_model(&self, model: &str) -> Result<(), ServiceHttpError> {
        let mut handlers = self.state.completion_handlers();
        handlers.remove(model)?;
        if handlers.default.as_deref() == Some(model) {
            handlers.clear_default();
        }
        Ok(())
    }

    /// Get the Prometheus [`Metrics`] object which tracks request counts and inflight requests
    pub fn metrics(&self) -> Arc<Metrics> {
        self.state.metrics.clone()
    }
}

struct ModelEngines<E> {
    /// Model used when a request does not name one
    default: Option<String>,
    engines: HashMap<String, E>,
}

impl<E> Default for ModelEngines<E> {
    fn default() -> Self {
        Self {
            default: None,
            engines: HashMap::new(),
        }
    }
}

impl<E> ModelEngines<E> {
    fn set_default(&mut self, model: &str) {
        self.default = Some(model.to_string());
    }

    fn clear_default(&mut self) {
        self.default = None;
    }

    fn add(&mut self, model: &str, engine: E) -> Result<(), ServiceHttpError> {
        if self.engines.contains_key(model) {
            return Err(ServiceHttpError::ModelAlreadyExists(model.to_string()));
        }
        self.engines.insert(model.to_string(), engine);
        Ok(())
    }

    fn remove(&mut self, model: &str) -> Result<(), ServiceHttpError> {
        if self.engines.remove(model).is_none() {
            return Err(ServiceHttpError::ModelNotFound(model.to_string()));
        }
        Ok(())
    }

    /// Look up `model`, falling back to the default when the name is empty.
    fn get(&self, model: &str) -> Option<(&str, &E)> {
        let name = match (model.is_empty(), self.default.as_deref()) {
            (true, Some(default)) => default,
            _ => model,
        };
        self.engines
            .get_key_value(name)
            .map(|(name, engine)| (name.as_str(), engine))
    }

    fn contains(&self, model: &str) -> bool {
        self.engines.contains_key(model)
    }

    fn list(&self) -> Vec<String> {
        let mut models: Vec<String> = self.engines.keys().cloned().collect();
        models.sort();
        models
    }
}

pub struct DeploymentState {
    completion_handlers: Mutex<ModelEngines<CompletionsHandler>>,
    metrics: Arc<Metrics>,
}

impl DeploymentState {
    fn new() -> Result<Self, prometheus::Error> {
        Ok(Self {
            completion_handlers: Mutex::new(ModelEngines::default()),
            metrics: Arc::new(Metrics::new(metrics::METRICS_PREFIX)?),
        })
    }

    fn completion_handlers(&self) -> MutexGuard<'_, ModelEngines<CompletionsHandler>> {
        self.completion_handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve the handler serving `model` along with the model name it is registered under.
    fn get_completions_handler(
        &self,
        model: &str,
    ) -> Result<(String, CompletionsHandler), ServiceHttpError> {
        self.completion_handlers()
            .get(model)
            .map(|(name, handler)| (name.to_string(), handler.clone()))
            .ok_or_else(|| ServiceHttpError::ModelNotFound(model.to_string()))
    }
}

#[derive(Debug)]
pub struct RouteDoc {
    method: axum::http::Method,
    path: String,
}

impl std::fmt::Display for RouteDoc {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

impl RouteDoc {
    pub fn new<T: Into<String>>(method: axum::http::Method, path: T) -> Self {
        RouteDoc {
            method,
            path: path.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_engines_default_lookup() {
        let mut engines = ModelEngines::default();
        engines.add("alpha", 1u32).unwrap();
        engines.add("beta", 2u32).unwrap();

        assert!(engines.get("").is_none());
        engines.set_default("beta");
        assert_eq!(engines.get(""), Some(("beta", &2)));
        assert_eq!(engines.get("alpha"), Some(("alpha", &1)));
        assert!(engines.get("gamma").is_none());
        assert_eq!(engines.list(), vec!["alpha".to_string(), "beta".to_string()]);
    }

    #[test]
    fn test_model_engines_add_remove() {
        let mut engines = ModelEngines::default();
        engines.add("alpha", ()).unwrap();
        assert!(matches!(
            engines.add("alpha", ()),
            Err(ServiceHttpError::ModelAlreadyExists(_))
        ));
        engines.remove("alpha").unwrap();
        assert!(!engines.contains("alpha"));
        assert!(matches!(
            engines.remove("alpha"),
            Err(ServiceHttpError::ModelNotFound(_))
        ));
    }
}
