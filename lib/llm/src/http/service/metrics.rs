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

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts};
use std::{sync::Arc, time::Instant};

pub use prometheus::Registry;

use super::{DeploymentState, RouteDoc};

/// Prefix of every metric exported by the HTTP service
pub const METRICS_PREFIX: &str = "ember_llm";

/// Value for the `status` label in the request counter for successful requests
pub const REQUEST_STATUS_SUCCESS: &str = "success";

/// Value for the `status` label in the request counter if the request failed
pub const REQUEST_STATUS_ERROR: &str = "error";

/// Value for the `status` label when the client went away before the request finished
pub const REQUEST_STATUS_DISCONNECTED: &str = "disconnected";

/// Value for the `request_type` label for streaming requests
pub const REQUEST_TYPE_STREAM: &str = "stream";

/// Value for the `request_type` label for unary requests
pub const REQUEST_TYPE_UNARY: &str = "unary";

pub struct Metrics {
    request_counter: IntCounterVec,
    inflight_gauge: IntGaugeVec,
    request_duration: HistogramVec,
}

/// RAII object for inflight gauge and request counters
/// If this object is dropped without being marked, the request counter is incremented with
/// the `status` label [`REQUEST_STATUS_ERROR`].
pub struct InflightGuard {
    metrics: Arc<Metrics>,
    model: String,
    request_type: RequestType,
    status: Status,
    timer: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    /// `stream=false`, one aggregated response
    Unary,

    /// `stream=true`, server-sent events
    Stream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Error,
    Disconnected,
}

impl Metrics {
    /// Create Metrics with the given prefix
    /// The following metrics will be created:
    /// - `{prefix}_http_service_requests_total` - IntCounterVec for the total number of requests processed
    /// - `{prefix}_http_service_inflight_requests` - IntGaugeVec for the number of inflight requests
    /// - `{prefix}_http_service_request_duration_seconds` - HistogramVec for the duration of requests
    pub fn new(prefix: &str) -> Result<Self, prometheus::Error> {
        let request_counter = IntCounterVec::new(
            Opts::new(
                format!("{prefix}_http_service_requests_total"),
                "Total number of completion requests processed",
            ),
            &["model", "request_type", "status"],
        )?;

        let inflight_gauge = IntGaugeVec::new(
            Opts::new(
                format!("{prefix}_http_service_inflight_requests"),
                "Number of inflight requests",
            ),
            &["model"],
        )?;

        let buckets = vec![0.0, 1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0, 256.0];

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                format!("{prefix}_http_service_request_duration_seconds"),
                "Duration of completion requests",
            )
            .buckets(buckets),
            &["model"],
        )?;

        Ok(Metrics {
            request_counter,
            inflight_gauge,
            request_duration,
        })
    }

    /// Get the number of requests for the given dimensions:
    /// - model
    /// - request type (unary/stream)
    /// - status (success/error/disconnected)
    pub fn get_request_counter(
        &self,
        model: &str,
        request_type: RequestType,
        status: Status,
    ) -> u64 {
        self.request_counter
            .with_label_values(&[model, request_type.as_str(), status.as_str()])
            .get()
    }

    fn inc_request_counter(&self, model: &str, request_type: RequestType, status: Status) {
        self.request_counter
            .with_label_values(&[model, request_type.as_str(), status.as_str()])
            .inc()
    }

    /// Get the number if inflight requests for the given model
    pub fn get_inflight_count(&self, model: &str) -> i64 {
        self.inflight_gauge.with_label_values(&[model]).get()
    }

    fn inc_inflight_gauge(&self, model: &str) {
        self.inflight_gauge.with_label_values(&[model]).inc()
    }

    fn dec_inflight_gauge(&self, model: &str) {
        self.inflight_gauge.with_label_values(&[model]).dec()
    }

    pub fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.request_counter.clone()))?;
        registry.register(Box::new(self.inflight_gauge.clone()))?;
        registry.register(Box::new(self.request_duration.clone()))?;
        Ok(())
    }
}

impl DeploymentState {
    /// Create a new [`InflightGuard`] for the given model, annotated with whether the request
    /// streams.
    pub fn create_inflight_guard(&self, model: &str, streaming: bool) -> InflightGuard {
        let request_type = if streaming {
            RequestType::Stream
        } else {
            RequestType::Unary
        };

        InflightGuard::new(self.metrics.clone(), model.to_string(), request_type)
    }
}

impl InflightGuard {
    fn new(metrics: Arc<Metrics>, model: String, request_type: RequestType) -> Self {
        let timer = Instant::now();
        metrics.inc_inflight_gauge(&model);

        InflightGuard {
            metrics,
            model,
            request_type,
            status: Status::Error,
            timer,
        }
    }

    pub(crate) fn mark_ok(&mut self) {
        self.status = Status::Success;
    }

    pub(crate) fn mark_disconnected(&mut self) {
        self.status = Status::Disconnected;
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.metrics.dec_inflight_gauge(&self.model);

        self.metrics
            .inc_request_counter(&self.model, self.request_type, self.status);

        self.metrics
            .request_duration
            .with_label_values(&[&self.model])
            .observe(self.timer.elapsed().as_secs_f64());
    }
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Unary => REQUEST_TYPE_UNARY,
            RequestType::Stream => REQUEST_TYPE_STREAM,
        }
    }
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => REQUEST_STATUS_SUCCESS,
            Status::Error => REQUEST_STATUS_ERROR,
            Status::Disconnected => REQUEST_STATUS_DISCONNECTED,
        }
    }
}

/// Create a new router with the given path
pub fn router(registry: Registry, path: Option<String>) -> (Vec<RouteDoc>, Router) {
    let registry = Arc::new(registry);
    let path = path.unwrap_or_else(|| "/metrics".to_string());
    let doc = RouteDoc::new(axum::http::Method::GET, &path);
    let route = Router::new()
        .route(&path, get(handler_metrics))
        .with_state(registry);
    (vec![doc], route)
}

async fn handler_metrics(State(registry): State<Arc<Registry>>) -> impl IntoResponse {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = vec![];
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response();
    }

    match String::from_utf8(buffer) {
        Ok(metrics) => (StatusCode::OK, metrics).into_response(),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inflight_guard_counts_on_drop() {
        let metrics = Arc::new(Metrics::new("test").unwrap());

        let guard = InflightGuard::new(metrics.clone(), "echo".to_string(), RequestType::Unary);
        assert_eq!(metrics.get_inflight_count("echo"), 1);
        drop(guard);
        assert_eq!(metrics.get_inflight_count("echo"), 0);
        assert_eq!(
            metrics.get_request_counter("echo", RequestType::Unary, Status::Error),
            1
        );

        let mut guard =
            InflightGuard::new(metrics.clone(), "echo".to_string(), RequestType::Stream);
        guard.mark_ok();
        drop(guard);
        assert_eq!(
            metrics.get_request_counter("echo", RequestType::Stream, Status::Success),
            1
        );

        let mut guard =
            InflightGuard::new(metrics.clone(), "echo".to_string(), RequestType::Stream);
        guard.mark_disconnected();
        drop(guard);
        assert_eq!(
            metrics.get_request_counter("echo", RequestType::Stream, Status::Disconnected),
            1
        );
        assert_eq!(
            metrics.get_request_counter("echo", RequestType::Unary, Status::Success),
            0
        );
    }

    #[test]
    fn test_metrics_register_once() {
        let metrics = Metrics::new("test").unwrap();
        let registry = Registry::new();
        metrics.register(&registry).unwrap();
        assert!(metrics.register(&registry).is_err());
    }
}
