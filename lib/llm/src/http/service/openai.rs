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

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use super::DeploymentState;
use super::{error::HttpError, metrics::InflightGuard, RouteDoc};

use crate::completions::{CompletionOutcome, CompletionStream};
use crate::protocols::openai::{
    completions::{new_request_id, CompletionError, CompletionRequest},
    models::{ModelList, ModelMetaData},
};

/// Status reported when the client closed the connection before the response was ready.
const CLIENT_CLOSED_REQUEST: u16 = 499;

#[derive(Serialize, Deserialize)]
pub(crate) struct ErrorResponse {
    error: String,
}

impl ErrorResponse {
    /// Not Found Error
    pub fn model_not_found() -> (StatusCode, Json<ErrorResponse>) {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "Model not found".to_string(),
            }),
        )
    }

    /// The request was well formed but asked for something this server refuses.
    pub fn bad_request(msg: &str) -> (StatusCode, Json<ErrorResponse>) {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: msg.to_string(),
            }),
        )
    }

    /// The client disconnected while its response was being aggregated. Nobody reads this
    /// response; it only settles the handler.
    pub fn client_closed() -> (StatusCode, Json<ErrorResponse>) {
        (
            StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::BAD_REQUEST),
            Json(ErrorResponse {
                error: "Client closed request".to_string(),
            }),
        )
    }

    /// Internal Service Error
    /// Return this error when the service encounters an internal error.
    /// Internal Services errors are the result of misconfiguration or bugs in the service.
    pub fn internal_server_error(msg: &str) -> (StatusCode, Json<ErrorResponse>) {
        tracing::error!("Internal server error: {msg}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: msg.to_string(),
            }),
        )
    }

    /// Engines return an [`anyhow::Error`]. If it wraps an [`HttpError`], that error picks the
    /// status code; anything else is an [`ErrorResponse::internal_server_error`] prefixed with
    /// `alt_msg`.
    pub fn from_anyhow(err: anyhow::Error, alt_msg: &str) -> (StatusCode, Json<ErrorResponse>) {
        match err.downcast::<HttpError>() {
            Ok(http_error) => ErrorResponse::from_http_error(http_error),
            Err(err) => ErrorResponse::internal_server_error(&format!("{alt_msg}: {err}")),
        }
    }

    /// Implementers should only be able to throw 400-499 errors.
    pub fn from_http_error(err: HttpError) -> (StatusCode, Json<ErrorResponse>) {
        if err.code < 400 || err.code >= 500 {
            return ErrorResponse::internal_server_error(&err.message);
        }
        match StatusCode::from_u16(err.code) {
            Ok(code) => (code, Json(ErrorResponse { error: err.message })),
            Err(_) => ErrorResponse::internal_server_error(&err.message),
        }
    }

    /// Rejections of the request itself are 400s; everything else failed on our side.
    pub fn from_completion_error(err: CompletionError) -> (StatusCode, Json<ErrorResponse>) {
        match err {
            err if err.is_client_error() => ErrorResponse::bad_request(&err.to_string()),
            CompletionError::Engine(err) => {
                ErrorResponse::from_anyhow(err, "Failed to generate completions")
            }
            err => ErrorResponse::internal_server_error(&err.to_string()),
        }
    }
}

impl From<HttpError> for ErrorResponse {
    fn from(err: HttpError) -> Self {
        ErrorResponse { error: err.message }
    }
}

/// OpenAI Completions Request Handler
///
/// Handles `POST /v1/completions`. The request is resolved to the [`crate::CompletionsHandler`]
/// serving its model, then either:
/// - `stream=true`: chunks are forwarded as server-sent events, see [`monitor_for_disconnects`];
/// - `stream=false`: the lifecycle runs on its own task so that dropping this handler (the
///   client hung up) cancels the token the lifecycle polls, which aborts generation.
#[tracing::instrument(skip_all)]
async fn completions(
    State(state): State<Arc<DeploymentState>>,
    Json(request): Json<CompletionRequest>,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let (model, handler) = state
        .get_completions_handler(&request.model)
        .map_err(|_| ErrorResponse::model_not_found())?;

    let streaming = request.is_streaming();
    let request_id = new_request_id();

    // this will increment the inflight gauge for the model
    let mut inflight = state.create_inflight_guard(&model, streaming);

    if streaming {
        // the forwarder stops generation itself, nothing to poll here
        let never = CancellationToken::new();
        let outcome = handler
            .complete_with_id(request, request_id, &never)
            .await
            .map_err(ErrorResponse::from_completion_error)?;

        let CompletionOutcome::Stream(stream) = outcome else {
            return Err(ErrorResponse::internal_server_error(
                "Streaming request did not produce a stream",
            ));
        };

        let events = monitor_for_disconnects(stream, inflight);
        return Ok(Sse::new(events)
            .keep_alive(KeepAlive::default())
            .into_response());
    }

    let disconnected = CancellationToken::new();
    let guard = disconnected.clone().drop_guard();

    let task = tokio::spawn(async move {
        handler
            .complete_with_id(request, request_id, &disconnected)
            .await
    });

    let outcome = task
        .await
        .map_err(|err| {
            ErrorResponse::internal_server_error(&format!("Completion task failed: {err}"))
        })?
        .map_err(ErrorResponse::from_completion_error);
    guard.disarm();

    match outcome? {
        CompletionOutcome::Response(response) => {
            inflight.mark_ok();
            Ok(Json(response).into_response())
        }
        CompletionOutcome::Aborted => {
            inflight.mark_disconnected();
            Err(ErrorResponse::client_closed())
        }
        CompletionOutcome::Stream(_) => Err(ErrorResponse::internal_server_error(
            "Unary request produced a stream",
        )),
    }
}

/// OpenAI compatible model listing
/// Example:
/// {
///  "object": "list",
///  "data": [
///    {
///      "id": "echo",
///      "object": "model",
///      "created": 1686935002,
///      "owned_by": "ember"
///    },
///    ]
/// }
async fn list_models_openai(
    State(state): State<Arc<DeploymentState>>,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let created = chrono::Utc::now().timestamp().max(0) as u64;
    let data = state
        .completion_handlers()
        .list()
        .into_iter()
        .map(|model| ModelMetaData::new(model, created))
        .collect();

    Ok(Json(ModelList::new(data)).into_response())
}

/// Forward the chunks of `stream` to the client through a channel of capacity 1, so a chunk is
/// only pulled from the engine once the previous one was handed to the connection.
///
/// When the client is gone the send fails; the forwarder then stops pulling and aborts the
/// engine by request id. A stream that runs to the end is closed with `data: [DONE]`.
fn monitor_for_disconnects(
    stream: CompletionStream,
    inflight: InflightGuard,
) -> ReceiverStream<Result<Event, axum::Error>> {
    let (tx, rx) = tokio::sync::mpsc::channel(1);

    tokio::spawn(async move {
        let mut inflight = inflight;
        let mut stream = stream;
        let mut failed = false;

        while let Some(chunk) = stream.next().await {
            let json = match chunk {
                Ok(chunk) => chunk.to_json().map_err(|err| err.to_string()),
                Err(err) => Err(err.to_string()),
            };

            let event = match json {
                Ok(json) => Event::default().data(json),
                Err(err) => {
                    tracing::error!(
                        request_id = stream.request_id(),
                        "completion stream failed: {err}"
                    );
                    failed = true;
                    Event::default().event("error").comment(err.to_string())
                }
            };

            if tx.send(Ok(event)).await.is_err() {
                tracing::info!(
                    request_id = stream.request_id(),
                    "client disconnected; aborting generation"
                );
                if let Err(err) = stream.abort().await {
                    tracing::warn!(
                        request_id = stream.request_id(),
                        "failed to abort generation: {err}"
                    );
                }
                inflight.mark_disconnected();
                return;
            }
        }

        if tx.send(Ok(Event::default().data("[DONE]"))).await.is_ok() && !failed {
            inflight.mark_ok();
        }
    });

    ReceiverStream::new(rx)
}

/// Create an Axum [`Router`] for the OpenAI API Completions endpoint
/// If not path is provided, the default path is `/v1/completions`
pub fn completions_router(
    state: Arc<DeploymentState>,
    path: Option<String>,
) -> (Vec<RouteDoc>, Router) {
    let path = path.unwrap_or("/v1/completions".to_string());
    let doc = RouteDoc::new(axum::http::Method::POST, &path);
    let router = Router::new()
        .route(&path, post(completions))
        .with_state(state);
    (vec![doc], router)
}

/// List Models
/// If not path is provided, the default path is `/v1/models`
pub fn list_models_router(
    state: Arc<DeploymentState>,
    path: Option<String>,
) -> (Vec<RouteDoc>, Router) {
    let path = path.unwrap_or("/v1/models".to_string());
    let doc = RouteDoc::new(axum::http::Method::GET, &path);
    let router = Router::new()
        .route(&path, get(list_models_openai))
        .with_state(state);
    (vec![doc], router)
}

#[cfg(test)]
mod tests {
    use super::super::ServiceHttpError;

    use super::*;

    const BACKUP_ERROR_MESSAGE: &str = "Failed to generate completions";

    fn http_error_from_engine(code: u16) -> Result<(), anyhow::Error> {
        Err(HttpError {
            code,
            message: "custom error message".to_string(),
        })?
    }

    fn other_error_from_engine() -> Result<(), anyhow::Error> {
        Err(ServiceHttpError::ModelNotFound("foo".to_string()))?
    }

    #[test]
    fn test_http_error_response_from_anyhow() {
        let err = http_error_from_engine(400).unwrap_err();
        let (status, response) = ErrorResponse::from_anyhow(err, BACKUP_ERROR_MESSAGE);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response.error, "custom error message");
    }

    #[test]
    fn test_error_response_from_anyhow_out_of_range() {
        let err = http_error_from_engine(399).unwrap_err();
        let (status, response) = ErrorResponse::from_anyhow(err, BACKUP_ERROR_MESSAGE);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.error, "custom error message");

        let err = http_error_from_engine(500).unwrap_err();
        let (status, response) = ErrorResponse::from_anyhow(err, BACKUP_ERROR_MESSAGE);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.error, "custom error message");
    }

    #[test]
    fn test_other_error_response_from_anyhow() {
        let err = other_error_from_engine().unwrap_err();
        let (status, response) = ErrorResponse::from_anyhow(err, BACKUP_ERROR_MESSAGE);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.error,
            format!(
                "{}: {}",
                BACKUP_ERROR_MESSAGE,
                other_error_from_engine().unwrap_err()
            )
        );
    }

    #[test]
    fn test_completion_error_classification() {
        let (status, response) = ErrorResponse::from_completion_error(
            CompletionError::UnsupportedFeature("echo is not currently supported".to_string()),
        );
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response.error, "echo is not currently supported");

        let (status, _) = ErrorResponse::from_completion_error(CompletionError::EmptyGeneration);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let engine_error = http_error_from_engine(403).unwrap_err();
        let (status, response) =
            ErrorResponse::from_completion_error(CompletionError::Engine(engine_error));
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(response.error, "custom error message");
    }

    #[test]
    fn test_client_closed_status() {
        let (status, _) = ErrorResponse::client_closed();
        assert_eq!(status.as_u16(), 499);
    }
}
