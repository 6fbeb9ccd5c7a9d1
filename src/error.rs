// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Error types for Registry Control.
//!
//! Every handler returns `Result<_, RegistryError>`. The response body is always
//! the uniform envelope `{"error": "<message>"}`; the full cause (including
//! anything redacted from the body) travels to the request logger through the
//! [`FailureDetail`] response extension.

use crate::{chart::ChartError, registry_client::RegistryClientError, store::StoreError, worker::WorkerError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Classification of a failure, independent of its concrete source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthenticated,
    Forbidden,
    NotFound,
    BadInput,
    Conflict,
    Precondition,
    Upstream,
    Internal,
}

/// Application-level errors returned by handlers.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unauthorized: {0}")]
    Unauthenticated(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadInput(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("precondition failed: {0}")]
    Precondition(String),

    /// A collaborator (job service, chart backend, registry) failed.
    /// `operation` is the only part shown to clients.
    #[error("{operation}: {cause}")]
    Upstream {
        operation: String,
        status: Option<StatusCode>,
        cause: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Full error text attached to error responses so the logging middleware can
/// record what the client did not see.
#[derive(Debug, Clone)]
pub struct FailureDetail(pub String);

impl RegistryError {
    pub fn internal(msg: impl Into<String>) -> Self {
        RegistryError::Internal(anyhow::anyhow!(msg.into()))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            RegistryError::Forbidden(_) => ErrorKind::Forbidden,
            RegistryError::NotFound(_) => ErrorKind::NotFound,
            RegistryError::BadInput(_) => ErrorKind::BadInput,
            RegistryError::Conflict(_) => ErrorKind::Conflict,
            RegistryError::Precondition(_) => ErrorKind::Precondition,
            RegistryError::Upstream { .. } => ErrorKind::Upstream,
            RegistryError::Database(_) | RegistryError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RegistryError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            RegistryError::Forbidden(_) => StatusCode::FORBIDDEN,
            RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
            RegistryError::BadInput(_) => StatusCode::BAD_REQUEST,
            RegistryError::Conflict(_) => StatusCode::CONFLICT,
            RegistryError::Precondition(_) => StatusCode::PRECONDITION_FAILED,
            RegistryError::Upstream { status, .. } => upstream_status(*status),
            RegistryError::Database(_) | RegistryError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message placed in the envelope. Upstream and internal causes stay in the log.
    fn public_message(&self) -> String {
        match self {
            RegistryError::Unauthenticated(msg)
            | RegistryError::Forbidden(msg)
            | RegistryError::NotFound(msg)
            | RegistryError::BadInput(msg)
            | RegistryError::Conflict(msg)
            | RegistryError::Precondition(msg) => msg.clone(),
            RegistryError::Upstream { operation, .. } => operation.clone(),
            RegistryError::Database(_) => "internal error".into(),
            RegistryError::Internal(e) => format!("internal error: {e}"),
        }
    }

    /// Wrap a job-service failure, naming the operation that triggered it.
    pub fn from_worker(operation: &str, err: WorkerError) -> Self {
        RegistryError::Upstream {
            operation: operation.to_string(),
            status: err.http_status(),
            cause: err.to_string(),
        }
    }

    /// Wrap a chart-backend failure, naming the operation that triggered it.
    pub fn from_chart(operation: &str, err: ChartError) -> Self {
        RegistryError::Upstream {
            operation: operation.to_string(),
            status: err.http_status(),
            cause: err.to_string(),
        }
    }

    pub fn from_registry(operation: &str, err: RegistryClientError) -> Self {
        RegistryError::Upstream {
            operation: operation.to_string(),
            status: err.http_status(),
            cause: err.to_string(),
        }
    }
}

/// Upstream HTTP codes keep their meaning when they name a client-visible
/// condition; anything else is an internal failure from the caller's view.
fn upstream_status(status: Option<StatusCode>) -> StatusCode {
    match status {
        Some(StatusCode::NOT_FOUND) => StatusCode::NOT_FOUND,
        Some(StatusCode::CONFLICT) => StatusCode::CONFLICT,
        Some(StatusCode::PRECONDITION_FAILED) => StatusCode::PRECONDITION_FAILED,
        Some(StatusCode::BAD_REQUEST) => StatusCode::BAD_REQUEST,
        Some(StatusCode::UNAUTHORIZED) => StatusCode::UNAUTHORIZED,
        Some(StatusCode::FORBIDDEN) => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<StoreError> for RegistryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => RegistryError::NotFound(msg),
            StoreError::Duplicate(msg) => RegistryError::Conflict(msg),
            StoreError::Database(e) => RegistryError::Database(e),
            StoreError::Serialization(msg) => {
                RegistryError::internal(format!("serialization: {msg}"))
            }
        }
    }
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.public_message();
        let detail = FailureDetail(self.to_string());

        let mut response = (status, Json(json!({ "error": message }))).into_response();
        response.extensions_mut().insert(detail);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(err: RegistryError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn envelope_carries_message() {
        let (status, body) = body_of(RegistryError::Conflict("already had one".into())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "already had one");
    }

    #[tokio::test]
    async fn upstream_detail_is_redacted() {
        let err = RegistryError::Upstream {
            operation: "failed to submit admin job".into(),
            status: Some(StatusCode::BAD_GATEWAY),
            cause: "dial tcp 10.0.0.7:8080: connection refused".into(),
        };
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "failed to submit admin job");
    }

    #[test]
    fn upstream_codes_are_classified() {
        let not_found = RegistryError::Upstream {
            operation: "op".into(),
            status: Some(StatusCode::NOT_FOUND),
            cause: String::new(),
        };
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
        assert_eq!(not_found.kind(), ErrorKind::Upstream);

        let precondition = RegistryError::Upstream {
            operation: "op".into(),
            status: Some(StatusCode::PRECONDITION_FAILED),
            cause: String::new(),
        };
        assert_eq!(precondition.status(), StatusCode::PRECONDITION_FAILED);
    }

    #[test]
    fn store_duplicate_maps_to_conflict() {
        let err: RegistryError = StoreError::Duplicate("project library".into()).into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
