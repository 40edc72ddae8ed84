// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::store::DatabaseError;

/// Error codes for the relay API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    BadRequest,
    NotFound,
    AgentUnreachable,
    AgentRejected,
    Internal,
}

impl ErrorCode {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::AgentUnreachable => 502,
            Self::AgentRejected => 502,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::NotFound => "NOT_FOUND",
            Self::AgentUnreachable => "AGENT_UNREACHABLE",
            Self::AgentRejected => "AGENT_REJECTED",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Failures surfaced by the registry and the dispatcher.
///
/// None of these are retried; each maps to one [`ErrorCode`].
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Malformed or missing caller input.
    #[error("{0}")]
    Validation(String),

    /// The referenced client or command does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The agent could not be reached (refused, DNS, timeout).
    #[error("failed to send command to client at {address}: {reason}")]
    DispatchFailed { address: String, reason: String },

    /// The agent answered with a non-success status.
    #[error("client at {address} rejected command with status {status}")]
    DispatchRejected { address: String, status: u16 },

    #[error(transparent)]
    Store(#[from] DatabaseError),
}

impl RelayError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::BadRequest,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::DispatchFailed { .. } => ErrorCode::AgentUnreachable,
            Self::DispatchRejected { .. } => ErrorCode::AgentRejected,
            Self::Store(_) => ErrorCode::Internal,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let code = self.code();
        let message = match &self {
            Self::Store(e) => {
                tracing::error!(err = %e, "store failure");
                "store failure".to_owned()
            }
            other => other.to_string(),
        };
        code.to_http_response(message).into_response()
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
