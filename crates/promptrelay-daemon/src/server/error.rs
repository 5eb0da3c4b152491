use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::responder::ResponderError;

/// Errors returned by the HTTP handlers before or instead of a response body.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request was rejected before any process was launched.
    #[error("{0}")]
    Validation(String),

    /// The agent exited cleanly without a result record.
    #[error("No result in agent response")]
    MissingResult { raw: String },

    /// Launch, runtime, timeout or cancellation failure.
    #[error("Failed to execute agent: {0}")]
    Execution(String),
}

impl From<promptrelay_core::Error> for ApiError {
    fn from(err: promptrelay_core::Error) -> Self {
        match err {
            promptrelay_core::Error::Validation(message) => Self::Validation(message),
            other => Self::Execution(other.to_string()),
        }
    }
}

impl From<ResponderError> for ApiError {
    fn from(err: ResponderError) -> Self {
        match err {
            ResponderError::MissingResult { raw } => Self::MissingResult { raw },
            other => Self::Execution(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Validation(message) => (StatusCode::BAD_REQUEST, json!({ "error": message })),
            Self::MissingResult { raw } => {
                error!("Agent exited without a result record");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "No result in agent response", "raw": raw }),
                )
            }
            Self::Execution(details) => {
                error!(details = %details, "Agent execution failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Failed to execute agent", "details": details }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
