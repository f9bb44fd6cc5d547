//! API errors mapped to HTTP status codes.
//!
//! Every error renders as a JSON body `{"error": "message"}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use machina_rag::RagError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or incomplete request (400).
    #[error("{0}")]
    BadRequest(String),
    /// The model never produced a conforming answer (422).
    #[error("{0}")]
    Unprocessable(String),
    /// The model or embedding backend failed (502).
    #[error("{0}")]
    Upstream(String),
    /// The model did not answer in time (504).
    #[error("{0}")]
    Timeout(String),
    /// Anything else (500).
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        let message = err.to_string();
        match err {
            RagError::OutputParse { .. } => Self::Unprocessable(message),
            RagError::ModelError { .. } | RagError::EmbeddingError { .. } => {
                Self::Upstream(message)
            }
            RagError::ModelTimeout { .. } => Self::Timeout(message),
            _ => Self::Internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(%status, error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rag_errors_map_to_statuses() {
        let cases = [
            (RagError::OutputParse { attempts: 3, message: "bad".into() }, 422),
            (RagError::ModelError { provider: "p".into(), message: "down".into() }, 502),
            (RagError::EmbeddingError { provider: "p".into(), message: "down".into() }, 502),
            (RagError::ModelTimeout { seconds: 120 }, 504),
            (RagError::PipelineError("dims".into()), 500),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status().as_u16(), status);
        }
    }

    #[test]
    fn message_is_preserved() {
        let err = ApiError::from(RagError::ModelTimeout { seconds: 30 });
        assert_eq!(err.to_string(), "Model call timed out after 30s");
    }
}
