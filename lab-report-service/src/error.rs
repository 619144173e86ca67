use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use relay_flow::GraphError;
use serde_json::json;
use thiserror::Error;

use crate::models::ResultEnvelope;

/// Message returned for a `lang_code` with no loaded translation model
pub const UNSUPPORTED_LANGUAGE: &str = "Unsupported language code";

/// Everything that can go wrong while serving a request
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("No file provided")]
    MissingFile,

    #[error("Only PDF supported")]
    UnsupportedFileType,

    #[error("Unsupported extraction type: {0}")]
    UnsupportedCategory(String),

    #[error("Unsupported language code")]
    UnsupportedLanguage(String),

    #[error("Invalid request payload: {0}")]
    InvalidPayload(String),

    #[error("Uploaded file is too large")]
    PayloadTooLarge,

    #[error("Text extraction failed")]
    EmptyText,

    #[error("{0}")]
    Llm(String),

    #[error("LLM request timed out after {0}s")]
    LlmTimeout(u64),

    #[error("{0}")]
    Translation(String),

    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    /// Client input problems are 400s, everything else happened on our side.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServiceError::MissingFile
                | ServiceError::UnsupportedFileType
                | ServiceError::UnsupportedCategory(_)
                | ServiceError::UnsupportedLanguage(_)
                | ServiceError::InvalidPayload(_)
                | ServiceError::PayloadTooLarge
        )
    }

    pub fn status_code(&self) -> StatusCode {
        if matches!(self, ServiceError::PayloadTooLarge) {
            StatusCode::PAYLOAD_TOO_LARGE
        } else if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    /// Short label used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::MissingFile
            | ServiceError::UnsupportedFileType
            | ServiceError::UnsupportedCategory(_)
            | ServiceError::UnsupportedLanguage(_)
            | ServiceError::InvalidPayload(_)
            | ServiceError::PayloadTooLarge => "client_input",
            ServiceError::EmptyText => "extraction_failure",
            ServiceError::Llm(_) | ServiceError::LlmTimeout(_) | ServiceError::Translation(_) => {
                "external_service_failure"
            }
            ServiceError::Internal(_) => "internal",
        }
    }

    /// Recover the service error a task raised inside a graph execution.
    pub fn from_graph_error(err: GraphError) -> Self {
        match err {
            GraphError::TaskFailed(inner) => inner
                .downcast::<ServiceError>()
                .unwrap_or_else(|other| ServiceError::Internal(other.to_string())),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<ServiceError> for GraphError {
    fn from(err: ServiceError) -> Self {
        GraphError::task_failed(err)
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            ServiceError::UnsupportedLanguage(_) => {
                (status, Json(json!({ "error": UNSUPPORTED_LANGUAGE }))).into_response()
            }
            other => (status, Json(ResultEnvelope::<()>::failed(other.to_string()))).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_matches_status() {
        assert_eq!(ServiceError::MissingFile.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ServiceError::UnsupportedLanguage("xx".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::EmptyText.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ServiceError::LlmTimeout(60).kind(), "external_service_failure");
        assert_eq!(
            ServiceError::PayloadTooLarge.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert!(ServiceError::PayloadTooLarge.is_client_error());
    }

    #[test]
    fn task_errors_survive_the_graph() {
        let graph_error: GraphError = ServiceError::UnsupportedFileType.into();
        let recovered = ServiceError::from_graph_error(graph_error);
        assert!(matches!(recovered, ServiceError::UnsupportedFileType));

        let engine_error = GraphError::TaskNotFound("respond".into());
        let recovered = ServiceError::from_graph_error(engine_error);
        assert!(matches!(recovered, ServiceError::Internal(msg) if msg.contains("respond")));
    }

    #[test]
    fn foreign_task_errors_become_internal() {
        let graph_error = GraphError::TaskFailed(anyhow::anyhow!("socket closed"));
        let recovered = ServiceError::from_graph_error(graph_error);
        assert!(matches!(recovered, ServiceError::Internal(msg) if msg == "socket closed"));
    }
}
