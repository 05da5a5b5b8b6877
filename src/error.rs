use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::{calls::DomainError, calls::WorkerSid, provider::ProviderError, registry::RegistryError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Worker {0} has no contact address")]
    MissingContact(WorkerSid),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn malformed(message: impl Into<String>) -> Self {
        AppError::MalformedRequest(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MalformedRequest(_) | AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::MissingContact(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Registry(_) => StatusCode::CONFLICT,
            AppError::Provider(_)
            | AppError::Configuration(_)
            | AppError::Template(_)
            | AppError::Io(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        AppError::MalformedRequest(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_message = match &self {
            AppError::Provider(err) => err.message.clone(),
            AppError::MalformedRequest(message) | AppError::Configuration(message) => {
                message.clone()
            }
            other => other.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        let body = json!({
            "error": error_message
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_requests_map_to_bad_request() {
        let response = AppError::malformed("Missing InboundSid").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn provider_failures_map_to_server_error() {
        let err = AppError::from(ProviderError::new(400, Some(21211), "Invalid 'To' number"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn blank_sid_becomes_malformed_request() {
        let err = AppError::from(DomainError::InvalidTaskSid);
        assert!(matches!(err, AppError::MalformedRequest(_)));
    }
}
