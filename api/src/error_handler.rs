use ai_llm_service::AiLlmError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use contextor::ContextorError;
use rag_store::RagError;
use thiserror::Error;
use tracing::error;

use crate::core::http::response_envelope::{ApiErrorDetail, ApiResponse};

/// Public application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // --- Boot / config ---
    #[error("LLM setup failed: {0}")]
    Llm(#[from] AiLlmError),

    #[error("router setup failed: {0}")]
    Router(#[from] ContextorError),

    // --- IO / server ---
    #[error("failed to bind listener on {addr}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error")]
    Server(#[source] std::io::Error),

    // --- Request / domain ---
    #[error("bad request: {message}")]
    BadRequest {
        message: String,
        path: Option<&'static str>,
    },

    #[error("document '{0}' not found")]
    DocumentNotFound(String),

    #[error(transparent)]
    Rag(#[from] RagError),
}

impl AppError {
    pub fn bad_request(message: impl Into<String>, path: &'static str) -> Self {
        AppError::BadRequest {
            message: message.into(),
            path: Some(path),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::DocumentNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Rag(RagError::Config(_)) => StatusCode::BAD_REQUEST,
            AppError::Rag(RagError::QueueClosed(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Rag(RagError::Search(_) | RagError::Embedding(_)) => StatusCode::BAD_GATEWAY,
            AppError::Rag(_)
            | AppError::Llm(_)
            | AppError::Router(_)
            | AppError::Bind { .. }
            | AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            AppError::Llm(_) => "LLM_CONFIG_ERROR",
            AppError::Router(_) => "ROUTER_CONFIG_ERROR",
            AppError::Bind { .. } => "BIND_ERROR",
            AppError::Server(_) => "SERVER_ERROR",
            AppError::BadRequest { .. } => "BAD_REQUEST",
            AppError::DocumentNotFound(_) => "DOCUMENT_NOT_FOUND",
            AppError::Rag(RagError::Registry(_)) => "REGISTRY_ERROR",
            AppError::Rag(RagError::QueueClosed(_)) => "QUEUE_UNAVAILABLE",
            AppError::Rag(_) => "RAG_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let details = match &self {
            AppError::BadRequest { path: Some(p), .. } => vec![ApiErrorDetail {
                path: Some((*p).to_string()),
                hint: None,
            }],
            _ => Vec::new(),
        };
        ApiResponse::<()>::error(self.error_code(), self.to_string(), details).with_status(status)
    }
}

/// Handy result alias used across handlers.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let r = AppError::DocumentNotFound("x".into()).into_response();
        assert_eq!(r.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn config_errors_are_client_errors() {
        let r = AppError::Rag(RagError::Config("bad".into())).into_response();
        assert_eq!(r.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn stopped_queue_is_a_server_fault() {
        let e = AppError::Rag(RagError::QueueClosed("dropped run for 1".into()));
        assert_eq!(e.error_code(), "QUEUE_UNAVAILABLE");
        assert_eq!(e.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
