//! HTTP boundary of the document QA backend.

use std::{env, sync::Arc};

mod core;
mod error_handler;
mod middleware_layer;
mod routes;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tokio::signal;
use tracing::{info, warn};

pub use crate::core::app_state::AppState;
pub use crate::error_handler::AppError;

use crate::{
    middleware_layer::json_extractor::json_error_mapper,
    routes::{
        ask::ask_question_route::ask_question,
        documents::{get_document_route::get_document, upload_document_route::upload_document},
        health_route::health,
        knowledge::knowledge_route::{add_to_collection, remove_from_collection},
    },
};

const DEFAULT_ADDRESS: &str = "0.0.0.0:8080";

/// All routes over a shared state.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/documents", post(upload_document))
        .route("/documents/{file_id}", get(get_document))
        .route(
            "/knowledge/{collection}/files/{file_id}",
            post(add_to_collection).delete(remove_from_collection),
        )
        .route("/ask", post(ask_question))
        .layer(middleware::from_fn(json_error_mapper))
        .with_state(Arc::new(state))
}

/// Builds state from the environment and serves until Ctrl+C.
pub async fn start() -> Result<(), AppError> {
    let addr = env::var("API_ADDRESS").unwrap_or_else(|_| DEFAULT_ADDRESS.to_string());
    let state = AppState::from_env().await?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| AppError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!(%addr, "listening");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(AppError::Server)?;

    info!("server stopped");
    Ok(())
}

/// Resolves when Ctrl+C is pressed.
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ai_llm_service::{ChatMessage, ChatReply};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use contextor::{ChatFuture, ChatModel, RouterConfig};
    use rag_store::{
        HashEmbedder, InMemoryRegistry, InMemoryVectorStore, RagConfig, RagStore, VectorBackend,
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;

    struct FixedChat;

    impl ChatModel for FixedChat {
        fn chat<'a>(&'a self, _messages: &'a [ChatMessage], _max_tokens: Option<u32>) -> ChatFuture<'a> {
            Box::pin(async { ChatReply::ok(r#"{"answer": "Twenty days."}"#) })
        }
    }

    fn state() -> AppState {
        let cfg = RagConfig {
            backend: VectorBackend::Memory,
            embedding_dim: 32,
            registry_url: "memory".into(),
            ..RagConfig::default()
        };
        let rag = RagStore::new(
            cfg,
            Arc::new(HashEmbedder::new(32)),
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(InMemoryRegistry::new()),
        )
        .unwrap();
        let router = contextor::Router::new(rag.clone(), Arc::new(FixedChat), RouterConfig::default())
            .unwrap();
        AppState::new(rag, router)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn upload_is_accepted_then_indexed() {
        let s = state();
        let mut rx = s.rag.queue().subscribe();
        let app = app(s);

        let (status, body) = call(
            &app,
            "POST",
            "/documents",
            Some(json!({"file_id": "1", "file_name": "handbook.txt", "extracted_text": "twenty vacation days"})),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["data"]["indexing_status"], "pending_index");

        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let (status, body) = call(&app, "GET", "/documents/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["indexing_status"], "indexed");
    }

    #[tokio::test]
    async fn ask_without_documents_reports_no_relevant_documents() {
        let app = app(state());
        let (status, body) = call(&app, "POST", "/ask", Some(json!({"question": "anything?"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["status"], "NO_RELEVANT_DOCUMENTS");
    }

    #[tokio::test]
    async fn unknown_document_is_404_in_envelope() {
        let app = app(state());
        let (status, body) = call(&app, "POST", "/knowledge/hr/files/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "DOCUMENT_NOT_FOUND");
    }

    #[tokio::test]
    async fn malformed_body_is_wrapped() {
        let app = app(state());
        let (status, body) = call(&app, "POST", "/documents", Some(json!({"file_id": "1"}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["details"][0]["path"], "file_name");
    }
}
