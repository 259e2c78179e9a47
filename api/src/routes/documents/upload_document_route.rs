//! POST /documents: registers an uploaded document and schedules indexing.

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::Response};
use rag_store::SourceDocument;
use tracing::{info, instrument};

use crate::{
    core::{app_state::AppState, http::response_envelope::ApiResponse},
    error_handler::{AppError, AppResult},
    routes::documents::document_request::{DocumentView, UploadDocumentRequest},
};

/// Handler: POST /documents
///
/// Responds `202 Accepted` as soon as the document is stored; indexing runs
/// in the background and its outcome shows up on GET /documents/{file_id}.
///
/// # Example
/// ```bash
/// curl -X POST http://127.0.0.1:8080/documents \
///   -H 'content-type: application/json' \
///   -d '{"file_id":"42","file_name":"handbook.pdf","extracted_text":"..."}'
/// ```
#[instrument(name = "upload_document", skip(state, body), fields(file_id = %body.file_id))]
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UploadDocumentRequest>,
) -> AppResult<Response> {
    if body.file_id.trim().is_empty() {
        return Err(AppError::bad_request("file_id must not be empty", "file_id"));
    }
    if body.file_name.trim().is_empty() {
        return Err(AppError::bad_request("file_name must not be empty", "file_name"));
    }

    let file_type = body.resolved_type();
    let doc = SourceDocument::new(
        body.file_id.trim(),
        body.file_name.trim(),
        file_type,
        body.extracted_text,
        body.uploaded_by,
    );
    let doc = state.rag.upload(doc).await?;
    info!(file_name = %doc.file_name, "document accepted for indexing");

    let index_name = state.rag.index().index_name(&doc.file_id, &doc.file_name);
    Ok(ApiResponse::success(DocumentView::new(doc, index_name)).with_status(StatusCode::ACCEPTED))
}

