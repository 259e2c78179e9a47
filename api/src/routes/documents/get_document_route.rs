//! GET /documents/{file_id}: registry record and indexing status.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};

use crate::{
    core::{app_state::AppState, http::response_envelope::ApiResponse},
    error_handler::{AppError, AppResult},
    routes::documents::document_request::DocumentView,
};

pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> AppResult<Json<ApiResponse<DocumentView>>> {
    let doc = state
        .rag
        .document(&file_id)
        .await?
        .ok_or_else(|| AppError::DocumentNotFound(file_id.clone()))?;
    let index_name = state.rag.index().index_name(&doc.file_id, &doc.file_name);
    Ok(Json(ApiResponse::success(DocumentView::new(doc, index_name))))
}
