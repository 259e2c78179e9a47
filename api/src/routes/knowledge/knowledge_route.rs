//! Knowledge-collection membership.
//!
//! Adding a document always schedules a fresh indexing run. Removing it drops
//! the document's vector index once no collection references it.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use serde::Serialize;
use tracing::{info, instrument};

use crate::{
    core::{app_state::AppState, http::response_envelope::ApiResponse},
    error_handler::{AppError, AppResult},
};

#[derive(Debug, Serialize)]
pub struct MembershipResponse {
    pub collection: String,
    pub file_id: String,
    /// POST: a run was scheduled. DELETE: the membership existed.
    pub changed: bool,
}

/// Handler: POST /knowledge/{collection}/files/{file_id}
#[instrument(skip(state))]
pub async fn add_to_collection(
    State(state): State<Arc<AppState>>,
    Path((collection, file_id)): Path<(String, String)>,
) -> AppResult<Response> {
    if state.rag.document(&file_id).await?.is_none() {
        return Err(AppError::DocumentNotFound(file_id));
    }
    state.rag.add_to_collection(&collection, &file_id).await?;
    info!("re-indexing scheduled");

    let body = MembershipResponse {
        collection,
        file_id,
        changed: true,
    };
    Ok(ApiResponse::success(body).with_status(StatusCode::ACCEPTED))
}

/// Handler: DELETE /knowledge/{collection}/files/{file_id}
#[instrument(skip(state))]
pub async fn remove_from_collection(
    State(state): State<Arc<AppState>>,
    Path((collection, file_id)): Path<(String, String)>,
) -> AppResult<Response> {
    let removed = state.rag.remove_from_collection(&collection, &file_id).await?;
    let body = MembershipResponse {
        collection,
        file_id,
        changed: removed,
    };
    Ok(ApiResponse::success(body).with_status(StatusCode::OK))
}
