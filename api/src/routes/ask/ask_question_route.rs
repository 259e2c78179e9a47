//! POST /ask: answers a question over the indexed documents.

use std::sync::Arc;

use axum::{Json, extract::State};
use contextor::AnswerResponse;
use tracing::instrument;

use crate::{
    core::app_state::AppState,
    error_handler::{AppError, AppResult},
    routes::ask::ask_request::AskRequest,
};

/// Handler: POST /ask
///
/// Always `200` once the question is accepted; router failures come back as
/// `success = false` with a `status` such as `NO_RELEVANT_DOCUMENTS`.
///
/// # Example
/// ```bash
/// curl -X POST http://127.0.0.1:8080/ask \
///   -H 'content-type: application/json' \
///   -d '{"question":"How many vacation days?","collection":"hr"}'
/// ```
#[instrument(name = "ask_question", skip(state, body))]
pub async fn ask_question(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AskRequest>,
) -> AppResult<Json<AnswerResponse>> {
    if body.question.trim().is_empty() {
        return Err(AppError::bad_request("question must not be empty", "question"));
    }
    let answer = state.router.answer(&body.question, body.options()).await;
    Ok(Json(answer))
}
