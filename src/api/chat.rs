use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::ax_state::AppState;
use crate::models::context::{ChatRequest, ChatResponse};

/// Answer one question against a session's dataset and record the turn.
pub async fn chat_query(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Response {
    let Some(session) = state.sessions.get(&payload.session_id) else {
        return (StatusCode::NOT_FOUND, format!("unknown session {}", payload.session_id))
            .into_response();
    };
    let question = payload.query.trim();
    info!(session = %session.id, "question received");

    let outcome = state.pipeline.ask(&session.table, &session.catalogue, question);
    let prompt = payload
        .include_prompt
        .then(|| state.pipeline.prompt(question, &outcome, &session.table));

    session.record(question, &outcome.answer).await;
    Json(ChatResponse { answer: outcome.answer, prompt }).into_response()
}

pub async fn chat_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.sessions.get(&id) {
        Some(session) => Json(session.history().await).into_response(),
        None => (StatusCode::NOT_FOUND, format!("unknown session {}", id)).into_response(),
    }
}
