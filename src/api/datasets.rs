use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::ax_state::AppState;
use crate::infra::loader::load_csv_str;
use crate::infra::utils::rows_to_json;
use crate::models::context::{CreateDatasetRequest, PreviewQuery};

const DEFAULT_PREVIEW: usize = 20;
const MAX_PREVIEW: usize = 500;

/// Ingest an uploaded CSV and open a session over it.
pub async fn create_dataset(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDatasetRequest>,
) -> Response {
    let table = match load_csv_str(&payload.csv) {
        Ok(t) => t,
        Err(e) => {
            let reason = format!("{:#}", e);
            warn!(%reason, "rejected upload");
            return (StatusCode::UNPROCESSABLE_ENTITY, reason).into_response();
        }
    };
    let name = payload
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "dataset".to_string());

    match state.sessions.create(name, table) {
        Ok(session) => (StatusCode::CREATED, Json(session.summary())).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)).into_response(),
    }
}

pub async fn list_datasets(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.sessions.list())
}

pub async fn preview_dataset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<PreviewQuery>,
) -> Response {
    let Some(session) = state.sessions.get(&id) else {
        return (StatusCode::NOT_FOUND, format!("unknown session {}", id)).into_response();
    };
    let limit = params.limit.unwrap_or(DEFAULT_PREVIEW).min(MAX_PREVIEW);
    Json(json!({
        "dataset": session.summary(),
        "rows": rows_to_json(&session.table, limit),
    }))
    .into_response()
}

pub async fn delete_dataset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> StatusCode {
    if state.sessions.remove(&id) {
        info!(%id, "dataset deleted");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
