pub mod chat;
pub mod datasets;

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::ax_state::AppState;
use chat::{chat_history, chat_query};
use datasets::{create_dataset, delete_dataset, list_datasets, preview_dataset};

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/datasets", post(create_dataset).get(list_datasets))
        .route("/api/datasets/{id}", delete(delete_dataset))
        .route("/api/datasets/{id}/preview", get(preview_dataset))
        .route("/api/datasets/{id}/history", get(chat_history))
        .route("/api/chat", post(chat_query))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
