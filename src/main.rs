use anyhow::Context;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rainfall_qa::ax_state::AppState;
use rainfall_qa::config::AppConfig;
use rainfall_qa::infra::loader::load_csv_path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rainfall_qa=info,tower_http=info")),
        )
        .init();

    let state = Arc::new(AppState::new(config)?);

    // preload an optional dataset so the service is usable without an upload
    if let Some(path) = state.config.dataset.clone() {
        let table = load_csv_path(&path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_string());
        let session = state.sessions.create(name, table)?;
        info!(session = %session.id, path = %path.display(), "dataset preloaded");
    }

    let addr = state.config.bind_addr;
    let app = rainfall_qa::api::router(state);

    info!("rainfall Q&A service listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}
