pub mod api;
pub mod config;
pub mod core;
pub mod infra;
pub mod models;
pub mod service;

pub mod ax_state {
    use crate::config::AppConfig;
    use crate::core::pipeline::Pipeline;
    use crate::service::session::SessionRegistry;

    pub struct AppState {
        pub sessions: SessionRegistry,
        pub pipeline: Pipeline,
        pub config: AppConfig,
    }

    impl AppState {
        pub fn new(config: AppConfig) -> anyhow::Result<Self> {
            Ok(Self {
                sessions: SessionRegistry::new(config.lexicon.clone()),
                pipeline: Pipeline::new(config.format.clone())?,
                config,
            })
        }
    }
}
