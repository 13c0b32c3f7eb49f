pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod algorithms;
pub mod utils;

pub use config::Config;
pub use error::{RecResult, RecommenderError};
pub use models::*;

use anyhow::Result;
use std::sync::Arc;

/// Shared state of the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub serving: Arc<services::serving::ServingService>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let serving = services::serving::ServingService::load(&config)?;
        Ok(Self::with_service(config, serving))
    }

    pub fn with_service(config: Config, serving: services::serving::ServingService) -> Self {
        Self {
            config: Arc::new(config),
            serving: Arc::new(serving),
        }
    }
}

/// Installs the global `tracing` subscriber, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
