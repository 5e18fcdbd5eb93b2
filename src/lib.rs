// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod insights;
pub mod knowledge;
pub mod logging;
pub mod matcher;
pub mod metrics;
pub mod prediction;
pub mod records;
pub mod store;
pub mod users;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::config::{AppConfig, ScoringConfig};
pub use crate::error::{AppError, PredictError};
pub use crate::knowledge::KnowledgeBase;
pub use crate::matcher::SymptomMatcher;
pub use crate::prediction::{Alternative, PredictionResult};

use axum::Router;
use tracing::info;

/// Build the full application from configuration on disk and the environment.
///
/// The Shuttle entrypoint and in-process tests share this path.
pub async fn app() -> anyhow::Result<Router> {
    let config = AppConfig::load()?;
    let state = AppState::from_config(config).await?;
    info!(
        diseases = state.matcher.knowledge().diseases().len(),
        "healthtrack ready"
    );
    Ok(router(state))
}
