//! HTTP surface of the question store and the per-job push-streams

pub mod config;
pub mod error;
pub mod handlers;
pub mod maintenance;
pub mod relay;
pub mod state;

pub use config::ApiConfig;
pub use error::{AppError, AppResult};
pub use handlers::configure;
pub use state::AppState;

use tokio::task::JoinHandle;

/// Start the expiry and retention sweeper for `state`
pub fn spawn_background_tasks(state: &AppState) -> Vec<JoinHandle<()>> {
    vec![maintenance::spawn_sweeper(
        state.store.clone(),
        state.config.questions.sweep_interval(),
    )]
}
