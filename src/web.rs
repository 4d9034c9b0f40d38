#![cfg(not(tarpaulin_include))]

use task_tracker::app;
use task_tracker::config::Settings;

/// Main entry point for the web application
///
/// Reads the `TRACKER_*` settings from the environment and serves the
/// dashboard, board, creation form and history pages.
///
/// # Logging
/// * Controlled by `RUST_LOG`, `info` when unset
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::from_env()?;
    app::run(settings).await
}
