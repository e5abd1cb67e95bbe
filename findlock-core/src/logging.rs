//! Structured logging using **tracing**.
//!
//! Library code emits `tracing` events (per parsed dump, per lock group,
//! per skipped wait entry); the binary decides where they go. The JSON
//! subscriber writes them to stderr so stdout stays clean for the report.

use tracing::{error, info, warn};

/// Initializes the global tracing collector (subscriber).
///
/// This should be called *once* at the beginning of the application's runtime.
/// It configures structured JSON output to stderr.
///
/// # Environment Variables
/// - `RUST_LOG`: Controls log filtering (e.g., `RUST_LOG=findlock_core=debug`)
pub fn init_structured_logging() {
    tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_level(true)
        .with_target(true)
        .with_current_span(true)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}

/// Logs a warning event.
pub fn log_warn(message: &str) {
    warn!(detail = %message);
}

/// Logs an info event.
pub fn log_info(message: &str) {
    info!(detail = %message);
}

/// Logs an error event.
pub fn log_error(message: &str) {
    error!(detail = %message);
}
