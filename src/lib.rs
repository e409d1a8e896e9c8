//! Client library for the Kronos forecasting dashboard.
//!
//! The dashboard talks to the forecasting service over two paths:
//! - `channel`: a reconnecting WebSocket event channel that dispatches
//!   pushed messages (prediction progress, status) to listeners by name
//! - `api`: a REST client for model loading, dataset management and
//!   prediction runs
//!
//! `session` ties both together into the state a front end keeps, `config`
//! resolves endpoints and tunables from the environment, and `preferences`
//! persists user display settings.

pub mod api;
pub mod channel;
pub mod config;
pub mod preferences;
pub mod session;

#[cfg(test)]
mod testing;

const DEFAULT_LOG_FILTER: &str = "kronos_lib=debug,kronos_dashboard=debug,info";

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default
/// filter. Calling this more than once is harmless.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
