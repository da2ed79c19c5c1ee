#![deny(clippy::wildcard_imports)]
#![cfg_attr(test, allow(clippy::wildcard_imports))]

//! Medical-scribe service backend: settings, telemetry, database bootstrap
//! and the HTTP health surface.

pub mod config;
pub mod entities;
pub mod error;
pub mod health;
pub mod infra;
pub mod middleware;
pub mod state;
pub mod telemetry;

#[cfg(test)]
pub mod test_bootstrap;

// Re-exports for public API
pub use config::db::engine_config;
pub use config::settings::{get_settings, AppEnv, LogFormat, Settings};
pub use error::AppError;
pub use infra::db::{connect_db, get_db, init_db, test_connection};
pub use middleware::cors::cors_middleware;
pub use state::app_state::AppState;

// Auto-initialize logging for unit tests
#[cfg(test)]
#[ctor::ctor]
fn init_test_logging() {
    test_bootstrap::logging::init();
}
