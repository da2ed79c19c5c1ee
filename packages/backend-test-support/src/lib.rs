//! Backend test support utilities
//!
//! Shared by the backend's unit and integration tests: idempotent logging
//! initialization, settings fixtures and throwaway SQLite databases.

pub mod logging;
pub mod settings;
pub mod sqlite;

pub use settings::EnvFixture;
pub use sqlite::TempSqlite;
