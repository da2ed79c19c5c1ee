//! Database engine construction shared by the backend and the connectivity check.
//! Parses connection strings, derives driver options and pool policy, and hands
//! out scoped sessions.

pub mod config;
pub mod error;
pub mod infra;

pub use config::db::{build_engine_plan, ConnectArgs, EngineConfig, EnginePlan, PoolPolicy};
pub use config::url::{sanitize_db_url, DbUrl, Dialect, SqlServerDriver, SqliteTarget, Target};
pub use error::DbInfraError;
pub use infra::db::core::Engine;
pub use infra::db::probe::{probe, probe_url};
pub use infra::db::session::{Session, SessionStats};
