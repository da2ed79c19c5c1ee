//! Settings-bound database entry points used by the rest of the service.

use db_infra::{probe, Engine, Session};
use tracing::info;

use crate::config::db::engine_config;
use crate::config::settings::Settings;
use crate::error::AppError;
use crate::infra::schema;

/// Build the engine for `settings.database_url`. No connection is opened
/// here; an unreachable server surfaces on first use.
pub fn connect_db(settings: &Settings) -> Result<Engine, AppError> {
    let engine = Engine::from_config(&engine_config(settings))?;

    let driver = match engine.dialect() {
        db_infra::Dialect::SqlServer(db_infra::SqlServerDriver::Odbc) => "odbc",
        db_infra::Dialect::SqlServer(db_infra::SqlServerDriver::Tds) => "tds",
        _ => "sqlx",
    };
    info!(
        engine = engine.dialect().engine_name(),
        driver = driver,
        env = settings.app_env.as_str(),
        "db=engine_ready"
    );
    Ok(engine)
}

/// One session per call. The session is closed by `Session::close` or, at the
/// latest, when it is dropped; `Engine::with_session` scopes both.
pub async fn get_db(engine: &Engine) -> Result<Session, AppError> {
    Ok(engine.session().await?)
}

/// Create every known table that does not exist yet.
pub async fn init_db(engine: &Engine) -> Result<(), AppError> {
    schema::create_all(engine).await?;
    info!(
        engine = engine.dialect().engine_name(),
        tables = ?schema::KNOWN_TABLES,
        "db=init tables ready"
    );
    Ok(())
}

/// True when the database answers a version query. Never fails.
pub async fn test_connection(engine: &Engine) -> bool {
    probe(engine).await
}
