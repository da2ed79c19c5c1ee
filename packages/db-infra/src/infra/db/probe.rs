//! Connectivity probes. These report failures as `false` and never return an
//! error; everything else in the crate propagates.

use tracing::{error, info};

use crate::config::db::EngineConfig;
use crate::config::url::Dialect;
use crate::error::DbInfraError;
use crate::infra::db::core::Engine;

/// SQL Server version banners run to several lines; only the head is logged.
const SQL_SERVER_VERSION_LOG_CHARS: usize = 50;

/// Open a session, run a trivial query and log the server version.
pub async fn probe(engine: &Engine) -> bool {
    match round_trip(engine).await {
        Ok(version) => {
            info!(
                engine = engine.dialect().engine_name(),
                version = %version_for_log(engine.dialect(), &version),
                "db=probe ok"
            );
            true
        }
        Err(e) => {
            error!(
                engine = engine.dialect().engine_name(),
                url = %engine.plan().url,
                error = %e,
                "db=probe failed"
            );
            false
        }
    }
}

/// Build a throwaway engine for `config` and probe it.
pub async fn probe_url(config: &EngineConfig) -> bool {
    let engine = match Engine::from_config(config) {
        Ok(engine) => engine,
        Err(e) => {
            error!(error = %e, "db=probe failed to build engine");
            return false;
        }
    };

    let ok = probe(&engine).await;
    if let Err(e) = engine.close().await {
        error!(error = %e, "db=probe failed to release pool");
    }
    ok
}

async fn round_trip(engine: &Engine) -> Result<String, DbInfraError> {
    engine
        .with_session(|s| {
            Box::pin(async move {
                s.execute_unprepared("SELECT 1").await?;
                Ok::<_, DbInfraError>(())
            })
        })
        .await?;
    engine.server_version().await
}

fn version_for_log(dialect: Dialect, version: &str) -> String {
    match dialect {
        Dialect::SqlServer(_) => version.chars().take(SQL_SERVER_VERSION_LOG_CHARS).collect(),
        _ => version.to_string(),
    }
}
