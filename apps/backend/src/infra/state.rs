use std::sync::Arc;

use crate::config::settings::{get_settings, Settings};
use crate::error::AppError;
use crate::infra::db::{connect_db, init_db, test_connection};
use crate::state::app_state::AppState;

/// Builder for creating AppState instances (used in both tests and main)
pub struct StateBuilder {
    settings: Option<Arc<Settings>>,
    with_db: bool,
    init_schema: bool,
}

impl StateBuilder {
    pub fn new() -> Self {
        Self {
            settings: None,
            with_db: false,
            init_schema: false,
        }
    }

    /// Use these settings instead of the process-wide ones.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = Some(Arc::new(settings));
        self
    }

    pub fn with_db(mut self) -> Self {
        self.with_db = true;
        self
    }

    /// Create missing tables once the engine is built. Implies `with_db`.
    pub fn with_schema(mut self) -> Self {
        self.with_db = true;
        self.init_schema = true;
        self
    }

    pub async fn build(self) -> Result<AppState, AppError> {
        let settings = match self.settings {
            Some(settings) => settings,
            None => Arc::new(get_settings()?.clone()),
        };

        if !self.with_db {
            return Ok(AppState::without_db(settings));
        }

        let engine = connect_db(&settings)?;
        if self.init_schema {
            init_db(&engine).await?;
        } else {
            // Startup without schema creation still reports reachability.
            test_connection(&engine).await;
        }
        Ok(AppState::new(engine, settings))
    }
}

impl Default for StateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn build_state() -> StateBuilder {
    StateBuilder::new()
}

#[cfg(test)]
mod tests {
    use backend_test_support::{EnvFixture, TempSqlite};

    use super::*;

    fn settings(env: &EnvFixture) -> Settings {
        Settings::from_lookup(|k| env.get(k)).unwrap()
    }

    #[tokio::test]
    async fn test_build_succeeds_without_db_option() {
        let state = build_state()
            .with_settings(settings(&EnvFixture::new()))
            .build()
            .await
            .unwrap();
        assert!(state.db().is_none());
    }

    #[tokio::test]
    async fn test_build_with_schema() {
        let db = TempSqlite::new().unwrap();
        let env = EnvFixture::new().with("DATABASE_URL", &db.url());
        let state = build_state()
            .with_settings(settings(&env))
            .with_schema()
            .build()
            .await
            .unwrap();

        let engine = state.db().unwrap();
        assert_eq!(
            crate::infra::schema::existing_tables(engine).await.unwrap(),
            crate::infra::schema::KNOWN_TABLES
        );
    }
}
