use std::sync::Arc;

use db_infra::Engine;

use crate::config::settings::Settings;

/// Application state shared by every worker.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Database engine (absent for handlers tested without a database)
    db: Option<Engine>,
    settings: Arc<Settings>,
}

impl AppState {
    pub fn new(db: Engine, settings: Arc<Settings>) -> Self {
        Self {
            db: Some(db),
            settings,
        }
    }

    pub fn without_db(settings: Arc<Settings>) -> Self {
        Self { db: None, settings }
    }

    pub fn db(&self) -> Option<&Engine> {
        self.db.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}
