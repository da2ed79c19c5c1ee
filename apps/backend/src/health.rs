use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::error::AppError;
use crate::infra::db::test_connection;
use crate::state::app_state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub app: String,
    pub environment: &'static str,
    pub database: DatabaseHealth,
}

#[derive(Debug, Serialize)]
pub struct DatabaseHealth {
    pub engine: Option<&'static str>,
    pub connected: bool,
}

/// 200 when the database answers (or none is configured), 503 otherwise.
async fn health(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let settings = state.settings();

    let database = match state.db() {
        Some(engine) => {
            if !test_connection(engine).await {
                return Err(AppError::db_unavailable(format!(
                    "{} did not answer the version query",
                    engine.dialect().engine_name()
                )));
            }
            DatabaseHealth {
                engine: Some(engine.dialect().engine_name()),
                connected: true,
            }
        }
        None => DatabaseHealth {
            engine: None,
            connected: false,
        },
    };

    Ok(HttpResponse::Ok().json(HealthReport {
        status: "ok",
        app: settings.app_name.clone(),
        environment: settings.app_env.as_str(),
        database,
    }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health));
}
