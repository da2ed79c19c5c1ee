//! Manual connectivity check for the Azure SQL database behind the backend.
//!
//! Talks to the server directly first, then through the same engine the
//! backend builds from `DATABASE_URL`. Exits 0 only when both succeed.

mod direct;
mod troubleshoot;

use std::process::ExitCode;

use db_infra::{sanitize_db_url, Engine, EngineConfig};
use tracing::{error, info};

use crate::direct::{head, AzureSqlConfig};

const VERSION_PRINT_CHARS: usize = 200;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stdout)
        .without_time()
        .with_target(false)
        .with_env_filter("db_check=info,db_infra=info,sqlx=warn,tiberius=warn")
        .init();

    // A missing .env is fine; the process environment may carry everything.
    dotenvy::dotenv().ok();

    if !direct_stage().await {
        return ExitCode::FAILURE;
    }
    if !engine_stage().await {
        return ExitCode::FAILURE;
    }

    println!("All connectivity checks passed");
    ExitCode::SUCCESS
}

async fn direct_stage() -> bool {
    let config = AzureSqlConfig::from_env();

    println!("Testing Azure SQL connection");
    println!("  Server:   {}", config.server);
    println!("  Database: {}", config.database);
    println!("  Username: {}", config.username);
    println!("  Password: {}", config.masked_password());

    if !config.has_password() {
        println!("AZURE_SQL_PASSWORD is not set");
        return false;
    }

    match direct::check(&config).await {
        Ok(report) => {
            info!(
                version = %head(&report.version, 50),
                rows = report.rows.len(),
                "db_check=direct ok"
            );
            println!("Direct connection test passed");
            true
        }
        Err(e) => {
            error!(error = %e, "db_check=direct failed");
            println!("Connection failed: {e}");
            troubleshoot::print_hints(&e.to_string());
            false
        }
    }
}

async fn engine_stage() -> bool {
    let Some(url) = std::env::var("DATABASE_URL").ok().filter(|u| !u.trim().is_empty()) else {
        println!("DATABASE_URL is not set");
        return false;
    };
    println!("Testing engine connection: {}", sanitize_db_url(&url));

    let config = EngineConfig::new(url).with_application_name("db-check");
    let engine = match Engine::from_config(&config) {
        Ok(engine) => engine,
        Err(e) => {
            println!("Engine could not be built: {e}");
            return false;
        }
    };

    let outcome = engine.server_version().await;
    if let Err(e) = engine.close().await {
        error!(error = %e, "db_check=engine close failed");
    }

    match outcome {
        Ok(version) => {
            println!("Engine connection OK: {}", head(&version, VERSION_PRINT_CHARS));
            true
        }
        Err(e) => {
            println!("Engine connection failed: {e}");
            troubleshoot::print_hints(&e.to_string());
            false
        }
    }
}
