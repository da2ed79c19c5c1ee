//! "Create all known tables if missing".
//!
//! SQLite and Postgres DDL is generated from the SeaORM entities. SQL Server
//! is not a SeaORM backend here, so it gets equivalent T-SQL guarded by
//! `sys.tables` lookups.

use db_infra::Engine;
use sea_orm::{ConnectionTrait, Schema};
use tracing::debug;

use crate::entities::{Encounters, Transcripts};
use crate::error::AppError;

/// Parents before children.
pub const KNOWN_TABLES: [&str; 2] = ["encounters", "transcripts"];

const SQL_SERVER_DDL: [&str; 2] = [
    "IF NOT EXISTS (SELECT 1 FROM sys.tables WHERE name = 'encounters')
CREATE TABLE encounters (
    id INT IDENTITY(1,1) NOT NULL PRIMARY KEY,
    patient_ref NVARCHAR(255) NOT NULL,
    clinician_name NVARCHAR(255) NULL,
    status NVARCHAR(64) NOT NULL,
    created_at DATETIMEOFFSET NOT NULL,
    updated_at DATETIMEOFFSET NOT NULL
);",
    "IF NOT EXISTS (SELECT 1 FROM sys.tables WHERE name = 'transcripts')
CREATE TABLE transcripts (
    id INT IDENTITY(1,1) NOT NULL PRIMARY KEY,
    encounter_id INT NOT NULL,
    content NVARCHAR(MAX) NOT NULL,
    audio_path NVARCHAR(1024) NULL,
    created_at DATETIMEOFFSET NOT NULL,
    CONSTRAINT fk_transcripts_encounter FOREIGN KEY (encounter_id)
        REFERENCES encounters (id) ON DELETE CASCADE
);",
];

pub async fn create_all(engine: &Engine) -> Result<(), AppError> {
    match engine.orm() {
        Some(db) => {
            let backend = db.get_database_backend();
            let schema = Schema::new(backend);

            let mut encounters = schema.create_table_from_entity(Encounters);
            let mut transcripts = schema.create_table_from_entity(Transcripts);
            for stmt in [
                encounters.if_not_exists(),
                transcripts.if_not_exists(),
            ] {
                db.execute(backend.build(&*stmt)).await?;
            }
        }
        None => {
            for ddl in SQL_SERVER_DDL {
                engine.execute_script(ddl).await?;
            }
        }
    }

    debug!(engine = engine.dialect().engine_name(), "schema=create_all done");
    Ok(())
}

/// Table names that exist on the engine, among [`KNOWN_TABLES`].
pub async fn existing_tables(engine: &Engine) -> Result<Vec<String>, AppError> {
    let sql = match engine.dialect() {
        db_infra::Dialect::Sqlite => {
            "SELECT group_concat(name, ',') FROM sqlite_master WHERE type = 'table'"
        }
        db_infra::Dialect::Postgres => {
            "SELECT string_agg(table_name, ',') FROM information_schema.tables \
             WHERE table_schema = current_schema()"
        }
        db_infra::Dialect::SqlServer(_) => {
            "SELECT STRING_AGG(CAST(name AS NVARCHAR(MAX)), ',') FROM sys.tables"
        }
    };

    let listed = engine
        .with_session(|s| Box::pin(async move { s.query_string(sql).await }))
        .await?
        .unwrap_or_default();

    Ok(KNOWN_TABLES
        .iter()
        .filter(|t| listed.split(',').any(|name| name == **t))
        .map(|t| t.to_string())
        .collect())
}
