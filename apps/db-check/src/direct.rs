//! Direct driver check against Azure SQL, outside of any pool.

use std::time::Duration;

use db_infra::config::url::SqlServerTarget;
use db_infra::infra::db::sqlserver::{open_connection, tiberius_config, SqlServerClient};
use db_infra::DbInfraError;
use tracing::{debug, warn};

pub const DEFAULT_SERVER: &str = "your-server.database.windows.net";
pub const DEFAULT_DATABASE: &str = "medicalscribe";
pub const DEFAULT_USERNAME: &str = "sqladmin";

const PORT: u16 = 1433;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const VERSION_PRINT_CHARS: usize = 200;

const CREATE_SCRATCH_TABLE: &str = "\
IF NOT EXISTS (SELECT * FROM sys.tables WHERE name = 'test_connection')
CREATE TABLE test_connection (
    id INT IDENTITY(1,1) PRIMARY KEY,
    test_message NVARCHAR(100),
    created_at DATETIME2 DEFAULT GETDATE()
)";
const SCRATCH_MESSAGE: &str = "Connection test successful";
const INSERT_SCRATCH_ROW: &str = "INSERT INTO test_connection (test_message) VALUES (@P1)";
const SELECT_SCRATCH_ROWS: &str = "SELECT id, test_message FROM test_connection ORDER BY id";
const DROP_SCRATCH_TABLE: &str = "DROP TABLE test_connection";

#[derive(Clone, PartialEq, Eq)]
pub struct AzureSqlConfig {
    pub server: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl AzureSqlConfig {
    /// Read `AZURE_SQL_*` through `lookup`. Unset or blank values take the
    /// defaults; the password has none.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        Self {
            server: read("AZURE_SQL_SERVER", DEFAULT_SERVER),
            database: read("AZURE_SQL_DATABASE", DEFAULT_DATABASE),
            username: read("AZURE_SQL_USERNAME", DEFAULT_USERNAME),
            password: lookup("AZURE_SQL_PASSWORD").unwrap_or_default(),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn has_password(&self) -> bool {
        !self.password.is_empty()
    }

    pub fn masked_password(&self) -> String {
        "*".repeat(self.password.chars().count())
    }

    pub fn target(&self) -> SqlServerTarget {
        SqlServerTarget {
            host: self.server.clone(),
            port: PORT,
            database: Some(self.database.clone()),
            username: Some(self.username.clone()),
            password: Some(self.password.clone()),
            encrypt: true,
            trust_server_certificate: false,
        }
    }
}

impl std::fmt::Debug for AzureSqlConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureSqlConfig")
            .field("server", &self.server)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.masked_password())
            .finish()
    }
}

/// What the scratch round trip saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectReport {
    pub version: String,
    pub rows: Vec<(i32, String)>,
}

/// Connect, read the version banner and round-trip a scratch table.
pub async fn check(config: &AzureSqlConfig) -> Result<DirectReport, DbInfraError> {
    let tiberius = tiberius_config(&config.target(), Some("db-check"));
    let mut client = open_connection(tiberius, Some(CONNECT_TIMEOUT)).await?;
    println!("Connected to {}", config.server);

    let version = client
        .simple_query("SELECT @@VERSION")
        .await?
        .into_row()
        .await?
        .map(|row| row.try_get::<&str, _>(0).map(|v| v.map(str::to_owned)))
        .transpose()?
        .flatten()
        .unwrap_or_default();
    println!("SQL Server version: {}", head(&version, VERSION_PRINT_CHARS));

    let rows = scratch_round_trip(&mut client).await?;
    for (id, message) in &rows {
        println!("  row {id}: {message}");
    }

    client.close().await?;
    Ok(DirectReport { version, rows })
}

/// The statements the scratch round trip needs from a connection.
pub(crate) trait ScratchTable {
    async fn create(&mut self) -> Result<(), DbInfraError>;
    async fn insert(&mut self, message: &str) -> Result<(), DbInfraError>;
    async fn rows(&mut self) -> Result<Vec<(i32, String)>, DbInfraError>;
    async fn drop_table(&mut self) -> Result<(), DbInfraError>;
}

impl ScratchTable for SqlServerClient {
    async fn create(&mut self) -> Result<(), DbInfraError> {
        self.simple_query(CREATE_SCRATCH_TABLE).await?.into_results().await?;
        Ok(())
    }

    async fn insert(&mut self, message: &str) -> Result<(), DbInfraError> {
        self.execute(INSERT_SCRATCH_ROW, &[&message]).await?;
        Ok(())
    }

    async fn rows(&mut self) -> Result<Vec<(i32, String)>, DbInfraError> {
        let mut rows = Vec::new();
        for row in self
            .simple_query(SELECT_SCRATCH_ROWS)
            .await?
            .into_first_result()
            .await?
        {
            let Some(id) = row.try_get::<i32, _>(0)? else {
                continue;
            };
            let message = row.try_get::<&str, _>(1)?.unwrap_or_default().to_owned();
            rows.push((id, message));
        }
        Ok(rows)
    }

    async fn drop_table(&mut self) -> Result<(), DbInfraError> {
        self.simple_query(DROP_SCRATCH_TABLE).await?.into_results().await?;
        Ok(())
    }
}

/// Create the scratch table, write and read one row, then drop the table.
/// The table is dropped even when the write or read fails; that failure is
/// what gets reported.
pub(crate) async fn scratch_round_trip<S: ScratchTable>(
    store: &mut S,
) -> Result<Vec<(i32, String)>, DbInfraError> {
    store.create().await?;
    debug!("db_check=scratch_table ready");

    let outcome = write_and_read(store).await;
    let dropped = store.drop_table().await;

    match (outcome, dropped) {
        (Ok(rows), Ok(())) => {
            debug!("db_check=scratch_table dropped");
            Ok(rows)
        }
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(drop_err)) => {
            warn!(error = %drop_err, "db_check=scratch_table left behind");
            Err(e)
        }
    }
}

async fn write_and_read<S: ScratchTable>(
    store: &mut S,
) -> Result<Vec<(i32, String)>, DbInfraError> {
    store.insert(SCRATCH_MESSAGE).await?;
    store.rows().await
}

/// The first `limit` characters of `text`.
pub fn head(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
