use std::time::Duration;

use crate::config::url::{Dialect, DbUrl, SqlServerDriver, SqliteTarget, Target};
use crate::error::DbInfraError;

pub const DEFAULT_POOL_SIZE: u32 = 5;
pub const DEFAULT_MAX_OVERFLOW: u32 = 10;
/// Login timeout used by the ODBC-style SQL Server option set.
pub const ODBC_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const TDS_VERSION: &str = "7.4";
pub const TDS_CHARSET: &str = "UTF-8";
/// Statement enabling foreign-key enforcement; SQLite leaves it off per connection.
pub const SQLITE_FOREIGN_KEYS_PRAGMA: &str = "PRAGMA foreign_keys = ON;";

/// Caller-facing knobs for building an engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub url: String,
    pub pool_size: u32,
    pub max_overflow: u32,
    /// Log every statement the driver sends.
    pub echo: bool,
    /// Running under the "testing" environment.
    pub testing: bool,
    pub application_name: Option<String>,
}

impl EngineConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool_size: DEFAULT_POOL_SIZE,
            max_overflow: DEFAULT_MAX_OVERFLOW,
            echo: false,
            testing: false,
            application_name: None,
        }
    }

    pub fn with_pool(mut self, pool_size: u32, max_overflow: u32) -> Self {
        self.pool_size = pool_size;
        self.max_overflow = max_overflow;
        self
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn with_testing(mut self, testing: bool) -> Self {
        self.testing = testing;
        self
    }

    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }
}

/// Driver-specific options applied when a physical connection is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectArgs {
    Default,
    /// Local SQLite file: open in serialized mode so one connection may be
    /// handed between threads.
    Sqlite { shared_across_threads: bool },
    Odbc { timeout: Duration },
    Tds {
        tds_version: &'static str,
        charset: &'static str,
    },
}

impl ConnectArgs {
    pub fn connect_timeout(&self) -> Option<Duration> {
        match self {
            ConnectArgs::Odbc { timeout } => Some(*timeout),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolPolicy {
    /// Every session opens its own physical connection and closes it on release.
    Unpooled,
    /// Exactly one connection, opened once and never recycled.
    SingleStatic,
    Sized {
        size: u32,
        max_overflow: u32,
        /// Validate a pooled connection before handing it out.
        pre_ping: bool,
    },
}

impl PoolPolicy {
    pub fn max_connections(&self) -> Option<u32> {
        match self {
            PoolPolicy::Unpooled => None,
            PoolPolicy::SingleStatic => Some(1),
            PoolPolicy::Sized {
                size, max_overflow, ..
            } => Some(size.saturating_add(*max_overflow)),
        }
    }

    pub fn pre_ping(&self) -> bool {
        matches!(self, PoolPolicy::Sized { pre_ping: true, .. })
    }
}

/// Everything needed to construct an engine, computed without touching the
/// network. `post_connect` runs on every new physical connection of the
/// engine built from this plan and nowhere else.
#[derive(Debug, Clone)]
pub struct EnginePlan {
    pub url: DbUrl,
    pub connect_args: ConnectArgs,
    pub pool: PoolPolicy,
    pub post_connect: Vec<String>,
    pub echo: bool,
    pub application_name: Option<String>,
}

impl EnginePlan {
    pub fn dialect(&self) -> Dialect {
        self.url.dialect()
    }
}

pub fn build_engine_plan(config: &EngineConfig) -> Result<EnginePlan, DbInfraError> {
    let url = DbUrl::parse(&config.url)?;
    let dialect = url.dialect();

    let pool = pool_policy(dialect, config)?;
    let connect_args = connect_args(&url);
    let post_connect = build_session_statements(dialect, config.application_name.as_deref());

    Ok(EnginePlan {
        url,
        connect_args,
        pool,
        post_connect,
        echo: config.echo,
        application_name: config.application_name.clone(),
    })
}

pub fn connect_args(url: &DbUrl) -> ConnectArgs {
    match (url.dialect(), url.target()) {
        (Dialect::SqlServer(SqlServerDriver::Odbc), _) => ConnectArgs::Odbc {
            timeout: ODBC_CONNECT_TIMEOUT,
        },
        (Dialect::SqlServer(SqlServerDriver::Tds), _) => ConnectArgs::Tds {
            tds_version: TDS_VERSION,
            charset: TDS_CHARSET,
        },
        (Dialect::Sqlite, Target::Sqlite(SqliteTarget::File(_))) => ConnectArgs::Sqlite {
            shared_across_threads: true,
        },
        _ => ConnectArgs::Default,
    }
}

pub fn pool_policy(dialect: Dialect, config: &EngineConfig) -> Result<PoolPolicy, DbInfraError> {
    match config.pool_size.checked_add(config.max_overflow) {
        Some(0) => {
            return Err(DbInfraError::config(
                "pool_size + max_overflow must allow at least one connection",
            ))
        }
        None => {
            return Err(DbInfraError::config(format!(
                "pool_size {} + max_overflow {} exceeds {}",
                config.pool_size,
                config.max_overflow,
                u32::MAX
            )))
        }
        Some(_) => {}
    }

    let sized = |pre_ping| PoolPolicy::Sized {
        size: config.pool_size,
        max_overflow: config.max_overflow,
        pre_ping,
    };

    Ok(match (dialect, config.testing) {
        (Dialect::SqlServer(_), true) => PoolPolicy::Unpooled,
        (Dialect::SqlServer(_), false) => sized(true),
        (Dialect::Sqlite | Dialect::Postgres, true) => PoolPolicy::SingleStatic,
        (Dialect::Sqlite | Dialect::Postgres, false) => sized(false),
    })
}

/// Build ordered per-connection SQL statements for the given dialect.
pub fn build_session_statements(dialect: Dialect, application_name: Option<&str>) -> Vec<String> {
    match dialect {
        Dialect::Sqlite => vec![SQLITE_FOREIGN_KEYS_PRAGMA.to_string()],
        Dialect::Postgres => {
            let mut stmts = Vec::new();
            if let Some(name) = application_name {
                // application_name is safe to single-quote; minimal escaping
                stmts.push(format!(
                    "SET application_name = '{}';",
                    name.replace('\'', "''")
                ));
            }
            stmts.push("SET timezone = 'UTC';".to_string());
            stmts
        }
        Dialect::SqlServer(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_odbc_url_gets_timeout_only_options() {
        let plan = build_engine_plan(&EngineConfig::new(
            "mssql+pyodbc://u:p@scribe.database.windows.net:1433/db?driver=ODBC+Driver+18+for+SQL+Server",
        ))
        .unwrap();
        assert_eq!(
            plan.connect_args,
            ConnectArgs::Odbc {
                timeout: Duration::from_secs(30)
            }
        );
        assert_eq!(plan.connect_args.connect_timeout(), Some(ODBC_CONNECT_TIMEOUT));
    }

    #[test]
    fn test_pymssql_url_gets_tds_options() {
        let plan =
            build_engine_plan(&EngineConfig::new("mssql+pymssql://u:p@host:1433/db")).unwrap();
        assert_eq!(
            plan.connect_args,
            ConnectArgs::Tds {
                tds_version: "7.4",
                charset: "UTF-8"
            }
        );
        assert_eq!(plan.connect_args.connect_timeout(), None);
    }

    #[test]
    fn test_sql_server_pool_policy() {
        let cfg = EngineConfig::new("mssql+pyodbc://u:p@host/db").with_pool(3, 7);
        let plan = build_engine_plan(&cfg).unwrap();
        assert_eq!(
            plan.pool,
            PoolPolicy::Sized {
                size: 3,
                max_overflow: 7,
                pre_ping: true
            }
        );
        assert_eq!(plan.pool.max_connections(), Some(10));

        let plan = build_engine_plan(&cfg.with_testing(true)).unwrap();
        assert_eq!(plan.pool, PoolPolicy::Unpooled);
    }

    #[test]
    fn test_sqlite_pool_policy() {
        let cfg = EngineConfig::new("sqlite:///./scribe.db");
        let plan = build_engine_plan(&cfg).unwrap();
        assert_eq!(
            plan.pool,
            PoolPolicy::Sized {
                size: DEFAULT_POOL_SIZE,
                max_overflow: DEFAULT_MAX_OVERFLOW,
                pre_ping: false
            }
        );

        let plan = build_engine_plan(&cfg.with_testing(true)).unwrap();
        assert_eq!(plan.pool, PoolPolicy::SingleStatic);
        assert_eq!(plan.pool.max_connections(), Some(1));
    }

    #[test]
    fn test_sqlite_file_shares_connection_across_threads() {
        let plan = build_engine_plan(&EngineConfig::new("sqlite:///./scribe.db")).unwrap();
        assert_eq!(
            plan.connect_args,
            ConnectArgs::Sqlite {
                shared_across_threads: true
            }
        );

        let plan = build_engine_plan(&EngineConfig::new("sqlite://")).unwrap();
        assert_eq!(plan.connect_args, ConnectArgs::Default);
    }

    #[test]
    fn test_foreign_key_pragma_only_for_sqlite() {
        let sqlite = build_engine_plan(&EngineConfig::new("sqlite:///./scribe.db")).unwrap();
        assert_eq!(sqlite.post_connect, vec![SQLITE_FOREIGN_KEYS_PRAGMA.to_string()]);

        for url in ["mssql+pyodbc://u:p@h/db", "mssql+pymssql://u:p@h/db"] {
            let plan = build_engine_plan(&EngineConfig::new(url)).unwrap();
            assert!(plan.post_connect.is_empty(), "{url}");
        }

        let pg = build_engine_plan(&EngineConfig::new("postgresql://u:p@h/db")).unwrap();
        assert!(pg.post_connect.iter().all(|s| !s.contains("PRAGMA")));
    }

    #[test]
    fn test_postgres_session_statements_escape_app_name() {
        let stmts = build_session_statements(Dialect::Postgres, Some("o'brien"));
        assert_eq!(stmts[0], "SET application_name = 'o''brien';");
        assert_eq!(stmts[1], "SET timezone = 'UTC';");
    }

    #[test]
    fn test_empty_pool_is_rejected() {
        let err = build_engine_plan(&EngineConfig::new("sqlite://").with_pool(0, 0)).unwrap_err();
        assert!(matches!(err, DbInfraError::Config { .. }));
    }

    #[test]
    fn test_overflowing_pool_size_is_rejected() {
        let err = build_engine_plan(&EngineConfig::new("sqlite://").with_pool(u32::MAX, 1))
            .unwrap_err();
        assert!(matches!(err, DbInfraError::Config { .. }));

        let plan =
            build_engine_plan(&EngineConfig::new("sqlite:///tmp/x.db").with_pool(u32::MAX, 0))
                .unwrap();
        assert_eq!(plan.pool.max_connections(), Some(u32::MAX));
    }

    #[test]
    fn test_echo_is_carried() {
        let plan = build_engine_plan(&EngineConfig::new("sqlite://").with_echo(true)).unwrap();
        assert!(plan.echo);
    }
}
