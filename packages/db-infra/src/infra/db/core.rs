use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use sea_orm::{ConnectionTrait, DatabaseConnection, SqlxPostgresConnector, SqlxSqliteConnector};
use sqlx::pool::PoolOptions;
use sqlx::postgres::PgConnectOptions;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::ConnectOptions;
use tracing::{debug, info, trace, warn};

use crate::config::db::{build_engine_plan, ConnectArgs, EngineConfig, EnginePlan, PoolPolicy};
use crate::config::url::{Dialect, SqliteTarget, Target};
use crate::error::DbInfraError;
use crate::infra::db::session::{Session, SessionStats};
use crate::infra::db::sqlserver::SqlServerPool;

/// A configured connection source for one database.
///
/// Construction never touches the network: physical connections are opened
/// on first use, so an unreachable server surfaces when a session first runs
/// a statement. Clones share the same pool and counters.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    plan: EnginePlan,
    backend: Backend,
    stats: Arc<SessionStats>,
    next_session_id: AtomicU64,
}

enum Backend {
    Orm(DatabaseConnection),
    SqlServer(SqlServerPool),
}

impl Engine {
    /// Build an engine from a plan. Must be called inside a Tokio runtime.
    pub fn connect(plan: EnginePlan) -> Result<Self, DbInfraError> {
        let backend = match plan.url.target() {
            Target::Sqlite(target) => Backend::Orm(connect_sqlite(&plan, target)?),
            Target::Postgres(url) => Backend::Orm(connect_postgres(&plan, url)?),
            Target::SqlServer(_) => Backend::SqlServer(SqlServerPool::build(&plan)?),
        };

        info!(
            engine = plan.dialect().engine_name(),
            url = %plan.url.redacted(),
            pool = ?plan.pool,
            connect_args = ?plan.connect_args,
            "pool=create"
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                plan,
                backend,
                stats: Arc::new(SessionStats::default()),
                next_session_id: AtomicU64::new(1),
            }),
        })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, DbInfraError> {
        Self::connect(build_engine_plan(config)?)
    }

    pub fn plan(&self) -> &EnginePlan {
        &self.inner.plan
    }

    pub fn dialect(&self) -> Dialect {
        self.inner.plan.dialect()
    }

    /// The SeaORM handle, for SQLite and Postgres engines.
    pub fn orm(&self) -> Option<&DatabaseConnection> {
        match &self.inner.backend {
            Backend::Orm(db) => Some(db),
            Backend::SqlServer(_) => None,
        }
    }

    pub fn session_stats(&self) -> Arc<SessionStats> {
        Arc::clone(&self.inner.stats)
    }

    /// Open a new unit-of-work session. The caller owns closing it.
    pub async fn session(&self) -> Result<Session, DbInfraError> {
        let id = self.inner.next_session_id.fetch_add(1, Ordering::Relaxed);
        let stats = self.session_stats();
        let dialect = self.dialect();

        match &self.inner.backend {
            Backend::Orm(db) => Ok(Session::orm(id, dialect, db.clone(), stats)),
            Backend::SqlServer(pool) => {
                let handle = pool.acquire().await?;
                Ok(Session::sql_server(id, dialect, handle, stats))
            }
        }
    }

    /// Run `f` with a fresh session and close it afterwards, whether `f`
    /// succeeded or not. Uncommitted work is rolled back on close. When `f`
    /// fails, its error is returned even if closing also fails.
    pub async fn with_session<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, Result<T, E>>,
        E: From<DbInfraError>,
    {
        let mut session = self.session().await?;
        let out = f(&mut session).await;
        let closed = session.close().await;

        match (out, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(close_err)) => Err(close_err.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                warn!(error = %close_err, "session=close_failed_after_error");
                Err(e)
            }
        }
    }

    /// Run a multi-statement script outside any session transaction.
    pub async fn execute_script(&self, sql: &str) -> Result<(), DbInfraError> {
        match &self.inner.backend {
            Backend::Orm(db) => {
                db.execute_unprepared(sql).await?;
            }
            Backend::SqlServer(pool) => {
                let mut conn = pool.acquire().await?;
                conn.batch(sql).await?;
            }
        }
        Ok(())
    }

    /// Server version string as reported by the database.
    pub async fn server_version(&self) -> Result<String, DbInfraError> {
        let sql = match self.dialect() {
            Dialect::Sqlite => "SELECT sqlite_version()",
            Dialect::Postgres => "SELECT version()",
            Dialect::SqlServer(_) => "SELECT @@VERSION",
        };

        self.with_session(|s| {
            Box::pin(async move {
                s.query_string(sql)
                    .await?
                    .ok_or_else(|| DbInfraError::query("version query returned no rows"))
            })
        })
        .await
    }

    /// Release pooled connections. Sessions already handed out keep working
    /// until they are closed.
    pub async fn close(&self) -> Result<(), DbInfraError> {
        match &self.inner.backend {
            Backend::Orm(db) => db.clone().close().await?,
            // bb8 pools close once the last handle is dropped.
            Backend::SqlServer(_) => {}
        }
        debug!(engine = self.dialect().engine_name(), "pool=closed");
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("url", &self.inner.plan.url)
            .field("pool", &self.inner.plan.pool)
            .finish_non_exhaustive()
    }
}

fn pool_options<DB: sqlx::Database>(
    policy: PoolPolicy,
    engine: &str,
) -> Result<PoolOptions<DB>, DbInfraError> {
    match policy {
        PoolPolicy::Unpooled => Err(DbInfraError::config(format!(
            "unpooled connections are not supported for {engine}"
        ))),
        PoolPolicy::SingleStatic => Ok(PoolOptions::new()
            .min_connections(0)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .test_before_acquire(false)),
        PoolPolicy::Sized {
            size,
            max_overflow,
            pre_ping,
        } => Ok(PoolOptions::new()
            .min_connections(0)
            .max_connections(size.saturating_add(max_overflow))
            .test_before_acquire(pre_ping)),
    }
}

fn connect_sqlite(
    plan: &EnginePlan,
    target: &SqliteTarget,
) -> Result<DatabaseConnection, DbInfraError> {
    let mut pool = pool_options::<sqlx::Sqlite>(plan.pool, "sqlite")?;

    let mut opts = match target {
        SqliteTarget::File(path) => SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true),
        SqliteTarget::Memory => {
            // Every in-memory connection is a separate database.
            pool = pool.max_connections(1).idle_timeout(None).max_lifetime(None);
            SqliteConnectOptions::from_str("sqlite::memory:")?
        }
    };
    // Enforcement comes from the plan's post-connect statements only.
    opts = opts.foreign_keys(false);
    if let ConnectArgs::Sqlite {
        shared_across_threads,
    } = plan.connect_args
    {
        opts = opts.serialized(shared_across_threads);
    }
    if !plan.echo {
        opts = opts.disable_statement_logging();
    }

    let statements = Arc::new(plan.post_connect.clone());
    let pool = pool
        .after_connect(move |conn, _meta| {
            let statements = Arc::clone(&statements);
            Box::pin(async move {
                for stmt in statements.iter() {
                    sqlx::query(stmt.as_str()).execute(&mut *conn).await?;
                }
                trace!("db=sqlite hook=after_connect ok");
                Ok::<_, sqlx::Error>(())
            })
        })
        .connect_lazy_with(opts);

    Ok(SqlxSqliteConnector::from_sqlx_sqlite_pool(pool))
}

fn connect_postgres(plan: &EnginePlan, url: &str) -> Result<DatabaseConnection, DbInfraError> {
    let pool = pool_options::<sqlx::Postgres>(plan.pool, "postgresql")?;

    let mut opts = PgConnectOptions::from_str(url)?;
    if !plan.echo {
        opts = opts.disable_statement_logging();
    }

    let statements = Arc::new(plan.post_connect.clone());
    let pool = pool
        .after_connect(move |conn, _meta| {
            let statements = Arc::clone(&statements);
            Box::pin(async move {
                for stmt in statements.iter() {
                    sqlx::query(stmt.as_str()).execute(&mut *conn).await?;
                }
                trace!("db=postgres hook=after_connect ok");
                Ok::<_, sqlx::Error>(())
            })
        })
        .connect_lazy_with(opts);

    Ok(SqlxPostgresConnector::from_sqlx_postgres_pool(pool))
}
