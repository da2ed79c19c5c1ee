//! SQL Server connectivity over `tiberius`, pooled with `bb8`.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bb8::{ErrorSink, ManageConnection, Pool, PooledConnection, RunError};
use tiberius::{AuthMethod, Client, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, trace, warn};

use crate::config::db::{ConnectArgs, EnginePlan, PoolPolicy};
use crate::config::url::{SqlServerTarget, Target};
use crate::error::DbInfraError;

pub type SqlServerClient = Client<Compat<TcpStream>>;

/// TDS protocol versions the client can negotiate.
const SUPPORTED_TDS_VERSIONS: [&str; 2] = ["7.3", "7.4"];
/// Pool checkout wait when the option set carries no explicit timeout.
const DEFAULT_CHECKOUT_TIMEOUT: Duration = Duration::from_secs(30);

pub fn tiberius_config(target: &SqlServerTarget, application_name: Option<&str>) -> Config {
    let mut config = Config::new();
    config.host(&target.host);
    config.port(target.port);
    if let Some(database) = &target.database {
        config.database(database);
    }
    if let Some(username) = &target.username {
        config.authentication(AuthMethod::sql_server(
            username,
            target.password.as_deref().unwrap_or_default(),
        ));
    }
    config.encryption(if target.encrypt {
        EncryptionLevel::Required
    } else {
        EncryptionLevel::Off
    });
    if target.trust_server_certificate {
        config.trust_cert();
    }
    if let Some(name) = application_name {
        config.application_name(name);
    }
    config
}

/// Open one physical connection, following an Azure gateway redirect if the
/// server answers with one.
pub async fn open_connection(
    config: Config,
    timeout: Option<Duration>,
) -> Result<SqlServerClient, DbInfraError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, connect_following_redirect(config))
            .await
            .map_err(|_| {
                DbInfraError::connect(format!(
                    "connection attempt timed out after {}s",
                    limit.as_secs()
                ))
            })?,
        None => connect_following_redirect(config).await,
    }
}

async fn connect_following_redirect(mut config: Config) -> Result<SqlServerClient, DbInfraError> {
    let tcp = TcpStream::connect(config.get_addr()).await?;
    tcp.set_nodelay(true)?;

    match Client::connect(config.clone(), tcp.compat_write()).await {
        Ok(client) => Ok(client),
        Err(tiberius::error::Error::Routing { host, port }) => {
            debug!(host = %host, port = port, "mssql=redirect");
            config.host(&host);
            config.port(port);
            let tcp = TcpStream::connect(config.get_addr()).await?;
            tcp.set_nodelay(true)?;
            Ok(Client::connect(config, tcp.compat_write()).await?)
        }
        Err(e) => Err(e.into()),
    }
}

/// A client plus the transaction state the session layer tracks on it.
pub struct SqlServerConn {
    client: SqlServerClient,
    in_transaction: bool,
}

impl SqlServerConn {
    fn new(client: SqlServerClient) -> Self {
        Self {
            client,
            in_transaction: false,
        }
    }

    pub fn client(&mut self) -> &mut SqlServerClient {
        &mut self.client
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Run a batch and discard any result sets.
    pub async fn batch(&mut self, sql: &str) -> Result<(), DbInfraError> {
        self.client.simple_query(sql).await?.into_results().await?;
        Ok(())
    }

    pub async fn execute(&mut self, sql: &str) -> Result<u64, DbInfraError> {
        Ok(self.client.execute(sql, &[]).await?.total())
    }

    /// First column of the first row, as text.
    pub async fn query_string(&mut self, sql: &str) -> Result<Option<String>, DbInfraError> {
        let row = self.client.simple_query(sql).await?.into_row().await?;
        match row {
            Some(row) => Ok(row.try_get::<&str, _>(0)?.map(str::to_owned)),
            None => Ok(None),
        }
    }

    pub(crate) async fn begin(&mut self) -> Result<(), DbInfraError> {
        if !self.in_transaction {
            self.batch("BEGIN TRANSACTION").await?;
            self.in_transaction = true;
        }
        Ok(())
    }

    pub(crate) async fn commit(&mut self) -> Result<(), DbInfraError> {
        if self.in_transaction {
            self.batch("COMMIT TRANSACTION").await?;
            self.in_transaction = false;
        }
        Ok(())
    }

    pub(crate) async fn rollback(&mut self) -> Result<(), DbInfraError> {
        if self.in_transaction {
            self.batch("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION").await?;
            self.in_transaction = false;
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct SqlServerManager {
    config: Config,
    connect_timeout: Option<Duration>,
}

impl SqlServerManager {
    pub fn from_plan(plan: &EnginePlan) -> Result<Self, DbInfraError> {
        let Target::SqlServer(target) = plan.url.target() else {
            return Err(DbInfraError::config(
                "SQL Server manager requires a SQL Server URL",
            ));
        };

        if let ConnectArgs::Tds {
            tds_version,
            charset,
        } = &plan.connect_args
        {
            if !SUPPORTED_TDS_VERSIONS.contains(tds_version) {
                return Err(DbInfraError::config(format!(
                    "unsupported TDS version {tds_version}"
                )));
            }
            // N-typed columns travel as UTF-16; UTF-8 is the only client charset accepted.
            if !charset.eq_ignore_ascii_case("UTF-8") {
                return Err(DbInfraError::config(format!(
                    "unsupported client charset {charset}"
                )));
            }
            trace!(tds_version = %tds_version, charset = %charset, "mssql=tds_options");
        }

        Ok(Self {
            config: tiberius_config(target, plan.application_name.as_deref()),
            connect_timeout: plan.connect_args.connect_timeout(),
        })
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    pub async fn open(&self) -> Result<SqlServerConn, DbInfraError> {
        let client = open_connection(self.config.clone(), self.connect_timeout).await?;
        Ok(SqlServerConn::new(client))
    }
}

#[async_trait]
impl ManageConnection for SqlServerManager {
    type Connection = SqlServerConn;
    type Error = DbInfraError;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        self.open().await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.batch("SELECT 1").await
    }

    /// A connection handed back mid-transaction is discarded rather than reused.
    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.in_transaction
    }
}

/// Connect failures reported by the pool's background connection tasks.
///
/// bb8 hands those errors to its error sink instead of to the waiting
/// caller, who would otherwise only ever see a checkout timeout.
#[derive(Debug, Default)]
pub struct ConnectFailures {
    last: Mutex<Option<DbInfraError>>,
    notify: Notify,
}

impl ConnectFailures {
    fn record(&self, error: DbInfraError) {
        if let Ok(mut last) = self.last.lock() {
            *last = Some(error);
        }
        self.notify.notify_waiters();
    }

    fn latest(&self) -> Option<DbInfraError> {
        self.last.lock().ok().and_then(|last| last.clone())
    }

    fn clear(&self) {
        if let Ok(mut last) = self.last.lock() {
            *last = None;
        }
    }
}

#[derive(Debug, Clone)]
struct FailureSink(Arc<ConnectFailures>);

impl ErrorSink<DbInfraError> for FailureSink {
    fn sink(&self, error: DbInfraError) {
        warn!(error = %error, "mssql=pool connect failed");
        self.0.record(error);
    }

    fn boxed_clone(&self) -> Box<dyn ErrorSink<DbInfraError>> {
        Box::new(self.clone())
    }
}

#[derive(Clone)]
pub enum SqlServerPool {
    Pooled {
        pool: Pool<SqlServerManager>,
        failures: Arc<ConnectFailures>,
    },
    Unpooled(SqlServerManager),
}

impl SqlServerPool {
    pub fn build(plan: &EnginePlan) -> Result<Self, DbInfraError> {
        let manager = SqlServerManager::from_plan(plan)?;
        let failures = Arc::new(ConnectFailures::default());

        let builder = Pool::<SqlServerManager>::builder()
            .min_idle(None)
            .retry_connection(false)
            .connection_timeout(checkout_timeout(&manager))
            .error_sink(Box::new(FailureSink(Arc::clone(&failures))));

        let pool = match plan.pool {
            PoolPolicy::Unpooled => return Ok(SqlServerPool::Unpooled(manager)),
            PoolPolicy::SingleStatic => builder
                .max_size(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .test_on_check_out(false)
                .build_unchecked(manager),
            PoolPolicy::Sized {
                size,
                max_overflow,
                pre_ping,
            } => builder
                .max_size(size.saturating_add(max_overflow))
                .test_on_check_out(pre_ping)
                .build_unchecked(manager),
        };
        Ok(SqlServerPool::Pooled { pool, failures })
    }

    /// Check out a connection. A failed connect attempt made on behalf of
    /// this checkout is returned as is rather than as a timeout.
    pub async fn acquire(&self) -> Result<SqlServerHandle, DbInfraError> {
        match self {
            SqlServerPool::Pooled { pool, failures } => {
                failures.clear();
                let failed = failures.notify.notified();

                tokio::select! {
                    checked_out = pool.get_owned() => match checked_out {
                        Ok(conn) => Ok(SqlServerHandle::Pooled(conn)),
                        Err(RunError::User(inner)) => Err(inner),
                        Err(RunError::TimedOut) => Err(failures.latest().unwrap_or_else(|| {
                            DbInfraError::connect(
                                "timed out waiting for a pooled SQL Server connection",
                            )
                        })),
                    },
                    () = failed => Err(failures.latest().unwrap_or_else(|| {
                        DbInfraError::connect("SQL Server connection attempt failed")
                    })),
                }
            }
            SqlServerPool::Unpooled(manager) => Ok(SqlServerHandle::Direct(manager.open().await?)),
        }
    }
}

fn checkout_timeout(manager: &SqlServerManager) -> Duration {
    manager
        .connect_timeout()
        .unwrap_or(DEFAULT_CHECKOUT_TIMEOUT)
}

/// A checked-out pooled connection or a direct one owned outright.
pub enum SqlServerHandle {
    Pooled(PooledConnection<'static, SqlServerManager>),
    Direct(SqlServerConn),
}

impl Deref for SqlServerHandle {
    type Target = SqlServerConn;

    fn deref(&self) -> &Self::Target {
        match self {
            SqlServerHandle::Pooled(conn) => &**conn,
            SqlServerHandle::Direct(conn) => conn,
        }
    }
}

impl DerefMut for SqlServerHandle {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            SqlServerHandle::Pooled(conn) => &mut **conn,
            SqlServerHandle::Direct(conn) => conn,
        }
    }
}
