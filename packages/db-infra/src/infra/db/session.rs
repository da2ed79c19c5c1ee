//! Unit-of-work sessions.
//!
//! A [`Session`] owns one connection for the length of one logical unit of
//! work. Work runs inside a transaction that is started lazily on first use;
//! `commit` makes it durable and `close` rolls back anything left open. Close
//! happens exactly once per session: explicitly, or on drop if the caller
//! never got that far.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, Statement, TransactionTrait,
};
use tracing::{trace, warn};

use crate::config::url::Dialect;
use crate::error::DbInfraError;
use crate::infra::db::sqlserver::{SqlServerClient, SqlServerHandle};

/// Per-engine open/close counters.
#[derive(Debug, Default)]
pub struct SessionStats {
    opened: AtomicU64,
    closed: AtomicU64,
}

impl SessionStats {
    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::Acquire)
    }

    pub fn closed(&self) -> u64 {
        self.closed.load(Ordering::Acquire)
    }

    /// Sessions handed out and not yet closed.
    pub fn open_now(&self) -> u64 {
        self.opened().saturating_sub(self.closed())
    }

    fn record_open(&self) {
        self.opened.fetch_add(1, Ordering::AcqRel);
    }

    fn record_close(&self) {
        self.closed.fetch_add(1, Ordering::AcqRel);
    }
}

enum SessionConn {
    Orm {
        db: DatabaseConnection,
        txn: Option<DatabaseTransaction>,
    },
    SqlServer(SqlServerHandle),
}

pub struct Session {
    id: u64,
    dialect: Dialect,
    conn: Option<SessionConn>,
    stats: Arc<SessionStats>,
}

impl Session {
    pub(crate) fn orm(
        id: u64,
        dialect: Dialect,
        db: DatabaseConnection,
        stats: Arc<SessionStats>,
    ) -> Self {
        Self::open(id, dialect, SessionConn::Orm { db, txn: None }, stats)
    }

    pub(crate) fn sql_server(
        id: u64,
        dialect: Dialect,
        handle: SqlServerHandle,
        stats: Arc<SessionStats>,
    ) -> Self {
        Self::open(id, dialect, SessionConn::SqlServer(handle), stats)
    }

    fn open(id: u64, dialect: Dialect, conn: SessionConn, stats: Arc<SessionStats>) -> Self {
        stats.record_open();
        trace!(session_id = id, engine = dialect.engine_name(), "session=open");
        Self {
            id,
            dialect,
            conn: Some(conn),
            stats,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// The ORM transaction for this unit of work, begun on first call.
    /// Only available for SQLite and Postgres engines.
    pub async fn transaction(&mut self) -> Result<&DatabaseTransaction, DbInfraError> {
        match self.conn.as_mut() {
            Some(SessionConn::Orm { db, txn }) => {
                if txn.is_none() {
                    *txn = Some(db.begin().await?);
                }
                txn.as_ref()
                    .ok_or_else(|| DbInfraError::session("transaction was not started"))
            }
            Some(SessionConn::SqlServer(_)) => Err(DbInfraError::session(
                "SQL Server sessions expose the driver client, not an ORM transaction",
            )),
            None => Err(closed()),
        }
    }

    /// The SQL Server client for this unit of work, inside a transaction
    /// begun on first call.
    pub async fn sql_server_client(&mut self) -> Result<&mut SqlServerClient, DbInfraError> {
        match self.conn.as_mut() {
            Some(SessionConn::SqlServer(handle)) => {
                handle.begin().await?;
                Ok(handle.client())
            }
            Some(SessionConn::Orm { .. }) => Err(DbInfraError::session(
                "ORM sessions expose a transaction, not a SQL Server client",
            )),
            None => Err(closed()),
        }
    }

    /// Run a raw statement inside the session's transaction.
    pub async fn execute_unprepared(&mut self, sql: &str) -> Result<u64, DbInfraError> {
        if let Some(SessionConn::SqlServer(handle)) = self.conn.as_mut() {
            handle.begin().await?;
            return handle.execute(sql).await;
        }
        let txn = self.transaction().await?;
        Ok(txn.execute_unprepared(sql).await?.rows_affected())
    }

    /// First column of the first row returned by `sql`, as text. SQL `NULL`
    /// and an empty result both come back as `None`.
    pub async fn query_string(&mut self, sql: &str) -> Result<Option<String>, DbInfraError> {
        if let Some(SessionConn::SqlServer(handle)) = self.conn.as_mut() {
            handle.begin().await?;
            return handle.query_string(sql).await;
        }
        let txn = self.transaction().await?;
        let backend = txn.get_database_backend();
        let row = txn.query_one(Statement::from_string(backend, sql)).await?;
        let value = row.map(|r| r.try_get_by_index::<Option<String>>(0)).transpose()?;
        Ok(value.flatten())
    }

    /// Commit the current transaction; the next statement starts a new one.
    pub async fn commit(&mut self) -> Result<(), DbInfraError> {
        match self.conn.as_mut() {
            Some(SessionConn::Orm { txn, .. }) => {
                if let Some(open) = txn.take() {
                    open.commit().await?;
                }
                Ok(())
            }
            Some(SessionConn::SqlServer(handle)) => handle.commit().await,
            None => Err(closed()),
        }
    }

    /// Discard uncommitted work; the session stays usable.
    pub async fn rollback(&mut self) -> Result<(), DbInfraError> {
        match self.conn.as_mut() {
            Some(SessionConn::Orm { txn, .. }) => {
                if let Some(open) = txn.take() {
                    open.rollback().await?;
                }
                Ok(())
            }
            Some(SessionConn::SqlServer(handle)) => handle.rollback().await,
            None => Err(closed()),
        }
    }

    /// Roll back uncommitted work and release the connection. Calling it
    /// again is a no-op.
    pub async fn close(&mut self) -> Result<(), DbInfraError> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        self.stats.record_close();
        trace!(session_id = self.id, "session=close");

        match conn {
            SessionConn::Orm { txn, .. } => match txn {
                Some(open) => open.rollback().await.map_err(DbInfraError::from),
                None => Ok(()),
            },
            SessionConn::SqlServer(mut handle) => handle.rollback().await,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("dialect", &self.dialect)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.stats.record_close();
            // Dropping an open ORM transaction rolls it back; a SQL Server
            // connection still inside a transaction is discarded by the pool.
            warn!(session_id = self.id, "session=dropped_without_close");
            drop(conn);
        }
    }
}

fn closed() -> DbInfraError {
    DbInfraError::session("session is closed")
}
