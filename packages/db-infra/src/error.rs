use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum DbInfraError {
    #[error("Configuration error: {message}")]
    Config { message: String },
    #[error("Invalid database URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Connection error: {message}")]
    Connect { message: String },
    #[error("Query error: {message}")]
    Query { message: String },
    #[error("Session error: {message}")]
    Session { message: String },
}

impl DbInfraError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    pub fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    /// True when the failure happened while reaching the server rather than
    /// while running a statement on an established connection.
    pub fn is_connect(&self) -> bool {
        matches!(self, Self::Connect { .. })
    }
}

impl From<sqlx::Error> for DbInfraError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Configuration(_) => Self::config(e.to_string()),
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => Self::connect(e.to_string()),
            other => Self::query(other.to_string()),
        }
    }
}

impl From<sea_orm::DbErr> for DbInfraError {
    fn from(e: sea_orm::DbErr) -> Self {
        match e {
            sea_orm::DbErr::Conn(_) | sea_orm::DbErr::ConnectionAcquire(_) => {
                Self::connect(e.to_string())
            }
            other => Self::query(other.to_string()),
        }
    }
}

impl From<tiberius::error::Error> for DbInfraError {
    fn from(e: tiberius::error::Error) -> Self {
        match e {
            tiberius::error::Error::Io { .. } => Self::connect(e.to_string()),
            other => Self::query(other.to_string()),
        }
    }
}

impl From<std::io::Error> for DbInfraError {
    fn from(e: std::io::Error) -> Self {
        Self::connect(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_connection_failures() {
        let err: DbInfraError =
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused").into();
        assert!(err.is_connect());
        assert!(err.to_string().contains("refused"));
    }

    #[test]
    fn pool_timeouts_are_connection_failures() {
        let err: DbInfraError = sqlx::Error::PoolTimedOut.into();
        assert!(err.is_connect());
    }

    #[test]
    fn row_errors_are_query_failures() {
        let err: DbInfraError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbInfraError::Query { .. }));
    }
}
