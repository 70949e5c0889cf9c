//! Database error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database query error: {0}")]
    Query(#[source] sqlx::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate entry: {0}")]
    Duplicate(String),

    #[error("Database operation timed out")]
    Timeout,

    #[error("Migration error: {0}")]
    Migration(String),
}

impl DbError {
    /// Whether the failed operation may succeed if issued again
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::Timeout)
    }

    /// Column named by a unique violation, e.g. `email` for
    /// "UNIQUE constraint failed: users.email".
    pub fn duplicate_field(&self) -> Option<&str> {
        match self {
            DbError::Duplicate(msg) => msg.rsplit('.').next().map(str::trim),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound("row".to_string()),
            sqlx::Error::PoolTimedOut => DbError::Timeout,
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                DbError::Duplicate(db_err.message().to_string())
            }
            other => DbError::Query(other),
        }
    }
}
