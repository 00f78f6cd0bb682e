//! Error type for document, object and media storage.

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Object storage error: {0}")]
    Object(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Bulk write failed for {failed} of {total} documents: {first_error}")]
    BulkWrite {
        failed: usize,
        total: usize,
        first_error: String,
    },

    #[error("HTTP error: {0}")]
    Http(String),
}

impl StoreError {
    /// Failures worth retrying locally: the connection dropped or the call
    /// timed out before the server answered.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Connection(_) | StoreError::Timeout(_))
    }

    pub(crate) fn from_sqlx(context: &str, e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(io) => StoreError::Connection(format!("{}: {}", context, io)),
            sqlx::Error::PoolTimedOut => StoreError::Timeout(format!("{}: pool timed out", context)),
            sqlx::Error::PoolClosed => StoreError::Connection(format!("{}: pool closed", context)),
            other => StoreError::Database(format!("{}: {}", context, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_class() {
        assert!(StoreError::Connection("reset".into()).is_transient());
        assert!(StoreError::Timeout("slow".into()).is_transient());
        assert!(!StoreError::Database("syntax".into()).is_transient());
        assert!(!StoreError::BulkWrite {
            failed: 1,
            total: 2,
            first_error: "dup".into()
        }
        .is_transient());
    }

    #[test]
    fn test_sqlx_pool_timeout_is_transient() {
        assert!(StoreError::from_sqlx("fetch", sqlx::Error::PoolTimedOut).is_transient());
        assert!(!StoreError::from_sqlx("fetch", sqlx::Error::RowNotFound).is_transient());
    }
}
