use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A date-range filter carried a string that is not a calendar date.
    /// Raised before any store round-trip, never silently coerced.
    #[error("invalid date format for {field}: '{value}'. Expected YYYY-MM-DD")]
    InvalidDateFormat { field: &'static str, value: String },

    /// Any failure of the underlying document store, wrapping the root
    /// cause. Not retried; surfaced to the caller as-is.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),
}

impl From<redb::Error> for Error {
    fn from(e: redb::Error) -> Self {
        Error::DatabaseQuery(Box::new(e))
    }
}

impl From<redb::DatabaseError> for Error {
    fn from(e: redb::DatabaseError) -> Self {
        Error::DatabaseQuery(Box::new(e))
    }
}

impl From<redb::StorageError> for Error {
    fn from(e: redb::StorageError) -> Self {
        Error::DatabaseQuery(Box::new(e))
    }
}

impl From<redb::TransactionError> for Error {
    fn from(e: redb::TransactionError) -> Self {
        Error::DatabaseQuery(Box::new(e))
    }
}

impl From<redb::TableError> for Error {
    fn from(e: redb::TableError) -> Self {
        Error::DatabaseQuery(Box::new(e))
    }
}

impl From<redb::CommitError> for Error {
    fn from(e: redb::CommitError) -> Self {
        Error::DatabaseQuery(Box::new(e))
    }
}
