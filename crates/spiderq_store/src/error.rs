//! Error types for the store layer.

use thiserror::Error;

/// Store operation result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Store errors.
///
/// Dequeue races are not represented here: they are resolved internally by
/// the retry loop and never reach the caller.
#[derive(Error, Debug)]
pub enum DbError {
    /// Key-value lookup on a key that has no row.
    #[error("Key not found in {table}: {key}")]
    KeyNotFound { table: String, key: String },

    /// Storage failure (connection loss, constraint violation, bad SQL).
    #[error("Database error during {op} on {table}: {source}")]
    Database {
        op: &'static str,
        table: String,
        #[source]
        source: sqlx::Error,
    },

    /// A stored payload could not be decoded. `context` names the table
    /// it was read from, or `json` for direct codec use.
    #[error("Corrupt payload in {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be serialized for storage.
    #[error("Serialization error: {0}")]
    Encode(#[source] serde_json::Error),

    /// Queue priorities must be finite; NaN and infinities do not order.
    #[error("Invalid priority {0}: must be a finite number")]
    InvalidPriority(f64),

    /// Table name rejected before reaching SQL.
    #[error("Invalid table name: {0}")]
    InvalidTable(String),

    /// Malformed configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error (file system operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    /// Wrap a sqlx error with the operation and table it happened on.
    pub fn database(op: &'static str, table: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Database {
            op,
            table: table.into(),
            source,
        }
    }

    /// Create a not found error.
    pub fn key_not_found(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self::KeyNotFound {
            table: table.into(),
            key: key.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for a missing key, the only "expected" failure of `get`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound { .. })
    }
}

/// Attach operation and table context to sqlx results.
pub(crate) trait SqlContext<T> {
    fn during(self, op: &'static str, table: &str) -> Result<T>;
}

impl<T> SqlContext<T> for std::result::Result<T, sqlx::Error> {
    fn during(self, op: &'static str, table: &str) -> Result<T> {
        self.map_err(|e| DbError::database(op, table, e))
    }
}
