use thiserror::Error;

/// Errors that can occur when interacting with the datastore.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row with the same primary key already exists.
    #[error("Duplicate key in {table}: {key}")]
    DuplicateKey { table: &'static str, key: String },

    /// An update targeted a row that does not exist.
    #[error("Row not found in {table}: {key}")]
    RowNotFound { table: &'static str, key: String },

    /// A table-level check constraint rejected the write.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// A stored value could not be decoded into its domain type.
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
