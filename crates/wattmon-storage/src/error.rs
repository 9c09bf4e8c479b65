/// Errors that can occur within the storage layer.
///
/// # Examples
///
/// ```rust
/// use wattmon_storage::error::StorageError;
///
/// let err = StorageError::NotFound {
///     entity: "alert",
///     id: "alert-99".to_string(),
/// };
/// assert!(err.to_string().contains("alert"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A required record was not found in the database.
    #[error("Storage: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    /// A concurrent writer touched the same active-alert key; the caller
    /// may retry the operation.
    #[error("Storage: conflicting update on active alert key")]
    Conflict,

    /// A stored string column failed to parse into its domain enum.
    #[error("Storage: invalid value in column '{column}': {message}")]
    InvalidColumn {
        column: &'static str,
        message: String,
    },

    /// An underlying database error.
    #[error("Storage: database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
