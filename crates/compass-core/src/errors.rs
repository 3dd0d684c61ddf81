//! Error types for the compass core library.

/// Top-level error enum for the compass core library.
///
/// Parse failures of individual source files are not represented here: they
/// are recorded as a diagnostic on the resulting `FileRecord`.
#[derive(Debug, thiserror::Error)]
pub enum CompassError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CompassError {
    /// True for failures of the persistent store, which abort an indexing run.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            CompassError::Database(_) | CompassError::Sqlite(_) | CompassError::Io(_)
        )
    }
}

pub type CompassResult<T> = Result<T, CompassError>;
