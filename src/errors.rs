use rust_decimal::Decimal;
use thiserror::Error;

// Create a type alias for Result using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the data core
#[derive(Error, Debug)]
pub enum Error {
    #[error("Storage operation failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Input validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Import failed: {0}")]
    Import(#[from] ImportError),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Key-value store error: {0}")]
    KeyValue(String),

    #[error("Database query failed: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Remote request failed: {0}")]
    Remote(#[from] reqwest::Error),

    #[error("Remote store returned status {0}")]
    RemoteStatus(u16),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Entry progress {progress} does not match segment sum {sum}")]
    ProgressMismatch { progress: Decimal, sum: Decimal },

    #[error("'{0}' is not a valid ISO date key")]
    InvalidDateKey(String),

    #[error("'{0}' is not a valid month key")]
    InvalidMonthKey(String),
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("no signed-in user")]
    NotAuthenticated,
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Malformed export payload: {0}")]
    Malformed(String),

    #[error("Unsupported export version {0}")]
    UnsupportedVersion(u32),

    #[error("Inconsistent export data: {0}")]
    Inconsistent(String),
}

// Route library errors into the root type without wrapping at call sites
impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(StorageError::Database(err))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Storage(StorageError::Remote(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Storage(StorageError::Serialization(err))
    }
}
