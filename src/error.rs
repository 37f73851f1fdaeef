use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the grade, cache and gradebook models.
///
/// Each variant maps onto a stable IPC error code via [`Error::code`].
#[derive(Error, Debug)]
pub enum Error {
    /// Model-level validation failed at save time.
    #[error("{0}")]
    Validation(String),

    /// Caller passed a malformed or out-of-range parameter.
    #[error("{0}")]
    BadParams(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_failed",
            Error::BadParams(_) => "bad_params",
            Error::NotFound(_) => "not_found",
            Error::Database(_) => "db_query_failed",
            Error::Other(_) => "internal",
        }
    }
}
