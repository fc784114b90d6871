//! Registry errors.

use thiserror::Error;

/// Result alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// Path does not exist, or has the wrong kind for the operation.
    #[error("not found: {0}")]
    NotFound(String),

    /// The file claims to be JSON but is not a valid registry document.
    #[error("invalid format in {path}: {message}")]
    Format { path: String, message: String },

    /// The path contains a `..` segment.
    #[error("path escapes the registry root: {0}")]
    PathEscape(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RegistryError {
    pub(crate) fn format(path: impl Into<String>, message: impl ToString) -> Self {
        Self::Format {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

impl From<RegistryError> for conductor_core::Error {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(path) => conductor_core::Error::NotFound(path),
            RegistryError::Io(e) => conductor_core::Error::Io(e),
            other => conductor_core::Error::Registry(other.to_string()),
        }
    }
}
