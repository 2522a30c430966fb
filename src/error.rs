use std::sync::Arc;

use thiserror::Error;

use crate::storage::StorageError;

/// Result type used by fallible SDK operations that are not remote calls.
///
/// Remote calls never return this type. They resolve to an [`EdgeResponse`](crate::EdgeResponse)
/// instead.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Optable SDK.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The sandbox host does not produce a valid base URL.
    #[error("invalid base_url configuration")]
    InvalidBaseUrl(#[source] url::ParseError),

    /// A raw identifier is not of the `{prefix}:{value}` form.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// The key-value store backing the SDK failed.
    #[error(transparent)]
    Storage(StorageError),

    /// A value could not be serialized or deserialized.
    // serde_json::Error is not clonable, so we're wrapping it in an Arc.
    #[error(transparent)]
    Json(Arc<serde_json::Error>),

    /// Network error.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),

    /// The sandbox answered with a success status but without a body.
    #[error("response body is empty")]
    EmptyBody,

    /// An I/O error.
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    #[error(transparent)]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}

impl From<StorageError> for Error {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}
