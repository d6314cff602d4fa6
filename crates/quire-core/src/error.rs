//! Error types for Quire Core

use thiserror::Error;

use crate::acl::Intent;

/// Core error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Authorization denied: {identity} may not {intent} {path}")]
    AuthorizationDenied {
        path: String,
        identity: String,
        intent: Intent,
    },

    #[error("Malformed operation: {0}")]
    MalformedOperation(String),

    #[error("Base version {base} predates retained history (oldest {oldest})")]
    HistoryTooOld { base: u64, oldest: u64 },

    #[error("Failed to persist {path}: {reason}")]
    StorePersistFailure { path: String, reason: String },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Binder closed: {0}")]
    BinderClosed(String),

    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),
}

impl Error {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedOperation(msg.into())
    }
}

/// Result type alias for Quire Core operations
pub type Result<T> = std::result::Result<T, Error>;
