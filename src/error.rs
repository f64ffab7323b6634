//! # error
//!
//! Error types returned by the context, its handles and protocol backends

use std::io;

use remotefs::{RemoteError, RemoteErrorType};
use thiserror::Error;

/// Result type returned by every fallible operation of this crate
pub type SmbcResult<T> = Result<T, SmbcError>;

/// Errors raised by a [`crate::ClientContext`] and the handles it creates
#[derive(Debug, Error)]
pub enum SmbcError {
    /// The context could not be initialized
    #[error("could not initialize context: {0}")]
    ContextInit(String),
    /// The provided URI is not a valid `smb://` URI
    #[error("invalid uri '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },
    /// Network or transport failure
    #[error("connection error: {0}")]
    Connection(String),
    /// The server rejected the supplied credentials
    #[error("authentication failed for {server}/{share}")]
    Authentication { server: String, share: String },
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("no such file or directory: {0}")]
    NotFound(String),
    /// The handle has already been closed
    #[error("handle is closed")]
    ClosedHandle,
    /// The context owning the handle has been released
    #[error("context is closed")]
    ClosedContext,
    /// Buffered data could not be written out
    #[error("failed to flush buffered data: {0}")]
    Flush(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl SmbcError {
    pub(crate) fn invalid_uri<U: AsRef<str>, R: ToString>(uri: U, reason: R) -> Self {
        Self::InvalidUri {
            uri: uri.as_ref().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Returns whether the error is caused by a closed handle or a closed context
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ClosedHandle | Self::ClosedContext)
    }

    /// Returns whether the error was raised because access was refused
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::PermissionDenied(_))
    }
}

impl From<SmbcError> for io::Error {
    fn from(err: SmbcError) -> Self {
        let kind = match &err {
            SmbcError::InvalidUri { .. } | SmbcError::InvalidArgument(_) => {
                io::ErrorKind::InvalidInput
            }
            SmbcError::Connection(_) => io::ErrorKind::ConnectionAborted,
            SmbcError::Authentication { .. } | SmbcError::PermissionDenied(_) => {
                io::ErrorKind::PermissionDenied
            }
            SmbcError::NotFound(_) => io::ErrorKind::NotFound,
            SmbcError::ClosedHandle | SmbcError::ClosedContext => io::ErrorKind::NotConnected,
            SmbcError::Unsupported(_) => io::ErrorKind::Unsupported,
            SmbcError::ContextInit(_) | SmbcError::Flush(_) => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

impl From<SmbcError> for RemoteError {
    fn from(err: SmbcError) -> Self {
        let kind = match &err {
            SmbcError::ContextInit(_) | SmbcError::InvalidUri { .. } => RemoteErrorType::BadAddress,
            SmbcError::Connection(_) => RemoteErrorType::ConnectionError,
            SmbcError::Authentication { .. } => RemoteErrorType::AuthenticationFailed,
            SmbcError::PermissionDenied(_) | SmbcError::NotFound(_) => {
                RemoteErrorType::CouldNotOpenFile
            }
            SmbcError::ClosedHandle | SmbcError::InvalidArgument(_) => RemoteErrorType::BadFile,
            SmbcError::ClosedContext => RemoteErrorType::NotConnected,
            SmbcError::Flush(_) => RemoteErrorType::IoError,
            SmbcError::Unsupported(_) => RemoteErrorType::UnsupportedFeature,
        };
        RemoteError::new_ex(kind, err)
    }
}
