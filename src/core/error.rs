//! Error types and gRPC status mapping.
//!
//! Voyager defines common error conditions in one taxonomy; the single
//! mapping to `tonic::Status` lives here so handlers never pick codes
//! ad hoc.

use thiserror::Error;

/// Common Voyager error conditions.
#[derive(Debug, Error)]
pub enum VoyagerError {
    /// A required registration field is empty or out of range.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Credential header missing on an authenticated surface.
    #[error("authentication required")]
    Unauthenticated,

    /// Credential present but wrong.
    #[error("permission denied: {message}")]
    PermissionDenied { message: String },

    /// Discovery produced no candidates for the requested service.
    #[error("no instances available for service: {service}")]
    NoInstances { service: String },

    /// External store transport or protocol failure.
    #[error("store error: {message}")]
    Store { message: String },

    /// Serialization failure or other unexpected server-side condition.
    #[error("internal error: {message}")]
    Internal { message: String },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    Config { message: String },

    /// RPC-level failure surfaced by the transport.
    #[error(transparent)]
    Rpc(#[from] tonic::Status),

    /// Connection-level failure (dial, TLS, URI).
    #[error(transparent)]
    Transport(#[from] tonic::transport::Error),
}

impl VoyagerError {
    /// Create an InvalidArgument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a Store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create an Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a Config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether the caller may reasonably retry the operation as-is.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::NoInstances { .. } | Self::Store { .. })
    }

    /// The gRPC code this error surfaces as.
    pub fn code(&self) -> tonic::Code {
        match self {
            Self::InvalidArgument { .. } => tonic::Code::InvalidArgument,
            Self::Unauthenticated => tonic::Code::Unauthenticated,
            Self::PermissionDenied { .. } => tonic::Code::PermissionDenied,
            Self::NoInstances { .. } => tonic::Code::Unavailable,
            Self::Store { .. } | Self::Internal { .. } => tonic::Code::Internal,
            Self::Config { .. } => tonic::Code::FailedPrecondition,
            Self::Rpc(status) => status.code(),
            Self::Transport(_) => tonic::Code::Unavailable,
        }
    }
}

impl From<VoyagerError> for tonic::Status {
    fn from(err: VoyagerError) -> Self {
        match err {
            VoyagerError::Rpc(status) => status,
            other => tonic::Status::new(other.code(), other.to_string()),
        }
    }
}

/// Result type using VoyagerError.
pub type VoyagerResult<T> = Result<T, VoyagerError>;
