//! Error types for the translation service.
//!
//! This module defines the central `Error` enum, which captures the failures
//! that are reported to callers as gRPC errors. It implements
//! `From<Error>` for `tonic::Status` so handlers can use `?` and return the
//! appropriate status code.
//!
//! Translation failures reported by a backend are *not* represented here:
//! those are business outcomes and travel in-band inside the response
//! messages. Likewise, unknown or expired client sessions are reported through
//! the `re_register_required` flag, not as errors.
//!
//! ## Error Cases
//! - `InvalidRequest`: A required field was missing or a value is unsupported.
//! - `Transport`: Receiving from or sending on a stream failed.
//! - `ChannelError`: An internal communication failure between tasks.
//! - `RequestCancelled`: The client canceled the request mid-flight.
//! - `ServiceShutdown`: A request arrived while the service was shutting down.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the translation service.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The client request was malformed.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// A stream receive or send failed.
    #[error("Transport error: {context}")]
    Transport { context: String },

    /// Internal channel send/receive failure (e.g., closed or full channel).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The client aborted the request.
    #[error("Request cancelled by client")]
    RequestCancelled,

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl Error {
    /// Shorthand for [`Error::InvalidRequest`].
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Fails with `"<field> is required"` when `value` is empty.
    pub fn require(field: &str, value: &str) -> Result<()> {
        if value.is_empty() {
            Err(Self::invalid(format!("{field} is required")))
        } else {
            Ok(())
        }
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidRequest { reason } => Status::invalid_argument(reason),
            Error::Transport { context } => Status::internal(context),
            Error::ChannelError { context } => {
                Status::internal(format!("Channel error: {}", context))
            }
            Error::RequestCancelled => Status::cancelled("Request was cancelled"),
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}
