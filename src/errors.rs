//! Crypto Dispatch Engine Error Hierarchy
//!
//! Registration and session lifecycle failures are returned synchronously
//! through [`Error`]. Per-operation failures never travel through this type:
//! they are written into the operation's [`crate::OpStatus`] and delivered on
//! the normal completion path.

use config::ConfigError;

use crate::DriverId;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed registration or out-of-range algorithm id
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown driver id, unknown session, or no driver satisfies a request
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal invariant violation
    #[error("Unexpected engine state: {0}")]
    Unexpected(String),

    /// Failure reported by a driver's session callbacks
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Unrecoverable failures, e.g. a worker thread could not be spawned
    #[error("Fatal error: {0}")]
    Fatal(String),
}

/// Errors a driver may return from `new_session` / `free_session`.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Driver {driver_id} rejected the request: {reason}")]
    Rejected { driver_id: DriverId, reason: String },

    #[error("Driver {0} has no resources left")]
    ResourceExhausted(DriverId),
}

/// Result of handing one operation to a driver's `process` callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProcessError {
    /// Driver is temporarily saturated. Never surfaced to the caller: the
    /// queue kind is marked blocked and the operation is requeued.
    #[error("Driver queue is full, retry later")]
    Retry,

    /// Driver refused the operation; the code lands in `op.status`.
    #[error("Driver rejected the operation with code {0}")]
    Rejected(i32),
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub(crate) fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }
}
