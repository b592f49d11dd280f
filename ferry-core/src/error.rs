//! Error types for Ferry.
//!
//! Errors are split by where they arise rather than by who reports them:
//!
//! - transient boundary failures ([`Error::ServiceIo`], [`Error::Enqueue`],
//!   [`Error::Dequeue`], [`Error::Timeout`]) are retried under backoff;
//! - permanent failures ([`Error::Encoder`], [`Error::Decoder`],
//!   [`Error::CatUnknown`], [`Error::Rejected`]) are never retried.

use std::{fmt, sync::Arc, time::Duration};
use thiserror::Error;

/// A boxed error type for dynamic error handling.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Boundary error taxonomy of the kernel.
#[derive(Error, Debug)]
pub enum Error {
    /// A broker-boundary call failed.
    #[error("service i/o failed: {0}")]
    ServiceIo(#[source] BoxError),

    /// Emitting an envelope to the broker failed.
    #[error("enqueue is failed: {0}")]
    Enqueue(#[source] BoxError),

    /// Receiving or acknowledging an envelope failed.
    #[error("dequeue is failed: {0}")]
    Dequeue(#[source] BoxError),

    /// A typed value could not be encoded.
    #[error("encoder failed: {0}")]
    Encoder(#[source] BoxError),

    /// An envelope payload could not be decoded.
    #[error("decoder failed: {0}")]
    Decoder(#[source] BoxError),

    /// Delivery to a typed sink was cancelled before the sink accepted it.
    #[error("routing cancelled for category {0}")]
    Routing(String),

    /// No sink is registered for the category of an incoming envelope.
    #[error("unknown category {0}")]
    CatUnknown(String),

    /// A deadline was exceeded.
    #[error("{phase} timed out after {after:?}")]
    Timeout {
        /// The operation that timed out.
        phase: &'static str,
        /// The deadline that was exceeded.
        after: Duration,
    },

    /// The application reported a processing failure.
    #[error("{0}")]
    Rejected(Failure),

    /// The kernel has been closed.
    #[error("kernel is closed")]
    Closed,
}

impl Error {
    /// Wrap a broker-boundary failure.
    pub fn service_io(err: impl Into<BoxError>) -> Self {
        Error::ServiceIo(err.into())
    }

    /// Wrap an emit failure.
    pub fn enqueue(err: impl Into<BoxError>) -> Self {
        Error::Enqueue(err.into())
    }

    /// Wrap a receive or acknowledgement failure.
    pub fn dequeue(err: impl Into<BoxError>) -> Self {
        Error::Dequeue(err.into())
    }

    /// Wrap an encode failure.
    pub fn encoder(err: impl Into<BoxError>) -> Self {
        Error::Encoder(err.into())
    }

    /// Wrap a decode failure.
    pub fn decoder(err: impl Into<BoxError>) -> Self {
        Error::Decoder(err.into())
    }

    /// A deadline of `after` was exceeded while performing `phase`.
    pub fn timeout(phase: &'static str, after: Duration) -> Self {
        Error::Timeout { phase, after }
    }

    /// Returns `true` for failures worth retrying at the broker boundary.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::ServiceIo(_) | Error::Enqueue(_) | Error::Dequeue(_) | Error::Timeout { .. }
        )
    }
}

/// Reason a message was negatively acknowledged.
///
/// Unlike [`BoxError`] a `Failure` is cheap to clone, so the same reason can
/// be handed to the broker under retry and published to a waiting bridge.
#[derive(Clone)]
pub struct Failure(Arc<dyn std::error::Error + Send + Sync + 'static>);

impl Failure {
    /// Create a failure from any error.
    pub fn new(err: impl Into<BoxError>) -> Self {
        Self(Arc::from(err.into()))
    }

    /// Borrow the underlying error.
    pub fn get_ref(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        &*self.0
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<Error> for Failure {
    fn from(err: Error) -> Self {
        Failure::new(err)
    }
}
