//! The wire-side envelope.

use bytes::Bytes;
use std::{any::Any, fmt, sync::Arc};

/// Broker-assigned identifier used to acknowledge a specific receive.
///
/// The kernel never interprets a digest; it only hands it back to the
/// [`Listener`](crate::Listener) that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest(String);

impl Digest {
    /// Create a digest from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the digest as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the broker did not assign a digest.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Digest {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Digest {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl AsRef<str> for Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Opaque per-envelope context set by a broker adapter.
///
/// The kernel passes it through to the typed message untouched. Adapters use
/// it to expose transport details (e.g. the request context of a socket
/// gateway) to the application.
#[derive(Clone, Default)]
pub struct IoContext(Option<Arc<dyn Any + Send + Sync>>);

impl IoContext {
    /// Wrap an adapter-specific value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Some(Arc::new(value)))
    }

    /// Borrow the context as `T`, if it holds a value of that type.
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|any| any.downcast_ref::<T>())
    }

    /// Returns `true` if no context was attached.
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Debug for IoContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("IoContext(..)"),
            None => f.write_str("IoContext(None)"),
        }
    }
}

/// Envelope exchanged with brokers.
///
/// A `Bag` is what the kernel produces from a typed value on egress and what
/// a broker hands to the kernel on ingress.
#[derive(Debug, Clone, Default)]
pub struct Bag {
    /// Routing key binding the envelope to a typed channel.
    pub category: String,
    /// Broker-assigned identifier used for acknowledgement.
    pub digest: Digest,
    /// Encoded payload.
    pub object: Bytes,
    /// Adapter-specific context, passed through to the handler.
    pub io_context: IoContext,
}

impl Bag {
    /// Create an envelope for the given category and payload.
    pub fn new(category: impl Into<String>, object: impl Into<Bytes>) -> Self {
        Self {
            category: category.into(),
            object: object.into(),
            ..Self::default()
        }
    }

    /// Set the digest.
    pub fn with_digest(mut self, digest: impl Into<Digest>) -> Self {
        self.digest = digest.into();
        self
    }

    /// Attach an adapter-specific context.
    pub fn with_io_context(mut self, io_context: IoContext) -> Self {
        self.io_context = io_context;
        self
    }
}
