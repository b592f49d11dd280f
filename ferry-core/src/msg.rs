//! Typed inbound message.

use crate::{
    bag::{Digest, IoContext},
    error::{BoxError, Failure},
};

/// An inbound envelope after decoding.
///
/// The application reads a `Msg` from the inbound channel and posts it (or a
/// [`fail`](Msg::fail)ed copy) back on the acknowledge channel. A message with
/// an `error` is negatively acknowledged at the broker.
#[derive(Debug, Clone)]
pub struct Msg<T> {
    /// Decoded payload.
    pub object: T,
    /// Category the envelope was routed by.
    pub category: String,
    /// Broker-assigned identifier used for acknowledgement.
    pub digest: Digest,
    /// Adapter-specific context.
    pub io_context: IoContext,
    /// Processing failure; `None` on success.
    pub error: Option<Failure>,
}

impl<T> Msg<T> {
    /// Create a message carrying `object` for the given category and digest.
    pub fn new(object: T, category: impl Into<String>, digest: impl Into<Digest>) -> Self {
        Self {
            object,
            category: category.into(),
            digest: digest.into(),
            io_context: IoContext::default(),
            error: None,
        }
    }

    /// Mark the message as failed.
    pub fn fail(mut self, err: impl Into<BoxError>) -> Self {
        self.error = Some(Failure::new(err));
        self
    }

    /// Returns `true` if the message was marked as failed.
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Transform the payload, keeping routing and acknowledgement data.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Msg<U> {
        Msg {
            object: f(self.object),
            category: self.category,
            digest: self.digest,
            io_context: self.io_context,
            error: self.error,
        }
    }
}
