//! # Broker Contracts
//!
//! The kernel consumes brokers through two narrow traits. Adapters implement
//! them and nothing else: retries, routing, draining and dead-letter handling
//! live in the kernel.
//!
//! # Cancellation
//!
//! There is no context parameter. The kernel races every broker future against
//! its own cancellation signal and drops the future when the kernel closes,
//! so implementations must be cancel-safe at their await points.
//!
//! # Static vs Dynamic Dispatch
//!
//! Both traits return `impl Future` for zero-cost static dispatch. The kernel
//! cores are generic over the adapter type; use [`Arc`] to share one adapter
//! between the emitter and the listener side of an endpoint.

use crate::{
    bag::{Bag, Digest},
    error::{Error, Failure},
};
use std::{convert::Infallible, future::Future, sync::Arc};

/// Egress port on a message broker.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not an `Emitter`",
    label = "missing `Emitter` implementation",
    note = "Emitters must implement `enq` to hand envelopes to the broker."
)]
pub trait Emitter: Send + Sync + 'static {
    /// Enqueue the envelope to the broker. Returns once the broker accepted it.
    ///
    /// Idempotency is not assumed: the kernel may call `enq` again for the same
    /// envelope after a failure.
    fn enq(&self, bag: Bag) -> impl Future<Output = Result<(), Error>> + Send;

    /// Release adapter resources. Called once when the emitter core closes.
    fn close(&self) -> impl Future<Output = Result<(), Error>> + Send {
        async { Ok(()) }
    }
}

/// Ingress port on a message broker.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a `Listener`",
    label = "missing `Listener` implementation",
    note = "Listeners must implement `ask`, `ack` and `err`."
)]
pub trait Listener: Send + Sync + 'static {
    /// Receive zero or more envelopes.
    ///
    /// An error does not commit the listener to any particular state; the
    /// kernel simply asks again.
    fn ask(&self) -> impl Future<Output = Result<Vec<Bag>, Error>> + Send;

    /// Acknowledge successful processing of the envelope with `digest`.
    fn ack(&self, digest: &Digest) -> impl Future<Output = Result<(), Error>> + Send;

    /// Negatively acknowledge the envelope with `digest`.
    ///
    /// Semantics are broker-defined, often equivalent to expiry of the
    /// visibility timeout.
    fn err(
        &self,
        digest: &Digest,
        reason: &Failure,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Drive a self-feeding listener.
    ///
    /// Listeners fed by a host runtime (rather than polled) run their host loop
    /// here. The listener core calls it in a dedicated task; the default
    /// implementation returns immediately.
    fn run(&self) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Release adapter resources. Called once when the listener core closes.
    fn close(&self) -> impl Future<Output = Result<(), Error>> + Send {
        async { Ok(()) }
    }
}

// Shared adapters: one instance behind both cores of an endpoint.

impl<T: Emitter> Emitter for Arc<T> {
    fn enq(&self, bag: Bag) -> impl Future<Output = Result<(), Error>> + Send {
        (**self).enq(bag)
    }

    fn close(&self) -> impl Future<Output = Result<(), Error>> + Send {
        (**self).close()
    }
}

impl<T: Listener> Listener for Arc<T> {
    fn ask(&self) -> impl Future<Output = Result<Vec<Bag>, Error>> + Send {
        (**self).ask()
    }

    fn ack(&self, digest: &Digest) -> impl Future<Output = Result<(), Error>> + Send {
        (**self).ack(digest)
    }

    fn err(
        &self,
        digest: &Digest,
        reason: &Failure,
    ) -> impl Future<Output = Result<(), Error>> + Send {
        (**self).err(digest, reason)
    }

    fn run(&self) -> impl Future<Output = ()> + Send {
        (**self).run()
    }

    fn close(&self) -> impl Future<Output = Result<(), Error>> + Send {
        (**self).close()
    }
}

// One-sided endpoints use `Infallible` for the side they do not have.

impl Emitter for Infallible {
    async fn enq(&self, _bag: Bag) -> Result<(), Error> {
        match *self {}
    }
}

impl Listener for Infallible {
    async fn ask(&self) -> Result<Vec<Bag>, Error> {
        match *self {}
    }

    async fn ack(&self, _digest: &Digest) -> Result<(), Error> {
        match *self {}
    }

    async fn err(&self, _digest: &Digest, _reason: &Failure) -> Result<(), Error> {
        match *self {}
    }
}
