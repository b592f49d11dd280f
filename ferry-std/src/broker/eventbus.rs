//! Event-bus emitter.
//!
//! Each envelope becomes one bus entry: the agent is its source, the category
//! its detail type and the payload its detail. Buses only accept JSON details,
//! so binary payloads go through the [`Packet`](crate::codec::Packet) codec.
//!
//! Receiving from a bus is host-driven, see
//! [`handler::BusEvents`](super::handler::BusEvents).

use crate::{
    config::Config,
    kernel::{Factory, Kernel},
};
use ferry_core::{Bag, BoxError, Emitter, Error};
use serde::de::IgnoredAny;
use std::{convert::Infallible, future::Future, sync::Arc};

/// One entry of a put request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusEntry {
    /// Target bus.
    pub bus: String,
    /// Emitting agent.
    pub source: String,
    /// Category of the payload.
    pub detail_type: String,
    /// JSON payload.
    pub detail: String,
}

/// Outcome of a put request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOutcome {
    /// Number of entries the bus rejected.
    pub failed: usize,
    /// Reason of the first rejection.
    pub reason: Option<String>,
}

/// Client of an event bus.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not an event bus service",
    label = "implement `EventBusService` over the event bus SDK client"
)]
pub trait EventBusService: Send + Sync + 'static {
    /// Put `entries` on the bus.
    fn put_events(
        &self,
        entries: Vec<BusEntry>,
    ) -> impl Future<Output = Result<PutOutcome, BoxError>> + Send;
}

/// Rejected bus entries.
#[derive(Debug, thiserror::Error)]
#[error("{failed} entries rejected: {reason}")]
pub struct PutRejected {
    failed: usize,
    reason: String,
}

/// Emitter over an [`EventBusService`].
#[derive(Debug)]
pub struct EventBus<S> {
    service: S,
    bus: String,
    agent: String,
}

impl<S: EventBusService> EventBus<S> {
    /// Create an emitter for `bus`, tagging entries with the configured agent.
    pub fn new(service: S, bus: impl Into<String>, config: &Config) -> Self {
        Self {
            service,
            bus: bus.into(),
            agent: config.agent.clone(),
        }
    }

    /// Build an emit-only endpoint with the process-wide [`Factory`].
    pub fn endpoint(
        service: S,
        bus: impl Into<String>,
        config: Config,
    ) -> Kernel<Arc<Self>, Infallible> {
        Self::endpoint_with(Factory::global(), service, bus, config)
    }

    /// Build an emit-only endpoint with `factory`.
    pub fn endpoint_with(
        factory: &Factory,
        service: S,
        bus: impl Into<String>,
        config: Config,
    ) -> Kernel<Arc<Self>, Infallible> {
        let bus = Arc::new(Self::new(service, bus, &config));
        Kernel::emitting(factory.emitter(bus, config))
    }

    /// Name of the bus.
    pub fn bus(&self) -> &str {
        &self.bus
    }
}

impl<S: EventBusService> Emitter for EventBus<S> {
    async fn enq(&self, bag: Bag) -> Result<(), Error> {
        serde_json::from_slice::<IgnoredAny>(&bag.object).map_err(Error::encoder)?;
        let detail = String::from_utf8(bag.object.to_vec()).map_err(Error::encoder)?;

        let entry = BusEntry {
            bus: self.bus.clone(),
            source: self.agent.clone(),
            detail_type: bag.category,
            detail,
        };

        let outcome = self
            .service
            .put_events(vec![entry])
            .await
            .map_err(Error::enqueue)?;

        if outcome.failed > 0 {
            return Err(Error::enqueue(PutRejected {
                failed: outcome.failed,
                reason: outcome.reason.unwrap_or_default(),
            }));
        }
        Ok(())
    }
}
