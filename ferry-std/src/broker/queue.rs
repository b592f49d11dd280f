//! Polled message-queue adapter.
//!
//! Category and agent travel as message attributes ([`ATTR_CATEGORY`],
//! [`ATTR_SOURCE`]) next to the payload, and the receipt handle of a received
//! message is its digest. Queues named with a `.fifo` suffix are ordered per
//! category: the category is the message group.
//!
//! ```rust,ignore
//! let kernel = Queue::builder(client, "orders")
//!     .with_config(Config::from_env())
//!     .with_batch_size(25)
//!     .build();
//! ```

use crate::{
    config::Config,
    kernel::{Factory, Kernel},
};
use bytes::Bytes;
use ferry_core::{Bag, BoxError, Digest, Emitter, Error, Failure, Listener};
use std::{collections::HashMap, convert::Infallible, future::Future, sync::Arc};

/// Attribute carrying the category of a message.
pub const ATTR_CATEGORY: &str = "Category";
/// Attribute carrying the agent that emitted a message.
pub const ATTR_SOURCE: &str = "Source";
/// Most messages a queue delivers per receive call.
pub const MAX_BATCH: usize = 10;

/// A message as the queue service sees it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueMessage {
    /// Payload.
    pub body: Bytes,
    /// String attributes.
    pub attributes: HashMap<String, String>,
    /// Ordering group, for FIFO queues.
    pub group: Option<String>,
    /// Receipt handle of a received message.
    pub receipt: String,
}

impl QueueMessage {
    /// The value of attribute `key`, or `""` if absent.
    pub fn attribute(&self, key: &str) -> &str {
        self.attributes.get(key).map(String::as_str).unwrap_or_default()
    }
}

/// Client of a queue service.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a queue service",
    label = "implement `QueueService` over the queue SDK client"
)]
pub trait QueueService: Send + Sync + 'static {
    /// Send one message to `queue`.
    fn send(
        &self,
        queue: &str,
        message: QueueMessage,
    ) -> impl Future<Output = Result<(), BoxError>> + Send;

    /// Receive up to `max` messages from `queue`.
    fn receive(
        &self,
        queue: &str,
        max: usize,
    ) -> impl Future<Output = Result<Vec<QueueMessage>, BoxError>> + Send;

    /// Delete a received message.
    fn delete(&self, queue: &str, receipt: &str)
    -> impl Future<Output = Result<(), BoxError>> + Send;

    /// Make a received message visible again.
    ///
    /// The default leaves it to the visibility timeout of the queue.
    fn release(
        &self,
        _queue: &str,
        _receipt: &str,
    ) -> impl Future<Output = Result<(), BoxError>> + Send {
        async { Ok(()) }
    }
}

/// Broker over a [`QueueService`].
#[derive(Debug)]
pub struct Queue<S> {
    service: S,
    queue: String,
    agent: String,
    batch_size: usize,
}

impl<S: QueueService> Queue<S> {
    /// Create an adapter for `queue`, tagging messages with the configured agent.
    pub fn new(service: S, queue: impl Into<String>, config: &Config) -> Self {
        Self {
            service,
            queue: queue.into(),
            agent: config.agent.clone(),
            batch_size: 1,
        }
    }

    /// Start building an endpoint for `queue`.
    pub fn builder(service: S, queue: impl Into<String>) -> Builder<S> {
        Builder {
            service,
            queue: queue.into(),
            config: Config::default(),
            batch_size: 1,
            factory: None,
        }
    }

    /// Receive up to `n` messages per `ask`, at most [`MAX_BATCH`].
    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n.clamp(1, MAX_BATCH);
        self
    }

    /// Name of the queue.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Returns `true` for queues that order messages per group.
    pub fn is_fifo(&self) -> bool {
        self.queue.ends_with(".fifo")
    }

    /// Messages received per `ask`.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl<S: QueueService> Emitter for Queue<S> {
    async fn enq(&self, bag: Bag) -> Result<(), Error> {
        let message = QueueMessage {
            group: self.is_fifo().then(|| bag.category.clone()),
            attributes: HashMap::from([
                (ATTR_CATEGORY.to_owned(), bag.category),
                (ATTR_SOURCE.to_owned(), self.agent.clone()),
            ]),
            body: bag.object,
            receipt: String::new(),
        };

        self.service
            .send(&self.queue, message)
            .await
            .map_err(Error::enqueue)
    }
}

impl<S: QueueService> Listener for Queue<S> {
    async fn ask(&self) -> Result<Vec<Bag>, Error> {
        let received = self
            .service
            .receive(&self.queue, self.batch_size)
            .await
            .map_err(Error::dequeue)?;

        Ok(received
            .into_iter()
            .map(|msg| {
                let cat = msg.attribute(ATTR_CATEGORY).to_owned();
                Bag::new(cat, msg.body).with_digest(msg.receipt)
            })
            .collect())
    }

    async fn ack(&self, digest: &Digest) -> Result<(), Error> {
        self.service
            .delete(&self.queue, digest.as_str())
            .await
            .map_err(Error::service_io)
    }

    async fn err(&self, digest: &Digest, reason: &Failure) -> Result<(), Error> {
        tracing::debug!(digest = %digest, err = %reason, "release");
        self.service
            .release(&self.queue, digest.as_str())
            .await
            .map_err(Error::service_io)
    }
}

/// Poller pool needed to receive `batch_size` messages per poll interval.
pub fn pollers_for(batch_size: usize) -> usize {
    if batch_size > MAX_BATCH {
        batch_size / MAX_BATCH + 1
    } else {
        1
    }
}

/// Builder of queue endpoints.
pub struct Builder<S> {
    service: S,
    queue: String,
    config: Config,
    batch_size: usize,
    factory: Option<Factory>,
}

impl<S: QueueService> Builder<S> {
    /// Use `config` for the cores and the adapter.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Receive `n` messages per poll interval.
    ///
    /// Above [`MAX_BATCH`] the poller pool grows instead.
    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    /// Build cores with `factory` instead of [`Factory::global`].
    pub fn with_factory(mut self, factory: Factory) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Build an endpoint that emits to and listens on the queue.
    pub fn build(self) -> Kernel<Arc<Queue<S>>, Arc<Queue<S>>> {
        let (factory, queue, config) = self.parts();
        factory.endpoint(queue, config)
    }

    /// Build an emit-only endpoint.
    pub fn build_emitter(self) -> Kernel<Arc<Queue<S>>, Infallible> {
        let (factory, queue, config) = self.parts();
        Kernel::emitting(factory.emitter(Arc::new(queue), config))
    }

    /// Build a listen-only endpoint.
    pub fn build_listener(self) -> Kernel<Infallible, Arc<Queue<S>>> {
        let (factory, queue, config) = self.parts();
        Kernel::listening(factory.listener(Arc::new(queue), config))
    }

    fn parts(self) -> (Factory, Queue<S>, Config) {
        let pollers = pollers_for(self.batch_size).max(self.config.poller_pool);
        let config = self.config.with_poller_pool(pollers);
        let queue = Queue::new(self.service, self.queue, &config).with_batch_size(self.batch_size);
        let factory = self.factory.unwrap_or_else(|| Factory::global().clone());
        (factory, queue, config)
    }
}
