//! # Host-Driven Listeners
//!
//! Some runtimes do not let a process poll: they invoke a handler with a batch
//! of records and wait for its response. A [`Handler`] turns such invocations
//! into envelopes, dispatches them through a [`Bridge`] and answers the host
//! once the application has settled the batch.
//!
//! # Parts
//!
//! - [`Host`]: where invocations come from. [`Invocations`] is an in-process
//!   host, handy for tests and for runtimes driven from a custom loop.
//! - [`EventSource`]: how a request becomes envelopes and an outcome becomes
//!   a response.
//!
//! | Source | Category | Digest |
//! |---|---|---|
//! | [`QueueEvents`] | `Category` attribute | receipt handle |
//! | [`BusEvents`] | detail type | event id |
//! | [`RecordEvents::cdc`] | [`CdcRecord`] | fresh ulid |
//! | [`RecordEvents::object_store`] | [`ObjectStoreRecord`] | fresh ulid |
//!
//! # Example
//!
//! ```rust,ignore
//! let host = Invocations::new();
//! let invoker = host.invoker();
//! let kernel = Handler::endpoint(QueueEvents, host, Config::from_env());
//!
//! let (mut orders, ack) = kernel.listener().unwrap().dequeue(Json::<Order>::new());
//! // the runtime glue calls `invoker.invoke(event)` per invocation
//! ```

use super::queue::ATTR_CATEGORY;
use crate::{
    bridge::Bridge,
    config::Config,
    kernel::{Factory, Kernel},
};
use ferry_core::{Bag, Category, Digest, Error, Failure, Listener};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::HashMap, convert::Infallible, fmt, future::Future, sync::Arc};
use tokio::sync::{self, mpsc, oneshot};
use ulid::Ulid;

// ============================================================================
// Host
// ============================================================================

/// A request of the host, waiting for its response.
pub struct Invocation<Req, Resp> {
    request: Req,
    reply: oneshot::Sender<Resp>,
}

impl<Req, Resp> Invocation<Req, Resp> {
    /// Create an invocation and the receiver of its response.
    pub fn new(request: Req) -> (Self, oneshot::Receiver<Resp>) {
        let (reply, response) = oneshot::channel();
        (Self { request, reply }, response)
    }

    /// The request.
    pub fn request(&self) -> &Req {
        &self.request
    }

    /// Split into the request and its reply handle.
    pub fn into_parts(self) -> (Req, oneshot::Sender<Resp>) {
        (self.request, self.reply)
    }
}

impl<Req: fmt::Debug, Resp> fmt::Debug for Invocation<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

/// Runtime that invokes a handler.
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot host handlers for `{Req}`",
    label = "implement `Host<{Req}, {Resp}>` over the invocation runtime"
)]
pub trait Host<Req, Resp>: Send + Sync + 'static {
    /// Wait for the next invocation, `None` once the host shuts down.
    fn next(&self) -> impl Future<Output = Option<Invocation<Req, Resp>>> + Send;
}

/// In-process host fed through [`Invoker`] handles.
pub struct Invocations<Req, Resp> {
    tx: mpsc::Sender<Invocation<Req, Resp>>,
    rx: sync::Mutex<mpsc::Receiver<Invocation<Req, Resp>>>,
}

impl<Req, Resp> Invocations<Req, Resp> {
    /// Create a host serving one invocation at a time.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            tx,
            rx: sync::Mutex::new(rx),
        }
    }

    /// A handle that submits invocations to this host.
    pub fn invoker(&self) -> Invoker<Req, Resp> {
        Invoker {
            tx: self.tx.clone(),
        }
    }
}

impl<Req, Resp> Default for Invocations<Req, Resp> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Req, Resp> fmt::Debug for Invocations<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocations").finish_non_exhaustive()
    }
}

impl<Req, Resp> Host<Req, Resp> for Invocations<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    async fn next(&self) -> Option<Invocation<Req, Resp>> {
        self.rx.lock().await.recv().await
    }
}

/// Submits invocations to an [`Invocations`] host.
pub struct Invoker<Req, Resp> {
    tx: mpsc::Sender<Invocation<Req, Resp>>,
}

impl<Req, Resp> Invoker<Req, Resp> {
    /// Invoke the handler with `request` and wait for its response.
    ///
    /// Fails with [`Error::Closed`] when the host is gone or stops before
    /// answering.
    pub async fn invoke(&self, request: Req) -> Result<Resp, Error> {
        let (invocation, response) = Invocation::new(request);
        self.tx.send(invocation).await.map_err(|_| Error::Closed)?;
        response.await.map_err(|_| Error::Closed)
    }
}

impl<Req, Resp> Clone for Invoker<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<Req, Resp> fmt::Debug for Invoker<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invoker").finish_non_exhaustive()
    }
}

// ============================================================================
// Handler
// ============================================================================

/// Translates host requests into envelopes and outcomes into responses.
pub trait EventSource: Send + Sync + 'static {
    /// What the host invokes the handler with.
    type Request: Send + 'static;
    /// What the handler answers.
    type Response: Send + 'static;

    /// Envelopes carried by `request`.
    fn batch(&self, request: Self::Request) -> Result<Vec<Bag>, Error>;

    /// Response for the settled batch.
    fn respond(&self, outcome: Result<(), Error>) -> Self::Response;
}

/// Listener driven by a [`Host`].
pub struct Handler<S, H> {
    source: S,
    host: H,
    bridge: Bridge,
}

impl<S, H> Handler<S, H>
where
    S: EventSource,
    H: Host<S::Request, S::Response>,
{
    /// Create a handler dispatching through `bridge`.
    pub fn new(source: S, host: H, bridge: Bridge) -> Self {
        Self {
            source,
            host,
            bridge,
        }
    }

    /// Build a listen-only endpoint with the process-wide [`Factory`].
    pub fn endpoint(source: S, host: H, config: Config) -> Kernel<Infallible, Arc<Self>> {
        Self::endpoint_with(Factory::global(), source, host, config)
    }

    /// Build a listen-only endpoint with `factory`.
    pub fn endpoint_with(
        factory: &Factory,
        source: S,
        host: H,
        config: Config,
    ) -> Kernel<Infallible, Arc<Self>> {
        let handler = Self::new(source, host, factory.bridge(&config));
        Kernel::listening(factory.listener(Arc::new(handler), config))
    }

    /// The bridge invocations are dispatched through.
    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// Dispatch one request and build its response.
    pub async fn handle(&self, request: S::Request) -> S::Response {
        let outcome = match self.source.batch(request) {
            Ok(batch) => self.bridge.dispatch(batch).await,
            Err(err) => Err(err),
        };

        if let Err(err) = &outcome {
            tracing::warn!(err = %err, "invocation failed");
        }
        self.source.respond(outcome)
    }
}

impl<S, H> Listener for Handler<S, H>
where
    S: EventSource,
    H: Host<S::Request, S::Response>,
{
    async fn ask(&self) -> Result<Vec<Bag>, Error> {
        self.bridge.ask().await
    }

    async fn ack(&self, digest: &Digest) -> Result<(), Error> {
        self.bridge.ack(digest).await
    }

    async fn err(&self, digest: &Digest, reason: &Failure) -> Result<(), Error> {
        self.bridge.err(digest, reason).await
    }

    async fn run(&self) {
        tracing::debug!("host loop started");

        while let Some(invocation) = self.host.next().await {
            let (request, reply) = invocation.into_parts();
            let response = self.handle(request).await;
            let _ = reply.send(response);
        }

        tracing::debug!("host loop stopped");
    }
}

// ============================================================================
// Queue records
// ============================================================================

/// Batch of queue messages delivered by the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueEvent {
    /// The messages.
    #[serde(rename = "Records", default)]
    pub records: Vec<QueueRecord>,
}

/// One queue message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRecord {
    /// Queue-assigned id.
    #[serde(default)]
    pub message_id: String,
    /// Handle used to delete the message.
    #[serde(default)]
    pub receipt_handle: String,
    /// Payload.
    #[serde(default)]
    pub body: String,
    /// Message attributes.
    #[serde(default)]
    pub message_attributes: HashMap<String, AttributeValue>,
}

/// Value of a message attribute.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeValue {
    /// String value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    /// Declared attribute type.
    #[serde(default)]
    pub data_type: String,
}

impl QueueRecord {
    fn attribute(&self, key: &str) -> &str {
        self.message_attributes
            .get(key)
            .and_then(|value| value.string_value.as_deref())
            .unwrap_or_default()
    }
}

/// Queue messages pushed by the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueEvents;

impl EventSource for QueueEvents {
    type Request = QueueEvent;
    type Response = Result<(), Error>;

    fn batch(&self, request: QueueEvent) -> Result<Vec<Bag>, Error> {
        Ok(request
            .records
            .into_iter()
            .map(|record| {
                let cat = record.attribute(ATTR_CATEGORY).to_owned();
                Bag::new(cat, record.body).with_digest(record.receipt_handle)
            })
            .collect())
    }

    fn respond(&self, outcome: Result<(), Error>) -> Self::Response {
        outcome
    }
}

// ============================================================================
// Bus events
// ============================================================================

/// Event delivered by an event bus.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusEvent {
    /// Bus-assigned id.
    #[serde(default)]
    pub id: String,
    /// Category of the payload.
    #[serde(rename = "detail-type", default)]
    pub detail_type: String,
    /// Emitting agent.
    #[serde(default)]
    pub source: String,
    /// JSON payload.
    #[serde(default)]
    pub detail: Value,
}

/// Bus events pushed by the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct BusEvents;

impl EventSource for BusEvents {
    type Request = BusEvent;
    type Response = Result<(), Error>;

    fn batch(&self, request: BusEvent) -> Result<Vec<Bag>, Error> {
        let object = serde_json::to_vec(&request.detail).map_err(Error::decoder)?;
        Ok(vec![
            Bag::new(request.detail_type, object).with_digest(request.id),
        ])
    }

    fn respond(&self, outcome: Result<(), Error>) -> Self::Response {
        outcome
    }
}

// ============================================================================
// Raw records
// ============================================================================

/// Batch of raw records delivered by the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordsEvent {
    /// The records, passed through undecoded.
    #[serde(rename = "Records", default)]
    pub records: Vec<Value>,
}

/// Raw records pushed by the host, all under one category.
///
/// Records carry no identity the kernel could acknowledge with, so each gets
/// a fresh digest.
#[derive(Debug, Clone, Copy)]
pub struct RecordEvents {
    category: &'static str,
}

impl RecordEvents {
    /// Records under `category`.
    pub fn new(category: &'static str) -> Self {
        Self { category }
    }

    /// Change-data-capture records, decodable as [`CdcRecord`].
    pub fn cdc() -> Self {
        Self::new(CdcRecord::CATEGORY)
    }

    /// Object-store notifications, decodable as [`ObjectStoreRecord`].
    pub fn object_store() -> Self {
        Self::new(ObjectStoreRecord::CATEGORY)
    }

    /// The category of every record.
    pub fn category(&self) -> &'static str {
        self.category
    }
}

impl EventSource for RecordEvents {
    type Request = RecordsEvent;
    type Response = Result<(), Error>;

    fn batch(&self, request: RecordsEvent) -> Result<Vec<Bag>, Error> {
        request
            .records
            .iter()
            .map(|record| {
                let object = serde_json::to_vec(record).map_err(Error::decoder)?;
                Ok(Bag::new(self.category, object).with_digest(Ulid::new().to_string()))
            })
            .collect()
    }

    fn respond(&self, outcome: Result<(), Error>) -> Self::Response {
        outcome
    }
}

/// A row change captured from a table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CdcRecord {
    /// Change id.
    #[serde(rename = "eventID", default)]
    pub id: String,
    /// `INSERT`, `MODIFY` or `REMOVE`.
    #[serde(rename = "eventName", default)]
    pub kind: String,
    /// The change.
    #[serde(rename = "dynamodb", default)]
    pub change: CdcChange,
}

/// Keys and images of a row change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CdcChange {
    /// Primary key of the row.
    #[serde(default)]
    pub keys: Value,
    /// Row after the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_image: Option<Value>,
    /// Row before the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_image: Option<Value>,
}

impl Category for CdcRecord {
    const CATEGORY: &'static str = "CdcRecord";
}

/// A notification about an object of a bucket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectStoreRecord {
    /// What happened, e.g. `ObjectCreated:Put`.
    #[serde(rename = "eventName", default)]
    pub kind: String,
    /// When it happened.
    #[serde(rename = "eventTime", default)]
    pub time: String,
    /// The affected object.
    #[serde(rename = "s3", default)]
    pub entity: ObjectEntity,
}

/// Bucket and object of a notification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectEntity {
    /// The bucket.
    #[serde(default)]
    pub bucket: BucketRef,
    /// The object.
    #[serde(default)]
    pub object: ObjectRef,
}

/// A bucket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BucketRef {
    /// Bucket name.
    #[serde(default)]
    pub name: String,
}

/// An object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Object key.
    #[serde(default)]
    pub key: String,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Entity tag.
    #[serde(rename = "eTag", default)]
    pub etag: String,
}

impl Category for ObjectStoreRecord {
    const CATEGORY: &'static str = "ObjectStoreRecord";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backoff::Backoff, codec::Json, kernel::Mode};
    use serde_json::json;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    fn config() -> Config {
        Config::default()
            .with_poll_frequency(Duration::from_millis(1))
            .with_backoff(Backoff::constant(Duration::from_millis(1), 2))
    }

    fn queue_event(records: &[(&str, &str)]) -> QueueEvent {
        let records = records
            .iter()
            .map(|(receipt, body)| {
                json!({
                    "messageId": receipt,
                    "receiptHandle": receipt,
                    "body": body,
                    "messageAttributes": {
                        "Category": {"stringValue": "Order", "dataType": "String"}
                    }
                })
            })
            .collect::<Vec<_>>();
        serde_json::from_value(json!({ "Records": records })).unwrap()
    }

    #[tokio::test]
    async fn test_invocation_settled_by_application() {
        let host = Invocations::new();
        let invoker = host.invoker();
        let kernel = Handler::endpoint_with(&Factory::new(Mode::Polling), QueueEvents, host, config());

        let Some(listener) = kernel.listener() else {
            panic!("listen-only endpoint");
        };
        let (mut orders, ack) = listener.dequeue(Json::<Value>::with_category("Order"));
        kernel.start();

        let invocation =
            tokio::spawn(async move { invoker.invoke(queue_event(&[("r1", "1"), ("r2", "2")])).await });

        for _ in 0..2 {
            let msg = tokio::time::timeout(WAIT, orders.recv()).await.unwrap().unwrap();
            ack.send(msg).await.unwrap();
        }

        let response = tokio::time::timeout(WAIT, invocation).await.unwrap().unwrap();
        assert!(matches!(response, Ok(Ok(()))));
        kernel.close().await;
    }

    #[tokio::test]
    async fn test_invocation_rejected_by_application() {
        let host = Invocations::new();
        let invoker = host.invoker();
        let kernel = Handler::endpoint_with(&Factory::new(Mode::Polling), QueueEvents, host, config());

        let Some(listener) = kernel.listener() else {
            panic!("listen-only endpoint");
        };
        let (mut orders, ack) = listener.dequeue(Json::<Value>::with_category("Order"));
        kernel.start();

        let invocation = tokio::spawn(async move { invoker.invoke(queue_event(&[("r1", "1")])).await });

        let msg = tokio::time::timeout(WAIT, orders.recv()).await.unwrap().unwrap();
        ack.send(msg.fail("bad order")).await.unwrap();

        let response = tokio::time::timeout(WAIT, invocation).await.unwrap().unwrap();
        assert!(matches!(response, Ok(Err(Error::Rejected(_)))));
        kernel.close().await;
    }

    #[test]
    fn test_queue_records() {
        let batch = QueueEvents.batch(queue_event(&[("r1", "{}")])).unwrap();
        assert_eq!(batch[0].category, "Order");
        assert_eq!(batch[0].digest.as_str(), "r1");
        assert_eq!(&batch[0].object[..], b"{}");
    }

    #[test]
    fn test_bus_event() {
        let event: BusEvent = serde_json::from_value(json!({
            "id": "e1",
            "detail-type": "Order",
            "source": "billing",
            "detail": {"n": 1}
        }))
        .unwrap();

        let batch = BusEvents.batch(event).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].category, "Order");
        assert_eq!(batch[0].digest.as_str(), "e1");
        assert_eq!(&batch[0].object[..], br#"{"n":1}"#);
    }

    #[test]
    fn test_cdc_records() {
        let event: RecordsEvent = serde_json::from_value(json!({
            "Records": [
                {"eventID": "1", "eventName": "INSERT", "dynamodb": {"Keys": {"id": {"S": "a"}}}},
                {"eventID": "2", "eventName": "REMOVE", "dynamodb": {"Keys": {"id": {"S": "b"}}}}
            ]
        }))
        .unwrap();

        let batch = RecordEvents::cdc().batch(event).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|bag| bag.category == "CdcRecord"));
        assert_ne!(batch[0].digest, batch[1].digest);

        let record: CdcRecord = serde_json::from_slice(&batch[1].object).unwrap();
        assert_eq!(record.kind, "REMOVE");
        assert_eq!(record.change.keys["id"]["S"], "b");
    }

    #[test]
    fn test_object_store_record() {
        let record: ObjectStoreRecord = serde_json::from_value(json!({
            "eventName": "ObjectCreated:Put",
            "s3": {"bucket": {"name": "inbox"}, "object": {"key": "a.txt", "size": 3}}
        }))
        .unwrap();

        assert_eq!(record.entity.bucket.name, "inbox");
        assert_eq!(record.entity.object.size, 3);
        assert_eq!(RecordEvents::object_store().category(), "ObjectStoreRecord");
    }

    #[tokio::test]
    async fn test_invoke_without_host() {
        let host = Invocations::<QueueEvent, Result<(), Error>>::new();
        let invoker = host.invoker();
        drop(host);

        let err = invoker.invoke(QueueEvent::default()).await.unwrap_err();
        assert!(matches!(err, Error::Closed));
    }
}
