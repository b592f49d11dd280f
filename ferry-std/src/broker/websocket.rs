//! Socket-gateway adapter.
//!
//! Inbound, every gateway request is one envelope: the route key is its
//! category and the connection id its digest, while the request context rides
//! along as the [`IoContext`] of the message. The gateway gets `200` once the
//! application acknowledges the message and `408` otherwise.
//!
//! Outbound, the category of an envelope names the connection it is posted to,
//! so replies are usually sent with `Writer::enq_to(reply, connection_id)`.

use super::handler::{EventSource, Handler, Host};
use crate::{
    config::Config,
    kernel::{Factory, Kernel},
};
use bytes::Bytes;
use ferry_core::{Bag, BoxError, Digest, Emitter, Error, Failure, IoContext, Listener};
use serde::{Deserialize, Serialize};
use std::{future::Future, sync::Arc};

/// Status answered for an acknowledged request.
pub const STATUS_OK: u16 = 200;
/// Status answered for a failed or expired request.
pub const STATUS_TIMEOUT: u16 = 408;

/// A request received by the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRequest {
    /// Payload.
    #[serde(default)]
    pub body: String,
    /// Connection and route of the request.
    #[serde(default)]
    pub request_context: RequestContext,
}

/// Connection and route of a gateway request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    /// Route selected for the request.
    #[serde(default)]
    pub route_key: String,
    /// Connection the request arrived on.
    #[serde(default)]
    pub connection_id: String,
    /// `CONNECT`, `MESSAGE` or `DISCONNECT`.
    #[serde(default)]
    pub event_type: String,
    /// Domain of the gateway.
    #[serde(default)]
    pub domain_name: String,
    /// Deployment stage of the gateway.
    #[serde(default)]
    pub stage: String,
}

/// Response to a gateway request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    /// HTTP status.
    pub status_code: u16,
}

/// Client posting data to open connections.
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot post to gateway connections",
    label = "implement `ConnectionService` over the gateway management client"
)]
pub trait ConnectionService: Send + Sync + 'static {
    /// Post `data` to `connection`.
    fn post_to_connection(
        &self,
        connection: &str,
        data: Bytes,
    ) -> impl Future<Output = Result<(), BoxError>> + Send;
}

/// Gateway requests pushed by the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct GatewayRequests;

impl EventSource for GatewayRequests {
    type Request = GatewayRequest;
    type Response = GatewayResponse;

    fn batch(&self, request: GatewayRequest) -> Result<Vec<Bag>, Error> {
        let ctx = request.request_context;
        let bag = Bag::new(ctx.route_key.clone(), request.body)
            .with_digest(ctx.connection_id.clone())
            .with_io_context(IoContext::new(ctx));
        Ok(vec![bag])
    }

    fn respond(&self, outcome: Result<(), Error>) -> GatewayResponse {
        let status_code = match outcome {
            Ok(()) => STATUS_OK,
            Err(_) => STATUS_TIMEOUT,
        };
        GatewayResponse { status_code }
    }
}

/// Bidirectional broker over a socket gateway.
pub struct WebSocket<S, H> {
    service: S,
    handler: Handler<GatewayRequests, H>,
}

impl<S, H> WebSocket<S, H>
where
    S: ConnectionService,
    H: Host<GatewayRequest, GatewayResponse>,
{
    /// Create an adapter posting through `service` and receiving from `host`.
    pub fn new(service: S, host: H, factory: &Factory, config: &Config) -> Self {
        Self {
            service,
            handler: Handler::new(GatewayRequests, host, factory.bridge(config)),
        }
    }

    /// Build an endpoint with the process-wide [`Factory`].
    pub fn endpoint(service: S, host: H, config: Config) -> Kernel<Arc<Self>, Arc<Self>> {
        Self::endpoint_with(Factory::global(), service, host, config)
    }

    /// Build an endpoint with `factory`.
    pub fn endpoint_with(
        factory: &Factory,
        service: S,
        host: H,
        config: Config,
    ) -> Kernel<Arc<Self>, Arc<Self>> {
        factory.endpoint(Self::new(service, host, factory, &config), config)
    }
}

impl<S, H> Emitter for WebSocket<S, H>
where
    S: ConnectionService,
    H: Host<GatewayRequest, GatewayResponse>,
{
    async fn enq(&self, bag: Bag) -> Result<(), Error> {
        tracing::debug!(cat = %bag.category, "post to connection");
        self.service
            .post_to_connection(&bag.category, bag.object)
            .await
            .map_err(Error::enqueue)
    }
}

impl<S, H> Listener for WebSocket<S, H>
where
    S: ConnectionService,
    H: Host<GatewayRequest, GatewayResponse>,
{
    async fn ask(&self) -> Result<Vec<Bag>, Error> {
        self.handler.ask().await
    }

    async fn ack(&self, digest: &Digest) -> Result<(), Error> {
        self.handler.ack(digest).await
    }

    async fn err(&self, digest: &Digest, reason: &Failure) -> Result<(), Error> {
        self.handler.err(digest, reason).await
    }

    async fn run(&self) {
        self.handler.run().await
    }
}
