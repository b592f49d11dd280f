//! # Category Router
//!
//! Maps a category to the typed sink registered for it. The listener core
//! looks up every incoming envelope here; registration happens once per
//! [`dequeue`](crate::listener::ListenerCore::dequeue) call.
//!
//! Sinks are type-erased behind [`Route`] so envelopes of any payload type
//! share one table.

use ferry_core::{Bag, Decoder, Error, Msg};
use parking_lot::RwLock;
use std::{collections::HashMap, future::Future, marker::PhantomData, pin::Pin, sync::Arc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Type-erased delivery of an envelope to a typed sink.
pub trait Route: Send + Sync {
    /// Decode `bag` and deliver it.
    ///
    /// Fails with [`Error::Decoder`] if the payload does not decode and with
    /// [`Error::Routing`] if `cancel` fires before the sink accepts it.
    fn route<'a>(
        &'a self,
        bag: Bag,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>>;
}

/// A [`Route`] decoding with `C` into a channel of `Msg<T>`.
pub struct TypedRoute<T, C> {
    codec: C,
    sink: mpsc::Sender<Msg<T>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T, C> TypedRoute<T, C> {
    /// Route decoding with `codec` into `sink`.
    pub fn new(codec: C, sink: mpsc::Sender<Msg<T>>) -> Self {
        Self {
            codec,
            sink,
            _marker: PhantomData,
        }
    }
}

impl<T, C> Route for TypedRoute<T, C>
where
    T: Send + 'static,
    C: Decoder<T>,
{
    fn route<'a>(
        &'a self,
        bag: Bag,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>> {
        Box::pin(async move {
            let object = self.codec.decode(&bag.object)?;
            let msg = Msg {
                object,
                category: bag.category,
                digest: bag.digest,
                io_context: bag.io_context,
                error: None,
            };
            let category = msg.category.clone();

            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Error::Routing(category)),
                sent = self.sink.send(msg) => sent.map_err(|_| Error::Routing(category)),
            }
        })
    }
}

/// Category routing table guarded by a readers-writer lock.
#[derive(Default, Clone)]
pub struct Routes {
    table: Arc<RwLock<HashMap<String, Arc<dyn Route>>>>,
}

impl Routes {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `route` for `category`, replacing any previous route.
    pub fn register(&self, category: impl Into<String>, route: Arc<dyn Route>) {
        self.table.write().insert(category.into(), route);
    }

    /// Find the route for `category`.
    pub fn lookup(&self, category: &str) -> Option<Arc<dyn Route>> {
        self.table.read().get(category).cloned()
    }

    /// Registered categories, in no particular order.
    pub fn categories(&self) -> Vec<String> {
        self.table.read().keys().cloned().collect()
    }

    /// Returns `true` if no route is registered.
    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    /// Remove every route, dropping the typed sinks they hold.
    pub fn clear(&self) {
        self.table.write().clear();
    }
}

impl std::fmt::Debug for Routes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Routes")
            .field("categories", &self.categories())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Json;

    fn route(sink: mpsc::Sender<Msg<String>>) -> Arc<dyn Route> {
        Arc::new(TypedRoute::new(Json::<String>::with_category("note"), sink))
    }

    #[tokio::test]
    async fn test_route_delivers_typed_msg() {
        let routes = Routes::new();
        let (tx, mut rx) = mpsc::channel(1);
        routes.register("note", route(tx));

        let bag = Bag::new("note", r#""hi""#).with_digest("d-1");
        let cancel = CancellationToken::new();
        routes
            .lookup("note")
            .unwrap()
            .route(bag, &cancel)
            .await
            .unwrap();

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.object, "hi");
        assert_eq!(msg.digest.as_str(), "d-1");
        assert!(routes.lookup("other").is_none());
    }

    #[tokio::test]
    async fn test_route_decode_failure() {
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let err = route(tx)
            .route(Bag::new("note", "not json"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decoder(_)));
    }

    #[tokio::test]
    async fn test_route_cancelled_while_blocked() {
        let (tx, _rx) = mpsc::channel(1);
        let route = route(tx);
        let cancel = CancellationToken::new();

        route
            .route(Bag::new("note", r#""a""#), &cancel)
            .await
            .unwrap();

        cancel.cancel();
        let err = route
            .route(Bag::new("note", r#""b""#), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Routing(cat) if cat == "note"));
    }

    #[test]
    fn test_clear() {
        let routes = Routes::new();
        let (tx, _rx) = mpsc::channel(1);
        routes.register("note", route(tx));
        assert_eq!(routes.categories(), vec!["note".to_string()]);

        routes.clear();
        assert!(routes.is_empty());
    }
}
