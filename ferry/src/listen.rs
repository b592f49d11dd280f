//! Ingress helpers.
//!
//! Each helper opens an inbound channel on a [`ListenerCore`] with the codec
//! matching the payload shape and returns `(inbound, acknowledge)`.

use crate::codec::{EventCodec, Json, Packet, Raw};
use bytes::Bytes;
use ferry_core::{Event, Listener, Msg};
use ferry_std::ListenerCore;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc::{Receiver, Sender};

/// JSON values under the type name of `T`.
pub fn typed<T, L>(core: &ListenerCore<L>) -> (Receiver<Msg<T>>, Sender<Msg<T>>)
where
    T: DeserializeOwned + Send + 'static,
    L: Listener,
{
    core.dequeue(Json::<T>::new())
}

/// JSON values under `category`.
pub fn typed_as<T, L>(
    core: &ListenerCore<L>,
    category: &str,
) -> (Receiver<Msg<T>>, Sender<Msg<T>>)
where
    T: DeserializeOwned + Send + 'static,
    L: Listener,
{
    core.dequeue(Json::<T>::with_category(category))
}

/// Events under the type name of `T`.
pub fn event<T, L>(core: &ListenerCore<L>) -> (Receiver<Msg<Event<T>>>, Sender<Msg<Event<T>>>)
where
    T: DeserializeOwned + Send + 'static,
    L: Listener,
{
    core.dequeue(EventCodec::<T>::new())
}

/// Events under `category`.
pub fn event_as<T, L>(
    core: &ListenerCore<L>,
    category: &str,
) -> (Receiver<Msg<Event<T>>>, Sender<Msg<Event<T>>>)
where
    T: DeserializeOwned + Send + 'static,
    L: Listener,
{
    core.dequeue(EventCodec::<T>::with_category(category))
}

/// Opaque payloads, received as is.
pub fn bytes<L: Listener>(
    core: &ListenerCore<L>,
    category: &str,
) -> (Receiver<Msg<Bytes>>, Sender<Msg<Bytes>>) {
    core.dequeue(Raw::new(category))
}

/// Opaque payloads unwrapped from base64 in JSON.
pub fn packets<L: Listener>(
    core: &ListenerCore<L>,
    category: &str,
) -> (Receiver<Msg<Bytes>>, Sender<Msg<Bytes>>) {
    core.dequeue(Packet::new(category))
}
