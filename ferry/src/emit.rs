//! Egress helpers.
//!
//! Each helper opens an outbound channel on an [`EmitterCore`] with the codec
//! matching the payload shape and returns `(outbound, dead_letter)`.

use crate::codec::{EventCodec, Json, Packet, Raw};
use bytes::Bytes;
use ferry_core::{Emitter, Event};
use ferry_std::{EmitterCore, Writer};
use serde::Serialize;
use tokio::sync::mpsc::{Receiver, Sender};

/// JSON values under the type name of `T`.
pub fn typed<T, E>(core: &EmitterCore<E>) -> (Sender<T>, Receiver<T>)
where
    T: Serialize + Send + 'static,
    E: Emitter,
{
    core.enqueue(Json::<T>::new())
}

/// JSON values under `category`.
pub fn typed_as<T, E>(core: &EmitterCore<E>, category: &str) -> (Sender<T>, Receiver<T>)
where
    T: Serialize + Send + 'static,
    E: Emitter,
{
    core.enqueue(Json::<T>::with_category(category))
}

/// Events stamped with the realm and agent of the core configuration.
pub fn event<T, E>(core: &EmitterCore<E>) -> (Sender<Event<T>>, Receiver<Event<T>>)
where
    T: Serialize + Send + 'static,
    E: Emitter,
{
    core.enqueue(stamped(core, EventCodec::<T>::new()))
}

/// Events under `category`.
pub fn event_as<T, E>(
    core: &EmitterCore<E>,
    category: &str,
) -> (Sender<Event<T>>, Receiver<Event<T>>)
where
    T: Serialize + Send + 'static,
    E: Emitter,
{
    core.enqueue(stamped(core, EventCodec::<T>::with_category(category)))
}

/// Opaque payloads, sent as is.
pub fn bytes<E: Emitter>(
    core: &EmitterCore<E>,
    category: &str,
) -> (Sender<Bytes>, Receiver<Bytes>) {
    core.enqueue(Raw::new(category))
}

/// Opaque payloads wrapped as base64 in JSON, for brokers that only carry JSON.
pub fn packets<E: Emitter>(
    core: &EmitterCore<E>,
    category: &str,
) -> (Sender<Bytes>, Receiver<Bytes>) {
    core.enqueue(Packet::new(category))
}

/// A writer for JSON values under the type name of `T`.
pub fn writer<T, E>(core: &EmitterCore<E>) -> Writer<E, Json<T>>
where
    T: Serialize + 'static,
    E: Emitter,
{
    core.writer(Json::new())
}

fn stamped<T, E: Emitter>(core: &EmitterCore<E>, codec: EventCodec<T>) -> EventCodec<T> {
    let config = core.config();
    codec
        .with_realm(config.realm.clone())
        .with_agent(config.agent.clone())
}
