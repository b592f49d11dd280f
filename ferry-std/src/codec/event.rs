use bytes::Bytes;
use chrono::Utc;
use ferry_core::{Categorized, Decoder, Encoder, Error, Event, Meta, category_of};
use serde::{Serialize, de::DeserializeOwned};
use std::{fmt, marker::PhantomData};
use ulid::Ulid;

/// JSON codec for [`Event`]s that stamps missing metadata on encode.
///
/// Before encoding, empty fields are filled in:
///
/// - `id` with a fresh ULID,
/// - `type` with the category,
/// - `realm` and `agent` with the codec defaults,
/// - `created` with the current time.
///
/// Fields that are already set are left alone.
pub struct EventCodec<T> {
    category: String,
    realm: String,
    agent: String,
    _marker: PhantomData<fn() -> T>,
}

#[derive(Serialize)]
struct Stamped<'a, T> {
    meta: Meta,
    data: &'a T,
}

impl<T> EventCodec<T> {
    /// Codec whose category is the type name of `T`.
    pub fn new() -> Self {
        Self::with_category(category_of::<T>())
    }

    /// Codec with an explicit category.
    pub fn with_category(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            realm: String::new(),
            agent: String::new(),
            _marker: PhantomData,
        }
    }

    /// Set the realm stamped into events without one.
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    /// Set the agent stamped into events without one.
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = agent.into();
        self
    }

    fn stamp(&self, meta: &Meta) -> Meta {
        let mut meta = meta.clone();

        if meta.id.is_empty() {
            meta.id = Ulid::new().to_string();
        }
        if meta.kind.is_empty() {
            meta.kind.clone_from(&self.category);
        }
        if meta.realm.is_empty() {
            meta.realm.clone_from(&self.realm);
        }
        if meta.agent.is_empty() {
            meta.agent.clone_from(&self.agent);
        }
        if meta.is_unstamped() {
            meta.created = Utc::now();
        }

        meta
    }
}

impl<T> Default for EventCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for EventCodec<T> {
    fn clone(&self) -> Self {
        Self {
            category: self.category.clone(),
            realm: self.realm.clone(),
            agent: self.agent.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for EventCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventCodec")
            .field("category", &self.category)
            .field("realm", &self.realm)
            .field("agent", &self.agent)
            .finish()
    }
}

impl<T> Categorized for EventCodec<T> {
    fn category(&self) -> &str {
        &self.category
    }
}

impl<T: Serialize + 'static> Encoder<Event<T>> for EventCodec<T> {
    fn encode(&self, value: &Event<T>) -> Result<Bytes, Error> {
        let stamped = Stamped {
            meta: self.stamp(&value.meta),
            data: &value.data,
        };
        serde_json::to_vec(&stamped)
            .map(Bytes::from)
            .map_err(Error::encoder)
    }
}

impl<T: DeserializeOwned + 'static> Decoder<Event<T>> for EventCodec<T> {
    fn decode(&self, bytes: &[u8]) -> Result<Event<T>, Error> {
        serde_json::from_slice(bytes).map_err(Error::decoder)
    }
}
