//! Events: typed payloads wrapped in metadata.
//!
//! On the wire an event is `{"meta": {...}, "data": ...}`. The event codec
//! stamps `id`, `type`, `realm`, `agent` and `created` when they are empty,
//! so applications usually construct events with [`Event::new`] and leave
//! the metadata alone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event metadata.
///
/// Every field except `created` is omitted from the wire form when empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Unique, sortable identity of the event.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    /// Type IRI of the event; defaults to the category.
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,

    /// Logical environment the event belongs to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub realm: String,

    /// Software entity emitting the event.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub agent: String,

    /// Creation time. The Unix epoch means "not set".
    #[serde(default)]
    pub created: DateTime<Utc>,

    /// Resource the event is about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Indirect participant, e.g. the user who initiated the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<String>,

    /// Intended receiver of the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sink: Option<String>,
}

impl Meta {
    /// Returns `true` if the creation time has not been set.
    pub fn is_unstamped(&self) -> bool {
        self.created == DateTime::<Utc>::default()
    }
}

/// A structured message with metadata and data sides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event<T> {
    /// Metadata.
    pub meta: Meta,
    /// Domain payload.
    pub data: T,
}

impl<T> Event<T> {
    /// Wrap `data` with empty metadata.
    pub fn new(data: T) -> Self {
        Self {
            meta: Meta::default(),
            data,
        }
    }

    /// Set the target.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.meta.target = Some(target.into());
        self
    }

    /// Set the participant.
    pub fn with_participant(mut self, participant: impl Into<String>) -> Self {
        self.meta.participant = Some(participant.into());
        self
    }

    /// Set the sink.
    pub fn with_sink(mut self, sink: impl Into<String>) -> Self {
        self.meta.sink = Some(sink.into());
        self
    }

    /// Set the type IRI, overriding the category default.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.meta.kind = kind.into();
        self
    }
}
