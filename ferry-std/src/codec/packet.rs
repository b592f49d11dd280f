use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use ferry_core::{Categorized, Decoder, Encoder, Error};
use serde::{Deserialize, Serialize};

/// Wraps opaque payloads as `{"p": "<base64>"}`.
///
/// Use it with brokers that only accept JSON documents, such as the event bus.
#[derive(Debug, Clone)]
pub struct Packet {
    category: String,
}

#[derive(Serialize, Deserialize)]
struct Wire {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    p: String,
}

impl Packet {
    /// Codec for the given category.
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
        }
    }
}

impl Categorized for Packet {
    fn category(&self) -> &str {
        &self.category
    }
}

impl Encoder<Bytes> for Packet {
    fn encode(&self, value: &Bytes) -> Result<Bytes, Error> {
        let wire = Wire {
            p: STANDARD.encode(value),
        };
        serde_json::to_vec(&wire).map(Bytes::from).map_err(Error::encoder)
    }
}

impl Decoder<Bytes> for Packet {
    fn decode(&self, bytes: &[u8]) -> Result<Bytes, Error> {
        let wire: Wire = serde_json::from_slice(bytes).map_err(Error::decoder)?;
        STANDARD
            .decode(wire.p)
            .map(Bytes::from)
            .map_err(Error::decoder)
    }
}
