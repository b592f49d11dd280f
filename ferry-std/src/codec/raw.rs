use bytes::Bytes;
use ferry_core::{Categorized, Decoder, Encoder, Error};

/// Identity codec for opaque payloads.
#[derive(Debug, Clone)]
pub struct Raw {
    category: String,
}

impl Raw {
    /// Codec for the given category.
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
        }
    }
}

impl Categorized for Raw {
    fn category(&self) -> &str {
        &self.category
    }
}

impl Encoder<Bytes> for Raw {
    fn encode(&self, value: &Bytes) -> Result<Bytes, Error> {
        Ok(value.clone())
    }
}

impl Decoder<Bytes> for Raw {
    fn decode(&self, bytes: &[u8]) -> Result<Bytes, Error> {
        Ok(Bytes::copy_from_slice(bytes))
    }
}

impl Encoder<Vec<u8>> for Raw {
    fn encode(&self, value: &Vec<u8>) -> Result<Bytes, Error> {
        Ok(Bytes::copy_from_slice(value))
    }
}

impl Decoder<Vec<u8>> for Raw {
    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, Error> {
        Ok(bytes.to_vec())
    }
}
