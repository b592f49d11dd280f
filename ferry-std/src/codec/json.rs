use bytes::Bytes;
use ferry_core::{Categorized, Category, Decoder, Encoder, Error, category_of};
use serde::{Serialize, de::DeserializeOwned};
use std::{fmt, marker::PhantomData};

/// JSON codec for any serde type.
pub struct Json<T> {
    category: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Json<T> {
    /// Codec whose category is the type name of `T`.
    pub fn new() -> Self {
        Self::with_category(category_of::<T>())
    }

    /// Codec with an explicit category.
    pub fn with_category(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            _marker: PhantomData,
        }
    }
}

impl<T: Category> Json<T> {
    /// Codec using the category `T` declares.
    pub fn declared() -> Self {
        Self::with_category(T::CATEGORY)
    }
}

impl<T> Default for Json<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Json<T> {
    fn clone(&self) -> Self {
        Self::with_category(self.category.clone())
    }
}

impl<T> fmt::Debug for Json<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Json").field("category", &self.category).finish()
    }
}

impl<T> Categorized for Json<T> {
    fn category(&self) -> &str {
        &self.category
    }
}

impl<T: Serialize + 'static> Encoder<T> for Json<T> {
    fn encode(&self, value: &T) -> Result<Bytes, Error> {
        serde_json::to_vec(value).map(Bytes::from).map_err(Error::encoder)
    }
}

impl<T: DeserializeOwned + 'static> Decoder<T> for Json<T> {
    fn decode(&self, bytes: &[u8]) -> Result<T, Error> {
        serde_json::from_slice(bytes).map_err(Error::decoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Note {
        text: String,
    }

    #[test]
    fn test_default_category() {
        assert_eq!(Json::<Note>::new().category(), "Note");
        assert_eq!(Json::<String>::with_category("string").category(), "string");
    }

    #[test]
    fn test_json_codec() {
        let codec = Json::<Note>::new();
        let note = Note { text: "hi".into() };

        let bytes = codec.encode(&note).unwrap();
        assert_eq!(&bytes[..], br#"{"text":"hi"}"#);
        assert_eq!(codec.decode(&bytes).unwrap(), note);
    }

    #[test]
    fn test_decode_error_kind() {
        let err = Json::<Note>::new().decode(b"not json").unwrap_err();
        assert!(matches!(err, Error::Decoder(_)));
    }
}
