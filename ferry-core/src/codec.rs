//! Codec contracts.

use crate::error::Error;
use bytes::Bytes;

/// Anything bound to a category.
///
/// The category is the routing key that ties a wire envelope to a typed
/// channel on both sides of an endpoint.
pub trait Categorized {
    /// The routing key.
    fn category(&self) -> &str;
}

/// Encodes typed values into wire payloads.
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot encode `{T}`",
    label = "missing `Encoder<{T}>` implementation"
)]
pub trait Encoder<T>: Categorized + Send + Sync + 'static {
    /// Encode a value.
    fn encode(&self, value: &T) -> Result<Bytes, Error>;
}

/// Decodes wire payloads into typed values.
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot decode `{T}`",
    label = "missing `Decoder<{T}>` implementation"
)]
pub trait Decoder<T>: Categorized + Send + Sync + 'static {
    /// Decode a payload.
    fn decode(&self, bytes: &[u8]) -> Result<T, Error>;
}

/// A type with a statically declared category.
///
/// Usually derived with `#[derive(Category)]`.
pub trait Category {
    /// The routing key of the type.
    const CATEGORY: &'static str;
}

/// Default category of `T`: its type name without module path or generics.
///
/// ```
/// struct Note;
/// assert_eq!(ferry_core::category_of::<Note>(), "Note");
/// assert_eq!(ferry_core::category_of::<Vec<Note>>(), "Vec");
/// assert_eq!(ferry_core::category_of::<String>(), "String");
/// ```
pub fn category_of<T: ?Sized>() -> String {
    let name = std::any::type_name::<T>();
    let name = name.split('<').next().unwrap_or(name);
    name.rsplit("::").next().unwrap_or(name).to_owned()
}
