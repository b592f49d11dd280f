//! Standard codecs.
//!
//! | Codec | Payload | Default category |
//! |---|---|---|
//! | [`Json`] | `serde_json` of `T` | type name of `T` |
//! | [`Raw`] | bytes, unchanged | explicit |
//! | [`Packet`] | `{"p": "<base64>"}` | explicit |
//! | [`EventCodec`] | `{"meta": {...}, "data": ...}` with stamped metadata | type name of `T` |

mod event;
mod json;
mod packet;
mod raw;

pub use event::EventCodec;
pub use json::Json;
pub use packet::Packet;
pub use raw::Raw;
