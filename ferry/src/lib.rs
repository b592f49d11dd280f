//! # ferry - Typed Messaging over Any Broker
//!
//! `ferry` adapts message brokers (queues, event buses, change-data-capture
//! streams, socket gateways, in-process loops) to one programming model:
//! typed values go out through a channel and come in through a channel.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ferry::prelude::*;
//!
//! let kernel = Embedded::endpoint(Config::from_env());
//! let (Some(emitter), Some(listener)) = (kernel.emitter(), kernel.listener()) else {
//!     unreachable!()
//! };
//!
//! let (notes, _dead) = emit::typed::<Note, _>(emitter);
//! let (mut inbox, ack) = listen::typed::<Note, _>(listener);
//! kernel.start();
//!
//! notes.send(Note::new("hello")).await?;
//! if let Some(msg) = inbox.recv().await {
//!     ack.send(msg).await?;
//! }
//! kernel.close().await;
//! ```
//!
//! ## Channels
//!
//! - Egress: `(outbound, dead_letter)`. Values the kernel cannot emit come
//!   back on `dead_letter` unchanged.
//! - Ingress: `(inbound, acknowledge)`. Every received [`Msg`] goes back on
//!   `acknowledge`, as is or [`Msg::fail`]ed.

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

pub use ferry_core::{
    // Envelope
    Bag,
    // Errors
    BoxError,
    // Codec contracts
    Categorized,
    Category,
    Decoder,
    Digest,
    // Broker contracts
    Emitter,
    Encoder,
    Error,
    // Messages
    Event,
    Failure,
    IoContext,
    Listener,
    Meta,
    Msg,
    category_of,
};

pub use ferry_std::{
    Backoff, Bridge, Config, EmitterCore, Factory, Kernel, ListenerCore, Mode, Policy, Writer,
};

pub mod emit;
pub mod listen;

/// Codecs between typed values and wire payloads.
pub mod codec {
    #![allow(clippy::wildcard_imports)]
    pub use ferry_std::codec::*;
}

/// Broker adapters.
pub mod broker {
    #![allow(clippy::wildcard_imports)]
    pub use ferry_std::broker::*;
}

/// Testing utilities.
pub mod testing {
    #![allow(clippy::wildcard_imports)]
    pub use ferry_std::testing::*;
}

/// Prelude module - common imports for Ferry.
///
/// # Usage
///
/// ```rust,ignore
/// use ferry::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Category, Config, Emitter, Error, Event, Factory, Kernel, Listener, Msg,
        broker::Embedded,
        codec::{EventCodec, Json, Packet, Raw},
        emit, listen,
    };
}

#[cfg(feature = "macros")]
pub use ferry_macros::Category;
