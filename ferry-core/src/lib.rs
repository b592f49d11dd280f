//! # ferry-core
//!
//! Core contracts for the Ferry messaging kernel.
//!
//! This crate has minimal dependencies and is designed to be imported by
//! broker adapters that only need to speak the wire-side protocol, without
//! pulling in the kernel implementation from `ferry-std`.
//!
//! # Two Sides of the Kernel
//!
//! Ferry turns heterogeneous message brokers into typed channels. Every
//! broker is reduced to two narrow contracts:
//!
//! ## Egress ([`Emitter`])
//!
//! Accepts an encoded envelope ([`Bag`]) and hands it to the broker.
//! Nothing else: retries, dead-letter routing and draining are the kernel's job.
//!
//! ## Ingress ([`Listener`])
//!
//! Asks the broker for a batch of envelopes and later acknowledges
//! (or negatively acknowledges) each of them by its [`Digest`].
//! Self-driving listeners, fed by a host runtime instead of polling,
//! additionally implement [`Listener::run`].
//!
//! # Codecs
//!
//! Typed values cross the wire through [`Encoder`] and [`Decoder`]. Both are
//! [`Categorized`]: the category is the routing key that binds a wire
//! envelope to a typed channel.
//!
//! # Error Types
//!
//! - [`Error`] - The boundary error taxonomy
//! - [`Failure`] - A cloneable, application-reported processing failure

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod bag;
mod broker;
mod codec;
mod error;
mod event;
mod msg;

// Re-exports
pub use bag::{Bag, Digest, IoContext};
pub use broker::{Emitter, Listener};
pub use codec::{Categorized, Category, Decoder, Encoder, category_of};
pub use error::{BoxError, Error, Failure};
pub use event::{Event, Meta};
pub use msg::Msg;
