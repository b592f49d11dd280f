//! # ferry-std
//!
//! The Ferry messaging kernel.
//!
//! This crate provides:
//! - **Cores**: [`EmitterCore`] (typed egress) and [`ListenerCore`] (typed ingress)
//! - **Composition**: [`Kernel`] endpoints built by a [`Factory`]
//! - **Invocation bridge**: [`Bridge`] for host-invoked handlers
//! - **Codecs**: JSON, event, raw and packet codecs in [`codec`]
//! - **Broker adapters**: [`broker`]
//! - **Policies**: [`Backoff`] retries and the [`Config`] builder

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

// Re-export core contracts
pub use ferry_core;

// Modules
pub mod backoff;
pub mod broadcast;
pub mod bridge;
pub mod broker;
pub mod codec;
pub mod config;
pub mod emitter;
pub mod kernel;
pub mod listener;
pub mod router;
pub mod testing;

pub use backoff::Backoff;
pub use bridge::Bridge;
pub use config::{Config, Policy};
pub use emitter::{EmitterCore, Writer};
pub use kernel::{Factory, Kernel, Mode};
pub use listener::ListenerCore;
