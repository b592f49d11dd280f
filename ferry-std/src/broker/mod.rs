//! # Broker Adapters
//!
//! Implementations of [`Emitter`](ferry_core::Emitter) and
//! [`Listener`](ferry_core::Listener) for concrete transports.
//!
//! | Module | Direction | Transport |
//! |---|---|---|
//! | [`embedded`] | both | in-process loopback |
//! | [`queue`] | both | polled message queue |
//! | [`eventbus`] | emit | event bus |
//! | [`handler`] | listen | host-invoked handlers (queue, bus, change-data-capture, object store) |
//! | [`websocket`] | both | socket gateway |
//!
//! Remote adapters talk to their transport through a narrow service trait
//! (e.g. [`queue::QueueService`]) so the SDK client stays an application
//! choice.

pub mod embedded;
pub mod eventbus;
pub mod handler;
pub mod queue;
pub mod websocket;

pub use embedded::Embedded;
pub use eventbus::{EventBus, EventBusService};
pub use handler::{Host, Invocations};
pub use queue::{Queue, QueueService};
pub use websocket::WebSocket;
