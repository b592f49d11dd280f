//! # Flush Broadcaster
//!
//! One-to-many signalling with per-subscriber acknowledgement. The bridge
//! casts a flush before it returns control to its host; every registered
//! emitter task drains its outbound backlog and acknowledges.
//!
//! # Guarantees
//!
//! - A cast waits only for the subscribers present when it starts.
//! - Subscribers leaving mid-cast are not waited for.
//! - A subscriber still holding the request of an abandoned cast is waited
//!   for, not skipped.
//! - Concurrent casts are serialised.

use ferry_core::Error;
use futures::future::join_all;
use parking_lot::RwLock;
use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// A flush request delivered to a subscriber.
///
/// Dropping it without [`ack`](Flush::ack) counts as leaving the cast.
#[derive(Debug)]
pub struct Flush {
    ack: oneshot::Sender<()>,
}

impl Flush {
    /// Acknowledge the flush.
    pub fn ack(self) {
        let _ = self.ack.send(());
    }
}

/// Receiving side of a registration.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Flush>,
}

impl Subscription {
    /// Wait for the next flush request. Returns `None` once unregistered.
    pub async fn recv(&mut self) -> Option<Flush> {
        self.rx.recv().await
    }
}

/// Fan-out of flush requests to registered subscribers.
#[derive(Debug, Default)]
pub struct Broadcaster {
    subscribers: RwLock<HashMap<u64, mpsc::Sender<Flush>>>,
    next_id: AtomicU64,
    casting: Mutex<()>,
}

impl Broadcaster {
    /// Create a broadcaster without subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber.
    pub fn register(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(1);
        self.subscribers.write().insert(id, tx);
        Subscription { id, rx }
    }

    /// Remove a subscriber. Its pending and future `recv` calls return `None`.
    pub fn unregister(&self, sub: &Subscription) {
        self.subscribers.write().remove(&sub.id);
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Returns `true` if nobody is registered.
    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }

    /// Remove every subscriber.
    pub fn close(&self) {
        self.subscribers.write().clear();
    }

    /// Flush every current subscriber and wait for their acknowledgements.
    ///
    /// Fails with [`Error::Closed`] if `cancel` fires first.
    pub async fn cast(&self, cancel: &CancellationToken) -> Result<(), Error> {
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Closed),
            () = self.cast_all() => Ok(()),
        }
    }

    /// Like [`cast`](Self::cast), bounded by a deadline.
    pub async fn cast_within(&self, after: Duration) -> Result<(), Error> {
        tokio::time::timeout(after, self.cast_all())
            .await
            .map_err(|_| Error::timeout("broadcast", after))
    }

    async fn cast_all(&self) {
        let _serial = self.casting.lock().await;

        let snapshot: Vec<_> = self.subscribers.read().values().cloned().collect();
        let acks = snapshot.into_iter().map(|sub| async move {
            let (tx, rx) = oneshot::channel();

            // The slot may still hold the request of an abandoned cast: wait
            // until the subscriber takes it. A subscriber that left, or drops
            // the request, counts as done.
            if sub.send(Flush { ack: tx }).await.is_ok() {
                let _ = rx.await;
            }
        });

        join_all(acks).await;
    }
}
