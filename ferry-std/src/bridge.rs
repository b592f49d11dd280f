//! # Invocation Bridge
//!
//! Adapts a host-invoked handler to the [`Listener`] contract.
//!
//! The host hands a batch to [`Bridge::dispatch`], which waits until the
//! application has settled every envelope of it. On the kernel side the bridge
//! is an ordinary listener: `ask` yields the dispatched batch and `ack` / `err`
//! settle it.
//!
//! ```text
//! Idle ──dispatch(batch)──▶ Dispatching ──(all acked)──▶ Idle (Ok)
//!                                       ──(any err)────▶ Idle (Err(Rejected))
//!                                       ──(deadline)───▶ Idle (Err(Timeout))
//! ```
//!
//! Success waits for the whole batch while the first failure ends the dispatch
//! right away.

use crate::broadcast::Broadcaster;
use ferry_core::{Bag, Digest, Error, Failure, Listener};
use parking_lot::Mutex;
use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{self, mpsc, oneshot};

type Outcome = Result<(), Error>;

/// Listener fed by host invocations.
#[derive(Debug)]
pub struct Bridge {
    time_to_flight: Duration,
    preempt: Option<Arc<Broadcaster>>,
    inflight: Mutex<HashSet<Digest>>,
    session: Mutex<Option<oneshot::Sender<Outcome>>>,
    batches: mpsc::Sender<Vec<Bag>>,
    pending: sync::Mutex<mpsc::Receiver<Vec<Bag>>>,
    dispatching: sync::Mutex<()>,
}

impl Bridge {
    /// Create a bridge bounding every dispatch by `time_to_flight`.
    pub fn new(time_to_flight: Duration) -> Self {
        let (batches, pending) = mpsc::channel(1);
        Self {
            time_to_flight,
            preempt: None,
            inflight: Mutex::new(HashSet::new()),
            session: Mutex::new(None),
            batches,
            pending: sync::Mutex::new(pending),
            dispatching: sync::Mutex::new(()),
        }
    }

    /// Flush emitters registered on `preempt` before a dispatch returns.
    pub fn with_preempt(mut self, preempt: Arc<Broadcaster>) -> Self {
        self.preempt = Some(preempt);
        self
    }

    /// The dispatch deadline.
    pub fn time_to_flight(&self) -> Duration {
        self.time_to_flight
    }

    /// Hand `batch` to the kernel and wait until it is settled.
    ///
    /// Returns `Ok` once every digest was acknowledged, the first failure
    /// reported by the application, or [`Error::Timeout`] when the time to
    /// flight elapses first. Dispatches are serialised.
    pub async fn dispatch(&self, batch: Vec<Bag>) -> Outcome {
        if batch.is_empty() {
            return Ok(());
        }

        let _invocation = self.dispatching.lock().await;
        let started = Instant::now();
        let ttf = self.time_to_flight;

        let (tx, rx) = oneshot::channel();
        *self.inflight.lock() = batch.iter().map(|bag| bag.digest.clone()).collect();
        *self.session.lock() = Some(tx);

        let outcome = tokio::time::timeout(ttf, async {
            self.batches.send(batch).await.map_err(|_| Error::Closed)?;
            rx.await.unwrap_or(Err(Error::Closed))
        })
        .await
        .unwrap_or_else(|_| Err(Error::timeout("dispatch", ttf)));

        self.session.lock().take();
        tracing::debug!(ok = outcome.is_ok(), "dispatch settled");

        let Some(preempt) = &self.preempt else {
            return outcome;
        };

        let flushed = preempt
            .cast_within(ttf.saturating_sub(started.elapsed()))
            .await;
        outcome.and(flushed)
    }

    /// Digests of the last batch that were neither acknowledged nor failed.
    pub fn unacked(&self) -> Vec<Digest> {
        let mut digests: Vec<_> = self.inflight.lock().iter().cloned().collect();
        digests.sort();
        digests
    }

    fn publish(&self, outcome: Outcome) {
        if let Some(tx) = self.session.lock().take() {
            let _ = tx.send(outcome);
        }
    }
}

impl Listener for Bridge {
    async fn ask(&self) -> Result<Vec<Bag>, Error> {
        let mut pending = self.pending.lock().await;
        Ok(pending.recv().await.unwrap_or_default())
    }

    async fn ack(&self, digest: &Digest) -> Result<(), Error> {
        let drained = {
            let mut inflight = self.inflight.lock();
            inflight.remove(digest) && inflight.is_empty()
        };

        if drained {
            self.publish(Ok(()));
        }
        Ok(())
    }

    async fn err(&self, digest: &Digest, reason: &Failure) -> Result<(), Error> {
        // Failures of envelopes outside the current batch do not end it.
        let known = self.inflight.lock().remove(digest);

        if known {
            self.publish(Err(Error::Rejected(reason.clone())));
        }
        Ok(())
    }
}
