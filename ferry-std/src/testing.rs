//! Testing utilities for Ferry.
//!
//! # Features
//!
//! - [`Recorder`]: an ordered, shareable log of broker calls
//! - [`RecordingBroker`]: an in-memory broker that records every call and
//!   serves scripted batches, or loops enqueued envelopes back to `ask`

use ferry_core::{Bag, Digest, Emitter, Error, Failure, Listener};
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    pin::pin,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::sync::Notify;
use ulid::Ulid;

// ============================================================================
// Recorder
// ============================================================================

/// A broker call observed by a [`Recorder`].
#[derive(Debug, Clone)]
pub enum Record {
    /// An envelope was enqueued.
    Enq(Bag),
    /// A digest was acknowledged.
    Ack(Digest),
    /// A digest was negatively acknowledged with the given reason.
    Err(Digest, String),
}

/// Ordered log of broker calls.
///
/// Clones share the same log, so a test can keep one while the broker moves
/// into a kernel.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    records: Arc<Mutex<Vec<Record>>>,
    changed: Arc<Notify>,
}

impl Recorder {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record and wake waiters.
    pub fn push(&self, record: Record) {
        self.records.lock().push(record);
        self.changed.notify_waiters();
    }

    /// Snapshot of every record.
    pub fn records(&self) -> Vec<Record> {
        self.records.lock().clone()
    }

    /// Enqueued envelopes, in order.
    pub fn enqueued(&self) -> Vec<Bag> {
        self.filter(|r| match r {
            Record::Enq(bag) => Some(bag.clone()),
            _ => None,
        })
    }

    /// Acknowledged digests, in order.
    pub fn acked(&self) -> Vec<Digest> {
        self.filter(|r| match r {
            Record::Ack(digest) => Some(digest.clone()),
            _ => None,
        })
    }

    /// Negatively acknowledged digests and reasons, in order.
    pub fn failed(&self) -> Vec<(Digest, String)> {
        self.filter(|r| match r {
            Record::Err(digest, reason) => Some((digest.clone(), reason.clone())),
            _ => None,
        })
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Wait until `pred` holds for the log.
    ///
    /// Wrap in a timeout: this waits forever if the predicate never holds.
    pub async fn wait_until(&self, pred: impl Fn(&[Record]) -> bool) {
        loop {
            let mut notified = pin!(self.changed.notified());
            notified.as_mut().enable();

            let done = pred(&self.records.lock());
            if done {
                return;
            }
            notified.await;
        }
    }

    fn filter<T>(&self, f: impl Fn(&Record) -> Option<T>) -> Vec<T> {
        self.records.lock().iter().filter_map(f).collect()
    }
}

// ============================================================================
// Recording Broker
// ============================================================================

/// An in-memory broker that records every call.
///
/// `ask` serves scripted batches in order and returns empty batches once they
/// run out. Every call can be made to fail a number of times, and to take a
/// fixed latency before it completes.
///
/// # Example
///
/// ```rust,ignore
/// let broker = Arc::new(RecordingBroker::new());
/// broker.push_batch(vec![Bag::new("note", r#""hi""#).with_digest("1")]);
///
/// let listener = ListenerCore::new(broker.clone(), Config::default());
/// // ...
/// assert_eq!(broker.recorder().acked(), vec![Digest::from("1")]);
/// ```
#[derive(Debug, Default)]
pub struct RecordingBroker {
    recorder: Recorder,
    batches: Mutex<VecDeque<Vec<Bag>>>,
    enq_failures: AtomicUsize,
    ask_failures: AtomicUsize,
    ack_failures: AtomicUsize,
    err_failures: AtomicUsize,
    latency: Duration,
    asks: AtomicUsize,
    asking: AtomicUsize,
    peak_asking: AtomicUsize,
    closed: AtomicBool,
    loopback: bool,
}

impl RecordingBroker {
    /// Create a broker with no scripted batches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a broker that serves every enqueued envelope to a later `ask`.
    ///
    /// Envelopes enqueued without a digest get a fresh one.
    pub fn loopback() -> Self {
        Self {
            loopback: true,
            ..Self::default()
        }
    }

    /// Delay every call by `latency` before it takes effect.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Handle to the call log.
    pub fn recorder(&self) -> Recorder {
        self.recorder.clone()
    }

    /// Script a batch for a later `ask`.
    pub fn push_batch(&self, batch: Vec<Bag>) {
        self.batches.lock().push_back(batch);
    }

    /// Fail the next `n` calls to `enq`.
    pub fn fail_enq(&self, n: usize) {
        self.enq_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` calls to `ask`.
    pub fn fail_ask(&self, n: usize) {
        self.ask_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` calls to `ack`.
    pub fn fail_ack(&self, n: usize) {
        self.ack_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` calls to `err`.
    pub fn fail_err(&self, n: usize) {
        self.err_failures.store(n, Ordering::SeqCst);
    }

    /// Number of `ask` calls started.
    pub fn asks(&self) -> usize {
        self.asks.load(Ordering::SeqCst)
    }

    /// Most `ask` calls observed in progress at the same time.
    pub fn peak_concurrent_asks(&self) -> usize {
        self.peak_asking.load(Ordering::SeqCst)
    }

    /// Returns `true` once `close` was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn call(&self, failures: &AtomicUsize, op: &'static str) -> Result<(), Error> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let failing = failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if failing {
            return Err(Error::service_io(format!("injected {op} failure")));
        }
        Ok(())
    }
}

/// Counts an `ask` in progress until dropped.
struct Asking<'a>(&'a AtomicUsize);

impl<'a> Asking<'a> {
    fn enter(asking: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = asking.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(asking)
    }
}

impl Drop for Asking<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Emitter for RecordingBroker {
    async fn enq(&self, bag: Bag) -> Result<(), Error> {
        self.call(&self.enq_failures, "enq").await?;

        self.recorder.push(Record::Enq(bag.clone()));
        if self.loopback {
            let bag = if bag.digest.is_empty() {
                bag.with_digest(Ulid::new().to_string())
            } else {
                bag
            };
            self.push_batch(vec![bag]);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl Listener for RecordingBroker {
    async fn ask(&self) -> Result<Vec<Bag>, Error> {
        self.asks.fetch_add(1, Ordering::SeqCst);
        let _asking = Asking::enter(&self.asking, &self.peak_asking);

        self.call(&self.ask_failures, "ask").await?;
        Ok(self.batches.lock().pop_front().unwrap_or_default())
    }

    async fn ack(&self, digest: &Digest) -> Result<(), Error> {
        self.call(&self.ack_failures, "ack").await?;
        self.recorder.push(Record::Ack(digest.clone()));
        Ok(())
    }

    async fn err(&self, digest: &Digest, reason: &Failure) -> Result<(), Error> {
        self.call(&self.err_failures, "err").await?;
        self.recorder
            .push(Record::Err(digest.clone(), reason.to_string()));
        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enq_failures_then_success() {
        let broker = RecordingBroker::new();
        broker.fail_enq(2);

        assert!(broker.enq(Bag::new("a", "1")).await.is_err());
        assert!(broker.enq(Bag::new("a", "2")).await.is_err());
        assert!(broker.enq(Bag::new("a", "3")).await.is_ok());
        assert_eq!(broker.recorder().enqueued().len(), 1);
    }

    #[tokio::test]
    async fn test_scripted_batches() {
        let broker = RecordingBroker::new();
        broker.push_batch(vec![Bag::new("a", "1").with_digest("1")]);

        assert_eq!(broker.ask().await.unwrap().len(), 1);
        assert!(broker.ask().await.unwrap().is_empty());
        assert_eq!(broker.asks(), 2);
    }

    #[tokio::test]
    async fn test_loopback() {
        let broker = RecordingBroker::loopback();
        broker.enq(Bag::new("a", "1")).await.unwrap();

        let batch = broker.ask().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert!(!batch[0].digest.is_empty());
        assert_eq!(broker.recorder().enqueued().len(), 1);
    }

    #[tokio::test]
    async fn test_wait_until() {
        let broker = Arc::new(RecordingBroker::new());
        let recorder = broker.recorder();

        let acker = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            acker.ack(&Digest::from("1")).await
        });

        tokio::time::timeout(
            Duration::from_secs(1),
            recorder.wait_until(|r| r.len() == 1),
        )
        .await
        .unwrap();
        assert_eq!(recorder.acked(), vec![Digest::from("1")]);
    }
}
