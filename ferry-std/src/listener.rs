//! # Listener Core
//!
//! Turns a broker [`Listener`] into typed inbound channels.
//!
//! [`ListenerCore::dequeue`] registers a typed sink for a category and returns
//! an `(inbound, acknowledge)` pair. The application reads messages from
//! `inbound` and posts each of them back on `acknowledge`, failed or not.
//!
//! # Tasks
//!
//! - A pool of pollers asks the broker for batches and routes every envelope
//!   to the sink of its category.
//! - One acknowledgement task per category turns acknowledged messages into
//!   `ack` or `err` calls on the broker.
//! - Self-driving listeners get one more task running [`Listener::run`].
//!
//! # Drain
//!
//! [`ListenerCore::close`] stops the pollers, then lets every acknowledgement
//! task process what is already buffered on `acknowledge` before it exits.

use crate::{
    backoff::bounded,
    config::{Config, capacity},
    router::{Routes, TypedRoute},
};
use ferry_core::{Bag, Decoder, Digest, Error, Failure, Listener, Msg};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::sync::{OnceCell, mpsc};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// Typed ingress over a broker [`Listener`].
pub struct ListenerCore<L> {
    inner: Arc<Inner<L>>,
    tracker: TaskTracker,
    started: AtomicBool,
    released: OnceCell<()>,
}

struct Inner<L> {
    listener: L,
    config: Config,
    routes: Routes,
    cancel: CancellationToken,
}

impl<L: Listener> ListenerCore<L> {
    /// Create a core receiving from `listener`.
    pub fn new(listener: L, config: Config) -> Self {
        Self {
            inner: Arc::new(Inner {
                listener,
                config,
                routes: Routes::new(),
                cancel: CancellationToken::new(),
            }),
            tracker: TaskTracker::new(),
            started: AtomicBool::new(false),
            released: OnceCell::new(),
        }
    }

    /// The configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The category routing table.
    pub fn routes(&self) -> &Routes {
        &self.inner.routes
    }

    /// Returns `true` once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Open an inbound channel for envelopes decoded with `codec`.
    ///
    /// Returns `(inbound, acknowledge)`. Post every received message, or its
    /// [`fail`](Msg::fail)ed copy, on `acknowledge`. `inbound` ends once the
    /// core is closed.
    pub fn dequeue<T, C>(&self, codec: C) -> (mpsc::Receiver<Msg<T>>, mpsc::Sender<Msg<T>>)
    where
        T: Send + 'static,
        C: Decoder<T>,
    {
        let config = &self.inner.config;
        let (rcv, inbound) = mpsc::channel(capacity(config.cap_rcv));
        let (ack, mut acks) = mpsc::channel::<Msg<T>>(capacity(config.cap_ack));

        let cat = codec.category().to_owned();
        self.inner
            .routes
            .register(cat.clone(), Arc::new(TypedRoute::new(codec, rcv)));

        let inner = self.inner.clone();
        self.tracker.spawn(async move {
            tracing::debug!(cat = %cat, "dequeue started");

            loop {
                tokio::select! {
                    biased;
                    _ = inner.cancel.cancelled() => break,
                    msg = acks.recv() => match msg {
                        Some(msg) => inner.settle(&msg.digest, msg.error.as_ref()).await,
                        None => break,
                    },
                }
            }

            acks.close();
            while let Some(msg) = acks.recv().await {
                inner.settle(&msg.digest, msg.error.as_ref()).await;
            }

            tracing::debug!(cat = %cat, "dequeue stopped");
        });

        (inbound, ack)
    }

    /// Start the poller pool and, for self-driving listeners, the host loop.
    ///
    /// Calling it more than once has no effect.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) || self.is_closed() {
            return;
        }

        let inner = self.inner.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = inner.cancel.cancelled() => {}
                () = inner.listener.run() => {}
            }
        });

        for pid in 0..self.inner.config.poller_pool.max(1) {
            let inner = self.inner.clone();
            self.tracker.spawn(async move { inner.poll(pid).await });
        }
    }

    /// Start the core and wait until it is closed and fully drained.
    pub async fn serve(&self) {
        self.start();
        self.inner.cancel.cancelled().await;
        self.finish().await;
    }

    /// Stop polling, drain acknowledgements and release the broker.
    pub async fn close(&self) {
        self.inner.cancel.cancel();
        self.finish().await;
    }

    async fn finish(&self) {
        self.tracker.close();
        self.tracker.wait().await;

        self.released
            .get_or_init(|| async {
                self.inner.routes.clear();
                if let Err(err) = self.inner.listener.close().await {
                    self.inner.config.report(err);
                }
            })
            .await;
    }
}

impl<L: Listener> Inner<L> {
    async fn poll(&self, pid: usize) {
        tracing::debug!(pid, "poller started");

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                () = tokio::time::sleep(self.config.poll_frequency) => {}
            }

            let asked = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                asked = self
                    .config
                    .backoff
                    .retry_if(|| self.listener.ask(), Error::is_transient) => asked,
            };

            match asked {
                Ok(batch) => {
                    for bag in batch {
                        self.dispatch(bag).await;
                    }
                }
                Err(err) => self.config.report(Error::dequeue(err)),
            }
        }

        tracing::debug!(pid, "poller stopped");
    }

    async fn dispatch(&self, bag: Bag) {
        let Some(route) = self.routes.lookup(&bag.category) else {
            tracing::warn!(cat = %bag.category, agent = %self.config.agent, "unknown category");

            if self.config.fail_on_unknown_category {
                let reason = Failure::new(Error::dequeue(Error::CatUnknown(bag.category)));
                self.settle(&bag.digest, Some(&reason)).await;
            }
            return;
        };

        let digest = bag.digest.clone();
        if let Err(err) = route.route(bag, &self.cancel).await {
            tracing::debug!(digest = %digest, err = %err, "route failed");
            self.config.report(Error::dequeue(err));
        }
    }

    /// Acknowledge `digest`, or negatively acknowledge it when `failure` is set.
    async fn settle(&self, digest: &Digest, failure: Option<&Failure>) {
        let timeout = self.config.network_timeout;
        let listener = &self.listener;

        let settled = match failure {
            None => {
                self.config
                    .backoff
                    .retry_if(
                        || bounded("ack", timeout, listener.ack(digest)),
                        Error::is_transient,
                    )
                    .await
            }
            Some(reason) => {
                self.config
                    .backoff
                    .retry_if(
                        || bounded("err", timeout, listener.err(digest, reason)),
                        Error::is_transient,
                    )
                    .await
            }
        };

        if let Err(err) = settled {
            self.config.report(Error::dequeue(err));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backoff::Backoff, codec::Json, testing::RecordingBroker};
    use std::time::Duration;

    const MS: Duration = Duration::from_millis(1);
    const WAIT: Duration = Duration::from_secs(2);

    fn config() -> Config {
        Config::default()
            .with_poll_frequency(MS)
            .with_backoff(Backoff::constant(MS, 2))
    }

    fn note(digest: &str, object: &'static str) -> Bag {
        Bag::new("note", object).with_digest(digest)
    }

    #[tokio::test]
    async fn test_receive_and_ack() {
        let broker = Arc::new(RecordingBroker::new());
        broker.push_batch(vec![note("1", r#""hello""#)]);

        let core = ListenerCore::new(broker.clone(), config());
        let (mut rcv, ack) = core.dequeue(Json::<String>::with_category("note"));
        core.start();

        let msg = tokio::time::timeout(WAIT, rcv.recv()).await.unwrap().unwrap();
        assert_eq!(msg.object, "hello");
        ack.send(msg).await.unwrap();

        let recorder = broker.recorder();
        tokio::time::timeout(WAIT, recorder.wait_until(|r| !r.is_empty()))
            .await
            .unwrap();
        assert_eq!(recorder.acked(), vec![Digest::from("1")]);

        core.close().await;
        assert!(broker.is_closed());
        assert!(rcv.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_failed_message_is_negatively_acked() {
        let broker = Arc::new(RecordingBroker::new());
        broker.push_batch(vec![note("1", r#""hello""#)]);

        let core = ListenerCore::new(broker.clone(), config());
        let (mut rcv, ack) = core.dequeue(Json::<String>::with_category("note"));
        core.start();

        let msg = tokio::time::timeout(WAIT, rcv.recv()).await.unwrap().unwrap();
        ack.send(msg.fail("fail")).await.unwrap();
        core.close().await;

        let failed = broker.recorder().failed();
        assert_eq!(failed, vec![(Digest::from("1"), "fail".to_string())]);
        assert!(broker.recorder().acked().is_empty());
    }

    #[tokio::test]
    async fn test_acks_drained_on_close() {
        let broker = Arc::new(RecordingBroker::new());
        let core = ListenerCore::new(broker.clone(), config().with_policy_at_least_once(4));
        let (_rcv, ack) = core.dequeue(Json::<String>::with_category("note"));

        for d in ["1", "2", "3"] {
            ack.send(Msg::new(String::new(), "note", d)).await.unwrap();
        }
        core.close().await;

        assert_eq!(broker.recorder().acked().len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_category_dropped() {
        let broker = Arc::new(RecordingBroker::new());
        broker.push_batch(vec![Bag::new("other", "1").with_digest("x"), note("1", r#""a""#)]);

        let core = ListenerCore::new(broker.clone(), config());
        let (mut rcv, _ack) = core.dequeue(Json::<String>::with_category("note"));
        core.start();

        let msg = tokio::time::timeout(WAIT, rcv.recv()).await.unwrap().unwrap();
        assert_eq!(msg.digest.as_str(), "1");
        core.close().await;

        assert!(broker.recorder().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_category_failed() {
        let broker = Arc::new(RecordingBroker::new());
        broker.push_batch(vec![Bag::new("other", "1").with_digest("x")]);

        let core = ListenerCore::new(broker.clone(), config().with_fail_on_unknown_category(true));
        core.start();

        let recorder = broker.recorder();
        tokio::time::timeout(WAIT, recorder.wait_until(|r| !r.is_empty()))
            .await
            .unwrap();
        core.close().await;

        let failed = recorder.failed();
        assert_eq!(failed[0].0, Digest::from("x"));
        assert!(failed[0].1.contains("unknown category other"));
    }

    #[tokio::test]
    async fn test_decode_failure_skips_envelope() {
        let broker = Arc::new(RecordingBroker::new());
        broker.push_batch(vec![note("bad", "not json"), note("good", r#""ok""#)]);

        let (stderr, mut errors) = mpsc::channel(4);
        let core = ListenerCore::new(broker.clone(), config().with_stderr(stderr));
        let (mut rcv, _ack) = core.dequeue(Json::<String>::with_category("note"));
        core.start();

        let msg = tokio::time::timeout(WAIT, rcv.recv()).await.unwrap().unwrap();
        assert_eq!(msg.digest.as_str(), "good");
        assert!(matches!(errors.recv().await, Some(Error::Dequeue(_))));

        core.close().await;
    }

    fn inner_error(err: Option<Error>) -> Error {
        match err {
            Some(Error::Dequeue(inner)) => match inner.downcast::<Error>() {
                Ok(inner) => *inner,
                Err(other) => panic!("expected a ferry error, got {other}"),
            },
            other => panic!("expected dequeue error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ack_failure_is_retried() {
        let broker = Arc::new(RecordingBroker::new());
        broker.fail_ack(2);

        let (stderr, mut errors) = mpsc::channel(4);
        let core = ListenerCore::new(broker.clone(), config().with_stderr(stderr));
        let (_rcv, ack) = core.dequeue(Json::<String>::with_category("note"));

        ack.send(Msg::new(String::new(), "note", "1")).await.unwrap();
        core.close().await;

        assert_eq!(broker.recorder().acked(), vec![Digest::from("1")]);
        assert!(errors.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_err_failure_is_reported_after_retries() {
        let broker = Arc::new(RecordingBroker::new());
        broker.fail_err(usize::MAX);

        let (stderr, mut errors) = mpsc::channel(4);
        let core = ListenerCore::new(broker.clone(), config().with_stderr(stderr));
        let (_rcv, ack) = core.dequeue(Json::<String>::with_category("note"));

        let msg = Msg::new(String::new(), "note", "1").fail("fail");
        ack.send(msg).await.unwrap();
        core.close().await;

        assert!(matches!(inner_error(errors.recv().await), Error::ServiceIo(_)));
        assert!(broker.recorder().failed().is_empty());
    }

    #[tokio::test]
    async fn test_ask_failure_is_reported() {
        let broker = Arc::new(RecordingBroker::new());
        broker.fail_ask(3);

        let (stderr, mut errors) = mpsc::channel(4);
        let core = ListenerCore::new(broker.clone(), config().with_stderr(stderr));
        core.start();

        let err = tokio::time::timeout(WAIT, errors.recv()).await.unwrap();
        assert!(matches!(inner_error(err), Error::ServiceIo(_)));

        core.close().await;
        assert!(broker.asks() >= 3);
    }

    #[tokio::test]
    async fn test_slow_ack_is_bounded_by_network_timeout() {
        let broker = Arc::new(RecordingBroker::new().with_latency(Duration::from_millis(200)));
        let config = config()
            .with_backoff(Backoff::empty())
            .with_network_timeout(Duration::from_millis(10));

        let (stderr, mut errors) = mpsc::channel(4);
        let core = ListenerCore::new(broker.clone(), config.with_stderr(stderr));
        let (_rcv, ack) = core.dequeue(Json::<String>::with_category("note"));

        ack.send(Msg::new(String::new(), "note", "1")).await.unwrap();

        let err = tokio::time::timeout(WAIT, errors.recv()).await.unwrap();
        assert!(matches!(
            inner_error(err),
            Error::Timeout { phase: "ack", .. }
        ));

        core.close().await;
        assert!(broker.recorder().acked().is_empty());
    }

    #[tokio::test]
    async fn test_poller_pool_asks_concurrently() {
        let broker = Arc::new(RecordingBroker::new().with_latency(Duration::from_millis(50)));
        let core = ListenerCore::new(broker.clone(), config().with_poller_pool(3));
        core.start();

        tokio::time::timeout(WAIT, async {
            while broker.peak_concurrent_asks() < 3 {
                tokio::time::sleep(MS).await;
            }
        })
        .await
        .unwrap();

        core.close().await;
    }

    #[tokio::test]
    async fn test_close_idle_is_prompt() {
        let core = ListenerCore::new(RecordingBroker::new(), config());
        core.start();
        tokio::time::timeout(WAIT, core.close()).await.unwrap();
    }
}
