//! # Emitter Core
//!
//! Turns an [`Emitter`] into typed outbound channels.
//!
//! [`EmitterCore::enqueue`] returns an `(outbound, dead-letter)` pair. One task
//! per pair consumes `outbound`: it encodes every value, hands the envelope to
//! the broker under backoff and pushes the original value to the dead-letter
//! channel when either step fails.
//!
//! # Drain
//!
//! [`EmitterCore::close`] stops every task. Before exiting a task closes its
//! outbound channel and emits the backlog still buffered in it.
//!
//! # Preemption
//!
//! When the core is attached to a [`Broadcaster`], every task subscribes to it
//! and answers a flush by emitting its current backlog before acknowledging.

use crate::{
    backoff::bounded,
    broadcast::{Broadcaster, Flush, Subscription},
    config::{Config, capacity},
};
use ferry_core::{Bag, Emitter, Encoder, Error};
use std::{
    future::pending,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// Typed egress over a broker [`Emitter`].
pub struct EmitterCore<E> {
    emitter: Arc<E>,
    config: Arc<Config>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    preempt: Option<Arc<Broadcaster>>,
    released: AtomicBool,
}

impl<E: Emitter> EmitterCore<E> {
    /// Create a core emitting through `emitter`.
    pub fn new(emitter: E, config: Config) -> Self {
        Self {
            emitter: Arc::new(emitter),
            config: Arc::new(config),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            preempt: None,
            released: AtomicBool::new(false),
        }
    }

    /// Subscribe every future outbound task to flush requests from `preempt`.
    pub fn with_preempt(mut self, preempt: Arc<Broadcaster>) -> Self {
        self.preempt = Some(preempt);
        self
    }

    /// The configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns `true` once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Open an outbound channel for values encoded with `codec`.
    ///
    /// Returns `(outbound, dead_letter)`. Values that cannot be encoded or
    /// emitted show up on `dead_letter` unchanged. Once the core is closed,
    /// sends on `outbound` fail.
    pub fn enqueue<T, C>(&self, codec: C) -> (mpsc::Sender<T>, mpsc::Receiver<T>)
    where
        T: Send + 'static,
        C: Encoder<T>,
    {
        let (snd, mut rcv) = mpsc::channel(capacity(self.config.cap_out));
        let (dlq, dlq_rcv) = mpsc::channel(capacity(self.config.cap_dlq));

        let mut ctl = self.preempt.as_ref().map(|b| b.register());
        let preempt = self.preempt.clone();
        let cancel = self.cancel.clone();
        let pipe = Pipe {
            writer: Writer {
                emitter: self.emitter.clone(),
                config: self.config.clone(),
                codec,
                cancel: self.cancel.clone(),
            },
            dlq,
        };

        self.tracker.spawn(async move {
            let cat = pipe.writer.codec.category().to_owned();
            tracing::info!(cat = %cat, "init message emitter");

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    Some(flush) = next_flush(&mut ctl) => {
                        while let Ok(obj) = rcv.try_recv() {
                            pipe.emit(obj).await;
                        }
                        flush.ack();
                    }
                    obj = rcv.recv() => match obj {
                        Some(obj) => pipe.emit(obj).await,
                        None => break,
                    },
                }
            }

            rcv.close();
            while let Some(obj) = rcv.recv().await {
                pipe.emit(obj).await;
            }

            if let (Some(preempt), Some(sub)) = (preempt, ctl) {
                preempt.unregister(&sub);
            }
            tracing::info!(cat = %cat, "free message emitter");
        });

        (snd, dlq_rcv)
    }

    /// A synchronous writer for values encoded with `codec`.
    ///
    /// Writers report failures to the caller instead of a dead-letter channel.
    pub fn writer<C>(&self, codec: C) -> Writer<E, C> {
        Writer {
            emitter: self.emitter.clone(),
            config: self.config.clone(),
            codec,
            cancel: self.cancel.clone(),
        }
    }

    /// Stop every outbound task, drain their backlogs and release the broker.
    pub async fn close(&self) {
        self.cancel.cancel();
        self.serve().await;
    }

    /// Wait until the core is closed and fully drained.
    pub async fn serve(&self) {
        self.cancel.cancelled().await;
        self.tracker.close();
        self.tracker.wait().await;

        if !self.released.swap(true, Ordering::SeqCst) {
            if let Err(err) = self.emitter.close().await {
                self.config.report(err);
            }
        }
    }
}

async fn next_flush(ctl: &mut Option<Subscription>) -> Option<Flush> {
    match ctl {
        Some(sub) => sub.recv().await,
        None => pending().await,
    }
}

struct Pipe<E, C, T> {
    writer: Writer<E, C>,
    dlq: mpsc::Sender<T>,
}

impl<E, C, T> Pipe<E, C, T>
where
    E: Emitter,
    C: Encoder<T>,
    T: Send,
{
    async fn emit(&self, obj: T) {
        let cat = self.writer.codec.category();

        let err = match self.writer.codec.encode(&obj) {
            Ok(object) => {
                let bag = Bag::new(cat, object);
                match self.writer.send(bag).await {
                    Ok(()) => return,
                    Err(err) => Error::enqueue(err),
                }
            }
            Err(err) => err,
        };

        tracing::debug!(cat, err = %err, "emitter failed to send message");
        // A dropped dead-letter receiver means nobody wants the value back.
        let _ = self.dlq.send(obj).await;
        self.writer.config.report(err);
    }
}

/// Synchronous egress: emit one value and learn the outcome.
pub struct Writer<E, C> {
    emitter: Arc<E>,
    config: Arc<Config>,
    codec: C,
    cancel: CancellationToken,
}

impl<E: Emitter, C> Writer<E, C> {
    /// Encode `obj` and emit it under the codec category.
    pub async fn enq<T>(&self, obj: &T) -> Result<(), Error>
    where
        C: Encoder<T>,
    {
        self.enq_to(obj, self.codec.category()).await
    }

    /// Encode `obj` and emit it under `category`.
    ///
    /// Some brokers address the receiver through the category, e.g. a socket
    /// connection id.
    pub async fn enq_to<T>(&self, obj: &T, category: &str) -> Result<(), Error>
    where
        C: Encoder<T>,
    {
        if self.cancel.is_cancelled() {
            return Err(Error::Closed);
        }

        let object = self.codec.encode(obj)?;
        self.send(Bag::new(category, object))
            .await
            .map_err(Error::enqueue)
    }

    async fn send(&self, bag: Bag) -> Result<(), Error> {
        let emitter = &self.emitter;
        let timeout = self.config.network_timeout;

        self.config
            .backoff
            .retry_if(
                move || bounded("enqueue", timeout, emitter.enq(bag.clone())),
                Error::is_transient,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backoff::Backoff, codec::Json, testing::RecordingBroker};
    use bytes::Bytes;
    use ferry_core::Categorized;
    use std::time::Duration;

    const MS: Duration = Duration::from_millis(1);

    struct Broken;

    impl Categorized for Broken {
        fn category(&self) -> &str {
            "broken"
        }
    }

    impl Encoder<u32> for Broken {
        fn encode(&self, _value: &u32) -> Result<Bytes, Error> {
            Err(Error::encoder("cannot encode"))
        }
    }

    fn config() -> Config {
        Config::default().with_backoff(Backoff::constant(MS, 2))
    }

    #[tokio::test]
    async fn test_emit_and_drain_on_close() {
        let broker = Arc::new(RecordingBroker::new());
        let core = EmitterCore::new(broker.clone(), config().with_policy_at_most_once(8));
        let (snd, _dlq) = core.enqueue(Json::<String>::with_category("note"));

        for text in ["a", "b", "c"] {
            snd.send(text.to_string()).await.unwrap();
        }
        core.close().await;

        let bags = broker.recorder().enqueued();
        let objects: Vec<_> = bags.iter().map(|b| b.object.clone()).collect();
        assert_eq!(objects, vec![r#""a""#, r#""b""#, r#""c""#]);
        assert!(bags.iter().all(|b| b.category == "note"));
        assert!(broker.is_closed());
        assert!(snd.send("late".into()).await.is_err());
    }

    #[tokio::test]
    async fn test_enq_failure_goes_to_dlq() {
        let broker = Arc::new(RecordingBroker::new());
        broker.fail_enq(usize::MAX);

        let (stderr, mut errors) = mpsc::channel(4);
        let core = EmitterCore::new(broker.clone(), config().with_stderr(stderr));
        let (snd, mut dlq) = core.enqueue(Json::<String>::new());

        snd.send("lost".into()).await.unwrap();
        assert_eq!(dlq.recv().await.as_deref(), Some("lost"));
        assert!(matches!(errors.recv().await, Some(Error::Enqueue(_))));

        core.close().await;
        assert!(broker.recorder().enqueued().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failure_recovers() {
        let broker = Arc::new(RecordingBroker::new());
        broker.fail_enq(2);

        let core = EmitterCore::new(broker.clone(), config());
        let (snd, mut dlq) = core.enqueue(Json::<u32>::new());

        snd.send(7).await.unwrap();
        core.close().await;

        assert_eq!(broker.recorder().enqueued().len(), 1);
        assert!(dlq.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_encode_failure_goes_to_dlq() {
        let broker = Arc::new(RecordingBroker::new());
        let (stderr, mut errors) = mpsc::channel(4);
        let core = EmitterCore::new(broker.clone(), config().with_stderr(stderr));
        let (snd, mut dlq) = core.enqueue(Broken);

        snd.send(1).await.unwrap();
        assert_eq!(dlq.recv().await, Some(1));
        assert!(matches!(errors.recv().await, Some(Error::Encoder(_))));

        core.close().await;
        assert!(broker.recorder().enqueued().is_empty());
    }

    #[tokio::test]
    async fn test_flush_drains_backlog_before_ack() {
        let broker = Arc::new(RecordingBroker::new());
        let preempt = Arc::new(Broadcaster::new());
        let core = EmitterCore::new(broker.clone(), config().with_policy_at_most_once(4))
            .with_preempt(preempt.clone());
        let (snd, _dlq) = core.enqueue(Json::<u32>::new());
        assert_eq!(preempt.len(), 1);

        snd.send(1).await.unwrap();
        snd.send(2).await.unwrap();
        preempt.cast_within(Duration::from_secs(1)).await.unwrap();
        assert_eq!(broker.recorder().enqueued().len(), 2);

        core.close().await;
        assert!(preempt.is_empty());
    }

    #[tokio::test]
    async fn test_writer() {
        let broker = Arc::new(RecordingBroker::new());
        let core = EmitterCore::new(broker.clone(), config());
        let writer = core.writer(Json::<String>::with_category("note"));

        writer.enq(&"hi".to_string()).await.unwrap();
        writer.enq_to(&"yo".to_string(), "conn-1").await.unwrap();

        let cats: Vec<_> = broker
            .recorder()
            .enqueued()
            .into_iter()
            .map(|b| b.category)
            .collect();
        assert_eq!(cats, vec!["note", "conn-1"]);

        broker.fail_enq(usize::MAX);
        let err = writer.enq(&"x".to_string()).await.unwrap_err();
        assert!(matches!(err, Error::Enqueue(_)));

        core.close().await;
        assert!(matches!(
            writer.enq(&"x".to_string()).await,
            Err(Error::Closed)
        ));
    }

    #[tokio::test]
    async fn test_slow_enq_is_bounded_by_network_timeout() {
        let broker = Arc::new(RecordingBroker::new().with_latency(Duration::from_millis(200)));
        let config = config()
            .with_backoff(Backoff::empty())
            .with_network_timeout(Duration::from_millis(10));
        let core = EmitterCore::new(broker.clone(), config);
        let writer = core.writer(Json::<String>::with_category("note"));

        let err = tokio::time::timeout(Duration::from_secs(1), writer.enq(&"slow".to_string()))
            .await
            .unwrap()
            .unwrap_err();
        let Error::Enqueue(inner) = err else {
            panic!("expected enqueue error, got {err:?}");
        };
        assert!(matches!(
            inner.downcast_ref::<Error>(),
            Some(Error::Timeout { phase: "enqueue", .. })
        ));

        core.close().await;
        assert!(broker.recorder().enqueued().is_empty());
    }

    #[tokio::test]
    async fn test_close_idle_is_prompt() {
        let core = EmitterCore::new(RecordingBroker::new(), config());
        tokio::time::timeout(Duration::from_secs(1), core.close())
            .await
            .unwrap();
    }
}
