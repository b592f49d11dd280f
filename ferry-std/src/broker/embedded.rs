//! In-process loopback broker.
//!
//! Every enqueued envelope is delivered back to the listener side of the same
//! instance. Envelopes are redelivered on `err` and forgotten on `ack`.

use crate::{
    config::Config,
    kernel::{Factory, Kernel},
};
use ferry_core::{Bag, Digest, Emitter, Error, Failure, Listener};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::{self, mpsc};
use ulid::Ulid;

/// Loopback broker.
#[derive(Debug)]
pub struct Embedded {
    wait: Duration,
    tx: mpsc::UnboundedSender<Bag>,
    rx: sync::Mutex<mpsc::UnboundedReceiver<Bag>>,
    inflight: Mutex<HashMap<Digest, Bag>>,
}

impl Embedded {
    /// Create a loopback broker.
    ///
    /// An idle `ask` returns an empty batch after twice the network timeout.
    pub fn new(config: &Config) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            wait: config.network_timeout.saturating_mul(2),
            tx,
            rx: sync::Mutex::new(rx),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Build a loopback endpoint with the process-wide [`Factory`].
    pub fn endpoint(config: Config) -> Kernel<Arc<Self>, Arc<Self>> {
        Self::endpoint_with(Factory::global(), config)
    }

    /// Build a loopback endpoint with `factory`.
    pub fn endpoint_with(factory: &Factory, config: Config) -> Kernel<Arc<Self>, Arc<Self>> {
        factory.endpoint(Self::new(&config), config)
    }

    /// Number of delivered envelopes that are not settled yet.
    pub fn inflight(&self) -> usize {
        self.inflight.lock().len()
    }
}

impl Emitter for Embedded {
    async fn enq(&self, bag: Bag) -> Result<(), Error> {
        let bag = bag.with_digest(Ulid::new().to_string());
        self.tx.send(bag).map_err(|_| Error::Closed)
    }
}

impl Listener for Embedded {
    async fn ask(&self) -> Result<Vec<Bag>, Error> {
        let mut rx = self.rx.lock().await;

        match tokio::time::timeout(self.wait, rx.recv()).await {
            Ok(Some(bag)) => {
                self.inflight.lock().insert(bag.digest.clone(), bag.clone());
                Ok(vec![bag])
            }
            Ok(None) | Err(_) => Ok(Vec::new()),
        }
    }

    async fn ack(&self, digest: &Digest) -> Result<(), Error> {
        self.inflight.lock().remove(digest);
        Ok(())
    }

    async fn err(&self, digest: &Digest, reason: &Failure) -> Result<(), Error> {
        let Some(bag) = self.inflight.lock().remove(digest) else {
            return Ok(());
        };

        tracing::debug!(digest = %digest, err = %reason, "redeliver");
        self.tx.send(bag).map_err(|_| Error::Closed)
    }
}
