#![allow(dead_code)]

use ferry::{
    Backoff, Config, Msg,
    testing::{Record, Recorder},
};
use serde::{Deserialize, Serialize};
use std::{future::Future, time::Duration};
use tokio::sync::mpsc::Receiver;

// ============================================================================
// Test Payloads
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub text: String,
}

impl Note {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub const WAIT: Duration = Duration::from_secs(2);
pub const MS: Duration = Duration::from_millis(1);

/// Fast polling and retries, so tests do not wait on production timers.
pub fn fast_config() -> Config {
    Config::default()
        .with_poll_frequency(MS)
        .with_network_timeout(Duration::from_millis(50))
        .with_backoff(Backoff::constant(MS, 3))
}

/// Await `fut`, failing the test if it takes longer than [`WAIT`].
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    match tokio::time::timeout(WAIT, fut).await {
        Ok(value) => value,
        Err(_) => panic!("timed out after {WAIT:?}"),
    }
}

/// Receive the next message, failing the test if none arrives in time.
pub async fn next<T>(inbound: &mut Receiver<Msg<T>>) -> Msg<T> {
    match within(inbound.recv()).await {
        Some(msg) => msg,
        None => panic!("inbound channel closed"),
    }
}

/// Wait until the recorder holds `n` records.
pub async fn settled(recorder: &Recorder, n: usize) -> Vec<Record> {
    within(recorder.wait_until(|r| r.len() >= n)).await;
    recorder.records()
}
