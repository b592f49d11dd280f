//! Retry with a finite sequence of delays.
//!
//! A [`Backoff`] is pure data: an ordered list of delays. The same value can
//! drive any number of concurrent [`retry`](Backoff::retry) calls.
//!
//! # Example
//!
//! ```rust,ignore
//! let backoff = Backoff::exp(Duration::from_millis(10), 10, 0.5)
//!     .deadline(Duration::from_secs(2));
//!
//! backoff.retry(|| broker.enq(bag.clone())).await?;
//! ```

use ferry_core::Error;
use rand::Rng;
use std::{fmt::Display, future::Future, time::Duration};

/// A finite sequence of retry delays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Backoff {
    seq: Vec<Duration>,
}

impl Backoff {
    /// No delays: a single attempt.
    pub fn empty() -> Self {
        Self::default()
    }

    /// `n` equal delays.
    pub fn constant(delay: Duration, n: usize) -> Self {
        Self {
            seq: vec![delay; n],
        }
    }

    /// `n` delays growing by `delay` at every step.
    pub fn linear(delay: Duration, n: usize) -> Self {
        Self {
            seq: (1..=n as u32).map(|i| delay * i).collect(),
        }
    }

    /// `n` delays, each roughly doubling the previous one.
    ///
    /// Step `i` adds to the previous delay `d` a uniformly random interval in
    /// `[d - factor * d, d + factor * d]`.
    pub fn exp(delay: Duration, n: usize, factor: f64) -> Self {
        let mut rng = rand::thread_rng();
        let mut seq = Vec::with_capacity(n);

        if n > 0 {
            seq.push(delay);
        }

        for _ in 1..n {
            let prev = seq[seq.len() - 1];
            seq.push(prev + jitter(prev, factor, rng.r#gen::<f64>()));
        }

        Self { seq }
    }

    /// Truncate the sequence at the prefix whose cumulative delay exceeds `total`.
    pub fn deadline(mut self, total: Duration) -> Self {
        let mut sum = Duration::ZERO;

        if let Some(cut) = self.seq.iter().position(|d| {
            sum += *d;
            sum > total
        }) {
            self.seq.truncate(cut);
        }

        self
    }

    /// The delays of the sequence.
    pub fn delays(&self) -> &[Duration] {
        &self.seq
    }

    /// Total time spent sleeping if every attempt fails.
    pub fn total(&self) -> Duration {
        self.seq.iter().sum()
    }

    /// Invoke `f` until it succeeds or the sequence is exhausted.
    ///
    /// The first attempt runs immediately; every failure is followed by the
    /// next delay and another attempt, so `f` runs at most
    /// `delays().len() + 1` times. The last error is returned.
    pub async fn retry<T, E, F, Fut>(&self, f: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.retry_if(f, |_| true).await
    }

    /// Like [`retry`](Self::retry), but gives up at the first error for which
    /// `retryable` returns `false`.
    ///
    /// ```rust,ignore
    /// backoff.retry_if(|| broker.enq(bag.clone()), Error::is_transient).await?;
    /// ```
    pub async fn retry_if<T, E, F, Fut>(
        &self,
        mut f: F,
        retryable: impl Fn(&E) -> bool,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut delays = self.seq.iter();

        loop {
            let err = match f().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !retryable(&err) {
                tracing::debug!(err = %err, "permanent failure, not retrying");
                return Err(err);
            }

            let Some(delay) = delays.next() else {
                return Err(err);
            };

            tracing::debug!(
                attempt = self.seq.len() - delays.len(),
                delay_ms = delay.as_millis() as u64,
                err = %err,
                "retrying"
            );
            tokio::time::sleep(*delay).await;
        }
    }
}

/// Bound a broker call by `after`, failing with [`Error::Timeout`] for `phase`.
pub(crate) async fn bounded<T>(
    phase: &'static str,
    after: Duration,
    call: impl Future<Output = Result<T, Error>>,
) -> Result<T, Error> {
    tokio::time::timeout(after, call)
        .await
        .map_err(|_| Error::timeout(phase, after))?
}

fn jitter(current: Duration, factor: f64, random: f64) -> Duration {
    let current = current.as_nanos() as f64;
    let delta = factor * current;
    let min = current - delta;
    let max = current + delta;

    Duration::from_nanos((min + random * (max - min + 1.0)).max(0.0) as u64)
}
