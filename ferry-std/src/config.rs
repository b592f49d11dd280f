//! Kernel configuration.
//!
//! [`Config`] is built with consuming `with_*` methods; options compose and
//! later calls win. Timers may also be taken from the environment:
//!
//! | Variable | Field |
//! |---|---|
//! | `FERRY_AGENT` | [`Config::agent`] |
//! | `FERRY_REALM` | [`Config::realm`] |
//! | `FERRY_POLL_FREQUENCY` | [`Config::poll_frequency`] (seconds) |
//! | `FERRY_TIME_TO_FLIGHT` | [`Config::time_to_flight`] (seconds) |
//! | `FERRY_NETWORK_TIMEOUT` | [`Config::network_timeout`] (seconds) |

use crate::backoff::Backoff;
use ferry_core::Error;
use std::time::Duration;
use tokio::sync::mpsc;

/// Environment variable naming the default agent.
pub const ENV_AGENT: &str = "FERRY_AGENT";
/// Environment variable naming the default realm.
pub const ENV_REALM: &str = "FERRY_REALM";
/// Environment variable overriding the poll frequency, in seconds.
pub const ENV_POLL_FREQUENCY: &str = "FERRY_POLL_FREQUENCY";
/// Environment variable overriding the time to flight, in seconds.
pub const ENV_TIME_TO_FLIGHT: &str = "FERRY_TIME_TO_FLIGHT";
/// Environment variable overriding the network timeout, in seconds.
pub const ENV_NETWORK_TIMEOUT: &str = "FERRY_NETWORK_TIMEOUT";

/// Grade of service selected for the application channels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Policy {
    /// Best effort: every channel is buffered.
    AtMostOnce,
    /// Outbound sends block until the emitter task takes the value.
    #[default]
    AtLeastOnce,
}

/// Kernel configuration shared by the emitter and listener cores.
#[derive(Debug, Clone)]
pub struct Config {
    /// Default emitter identity stamped into event metadata.
    pub agent: String,
    /// Default realm stamped into event metadata.
    pub realm: String,
    /// Grade of service the capacities were derived from.
    pub policy: Policy,
    /// Outbound channel capacity.
    pub cap_out: usize,
    /// Dead-letter channel capacity.
    pub cap_dlq: usize,
    /// Inbound channel capacity.
    pub cap_rcv: usize,
    /// Acknowledge channel capacity.
    pub cap_ack: usize,
    /// Retry policy applied to every broker-boundary call.
    pub backoff: Backoff,
    /// Sink for internal errors. Errors are logged when unset.
    pub stderr: Option<mpsc::Sender<Error>>,
    /// Number of concurrent poller tasks on a listener.
    pub poller_pool: usize,
    /// Delay between polls of one poller.
    pub poll_frequency: Duration,
    /// Upper bound on a bridge dispatch.
    pub time_to_flight: Duration,
    /// Upper bound on a single broker call.
    pub network_timeout: Duration,
    /// Negatively acknowledge envelopes of unknown categories instead of dropping them.
    pub fail_on_unknown_category: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent: "ferry".to_owned(),
            realm: String::new(),
            policy: Policy::AtLeastOnce,
            cap_out: 0,
            cap_dlq: 0,
            cap_rcv: 0,
            cap_ack: 0,
            backoff: Backoff::exp(Duration::from_millis(10), 10, 0.5),
            stderr: None,
            poller_pool: 1,
            poll_frequency: Duration::from_millis(10),
            time_to_flight: Duration::from_secs(5),
            network_timeout: Duration::from_secs(5),
            fail_on_unknown_category: false,
        }
    }
}

impl Config {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Override fields from the process environment.
    pub fn with_env(self) -> Self {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Override fields from an arbitrary key lookup.
    ///
    /// Timers are integer seconds; malformed values keep the current setting.
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(agent) = lookup(ENV_AGENT).filter(|v| !v.is_empty()) {
            self.agent = agent;
        }
        if let Some(realm) = lookup(ENV_REALM).filter(|v| !v.is_empty()) {
            self.realm = realm;
        }

        let seconds = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };
        self.poll_frequency = seconds(ENV_POLL_FREQUENCY, self.poll_frequency);
        self.time_to_flight = seconds(ENV_TIME_TO_FLIGHT, self.time_to_flight);
        self.network_timeout = seconds(ENV_NETWORK_TIMEOUT, self.network_timeout);
        self
    }

    /// Set the default agent.
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = agent.into();
        self
    }

    /// Set the default realm.
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    /// Set the retry policy.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Route internal errors to `sink`.
    pub fn with_stderr(mut self, sink: mpsc::Sender<Error>) -> Self {
        self.stderr = Some(sink);
        self
    }

    /// Set the number of pollers.
    pub fn with_poller_pool(mut self, n: usize) -> Self {
        self.poller_pool = n;
        self
    }

    /// Set the delay between polls.
    pub fn with_poll_frequency(mut self, every: Duration) -> Self {
        self.poll_frequency = every;
        self
    }

    /// Set the bridge deadline.
    pub fn with_time_to_flight(mut self, ttf: Duration) -> Self {
        self.time_to_flight = ttf;
        self
    }

    /// Set the per-call broker timeout.
    pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout = timeout;
        self
    }

    /// Actively fail envelopes of unknown categories.
    pub fn with_fail_on_unknown_category(mut self, fail: bool) -> Self {
        self.fail_on_unknown_category = fail;
        self
    }

    /// Best effort: buffer `n` values on every channel.
    pub fn with_policy_at_most_once(mut self, n: usize) -> Self {
        self.policy = Policy::AtMostOnce;
        self.cap_out = n;
        self.cap_dlq = n;
        self.cap_rcv = n;
        self.cap_ack = n;
        self
    }

    /// Unbuffered outbound and dead-letter channels, `n` on the inbound side.
    pub fn with_policy_at_least_once(mut self, n: usize) -> Self {
        self.policy = Policy::AtLeastOnce;
        self.cap_out = 0;
        self.cap_dlq = 0;
        self.cap_rcv = n;
        self.cap_ack = n;
        self
    }

    /// Surface an internal error.
    ///
    /// Errors go to the configured sink without blocking; when the sink is
    /// full or gone the error is logged and dropped.
    pub fn report(&self, err: Error) {
        let Some(sink) = &self.stderr else {
            tracing::error!(err = %err, "ferry failed");
            return;
        };

        if let Err(e) = sink.try_send(err) {
            let err = match e {
                mpsc::error::TrySendError::Full(err) | mpsc::error::TrySendError::Closed(err) => err,
            };
            tracing::warn!(err = %err, "stderr sink unavailable, error dropped");
        }
    }
}

/// Channel capacity for a configured buffer size.
///
/// Tokio channels need room for at least one value.
pub(crate) fn capacity(n: usize) -> usize {
    n.max(1)
}
