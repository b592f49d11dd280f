//! # Endpoint Composition
//!
//! A [`Kernel`] pairs an emitter core and a listener core that usually share
//! one broker adapter. [`Factory`] builds the cores, wiring them for the
//! runtime [`Mode`] of the process.

use crate::{
    bridge::Bridge, broadcast::Broadcaster, config::Config, emitter::EmitterCore,
    listener::ListenerCore,
};
use ferry_core::{Emitter, Listener};
use std::{
    convert::Infallible,
    sync::{Arc, OnceLock},
};

/// Environment variable whose presence marks a short-lived invocation runtime.
pub const ENV_PREEMPTABLE: &str = "AWS_LAMBDA_FUNCTION_NAME";

/// How the host runtime schedules the process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// A long-running process.
    #[default]
    Polling,
    /// A short-lived invocation that may be frozen once its handler returns.
    Preemptable,
}

impl Mode {
    /// Detect the mode from the process environment.
    pub fn from_env() -> Self {
        if std::env::var_os(ENV_PREEMPTABLE).is_some() {
            Mode::Preemptable
        } else {
            Mode::Polling
        }
    }
}

/// Builds kernel cores for a runtime [`Mode`].
///
/// In preemptable mode every emitter core and bridge built by one factory
/// shares a [`Broadcaster`], so a bridge flushes pending emits before it
/// returns to the host.
#[derive(Debug, Clone, Default)]
pub struct Factory {
    preempt: Option<Arc<Broadcaster>>,
}

impl Factory {
    /// A factory for `mode`.
    pub fn new(mode: Mode) -> Self {
        match mode {
            Mode::Polling => Self { preempt: None },
            Mode::Preemptable => Self {
                preempt: Some(Arc::new(Broadcaster::new())),
            },
        }
    }

    /// A factory for the mode of the process environment.
    pub fn from_env() -> Self {
        Self::new(Mode::from_env())
    }

    /// The process-wide factory, created from the environment on first use.
    pub fn global() -> &'static Factory {
        static GLOBAL: OnceLock<Factory> = OnceLock::new();
        GLOBAL.get_or_init(Factory::from_env)
    }

    /// The mode the factory was created for.
    pub fn mode(&self) -> Mode {
        match self.preempt {
            Some(_) => Mode::Preemptable,
            None => Mode::Polling,
        }
    }

    /// The shared flush broadcaster, in preemptable mode.
    pub fn preempt(&self) -> Option<&Arc<Broadcaster>> {
        self.preempt.as_ref()
    }

    /// Build an emitter core.
    pub fn emitter<E: Emitter>(&self, emitter: E, config: Config) -> EmitterCore<E> {
        let core = EmitterCore::new(emitter, config);
        match &self.preempt {
            Some(preempt) => core.with_preempt(preempt.clone()),
            None => core,
        }
    }

    /// Build a listener core.
    pub fn listener<L: Listener>(&self, listener: L, config: Config) -> ListenerCore<L> {
        ListenerCore::new(listener, config)
    }

    /// Build a two-sided endpoint sharing one broker adapter.
    pub fn endpoint<B>(&self, broker: B, config: Config) -> Kernel<Arc<B>, Arc<B>>
    where
        B: Emitter + Listener,
    {
        let broker = Arc::new(broker);
        Kernel::new(
            Some(self.emitter(broker.clone(), config.clone())),
            Some(self.listener(broker, config)),
        )
    }

    /// Build a bridge bounded by the configured time to flight.
    pub fn bridge(&self, config: &Config) -> Bridge {
        let bridge = Bridge::new(config.time_to_flight);
        match &self.preempt {
            Some(preempt) => bridge.with_preempt(preempt.clone()),
            None => bridge,
        }
    }
}

/// An endpoint: emitter and listener cores with one lifecycle.
///
/// Either side may be absent; use [`Infallible`] as its type.
pub struct Kernel<E = Infallible, L = Infallible> {
    emitter: Option<EmitterCore<E>>,
    listener: Option<ListenerCore<L>>,
}

impl<E: Emitter, L: Listener> Kernel<E, L> {
    /// Compose an endpoint from its cores.
    pub fn new(emitter: Option<EmitterCore<E>>, listener: Option<ListenerCore<L>>) -> Self {
        Self { emitter, listener }
    }

    /// The emitter side.
    pub fn emitter(&self) -> Option<&EmitterCore<E>> {
        self.emitter.as_ref()
    }

    /// The listener side.
    pub fn listener(&self) -> Option<&ListenerCore<L>> {
        self.listener.as_ref()
    }

    /// Start polling on the listener side.
    pub fn start(&self) {
        if let Some(listener) = &self.listener {
            listener.start();
        }
    }

    /// Close the listener side, then the emitter side.
    ///
    /// Inbound work stops first; outbound channels drain afterwards.
    pub async fn close(&self) {
        if let Some(listener) = &self.listener {
            listener.close().await;
        }
        if let Some(emitter) = &self.emitter {
            emitter.close().await;
        }
    }

    /// Run the endpoint until it is closed, then wait for both cores to drain.
    pub async fn serve(&self) {
        if let Some(listener) = &self.listener {
            listener.serve().await;
        }
        if let Some(emitter) = &self.emitter {
            emitter.serve().await;
        }
    }
}

impl<E: Emitter> Kernel<E, Infallible> {
    /// An emit-only endpoint.
    pub fn emitting(emitter: EmitterCore<E>) -> Self {
        Self::new(Some(emitter), None)
    }
}

impl<L: Listener> Kernel<Infallible, L> {
    /// A listen-only endpoint.
    pub fn listening(listener: ListenerCore<L>) -> Self {
        Self::new(None, Some(listener))
    }
}
