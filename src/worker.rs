//! Service worker facade.
//!
//! [`ServiceWorker`] owns the lifecycle state machine and dispatches the four
//! host events (install, activate, fetch, message) to the lifecycle manager
//! and the fetch router.
//!
//! ```text
//! Parsed -> Installing -> Installed -> Activating -> Activated
//!               \                          \
//!                +--------> Redundant <-----+
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use reqwest::Url;
use serde::Serialize;
use tokio_util::task::TaskTracker;

use crate::classify::Classifier;
use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::fetch::FetchRequest;
use crate::lifecycle::{ActivationReport, InstallReport, LifecycleManager};
use crate::message::{Ack, ControlMessage, MessageEvent};
use crate::network::Network;
use crate::router::{FetchOutcome, FetchRouter};
use crate::stats::{StatsSnapshot, WorkerStats};
use crate::storage::CacheStorage;
use crate::strategy::Strategies;

/// Lifecycle state of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum WorkerState {
    /// Created, not yet installed.
    Parsed,
    /// Install in progress.
    Installing,
    /// Installed and waiting to activate.
    Installed,
    /// Activation in progress.
    Activating,
    /// Handling fetch events.
    Activated,
    /// Install or activation failed; the worker is inert.
    Redundant,
}

impl WorkerState {
    const fn from_repr(value: u8) -> Self {
        match value {
            0 => Self::Parsed,
            1 => Self::Installing,
            2 => Self::Installed,
            3 => Self::Activating,
            4 => Self::Activated,
            _ => Self::Redundant,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Parsed => "parsed",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Activated => "activated",
            Self::Redundant => "redundant",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event delivered by the host.
#[derive(Debug)]
pub enum WorkerEvent {
    /// Populate the static cache.
    Install,
    /// Purge caches from other versions and take control.
    Activate,
    /// A request issued by a controlled page.
    Fetch(FetchRequest),
    /// A control message posted by a page.
    Message(MessageEvent),
}

/// What handling an event produced.
#[derive(Debug)]
pub enum EventOutcome {
    /// Install completed.
    Installed(InstallReport),
    /// Activation completed.
    Activated(ActivationReport),
    /// Fetch answered or passed through.
    Fetch(FetchOutcome),
    /// The acknowledgment sent, or `None` if the message was ignored.
    Message(Option<Ack>),
}

/// A Glimpse service worker bound to one origin.
pub struct ServiceWorker<S, N> {
    state: AtomicU8,
    router: FetchRouter<S, N>,
    lifecycle: LifecycleManager<S, N>,
    background: TaskTracker,
    stats: Arc<WorkerStats>,
}

impl<S, N> ServiceWorker<S, N>
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    /// Creates a worker in the `Parsed` state.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured offline page does not resolve
    /// against `origin`.
    pub fn new(config: &WorkerConfig, origin: Url, storage: Arc<S>, network: Arc<N>) -> Result<Self> {
        let classifier = Classifier::new(&config.routes);
        let lifecycle = LifecycleManager::new(
            Arc::clone(&storage),
            Arc::clone(&network),
            origin.clone(),
            config.cache.clone(),
            config.precache.clone(),
            classifier.clone(),
        );

        let background = TaskTracker::new();
        let stats = Arc::new(WorkerStats::new());
        let strategies = Strategies::new(
            storage,
            network,
            &config.cache.dynamic_name(),
            lifecycle.offline_key()?,
            background.clone(),
            Arc::clone(&stats),
        );

        Ok(Self {
            state: AtomicU8::new(WorkerState::Parsed as u8),
            router: FetchRouter::new(origin, classifier, strategies),
            lifecycle,
            background,
            stats,
        })
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        WorkerState::from_repr(self.state.load(Ordering::Acquire))
    }

    /// The origin this worker controls.
    #[must_use]
    pub const fn origin(&self) -> &Url {
        self.router.origin()
    }

    fn set_state(&self, state: WorkerState) {
        log::debug!("Service worker: {state}");
        self.state.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: WorkerState, to: WorkerState, action: &'static str) -> Result<()> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| log::debug!("Service worker: {to}"))
            .map_err(|actual| Error::InvalidState {
                state: WorkerState::from_repr(actual),
                action,
            })
    }

    /// Handles the install event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the worker is `Parsed`, or the
    /// precache error, in which case the worker becomes `Redundant`.
    pub async fn install(&self) -> Result<InstallReport> {
        self.transition(WorkerState::Parsed, WorkerState::Installing, "install")?;
        log::info!("Service worker: installing");

        match self.lifecycle.install().await {
            Ok(report) => {
                self.set_state(WorkerState::Installed);
                log::info!("Service worker: installed, skipping waiting");
                Ok(report)
            }
            Err(e) => {
                log::error!("Service worker: install failed: {e}");
                self.set_state(WorkerState::Redundant);
                Err(e)
            }
        }
    }

    /// Handles the activate event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the worker is `Installed`, or
    /// the storage error, in which case the worker becomes `Redundant`.
    pub async fn activate(&self) -> Result<ActivationReport> {
        self.transition(WorkerState::Installed, WorkerState::Activating, "activate")?;
        log::info!("Service worker: activating");

        match self.lifecycle.activate().await {
            Ok(report) => {
                self.set_state(WorkerState::Activated);
                log::info!("Service worker: activated, claiming clients");
                Ok(report)
            }
            Err(e) => {
                log::error!("Service worker: activation failed: {e}");
                self.set_state(WorkerState::Redundant);
                Err(e)
            }
        }
    }

    /// Installs then activates immediately.
    ///
    /// # Errors
    ///
    /// Returns the first lifecycle error.
    pub async fn start(&self) -> Result<(InstallReport, ActivationReport)> {
        let installed = self.install().await?;
        let activated = self.activate().await?;
        Ok((installed, activated))
    }

    /// Handles a fetch event. Requests arriving before activation pass
    /// through untouched.
    ///
    /// # Errors
    ///
    /// Returns the strategy error when the request cannot be answered.
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchOutcome> {
        let state = self.state();
        if state != WorkerState::Activated {
            log::trace!("Service worker {state}, not controlling {}", request.url);
            return Ok(FetchOutcome::Passthrough(request));
        }
        self.router.handle(request).await
    }

    /// Handles a message event.
    ///
    /// Known commands are executed and acknowledged exactly once on the
    /// event's reply channel. Returns the acknowledgment, or `None` when the
    /// message was ignored.
    pub async fn message(&self, event: MessageEvent) -> Option<Ack> {
        if self.state() == WorkerState::Redundant {
            log::debug!("Service worker redundant, ignoring message");
            return None;
        }
        let Some(command) = ControlMessage::parse(&event.data) else {
            log::debug!("Ignoring message {}", event.data);
            return None;
        };

        log::info!("Service worker: received {command:?}");
        let ack = match self.lifecycle.invalidate(command).await {
            Ok(_) => Ack::ok(),
            Err(e) => {
                log::error!("{command:?} failed: {e}");
                Ack::failed(e)
            }
        };

        if let Some(reply) = event.reply {
            if reply.send(ack.clone()).is_err() {
                log::debug!("Message sender went away before the reply");
            }
        }
        Some(ack)
    }

    /// Routes a host event to its hook.
    ///
    /// # Errors
    ///
    /// Returns the hook's error.
    pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome> {
        match event {
            WorkerEvent::Install => self.install().await.map(EventOutcome::Installed),
            WorkerEvent::Activate => self.activate().await.map(EventOutcome::Activated),
            WorkerEvent::Fetch(request) => self.fetch(request).await.map(EventOutcome::Fetch),
            WorkerEvent::Message(event) => Ok(EventOutcome::Message(self.message(event).await)),
        }
    }

    /// Waits for every background revalidation spawned so far.
    pub async fn settle_background(&self) {
        self.background.close();
        self.background.wait().await;
        self.background.reopen();
    }

    /// Strategy counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}
