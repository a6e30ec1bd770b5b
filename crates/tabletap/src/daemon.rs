//! Event-routing daemon
//!
//! At startup the daemon snapshots the active registration set and builds
//! one unidirectional route per registration: consume binary payloads from
//! the registration's event queue, decode them as UTF-8 text, and publish
//! each to a message-bus topic named after the registration identifier.
//!
//! Routes are independent workers. Per-route FIFO order matches the order
//! the trigger enqueued events; no ordering exists between routes, and a
//! stalled or failing route never blocks the others.
//!
//! Route construction happens once, from the startup snapshot. Tables
//! registered while the daemon runs are not picked up until a restart.
//! Shutdown is explicit: [`RouteDaemon::shutdown`] unwinds every route
//! worker, which releases its queue connection and exits.

use crate::bus::BusPublisher;
use crate::catalog::Catalog;
use crate::config::TapConfig;
use crate::error::{Result, TapError};
use crate::manager::Registration;
use crate::queue::{QueueConsumer, QueueOpener};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Initial delay after a route error; doubles up to [`BACKOFF_MAX`].
const BACKOFF_INITIAL: Duration = Duration::from_millis(250);
const BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Daemon lifecycle. No transition leaves `Running` except shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DaemonState {
    Idle = 0,
    Initializing = 1,
    Running = 2,
    Stopped = 3,
    Failed = 4,
}

impl DaemonState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Initializing,
            2 => Self::Running,
            3 => Self::Stopped,
            4 => Self::Failed,
            _ => Self::Idle,
        }
    }
}

/// Forwards captured change events from per-registration queues to the
/// message bus.
pub struct RouteDaemon {
    config: TapConfig,
    namespace: String,
    catalog: Arc<dyn Catalog>,
    opener: Arc<dyn QueueOpener>,
    bus: Arc<dyn BusPublisher>,
    state: AtomicU8,
    shutdown: broadcast::Sender<()>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl RouteDaemon {
    pub fn new(
        config: TapConfig,
        catalog: Arc<dyn Catalog>,
        opener: Arc<dyn QueueOpener>,
        bus: Arc<dyn BusPublisher>,
    ) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            namespace: config.library.clone(),
            config,
            catalog,
            opener,
            bus,
            state: AtomicU8::new(DaemonState::Idle as u8),
            shutdown,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DaemonState {
        DaemonState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Number of routes constructed at startup.
    pub async fn routes(&self) -> usize {
        self.workers.lock().await.len()
    }

    /// Snapshot the registration set and start one route worker per
    /// registration. Returns the number of routes constructed.
    ///
    /// A missing broker address is fatal: no route is started and the
    /// daemon transitions to `Failed`. A single route failing to open is
    /// not: the failure is logged and the remaining routes proceed.
    pub async fn start(&self) -> Result<usize> {
        self.state
            .store(DaemonState::Initializing as u8, Ordering::Release);

        let broker = match self.config.require_broker() {
            Ok(broker) => broker.to_string(),
            Err(e) => {
                self.state.store(DaemonState::Failed as u8, Ordering::Release);
                return Err(e);
            }
        };

        let registrations = match self.catalog.list(&self.namespace).await {
            Ok(registrations) => registrations,
            Err(e) => {
                self.state.store(DaemonState::Failed as u8, Ordering::Release);
                return Err(e);
            }
        };
        if registrations.is_empty() {
            warn!("no tables currently monitored; daemon will idle");
        } else {
            info!(
                "adding bus routing for {} tables (broker {broker})",
                registrations.len()
            );
        }

        let mut workers = self.workers.lock().await;
        for registration in registrations {
            match self.opener.open(&registration).await {
                Ok(consumer) => {
                    debug!("{}/{} --> topic {}", registration.namespace, registration.id, registration.id);
                    workers.push(self.spawn_route(registration, consumer));
                }
                Err(e) => {
                    // Fault isolation extends to startup: the other routes
                    // still come up.
                    error!("could not open queue for {registration}: {e}");
                }
            }
        }
        let count = workers.len();
        drop(workers);

        self.state.store(DaemonState::Running as u8, Ordering::Release);
        Ok(count)
    }

    fn spawn_route(
        &self,
        registration: Registration,
        mut consumer: Box<dyn QueueConsumer>,
    ) -> JoinHandle<()> {
        let bus = Arc::clone(&self.bus);
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let topic = registration.id.clone();
            let mut backoff = BACKOFF_INITIAL;
            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        debug!("route {registration} unwinding");
                        break;
                    }
                    received = consumer.recv() => match received {
                        Ok(Some(payload)) => {
                            // Queue payloads are UTF-8 JSON produced by the
                            // trigger; forward as text.
                            let text = String::from_utf8_lossy(&payload).into_owned();
                            match bus.publish(&topic, text).await {
                                Ok(()) => backoff = BACKOFF_INITIAL,
                                Err(e) => {
                                    error!("publish to {topic} failed: {e}");
                                    tokio::time::sleep(backoff).await;
                                    backoff = (backoff * 2).min(BACKOFF_MAX);
                                }
                            }
                        }
                        Ok(None) => {
                            info!("event queue for {registration} closed; route ending");
                            break;
                        }
                        Err(e) => {
                            error!("consume from {registration} failed: {e}");
                            tokio::time::sleep(backoff).await;
                            backoff = (backoff * 2).min(BACKOFF_MAX);
                        }
                    }
                }
            }
        })
    }

    /// Signal every route worker to unwind.
    pub fn shutdown(&self) {
        // Send fails only when no worker is subscribed; nothing to unwind.
        let _ = self.shutdown.send(());
    }

    /// Wait for all route workers to finish, then mark the daemon stopped.
    pub async fn join(&self) -> Result<()> {
        let mut workers = self.workers.lock().await;
        for worker in workers.drain(..) {
            worker
                .await
                .map_err(|e| TapError::queue(format!("route worker panicked: {e}")))?;
        }
        self.state.store(DaemonState::Stopped as u8, Ordering::Release);
        Ok(())
    }
}
