//! The Worker Supervisor: owns the lifecycle state machine,
//! the three slot pools, and the three long-poll task families — workflow
//! tasks and activity tasks feed `sdk-core`'s engines; the nexus family
//! (see [`crate::nexus_poll`]) has no wire surface in this workspace's
//! proto subset (no `ScheduleService`-style messages exist for it either
//! — see `temporal_client::facade`'s doc comment on the same limitation),
//! so it runs as a no-op sink instead.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use temporal_core_protos::pb;
use temporal_sdk_core::activity::engine::ActivityCancelRegistry;
use temporal_sdk_core::registry::Registry;
use temporal_sdk_core::slot::SlotManager;

use temporal_client::BridgeClient;

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::state::SupervisorState;
use crate::{activity_poll, nexus_poll, workflow_poll};

/// A running worker. Dropping this without calling [`WorkerHandle::shutdown`]
/// leaves the poll loops running in the background; `shutdown` is the
/// intended way to stop them.
pub struct WorkerHandle {
    state_tx: watch::Sender<SupervisorState>,
    state_rx: watch::Receiver<SupervisorState>,
    workflow_task: JoinHandle<()>,
    activity_task: JoinHandle<()>,
    nexus_task: JoinHandle<()>,
    cancel_registry: Arc<Mutex<ActivityCancelRegistry>>,
    graceful_shutdown_period: Duration,
}

impl WorkerHandle {
    pub fn state(&self) -> SupervisorState {
        *self.state_rx.borrow()
    }

    /// Idempotent graceful shutdown: stop issuing new
    /// polls, let in-flight work run for `graceful_shutdown_period`
    /// (default 0, i.e. cancel immediately), then finalize.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<(), WorkerError> {
        if self.state_rx.borrow().is_terminal() {
            return Ok(());
        }
        let _ = self.state_tx.send(SupervisorState::Draining);
        if !self.graceful_shutdown_period.is_zero() {
            tokio::time::sleep(self.graceful_shutdown_period).await;
        }
        let cancelled = self
            .cancel_registry
            .lock()
            .expect("cancel registry mutex poisoned")
            .cancel_all(pb::ActivityCancelReason::WorkerShutdown);
        if cancelled > 0 {
            info!(cancelled, "grace period expired: cancelling in-flight activities");
        }
        let _ = self.state_tx.send(SupervisorState::Finalizing);
        let _ = self.state_tx.send(SupervisorState::Terminated);
        info!("worker shutdown complete");
        Ok(())
    }

    /// Waits for all three poll loops to return, e.g. after [`shutdown`] or
    /// a fatal connection error.
    pub async fn join(self) {
        let _ = self.workflow_task.await;
        let _ = self.activity_task.await;
        let _ = self.nexus_task.await;
    }
}

/// Builds and starts poll loops against `client`, dispatching activations
/// and activity tasks through `registry`.
pub struct Worker {
    config: WorkerConfig,
    client: Arc<BridgeClient>,
    registry: Registry,
    slots: Arc<SlotManager>,
}

impl Worker {
    pub fn new(config: WorkerConfig, client: Arc<BridgeClient>, registry: Registry) -> Self {
        let slots = Arc::new(SlotManager::new(
            2,
            config.max_concurrent_activities,
            config.max_concurrent_local_activities,
        ));
        Worker {
            config,
            client,
            registry,
            slots,
        }
    }

    #[instrument(skip(self), fields(task_queue = %self.config.task_queue, namespace = %self.config.namespace))]
    pub fn start(self) -> WorkerHandle {
        let (state_tx, state_rx) = watch::channel(SupervisorState::Starting);
        info!("worker starting");

        let cancel_registry = Arc::new(Mutex::new(ActivityCancelRegistry::new()));

        let workflow_task = tokio::spawn(workflow_poll::run(
            self.client.clone(),
            self.registry.clone(),
            self.config.clone(),
            self.slots.clone(),
            state_rx.clone(),
        ));
        let activity_task = tokio::spawn(activity_poll::run(
            self.client.clone(),
            Arc::new(self.registry.clone()),
            self.config.clone(),
            self.slots.clone(),
            cancel_registry.clone(),
            state_rx.clone(),
        ));
        let nexus_task = tokio::spawn(nexus_poll::run(state_rx.clone()));

        if state_tx.send(SupervisorState::Running).is_err() {
            warn!("no receivers for supervisor state transition to Running; loops may have exited immediately");
        }

        WorkerHandle {
            state_tx,
            state_rx,
            workflow_task,
            activity_task,
            nexus_task,
            cancel_registry,
            graceful_shutdown_period: self.config.graceful_shutdown_period,
        }
    }
}
