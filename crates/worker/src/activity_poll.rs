//! The activity task poll loop.
//!
//! Unlike the workflow loop, activity execution has no shared in-process
//! state that needs serializing, so each polled task is spawned onto its
//! own tokio task as soon as a slot is free; the loop itself just keeps
//! polling.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{info, warn};

use temporal_core_protos::pb;
use temporal_sdk_core::activity::engine::{run_activity_task, ActivityCancelRegistry, ActivitySlots};
use temporal_sdk_core::payload::DataConverter;
use temporal_sdk_core::registry::Registry;
use temporal_sdk_core::slot::{SlotKind, SlotManager};

use temporal_client::BridgeClient;

use crate::config::WorkerConfig;
use crate::state::SupervisorState;

pub async fn run(
    client: Arc<BridgeClient>,
    registry: Arc<Registry>,
    config: WorkerConfig,
    slots: Arc<SlotManager>,
    cancel_registry: Arc<Mutex<ActivityCancelRegistry>>,
    mut shutdown: watch::Receiver<SupervisorState>,
) {
    let converter = DataConverter::new();
    let heartbeat_policy = config.heartbeat_throttle_policy();
    let activity_slots = Arc::new(ActivitySlots::new(
        config.max_concurrent_activities,
        config.max_concurrent_local_activities,
    ));

    loop {
        if !shutdown.borrow().accepts_new_polls() {
            info!("activity poll loop stopping: supervisor is no longer accepting new polls");
            return;
        }

        let kind = SlotKind::Activity;
        let permit = tokio::select! {
            permit = slots.acquire(kind) => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
            _ = shutdown.changed() => continue,
        };

        let request = pb::PollActivityTaskQueueRequest {
            namespace: config.namespace.clone(),
            task_queue: Some(pb::TaskQueue {
                name: config.task_queue.clone(),
                kind: pb::TaskQueueKind::Normal as i32,
                normal_name: config.task_queue.clone(),
            }),
            identity: config.identity.clone(),
            max_tasks_per_second: 0.0,
        };

        let poll_result = tokio::select! {
            result = client.poll_activity_task_queue(request) => result,
            _ = shutdown.changed() => {
                drop(permit);
                continue;
            }
        };

        let response = match poll_result {
            Ok(response) => response,
            Err(status) => {
                drop(permit);
                warn!(%status, "activity task poll failed");
                continue;
            }
        };

        let Some(start) = response.task else {
            drop(permit);
            continue;
        };

        let task_token = response.task_token;
        let client = client.clone();
        let registry = registry.clone();
        let converter = converter.clone();
        let config = config.clone();
        let activity_slots = activity_slots.clone();
        let cancel_rx = cancel_registry
            .lock()
            .expect("cancel registry mutex poisoned")
            .register(task_token.clone());
        let cancel_registry_for_task = cancel_registry.clone();
        let token_for_cleanup = task_token.clone();

        tokio::spawn(async move {
            let heartbeat_client = client.clone();
            let heartbeat_namespace = config.namespace.clone();
            let heartbeat_identity = config.identity.clone();
            let heartbeat_token = task_token.clone();
            let heartbeat_registry = cancel_registry_for_task.clone();
            let heartbeat_token_for_registry = task_token.clone();

            let on_heartbeat = move |details: Vec<temporal_core_protos::Payload>| {
                let client = heartbeat_client.clone();
                let request = pb::RecordActivityTaskHeartbeatRequest {
                    task_token: heartbeat_token.clone(),
                    details: Some(temporal_core_protos::pb::Payloads { payloads: details }),
                    identity: heartbeat_identity.clone(),
                    namespace: heartbeat_namespace.clone(),
                };
                let registry = heartbeat_registry.clone();
                let token = heartbeat_token_for_registry.clone();
                tokio::spawn(async move {
                    match client.record_activity_task_heartbeat(request).await {
                        Ok(response) if response.cancel_requested => {
                            registry
                                .lock()
                                .expect("cancel registry mutex poisoned")
                                .cancel(&token, pb::ActivityCancelReason::ServerRequested);
                        }
                        Ok(_) => {}
                        Err(status) => warn!(%status, "failed to record activity heartbeat"),
                    }
                });
            };

            let result = run_activity_task(
                task_token.clone(),
                start,
                &registry,
                &converter,
                &activity_slots,
                heartbeat_policy,
                cancel_rx,
                on_heartbeat,
            )
            .await;

            cancel_registry_for_task
                .lock()
                .expect("cancel registry mutex poisoned")
                .remove(&token_for_cleanup);

            respond(&client, &config, result).await;
            drop(permit);
        });
    }
}

// `ActivitySlots` guards local-vs-remote concurrency independently of the
// poll family's own `SlotManager` permit above, which only bounds how many
// tasks are in flight at all; one instance is shared across every spawned
// task for the lifetime of the loop.

async fn respond(
    client: &BridgeClient,
    config: &WorkerConfig,
    result: Result<pb::ActivityTaskCompletion, temporal_sdk_core::error::ActivityEngineError>,
) {
    let completion = match result {
        Ok(completion) => completion,
        Err(err) => {
            warn!(%err, "activity engine failed to run task");
            return;
        }
    };

    let task_token = completion.task_token;
    match completion.status {
        Some(pb::activity_task_completion::Status::Completed(payloads)) => {
            let request = pb::RespondActivityTaskCompletedRequest {
                task_token,
                result: Some(payloads),
                identity: config.identity.clone(),
                namespace: config.namespace.clone(),
            };
            if let Err(status) = client.respond_activity_task_completed(request).await {
                warn!(%status, "failed to respond activity task completed");
            }
        }
        Some(pb::activity_task_completion::Status::Failed(failure)) => {
            let request = pb::RespondActivityTaskFailedRequest {
                task_token,
                failure: Some(failure),
                last_heartbeat_details: None,
                identity: config.identity.clone(),
                namespace: config.namespace.clone(),
            };
            if let Err(status) = client.respond_activity_task_failed(request).await {
                warn!(%status, "failed to respond activity task failed");
            }
        }
        Some(pb::activity_task_completion::Status::Cancelled(_failure)) => {
            let request = pb::RespondActivityTaskCanceledRequest {
                task_token,
                details: None,
                identity: config.identity.clone(),
                namespace: config.namespace.clone(),
            };
            if let Err(status) = client.respond_activity_task_canceled(request).await {
                warn!(%status, "failed to respond activity task canceled");
            }
        }
        Some(pb::activity_task_completion::Status::WillCompleteAsync(_)) | None => {}
    }
}
