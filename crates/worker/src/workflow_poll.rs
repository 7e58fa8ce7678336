//! The workflow task poll loop.
//!
//! Runs on a single task: the sticky cache lives in one [`WorkflowEngine`]
//! owned entirely by this loop, so activations are applied one at a time
//! rather than fanned out across tasks. Slot acquisition still bounds how
//! much server-side work this worker is willing to have outstanding before
//! the next poll.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use temporal_core_protos::pb;
use temporal_sdk_core::engine::{RoutedCompletion, WorkflowEngine};
use temporal_sdk_core::payload::DataConverter;
use temporal_sdk_core::registry::Registry;
use temporal_sdk_core::slot::{SlotKind, SlotManager};

use temporal_client::BridgeClient;

use crate::config::WorkerConfig;
use crate::state::SupervisorState;

pub async fn run(
    client: Arc<BridgeClient>,
    registry: Registry,
    config: WorkerConfig,
    slots: Arc<SlotManager>,
    mut shutdown: watch::Receiver<SupervisorState>,
) {
    let mut engine = WorkflowEngine::with_capacity(DataConverter::new(), config.max_cached_workflows);
    let poll_count = AtomicU64::new(0);

    loop {
        if !shutdown.borrow().accepts_new_polls() {
            info!("workflow poll loop stopping: supervisor is no longer accepting new polls");
            return;
        }

        let permit = tokio::select! {
            permit = slots.acquire(SlotKind::Workflow) => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
            _ = shutdown.changed() => continue,
        };

        let sticky = poll_count.fetch_add(1, Ordering::Relaxed);
        let task_queue_name = if config.poll_is_sticky(sticky) {
            config.task_queue.clone()
        } else {
            format!("{}:non-sticky", config.task_queue)
        };

        let request = pb::PollWorkflowTaskQueueRequest {
            namespace: config.namespace.clone(),
            task_queue: Some(pb::TaskQueue {
                name: task_queue_name,
                kind: pb::TaskQueueKind::Normal as i32,
                normal_name: config.task_queue.clone(),
            }),
            identity: config.identity.clone(),
            binary_checksum: String::new(),
        };

        let poll_result = tokio::select! {
            result = client.poll_workflow_task_queue(request) => result,
            _ = shutdown.changed() => {
                drop(permit);
                continue;
            }
        };
        drop(permit);

        let response = match poll_result {
            Ok(response) => response,
            Err(status) => {
                warn!(%status, "workflow task poll failed");
                continue;
            }
        };

        let Some(activation) = response.activation else {
            // Empty poll: no task was available before the long-poll
            // deadline elapsed.
            continue;
        };

        handle_one(&client, &mut engine, &registry, &config, response.task_token, activation).await;
    }
}

#[instrument(skip(client, engine, registry, config, task_token, activation), fields(run_id = %activation.run_id))]
async fn handle_one(
    client: &BridgeClient,
    engine: &mut WorkflowEngine,
    registry: &Registry,
    config: &WorkerConfig,
    task_token: Vec<u8>,
    activation: pb::WorkflowActivation,
) {
    let run_id = activation.run_id.clone();
    let routed = engine.handle_wire_activation(activation, registry);

    let completion = match routed {
        Ok(RoutedCompletion::Completion(builder)) => engine.into_wire_completion(run_id, builder),
        Ok(RoutedCompletion::Evicted) => temporal_core_protos::WorkflowActivationCompletion {
            run_id,
            commands: Vec::new(),
            query_responses: Vec::new(),
            failure: None,
        },
        Err(err) => {
            error!(%err, "workflow engine failed to route activation");
            engine.failure_completion(
                run_id,
                temporal_sdk_core::failure::TemporalFailure::application(err.to_string(), "WorkflowEngineError"),
            )
        }
    };

    if let Some(failure) = completion.failure {
        let request = pb::RespondWorkflowTaskFailedRequest {
            task_token,
            failure: Some(temporal_sdk_core::failure::encode_failure(&failure, &DataConverter::new())),
            identity: config.identity.clone(),
            namespace: config.namespace.clone(),
        };
        if let Err(status) = client.respond_workflow_task_failed(request).await {
            warn!(%status, "failed to respond workflow task failed");
        }
        return;
    }

    let request = pb::RespondWorkflowTaskCompletedRequest {
        task_token,
        commands: completion.commands,
        identity: config.identity.clone(),
        sticky_attributes: Some(pb::StickyExecutionAttributes {
            worker_task_queue: Some(pb::TaskQueue {
                name: config.task_queue.clone(),
                kind: pb::TaskQueueKind::Sticky as i32,
                normal_name: config.task_queue.clone(),
            }),
            schedule_to_start_timeout: Some(temporal_core_protos::to_proto_duration(
                config.sticky_queue_schedule_to_start_timeout,
            )),
        }),
        query_results: completion.query_responses,
        namespace: config.namespace.clone(),
    };
    if let Err(status) = client.respond_workflow_task_completed(request).await {
        warn!(%status, "failed to respond workflow task completed");
    }
}
