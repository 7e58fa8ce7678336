//! Activation builders for feeding [`crate::TestHarness`] without
//! hand-assembling every [`Activation`] field each time.

use std::collections::HashMap;

use chrono::Utc;
use temporal_core_protos::Payload;
use temporal_sdk_core::activation::{ActivationJob, InitializeWorkflowJob, JobResolution};
use temporal_sdk_core::{Activation, TemporalFailure};

fn activation(run_id: &str, workflow_id: &str, jobs: Vec<ActivationJob>) -> Activation {
    Activation {
        run_id: run_id.to_string(),
        workflow_id: workflow_id.to_string(),
        timestamp: Utc::now(),
        jobs,
        is_replaying: false,
        history_length: 1,
    }
}

/// A fresh run's `InitializeWorkflow` activation.
pub fn init_workflow(
    run_id: &str,
    workflow_id: &str,
    workflow_type: &str,
    task_queue: &str,
    arguments: Vec<Payload>,
) -> Activation {
    activation(
        run_id,
        workflow_id,
        vec![ActivationJob::InitializeWorkflow(InitializeWorkflowJob {
            workflow_id: workflow_id.to_string(),
            workflow_type: workflow_type.to_string(),
            task_queue: task_queue.to_string(),
            arguments,
            headers: HashMap::new(),
            attempt: 1,
            continued_from_run_id: String::new(),
            cron_schedule: String::new(),
            last_completion_result: Vec::new(),
            last_failure: None,
        })],
    )
}

/// Like [`init_workflow`], but as a continue-as-new run resuming from
/// `continued_from_run_id`.
pub fn init_continued_workflow(
    run_id: &str,
    workflow_id: &str,
    workflow_type: &str,
    task_queue: &str,
    arguments: Vec<Payload>,
    continued_from_run_id: &str,
) -> Activation {
    let mut wf = init_workflow(run_id, workflow_id, workflow_type, task_queue, arguments);
    if let ActivationJob::InitializeWorkflow(init) = &mut wf.jobs[0] {
        init.continued_from_run_id = continued_from_run_id.to_string();
    }
    wf
}

pub fn fire_timer(run_id: &str, workflow_id: &str, seq: u32) -> Activation {
    activation(run_id, workflow_id, vec![ActivationJob::FireTimer { seq }])
}

pub fn resolve_activity_completed(
    run_id: &str,
    workflow_id: &str,
    seq: u32,
    result: Vec<Payload>,
) -> Activation {
    activation(
        run_id,
        workflow_id,
        vec![ActivationJob::ResolveActivity {
            seq,
            result: JobResolution::Completed(result),
        }],
    )
}

pub fn resolve_activity_failed(
    run_id: &str,
    workflow_id: &str,
    seq: u32,
    failure: TemporalFailure,
) -> Activation {
    activation(
        run_id,
        workflow_id,
        vec![ActivationJob::ResolveActivity {
            seq,
            result: JobResolution::Failed(failure),
        }],
    )
}

pub fn signal(
    run_id: &str,
    workflow_id: &str,
    signal_name: &str,
    input: Vec<Payload>,
) -> Activation {
    activation(
        run_id,
        workflow_id,
        vec![ActivationJob::SignalWorkflow {
            signal_name: signal_name.to_string(),
            input,
            headers: HashMap::new(),
        }],
    )
}

pub fn query(
    run_id: &str,
    workflow_id: &str,
    query_id: &str,
    query_type: &str,
    arguments: Vec<Payload>,
) -> Activation {
    activation(
        run_id,
        workflow_id,
        vec![ActivationJob::QueryWorkflow {
            query_id: query_id.to_string(),
            query_type: query_type.to_string(),
            arguments,
            headers: HashMap::new(),
        }],
    )
}

pub fn update(
    run_id: &str,
    workflow_id: &str,
    protocol_instance_id: &str,
    name: &str,
    input: Vec<Payload>,
) -> Activation {
    activation(
        run_id,
        workflow_id,
        vec![ActivationJob::UpdateWorkflow {
            protocol_instance_id: protocol_instance_id.to_string(),
            name: name.to_string(),
            input,
            headers: HashMap::new(),
        }],
    )
}

pub fn cancel_workflow(run_id: &str, workflow_id: &str, details: Vec<Payload>) -> Activation {
    activation(run_id, workflow_id, vec![ActivationJob::CancelWorkflow { details }])
}

pub fn remove_from_cache(run_id: &str, workflow_id: &str, reason: &str) -> Activation {
    activation(
        run_id,
        workflow_id,
        vec![ActivationJob::RemoveFromCache {
            reason: reason.to_string(),
        }],
    )
}
