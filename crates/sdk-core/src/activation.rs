//! The typed workflow activation shape decoded from the wire
//! `WorkflowActivation`, and the completion builder that goes back out.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use temporal_core_protos::{self as pb, ActivationJobVariant, Payload, QueryResult};

use crate::command::WorkflowCommand;
use crate::failure::{decode_failure, encode_failure, FailureDecodeError, TemporalFailure};
use crate::payload::DataConverter;

/// The shared shape of `ResolveActivity.result` and
/// `ResolveChildWorkflowExecution.result`: a job either completed with a
/// result, failed, or was cancelled.
#[derive(Debug, Clone, PartialEq)]
pub enum JobResolution {
    Completed(Vec<Payload>),
    Failed(TemporalFailure),
    Cancelled(TemporalFailure),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChildWorkflowStartStatus {
    Started { run_id: String },
    Failed(TemporalFailure),
    Cancelled(TemporalFailure),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InitializeWorkflowJob {
    pub workflow_id: String,
    pub workflow_type: String,
    pub task_queue: String,
    pub arguments: Vec<Payload>,
    pub headers: HashMap<String, Payload>,
    pub attempt: u32,
    pub continued_from_run_id: String,
    pub cron_schedule: String,
    pub last_completion_result: Vec<Payload>,
    pub last_failure: Option<TemporalFailure>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActivationJob {
    InitializeWorkflow(InitializeWorkflowJob),
    FireTimer {
        seq: u32,
    },
    ResolveActivity {
        seq: u32,
        result: JobResolution,
    },
    ResolveChildWorkflowExecutionStart {
        seq: u32,
        status: ChildWorkflowStartStatus,
    },
    ResolveChildWorkflowExecution {
        seq: u32,
        result: JobResolution,
    },
    SignalWorkflow {
        signal_name: String,
        input: Vec<Payload>,
        headers: HashMap<String, Payload>,
    },
    QueryWorkflow {
        query_id: String,
        query_type: String,
        arguments: Vec<Payload>,
        headers: HashMap<String, Payload>,
    },
    UpdateWorkflow {
        protocol_instance_id: String,
        name: String,
        input: Vec<Payload>,
        headers: HashMap<String, Payload>,
    },
    NotifyHasPatch {
        patch_id: String,
    },
    RemoveFromCache {
        reason: String,
    },
    CancelWorkflow {
        details: Vec<Payload>,
    },
}

impl ActivationJob {
    /// Relative processing order within one activation: resolutions, then
    /// notifications, then signals, queries, updates.
    /// `sort_by_key` on this is stable, so same-class jobs keep wire order.
    pub fn processing_rank(&self) -> u8 {
        match self {
            ActivationJob::InitializeWorkflow(_) => 0,
            ActivationJob::FireTimer { .. }
            | ActivationJob::ResolveActivity { .. }
            | ActivationJob::ResolveChildWorkflowExecutionStart { .. }
            | ActivationJob::ResolveChildWorkflowExecution { .. } => 1,
            ActivationJob::NotifyHasPatch { .. } | ActivationJob::RemoveFromCache { .. } => 2,
            ActivationJob::CancelWorkflow { .. } => 3,
            ActivationJob::SignalWorkflow { .. } => 4,
            ActivationJob::QueryWorkflow { .. } => 5,
            ActivationJob::UpdateWorkflow { .. } => 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Activation {
    pub run_id: String,
    pub workflow_id: String,
    pub timestamp: DateTime<Utc>,
    pub jobs: Vec<ActivationJob>,
    pub is_replaying: bool,
    pub history_length: i64,
}

impl Activation {
    /// Jobs in the fixed order the instance must apply them: init first,
    /// then timer/activity/child resolutions, patch markers, cancellation,
    /// signals, queries, and updates last.
    pub fn jobs_in_processing_order(&self) -> Vec<&ActivationJob> {
        let mut jobs: Vec<&ActivationJob> = self.jobs.iter().collect();
        jobs.sort_by_key(|j| j.processing_rank());
        jobs
    }
}

fn decode_resolution(
    completed: Option<pb::Payloads>,
    failed: Option<pb::Failure>,
    cancelled: Option<pb::Failure>,
    converter: &DataConverter,
) -> Result<JobResolution, FailureDecodeError> {
    if let Some(p) = completed {
        Ok(JobResolution::Completed(p.payloads))
    } else if let Some(f) = failed {
        Ok(JobResolution::Failed(decode_failure(&f, converter)?))
    } else if let Some(f) = cancelled {
        Ok(JobResolution::Cancelled(decode_failure(&f, converter)?))
    } else {
        // A well-formed server always sets exactly one oneof arm; an
        // empty result is treated as an empty completion rather than a
        // hard decode error, matching how `Option<Failure>` fields
        // elsewhere in this crate default to permissive handling.
        Ok(JobResolution::Completed(Vec::new()))
    }
}

pub fn decode_activation(
    wire: pb::WorkflowActivation,
    converter: &DataConverter,
) -> Result<Activation, FailureDecodeError> {
    let timestamp = wire
        .timestamp
        .as_ref()
        .map(temporal_core_protos::from_proto_timestamp)
        .unwrap_or_else(Utc::now);

    let mut jobs = Vec::with_capacity(wire.jobs.len());
    for job in wire.jobs {
        let Some(variant) = job.variant else {
            continue;
        };
        let job = match variant {
            ActivationJobVariant::InitializeWorkflow(j) => {
                ActivationJob::InitializeWorkflow(InitializeWorkflowJob {
                    workflow_id: j.workflow_id,
                    workflow_type: j.workflow_type,
                    task_queue: j.task_queue,
                    arguments: j.arguments.map(|p| p.payloads).unwrap_or_default(),
                    headers: j.headers,
                    attempt: j.attempt,
                    continued_from_run_id: j.continued_from_run_id,
                    cron_schedule: j.cron_schedule,
                    last_completion_result: j
                        .last_completion_result
                        .map(|p| p.payloads)
                        .unwrap_or_default(),
                    last_failure: j
                        .last_failure
                        .as_ref()
                        .map(|f| decode_failure(f, converter))
                        .transpose()?,
                })
            }
            ActivationJobVariant::FireTimer(j) => ActivationJob::FireTimer { seq: j.seq },
            ActivationJobVariant::ResolveActivity(j) => {
                use temporal_core_protos::pb::resolve_activity::Result as R;
                let (completed, failed, cancelled) = match j.result {
                    Some(R::Completed(p)) => (Some(p), None, None),
                    Some(R::Failed(f)) => (None, Some(f), None),
                    Some(R::Cancelled(f)) => (None, None, Some(f)),
                    None => (None, None, None),
                };
                ActivationJob::ResolveActivity {
                    seq: j.seq,
                    result: decode_resolution(completed, failed, cancelled, converter)?,
                }
            }
            ActivationJobVariant::ResolveChildWorkflowExecutionStart(j) => {
                use temporal_core_protos::pb::resolve_child_workflow_execution_start::Status as S;
                let status = match j.status {
                    Some(S::RunId(run_id)) => ChildWorkflowStartStatus::Started { run_id },
                    Some(S::Failed(f)) => {
                        ChildWorkflowStartStatus::Failed(decode_failure(&f, converter)?)
                    }
                    Some(S::Cancelled(f)) => {
                        ChildWorkflowStartStatus::Cancelled(decode_failure(&f, converter)?)
                    }
                    None => ChildWorkflowStartStatus::Started {
                        run_id: String::new(),
                    },
                };
                ActivationJob::ResolveChildWorkflowExecutionStart { seq: j.seq, status }
            }
            ActivationJobVariant::ResolveChildWorkflowExecution(j) => {
                use temporal_core_protos::pb::resolve_child_workflow_execution::Result as R;
                let (completed, failed, cancelled) = match j.result {
                    Some(R::Completed(p)) => (Some(p), None, None),
                    Some(R::Failed(f)) => (None, Some(f), None),
                    Some(R::Cancelled(f)) => (None, None, Some(f)),
                    None => (None, None, None),
                };
                ActivationJob::ResolveChildWorkflowExecution {
                    seq: j.seq,
                    result: decode_resolution(completed, failed, cancelled, converter)?,
                }
            }
            ActivationJobVariant::SignalWorkflow(j) => ActivationJob::SignalWorkflow {
                signal_name: j.signal_name,
                input: j.input.map(|p| p.payloads).unwrap_or_default(),
                headers: j.headers,
            },
            ActivationJobVariant::QueryWorkflow(j) => ActivationJob::QueryWorkflow {
                query_id: j.query_id,
                query_type: j.query_type,
                arguments: j.arguments.map(|p| p.payloads).unwrap_or_default(),
                headers: j.headers,
            },
            ActivationJobVariant::UpdateWorkflow(j) => ActivationJob::UpdateWorkflow {
                protocol_instance_id: j.protocol_instance_id,
                name: j.name,
                input: j.input.map(|p| p.payloads).unwrap_or_default(),
                headers: j.headers,
            },
            ActivationJobVariant::NotifyHasPatch(j) => ActivationJob::NotifyHasPatch {
                patch_id: j.patch_id,
            },
            ActivationJobVariant::RemoveFromCache(j) => {
                ActivationJob::RemoveFromCache { reason: j.reason }
            }
            ActivationJobVariant::CancelWorkflow(j) => ActivationJob::CancelWorkflow {
                details: j.details.map(|p| p.payloads).unwrap_or_default(),
            },
        };
        jobs.push(job);
    }

    Ok(Activation {
        run_id: wire.run_id,
        workflow_id: wire.workflow_id,
        timestamp,
        jobs,
        is_replaying: wire.is_replaying,
        history_length: wire.history_length,
    })
}

/// Accumulates the outcome of applying one activation: the scratch
/// command list, any query responses, and (if the run failed outright at
/// the engine level rather than via a `FailWorkflowExecution` command) a
/// top-level failure.
#[derive(Debug, Default)]
pub struct CompletionBuilder {
    pub commands: Vec<WorkflowCommand>,
    pub query_responses: Vec<QueryResult>,
    pub failure: Option<TemporalFailure>,
}

impl CompletionBuilder {
    pub fn into_wire(self, run_id: String, converter: &DataConverter) -> pb::WorkflowActivationCompletion {
        pb::WorkflowActivationCompletion {
            run_id,
            commands: self
                .commands
                .into_iter()
                .map(|c| c.into_wire(converter))
                .collect(),
            query_responses: self.query_responses,
            failure: self.failure.map(|f| encode_failure(&f, converter)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(variant: ActivationJobVariant) -> pb::WorkflowActivationJob {
        pb::WorkflowActivationJob {
            variant: Some(variant),
        }
    }

    #[test]
    fn jobs_are_reordered_into_processing_order() {
        let converter = DataConverter::new();
        let wire = pb::WorkflowActivation {
            run_id: "run-1".into(),
            workflow_id: "wf-1".into(),
            timestamp: None,
            jobs: vec![
                job(ActivationJobVariant::SignalWorkflow(pb::SignalWorkflow {
                    signal_name: "sig".into(),
                    input: None,
                    headers: HashMap::new(),
                })),
                job(ActivationJobVariant::FireTimer(pb::FireTimer { seq: 1 })),
            ],
            is_replaying: false,
            history_length: 10,
        };
        let activation = decode_activation(wire, &converter).unwrap();
        let ordered = activation.jobs_in_processing_order();
        assert!(matches!(ordered[0], ActivationJob::FireTimer { .. }));
        assert!(matches!(ordered[1], ActivationJob::SignalWorkflow { .. }));
    }
}
