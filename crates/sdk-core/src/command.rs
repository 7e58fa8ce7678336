//! The typed workflow command shape and its mapping
//! onto the wire `Command` oneof.
//!
//! Workflow code never builds these directly; [`crate::workflow::context`]
//! emits them as a side effect of suspension-producing calls, and
//! [`crate::workflow::instance`] drains the scratch list into the
//! activation completion at the end of each activation.

use std::collections::HashMap;
use std::time::Duration;

use temporal_core_protos::{self as pb, CommandVariant, Payload, RetryPolicy, WorkflowExecution};

use crate::failure::{encode_failure, TemporalFailure};
use crate::payload::DataConverter;

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleActivityCommand {
    pub seq: u32,
    pub activity_id: String,
    pub activity_type: String,
    pub task_queue: String,
    pub input: Vec<Payload>,
    pub headers: HashMap<String, Payload>,
    pub schedule_to_close_timeout: Option<Duration>,
    pub schedule_to_start_timeout: Option<Duration>,
    pub start_to_close_timeout: Option<Duration>,
    pub heartbeat_timeout: Option<Duration>,
    pub retry_policy: Option<RetryPolicy>,
    pub is_local: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartChildWorkflowCommand {
    pub seq: u32,
    pub namespace: String,
    pub workflow_id: String,
    pub workflow_type: String,
    pub task_queue: String,
    pub input: Vec<Payload>,
    pub workflow_execution_timeout: Option<Duration>,
    pub workflow_run_timeout: Option<Duration>,
    pub workflow_task_timeout: Option<Duration>,
    pub parent_close_policy: i32,
    pub cancellation_type: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContinueAsNewCommand {
    pub workflow_type: String,
    pub task_queue: String,
    pub input: Vec<Payload>,
    pub workflow_run_timeout: Option<Duration>,
    pub workflow_task_timeout: Option<Duration>,
}

/// One workflow-originated intent.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowCommand {
    ScheduleActivity(ScheduleActivityCommand),
    StartTimer {
        seq: u32,
        start_to_fire_timeout: Duration,
    },
    CancelTimer {
        seq: u32,
    },
    StartChildWorkflowExecution(StartChildWorkflowCommand),
    RequestCancelExternalWorkflowExecution {
        seq: u32,
        namespace: String,
        workflow_execution: WorkflowExecution,
    },
    SignalExternalWorkflowExecution {
        seq: u32,
        namespace: String,
        workflow_execution: WorkflowExecution,
        signal_name: String,
        input: Vec<Payload>,
    },
    ContinueAsNewWorkflowExecution(ContinueAsNewCommand),
    FailWorkflowExecution(TemporalFailure),
    CompleteWorkflowExecution {
        result: Vec<Payload>,
    },
    UpsertWorkflowSearchAttributes {
        search_attributes: HashMap<String, Payload>,
    },
    ModifyWorkflowProperties {
        upserted_memo: HashMap<String, Payload>,
    },
    RequestCancelActivity {
        seq: u32,
    },
    RequestCancelChildWorkflowExecution {
        seq: u32,
    },
    SetPatchMarker {
        patch_id: String,
        deprecated: bool,
    },
}

impl WorkflowCommand {
    /// Converts to the wire shape. Failure-carrying variants need the run's
    /// configured [`DataConverter`] to encode `encoded_attributes`.
    pub fn into_wire(self, converter: &DataConverter) -> pb::Command {
        let variant = match self {
            WorkflowCommand::ScheduleActivity(c) => CommandVariant::ScheduleActivity(pb::ScheduleActivity {
                seq: c.seq,
                activity_id: c.activity_id,
                activity_type: c.activity_type,
                task_queue: c.task_queue,
                input: Some(pb::Payloads { payloads: c.input }),
                headers: c.headers,
                schedule_to_close_timeout: c.schedule_to_close_timeout.map(to_dur),
                schedule_to_start_timeout: c.schedule_to_start_timeout.map(to_dur),
                start_to_close_timeout: c.start_to_close_timeout.map(to_dur),
                heartbeat_timeout: c.heartbeat_timeout.map(to_dur),
                retry_policy: c.retry_policy,
                is_local: c.is_local,
            }),
            WorkflowCommand::StartTimer {
                seq,
                start_to_fire_timeout,
            } => CommandVariant::StartTimer(pb::StartTimer {
                seq,
                start_to_fire_timeout: Some(to_dur(start_to_fire_timeout)),
            }),
            WorkflowCommand::CancelTimer { seq } => {
                CommandVariant::CancelTimer(pb::CancelTimer { seq })
            }
            WorkflowCommand::StartChildWorkflowExecution(c) => {
                CommandVariant::StartChildWorkflowExecution(pb::StartChildWorkflowExecution {
                    seq: c.seq,
                    namespace: c.namespace,
                    workflow_id: c.workflow_id,
                    workflow_type: c.workflow_type,
                    task_queue: c.task_queue,
                    input: Some(pb::Payloads { payloads: c.input }),
                    workflow_execution_timeout: c.workflow_execution_timeout.map(to_dur),
                    workflow_run_timeout: c.workflow_run_timeout.map(to_dur),
                    workflow_task_timeout: c.workflow_task_timeout.map(to_dur),
                    parent_close_policy: c.parent_close_policy,
                    cancellation_type: c.cancellation_type,
                })
            }
            WorkflowCommand::RequestCancelExternalWorkflowExecution {
                seq,
                namespace,
                workflow_execution,
            } => CommandVariant::RequestCancelExternalWorkflowExecution(
                pb::RequestCancelExternalWorkflowExecution {
                    seq,
                    namespace,
                    workflow_execution: Some(workflow_execution),
                },
            ),
            WorkflowCommand::SignalExternalWorkflowExecution {
                seq,
                namespace,
                workflow_execution,
                signal_name,
                input,
            } => CommandVariant::SignalExternalWorkflowExecution(pb::SignalExternalWorkflowExecution {
                seq,
                namespace,
                workflow_execution: Some(workflow_execution),
                signal_name,
                input: Some(pb::Payloads { payloads: input }),
            }),
            WorkflowCommand::ContinueAsNewWorkflowExecution(c) => {
                CommandVariant::ContinueAsNewWorkflowExecution(pb::ContinueAsNewWorkflowExecution {
                    workflow_type: c.workflow_type,
                    task_queue: c.task_queue,
                    input: Some(pb::Payloads { payloads: c.input }),
                    workflow_run_timeout: c.workflow_run_timeout.map(to_dur),
                    workflow_task_timeout: c.workflow_task_timeout.map(to_dur),
                })
            }
            WorkflowCommand::FailWorkflowExecution(failure) => {
                CommandVariant::FailWorkflowExecution(pb::FailWorkflowExecution {
                    failure: Some(encode_failure(&failure, converter)),
                })
            }
            WorkflowCommand::CompleteWorkflowExecution { result } => {
                CommandVariant::CompleteWorkflowExecution(pb::CompleteWorkflowExecution {
                    result: Some(pb::Payloads { payloads: result }),
                })
            }
            WorkflowCommand::UpsertWorkflowSearchAttributes { search_attributes } => {
                CommandVariant::UpsertWorkflowSearchAttributes(pb::UpsertWorkflowSearchAttributes {
                    search_attributes,
                })
            }
            WorkflowCommand::ModifyWorkflowProperties { upserted_memo } => {
                CommandVariant::ModifyWorkflowProperties(pb::ModifyWorkflowProperties {
                    upserted_memo,
                })
            }
            WorkflowCommand::RequestCancelActivity { seq } => {
                CommandVariant::RequestCancelActivity(pb::RequestCancelActivity { seq })
            }
            WorkflowCommand::RequestCancelChildWorkflowExecution { seq } => {
                CommandVariant::RequestCancelChildWorkflowExecution(
                    pb::RequestCancelChildWorkflowExecution { seq },
                )
            }
            WorkflowCommand::SetPatchMarker {
                patch_id,
                deprecated,
            } => CommandVariant::SetPatchMarker(pb::SetPatchMarker {
                patch_id,
                deprecated,
            }),
        };
        pb::Command {
            variant: Some(variant),
        }
    }
}

fn to_dur(d: Duration) -> prost_types::Duration {
    temporal_core_protos::to_proto_duration(d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_timer_converts_to_wire_shape() {
        let converter = DataConverter::new();
        let cmd = WorkflowCommand::StartTimer {
            seq: 3,
            start_to_fire_timeout: Duration::from_secs(5),
        };
        let wire = cmd.into_wire(&converter);
        match wire.variant {
            Some(CommandVariant::StartTimer(t)) => {
                assert_eq!(t.seq, 3);
                assert_eq!(t.start_to_fire_timeout.unwrap().seconds, 5);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn fail_workflow_execution_encodes_failure() {
        let converter = DataConverter::new();
        let cmd = WorkflowCommand::FailWorkflowExecution(TemporalFailure::application(
            "boom",
            "BoomError",
        ));
        let wire = cmd.into_wire(&converter);
        match wire.variant {
            Some(CommandVariant::FailWorkflowExecution(f)) => {
                assert_eq!(f.failure.unwrap().message, "boom");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
