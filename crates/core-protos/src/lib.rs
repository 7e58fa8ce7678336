//! Generated protobuf types for the subset of the Temporal `WorkflowService`
//! this worker core speaks, plus the activation/command/failure shapes that
//! travel between the core and user workflow/activity code.
//!
//! Proto definitions live in `proto/core.proto`; types below are generated
//! by `tonic-build` (via `protox`, so no system `protoc` is required) at
//! build time. This crate re-exports them under a shorter path so
//! downstream crates don't have to spell out the full package name.

pub mod pb {
    tonic::include_proto!("temporal.core.v1");
}

pub use pb::workflow_service_client::WorkflowServiceClient;
pub use pb::workflow_service_server::{WorkflowService, WorkflowServiceServer};

pub use pb::{
    command::Variant as CommandVariant, failure::FailureInfo,
    history_event::Attributes as HistoryEventAttributes,
    workflow_activation_job::Variant as ActivationJobVariant, ActivityCancelReason,
    ActivityFailureInfo, ActivityTask, ActivityTaskCancel, ActivityTaskCompletion,
    ActivityTaskStart, ApplicationFailureInfo, CancelWorkflow, CanceledFailureInfo,
    ChildWorkflowExecutionFailureInfo, Command, CompleteWorkflowExecution,
    ContinueAsNewWorkflowExecution, FailWorkflowExecution, Failure, FireTimer, HistoryEvent,
    InitializeWorkflow, ModifyWorkflowProperties, NotifyHasPatch, Payload, Payloads, QueryResult,
    QueryWorkflow, RemoveFromCache, RequestCancelActivity,
    RequestCancelChildWorkflowExecution, RequestCancelExternalWorkflowExecution, ResolveActivity,
    ResolveChildWorkflowExecution, ResolveChildWorkflowExecutionStart, RetryPolicy, RetryState,
    ScheduleActivity, ServerFailureInfo, SetPatchMarker, SignalExternalWorkflowExecution,
    SignalWorkflow, StartChildWorkflowExecution, StartTimer, StickyExecutionAttributes,
    TaskQueue, TaskQueueKind, TerminatedFailureInfo, TimeoutFailureInfo, TimeoutType,
    UpdateWorkflow, UpsertWorkflowSearchAttributes, WorkflowActivation, WorkflowActivationJob,
    WorkflowActivationCompletion, WorkflowExecution, WorkflowExecutionCanceledEventAttributes,
    WorkflowExecutionCompletedEventAttributes, WorkflowExecutionContinuedAsNewEventAttributes,
    WorkflowExecutionFailedEventAttributes, WorkflowExecutionTerminatedEventAttributes,
    WorkflowExecutionTimedOutEventAttributes,
};

/// Round-trips a [`chrono::DateTime<Utc>`] through the wire `Timestamp` shape.
pub fn to_proto_timestamp(ts: chrono::DateTime<chrono::Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: ts.timestamp(),
        nanos: ts.timestamp_subsec_nanos() as i32,
    }
}

pub fn from_proto_timestamp(ts: &prost_types::Timestamp) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(ts.seconds, ts.nanos.max(0) as u32)
        .unwrap_or_else(chrono::Utc::now)
}

pub fn to_proto_duration(d: std::time::Duration) -> prost_types::Duration {
    prost_types::Duration {
        seconds: d.as_secs() as i64,
        nanos: d.subsec_nanos() as i32,
    }
}

pub fn from_proto_duration(d: &prost_types::Duration) -> std::time::Duration {
    std::time::Duration::new(d.seconds.max(0) as u64, d.nanos.max(0) as u32)
}
