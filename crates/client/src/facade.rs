//! External Client Façade: typed operations over the
//! gRPC `WorkflowService`, each routed through the outbound interceptor
//! chain before reaching the wire translator ([`BridgeClient`]).
//!
//! `describe()` reports the coarse `DescribeWorkflowExecution` status;
//! `result()` instead long-polls `GetWorkflowExecutionHistory` for the run's
//! close event and decodes its terminal value, chasing continue-as-new
//! successor run ids when asked to follow runs. This workspace's history
//! model carries only the handful of close-event attribute shapes `result()`
//! needs, not a general event log.

use std::sync::Arc;

use temporal_core_protos::pb;
use temporal_sdk_core::payload::{DataConverter, PayloadConvertible};

use crate::bridge::BridgeClient;
use crate::error::ClientError;
use crate::interceptor::{BoxPayload, InterceptorChain, Operation};

/// Terminal or non-terminal status of a workflow execution, as reported
/// by `DescribeWorkflowExecution`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
    Canceled,
    Terminated,
    ContinuedAsNew,
    TimedOut,
    Unknown,
}

impl WorkflowStatus {
    fn parse(status: &str) -> Self {
        match status {
            "RUNNING" => WorkflowStatus::Running,
            "COMPLETED" => WorkflowStatus::Completed,
            "FAILED" => WorkflowStatus::Failed,
            "CANCELED" => WorkflowStatus::Canceled,
            "TERMINATED" => WorkflowStatus::Terminated,
            "CONTINUED_AS_NEW" => WorkflowStatus::ContinuedAsNew,
            "TIMED_OUT" => WorkflowStatus::TimedOut,
            _ => WorkflowStatus::Unknown,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, WorkflowStatus::Running | WorkflowStatus::Unknown)
    }
}

/// Shared state behind every handle the façade hands out: a value-type
/// bundle re-entering the same client/interceptor chain on every call.
#[derive(Clone)]
pub struct ExternalClient {
    bridge: Arc<BridgeClient>,
    interceptors: InterceptorChain,
    converter: DataConverter,
    namespace: String,
    identity: String,
}

impl ExternalClient {
    pub fn new(
        bridge: Arc<BridgeClient>,
        interceptors: InterceptorChain,
        converter: DataConverter,
        namespace: impl Into<String>,
        identity: impl Into<String>,
    ) -> Self {
        ExternalClient {
            bridge,
            interceptors,
            converter,
            namespace: namespace.into(),
            identity: identity.into(),
        }
    }

    async fn through_chain<T, F, Fut>(
        &self,
        op: Operation,
        run: F,
    ) -> Result<T, ClientError>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<T, ClientError>> + Send + 'static,
    {
        let run = std::sync::Mutex::new(Some(run));
        let invoke = move |_: BoxPayload| -> futures::future::BoxFuture<'static, Result<BoxPayload, ClientError>> {
            let run = run.lock().unwrap().take().expect("invoke called once");
            Box::pin(async move {
                let value = run().await?;
                Ok(Box::new(value) as BoxPayload)
            })
        };
        let result = self.interceptors.run(op, Box::new(()), &invoke).await?;
        Ok(*result
            .downcast::<T>()
            .expect("facade operation's own invoke always returns its own T"))
    }

    /// Starts a workflow execution; returns a handle bound to the new run.
    pub async fn start_workflow<T: PayloadConvertible>(
        &self,
        workflow_id: impl Into<String>,
        workflow_type: impl Into<String>,
        task_queue: impl Into<String>,
        input: &[T],
    ) -> Result<UntypedWorkflowHandle, ClientError> {
        let workflow_id = workflow_id.into();
        let payloads = self.converter.convert_values(input)?;
        let bridge = self.bridge.clone();
        let namespace = self.namespace.clone();
        let identity = self.identity.clone();
        let workflow_type = workflow_type.into();
        let task_queue = task_queue.into();
        let wf_id = workflow_id.clone();
        let response = self
            .through_chain(Operation::StartWorkflow, move || async move {
                bridge
                    .start_workflow_execution(pb::StartWorkflowExecutionRequest {
                        namespace,
                        workflow_id: wf_id,
                        workflow_type,
                        task_queue: Some(pb::TaskQueue {
                            name: task_queue,
                            kind: 0,
                        }),
                        input: Some(payloads),
                        identity,
                        request_id: uuid::Uuid::new_v4().to_string(),
                        ..Default::default()
                    })
                    .await
                    .map_err(ClientError::from)
            })
            .await?;
        Ok(UntypedWorkflowHandle {
            client: self.clone(),
            workflow_id,
            run_id: response.run_id,
        })
    }

    pub fn workflow_handle(
        &self,
        workflow_id: impl Into<String>,
        run_id: impl Into<String>,
    ) -> UntypedWorkflowHandle {
        UntypedWorkflowHandle {
            client: self.clone(),
            workflow_id: workflow_id.into(),
            run_id: run_id.into(),
        }
    }

    pub fn schedule_handle(&self, schedule_id: impl Into<String>) -> UntypedScheduleHandle {
        UntypedScheduleHandle {
            client: self.clone(),
            schedule_id: schedule_id.into(),
        }
    }
}

/// A value-type handle to one workflow run; re-enters the owning
/// client's interceptor chain on every subsequent operation.
#[derive(Clone)]
pub struct UntypedWorkflowHandle {
    client: ExternalClient,
    workflow_id: String,
    run_id: String,
}

impl UntypedWorkflowHandle {
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub async fn signal<T: PayloadConvertible>(
        &self,
        signal_name: impl Into<String>,
        input: &[T],
    ) -> Result<(), ClientError> {
        let payloads = self.client.converter.convert_values(input)?;
        let bridge = self.client.bridge.clone();
        let namespace = self.client.namespace.clone();
        let identity = self.client.identity.clone();
        let execution = pb::WorkflowExecution {
            workflow_id: self.workflow_id.clone(),
            run_id: self.run_id.clone(),
        };
        let signal_name = signal_name.into();
        self.client
            .through_chain(Operation::SignalWorkflow, move || async move {
                bridge
                    .signal_workflow_execution(pb::SignalWorkflowExecutionRequest {
                        namespace,
                        workflow_execution: Some(execution),
                        signal_name,
                        input: Some(payloads),
                        identity,
                    })
                    .await
                    .map_err(ClientError::from)
                    .map(|_| ())
            })
            .await
    }

    pub async fn query<T: PayloadConvertible>(
        &self,
        query_type: impl Into<String>,
        args: &[T],
    ) -> Result<Vec<pb::Payload>, ClientError> {
        let query_args = self.client.converter.convert_values(args)?;
        let bridge = self.client.bridge.clone();
        let namespace = self.client.namespace.clone();
        let execution = pb::WorkflowExecution {
            workflow_id: self.workflow_id.clone(),
            run_id: self.run_id.clone(),
        };
        let query_type = query_type.into();
        self.client
            .through_chain(Operation::QueryWorkflow, move || async move {
                let response = bridge
                    .query_workflow(pb::QueryWorkflowRequest {
                        namespace,
                        workflow_execution: Some(execution),
                        query_type,
                        query_args: Some(query_args),
                    })
                    .await?;
                Ok(response.query_result.map(|p| p.payloads).unwrap_or_default())
            })
            .await
    }

    pub async fn cancel(&self) -> Result<(), ClientError> {
        let bridge = self.client.bridge.clone();
        let namespace = self.client.namespace.clone();
        let identity = self.client.identity.clone();
        let execution = pb::WorkflowExecution {
            workflow_id: self.workflow_id.clone(),
            run_id: self.run_id.clone(),
        };
        self.client
            .through_chain(Operation::CancelWorkflow, move || async move {
                bridge
                    .request_cancel_workflow_execution(pb::RequestCancelWorkflowExecutionRequest {
                        namespace,
                        workflow_execution: Some(execution),
                        identity,
                        request_id: uuid::Uuid::new_v4().to_string(),
                    })
                    .await
                    .map_err(ClientError::from)
                    .map(|_| ())
            })
            .await
    }

    pub async fn terminate(&self, reason: impl Into<String>) -> Result<(), ClientError> {
        let bridge = self.client.bridge.clone();
        let namespace = self.client.namespace.clone();
        let identity = self.client.identity.clone();
        let execution = pb::WorkflowExecution {
            workflow_id: self.workflow_id.clone(),
            run_id: self.run_id.clone(),
        };
        let reason = reason.into();
        self.client
            .through_chain(Operation::TerminateWorkflow, move || async move {
                bridge
                    .terminate_workflow_execution(pb::TerminateWorkflowExecutionRequest {
                        namespace,
                        workflow_execution: Some(execution),
                        reason,
                        details: None,
                        identity,
                    })
                    .await
                    .map_err(ClientError::from)
                    .map(|_| ())
            })
            .await
    }

    pub async fn describe(&self) -> Result<WorkflowStatus, ClientError> {
        let bridge = self.client.bridge.clone();
        let namespace = self.client.namespace.clone();
        let execution = pb::WorkflowExecution {
            workflow_id: self.workflow_id.clone(),
            run_id: self.run_id.clone(),
        };
        self.client
            .through_chain(Operation::DescribeWorkflow, move || async move {
                let response = bridge
                    .describe_workflow_execution(pb::DescribeWorkflowExecutionRequest {
                        namespace,
                        workflow_execution: Some(execution),
                    })
                    .await?;
                Ok(WorkflowStatus::parse(&response.status))
            })
            .await
    }

    /// Long-polls `GetWorkflowExecutionHistory` (`wait_new_event: true`) for
    /// the run's close event and decodes its terminal value. When
    /// `follow_runs` is `true` and the run closes with continue-as-new, it
    /// keeps chasing the successor run id the close event carries until a
    /// genuinely terminal close is reached; when `false` it returns
    /// [`ClientError::WorkflowContinuedAsNew`] immediately instead.
    pub async fn result(&self, follow_runs: bool) -> Result<Vec<pb::Payload>, ClientError> {
        let workflow_id = self.workflow_id.clone();
        let mut run_id = self.run_id.clone();

        loop {
            let bridge = self.client.bridge.clone();
            let namespace = self.client.namespace.clone();
            let execution = pb::WorkflowExecution {
                workflow_id: workflow_id.clone(),
                run_id: run_id.clone(),
            };
            let attrs = self
                .client
                .through_chain(Operation::FetchWorkflowHistoryEvents, move || async move {
                    let mut next_page_token = Vec::new();
                    loop {
                        let response = bridge
                            .get_workflow_execution_history(pb::GetWorkflowExecutionHistoryRequest {
                                namespace: namespace.clone(),
                                workflow_execution: Some(execution.clone()),
                                next_page_token: next_page_token.clone(),
                                wait_new_event: true,
                            })
                            .await?;
                        if let Some(attrs) = response.events.into_iter().find_map(|e| e.attributes) {
                            return Ok(Some(attrs));
                        }
                        if response.next_page_token.is_empty() {
                            return Ok(None);
                        }
                        next_page_token = response.next_page_token;
                    }
                })
                .await?;

            let Some(attrs) = attrs else {
                // No close event on this pass; the server blocked for
                // `wait_new_event` and returned anyway — poll again.
                continue;
            };

            use temporal_core_protos::HistoryEventAttributes as Attrs;
            match attrs {
                Attrs::WorkflowExecutionCompletedEventAttributes(a) => {
                    return Ok(a.result.map(|p| p.payloads).unwrap_or_default());
                }
                Attrs::WorkflowExecutionFailedEventAttributes(a) => {
                    let failure = temporal_sdk_core::failure::decode_failure(
                        &a.failure.unwrap_or_default(),
                        &DataConverter::new(),
                    )?;
                    return Err(ClientError::WorkflowFailed(failure, workflow_id, run_id));
                }
                Attrs::WorkflowExecutionCanceledEventAttributes(_) => {
                    return Err(ClientError::WorkflowCanceled(workflow_id, run_id));
                }
                Attrs::WorkflowExecutionTerminatedEventAttributes(a) => {
                    return Err(ClientError::WorkflowTerminated(a.reason, workflow_id, run_id));
                }
                Attrs::WorkflowExecutionTimedOutEventAttributes(_) => {
                    return Err(ClientError::WorkflowTimedOut(workflow_id, run_id));
                }
                Attrs::WorkflowExecutionContinuedAsNewEventAttributes(a) => {
                    if !follow_runs {
                        return Err(ClientError::WorkflowContinuedAsNew(
                            workflow_id,
                            run_id,
                            a.new_execution_run_id,
                        ));
                    }
                    run_id = a.new_execution_run_id;
                    continue;
                }
            }
        }
    }
}

/// A value-type handle returned by `start_workflow_update`-style calls
/// (not yet wired to a wire RPC beyond `UpdateWorkflowExecution` itself;
/// kept distinct from [`UntypedWorkflowHandle`]).
#[derive(Clone)]
pub struct UntypedWorkflowUpdateHandle {
    client: ExternalClient,
    workflow_id: String,
    run_id: String,
    update_id: String,
}

impl UntypedWorkflowUpdateHandle {
    pub fn update_id(&self) -> &str {
        &self.update_id
    }

    pub async fn result(&self) -> Result<Vec<pb::Payload>, ClientError> {
        let bridge = self.client.bridge.clone();
        let namespace = self.client.namespace.clone();
        let execution = pb::WorkflowExecution {
            workflow_id: self.workflow_id.clone(),
            run_id: self.run_id.clone(),
        };
        let request_id = self.update_id.clone();
        self.client
            .through_chain(Operation::StartWorkflowUpdate, move || async move {
                let response = bridge
                    .update_workflow_execution(pb::UpdateWorkflowExecutionRequest {
                        namespace,
                        workflow_execution: Some(execution),
                        update_name: String::new(),
                        input: None,
                        request_id,
                        wait_for_stage_completed: true,
                    })
                    .await?;
                match response.outcome {
                    Some(pb::update_workflow_execution_response::Outcome::Completed(p)) => {
                        Ok(p.payloads)
                    }
                    Some(pb::update_workflow_execution_response::Outcome::Failed(f)) => {
                        let failure = temporal_sdk_core::failure::decode_failure(
                            &f,
                            &DataConverter::new(),
                        )?;
                        Err(ClientError::WorkflowFailed(
                            failure,
                            String::new(),
                            String::new(),
                        ))
                    }
                    None => Ok(Vec::new()),
                }
            })
            .await
    }
}

impl ExternalClient {
    pub async fn start_workflow_update<T: PayloadConvertible>(
        &self,
        workflow_id: impl Into<String>,
        run_id: impl Into<String>,
        update_name: impl Into<String>,
        input: &[T],
    ) -> Result<UntypedWorkflowUpdateHandle, ClientError> {
        let workflow_id = workflow_id.into();
        let run_id = run_id.into();
        let input_payloads = self.converter.convert_values(input)?;
        let bridge = self.bridge.clone();
        let namespace = self.namespace.clone();
        let execution = pb::WorkflowExecution {
            workflow_id: workflow_id.clone(),
            run_id: run_id.clone(),
        };
        let update_name = update_name.into();
        let request_id = uuid::Uuid::new_v4().to_string();
        let rid = request_id.clone();
        self.through_chain(Operation::StartWorkflowUpdate, move || async move {
            bridge
                .update_workflow_execution(pb::UpdateWorkflowExecutionRequest {
                    namespace,
                    workflow_execution: Some(execution),
                    update_name,
                    input: Some(input_payloads),
                    request_id: rid,
                    wait_for_stage_completed: false,
                })
                .await
                .map_err(ClientError::from)
                .map(|_| ())
        })
        .await?;
        Ok(UntypedWorkflowUpdateHandle {
            client: self.clone(),
            workflow_id,
            run_id,
            update_id: request_id,
        })
    }
}

/// A value-type handle to a schedule. The wire subset this workspace
/// compiles (`core-protos/proto/core.proto`) doesn't define
/// `ScheduleService`, so every operation here surfaces
/// [`ClientError::Unsupported`] rather than guessing at message shapes
/// the server would actually expect; see DESIGN.md.
#[derive(Clone)]
pub struct UntypedScheduleHandle {
    client: ExternalClient,
    schedule_id: String,
}

impl UntypedScheduleHandle {
    pub fn schedule_id(&self) -> &str {
        &self.schedule_id
    }

    pub async fn describe(&self) -> Result<(), ClientError> {
        let _ = &self.client;
        Err(ClientError::Unsupported {
            operation: "describe_schedule",
            reason: "ScheduleService is not part of this workspace's proto subset",
        })
    }

    pub async fn delete(&self) -> Result<(), ClientError> {
        Err(ClientError::Unsupported {
            operation: "delete_schedule",
            reason: "ScheduleService is not part of this workspace's proto subset",
        })
    }
}
