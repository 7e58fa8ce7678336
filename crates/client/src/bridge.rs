//! Bridge RPC Client: "one unary operation
//! `call(method, request, options) -> response`". Named methods below
//! are thin, typed callers of that one operation — each picks the right
//! [`CallOptions`] preset and forwards to whichever [`Transport`] this
//! client was built with.

use std::future::Future;

use prost::Message;
use tonic::transport::Channel;
use tonic::Status;

use temporal_core_protos::{pb, WorkflowServiceClient};

use crate::call_options::{call_with_retry, CallOptions};
use crate::metadata::ClientMetadata;
use crate::transport::Transport;

pub struct BridgeClient {
    transport: Transport,
    metadata: ClientMetadata,
    default: CallOptions,
    task_poll: CallOptions,
    user_poll: CallOptions,
}

impl BridgeClient {
    pub fn new(transport: Transport, metadata: ClientMetadata) -> Self {
        BridgeClient {
            transport,
            metadata,
            default: CallOptions::default_preset(),
            task_poll: CallOptions::task_poll(),
            user_poll: CallOptions::user_poll(),
        }
    }

    /// The one generic unary call every named method below funnels
    /// through. `invoke` is only exercised against a live gRPC channel;
    /// callback transports dispatch by serializing `req` and decoding the
    /// raw response bytes directly, so they never need a typed method
    /// reference into `WorkflowServiceClient`.
    async fn call<Req, Resp, F, Fut>(
        &self,
        method_name: &'static str,
        req: Req,
        options: &CallOptions,
        invoke: F,
    ) -> Result<Resp, Status>
    where
        Req: Message + Clone + 'static,
        Resp: Message + Default + 'static,
        F: Fn(WorkflowServiceClient<Channel>, tonic::Request<Req>) -> Fut,
        Fut: Future<Output = Result<tonic::Response<Resp>, Status>>,
    {
        call_with_retry(options, || async {
            let mut request = tonic::Request::new(req.clone());
            self.metadata.apply(&mut request);
            match &self.transport {
                Transport::Grpc(client) => invoke(client.clone(), request)
                    .await
                    .map(|response| response.into_inner()),
                Transport::Callback(callback) => {
                    let bytes = req.encode_to_vec();
                    let response_bytes = callback.call(method_name, bytes).await?;
                    Resp::decode(response_bytes.as_slice())
                        .map_err(|e| Status::internal(format!("decode {method_name}: {e}")))
                }
            }
        })
        .await
    }

    // -- worker-facing (task-poll preset) ------------------------------

    pub async fn poll_workflow_task_queue(
        &self,
        req: pb::PollWorkflowTaskQueueRequest,
    ) -> Result<pb::PollWorkflowTaskQueueResponse, Status> {
        self.call(
            "PollWorkflowTaskQueue",
            req,
            &self.task_poll,
            |mut c, r| async move { c.poll_workflow_task_queue(r).await },
        )
        .await
    }

    pub async fn respond_workflow_task_completed(
        &self,
        req: pb::RespondWorkflowTaskCompletedRequest,
    ) -> Result<pb::RespondWorkflowTaskCompletedResponse, Status> {
        self.call(
            "RespondWorkflowTaskCompleted",
            req,
            &self.default,
            |mut c, r| async move { c.respond_workflow_task_completed(r).await },
        )
        .await
    }

    pub async fn respond_workflow_task_failed(
        &self,
        req: pb::RespondWorkflowTaskFailedRequest,
    ) -> Result<pb::RespondWorkflowTaskFailedResponse, Status> {
        self.call(
            "RespondWorkflowTaskFailed",
            req,
            &self.default,
            |mut c, r| async move { c.respond_workflow_task_failed(r).await },
        )
        .await
    }

    pub async fn poll_activity_task_queue(
        &self,
        req: pb::PollActivityTaskQueueRequest,
    ) -> Result<pb::PollActivityTaskQueueResponse, Status> {
        self.call(
            "PollActivityTaskQueue",
            req,
            &self.task_poll,
            |mut c, r| async move { c.poll_activity_task_queue(r).await },
        )
        .await
    }

    pub async fn respond_activity_task_completed(
        &self,
        req: pb::RespondActivityTaskCompletedRequest,
    ) -> Result<pb::RespondActivityTaskCompletedResponse, Status> {
        self.call(
            "RespondActivityTaskCompleted",
            req,
            &self.default,
            |mut c, r| async move { c.respond_activity_task_completed(r).await },
        )
        .await
    }

    pub async fn respond_activity_task_failed(
        &self,
        req: pb::RespondActivityTaskFailedRequest,
    ) -> Result<pb::RespondActivityTaskFailedResponse, Status> {
        self.call(
            "RespondActivityTaskFailed",
            req,
            &self.default,
            |mut c, r| async move { c.respond_activity_task_failed(r).await },
        )
        .await
    }

    pub async fn respond_activity_task_canceled(
        &self,
        req: pb::RespondActivityTaskCanceledRequest,
    ) -> Result<pb::RespondActivityTaskCanceledResponse, Status> {
        self.call(
            "RespondActivityTaskCanceled",
            req,
            &self.default,
            |mut c, r| async move { c.respond_activity_task_canceled(r).await },
        )
        .await
    }

    pub async fn record_activity_task_heartbeat(
        &self,
        req: pb::RecordActivityTaskHeartbeatRequest,
    ) -> Result<pb::RecordActivityTaskHeartbeatResponse, Status> {
        self.call(
            "RecordActivityTaskHeartbeat",
            req,
            &self.default,
            |mut c, r| async move { c.record_activity_task_heartbeat(r).await },
        )
        .await
    }

    pub async fn reset_sticky_task_queue(
        &self,
        req: pb::ResetStickyTaskQueueRequest,
    ) -> Result<pb::ResetStickyTaskQueueResponse, Status> {
        self.call(
            "ResetStickyTaskQueue",
            req,
            &self.default,
            |mut c, r| async move { c.reset_sticky_task_queue(r).await },
        )
        .await
    }

    // -- client-facing (default/user-poll presets) ---------------------

    pub async fn start_workflow_execution(
        &self,
        req: pb::StartWorkflowExecutionRequest,
    ) -> Result<pb::StartWorkflowExecutionResponse, Status> {
        self.call(
            "StartWorkflowExecution",
            req,
            &self.default,
            |mut c, r| async move { c.start_workflow_execution(r).await },
        )
        .await
    }

    pub async fn signal_workflow_execution(
        &self,
        req: pb::SignalWorkflowExecutionRequest,
    ) -> Result<pb::SignalWorkflowExecutionResponse, Status> {
        self.call(
            "SignalWorkflowExecution",
            req,
            &self.default,
            |mut c, r| async move { c.signal_workflow_execution(r).await },
        )
        .await
    }

    pub async fn signal_with_start_workflow_execution(
        &self,
        req: pb::SignalWithStartWorkflowExecutionRequest,
    ) -> Result<pb::SignalWithStartWorkflowExecutionResponse, Status> {
        self.call(
            "SignalWithStartWorkflowExecution",
            req,
            &self.default,
            |mut c, r| async move { c.signal_with_start_workflow_execution(r).await },
        )
        .await
    }

    pub async fn query_workflow(
        &self,
        req: pb::QueryWorkflowRequest,
    ) -> Result<pb::QueryWorkflowResponse, Status> {
        self.call("QueryWorkflow", req, &self.default, |mut c, r| async move {
            c.query_workflow(r).await
        })
        .await
    }

    pub async fn update_workflow_execution(
        &self,
        req: pb::UpdateWorkflowExecutionRequest,
    ) -> Result<pb::UpdateWorkflowExecutionResponse, Status> {
        self.call(
            "UpdateWorkflowExecution",
            req,
            &self.default,
            |mut c, r| async move { c.update_workflow_execution(r).await },
        )
        .await
    }

    pub async fn describe_workflow_execution(
        &self,
        req: pb::DescribeWorkflowExecutionRequest,
    ) -> Result<pb::DescribeWorkflowExecutionResponse, Status> {
        self.call(
            "DescribeWorkflowExecution",
            req,
            &self.default,
            |mut c, r| async move { c.describe_workflow_execution(r).await },
        )
        .await
    }

    pub async fn request_cancel_workflow_execution(
        &self,
        req: pb::RequestCancelWorkflowExecutionRequest,
    ) -> Result<pb::RequestCancelWorkflowExecutionResponse, Status> {
        self.call(
            "RequestCancelWorkflowExecution",
            req,
            &self.default,
            |mut c, r| async move { c.request_cancel_workflow_execution(r).await },
        )
        .await
    }

    pub async fn terminate_workflow_execution(
        &self,
        req: pb::TerminateWorkflowExecutionRequest,
    ) -> Result<pb::TerminateWorkflowExecutionResponse, Status> {
        self.call(
            "TerminateWorkflowExecution",
            req,
            &self.default,
            |mut c, r| async move { c.terminate_workflow_execution(r).await },
        )
        .await
    }

    /// Long-polls one page of history. Callers implementing `result()`
    /// pass `wait_new_event: true` and the user-poll preset applies,
    /// since this is the RPC that blocks for the close event.
    pub async fn get_workflow_execution_history(
        &self,
        req: pb::GetWorkflowExecutionHistoryRequest,
    ) -> Result<pb::GetWorkflowExecutionHistoryResponse, Status> {
        let options = if req.wait_new_event {
            &self.user_poll
        } else {
            &self.default
        };
        self.call(
            "GetWorkflowExecutionHistory",
            req,
            options,
            |mut c, r| async move { c.get_workflow_execution_history(r).await },
        )
        .await
    }

    pub async fn list_workflow_executions(
        &self,
        req: pb::ListWorkflowExecutionsRequest,
    ) -> Result<pb::ListWorkflowExecutionsResponse, Status> {
        self.call(
            "ListWorkflowExecutions",
            req,
            &self.default,
            |mut c, r| async move { c.list_workflow_executions(r).await },
        )
        .await
    }

    pub async fn count_workflow_executions(
        &self,
        req: pb::CountWorkflowExecutionsRequest,
    ) -> Result<pb::CountWorkflowExecutionsResponse, Status> {
        self.call(
            "CountWorkflowExecutions",
            req,
            &self.default,
            |mut c, r| async move { c.count_workflow_executions(r).await },
        )
        .await
    }
}
