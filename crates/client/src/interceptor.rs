//! Interceptor Chain: an ordered pipeline of middleware
//! wrapping client and worker operations. "Earlier ones in the array
//! wrap later ones (classic chain-of-responsibility). Default
//! implementations simply forward."

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info_span, Instrument};

use crate::error::ClientError;

/// One named client operation dispatched through the chain. Carries
/// enough to let a tracing/logging interceptor label a span without
/// every interceptor needing to know the operation's request/response
/// types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    StartWorkflow,
    SignalWorkflow,
    QueryWorkflow,
    StartWorkflowUpdate,
    DescribeWorkflow,
    CancelWorkflow,
    TerminateWorkflow,
    FetchWorkflowHistoryEvents,
    ListWorkflows,
    CountWorkflows,
    ExecuteWorkflow,
    HandleSignal,
    HandleQuery,
    HandleUpdate,
    ValidateUpdate,
    ExecuteActivity,
}

impl Operation {
    fn name(self) -> &'static str {
        match self {
            Operation::StartWorkflow => "start_workflow",
            Operation::SignalWorkflow => "signal_workflow",
            Operation::QueryWorkflow => "query_workflow",
            Operation::StartWorkflowUpdate => "start_workflow_update",
            Operation::DescribeWorkflow => "describe_workflow",
            Operation::CancelWorkflow => "cancel_workflow",
            Operation::TerminateWorkflow => "terminate_workflow",
            Operation::FetchWorkflowHistoryEvents => "fetch_workflow_history_events",
            Operation::ListWorkflows => "list_workflows",
            Operation::CountWorkflows => "count_workflows",
            Operation::ExecuteWorkflow => "execute_workflow",
            Operation::HandleSignal => "handle_signal",
            Operation::HandleQuery => "handle_query",
            Operation::HandleUpdate => "handle_update",
            Operation::ValidateUpdate => "validate_update",
            Operation::ExecuteActivity => "execute_activity",
        }
    }
}

/// The type-erased request/response an interceptor sees. Concrete
/// façade methods box their typed payload on the way in and downcast
/// the typed result on the way out; interceptors that don't need to
/// inspect payloads (the common case, e.g. tracing) never pay for this.
pub type BoxPayload = Box<dyn std::any::Any + Send>;

/// The remainder of the chain, invoked by an interceptor that has
/// finished its own work. A wrap-then-forward middleware shape,
/// generalized from HTTP handlers to RPC operations.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Interceptor>],
}

impl<'a> Next<'a> {
    pub fn new(chain: &'a [Arc<dyn Interceptor>]) -> Self {
        Next { chain }
    }

    pub async fn call(
        mut self,
        op: Operation,
        payload: BoxPayload,
        invoke: &(dyn Fn(BoxPayload) -> futures::future::BoxFuture<'static, Result<BoxPayload, ClientError>>
              + Send
              + Sync),
    ) -> Result<BoxPayload, ClientError> {
        match self.chain.split_first() {
            None => invoke(payload).await,
            Some((first, rest)) => {
                self.chain = rest;
                first.intercept(op, payload, self, invoke).await
            }
        }
    }
}

/// One link in the chain. `next.call(...)` re-enters the remainder of
/// the chain (or the wire translator, if this was the last link).
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(
        &self,
        op: Operation,
        payload: BoxPayload,
        next: Next<'_>,
        invoke: &(dyn Fn(BoxPayload) -> futures::future::BoxFuture<'static, Result<BoxPayload, ClientError>>
              + Send
              + Sync),
    ) -> Result<BoxPayload, ClientError>;
}

/// The default no-op interceptor: forwards without observing anything.
pub struct NoopInterceptor;

#[async_trait]
impl Interceptor for NoopInterceptor {
    async fn intercept(
        &self,
        op: Operation,
        payload: BoxPayload,
        next: Next<'_>,
        invoke: &(dyn Fn(BoxPayload) -> futures::future::BoxFuture<'static, Result<BoxPayload, ClientError>>
              + Send
              + Sync),
    ) -> Result<BoxPayload, ClientError> {
        next.call(op, payload, invoke).await
    }
}

/// Wires request/response span attributes and carries a trace-context
/// header across the wire. Included in default interceptor configurations.
pub struct TracingInterceptor {
    pub trace_header: &'static str,
}

impl Default for TracingInterceptor {
    fn default() -> Self {
        TracingInterceptor {
            trace_header: "_tracer-data",
        }
    }
}

#[async_trait]
impl Interceptor for TracingInterceptor {
    async fn intercept(
        &self,
        op: Operation,
        payload: BoxPayload,
        next: Next<'_>,
        invoke: &(dyn Fn(BoxPayload) -> futures::future::BoxFuture<'static, Result<BoxPayload, ClientError>>
              + Send
              + Sync),
    ) -> Result<BoxPayload, ClientError> {
        let span = info_span!("temporal_operation", operation = op.name());
        next.call(op, payload, invoke).instrument(span).await
    }
}

/// An immutable, freely-shareable ordered pipeline. Interceptor chains are
/// immutable after construction and may be shared freely.
#[derive(Clone)]
pub struct InterceptorChain {
    links: Arc<Vec<Arc<dyn Interceptor>>>,
}

impl InterceptorChain {
    pub fn new(links: Vec<Arc<dyn Interceptor>>) -> Self {
        InterceptorChain {
            links: Arc::new(links),
        }
    }

    /// The tracing interceptor alone, matching out-of-the-box behavior.
    pub fn default_chain() -> Self {
        InterceptorChain::new(vec![Arc::new(TracingInterceptor::default())])
    }

    pub async fn run(
        &self,
        op: Operation,
        payload: BoxPayload,
        invoke: &(dyn Fn(BoxPayload) -> futures::future::BoxFuture<'static, Result<BoxPayload, ClientError>>
              + Send
              + Sync),
    ) -> Result<BoxPayload, ClientError> {
        Next::new(self.links.as_slice()).call(op, payload, invoke).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingInterceptor {
        calls: Arc<std::sync::atomic::AtomicU32>,
    }

    #[async_trait]
    impl Interceptor for CountingInterceptor {
        async fn intercept(
            &self,
            op: Operation,
            payload: BoxPayload,
            next: Next<'_>,
            invoke: &(dyn Fn(BoxPayload) -> futures::future::BoxFuture<'static, Result<BoxPayload, ClientError>>
                  + Send
                  + Sync),
        ) -> Result<BoxPayload, ClientError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            next.call(op, payload, invoke).await
        }
    }

    #[tokio::test]
    async fn chain_forwards_in_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        struct Recording {
            order: Arc<std::sync::Mutex<Vec<&'static str>>>,
            label: &'static str,
        }
        #[async_trait]
        impl Interceptor for Recording {
            async fn intercept(
                &self,
                op: Operation,
                payload: BoxPayload,
                next: Next<'_>,
                invoke: &(dyn Fn(BoxPayload) -> futures::future::BoxFuture<'static, Result<BoxPayload, ClientError>>
                      + Send
                      + Sync),
            ) -> Result<BoxPayload, ClientError> {
                self.order.lock().unwrap().push(self.label);
                next.call(op, payload, invoke).await
            }
        }

        let chain = InterceptorChain::new(vec![
            Arc::new(Recording {
                order: order.clone(),
                label: "first",
            }),
            Arc::new(Recording {
                order: order.clone(),
                label: "second",
            }),
        ]);

        let invoke = |payload: BoxPayload| -> futures::future::BoxFuture<'static, Result<BoxPayload, ClientError>> {
            Box::pin(async move { Ok(payload) })
        };
        let result = chain
            .run(Operation::StartWorkflow, Box::new(()), &invoke)
            .await;
        assert!(result.is_ok());
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn empty_chain_invokes_directly() {
        let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let _ = calls.clone();
        let chain = InterceptorChain::new(vec![]);
        let invoke = |payload: BoxPayload| -> futures::future::BoxFuture<'static, Result<BoxPayload, ClientError>> {
            Box::pin(async move { Ok(payload) })
        };
        let result = chain.run(Operation::QueryWorkflow, Box::new(5i32), &invoke).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn counts_through_two_links() {
        let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let chain = InterceptorChain::new(vec![
            Arc::new(CountingInterceptor {
                calls: calls.clone(),
            }),
            Arc::new(CountingInterceptor {
                calls: calls.clone(),
            }),
        ]);
        let invoke = |payload: BoxPayload| -> futures::future::BoxFuture<'static, Result<BoxPayload, ClientError>> {
            Box::pin(async move { Ok(payload) })
        };
        chain
            .run(Operation::CancelWorkflow, Box::new(()), &invoke)
            .await
            .unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
