//! Workflow/activity registration, implemented as explicit
//! `.register_workflow`/`.register_activity` builder methods rather than
//! macro-synthesized registration, and worker bootstrap tying `client`
//! and `worker` together behind one call.

use std::future::Future;
use std::sync::Arc;

use temporal_client::BridgeClient;
use temporal_core_protos::Payload;
use temporal_sdk_core::activity::context::ActivityExecutionContext;
use temporal_sdk_core::registry::{ActivityResult, Registry, WorkflowResult};
use temporal_sdk_core::workflow::context::WfContext;
use temporal_worker::{Worker, WorkerConfig};

/// Accumulates workflow/activity registrations, then builds a [`Worker`]
/// against a connected [`BridgeClient`].
#[derive(Default, Clone)]
pub struct WorkerBuilder {
    registry: Registry,
}

impl WorkerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_workflow<F, Fut>(mut self, workflow_type: impl Into<String>, f: F) -> Self
    where
        F: Fn(WfContext, Vec<Payload>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = WorkflowResult> + 'static,
    {
        self.registry
            .register_workflow(workflow_type, Arc::new(move |ctx, args| Box::pin(f(ctx, args))));
        self
    }

    pub fn register_activity<F, Fut>(mut self, activity_type: impl Into<String>, f: F) -> Self
    where
        F: Fn(ActivityExecutionContext, Vec<Payload>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActivityResult> + Send + 'static,
    {
        self.registry
            .register_activity(activity_type, Arc::new(move |ctx, args| Box::pin(f(ctx, args))));
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Starts a [`Worker`] polling `client` with everything registered so
    /// far.
    pub fn build(self, config: WorkerConfig, client: Arc<BridgeClient>) -> Worker {
        Worker::new(config, client, self.registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_workflow_and_activity_by_name() {
        let builder = WorkerBuilder::new()
            .register_workflow("Greet", |_ctx, args| async move { Ok(args) })
            .register_activity("SayHello", |_ctx, args| async move { Ok(args) });
        assert!(builder.registry().workflow("Greet").is_some());
        assert!(builder.registry().activity("SayHello").is_some());
        assert!(builder.registry().workflow("Missing").is_none());
    }
}
