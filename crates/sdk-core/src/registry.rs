//! Type-erased name → callable registration for workflows and activities.
//!
//! Workflow futures run on the per-run `LocalPool` in
//! [`crate::workflow::instance`] and are therefore **not** required to be
//! `Send`; only the factory closure itself needs `Send + Sync` so the
//! registry can be shared across worker threads. Activity futures run on
//! the ambient tokio runtime via `tokio::spawn` and must be `Send`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use temporal_core_protos::Payload;

use crate::activity::context::ActivityExecutionContext;
use crate::failure::TemporalFailure;
use crate::workflow::context::WfContext;

pub type WorkflowResult = Result<Vec<Payload>, TemporalFailure>;
pub type WorkflowFuture = Pin<Box<dyn Future<Output = WorkflowResult>>>;
pub type WorkflowFn = Arc<dyn Fn(WfContext, Vec<Payload>) -> WorkflowFuture + Send + Sync>;

pub type ActivityResult = Result<Vec<Payload>, TemporalFailure>;
pub type ActivityFuture = Pin<Box<dyn Future<Output = ActivityResult> + Send>>;
pub type ActivityFn = Arc<dyn Fn(ActivityExecutionContext, Vec<Payload>) -> ActivityFuture + Send + Sync>;

#[derive(Clone, Default)]
pub struct Registry {
    workflows: HashMap<String, WorkflowFn>,
    activities: HashMap<String, ActivityFn>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_workflow(&mut self, workflow_type: impl Into<String>, f: WorkflowFn) {
        self.workflows.insert(workflow_type.into(), f);
    }

    pub fn register_activity(&mut self, activity_type: impl Into<String>, f: ActivityFn) {
        self.activities.insert(activity_type.into(), f);
    }

    pub fn workflow(&self, workflow_type: &str) -> Option<&WorkflowFn> {
        self.workflows.get(workflow_type)
    }

    pub fn activity(&self, activity_type: &str) -> Option<&ActivityFn> {
        self.activities.get(activity_type)
    }

    pub fn workflow_types(&self) -> impl Iterator<Item = &str> {
        self.workflows.keys().map(String::as_str)
    }

    pub fn activity_types(&self) -> impl Iterator<Item = &str> {
        self.activities.keys().map(String::as_str)
    }
}
