//! Workflow-side deterministic execution.

pub mod context;
pub mod instance;

pub use context::{
    ActivityOptions, ChildWorkflowHandle, ChildWorkflowOptions, ContinueAsNewOptions, WfContext,
};
pub use instance::WorkflowInstance;
