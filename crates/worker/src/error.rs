//! Errors surfaced by the worker supervisor and its poll loops.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker is already running")]
    AlreadyRunning,

    #[error("worker is not running")]
    NotRunning,

    #[error("graceful shutdown period elapsed with in-flight work still outstanding")]
    ShutdownTimeout,

    #[error("rpc failed: {0}")]
    Rpc(#[from] tonic::Status),

    #[error("workflow engine error: {0}")]
    Engine(#[from] temporal_sdk_core::error::WorkflowEngineError),

    #[error("activity engine error: {0}")]
    Activity(#[from] temporal_sdk_core::error::ActivityEngineError),
}
