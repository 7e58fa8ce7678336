//! Crate-wide error types that aren't part of the wire failure taxonomy
//! (that lives in [`crate::failure`]).

use thiserror::Error;

use crate::payload::{DecodingError, EncodingError};

#[derive(Debug, Error)]
pub enum WorkflowEngineError {
    #[error("activation for run {run_id} has no cached workflow instance and its first job is not InitializeWorkflow")]
    NoCachedWorkflow { run_id: String },
    #[error("workflow instance panicked: {0}")]
    InstancePanicked(String),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Decoding(#[from] DecodingError),
}

#[derive(Debug, Error)]
pub enum ActivityEngineError {
    #[error("no activity registered under the name `{0}`")]
    NotFound(String),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Decoding(#[from] DecodingError),
}
