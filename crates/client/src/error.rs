//! Errors surfaced by the bridge client and external client façade.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("rpc failed: {0}")]
    Rpc(#[from] tonic::Status),

    #[error("call exceeded its overall deadline after {attempts} attempt(s)")]
    DeadlineExceeded { attempts: u32 },

    #[error("channel connection failed: {0}")]
    Connect(#[from] tonic::transport::Error),

    #[error("payload encoding failed: {0}")]
    Encoding(#[from] temporal_sdk_core::payload::EncodingError),

    #[error("payload decoding failed: {0}")]
    Decoding(#[from] temporal_sdk_core::payload::DecodingError),

    #[error("failure decoding failed: {0}")]
    FailureDecoding(#[from] temporal_sdk_core::failure::FailureDecodeError),

    #[error("{operation} is not available through this transport: {reason}")]
    Unsupported {
        operation: &'static str,
        reason: &'static str,
    },

    #[error("workflow {1}/{2} failed: {0:?}")]
    WorkflowFailed(
        temporal_sdk_core::failure::TemporalFailure,
        String,
        String,
    ),

    #[error("workflow {0}/{1} was canceled")]
    WorkflowCanceled(String, String),

    #[error("workflow {1}/{2} was terminated: {0}")]
    WorkflowTerminated(String, String, String),

    #[error("workflow {0}/{1} timed out")]
    WorkflowTimedOut(String, String),

    #[error("workflow {0}/{1} continued as new to run {2}, but follow_runs was false")]
    WorkflowContinuedAsNew(String, String, String),
}
