//! Failure conversion and the error taxonomy.
//!
//! [`TemporalFailure`] is the in-process representation surfaced to
//! workflow/activity code; [`encode_failure`]/[`decode_failure`] convert it
//! to and from the wire `Failure` message, recursing through `cause`
//! chains.

use std::time::Duration;

use temporal_core_protos::{
    self as pb, ActivityFailureInfo, ApplicationFailureInfo, CanceledFailureInfo,
    ChildWorkflowExecutionFailureInfo, Failure as WireFailure, FailureInfo, Payload, RetryState,
    ServerFailureInfo, TerminatedFailureInfo, TimeoutFailureInfo, TimeoutType,
};

use crate::payload::{DataConverter, DecodingError, Json};

/// The SDK name recorded in `Failure.source`, matching the `identity`
/// strings real Temporal servers expect to see from worker-reported
/// failures.
pub const FAILURE_SOURCE: &str = "temporal-sdk-core-rust";

#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationFailure {
    pub message: String,
    pub r#type: String,
    pub non_retryable: bool,
    pub details: Vec<Payload>,
    pub next_retry_delay: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanceledFailure {
    pub message: String,
    pub details: Vec<Payload>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TerminatedFailure {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeoutFailure {
    pub message: String,
    pub timeout_type: TimeoutType,
    pub last_heartbeat_details: Vec<Payload>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerFailure {
    pub message: String,
    pub non_retryable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChildWorkflowFailure {
    pub message: String,
    pub namespace: String,
    pub workflow_id: String,
    pub run_id: String,
    pub workflow_type: String,
    pub retry_state: RetryState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivityFailure {
    pub message: String,
    pub scheduled_event_id: i64,
    pub started_event_id: i64,
    pub identity: String,
    pub activity_type: String,
    pub activity_id: String,
    pub retry_state: RetryState,
}

/// The error taxonomy.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureKind {
    Application(ApplicationFailure),
    Canceled(CanceledFailure),
    Terminated(TerminatedFailure),
    Timeout(TimeoutFailure),
    Server(ServerFailure),
    ChildWorkflow(ChildWorkflowFailure),
    Activity(ActivityFailure),
}

/// A taxonomy failure plus the `cause` chain every Temporal failure
/// carries — e.g. an `Activity` failure's cause is usually the
/// `Application` failure the activity itself raised.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalFailure {
    pub kind: FailureKind,
    pub cause: Option<Box<TemporalFailure>>,
}

impl TemporalFailure {
    pub fn new(kind: FailureKind) -> Self {
        TemporalFailure { kind, cause: None }
    }

    pub fn with_cause(mut self, cause: TemporalFailure) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn message(&self) -> &str {
        match &self.kind {
            FailureKind::Application(f) => &f.message,
            FailureKind::Canceled(f) => &f.message,
            FailureKind::Terminated(f) => &f.message,
            FailureKind::Timeout(f) => &f.message,
            FailureKind::Server(f) => &f.message,
            FailureKind::ChildWorkflow(f) => &f.message,
            FailureKind::Activity(f) => &f.message,
        }
    }

    /// True for failures that a retry policy should not retry: a
    /// non-retryable application error, or one whose `type` is listed in
    /// the policy's `non_retryable_error_types`.
    pub fn is_non_retryable(&self, non_retryable_error_types: &[String]) -> bool {
        match &self.kind {
            FailureKind::Application(f) => {
                f.non_retryable || non_retryable_error_types.iter().any(|t| t == &f.r#type)
            }
            FailureKind::Server(f) => f.non_retryable,
            FailureKind::Canceled(_) | FailureKind::Terminated(_) => true,
            _ => false,
        }
    }

    pub fn application(message: impl Into<String>, r#type: impl Into<String>) -> Self {
        TemporalFailure::new(FailureKind::Application(ApplicationFailure {
            message: message.into(),
            r#type: r#type.into(),
            non_retryable: false,
            details: Vec::new(),
            next_retry_delay: None,
        }))
    }

    pub fn canceled(message: impl Into<String>) -> Self {
        TemporalFailure::new(FailureKind::Canceled(CanceledFailure {
            message: message.into(),
            details: Vec::new(),
        }))
    }
}

/// Encodes the SDK failure shape into the wire message, recursing through
/// the `cause` chain.
pub fn encode_failure(failure: &TemporalFailure, converter: &DataConverter) -> WireFailure {
    let message = failure.message().to_string();
    let failure_info = match &failure.kind {
        FailureKind::Application(f) => FailureInfo::ApplicationFailureInfo(ApplicationFailureInfo {
            r#type: f.r#type.clone(),
            non_retryable: f.non_retryable,
            details: Some(pb::Payloads {
                payloads: f.details.clone(),
            }),
            next_retry_delay: f
                .next_retry_delay
                .map(temporal_core_protos::to_proto_duration),
        }),
        FailureKind::Canceled(f) => FailureInfo::CanceledFailureInfo(CanceledFailureInfo {
            details: Some(pb::Payloads {
                payloads: f.details.clone(),
            }),
        }),
        FailureKind::Terminated(_) => FailureInfo::TerminatedFailureInfo(TerminatedFailureInfo {}),
        FailureKind::Timeout(f) => FailureInfo::TimeoutFailureInfo(TimeoutFailureInfo {
            timeout_type: f.timeout_type as i32,
            last_heartbeat_details: Some(pb::Payloads {
                payloads: f.last_heartbeat_details.clone(),
            }),
        }),
        FailureKind::Server(f) => FailureInfo::ServerFailureInfo(ServerFailureInfo {
            non_retryable: f.non_retryable,
        }),
        FailureKind::ChildWorkflow(f) => {
            FailureInfo::ChildWorkflowExecutionFailureInfo(ChildWorkflowExecutionFailureInfo {
                namespace: f.namespace.clone(),
                workflow_execution: Some(pb::WorkflowExecution {
                    workflow_id: f.workflow_id.clone(),
                    run_id: f.run_id.clone(),
                }),
                workflow_type: f.workflow_type.clone(),
                retry_state: f.retry_state as i32,
            })
        }
        FailureKind::Activity(f) => FailureInfo::ActivityFailureInfo(ActivityFailureInfo {
            scheduled_event_id: f.scheduled_event_id,
            started_event_id: f.started_event_id,
            identity: f.identity.clone(),
            activity_type: f.activity_type.clone(),
            activity_id: f.activity_id.clone(),
            retry_state: f.retry_state as i32,
        }),
    };

    let (message, stack_trace, encoded_attributes) = if converter.encode_common_attributes() {
        let encoded = converter
            .convert_value(&Json(EncodedAttributes {
                message: message.clone(),
                stack_trace: String::new(),
            }))
            .ok();
        (String::new(), String::new(), encoded)
    } else {
        (message, String::new(), None)
    };

    WireFailure {
        message,
        source: FAILURE_SOURCE.to_string(),
        stack_trace,
        encoded_attributes,
        cause: failure
            .cause
            .as_deref()
            .map(|c| Box::new(encode_failure(c, converter))),
        failure_info: Some(failure_info),
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct EncodedAttributes {
    message: String,
    stack_trace: String,
}

#[derive(Debug, thiserror::Error)]
pub enum FailureDecodeError {
    #[error("failure is missing its `failure_info` oneof")]
    MissingInfo,
    #[error("failed to decode payload details: {0}")]
    Payload(#[from] DecodingError),
}

/// Decodes the wire message back into [`TemporalFailure`], recursing
/// through `cause`. Details/last heartbeat payload lists are carried
/// through untouched — callers decode them with whatever type they
/// expect once they know it.
pub fn decode_failure(
    wire: &WireFailure,
    converter: &DataConverter,
) -> Result<TemporalFailure, FailureDecodeError> {
    let message = match &wire.encoded_attributes {
        Some(encoded) => converter
            .convert_payload::<Json<EncodedAttributes>>(encoded)
            .map(|Json(attrs)| attrs.message)
            .unwrap_or_else(|_| wire.message.clone()),
        None => wire.message.clone(),
    };
    let info = wire
        .failure_info
        .as_ref()
        .ok_or(FailureDecodeError::MissingInfo)?;

    let kind = match info {
        FailureInfo::ApplicationFailureInfo(f) => FailureKind::Application(ApplicationFailure {
            message,
            r#type: f.r#type.clone(),
            non_retryable: f.non_retryable,
            details: f
                .details
                .as_ref()
                .map(|p| p.payloads.clone())
                .unwrap_or_default(),
            next_retry_delay: f
                .next_retry_delay
                .as_ref()
                .map(temporal_core_protos::from_proto_duration),
        }),
        FailureInfo::CanceledFailureInfo(f) => FailureKind::Canceled(CanceledFailure {
            message,
            details: f
                .details
                .as_ref()
                .map(|p| p.payloads.clone())
                .unwrap_or_default(),
        }),
        FailureInfo::TerminatedFailureInfo(_) => {
            FailureKind::Terminated(TerminatedFailure { message })
        }
        FailureInfo::TimeoutFailureInfo(f) => FailureKind::Timeout(TimeoutFailure {
            message,
            timeout_type: TimeoutType::try_from(f.timeout_type)
                .unwrap_or(TimeoutType::Unspecified),
            last_heartbeat_details: f
                .last_heartbeat_details
                .as_ref()
                .map(|p| p.payloads.clone())
                .unwrap_or_default(),
        }),
        FailureInfo::ServerFailureInfo(f) => FailureKind::Server(ServerFailure {
            message,
            non_retryable: f.non_retryable,
        }),
        FailureInfo::ChildWorkflowExecutionFailureInfo(f) => {
            let we = f.workflow_execution.clone().unwrap_or_default();
            FailureKind::ChildWorkflow(ChildWorkflowFailure {
                message,
                namespace: f.namespace.clone(),
                workflow_id: we.workflow_id,
                run_id: we.run_id,
                workflow_type: f.workflow_type.clone(),
                retry_state: RetryState::try_from(f.retry_state)
                    .unwrap_or(RetryState::Unspecified),
            })
        }
        FailureInfo::ActivityFailureInfo(f) => FailureKind::Activity(ActivityFailure {
            message,
            scheduled_event_id: f.scheduled_event_id,
            started_event_id: f.started_event_id,
            identity: f.identity.clone(),
            activity_type: f.activity_type.clone(),
            activity_id: f.activity_id.clone(),
            retry_state: RetryState::try_from(f.retry_state).unwrap_or(RetryState::Unspecified),
        }),
    };

    let cause = wire
        .cause
        .as_deref()
        .map(|c| decode_failure(c, converter))
        .transpose()?
        .map(Box::new);

    Ok(TemporalFailure { kind, cause })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_failure_round_trips() {
        let converter = DataConverter::new();
        let failure = TemporalFailure::new(FailureKind::Application(ApplicationFailure {
            message: "order not found".into(),
            r#type: "OrderNotFoundError".into(),
            non_retryable: true,
            details: vec![],
            next_retry_delay: None,
        }));
        let wire = encode_failure(&failure, &converter);
        assert_eq!(wire.source, FAILURE_SOURCE);
        let back = decode_failure(&wire, &converter).unwrap();
        assert_eq!(back, failure);
    }

    #[test]
    fn cause_chain_round_trips() {
        let converter = DataConverter::new();
        let cause = TemporalFailure::application("insufficient funds", "InsufficientFundsError");
        let activity_failure = TemporalFailure::new(FailureKind::Activity(ActivityFailure {
            message: "activity failed".into(),
            scheduled_event_id: 5,
            started_event_id: 6,
            identity: "worker-1".into(),
            activity_type: "ChargeCard".into(),
            activity_id: "act-1".into(),
            retry_state: RetryState::MaximumAttemptsReached,
        }))
        .with_cause(cause.clone());

        let wire = encode_failure(&activity_failure, &converter);
        assert!(wire.cause.is_some());
        let back = decode_failure(&wire, &converter).unwrap();
        assert_eq!(back.cause.map(|c| *c), Some(cause));
    }

    #[test]
    fn non_retryable_application_failure_is_non_retryable() {
        let f = TemporalFailure::new(FailureKind::Application(ApplicationFailure {
            message: "boom".into(),
            r#type: "FatalError".into(),
            non_retryable: false,
            details: vec![],
            next_retry_delay: None,
        }));
        assert!(f.is_non_retryable(&["FatalError".to_string()]));
        assert!(!f.is_non_retryable(&[]));
    }

    #[test]
    fn canceled_failure_is_always_non_retryable() {
        let f = TemporalFailure::new(FailureKind::Canceled(CanceledFailure {
            message: "canceled".into(),
            details: vec![],
        }));
        assert!(f.is_non_retryable(&[]));
    }

    #[test]
    fn encode_common_attributes_moves_message_off_the_plaintext_field() {
        let converter = DataConverter::new().with_encode_common_attributes(true);
        let failure = TemporalFailure::application("order not found", "OrderNotFoundError");

        let wire = encode_failure(&failure, &converter);
        assert!(wire.message.is_empty());
        assert!(wire.encoded_attributes.is_some());

        let back = decode_failure(&wire, &converter).unwrap();
        assert_eq!(back, failure);
    }

    #[test]
    fn default_converter_leaves_message_in_the_clear() {
        let converter = DataConverter::new();
        let failure = TemporalFailure::application("order not found", "OrderNotFoundError");

        let wire = encode_failure(&failure, &converter);
        assert_eq!(wire.message, "order not found");
        assert!(wire.encoded_attributes.is_none());
    }
}
