//! In-memory workflow engine harness for unit-testing workflow and
//! activity definitions without a live server.
//!
//! Feeds [`Activation`]s straight into a [`WorkflowEngine`] + [`Registry`]
//! pair and records the [`CompletionBuilder`] each one produces, the same
//! role an in-memory event store plays for database-backed workflow
//! tests, applied here to activations since this workspace has no local
//! store to fake.

pub mod fixtures;

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use temporal_core_protos::{Payload, QueryResult};
use temporal_sdk_core::engine::{RoutedCompletion, WorkflowEngine};
use temporal_sdk_core::error::WorkflowEngineError;
use temporal_sdk_core::payload::{DataConverter, Json, PayloadConvertible};
use temporal_sdk_core::registry::Registry;
use temporal_sdk_core::{Activation, CompletionBuilder, WorkflowCommand};

/// What happened when an [`Activation`] was handed to the engine.
///
/// Mirrors [`RoutedCompletion`] but owns its data so assertions can hold
/// onto it after the harness moves on to the next activation.
#[derive(Debug, Default)]
pub struct Outcome {
    pub commands: Vec<WorkflowCommand>,
    pub query_responses: Vec<QueryResult>,
    pub failure: Option<temporal_sdk_core::TemporalFailure>,
    pub evicted: bool,
}

impl Outcome {
    fn from_routed(routed: RoutedCompletion) -> Self {
        match routed {
            RoutedCompletion::Evicted => Outcome {
                evicted: true,
                ..Default::default()
            },
            RoutedCompletion::Completion(CompletionBuilder {
                commands,
                query_responses,
                failure,
            }) => Outcome {
                commands,
                query_responses,
                failure,
                evicted: false,
            },
        }
    }

    /// Commands that scheduled a (non-local) activity, in emission order.
    pub fn scheduled_activities(&self) -> Vec<&temporal_sdk_core::command::ScheduleActivityCommand> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                WorkflowCommand::ScheduleActivity(cmd) => Some(cmd),
                _ => None,
            })
            .collect()
    }

    /// `seq`s of every `StartTimer` command emitted.
    pub fn started_timer_seqs(&self) -> Vec<u32> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                WorkflowCommand::StartTimer { seq, .. } => Some(*seq),
                _ => None,
            })
            .collect()
    }

    pub fn completed(&self) -> bool {
        self.commands
            .iter()
            .any(|c| matches!(c, WorkflowCommand::CompleteWorkflowExecution { .. }))
    }
}

/// Drives a [`WorkflowEngine`] with a fixed [`Registry`], recording every
/// activation/outcome pair fed through it.
///
/// `&self` methods (interior mutability via a `Mutex`) so a single
/// harness can be shared the way a real worker shares one engine across
/// a poll loop, even though tests normally drive it from one thread.
pub struct TestHarness {
    engine: Mutex<WorkflowEngine>,
    registry: Registry,
    converter: DataConverter,
    next_run_id: AtomicU32,
}

impl TestHarness {
    pub fn new(registry: Registry) -> Self {
        TestHarness {
            engine: Mutex::new(WorkflowEngine::new(DataConverter::new())),
            registry,
            converter: DataConverter::new(),
            next_run_id: AtomicU32::new(1),
        }
    }

    pub fn with_capacity(registry: Registry, capacity: usize) -> Self {
        TestHarness {
            engine: Mutex::new(WorkflowEngine::with_capacity(DataConverter::new(), capacity)),
            registry,
            converter: DataConverter::new(),
            next_run_id: AtomicU32::new(1),
        }
    }

    /// A fresh, harness-scoped run id — callers that don't care what the
    /// run is called can let the harness pick one.
    pub fn next_run_id(&self) -> String {
        format!("test-run-{}", self.next_run_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn converter(&self) -> &DataConverter {
        &self.converter
    }

    /// Encodes `value` through the harness's data converter — the usual
    /// way to build `arguments`/`input` for the `fixtures` builders.
    pub fn arg<T: PayloadConvertible>(&self, value: &T) -> Payload {
        self.converter
            .convert_value(value)
            .expect("test fixture values must encode")
    }

    /// Shorthand for the common case: JSON-encode a `Serialize` value.
    pub fn json_arg<T: serde::Serialize + serde::de::DeserializeOwned>(&self, value: T) -> Payload {
        self.arg(&Json(value))
    }

    pub fn is_cached(&self, run_id: &str) -> bool {
        self.engine.lock().contains(run_id)
    }

    pub fn cached_count(&self) -> usize {
        self.engine.lock().len()
    }

    /// Feeds one activation through the engine and records the outcome.
    pub fn send(&self, activation: Activation) -> Result<Outcome, WorkflowEngineError> {
        let routed = self
            .engine
            .lock()
            .handle_activation(activation, &self.registry)?;
        Ok(Outcome::from_routed(routed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixtures::*;
    use temporal_sdk_core::command::ScheduleActivityCommand;
    use temporal_sdk_core::workflow::context::WfContext;

    fn echo_registry() -> Registry {
        let mut registry = Registry::new();
        registry.register_workflow(
            "Echo",
            std::sync::Arc::new(|ctx: WfContext, args| {
                Box::pin(async move {
                    ctx.execute_activity(temporal_sdk_core::workflow::context::ActivityOptions {
                        activity_type: "SayHello".to_string(),
                        ..Default::default()
                    })
                    .await?;
                    Ok(args)
                })
            }),
        );
        registry
    }

    #[test]
    fn init_drives_workflow_to_its_first_suspension() {
        let harness = TestHarness::new(echo_registry());
        let run_id = harness.next_run_id();
        let input = vec![harness.json_arg("hi".to_string())];
        let outcome = harness
            .send(init_workflow(&run_id, "wf-1", "Echo", "tq", input))
            .unwrap();
        let scheduled: Vec<&ScheduleActivityCommand> = outcome.scheduled_activities();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].activity_type, "SayHello");
        assert!(harness.is_cached(&run_id));
    }

    fn negative_sleep_registry() -> Registry {
        let mut registry = Registry::new();
        registry.register_workflow(
            "SleepNegative",
            std::sync::Arc::new(|ctx: WfContext, args| {
                Box::pin(async move {
                    ctx.sleep(chrono::Duration::seconds(-1)).await?;
                    Ok(args)
                })
            }),
        );
        registry
    }

    #[test]
    fn negative_sleep_fails_without_starting_a_timer() {
        let harness = TestHarness::new(negative_sleep_registry());
        let run_id = harness.next_run_id();
        let outcome = harness
            .send(init_workflow(&run_id, "wf-1", "SleepNegative", "tq", Vec::new()))
            .unwrap();
        assert!(outcome.started_timer_seqs().is_empty());
        let failed = outcome
            .commands
            .iter()
            .any(|c| matches!(c, WorkflowCommand::FailWorkflowExecution(_)));
        assert!(failed, "expected a FailWorkflowExecution command, got {:?}", outcome.commands);
    }

    #[test]
    fn signal_to_unknown_run_is_rejected() {
        let harness = TestHarness::new(Registry::new());
        let err = harness
            .send(signal(
                "missing-run",
                "wf-1",
                "some-signal",
                Vec::new(),
            ))
            .unwrap_err();
        assert!(matches!(err, WorkflowEngineError::NoCachedWorkflow { .. }));
    }
}
