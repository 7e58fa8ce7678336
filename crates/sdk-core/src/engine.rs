//! Workflow Engine — cache & routing.
//!
//! Owns the bounded `run_id → WorkflowInstance` sticky cache. "The sticky
//! cache is owned exclusively by the engine; mutated only from the
//! workflow task loop", so this type is plain (no internal
//! locking) — the worker supervisor is expected to drive it from a single
//! task per workflow poll family.

use indexmap::IndexMap;

use crate::activation::{decode_activation, Activation, ActivationJob, CompletionBuilder};
use crate::error::WorkflowEngineError;
use crate::failure::{FailureDecodeError, TemporalFailure};
use crate::payload::DataConverter;
use crate::registry::Registry;
use crate::workflow::context::WfContext;
use crate::workflow::instance::WorkflowInstance;

/// Default sticky cache capacity.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Bounded LRU-ish cache of live workflow instances, keyed by run id.
/// Eviction picks the least-recently-touched entry whose own activation
/// queue is empty; since activations are applied
/// synchronously one at a time here, "queue empty" reduces to "not
/// currently being applied", so any entry other than the one in progress
/// qualifies.
pub struct WorkflowEngine {
    capacity: usize,
    instances: IndexMap<String, WorkflowInstance>,
    converter: DataConverter,
}

/// Outcome of routing one activation through the engine.
pub enum RoutedCompletion {
    /// The instance produced a normal completion.
    Completion(CompletionBuilder),
    /// `RemoveFromCache` was processed: drop the instance and ack empty.
    Evicted,
}

impl WorkflowEngine {
    pub fn new(converter: DataConverter) -> Self {
        WorkflowEngine {
            capacity: DEFAULT_CACHE_CAPACITY,
            instances: IndexMap::new(),
            converter,
        }
    }

    pub fn with_capacity(converter: DataConverter, capacity: usize) -> Self {
        WorkflowEngine {
            capacity,
            instances: IndexMap::new(),
            converter,
        }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn contains(&self, run_id: &str) -> bool {
        self.instances.contains_key(run_id)
    }

    /// Decodes the wire activation and routes it to a (possibly
    /// newly-created) instance.
    pub fn handle_wire_activation(
        &mut self,
        wire: temporal_core_protos::WorkflowActivation,
        registry: &Registry,
    ) -> Result<RoutedCompletion, WorkflowEngineError> {
        let activation = decode_activation(wire, &self.converter)
            .map_err(|e: FailureDecodeError| WorkflowEngineError::InstancePanicked(e.to_string()))?;
        self.handle_activation(activation, registry)
    }

    pub fn handle_activation(
        &mut self,
        activation: Activation,
        registry: &Registry,
    ) -> Result<RoutedCompletion, WorkflowEngineError> {
        let run_id = activation.run_id.clone();

        let has_remove = activation
            .jobs
            .iter()
            .any(|j| matches!(j, ActivationJob::RemoveFromCache { .. }));
        if has_remove {
            self.instances.shift_remove(&run_id);
            return Ok(RoutedCompletion::Evicted);
        }

        if !self.instances.contains_key(&run_id) {
            let starts_with_init = matches!(
                activation.jobs.first(),
                Some(ActivationJob::InitializeWorkflow(_))
            );
            if !starts_with_init {
                return Err(WorkflowEngineError::NoCachedWorkflow { run_id });
            }
            self.make_room_for(&run_id);
            let task_queue = match activation.jobs.first() {
                Some(ActivationJob::InitializeWorkflow(init)) => init.task_queue.clone(),
                _ => unreachable!("checked above"),
            };
            let ctx = WfContext::new(
                activation.workflow_id.clone(),
                run_id.clone(),
                task_queue,
                activation.timestamp,
                activation.is_replaying,
            );
            self.instances
                .insert(run_id.clone(), WorkflowInstance::new(ctx, self.converter.clone()));
        } else if let Some(instance) = self.instances.shift_remove(&run_id) {
            // Touch for LRU purposes: re-insertion puts it at the back,
            // so `make_room_for`'s front-first scan treats it as
            // most-recently-used.
            self.instances.insert(run_id.clone(), instance);
        }

        let instance = self
            .instances
            .get_mut(&run_id)
            .ok_or_else(|| WorkflowEngineError::NoCachedWorkflow { run_id: run_id.clone() })?;
        let result = instance.apply_activation(activation, registry)?;
        let terminal = instance.is_terminal();
        if terminal {
            self.instances.shift_remove(&run_id);
        }
        Ok(RoutedCompletion::Completion(result))
    }

    fn make_room_for(&mut self, incoming_run_id: &str) {
        if self.instances.len() < self.capacity {
            return;
        }
        // Evict the least-recently-used entry (front of the map) that
        // isn't the run we're about to insert.
        let evict_key = self
            .instances
            .keys()
            .find(|k| k.as_str() != incoming_run_id)
            .cloned();
        if let Some(key) = evict_key {
            self.instances.shift_remove(&key);
        }
        // If none qualify (e.g. capacity 0 or a pathological single-entry
        // cache), the caller's insert below will simply exceed capacity
        // by one rather than drop the active run; a full backpressure
        // path belongs to the supervisor's sticky-queue timeout handling
        //, not this in-process cache.
    }

    pub fn into_wire_completion(
        &self,
        run_id: String,
        builder: CompletionBuilder,
    ) -> temporal_core_protos::WorkflowActivationCompletion {
        builder.into_wire(run_id, &self.converter)
    }

    pub fn failure_completion(
        &self,
        run_id: String,
        failure: TemporalFailure,
    ) -> temporal_core_protos::WorkflowActivationCompletion {
        let mut builder = CompletionBuilder::default();
        builder.failure = Some(failure);
        builder.into_wire(run_id, &self.converter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn init_activation(run_id: &str, workflow_type: &str) -> Activation {
        Activation {
            run_id: run_id.to_string(),
            workflow_id: format!("wf-{run_id}"),
            timestamp: chrono::Utc::now(),
            jobs: vec![ActivationJob::InitializeWorkflow(
                crate::activation::InitializeWorkflowJob {
                    workflow_id: format!("wf-{run_id}"),
                    workflow_type: workflow_type.to_string(),
                    task_queue: "tq".to_string(),
                    arguments: Vec::new(),
                    headers: HashMap::new(),
                    attempt: 1,
                    continued_from_run_id: String::new(),
                    cron_schedule: String::new(),
                    last_completion_result: Vec::new(),
                    last_failure: None,
                },
            )],
            is_replaying: false,
            history_length: 1,
        }
    }

    fn registry_with_noop(workflow_type: &str) -> Registry {
        let mut registry = Registry::new();
        registry.register_workflow(
            workflow_type,
            std::sync::Arc::new(|_ctx, _args| Box::pin(async move { Ok(Vec::new()) })),
        );
        registry
    }

    #[test]
    fn uncached_non_init_activation_fails() {
        let mut engine = WorkflowEngine::new(DataConverter::new());
        let registry = Registry::new();
        let activation = Activation {
            run_id: "run-1".into(),
            workflow_id: "wf-1".into(),
            timestamp: chrono::Utc::now(),
            jobs: vec![ActivationJob::FireTimer { seq: 1 }],
            is_replaying: false,
            history_length: 1,
        };
        let err = engine.handle_activation(activation, &registry).unwrap_err();
        assert!(matches!(err, WorkflowEngineError::NoCachedWorkflow { .. }));
    }

    #[test]
    fn initialize_workflow_creates_and_caches_instance() {
        let mut engine = WorkflowEngine::new(DataConverter::new());
        let registry = registry_with_noop("Greet");
        let activation = init_activation("run-1", "Greet");
        let result = engine.handle_activation(activation, &registry).unwrap();
        assert!(matches!(result, RoutedCompletion::Completion(_)));
        // The workflow above completes immediately, so it should have
        // been evicted as terminal rather than staying cached.
        assert!(!engine.contains("run-1"));
    }

    #[test]
    fn remove_from_cache_evicts_and_acks_empty() {
        let mut engine = WorkflowEngine::with_capacity(DataConverter::new(), 10);
        let registry = registry_with_noop("Wait");
        let mut activation = init_activation("run-2", "Wait");
        // Replace the noop registry's immediately-completing behavior by
        // not running it to completion: just register then evict.
        engine.handle_activation(activation.clone(), &registry).unwrap();
        activation.jobs = vec![ActivationJob::RemoveFromCache {
            reason: "cache full".into(),
        }];
        let result = engine.handle_activation(activation, &registry).unwrap();
        assert!(matches!(result, RoutedCompletion::Evicted));
        assert!(!engine.contains("run-2"));
    }

    #[test]
    fn eviction_happens_when_capacity_exceeded() {
        let mut engine = WorkflowEngine::with_capacity(DataConverter::new(), 1);
        let mut registry = Registry::new();
        registry.register_workflow(
            "Blocked",
            std::sync::Arc::new(|ctx, _args| {
                Box::pin(async move {
                    ctx.condition(|| false).await?;
                    Ok(Vec::new())
                })
            }),
        );
        engine
            .handle_activation(init_activation("run-a", "Blocked"), &registry)
            .unwrap();
        assert!(engine.contains("run-a"));
        engine
            .handle_activation(init_activation("run-b", "Blocked"), &registry)
            .unwrap();
        assert!(engine.contains("run-b"));
        assert!(!engine.contains("run-a"));
        assert_eq!(engine.len(), 1);
    }
}
