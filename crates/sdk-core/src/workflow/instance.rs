//! The deterministic interpreter for a single workflow run: consumes
//! activations, drives workflow code to its next suspension point, and
//! produces the successor commands.
//!
//! The scheduling model — "single-threaded cooperative, runs until all
//! runnable tasks yield or complete" — maps directly onto
//! [`futures::executor::LocalPool::run_until_stalled`]: every suspension
//! point in [`crate::workflow::context`] is a `oneshot` receiver, so
//! stalling the pool is exactly "no runnable task can make progress
//! without a new job". `apply_activation` is a plain synchronous method;
//! nothing here ever awaits across a thread boundary.

use std::rc::Rc;

use futures::executor::LocalPool;
use futures::task::LocalSpawnExt;
use temporal_core_protos::Payload;

use crate::activation::{Activation, ActivationJob, CompletionBuilder, JobResolution};
use crate::command::WorkflowCommand;
use crate::error::WorkflowEngineError;
use crate::failure::TemporalFailure;
use crate::payload::DataConverter;
use crate::registry::Registry;
use crate::workflow::context::WfContext;

/// Owns one run's cooperative executor and shared state. Lives in the
/// engine's sticky cache keyed by `run_id`; evicted under cache pressure
/// or on explicit removal.
pub struct WorkflowInstance {
    pool: LocalPool,
    ctx: WfContext,
    initialized: bool,
    terminal: bool,
    pending_query_responses: Vec<temporal_core_protos::QueryResult>,
    converter: DataConverter,
}

impl WorkflowInstance {
    pub(crate) fn new(ctx: WfContext, converter: DataConverter) -> Self {
        WorkflowInstance {
            pool: LocalPool::new(),
            ctx,
            initialized: false,
            terminal: false,
            pending_query_responses: Vec::new(),
            converter,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn run_id(&self) -> String {
        self.ctx.run_id()
    }

    /// Applies one activation: feeds its jobs to the workflow, runs the
    /// executor to its next stall point, and collects the resulting
    /// commands.
    pub fn apply_activation(
        &mut self,
        activation: Activation,
        registry: &Registry,
    ) -> Result<CompletionBuilder, WorkflowEngineError> {
        {
            let mut shared = self.ctx.shared.borrow_mut();
            shared.now = activation.timestamp;
            shared.is_replaying = activation.is_replaying;
        }

        let jobs = activation.jobs_in_processing_order();
        for job in jobs {
            match job {
                ActivationJob::InitializeWorkflow(init) => {
                    if self.initialized {
                        continue;
                    }
                    self.initialized = true;
                    match registry.workflow(&init.workflow_type).cloned() {
                        Some(workflow_fn) => {
                            let ctx = self.ctx.clone();
                            let args = init.arguments.clone();
                            let spawner = self.pool.spawner();
                            spawner
                                .spawn_local(async move {
                                    let result = workflow_fn(ctx.clone(), args).await;
                                    ctx.shared.borrow_mut().result = Some(result);
                                })
                                .map_err(|e| WorkflowEngineError::InstancePanicked(e.to_string()))?;
                        }
                        None => {
                            self.ctx.shared.borrow_mut().result = Some(Err(TemporalFailure::application(
                                format!("no workflow registered for type `{}`", init.workflow_type),
                                "NotFoundError",
                            )));
                        }
                    }
                }
                ActivationJob::FireTimer { seq } => {
                    if let Some(tx) = self.ctx.shared.borrow_mut().pending_timer.remove(seq) {
                        let _ = tx.send(());
                    }
                }
                ActivationJob::ResolveActivity { seq, result } => {
                    if let Some(tx) = self.ctx.shared.borrow_mut().pending_activity.remove(seq) {
                        let _ = tx.send(result.clone());
                    }
                }
                ActivationJob::ResolveChildWorkflowExecutionStart { seq, status } => {
                    if let Some(tx) = self.ctx.shared.borrow_mut().pending_child_start.remove(seq) {
                        let _ = tx.send(status.clone());
                    }
                }
                ActivationJob::ResolveChildWorkflowExecution { seq, result } => {
                    if let Some(tx) = self.ctx.shared.borrow_mut().pending_child_result.remove(seq) {
                        let _ = tx.send(result.clone());
                    }
                }
                ActivationJob::NotifyHasPatch { patch_id } => {
                    self.ctx.shared.borrow_mut().notified_patches.insert(patch_id.clone());
                }
                ActivationJob::RemoveFromCache { reason } => {
                    self.ctx.shared.borrow_mut().remove_from_cache = Some(reason.clone());
                }
                ActivationJob::CancelWorkflow { .. } => {
                    let waiters = {
                        let mut shared = self.ctx.shared.borrow_mut();
                        shared.cancelled = true;
                        std::mem::take(&mut shared.cancel_waiters)
                    };
                    for tx in waiters {
                        let _ = tx.send(());
                    }
                }
                ActivationJob::SignalWorkflow {
                    signal_name, input, ..
                } => {
                    self.ctx.deliver_signal(signal_name.clone(), input.clone());
                }
                ActivationJob::QueryWorkflow {
                    query_id,
                    query_type,
                    arguments,
                    ..
                } => {
                    self.run_to_stall()?;
                    let result = self.ctx.deliver_query(query_type, arguments.clone());
                    self.push_query_result(query_id.clone(), result);
                }
                ActivationJob::UpdateWorkflow {
                    protocol_instance_id,
                    name,
                    input,
                    ..
                } => {
                    self.ctx
                        .deliver_update(protocol_instance_id.clone(), name.clone(), input.clone());
                }
            }
            self.drain_ready_futures()?;
            self.run_to_stall()?;
        }

        self.run_to_stall()?;
        self.build_completion()
    }

    fn drain_ready_futures(&mut self) -> Result<(), WorkflowEngineError> {
        let futures = std::mem::take(&mut self.ctx.shared.borrow_mut().ready_futures);
        let spawner = self.pool.spawner();
        for fut in futures {
            spawner
                .spawn_local(fut)
                .map_err(|e| WorkflowEngineError::InstancePanicked(e.to_string()))?;
        }
        Ok(())
    }

    /// Re-evaluates `condition()` waiters and runs the pool until no
    /// runnable task can progress.
    fn run_to_stall(&mut self) -> Result<(), WorkflowEngineError> {
        loop {
            let fired = self.check_conditions();
            self.pool.run_until_stalled();
            if !fired {
                break;
            }
        }
        Ok(())
    }

    fn check_conditions(&mut self) -> bool {
        let mut shared = self.ctx.shared.borrow_mut();
        let mut any_fired = false;
        shared.conditions.retain_mut(|(predicate, tx)| {
            if tx.is_some() && predicate() {
                if let Some(tx) = tx.take() {
                    let _ = tx.send(());
                }
                any_fired = true;
                false
            } else {
                true
            }
        });
        any_fired
    }

    fn push_query_result(&mut self, query_id: String, result: Result<Vec<Payload>, TemporalFailure>) {
        use temporal_core_protos::{pb, QueryResult};
        let variant = match result {
            Ok(payloads) => pb::query_result::Variant::Succeeded(pb::Payloads { payloads }),
            Err(f) => {
                pb::query_result::Variant::Failed(crate::failure::encode_failure(&f, &self.converter))
            }
        };
        self.pending_query_responses.push(QueryResult {
            query_id,
            variant: Some(variant),
        });
    }

    fn build_completion(&mut self) -> Result<CompletionBuilder, WorkflowEngineError> {
        let mut shared = self.ctx.shared.borrow_mut();
        let mut builder = CompletionBuilder::default();
        builder.query_responses = std::mem::take(&mut self.pending_query_responses);
        builder.commands = std::mem::take(&mut shared.commands);

        if let Some(continue_as_new) = shared.continued_as_new.take() {
            builder
                .commands
                .push(WorkflowCommand::ContinueAsNewWorkflowExecution(continue_as_new));
            self.terminal = true;
        } else if let Some(result) = shared.result.take() {
            match result {
                Ok(payloads) => builder
                    .commands
                    .push(WorkflowCommand::CompleteWorkflowExecution { result: payloads }),
                Err(failure) => builder
                    .commands
                    .push(WorkflowCommand::FailWorkflowExecution(failure)),
            }
            self.terminal = true;
        }

        Ok(builder)
    }
}
