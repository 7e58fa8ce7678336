//! The sandboxed API workflow code runs against.
//!
//! Every suspension-producing call here follows the same shape: push a
//! [`WorkflowCommand`] onto the run's scratch list, register a
//! [`futures::channel::oneshot`] receiver keyed by a per-run sequence
//! number, and await it (racing the run's cancellation signal). The
//! matching [`crate::workflow::instance::WorkflowInstance`] resolves the
//! oneshot when the corresponding job arrives in a later activation.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::channel::oneshot;
use futures::future::{self, Either};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use temporal_core_protos::{Payload, RetryPolicy, WorkflowExecution};

use crate::activation::{ChildWorkflowStartStatus, JobResolution};
use crate::command::{
    ContinueAsNewCommand, ScheduleActivityCommand, StartChildWorkflowCommand, WorkflowCommand,
};
use crate::failure::TemporalFailure;

pub(crate) type LocalBoxFuture<T> = std::pin::Pin<Box<dyn std::future::Future<Output = T>>>;

#[derive(Debug, Clone, Default)]
pub struct ActivityOptions {
    pub activity_type: String,
    pub task_queue: Option<String>,
    pub input: Vec<Payload>,
    pub schedule_to_close_timeout: Option<Duration>,
    pub schedule_to_start_timeout: Option<Duration>,
    pub start_to_close_timeout: Option<Duration>,
    pub heartbeat_timeout: Option<Duration>,
    pub retry_policy: Option<RetryPolicy>,
    pub is_local: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ChildWorkflowOptions {
    pub workflow_id: String,
    pub workflow_type: String,
    pub namespace: String,
    pub task_queue: Option<String>,
    pub input: Vec<Payload>,
    pub workflow_execution_timeout: Option<Duration>,
    pub workflow_run_timeout: Option<Duration>,
    pub workflow_task_timeout: Option<Duration>,
    pub parent_close_policy: i32,
    pub cancellation_type: i32,
}

#[derive(Debug, Clone, Default)]
pub struct ContinueAsNewOptions {
    pub workflow_type: Option<String>,
    pub task_queue: Option<String>,
    pub input: Vec<Payload>,
    pub workflow_run_timeout: Option<Duration>,
    pub workflow_task_timeout: Option<Duration>,
}

pub type SignalFn = std::sync::Arc<dyn Fn(WfContext, Vec<Payload>) -> LocalBoxFuture<()> + Send + Sync>;
pub type QueryFn =
    std::sync::Arc<dyn Fn(&WfContext, Vec<Payload>) -> Result<Vec<Payload>, TemporalFailure> + Send + Sync>;
pub type UpdateValidatorFn =
    std::sync::Arc<dyn Fn(&WfContext, Vec<Payload>) -> Result<(), TemporalFailure> + Send + Sync>;
pub type UpdateHandlerFn = std::sync::Arc<
    dyn Fn(WfContext, Vec<Payload>) -> LocalBoxFuture<Result<Vec<Payload>, TemporalFailure>> + Send + Sync,
>;

/// Mutable state shared (via `Rc<RefCell<_>>`) between every clone of a
/// run's [`WfContext`] and its owning `WorkflowInstance`. None of this
/// crosses a thread boundary — see the module docs on
/// [`crate::registry`] for why that's sound.
pub(crate) struct Shared {
    pub workflow_id: String,
    pub run_id: String,
    pub task_queue: String,
    pub commands: Vec<WorkflowCommand>,
    pub next_seq: u32,
    pub now: DateTime<Utc>,
    pub is_replaying: bool,
    pub rng: StdRng,
    pub cancelled: bool,
    pub cancel_waiters: Vec<oneshot::Sender<()>>,
    pub pending_timer: HashMap<u32, oneshot::Sender<()>>,
    pub pending_activity: HashMap<u32, oneshot::Sender<JobResolution>>,
    pub pending_child_start: HashMap<u32, oneshot::Sender<ChildWorkflowStartStatus>>,
    pub pending_child_result: HashMap<u32, oneshot::Sender<JobResolution>>,
    pub conditions: Vec<(Rc<dyn Fn() -> bool>, Option<oneshot::Sender<()>>)>,
    pub signal_handlers: HashMap<String, SignalFn>,
    pub pending_signals: VecDeque<(String, Vec<Payload>)>,
    pub query_handlers: HashMap<String, QueryFn>,
    pub update_handlers: HashMap<String, (Option<UpdateValidatorFn>, UpdateHandlerFn)>,
    pub patches_taken: HashMap<String, bool>,
    pub notified_patches: std::collections::HashSet<String>,
    pub remove_from_cache: Option<String>,
    pub continued_as_new: Option<ContinueAsNewCommand>,
    pub completed_updates: Vec<(String, Result<Vec<Payload>, TemporalFailure>)>,
    /// Signal/update handler invocations waiting to be spawned onto the
    /// instance's `LocalPool` (see `WorkflowInstance::drain_ready_futures`).
    pub ready_futures: Vec<LocalBoxFuture<()>>,
    /// Set once the main workflow coroutine returns or fails.
    pub result: Option<Result<Vec<Payload>, TemporalFailure>>,
}

impl Shared {
    fn next_seq(&mut self) -> u32 {
        self.next_seq += 1;
        self.next_seq
    }
}

/// The handle workflow code calls into. Cheap to clone (an `Rc` bump) so
/// it can be handed to signal/update handler closures freely.
#[derive(Clone)]
pub struct WfContext {
    pub(crate) shared: Rc<RefCell<Shared>>,
}

impl WfContext {
    pub(crate) fn new(
        workflow_id: String,
        run_id: String,
        task_queue: String,
        now: DateTime<Utc>,
        is_replaying: bool,
    ) -> Self {
        // Deterministic per-run seed: every replay of the same run must
        // draw the same "random" sequence.
        let seed = {
            use std::hash::{Hash, Hasher};
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            run_id.hash(&mut hasher);
            hasher.finish()
        };
        WfContext {
            shared: Rc::new(RefCell::new(Shared {
                workflow_id,
                run_id,
                task_queue,
                commands: Vec::new(),
                next_seq: 0,
                now,
                is_replaying,
                rng: StdRng::seed_from_u64(seed),
                cancelled: false,
                cancel_waiters: Vec::new(),
                pending_timer: HashMap::new(),
                pending_activity: HashMap::new(),
                pending_child_start: HashMap::new(),
                pending_child_result: HashMap::new(),
                conditions: Vec::new(),
                signal_handlers: HashMap::new(),
                pending_signals: VecDeque::new(),
                query_handlers: HashMap::new(),
                update_handlers: HashMap::new(),
                patches_taken: HashMap::new(),
                notified_patches: std::collections::HashSet::new(),
                remove_from_cache: None,
                continued_as_new: None,
                completed_updates: Vec::new(),
                ready_futures: Vec::new(),
                result: None,
            })),
        }
    }

    pub fn workflow_id(&self) -> String {
        self.shared.borrow().workflow_id.clone()
    }

    pub fn run_id(&self) -> String {
        self.shared.borrow().run_id.clone()
    }

    /// The activation's logical timestamp. Monotonic within a run.
    pub fn now(&self) -> DateTime<Utc> {
        self.shared.borrow().now
    }

    /// Draws from the run's deterministically-seeded RNG.
    pub fn random_f64(&self) -> f64 {
        self.shared.borrow_mut().rng.gen()
    }

    pub fn is_replaying(&self) -> bool {
        self.shared.borrow().is_replaying
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.borrow().cancelled
    }

    fn cancel_receiver(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let mut shared = self.shared.borrow_mut();
        if shared.cancelled {
            let _ = tx.send(());
        } else {
            shared.cancel_waiters.push(tx);
        }
        rx
    }

    /// Races `fut` against cancellation, surfacing the taxonomy's
    /// `Canceled` error if the run is cancelled first.
    async fn race_cancellation<T>(
        &self,
        fut: impl std::future::Future<Output = T>,
    ) -> Result<T, TemporalFailure> {
        let cancel = self.cancel_receiver();
        futures::pin_mut!(fut);
        match future::select(fut, cancel).await {
            Either::Left((value, _)) => Ok(value),
            Either::Right((_, _)) => Err(TemporalFailure::canceled("workflow execution cancelled")),
        }
    }

    /// Emits `StartTimer`; resumes when the matching `FireTimer` job
    /// arrives, or the run is cancelled.
    /// `duration` is signed because the wire `start_to_fire_timeout` is a
    /// signed `google.protobuf.Duration` — negative values are rejected
    /// with an `ArgumentError` and emit no `StartTimer` command, rather
    /// than silently clamping to zero.
    pub async fn sleep(&self, duration: chrono::Duration) -> Result<(), TemporalFailure> {
        if duration < chrono::Duration::zero() {
            return Err(TemporalFailure::application(
                format!("sleep duration must not be negative, got {duration:?}"),
                "ArgumentError",
            ));
        }
        let duration = duration
            .to_std()
            .expect("non-negative chrono::Duration always converts to std::time::Duration");

        let (tx, rx) = oneshot::channel();
        let seq = {
            let mut shared = self.shared.borrow_mut();
            let seq = shared.next_seq();
            shared.pending_timer.insert(seq, tx);
            shared.commands.push(WorkflowCommand::StartTimer {
                seq,
                start_to_fire_timeout: duration,
            });
            seq
        };
        let result = self.race_cancellation(rx).await;
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_canceled_channel)) => Err(TemporalFailure::canceled("timer cancelled")),
            Err(cancel_err) => {
                self.shared.borrow_mut().commands.push(WorkflowCommand::CancelTimer { seq });
                Err(cancel_err)
            }
        }
    }

    /// Suspends until `predicate` evaluates `true`; re-checked whenever
    /// the instance observes a mutation (timer fire, resolution, signal).
    pub async fn condition(&self, predicate: impl Fn() -> bool + 'static) -> Result<(), TemporalFailure> {
        if predicate() {
            return Ok(());
        }
        let (tx, rx) = oneshot::channel();
        self.shared
            .borrow_mut()
            .conditions
            .push((Rc::new(predicate), Some(tx)));
        self.race_cancellation(rx).await.map(|_| ())
    }

    fn push_schedule_activity(&self, options: ActivityOptions) -> (u32, oneshot::Receiver<JobResolution>) {
        let (tx, rx) = oneshot::channel();
        let mut shared = self.shared.borrow_mut();
        let seq = shared.next_seq();
        let task_queue = options.task_queue.clone().unwrap_or_else(|| shared.task_queue.clone());
        shared.pending_activity.insert(seq, tx);
        shared.commands.push(WorkflowCommand::ScheduleActivity(ScheduleActivityCommand {
            seq,
            activity_id: seq.to_string(),
            activity_type: options.activity_type,
            task_queue,
            input: options.input,
            headers: HashMap::new(),
            schedule_to_close_timeout: options.schedule_to_close_timeout,
            schedule_to_start_timeout: options.schedule_to_start_timeout,
            start_to_close_timeout: options.start_to_close_timeout,
            heartbeat_timeout: options.heartbeat_timeout,
            retry_policy: options.retry_policy,
            is_local: options.is_local,
        }));
        (seq, rx)
    }

    /// Emits `ScheduleActivity` and returns immediately with a handle that
    /// resolves on `ResolveActivity`. Use this to run activities
    /// concurrently; `execute_activity` is `start_activity(..).await`.
    pub fn start_activity(
        &self,
        options: ActivityOptions,
    ) -> impl std::future::Future<Output = Result<Vec<Payload>, TemporalFailure>> {
        let (seq, rx) = self.push_schedule_activity(options);
        let ctx = self.clone();
        async move {
            let resolution = ctx
                .race_cancellation(rx)
                .await
                .map_err(|cancel_err| {
                    ctx.shared
                        .borrow_mut()
                        .commands
                        .push(WorkflowCommand::RequestCancelActivity { seq });
                    cancel_err
                })?
                .map_err(|_| TemporalFailure::canceled("activity channel dropped"))?;
            match resolution {
                JobResolution::Completed(payloads) => Ok(payloads),
                JobResolution::Failed(f) | JobResolution::Cancelled(f) => Err(f),
            }
        }
    }

    pub async fn execute_activity(
        &self,
        options: ActivityOptions,
    ) -> Result<Vec<Payload>, TemporalFailure> {
        self.start_activity(options).await
    }

    /// Emits `StartChildWorkflowExecution`; resumes on
    /// `ResolveChildWorkflowExecutionStart`, then the returned future
    /// resolves the final result on `ResolveChildWorkflowExecution`.
    pub fn start_child_workflow(
        &self,
        options: ChildWorkflowOptions,
    ) -> impl std::future::Future<Output = Result<ChildWorkflowHandle, TemporalFailure>> {
        let (start_tx, start_rx) = oneshot::channel();
        let ctx = self.clone();
        let seq = {
            let mut shared = self.shared.borrow_mut();
            let seq = shared.next_seq();
            let task_queue = options
                .task_queue
                .clone()
                .unwrap_or_else(|| shared.task_queue.clone());
            shared.pending_child_start.insert(seq, start_tx);
            shared
                .commands
                .push(WorkflowCommand::StartChildWorkflowExecution(StartChildWorkflowCommand {
                    seq,
                    namespace: options.namespace,
                    workflow_id: options.workflow_id,
                    workflow_type: options.workflow_type,
                    task_queue,
                    input: options.input,
                    workflow_execution_timeout: options.workflow_execution_timeout,
                    workflow_run_timeout: options.workflow_run_timeout,
                    workflow_task_timeout: options.workflow_task_timeout,
                    parent_close_policy: options.parent_close_policy,
                    cancellation_type: options.cancellation_type,
                }));
            seq
        };
        async move {
            let status = ctx
                .race_cancellation(start_rx)
                .await?
                .map_err(|_| TemporalFailure::canceled("child workflow channel dropped"))?;
            match status {
                ChildWorkflowStartStatus::Started { run_id } => Ok(ChildWorkflowHandle { ctx, seq, run_id }),
                ChildWorkflowStartStatus::Failed(f) | ChildWorkflowStartStatus::Cancelled(f) => Err(f),
            }
        }
    }

    pub async fn execute_child_workflow(
        &self,
        options: ChildWorkflowOptions,
    ) -> Result<Vec<Payload>, TemporalFailure> {
        let handle = self.start_child_workflow(options).await?;
        handle.result().await
    }

    pub fn signal_external_workflow(
        &self,
        workflow_execution: WorkflowExecution,
        namespace: impl Into<String>,
        signal_name: impl Into<String>,
        input: Vec<Payload>,
    ) {
        let mut shared = self.shared.borrow_mut();
        let seq = shared.next_seq();
        shared.commands.push(WorkflowCommand::SignalExternalWorkflowExecution {
            seq,
            namespace: namespace.into(),
            workflow_execution,
            signal_name: signal_name.into(),
            input,
        });
    }

    pub fn request_cancel_external_workflow(
        &self,
        workflow_execution: WorkflowExecution,
        namespace: impl Into<String>,
    ) {
        let mut shared = self.shared.borrow_mut();
        let seq = shared.next_seq();
        shared.commands.push(WorkflowCommand::RequestCancelExternalWorkflowExecution {
            seq,
            namespace: namespace.into(),
            workflow_execution,
        });
    }

    /// Terminal: marks this run to continue-as-new once the current
    /// coroutine returns.
    pub fn continue_as_new(&self, options: ContinueAsNewOptions) {
        let mut shared = self.shared.borrow_mut();
        let workflow_type = options
            .workflow_type
            .unwrap_or_else(|| "__unspecified__".to_string());
        let task_queue = options.task_queue.unwrap_or_else(|| shared.task_queue.clone());
        shared.continued_as_new = Some(ContinueAsNewCommand {
            workflow_type,
            task_queue,
            input: options.input,
            workflow_run_timeout: options.workflow_run_timeout,
            workflow_task_timeout: options.workflow_task_timeout,
        });
    }

    pub fn upsert_search_attributes(&self, attrs: HashMap<String, Payload>) {
        self.shared
            .borrow_mut()
            .commands
            .push(WorkflowCommand::UpsertWorkflowSearchAttributes { search_attributes: attrs });
    }

    pub fn upsert_memo(&self, memo: HashMap<String, Payload>) {
        self.shared
            .borrow_mut()
            .commands
            .push(WorkflowCommand::ModifyWorkflowProperties { upserted_memo: memo });
    }

    /// Workflow-level versioning marker. Returns `true` the first time
    /// (and every time thereafter) this `patch_id` is taken in a fresh
    /// run; on replay of history recorded *before* the patch existed,
    /// returns `false` without emitting a command.
    pub fn set_patch_marker(&self, patch_id: &str, deprecated: bool) -> bool {
        let mut shared = self.shared.borrow_mut();
        if let Some(&taken) = shared.patches_taken.get(patch_id) {
            return taken;
        }
        let already_notified = shared.notified_patches.contains(patch_id);
        let taken = already_notified || !shared.is_replaying;
        shared.patches_taken.insert(patch_id.to_string(), taken);
        if taken {
            shared.commands.push(WorkflowCommand::SetPatchMarker {
                patch_id: patch_id.to_string(),
                deprecated,
            });
        }
        taken
    }

    pub fn set_signal_handler(&self, name: impl Into<String>, handler: SignalFn) {
        let name = name.into();
        let buffered: Vec<Vec<Payload>> = {
            let mut shared = self.shared.borrow_mut();
            shared.signal_handlers.insert(name.clone(), handler.clone());
            let mut buffered = Vec::new();
            shared.pending_signals.retain(|(n, input)| {
                if n == &name {
                    buffered.push(input.clone());
                    false
                } else {
                    true
                }
            });
            buffered
        };
        for input in buffered {
            let fut = handler(self.clone(), input);
            self.shared.borrow_mut().ready_futures.push(fut);
        }
    }

    /// Invoked by the instance when a `SignalWorkflow` job arrives for a
    /// name with no registered handler yet: buffer it so a handler
    /// registered later in this same run still observes it.
    pub(crate) fn deliver_signal(&self, name: String, input: Vec<Payload>) {
        let handler = self.shared.borrow().signal_handlers.get(&name).cloned();
        match handler {
            Some(handler) => {
                let fut = handler(self.clone(), input);
                self.shared.borrow_mut().ready_futures.push(fut);
            }
            None => self.shared.borrow_mut().pending_signals.push_back((name, input)),
        }
    }

    /// Invoked by the instance when an `UpdateWorkflow` job arrives.
    /// Runs the validator synchronously — read-only, may reject — and, if
    /// accepted, queues the mutating handler.
    pub(crate) fn deliver_update(
        &self,
        protocol_instance_id: String,
        name: String,
        input: Vec<Payload>,
    ) {
        let (validator, handler) = {
            let shared = self.shared.borrow();
            match shared.update_handlers.get(&name) {
                Some((v, h)) => (v.clone(), h.clone()),
                None => {
                    drop(shared);
                    self.shared.borrow_mut().completed_updates.push((
                        protocol_instance_id,
                        Err(TemporalFailure::application(
                            format!("no update handler registered for `{name}`"),
                            "UpdateNotFoundError",
                        )),
                    ));
                    return;
                }
            }
        };
        if let Some(validator) = validator {
            if let Err(rejection) = validator(self, input.clone()) {
                self.shared
                    .borrow_mut()
                    .completed_updates
                    .push((protocol_instance_id, Err(rejection)));
                return;
            }
        }
        let ctx = self.clone();
        let fut: LocalBoxFuture<()> = Box::pin(async move {
            let result = handler(ctx.clone(), input).await;
            ctx.shared
                .borrow_mut()
                .completed_updates
                .push((protocol_instance_id, result));
        });
        self.shared.borrow_mut().ready_futures.push(fut);
    }

    /// Invoked by the instance for a `QueryWorkflow` job: queries are
    /// synchronous and read-only and must not emit
    /// commands.
    pub(crate) fn deliver_query(
        &self,
        name: &str,
        input: Vec<Payload>,
    ) -> Result<Vec<Payload>, TemporalFailure> {
        let handler = self.shared.borrow().query_handlers.get(name).cloned();
        match handler {
            Some(handler) => {
                let commands_before = self.shared.borrow().commands.len();
                let result = handler(self, input);
                if self.shared.borrow().commands.len() != commands_before {
                    return Err(TemporalFailure::application(
                        format!("query handler `{name}` attempted to emit a command"),
                        "QueryHandlerInvalidError",
                    ));
                }
                result
            }
            None => Err(TemporalFailure::application(
                format!("no query handler registered for `{name}`"),
                "QueryNotFoundError",
            )),
        }
    }

    pub fn set_query_handler(&self, name: impl Into<String>, handler: QueryFn) {
        self.shared.borrow_mut().query_handlers.insert(name.into(), handler);
    }

    pub fn set_update_handler(
        &self,
        name: impl Into<String>,
        validator: Option<UpdateValidatorFn>,
        handler: UpdateHandlerFn,
    ) {
        self.shared
            .borrow_mut()
            .update_handlers
            .insert(name.into(), (validator, handler));
    }
}

/// Handle returned by [`WfContext::start_child_workflow`] once the child
/// has started; `result()` awaits its terminal outcome.
pub struct ChildWorkflowHandle {
    ctx: WfContext,
    seq: u32,
    run_id: String,
}

impl ChildWorkflowHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub async fn result(self) -> Result<Vec<Payload>, TemporalFailure> {
        let (tx, rx) = oneshot::channel();
        self.ctx.shared.borrow_mut().pending_child_result.insert(self.seq, tx);
        let resolution = self
            .ctx
            .race_cancellation(rx)
            .await
            .map_err(|cancel_err| {
                self.ctx
                    .shared
                    .borrow_mut()
                    .commands
                    .push(WorkflowCommand::RequestCancelChildWorkflowExecution { seq: self.seq });
                cancel_err
            })?
            .map_err(|_| TemporalFailure::canceled("child workflow channel dropped"))?;
        match resolution {
            JobResolution::Completed(payloads) => Ok(payloads),
            JobResolution::Failed(f) | JobResolution::Cancelled(f) => Err(f),
        }
    }
}
