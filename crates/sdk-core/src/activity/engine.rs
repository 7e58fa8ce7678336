//! Activity Engine: runs one activity handler to
//! completion under a cancelable context, with heartbeat coalescing and
//! bounded concurrency.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use temporal_core_protos::{self as pb, ActivityCancelReason as WireCancelReason, Payload};
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{debug, warn};

use crate::activity::context::{ActivityCancelReason, ActivityExecutionContext, ActivityInfo};
use crate::error::ActivityEngineError;
use crate::failure::{encode_failure, TemporalFailure};
use crate::payload::DataConverter;
use crate::registry::Registry;

/// Heartbeat throttling policy.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatThrottlePolicy {
    pub default_interval: Duration,
    pub max_interval: Duration,
}

impl Default for HeartbeatThrottlePolicy {
    fn default() -> Self {
        HeartbeatThrottlePolicy {
            default_interval: Duration::from_secs(30),
            max_interval: Duration::from_secs(60),
        }
    }
}

impl HeartbeatThrottlePolicy {
    /// A heartbeat is flushed immediately only if none has been flushed
    /// within this long for the task; otherwise it's coalesced.
    fn flush_interval(&self, server_suggested_throttle: Option<Duration>) -> Duration {
        let suggested_half = server_suggested_throttle
            .map(|d| d / 2)
            .unwrap_or(Duration::ZERO);
        self.default_interval.max(suggested_half).min(self.max_interval)
    }
}

/// Bounded concurrency for remote/local activity execution.
pub struct ActivitySlots {
    remote: Arc<Semaphore>,
    local: Arc<Semaphore>,
}

impl ActivitySlots {
    pub fn new(max_concurrent_activities: usize, max_concurrent_local_activities: usize) -> Self {
        ActivitySlots {
            remote: Arc::new(Semaphore::new(max_concurrent_activities)),
            local: Arc::new(Semaphore::new(max_concurrent_local_activities)),
        }
    }
}

impl Default for ActivitySlots {
    fn default() -> Self {
        // Defaults to 100 for each pool.
        ActivitySlots::new(100, 100)
    }
}

fn wire_cancel_reason(reason: WireCancelReason) -> ActivityCancelReason {
    match reason {
        WireCancelReason::TimedOut => ActivityCancelReason::Timeout,
        WireCancelReason::WorkerShutdown => ActivityCancelReason::WorkerShutdown,
        WireCancelReason::HeartbeatRecordFailure => ActivityCancelReason::HeartbeatRecordFailure,
        WireCancelReason::Paused => ActivityCancelReason::Paused,
        WireCancelReason::ServerRequested | WireCancelReason::Unspecified => {
            ActivityCancelReason::ServerRequested
        }
    }
}

fn decode_info(start: &pb::ActivityTaskStart, task_token: Vec<u8>) -> ActivityInfo {
    ActivityInfo {
        task_token,
        workflow_id: start.workflow_id.clone(),
        run_id: start.workflow_run_id.clone(),
        activity_id: start.activity_id.clone(),
        activity_type: start.activity_type.clone(),
        attempt: start.attempt,
        is_local: start.is_local,
        schedule_to_close_timeout: start
            .schedule_to_close_timeout
            .as_ref()
            .map(temporal_core_protos::from_proto_duration),
        start_to_close_timeout: start
            .start_to_close_timeout
            .as_ref()
            .map(temporal_core_protos::from_proto_duration),
        schedule_to_start_timeout: start
            .schedule_to_start_timeout
            .as_ref()
            .map(temporal_core_protos::from_proto_duration),
        heartbeat_timeout: start
            .heartbeat_timeout
            .as_ref()
            .map(temporal_core_protos::from_proto_duration),
        scheduled_time: start
            .scheduled_time
            .as_ref()
            .map(temporal_core_protos::from_proto_timestamp)
            .unwrap_or_else(chrono::Utc::now),
        started_time: start
            .started_time
            .as_ref()
            .map(temporal_core_protos::from_proto_timestamp)
            .unwrap_or_else(chrono::Utc::now),
        current_attempt_scheduled_time: start
            .current_attempt_scheduled_time
            .as_ref()
            .map(temporal_core_protos::from_proto_timestamp)
            .unwrap_or_else(chrono::Utc::now),
        last_heartbeat_details: start
            .heartbeat_details
            .clone()
            .map(|p| p.payloads)
            .unwrap_or_default(),
    }
}

/// Drives the heartbeat channel for one in-flight task, coalescing bursts
/// per [`HeartbeatThrottlePolicy`] and invoking `flush` with the latest
/// buffered details no more often than the policy allows.
async fn run_heartbeat_loop(
    mut rx: mpsc::UnboundedReceiver<Vec<Payload>>,
    policy: HeartbeatThrottlePolicy,
    mut flush: impl FnMut(Vec<Payload>) + Send + 'static,
) {
    let mut last_flush: Option<Instant> = None;
    let mut pending: Option<Vec<Payload>> = None;
    loop {
        let wait = match (last_flush, &pending) {
            (Some(last), Some(_)) => {
                let elapsed = last.elapsed();
                let interval = policy.flush_interval(None);
                interval.saturating_sub(elapsed)
            }
            _ => Duration::from_secs(u64::MAX / 2),
        };

        tokio::select! {
            received = rx.recv() => {
                match received {
                    Some(details) => {
                        let ready = last_flush.map(|l| l.elapsed() >= policy.flush_interval(None)).unwrap_or(true);
                        if ready {
                            flush(details);
                            last_flush = Some(Instant::now());
                            pending = None;
                        } else {
                            pending = Some(details);
                        }
                    }
                    None => {
                        if let Some(details) = pending.take() {
                            flush(details);
                        }
                        return;
                    }
                }
            }
            _ = tokio::time::sleep(wait), if pending.is_some() => {
                if let Some(details) = pending.take() {
                    flush(details);
                    last_flush = Some(Instant::now());
                }
            }
        }
    }
}

/// Runs a single `ActivityTaskStart` to completion against the registry,
/// producing exactly one `ActivityTaskCompletion`.
///
/// `on_heartbeat` is invoked (off the activity's own task) with the
/// coalesced heartbeat payloads as they're flushed — callers wire this to
/// `RecordActivityTaskHeartbeat`.
pub async fn run_activity_task(
    task_token: Vec<u8>,
    start: pb::ActivityTaskStart,
    registry: &Registry,
    converter: &DataConverter,
    slots: &ActivitySlots,
    heartbeat_policy: HeartbeatThrottlePolicy,
    mut cancel_rx: watch::Receiver<Option<pb::ActivityCancelReason>>,
    mut on_heartbeat: impl FnMut(Vec<Payload>) + Send + 'static,
) -> Result<pb::ActivityTaskCompletion, ActivityEngineError> {
    let activity_fn = registry
        .activity(&start.activity_type)
        .cloned()
        .ok_or_else(|| ActivityEngineError::NotFound(start.activity_type.clone()))?;

    let semaphore = if start.is_local { &slots.local } else { &slots.remote };
    let _permit = semaphore
        .clone()
        .acquire_owned()
        .await
        .expect("activity slot semaphore is never closed");

    let (hb_tx, hb_rx) = mpsc::unbounded_channel();
    let (cancel_reason_tx, cancel_reason_rx) = watch::channel(None);

    let heartbeat_task = tokio::spawn(run_heartbeat_loop(hb_rx, heartbeat_policy, move |details| {
        on_heartbeat(details);
    }));

    let watch_task = tokio::spawn({
        let cancel_reason_tx = cancel_reason_tx.clone();
        async move {
            while cancel_rx.changed().await.is_ok() {
                if let Some(reason) = *cancel_rx.borrow() {
                    let _ = cancel_reason_tx.send(Some(wire_cancel_reason(reason)));
                    return;
                }
            }
        }
    });

    let info = decode_info(&start, task_token.clone());
    let input = start.input.map(|p| p.payloads).unwrap_or_default();
    let ctx = ActivityExecutionContext::new(info, converter.clone(), hb_tx, cancel_reason_rx.clone());

    debug!(activity_type = %start.activity_type, activity_id = %start.activity_id, "running activity");
    let outcome = activity_fn(ctx, input).await;

    heartbeat_task.abort();
    watch_task.abort();

    let status = match outcome {
        Ok(payloads) => pb::activity_task_completion::Status::Completed(pb::Payloads { payloads }),
        Err(failure) => {
            let wire = encode_failure(&failure, converter);
            if is_cancellation(&failure) {
                pb::activity_task_completion::Status::Cancelled(wire)
            } else {
                pb::activity_task_completion::Status::Failed(wire)
            }
        }
    };

    Ok(pb::ActivityTaskCompletion {
        task_token,
        status: Some(status),
    })
}

fn is_cancellation(failure: &TemporalFailure) -> bool {
    matches!(failure.kind, crate::failure::FailureKind::Canceled(_))
}

/// Tracks heartbeat-derived and server-pushed cancel reasons for a single
/// in-flight task and fans them out to [`ActivityExecutionContext`]
/// clones; owned by the worker supervisor's activity poll loop.
pub struct ActivityCancelRegistry {
    senders: HashMap<Vec<u8>, watch::Sender<Option<pb::ActivityCancelReason>>>,
}

impl Default for ActivityCancelRegistry {
    fn default() -> Self {
        ActivityCancelRegistry {
            senders: HashMap::new(),
        }
    }
}

impl ActivityCancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task_token: Vec<u8>) -> watch::Receiver<Option<pb::ActivityCancelReason>> {
        let (tx, rx) = watch::channel(None);
        self.senders.insert(task_token, tx);
        rx
    }

    pub fn cancel(&mut self, task_token: &[u8], reason: pb::ActivityCancelReason) {
        if let Some(tx) = self.senders.get(task_token) {
            let _ = tx.send(Some(reason));
        } else {
            warn!("cancel requested for unknown or already-completed activity task");
        }
    }

    pub fn remove(&mut self, task_token: &[u8]) {
        self.senders.remove(task_token);
    }

    /// Activities still registered (i.e. not yet completed or removed).
    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    /// Cancels every still-registered activity, returning how many were
    /// signalled. Used by the worker supervisor at graceful-shutdown
    /// grace-period expiry.
    pub fn cancel_all(&mut self, reason: pb::ActivityCancelReason) -> usize {
        let count = self.senders.len();
        for tx in self.senders.values() {
            let _ = tx.send(Some(reason));
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn make_start(activity_type: &str) -> pb::ActivityTaskStart {
        pb::ActivityTaskStart {
            workflow_id: "wf-1".into(),
            workflow_run_id: "run-1".into(),
            activity_id: "act-1".into(),
            activity_type: activity_type.into(),
            input: None,
            headers: HashMap::new(),
            scheduled_time: None,
            started_time: None,
            current_attempt_scheduled_time: None,
            attempt: 1,
            schedule_to_close_timeout: None,
            start_to_close_timeout: None,
            heartbeat_timeout: None,
            heartbeat_details: None,
            retry_policy: None,
            is_local: false,
        }
    }

    #[tokio::test]
    async fn unregistered_activity_type_errors() {
        let registry = Registry::new();
        let converter = DataConverter::new();
        let slots = ActivitySlots::default();
        let (_tx, rx) = watch::channel(None);
        let err = run_activity_task(
            vec![1],
            make_start("Missing"),
            &registry,
            &converter,
            &slots,
            HeartbeatThrottlePolicy::default(),
            rx,
            |_| {},
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ActivityEngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn completed_activity_produces_completed_status() {
        let mut registry = Registry::new();
        registry.register_activity(
            "Echo",
            Arc::new(|_ctx, input| Box::pin(async move { Ok(input) })),
        );
        let converter = DataConverter::new();
        let slots = ActivitySlots::default();
        let (_tx, rx) = watch::channel(None);
        let completion = run_activity_task(
            vec![1],
            make_start("Echo"),
            &registry,
            &converter,
            &slots,
            HeartbeatThrottlePolicy::default(),
            rx,
            |_| {},
        )
        .await
        .unwrap();
        assert!(matches!(
            completion.status,
            Some(pb::activity_task_completion::Status::Completed(_))
        ));
    }

    #[tokio::test]
    async fn failed_activity_produces_failed_status() {
        let mut registry = Registry::new();
        registry.register_activity(
            "Boom",
            Arc::new(|_ctx, _input| {
                Box::pin(async move { Err(TemporalFailure::application("boom", "BoomError")) })
            }),
        );
        let converter = DataConverter::new();
        let slots = ActivitySlots::default();
        let (_tx, rx) = watch::channel(None);
        let completion = run_activity_task(
            vec![1],
            make_start("Boom"),
            &registry,
            &converter,
            &slots,
            HeartbeatThrottlePolicy::default(),
            rx,
            |_| {},
        )
        .await
        .unwrap();
        assert!(matches!(
            completion.status,
            Some(pb::activity_task_completion::Status::Failed(_))
        ));
    }

    #[tokio::test]
    async fn canceled_activity_produces_cancelled_status() {
        let mut registry = Registry::new();
        registry.register_activity(
            "Cancelable",
            Arc::new(|_ctx, _input| {
                Box::pin(async move { Err(TemporalFailure::canceled("stopping")) })
            }),
        );
        let converter = DataConverter::new();
        let slots = ActivitySlots::default();
        let (_tx, rx) = watch::channel(None);
        let completion = run_activity_task(
            vec![1],
            make_start("Cancelable"),
            &registry,
            &converter,
            &slots,
            HeartbeatThrottlePolicy::default(),
            rx,
            |_| {},
        )
        .await
        .unwrap();
        assert!(matches!(
            completion.status,
            Some(pb::activity_task_completion::Status::Cancelled(_))
        ));
    }

    #[tokio::test]
    async fn heartbeats_are_flushed_through_callback() {
        let mut registry = Registry::new();
        registry.register_activity(
            "Heartbeats",
            Arc::new(|ctx, _input| {
                Box::pin(async move {
                    ctx.heartbeat(&[crate::payload::Json(1)]).unwrap();
                    Ok(Vec::new())
                })
            }),
        );
        let converter = DataConverter::new();
        let slots = ActivitySlots::default();
        let (_tx, rx) = watch::channel(None);
        let flushed: Arc<Mutex<Vec<Vec<Payload>>>> = Arc::new(Mutex::new(Vec::new()));
        let flushed2 = flushed.clone();
        let _completion = run_activity_task(
            vec![1],
            make_start("Heartbeats"),
            &registry,
            &converter,
            &slots,
            HeartbeatThrottlePolicy::default(),
            rx,
            move |details| flushed2.lock().unwrap().push(details),
        )
        .await
        .unwrap();
        // First heartbeat of a task always flushes immediately.
        assert_eq!(flushed.lock().unwrap().len(), 1);
    }
}
