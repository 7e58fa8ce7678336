//! The context handed to a running activity handler: static task info,
//! heartbeating, and cooperative cancellation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use temporal_core_protos::Payload;

use crate::failure::TemporalFailure;
use crate::payload::{DataConverter, EncodingError, PayloadConvertible};

/// Why the server asked this activity to stop, mirroring the wire
/// `ActivityCancelReason` oneof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityCancelReason {
    ServerRequested,
    Timeout,
    WorkerShutdown,
    HeartbeatRecordFailure,
    Paused,
}

/// The static, immutable facts about one activity invocation.
#[derive(Debug, Clone)]
pub struct ActivityInfo {
    pub task_token: Vec<u8>,
    pub workflow_id: String,
    pub run_id: String,
    pub activity_id: String,
    pub activity_type: String,
    pub attempt: u32,
    pub is_local: bool,
    pub schedule_to_close_timeout: Option<Duration>,
    pub start_to_close_timeout: Option<Duration>,
    pub schedule_to_start_timeout: Option<Duration>,
    pub heartbeat_timeout: Option<Duration>,
    pub scheduled_time: DateTime<Utc>,
    pub started_time: DateTime<Utc>,
    pub current_attempt_scheduled_time: DateTime<Utc>,
    pub last_heartbeat_details: Vec<Payload>,
}

/// Live handle passed to the activity handler. Cheap to clone; all clones
/// share the same heartbeat channel and cancellation flag.
#[derive(Clone)]
pub struct ActivityExecutionContext {
    info: Arc<ActivityInfo>,
    converter: DataConverter,
    heartbeat_tx: tokio::sync::mpsc::UnboundedSender<Vec<Payload>>,
    cancel_rx: watch::Receiver<Option<ActivityCancelReason>>,
}

impl ActivityExecutionContext {
    pub(crate) fn new(
        info: ActivityInfo,
        converter: DataConverter,
        heartbeat_tx: tokio::sync::mpsc::UnboundedSender<Vec<Payload>>,
        cancel_rx: watch::Receiver<Option<ActivityCancelReason>>,
    ) -> Self {
        ActivityExecutionContext {
            info: Arc::new(info),
            converter,
            heartbeat_tx,
            cancel_rx,
        }
    }

    pub fn info(&self) -> &ActivityInfo {
        &self.info
    }

    pub fn task_token(&self) -> &[u8] {
        &self.info.task_token
    }

    pub fn activity_id(&self) -> &str {
        &self.info.activity_id
    }

    pub fn workflow_id(&self) -> &str {
        &self.info.workflow_id
    }

    pub fn run_id(&self) -> &str {
        &self.info.run_id
    }

    pub fn attempt(&self) -> u32 {
        self.info.attempt
    }

    pub fn is_local(&self) -> bool {
        self.info.is_local
    }

    /// `true` once the server has asked this task to stop; see
    /// [`Self::cancel_reason`] for why.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_rx.borrow().is_some()
    }

    pub fn cancel_reason(&self) -> Option<ActivityCancelReason> {
        *self.cancel_rx.borrow()
    }

    /// Resolves once cancellation has been requested. Intended for use in
    /// `tokio::select!` alongside the handler's own work.
    pub async fn cancelled(&self) -> ActivityCancelReason {
        let mut rx = self.cancel_rx.clone();
        loop {
            if let Some(reason) = *rx.borrow() {
                return reason;
            }
            if rx.changed().await.is_err() {
                return ActivityCancelReason::WorkerShutdown;
            }
        }
    }

    /// Records a heartbeat. Heartbeats are coalesced/throttled by the
    /// engine, not here; this just hands the latest details to that
    /// pipeline — the latest buffered details win.
    pub fn heartbeat<T: PayloadConvertible>(&self, details: &[T]) -> Result<(), TemporalFailure> {
        let payloads = details
            .iter()
            .map(|d| self.converter.convert_value(d))
            .collect::<Result<Vec<_>, EncodingError>>()
            .map_err(|e| TemporalFailure::application(e.to_string(), "EncodingError"))?;
        let _ = self.heartbeat_tx.send(payloads);
        Ok(())
    }
}

impl ActivityInfo {
    pub fn is_last_attempt(&self, max_attempts: u32) -> bool {
        max_attempts != 0 && self.attempt >= max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> ActivityInfo {
        ActivityInfo {
            task_token: vec![1, 2, 3],
            workflow_id: "wf-1".into(),
            run_id: "run-1".into(),
            activity_id: "act-1".into(),
            activity_type: "DoThing".into(),
            attempt: 1,
            is_local: false,
            schedule_to_close_timeout: None,
            start_to_close_timeout: Some(Duration::from_secs(30)),
            schedule_to_start_timeout: None,
            heartbeat_timeout: None,
            scheduled_time: Utc::now(),
            started_time: Utc::now(),
            current_attempt_scheduled_time: Utc::now(),
            last_heartbeat_details: Vec::new(),
        }
    }

    fn context() -> (
        ActivityExecutionContext,
        watch::Sender<Option<ActivityCancelReason>>,
        tokio::sync::mpsc::UnboundedReceiver<Vec<Payload>>,
    ) {
        let (tx, rx) = watch::channel(None);
        let (hb_tx, hb_rx) = tokio::sync::mpsc::unbounded_channel();
        let ctx = ActivityExecutionContext::new(info(), DataConverter::new(), hb_tx, rx);
        (ctx, tx, hb_rx)
    }

    #[test]
    fn not_cancelled_initially() {
        let (ctx, _tx, _hb) = context();
        assert!(!ctx.is_cancelled());
        assert_eq!(ctx.cancel_reason(), None);
    }

    #[test]
    fn cancellation_is_observed() {
        let (ctx, tx, _hb) = context();
        tx.send(Some(ActivityCancelReason::ServerRequested)).unwrap();
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.cancel_reason(), Some(ActivityCancelReason::ServerRequested));
    }

    #[tokio::test]
    async fn cancelled_future_resolves_after_signal() {
        let (ctx, tx, _hb) = context();
        let waiter = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.cancelled().await }
        });
        tx.send(Some(ActivityCancelReason::Timeout)).unwrap();
        assert_eq!(waiter.await.unwrap(), ActivityCancelReason::Timeout);
    }

    #[test]
    fn heartbeat_forwards_converted_payloads() {
        let (ctx, _tx, mut hb_rx) = context();
        ctx.heartbeat(&[crate::payload::Json(42)]).unwrap();
        let payloads = hb_rx.try_recv().unwrap();
        assert_eq!(payloads.len(), 1);
    }

    #[test]
    fn is_last_attempt() {
        let mut i = info();
        i.attempt = 3;
        assert!(i.is_last_attempt(3));
        i.attempt = 2;
        assert!(!i.is_last_attempt(3));
    }
}
