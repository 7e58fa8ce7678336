//! Worker tuning surface.

use std::time::Duration;

use temporal_sdk_core::activity::engine::HeartbeatThrottlePolicy;
use temporal_sdk_core::slot::PollerBehavior;

/// Everything a [`crate::supervisor::Worker`] needs to know before it
/// starts polling: which queue, which namespace, and the per-run tuning
/// fields.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub namespace: String,
    pub task_queue: String,
    pub identity: String,

    pub max_cached_workflows: usize,
    pub nonsticky_to_sticky_poll_ratio: f32,
    pub sticky_queue_schedule_to_start_timeout: Duration,

    pub max_concurrent_activities: usize,
    pub max_concurrent_local_activities: usize,
    pub max_concurrent_workflow_tasks: usize,

    pub default_heartbeat_throttle_interval: Duration,
    pub max_heartbeat_throttle_interval: Duration,

    pub graceful_shutdown_period: Duration,

    pub workflow_poller_behavior: PollerBehavior,
    pub activity_poller_behavior: PollerBehavior,
    pub nexus_poller_behavior: PollerBehavior,
}

impl WorkerConfig {
    pub fn new(namespace: impl Into<String>, task_queue: impl Into<String>) -> Self {
        WorkerConfig {
            namespace: namespace.into(),
            task_queue: task_queue.into(),
            identity: format!("worker-{}", uuid::Uuid::new_v4()),
            max_cached_workflows: 1000,
            nonsticky_to_sticky_poll_ratio: 0.2,
            sticky_queue_schedule_to_start_timeout: Duration::from_secs(10),
            max_concurrent_activities: 100,
            max_concurrent_local_activities: 100,
            max_concurrent_workflow_tasks: 100,
            default_heartbeat_throttle_interval: Duration::from_secs(30),
            max_heartbeat_throttle_interval: Duration::from_secs(60),
            graceful_shutdown_period: Duration::ZERO,
            workflow_poller_behavior: PollerBehavior::SimpleMaximum(5),
            activity_poller_behavior: PollerBehavior::SimpleMaximum(5),
            nexus_poller_behavior: PollerBehavior::SimpleMaximum(5),
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn with_max_cached_workflows(mut self, max: usize) -> Self {
        self.max_cached_workflows = max;
        self
    }

    pub fn with_max_concurrent_activities(mut self, max: usize) -> Self {
        self.max_concurrent_activities = max;
        self
    }

    pub fn with_max_concurrent_local_activities(mut self, max: usize) -> Self {
        self.max_concurrent_local_activities = max;
        self
    }

    pub fn with_graceful_shutdown_period(mut self, period: Duration) -> Self {
        self.graceful_shutdown_period = period;
        self
    }

    pub fn with_sticky_queue_schedule_to_start_timeout(mut self, timeout: Duration) -> Self {
        self.sticky_queue_schedule_to_start_timeout = timeout;
        self
    }

    pub fn with_nonsticky_to_sticky_poll_ratio(mut self, ratio: f32) -> Self {
        self.nonsticky_to_sticky_poll_ratio = ratio;
        self
    }

    pub fn with_workflow_poller_behavior(mut self, behavior: PollerBehavior) -> Self {
        self.workflow_poller_behavior = behavior;
        self
    }

    pub fn with_activity_poller_behavior(mut self, behavior: PollerBehavior) -> Self {
        self.activity_poller_behavior = behavior;
        self
    }

    pub fn heartbeat_throttle_policy(&self) -> HeartbeatThrottlePolicy {
        HeartbeatThrottlePolicy {
            default_interval: self.default_heartbeat_throttle_interval,
            max_interval: self.max_heartbeat_throttle_interval,
        }
    }

    /// How many of every five polls (approximately) should target the
    /// shared non-sticky queue rather than this worker's sticky queue,
    /// per the configured ratio.
    pub fn poll_is_sticky(&self, poll_count: u64) -> bool {
        if self.nonsticky_to_sticky_poll_ratio <= 0.0 {
            return true;
        }
        let period = (1.0 / self.nonsticky_to_sticky_poll_ratio).round().max(1.0) as u64;
        poll_count % period != 0
    }
}
