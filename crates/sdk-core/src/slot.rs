//! Slot reservations: three disjoint pools {workflow, activity,
//! local_activity}. A slot is acquired before issuing a poll and released
//! on task completion or poll timeout.
//!
//! Acquisition and release can race across tasks but must never
//! over-issue permits beyond the configured pool size — `tokio::sync::
//! Semaphore` is exactly that guarantee, so the manager is a thin
//! wrapper rather than a hand-rolled counter.

use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Which of the three disjoint pools a slot comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Workflow,
    Activity,
    LocalActivity,
}

/// A reservation token; the slot is released when this is dropped.
pub struct SlotPermit {
    kind: SlotKind,
    _permit: OwnedSemaphorePermit,
}

impl SlotPermit {
    pub fn kind(&self) -> SlotKind {
        self.kind
    }
}

/// Owns the three disjoint slot pools for one worker.
pub struct SlotManager {
    workflow: Arc<Semaphore>,
    activity: Arc<Semaphore>,
    local_activity: Arc<Semaphore>,
}

/// Poller Behavior for one poll family: either a fixed
/// in-flight cap, or an autoscaling range driven by server feedback.
#[derive(Debug, Clone, Copy)]
pub enum PollerBehavior {
    SimpleMaximum(usize),
    Autoscaling {
        min: usize,
        max: usize,
        initial: usize,
    },
}

impl SlotManager {
    pub fn new(workflow_slots: usize, activity_slots: usize, local_activity_slots: usize) -> Self {
        SlotManager {
            workflow: Arc::new(Semaphore::new(workflow_slots)),
            activity: Arc::new(Semaphore::new(activity_slots)),
            local_activity: Arc::new(Semaphore::new(local_activity_slots)),
        }
    }

    fn pool(&self, kind: SlotKind) -> &Arc<Semaphore> {
        match kind {
            SlotKind::Workflow => &self.workflow,
            SlotKind::Activity => &self.activity,
            SlotKind::LocalActivity => &self.local_activity,
        }
    }

    pub fn available(&self, kind: SlotKind) -> usize {
        self.pool(kind).available_permits()
    }

    /// Acquires one slot from `kind`'s pool, suspending until one is free:
    /// poll calls suspend pending slot availability.
    pub async fn acquire(&self, kind: SlotKind) -> Result<SlotPermit, AcquireError> {
        let permit = self.pool(kind).clone().acquire_owned().await?;
        Ok(SlotPermit {
            kind,
            _permit: permit,
        })
    }

    /// Non-suspending variant used by poll loops that want to check
    /// availability before committing to a long poll.
    pub fn try_acquire(&self, kind: SlotKind) -> Option<SlotPermit> {
        self.pool(kind)
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| SlotPermit {
                kind,
                _permit: permit,
            })
    }
}

/// `simple_maximum` requires n ≥ 2 for workflow tasks, n ≥ 1 for
/// activity/nexus tasks; activity concurrency defaults to 100.
impl Default for SlotManager {
    fn default() -> Self {
        SlotManager::new(2, 100, 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_blocks_when_pool_is_exhausted() {
        let manager = SlotManager::new(1, 1, 1);
        let first = manager.acquire(SlotKind::Activity).await.unwrap();
        assert!(manager.try_acquire(SlotKind::Activity).is_none());
        drop(first);
        assert!(manager.try_acquire(SlotKind::Activity).is_some());
    }

    #[tokio::test]
    async fn pools_are_disjoint() {
        let manager = SlotManager::new(1, 1, 1);
        let _workflow_slot = manager.acquire(SlotKind::Workflow).await.unwrap();
        // Exhausting the workflow pool must not affect the activity pool.
        assert!(manager.try_acquire(SlotKind::Activity).is_some());
    }

    #[test]
    fn available_reports_pool_size_before_use() {
        let manager = SlotManager::new(2, 5, 7);
        assert_eq!(manager.available(SlotKind::Workflow), 2);
        assert_eq!(manager.available(SlotKind::Activity), 5);
        assert_eq!(manager.available(SlotKind::LocalActivity), 7);
    }
}
