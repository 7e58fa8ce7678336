//! The third long-poll task family, alongside workflow tasks and activity
//! tasks, reduced to a no-op. This workspace's proto subset carries no
//! Nexus RPCs at all (see `supervisor`'s module doc comment), so there is
//! nothing to long-poll — this loop exists only so a [`crate::Worker`]
//! truly starts three task families, not two, and participates in the
//! same shutdown signal the other two do.

use tokio::sync::watch;
use tracing::debug;

use crate::state::SupervisorState;

pub async fn run(mut shutdown: watch::Receiver<SupervisorState>) {
    debug!("nexus poll family disabled: no Nexus surface in this workspace's proto subset");
    let _ = shutdown
        .wait_for(|state| *state == SupervisorState::Terminated)
        .await;
}
