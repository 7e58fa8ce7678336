//! The Worker Supervisor: poll-dispatch loops and a
//! lifecycle state machine sitting on top of `sdk-core`'s engines and
//! `client`'s bridge RPC client.

pub mod activity_poll;
pub mod config;
pub mod error;
pub mod nexus_poll;
pub mod state;
pub mod supervisor;
pub mod workflow_poll;

pub use config::WorkerConfig;
pub use error::WorkerError;
pub use state::SupervisorState;
pub use supervisor::{Worker, WorkerHandle};
