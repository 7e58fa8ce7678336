//! # Temporal Worker Core SDK
//!
//! The user-facing surface over `sdk-core` (deterministic workflow/activity
//! execution), `client` (bridge RPC client, interceptors, external client
//! façade) and `worker` (poll-dispatch loops, lifecycle state machine).
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                        WorkerBuilder                       │
//! │   .register_workflow(...) / .register_activity(...)        │
//! └───────────────────────────────────────────────────────────┘
//!                              │ .build(config, client)
//!                              ▼
//! ┌───────────────────────────────────────────────────────────┐
//! │                    temporal_worker::Worker                 │
//! │   poll loops -> sdk_core::WorkflowEngine / run_activity_task│
//! └───────────────────────────────────────────────────────────┘
//!                              ▲
//!                              │ shares a BridgeClient
//! ┌───────────────────────────────────────────────────────────┐
//! │                 temporal_client::ExternalClient             │
//! │        start/signal/query/update/cancel/terminate            │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ```ignore
//! use temporal_sdk::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client_config = ClientConfig::new("http://localhost:7233", "default");
//!     let bridge = client_config.connect_bridge().await?;
//!
//!     let worker = WorkerBuilder::new()
//!         .register_workflow("Greet", |ctx, args| async move { Ok(args) })
//!         .register_activity("SayHello", |ctx, args| async move { Ok(args) })
//!         .build(WorkerConfig::new("default", "greetings"), bridge);
//!     let handle = worker.start();
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod client_config;
pub mod error;

pub use builder::WorkerBuilder;
pub use client_config::ClientConfig;
pub use error::SdkError;

/// Installs a `tracing` subscriber reading `RUST_LOG`, for a process's
/// binary edge. Library code never calls this itself — only a `main`
/// wiring up a worker process should.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

pub mod prelude {
    pub use crate::builder::WorkerBuilder;
    pub use crate::client_config::ClientConfig;
    pub use crate::error::SdkError;
    pub use temporal_client::{ExternalClient, Interceptor, InterceptorChain, WorkflowStatus};
    pub use temporal_sdk_core::failure::TemporalFailure;
    pub use temporal_sdk_core::payload::{DataConverter, Json, PayloadConvertible};
    pub use temporal_sdk_core::workflow::context::WfContext;
    pub use temporal_worker::{SupervisorState, Worker, WorkerConfig, WorkerHandle};
}
