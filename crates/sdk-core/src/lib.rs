//! The deterministic core of a Temporal worker: turns server-delivered
//! workflow activations into commands and activity tasks into
//! completions, with no network code of its own.
//!
//! - [`payload`] / [`failure`] — the data converter and error taxonomy.
//! - [`command`] / [`activation`] — the typed shapes that travel between
//!   this crate and the wire.
//! - [`workflow`] — the deterministic interpreter.
//! - [`engine`] — the sticky workflow cache and activation router.
//! - [`activity`] — the activity execution context and engine.
//! - [`slot`] — the three disjoint slot pools worker poll loops acquire
//!   from.

pub mod activation;
pub mod activity;
pub mod command;
pub mod engine;
pub mod error;
pub mod failure;
pub mod payload;
pub mod registry;
pub mod slot;
pub mod workflow;

pub use activation::{Activation, ActivationJob, CompletionBuilder};
pub use command::WorkflowCommand;
pub use engine::{RoutedCompletion, WorkflowEngine};
pub use error::{ActivityEngineError, WorkflowEngineError};
pub use failure::{FailureKind, TemporalFailure};
pub use payload::{DataConverter, Json, PayloadConvertible, ProtoJson};
pub use registry::{ActivityFn, Registry, WorkflowFn};
pub use slot::{PollerBehavior, SlotKind, SlotManager};
