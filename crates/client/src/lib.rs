//! Everything in the worker core that touches a socket: the Bridge RPC
//! Client, the Interceptor Chain, and the External
//! Client Façade. `sdk-core` stays pure; this crate is where a
//! `tonic::transport::Channel` actually gets dialed.

pub mod bridge;
pub mod call_options;
pub mod error;
pub mod facade;
pub mod interceptor;
pub mod metadata;
pub mod transport;

pub use bridge::BridgeClient;
pub use call_options::CallOptions;
pub use error::ClientError;
pub use facade::{
    ExternalClient, UntypedScheduleHandle, UntypedWorkflowHandle, UntypedWorkflowUpdateHandle,
    WorkflowStatus,
};
pub use interceptor::{Interceptor, InterceptorChain, NoopInterceptor, Operation, TracingInterceptor};
pub use metadata::ClientMetadata;
pub use transport::{RawCallback, Transport};
