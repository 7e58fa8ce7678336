//! The bridge's two transports: a real gRPC channel, or a
//! host-supplied callback that services outbound RPCs itself. "The
//! specification treats this as an alternative transport and does not
//! change contracts" — both are driven through the same
//! [`crate::bridge::BridgeClient::call`].

use async_trait::async_trait;
use tonic::transport::Channel;
use tonic::Status;
use temporal_core_protos::WorkflowServiceClient;

/// A host-supplied function that services one outbound RPC, identified
/// by its protobuf method name, with the request/response already
/// serialized. Used when a lower-level core routes calls through the
/// embedding application's own gRPC stack instead of dialing directly.
#[async_trait]
pub trait RawCallback: Send + Sync {
    async fn call(&self, method: &'static str, request: Vec<u8>) -> Result<Vec<u8>, Status>;
}

pub enum Transport {
    Grpc(WorkflowServiceClient<Channel>),
    Callback(std::sync::Arc<dyn RawCallback>),
}

impl Transport {
    pub async fn connect(target: tonic::transport::Endpoint) -> Result<Self, tonic::transport::Error> {
        let channel = target.connect().await?;
        Ok(Transport::Grpc(WorkflowServiceClient::new(channel)))
    }

    pub fn callback(callback: std::sync::Arc<dyn RawCallback>) -> Self {
        Transport::Callback(callback)
    }
}
