//! Typed client configuration and connection bootstrap, in the same
//! `with_*` builder style as `WorkerConfig`'s tuning methods.

use std::sync::Arc;

use temporal_client::{BridgeClient, ClientMetadata, ExternalClient, InterceptorChain, Transport};
use temporal_sdk_core::payload::DataConverter;

use crate::error::SdkError;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub target_url: String,
    pub namespace: String,
    pub identity: String,
    pub client_name: String,
    pub client_version: String,
    pub api_key: Option<String>,
}

impl ClientConfig {
    pub fn new(target_url: impl Into<String>, namespace: impl Into<String>) -> Self {
        ClientConfig {
            target_url: target_url.into(),
            namespace: namespace.into(),
            identity: format!("client-{}", uuid::Uuid::new_v4()),
            client_name: "temporal-worker-core".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            api_key: None,
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Dials the target and returns a ready-to-use façade, wired with the
    /// default (tracing-only) interceptor chain.
    pub async fn connect(&self) -> Result<ExternalClient, SdkError> {
        self.connect_with_interceptors(InterceptorChain::default_chain()).await
    }

    /// Dials the target and returns the bare bridge client a
    /// [`crate::builder::WorkerBuilder`] polls with — workers talk to the
    /// wire directly rather than through the façade's interceptor chain,
    /// which wraps client-initiated operations, not poll-loop traffic.
    pub async fn connect_bridge(&self) -> Result<Arc<BridgeClient>, SdkError> {
        let endpoint = tonic::transport::Endpoint::from_shared(self.target_url.clone())?;
        let transport = Transport::connect(endpoint).await?;
        let mut metadata = ClientMetadata::new(self.client_name.clone(), self.client_version.clone());
        if let Some(api_key) = &self.api_key {
            metadata = metadata.with_api_key(api_key.clone());
        }
        Ok(Arc::new(BridgeClient::new(transport, metadata)))
    }

    pub async fn connect_with_interceptors(
        &self,
        interceptors: InterceptorChain,
    ) -> Result<ExternalClient, SdkError> {
        let endpoint = tonic::transport::Endpoint::from_shared(self.target_url.clone())?;
        let transport = Transport::connect(endpoint).await?;
        let mut metadata = ClientMetadata::new(self.client_name.clone(), self.client_version.clone());
        if let Some(api_key) = &self.api_key {
            metadata = metadata.with_api_key(api_key.clone());
        }
        let bridge = Arc::new(BridgeClient::new(transport, metadata));
        Ok(ExternalClient::new(
            bridge,
            interceptors,
            DataConverter::new(),
            self.namespace.clone(),
            self.identity.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_methods_set_identity_and_api_key() {
        let config = ClientConfig::new("http://localhost:7233", "default")
            .with_identity("fixed-identity")
            .with_api_key("secret");
        assert_eq!(config.identity, "fixed-identity");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.namespace, "default");
    }
}
