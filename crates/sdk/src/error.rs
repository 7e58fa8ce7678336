//! Top-level errors surfaced while connecting a client or bootstrapping a
//! worker, over and above what `client`/`worker` already define.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("could not connect to server target: {0}")]
    Connect(#[from] tonic::transport::Error),

    #[error(transparent)]
    Client(#[from] temporal_client::ClientError),
}
