use thiserror::Error;

use crate::api::ApiError;
use parley_net::NetError;
use parley_shared::ProtocolError;

/// Errors surfaced by the client session API.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Transport error: {0}")]
    Net(#[from] NetError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The engine task has ended; commands can no longer be delivered.
    #[error("Client session has terminated")]
    SessionClosed,
}
