use thiserror::Error;

/// Errors produced by the transport layer.
#[derive(Error, Debug)]
pub enum NetError {
    /// No live channel — the caller attempted an operation that requires
    /// an established connection.
    #[error("Not connected to the push channel")]
    NotConnected,

    /// The session task has terminated and no longer accepts commands.
    #[error("Transport session has terminated")]
    SessionClosed,

    /// The link refused a subscription.
    #[error("Subscription to {topic} failed")]
    SubscribeFailed { topic: String },

    /// Error reported by the underlying link implementation.
    #[error("Link error: {0}")]
    Link(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NetError>;
