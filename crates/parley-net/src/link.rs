//! The seam between the session task and the actual wire protocol.
//!
//! Parley does not implement a wire protocol; it assumes a collaborator
//! that provides reliable, per-subscription-ordered delivery once
//! connected. [`PushLink`] is that collaborator's contract. The in-process
//! implementation lives in [`crate::memory`]; a production build plugs in
//! whatever the deployment speaks.

use std::future::Future;

use crate::error::Result;

/// A raw payload delivered on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// One push-channel connection.
///
/// Methods return `impl Future + Send` rather than using `async fn` so the
/// session task that drives a link stays spawnable.
pub trait PushLink: Send + 'static {
    /// Establish the channel. Must be idempotent while already connected.
    fn connect(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Tear the channel down. After this, [`recv`](Self::recv) yields `None`.
    fn disconnect(&mut self) -> impl Future<Output = ()> + Send;

    /// Start receiving frames published to `topic`.
    fn subscribe(&mut self, topic: &str) -> impl Future<Output = Result<()>> + Send;

    /// Stop receiving frames for `topic`.
    fn unsubscribe(&mut self, topic: &str) -> impl Future<Output = Result<()>> + Send;

    /// Fire-and-forget publish to a destination. Delivery confirmation, if
    /// any, arrives through a subscription.
    fn send(&mut self, destination: &str, payload: Vec<u8>) -> impl Future<Output = Result<()>> + Send;

    /// Next inbound frame, in delivery order across all subscriptions.
    /// `None` means the connection is gone. Must be cancellation-safe:
    /// the session task polls it concurrently with its command channel.
    fn recv(&mut self) -> impl Future<Output = Option<Frame>> + Send;
}
