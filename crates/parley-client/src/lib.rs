//! # parley-client
//!
//! The conversation synchronization engine. One [`ClientSession`] per
//! logged-in user owns the push-channel transport task and a single
//! ordered event loop that reconciles everything the server pushes —
//! direct messages, group broadcasts, roster change notifications —
//! against the local conversation store, the subscription registry and the
//! active selection, and surfaces the result to the presentation layer as
//! a typed [`UiEvent`] stream.

pub mod api;
pub mod engine;
pub mod events;
pub mod search;
pub mod selection;
pub mod session;
pub mod subscriptions;

mod error;

#[cfg(test)]
pub(crate) mod testutil;

pub use api::{ApiError, ChatApi, HttpApi};
pub use engine::EngineCommand;
pub use error::ClientError;
pub use events::{SendFailure, UiEvent};
pub use session::{ClientHandle, ClientSession};
