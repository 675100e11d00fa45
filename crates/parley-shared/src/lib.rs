//! # parley-shared
//!
//! Domain types and wire protocol shared by every Parley crate: user and
//! group identifiers, conversation keys, the message and notification
//! payloads carried over the push channel, and the destination naming
//! scheme those payloads travel on.

pub mod constants;
pub mod protocol;
pub mod topics;
pub mod types;

mod error;

pub use error::ProtocolError;
pub use protocol::{Message, Notification};
pub use types::{AttachmentRef, ConversationKey, Group, GroupId, Username};
