// Push-channel transport layer: one session task per connection, driven by
// typed command/event channels.

pub mod link;
pub mod memory;
pub mod session;

mod error;

pub use error::NetError;
pub use link::{Frame, PushLink};
pub use memory::{MemoryBroker, MemoryLink};
pub use session::{
    spawn_session, SessionCommand, SessionConfig, SessionEvent, SessionHandle, SubscriptionHandle,
};
