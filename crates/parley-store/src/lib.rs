//! # parley-store
//!
//! In-memory session state for the synchronization engine: the
//! conversation store (per-key ordered message logs with install-once
//! bulk history load) and the roster (contact set and group map with
//! idempotent mutation). Nothing here outlives the session — on the next
//! login, history is reloaded from the server.

pub mod conversations;
pub mod roster;

pub use conversations::ConversationStore;
pub use roster::Roster;
