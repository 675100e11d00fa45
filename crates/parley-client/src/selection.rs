//! Active-conversation tracking.
//!
//! At most one conversation is active at a time; selecting a new key
//! implicitly deselects the previous one. The controller is pure state —
//! the engine consults it to decide whether an arriving message goes to
//! the live view and clears it atomically with roster removals.

use parley_shared::ConversationKey;

#[derive(Debug, Default)]
pub struct SelectionController {
    active: Option<ConversationKey>,
}

impl SelectionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&ConversationKey> {
        self.active.as_ref()
    }

    /// Make `key` the active conversation (or none). Returns the
    /// previously active key if it differed.
    pub fn select(&mut self, key: Option<ConversationKey>) -> Option<ConversationKey> {
        if self.active == key {
            return None;
        }
        std::mem::replace(&mut self.active, key)
    }

    pub fn is_active(&self, key: &ConversationKey) -> bool {
        self.active.as_ref() == Some(key)
    }

    /// Clear the selection if `key` is active. Returns whether it was.
    pub fn clear_if(&mut self, key: &ConversationKey) -> bool {
        if self.is_active(key) {
            self.active = None;
            true
        } else {
            false
        }
    }
}
