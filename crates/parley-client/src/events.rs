//! Typed events crossing the engine → presentation boundary.

use parley_shared::{ConversationKey, Group, GroupId, Message, Username};

/// Why an outbound send did not go through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendFailure {
    /// No live push channel; nothing was submitted.
    Connectivity,
    /// The request was submitted and refused; `message` carries the
    /// server-provided text when there is one.
    Rejected { message: String },
}

/// Events emitted by the engine for the view layer to consume.
///
/// The engine guarantees that a `LiveMessage` is only ever emitted for the
/// currently selected conversation, and that `ConversationClosed` for a
/// removed conversation precedes any roster event about the removal.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// Initial roster loaded (or reloaded after a reconnect).
    Ready {
        contacts: Vec<Username>,
        groups: Vec<Group>,
    },

    /// Push channel came up or went down.
    ConnectionChanged { connected: bool },

    /// The selected conversation's log, served on selection once history
    /// is available.
    ConversationLoaded {
        key: ConversationKey,
        messages: Vec<Message>,
    },

    /// A message for the currently selected conversation.
    LiveMessage {
        key: ConversationKey,
        message: Message,
    },

    /// The selected conversation ceased to exist; the view must fall back
    /// to its "no conversation" state.
    ConversationClosed { key: ConversationKey },

    ContactAdded { contact: Username },
    ContactRemoved { contact: Username },

    /// Joined a group — either this user created it or was added to it.
    GroupJoined { group: Group, created_by_me: bool },

    /// No longer a member of the group.
    GroupLeft { group_id: GroupId, name: String },

    /// An outbound send failed; the conversation store was not touched.
    SendFailed {
        key: ConversationKey,
        reason: SendFailure,
    },

    /// A roster or history request failed.
    ActionFailed {
        action: &'static str,
        message: String,
    },

    /// Text pushed on the per-user error queue.
    ServerError { text: String },

    /// Result of the newest user search; stale generations never surface.
    SearchResults {
        query: String,
        users: Vec<Username>,
    },
}
