use serde::{Deserialize, Serialize};

/// Stable user identifier. Usernames are unique and never change for the
/// lifetime of an account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Username(pub String);

impl Username {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Username {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Username {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Server-assigned numeric group identifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub u64);

impl GroupId {
    /// Broadcast topic delivering to all current members of the group,
    /// including the sender.
    pub fn to_topic(&self) -> String {
        format!("/topic/group.{}", self.0)
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque reference to a stored attachment (e.g. an uploaded image).
/// The engine only carries it; fetching and rendering live elsewhere.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AttachmentRef(pub u64);

/// Key of a conversation log: either a direct chat with a peer or a group
/// chat. Used to index the conversation store and to derive topic names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ConversationKey {
    Direct(Username),
    Group(GroupId),
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationKey::Direct(user) => write!(f, "direct:{user}"),
            ConversationKey::Group(id) => write!(f, "group:{}", id.0),
        }
    }
}

/// A group chat roster entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub owner_username: Username,
}

impl Group {
    pub fn key(&self) -> ConversationKey {
        ConversationKey::Group(self.id)
    }
}
