//! Wire payloads exchanged with the chat server.
//!
//! Everything on the push channel and the REST API is JSON. Field names
//! follow the server's camelCase convention so payloads deserialize
//! directly off the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::{AttachmentRef, ConversationKey, GroupId, Username};

/// A chat message, as stored in conversation logs and carried on the wire.
///
/// Immutable once constructed. Either `content` or `attachment` is present
/// (possibly both); [`Message::new`] enforces this. Log order is receipt
/// order, not timestamp order — server clocks may be skewed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Server-assigned id. `None` only for payloads this client is about
    /// to submit; every stored message carries the canonical id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub sender: Username,
    /// Direct messages carry the recipient; group messages carry `group_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<Username>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentRef>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(
        sender: Username,
        recipient: Option<Username>,
        group_id: Option<GroupId>,
        content: Option<String>,
        attachment: Option<AttachmentRef>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ProtocolError> {
        let has_content = content.as_deref().is_some_and(|c| !c.trim().is_empty());
        if !has_content && attachment.is_none() {
            return Err(ProtocolError::EmptyMessage);
        }
        Ok(Self {
            id: None,
            sender,
            recipient,
            group_id,
            content,
            attachment,
            timestamp,
        })
    }

    /// The conversation log this message belongs to, from the point of
    /// view of `own_user`: group messages key on the group, direct
    /// messages key on the *other* party. Returns `None` for malformed
    /// payloads that name neither a group nor a recipient.
    pub fn conversation_key(&self, own_user: &Username) -> Option<ConversationKey> {
        if let Some(group_id) = self.group_id {
            return Some(ConversationKey::Group(group_id));
        }
        let recipient = self.recipient.as_ref()?;
        let peer = if &self.sender == own_user {
            recipient.clone()
        } else {
            self.sender.clone()
        };
        Some(ConversationKey::Direct(peer))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Roster change notifications pushed on the per-user notification queue.
///
/// The `type` discriminator and field names match the server's DTO, so a
/// raw queue payload deserializes directly into this enum.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Notification {
    #[serde(rename = "CONTACT_ADDED")]
    ContactAdded {
        #[serde(rename = "contactUsername")]
        contact: Username,
    },

    #[serde(rename = "CONTACT_REMOVED")]
    ContactRemoved {
        #[serde(rename = "contactUsername")]
        contact: Username,
    },

    /// Sent both to the creator of a group and to every member added to
    /// one; the receiver distinguishes the two by comparing `owner` to its
    /// own username.
    #[serde(rename = "GROUP_CREATED")]
    GroupCreated {
        #[serde(rename = "groupId")]
        group_id: GroupId,
        #[serde(rename = "groupName")]
        group_name: String,
        #[serde(rename = "ownerUsername")]
        owner: Username,
    },

    /// The receiving user was removed from (or left) the group.
    #[serde(rename = "GROUP_REMOVED")]
    GroupRemoved {
        #[serde(rename = "groupId")]
        group_id: GroupId,
        #[serde(rename = "groupName")]
        group_name: String,
        #[serde(rename = "ownerUsername")]
        owner: Username,
    },
}

impl Notification {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(data)?)
    }
}
