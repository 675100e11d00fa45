//! Push-channel destination naming.
//!
//! Every user owns three private queues (inbound messages, roster
//! notifications, server errors); every group owns one broadcast topic.
//! The server addresses payloads by these names, so both sides must agree
//! on the scheme exactly.

use crate::types::{GroupId, Username};

const INBOX_PREFIX: &str = "/queue/messages-";
const NOTIFICATIONS_PREFIX: &str = "/queue/notifications-";
const ERRORS_PREFIX: &str = "/queue/errors-";
const GROUP_PREFIX: &str = "/topic/group.";

/// Per-user inbound message queue.
pub fn inbox(user: &Username) -> String {
    format!("{INBOX_PREFIX}{user}")
}

/// Per-user roster notification queue.
pub fn notifications(user: &Username) -> String {
    format!("{NOTIFICATIONS_PREFIX}{user}")
}

/// Per-user server error queue.
pub fn errors(user: &Username) -> String {
    format!("{ERRORS_PREFIX}{user}")
}

/// The class of destination a raw topic string names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicKind {
    Inbox(Username),
    Notifications(Username),
    Errors(Username),
    Group(GroupId),
}

/// Classify a topic string. Returns `None` for destinations outside the
/// Parley naming scheme (including group topics with a malformed id).
pub fn classify(topic: &str) -> Option<TopicKind> {
    if let Some(user) = topic.strip_prefix(INBOX_PREFIX) {
        return Some(TopicKind::Inbox(Username::new(user)));
    }
    if let Some(user) = topic.strip_prefix(NOTIFICATIONS_PREFIX) {
        return Some(TopicKind::Notifications(Username::new(user)));
    }
    if let Some(user) = topic.strip_prefix(ERRORS_PREFIX) {
        return Some(TopicKind::Errors(Username::new(user)));
    }
    if let Some(id) = topic.strip_prefix(GROUP_PREFIX) {
        return id.parse().ok().map(|n| TopicKind::Group(GroupId(n)));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_queues_roundtrip() {
        let user = Username::new("alice");
        assert_eq!(
            classify(&inbox(&user)),
            Some(TopicKind::Inbox(user.clone()))
        );
        assert_eq!(
            classify(&notifications(&user)),
            Some(TopicKind::Notifications(user.clone()))
        );
        assert_eq!(classify(&errors(&user)), Some(TopicKind::Errors(user)));
    }

    #[test]
    fn test_group_topic_roundtrip() {
        let topic = GroupId(7).to_topic();
        assert_eq!(topic, "/topic/group.7");
        assert_eq!(classify(&topic), Some(TopicKind::Group(GroupId(7))));
    }

    #[test]
    fn test_foreign_topics_rejected() {
        assert_eq!(classify("/topic/presence.7"), None);
        assert_eq!(classify("/topic/group.not-a-number"), None);
        assert_eq!(classify(""), None);
    }
}
