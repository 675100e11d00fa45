//! Per-conversation message logs.
//!
//! One log per [`ConversationKey`], ordered by receipt. Logs are created
//! empty on first append or installed wholesale from a bulk history load;
//! after that, append is the only mutation. A log is discarded only when
//! its contact or group leaves the roster.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use parley_shared::{ConversationKey, Message};

/// Ordered message logs keyed by conversation.
#[derive(Debug, Default)]
pub struct ConversationStore {
    logs: HashMap<ConversationKey, Vec<Message>>,
    loaded: HashSet<ConversationKey>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to the end of the log for `key`, creating the log
    /// if absent. Appending does not count as a history load: a later
    /// [`install_history`](Self::install_history) still merges in front.
    pub fn append(&mut self, key: &ConversationKey, message: Message) {
        self.logs.entry(key.clone()).or_default().push(message);
    }

    /// Install the result of a bulk history load as the initial log.
    ///
    /// At most one install per key per session: returns `false` without
    /// touching anything if history was already installed. Messages that
    /// were appended while the load was in flight are kept after the
    /// historical prefix, deduplicated by server id.
    pub fn install_history(&mut self, key: &ConversationKey, history: Vec<Message>) -> bool {
        if self.loaded.contains(key) {
            return false;
        }

        let mut log = history;
        if let Some(tail) = self.logs.remove(key) {
            let known: HashSet<u64> = log.iter().filter_map(|m| m.id).collect();
            for message in tail {
                match message.id {
                    Some(id) if known.contains(&id) => continue,
                    _ => log.push(message),
                }
            }
        }

        debug!(key = %key, len = log.len(), "Installed conversation history");
        self.logs.insert(key.clone(), log);
        self.loaded.insert(key.clone());
        true
    }

    /// Whether a bulk history load has been installed for `key`.
    pub fn is_loaded(&self, key: &ConversationKey) -> bool {
        self.loaded.contains(key)
    }

    /// The current log for `key`. Empty for keys that have never been
    /// loaded or appended to.
    pub fn get(&self, key: &ConversationKey) -> &[Message] {
        self.logs.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether the log for `key` already contains a message with the given
    /// server id. Used to absorb duplicate inbound deliveries.
    pub fn contains_id(&self, key: &ConversationKey, id: u64) -> bool {
        self.get(key).iter().any(|m| m.id == Some(id))
    }

    /// Drop the log for a conversation whose contact or group was removed.
    /// Returns `true` if a log existed.
    pub fn discard(&mut self, key: &ConversationKey) -> bool {
        self.loaded.remove(key);
        self.logs.remove(key).is_some()
    }

    pub fn len(&self, key: &ConversationKey) -> usize {
        self.get(key).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parley_shared::{GroupId, Username};

    fn direct_key(peer: &str) -> ConversationKey {
        ConversationKey::Direct(Username::new(peer))
    }

    fn msg(id: Option<u64>, from: &str, text: &str) -> Message {
        let mut m = Message::new(
            Username::new(from),
            Some(Username::new("me")),
            None,
            Some(text.to_string()),
            None,
            Utc::now(),
        )
        .unwrap();
        m.id = id;
        m
    }

    #[test]
    fn test_get_unknown_key_is_empty() {
        let store = ConversationStore::new();
        assert!(store.get(&direct_key("bob")).is_empty());
        assert!(!store.is_loaded(&direct_key("bob")));
    }

    #[test]
    fn test_install_history_only_once() {
        let mut store = ConversationStore::new();
        let key = direct_key("bob");

        assert!(store.install_history(&key, vec![msg(Some(1), "bob", "old")]));
        assert!(store.is_loaded(&key));
        assert_eq!(store.len(&key), 1);

        // Second load attempt is a no-op.
        assert!(!store.install_history(&key, vec![msg(Some(2), "bob", "other")]));
        assert_eq!(store.len(&key), 1);
    }

    #[test]
    fn test_append_during_load_is_kept_after_history() {
        let mut store = ConversationStore::new();
        let key = direct_key("bob");

        // A live message lands while the history request is in flight.
        store.append(&key, msg(Some(5), "bob", "live"));
        assert!(!store.is_loaded(&key));

        // The history response contains the same message plus older ones.
        store.install_history(
            &key,
            vec![msg(Some(1), "bob", "old"), msg(Some(5), "bob", "live")],
        );

        let log = store.get(&key);
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].id, Some(1));
        assert_eq!(log[1].id, Some(5));
    }

    #[test]
    fn test_append_order_is_receipt_order() {
        let mut store = ConversationStore::new();
        let key = ConversationKey::Group(GroupId(7));

        store.append(&key, msg(Some(2), "bob", "second by timestamp"));
        store.append(&key, msg(Some(1), "carol", "first by timestamp"));

        let log = store.get(&key);
        assert_eq!(log[0].id, Some(2));
        assert_eq!(log[1].id, Some(1));
    }

    #[test]
    fn test_discard_forgets_load_state() {
        let mut store = ConversationStore::new();
        let key = direct_key("bob");

        store.install_history(&key, vec![msg(Some(1), "bob", "old")]);
        assert!(store.discard(&key));
        assert!(store.get(&key).is_empty());

        // After a discard the conversation may be loaded afresh.
        assert!(store.install_history(&key, vec![]));
        assert!(store.is_loaded(&key));
    }

    #[test]
    fn test_contains_id() {
        let mut store = ConversationStore::new();
        let key = direct_key("bob");
        store.append(&key, msg(Some(42), "me", "hi"));

        assert!(store.contains_id(&key, 42));
        assert!(!store.contains_id(&key, 43));
    }
}
