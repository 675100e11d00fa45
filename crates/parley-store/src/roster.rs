//! Contact and group membership state.
//!
//! Mutators return whether anything actually changed, which is what makes
//! the notification reconciler idempotent under redelivery: applying the
//! same change twice reports `false` the second time and triggers no
//! follow-up work.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use parley_shared::{Group, GroupId, Username};

/// The user's contact list and group memberships.
#[derive(Debug, Default)]
pub struct Roster {
    contacts: HashSet<Username>,
    groups: HashMap<GroupId, Group>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all roster state with a freshly loaded snapshot. Used on
    /// login and after a reconnect.
    pub fn replace(&mut self, contacts: Vec<Username>, groups: Vec<Group>) {
        self.contacts = contacts.into_iter().collect();
        self.groups = groups.into_iter().map(|g| (g.id, g)).collect();
        debug!(
            contacts = self.contacts.len(),
            groups = self.groups.len(),
            "Roster replaced"
        );
    }

    /// Returns `true` if the contact was not already present.
    pub fn add_contact(&mut self, user: Username) -> bool {
        self.contacts.insert(user)
    }

    /// Returns `true` if the contact was present.
    pub fn remove_contact(&mut self, user: &Username) -> bool {
        self.contacts.remove(user)
    }

    pub fn contains_contact(&self, user: &Username) -> bool {
        self.contacts.contains(user)
    }

    /// Insert a group. Returns `false` without overwriting if the id is
    /// already known.
    pub fn add_group(&mut self, group: Group) -> bool {
        if self.groups.contains_key(&group.id) {
            return false;
        }
        self.groups.insert(group.id, group);
        true
    }

    /// Remove a group by id, returning it if it was present.
    pub fn remove_group(&mut self, id: GroupId) -> Option<Group> {
        self.groups.remove(&id)
    }

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(&id)
    }

    /// The current set of group ids — the desired state handed to the
    /// subscription registry.
    pub fn group_ids(&self) -> HashSet<GroupId> {
        self.groups.keys().copied().collect()
    }

    pub fn contacts(&self) -> Vec<Username> {
        self.contacts.iter().cloned().collect()
    }

    pub fn groups(&self) -> Vec<Group> {
        self.groups.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(id: u64, name: &str) -> Group {
        Group {
            id: GroupId(id),
            name: name.to_string(),
            owner_username: Username::new("owner"),
        }
    }

    #[test]
    fn test_contact_add_is_idempotent() {
        let mut roster = Roster::new();
        assert!(roster.add_contact(Username::new("alice")));
        assert!(!roster.add_contact(Username::new("alice")));
        assert_eq!(roster.contacts().len(), 1);
    }

    #[test]
    fn test_contact_remove_reports_change() {
        let mut roster = Roster::new();
        roster.add_contact(Username::new("alice"));
        assert!(roster.remove_contact(&Username::new("alice")));
        assert!(!roster.remove_contact(&Username::new("alice")));
    }

    #[test]
    fn test_group_add_does_not_overwrite() {
        let mut roster = Roster::new();
        assert!(roster.add_group(group(1, "ops")));
        assert!(!roster.add_group(group(1, "renamed")));
        assert_eq!(roster.group(GroupId(1)).unwrap().name, "ops");
    }

    #[test]
    fn test_replace_resets_state() {
        let mut roster = Roster::new();
        roster.add_contact(Username::new("stale"));
        roster.add_group(group(9, "stale"));

        roster.replace(vec![Username::new("alice")], vec![group(1, "ops")]);
        assert!(!roster.contains_contact(&Username::new("stale")));
        assert!(roster.group(GroupId(9)).is_none());
        assert_eq!(roster.group_ids(), [GroupId(1)].into_iter().collect());
    }
}
