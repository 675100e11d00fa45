//! Group subscription registry.
//!
//! Owns the subscription handle for every group broadcast topic the user
//! is currently joined to, and converges that set against the roster's
//! group ids. Reconcile is idempotent: a second call with the same desired
//! set performs no transport operations.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use parley_net::{NetError, SessionHandle, SubscriptionHandle};
use parley_shared::GroupId;

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    handles: HashMap<GroupId, SubscriptionHandle>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Converge live subscriptions onto `desired`: unsubscribe groups that
    /// left the roster, subscribe groups that joined it.
    ///
    /// A failed subscribe leaves that group out of the registry (so a
    /// later reconcile retries it) and is reported after the rest of the
    /// diff has been applied.
    pub async fn reconcile(
        &mut self,
        desired: &HashSet<GroupId>,
        session: &SessionHandle,
    ) -> Result<(), NetError> {
        let stale: Vec<GroupId> = self
            .handles
            .keys()
            .filter(|id| !desired.contains(id))
            .copied()
            .collect();
        for group_id in stale {
            if let Some(handle) = self.handles.remove(&group_id) {
                debug!(group = %group_id, "Unsubscribing from group topic");
                session.unsubscribe(handle).await?;
            }
        }

        let mut first_failure = None;
        for group_id in desired {
            if self.handles.contains_key(group_id) {
                continue;
            }
            match session.subscribe(&group_id.to_topic()).await {
                Ok(handle) => {
                    debug!(group = %group_id, "Subscribed to group topic");
                    self.handles.insert(*group_id, handle);
                }
                Err(e) => {
                    warn!(group = %group_id, error = %e, "Group subscribe failed");
                    first_failure.get_or_insert(e);
                }
            }
        }

        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Forget all handles without unsubscribing — used when the connection
    /// drops and every handle is already invalid.
    pub fn invalidate(&mut self) {
        if !self.handles.is_empty() {
            debug!(count = self.handles.len(), "Invalidating group subscriptions");
        }
        self.handles.clear();
    }

    pub fn is_subscribed(&self, group_id: GroupId) -> bool {
        self.handles.contains_key(&group_id)
    }

    pub fn group_ids(&self) -> HashSet<GroupId> {
        self.handles.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_net::{spawn_session, MemoryBroker, SessionConfig, SessionEvent};

    async fn session(broker: &MemoryBroker) -> SessionHandle {
        let (handle, mut events) = spawn_session(broker.link(), SessionConfig::default());
        assert_eq!(events.recv().await, Some(SessionEvent::Connected));
        // Keep frames flowing into the void for these tests.
        tokio::spawn(async move { while events.recv().await.is_some() {} });
        handle
    }

    fn ids(ids: &[u64]) -> HashSet<GroupId> {
        ids.iter().map(|id| GroupId(*id)).collect()
    }

    #[tokio::test]
    async fn test_reconcile_converges_to_desired_set() {
        let broker = MemoryBroker::new();
        let session = session(&broker).await;
        let mut registry = SubscriptionRegistry::new();

        registry.reconcile(&ids(&[1, 2]), &session).await.unwrap();
        assert_eq!(registry.group_ids(), ids(&[1, 2]));
        assert_eq!(broker.subscriber_count(&GroupId(1).to_topic()), 1);
        assert_eq!(broker.subscriber_count(&GroupId(2).to_topic()), 1);

        registry.reconcile(&ids(&[2, 3]), &session).await.unwrap();
        assert_eq!(registry.group_ids(), ids(&[2, 3]));
        assert_eq!(broker.subscriber_count(&GroupId(1).to_topic()), 0);
        assert_eq!(broker.subscriber_count(&GroupId(3).to_topic()), 1);
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let broker = MemoryBroker::new();
        let session = session(&broker).await;
        let mut registry = SubscriptionRegistry::new();

        registry.reconcile(&ids(&[1]), &session).await.unwrap();
        registry.reconcile(&ids(&[1]), &session).await.unwrap();

        // A second reconcile with the same set must not stack a second
        // subscription on the broker.
        assert_eq!(broker.subscriber_count(&GroupId(1).to_topic()), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_to_empty_unsubscribes_all() {
        let broker = MemoryBroker::new();
        let session = session(&broker).await;
        let mut registry = SubscriptionRegistry::new();

        registry.reconcile(&ids(&[1, 2]), &session).await.unwrap();
        registry.reconcile(&ids(&[]), &session).await.unwrap();

        assert!(registry.is_empty());
        assert_eq!(broker.subscriber_count(&GroupId(1).to_topic()), 0);
        assert_eq!(broker.subscriber_count(&GroupId(2).to_topic()), 0);
    }

    #[tokio::test]
    async fn test_invalidate_allows_resubscribe() {
        let broker = MemoryBroker::new();
        let session = session(&broker).await;
        let mut registry = SubscriptionRegistry::new();

        registry.reconcile(&ids(&[1]), &session).await.unwrap();
        registry.invalidate();
        assert!(registry.is_empty());

        registry.reconcile(&ids(&[1]), &session).await.unwrap();
        assert!(registry.is_subscribed(GroupId(1)));
    }
}
