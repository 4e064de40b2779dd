//! Duplicate suppression for inbound peer notifications.

use std::collections::HashMap;

use uuid::Uuid;

use crate::models::SubscriptionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationFreshness {
    Fresh,
    Duplicate,
    /// Carries no subscription to order it by.
    Malformed,
}

/// Highest notification index seen per subscription.
#[derive(Debug, Default)]
pub struct NotificationLedger {
    last_seen: HashMap<Uuid, u64>,
}

impl NotificationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the subscriptions of one notification. It is fresh if any of
    /// them advances past the highest index already seen.
    pub fn observe(&mut self, subscriptions: &[SubscriptionState]) -> NotificationFreshness {
        if subscriptions.is_empty() {
            return NotificationFreshness::Malformed;
        }
        let mut fresh = false;
        for sub in subscriptions {
            let advanced = self
                .last_seen
                .get(&sub.subscription_id)
                .map_or(true, |&seen| sub.notification_index > seen);
            if advanced {
                self.last_seen
                    .insert(sub.subscription_id, sub.notification_index);
                fresh = true;
            }
        }
        if fresh {
            NotificationFreshness::Fresh
        } else {
            NotificationFreshness::Duplicate
        }
    }

    pub fn last_index(&self, subscription_id: &Uuid) -> Option<u64> {
        self.last_seen.get(subscription_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(id: Uuid, index: u64) -> SubscriptionState {
        SubscriptionState {
            subscription_id: id,
            notification_index: index,
        }
    }

    #[test]
    fn drops_repeated_and_out_of_order_indices() {
        let id = Uuid::new_v4();
        let mut ledger = NotificationLedger::new();
        assert_eq!(ledger.observe(&[sub(id, 3)]), NotificationFreshness::Fresh);
        assert_eq!(ledger.observe(&[sub(id, 3)]), NotificationFreshness::Duplicate);
        assert_eq!(ledger.observe(&[sub(id, 2)]), NotificationFreshness::Duplicate);
        assert_eq!(ledger.observe(&[sub(id, 4)]), NotificationFreshness::Fresh);
        assert_eq!(ledger.last_index(&id), Some(4));
    }

    #[test]
    fn subscriptions_are_tracked_independently() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut ledger = NotificationLedger::new();
        ledger.observe(&[sub(a, 5)]);
        assert_eq!(
            ledger.observe(&[sub(a, 5), sub(b, 1)]),
            NotificationFreshness::Fresh
        );
        assert_eq!(ledger.last_index(&a), Some(5));
    }

    #[test]
    fn empty_subscription_list_is_malformed() {
        let mut ledger = NotificationLedger::new();
        assert_eq!(ledger.observe(&[]), NotificationFreshness::Malformed);
        assert!(ledger.last_seen.is_empty());
    }
}
