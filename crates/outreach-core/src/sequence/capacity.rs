//! Round-robin account allocation over a cycle-local quota snapshot

use outreach_common::types::AccountId;
use outreach_storage::models::SendingAccount;

#[derive(Debug, Clone)]
struct Slot {
    account: SendingAccount,
    sent_today: i32,
}

impl Slot {
    fn has_capacity(&self) -> bool {
        self.sent_today < self.account.daily_limit
    }
}

/// Quota snapshot owned by one scheduling cycle
///
/// The Nth request starts at `eligible[N mod len]` and takes the first account
/// that still has quota in the snapshot.
#[derive(Debug, Clone)]
pub struct CapacityAllocator {
    slots: Vec<Slot>,
    requests: usize,
}

impl CapacityAllocator {
    /// Snapshot the eligible accounts; ineligible ones are dropped
    pub fn new(accounts: Vec<SendingAccount>) -> Self {
        let slots = accounts
            .into_iter()
            .filter(|a| a.can_send())
            .map(|account| Slot {
                sent_today: account.sent_today,
                account,
            })
            .collect();
        Self { slots, requests: 0 }
    }

    /// Pick an account for the next send, or `None` when every quota is spent
    pub fn allocate(&mut self) -> Option<SendingAccount> {
        if self.slots.is_empty() {
            return None;
        }
        let start = self.requests % self.slots.len();
        self.requests += 1;

        (0..self.slots.len())
            .map(|offset| &self.slots[(start + offset) % self.slots.len()])
            .find(|slot| slot.has_capacity())
            .map(|slot| {
                let mut account = slot.account.clone();
                account.sent_today = slot.sent_today;
                account
            })
    }

    /// Count a successful send against the snapshot
    pub fn record_send(&mut self, account_id: AccountId) {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.account.id == account_id) {
            slot.sent_today += 1;
        }
    }

    /// Align the snapshot with a persisted counter that moved underneath us
    pub fn exhaust(&mut self, account_id: AccountId) {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.account.id == account_id) {
            slot.sent_today = slot.account.daily_limit;
        }
    }

    /// Sends left across all accounts in the snapshot
    pub fn remaining(&self) -> i32 {
        self.slots
            .iter()
            .map(|s| (s.account.daily_limit - s.sent_today).max(0))
            .sum()
    }

    pub fn sent_today(&self, account_id: AccountId) -> Option<i32> {
        self.slots
            .iter()
            .find(|s| s.account.id == account_id)
            .map(|s| s.sent_today)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::account_row;
    use outreach_common::types::Channel;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_round_robin_by_request_order() {
        let a = account_row(Channel::Email, 10, 0);
        let b = account_row(Channel::Email, 10, 0);
        let c = account_row(Channel::Email, 10, 0);
        let mut allocator = CapacityAllocator::new(vec![a.clone(), b.clone(), c.clone()]);

        let picks: Vec<_> = (0..4).map(|_| allocator.allocate().unwrap().id).collect();
        assert_eq!(picks, vec![a.id, b.id, c.id, a.id]);
    }

    #[test]
    fn test_skips_exhausted_accounts() {
        let a = account_row(Channel::Email, 1, 0);
        let b = account_row(Channel::Email, 5, 0);
        let mut allocator = CapacityAllocator::new(vec![a.clone(), b.clone()]);

        let first = allocator.allocate().unwrap();
        assert_eq!(first.id, a.id);
        allocator.record_send(a.id);

        // Request 1 starts at b, request 2 would start at a but a is spent
        assert_eq!(allocator.allocate().unwrap().id, b.id);
        assert_eq!(allocator.allocate().unwrap().id, b.id);
    }

    #[test]
    fn test_no_capacity_when_limit_reached_at_cycle_start() {
        let full = account_row(Channel::Email, 5, 5);
        let mut allocator = CapacityAllocator::new(vec![full]);
        for _ in 0..10 {
            assert!(allocator.allocate().is_none());
        }
        assert_eq!(allocator.remaining(), 0);
    }

    #[test]
    fn test_sent_today_never_exceeds_limit() {
        let a = account_row(Channel::Email, 3, 1);
        let b = account_row(Channel::Email, 2, 0);
        let mut allocator = CapacityAllocator::new(vec![a.clone(), b.clone()]);

        let mut sends = 0;
        while let Some(account) = allocator.allocate() {
            allocator.record_send(account.id);
            sends += 1;
            assert!(allocator.sent_today(a.id).unwrap() <= a.daily_limit);
            assert!(allocator.sent_today(b.id).unwrap() <= b.daily_limit);
        }
        assert_eq!(sends, 4);
    }

    #[test]
    fn test_exhaust_removes_capacity() {
        let a = account_row(Channel::Email, 10, 0);
        let mut allocator = CapacityAllocator::new(vec![a.clone()]);
        allocator.exhaust(a.id);
        assert!(allocator.allocate().is_none());
    }
}
