//! Optimistic mutation reconciler
//!
//! Tracks locally applied mutations that the server has not yet confirmed.
//! Each entry is keyed by `(call id, field)` and carries the desired value,
//! the pre-mutation value to revert to, a deadline, and the last server
//! sequence number observed when the mutation was issued.
//!
//! Reconciliation rules:
//!
//! - An authoritative event for the key with a sequence number newer than
//!   the issue-time sequence confirms the entry; the server value wins even
//!   when it differs from the optimistic guess.
//! - An authoritative event with an older sequence number is stale and must
//!   not overwrite the pending optimistic value (channel delivery order is
//!   not guaranteed).
//! - Two rapid toggles of the same field: the newer mutation supersedes the
//!   older, keeping the older entry's pre-mutation value as the revert
//!   target.
//! - Deadline expiry with no confirmation reverts the field.

use std::time::Duration;

use dashmap::DashMap;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::call::{CallId, MutationField};

/// A locally-issued mutation not yet confirmed by the backend
#[derive(Debug, Clone)]
pub struct PendingMutation {
    /// Value applied optimistically
    pub desired: bool,
    /// Last known authoritative value, restored on timeout
    pub prior: bool,
    /// When the mutation was issued
    pub issued_at: DateTime<Utc>,
    /// When the optimistic value expires unconfirmed
    pub deadline: Instant,
    /// Last server sequence number observed at issue time; only events
    /// sequenced after this can confirm the mutation
    pub issued_after_seq: u64,
}

/// Result of matching an authoritative event against the pending table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// Pending entry cleared; adopt the server value
    Applied(bool),
    /// Event is older than the pending mutation; ignore it
    Stale,
    /// Nothing pending for this key; the event applies directly
    Unmatched,
}

/// An entry reverted by the expiry sweep
#[derive(Debug, Clone)]
pub struct RevertedMutation {
    pub call_id: CallId,
    pub field: MutationField,
    /// The value the field must be restored to
    pub prior: bool,
}

/// Pending-mutation table with seq-based conflict resolution
pub struct Reconciler {
    pending: DashMap<(CallId, MutationField), PendingMutation>,
    timeout: Duration,
}

impl Reconciler {
    /// Create a reconciler with the given confirmation timeout
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            timeout,
        }
    }

    /// Record an optimistic mutation
    ///
    /// A newer mutation for the same key supersedes the older one but keeps
    /// the original pre-mutation value, so a timeout still reverts to the
    /// last authoritative state rather than an intermediate guess.
    pub fn record(
        &self,
        call_id: CallId,
        field: MutationField,
        desired: bool,
        prior: bool,
        issued_after_seq: u64,
    ) {
        let key = (call_id, field);
        let deadline = Instant::now() + self.timeout;
        match self.pending.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                let original_prior = entry.get().prior;
                entry.insert(PendingMutation {
                    desired,
                    prior: original_prior,
                    issued_at: Utc::now(),
                    deadline,
                    issued_after_seq,
                });
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(PendingMutation {
                    desired,
                    prior,
                    issued_at: Utc::now(),
                    deadline,
                    issued_after_seq,
                });
            }
        }
    }

    /// Match an authoritative event against the pending table
    pub fn confirm(
        &self,
        call_id: &CallId,
        field: MutationField,
        server_value: bool,
        server_seq: u64,
    ) -> ConfirmOutcome {
        let key = (call_id.clone(), field);
        let stale = match self.pending.get(&key) {
            Some(entry) => server_seq <= entry.issued_after_seq,
            None => return ConfirmOutcome::Unmatched,
        };

        if stale {
            ConfirmOutcome::Stale
        } else {
            self.pending.remove(&key);
            ConfirmOutcome::Applied(server_value)
        }
    }

    /// Remove and return every entry whose deadline has passed
    pub fn take_expired(&self, now: Instant) -> Vec<RevertedMutation> {
        let expired: Vec<(CallId, MutationField)> = self
            .pending
            .iter()
            .filter(|entry| entry.value().deadline <= now)
            .map(|entry| entry.key().clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|key| {
                self.pending.remove(&key).map(|(key, mutation)| RevertedMutation {
                    call_id: key.0,
                    field: key.1,
                    prior: mutation.prior,
                })
            })
            .collect()
    }

    /// Whether a mutation is pending for the given key
    pub fn is_pending(&self, call_id: &CallId, field: MutationField) -> bool {
        self.pending.contains_key(&(call_id.clone(), field))
    }

    /// Drop every pending mutation for one call (authoritative call end)
    pub fn clear_call(&self, call_id: &CallId) {
        self.pending.retain(|(id, _), _| id != call_id);
    }

    /// Drop everything (teardown)
    pub fn clear_all(&self) {
        self.pending.clear();
    }

    /// Number of pending mutations
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call() -> CallId {
        CallId::from("c1")
    }

    #[test]
    fn confirm_with_newer_seq_applies() {
        let reconciler = Reconciler::new(Duration::from_secs(5));
        reconciler.record(call(), MutationField::AudioMuted, true, false, 10);

        let outcome = reconciler.confirm(&call(), MutationField::AudioMuted, true, 11);
        assert_eq!(outcome, ConfirmOutcome::Applied(true));
        assert!(reconciler.is_empty());
    }

    #[test]
    fn confirm_with_older_seq_is_stale() {
        let reconciler = Reconciler::new(Duration::from_secs(5));
        reconciler.record(call(), MutationField::AudioMuted, true, false, 10);

        let outcome = reconciler.confirm(&call(), MutationField::AudioMuted, false, 9);
        assert_eq!(outcome, ConfirmOutcome::Stale);
        assert_eq!(reconciler.len(), 1);
    }

    #[test]
    fn unmatched_event_applies_directly() {
        let reconciler = Reconciler::new(Duration::from_secs(5));
        let outcome = reconciler.confirm(&call(), MutationField::VideoMuted, true, 3);
        assert_eq!(outcome, ConfirmOutcome::Unmatched);
    }

    #[test]
    fn supersede_keeps_original_prior() {
        let reconciler = Reconciler::new(Duration::from_millis(1));
        // authoritative value was false; user toggles on, then off
        reconciler.record(call(), MutationField::AudioMuted, true, false, 10);
        reconciler.record(call(), MutationField::AudioMuted, false, true, 11);

        std::thread::sleep(Duration::from_millis(5));
        let reverted = reconciler.take_expired(Instant::now());
        assert_eq!(reverted.len(), 1);
        // reverts to the pre-mutation authoritative value, not the first guess
        assert!(!reverted[0].prior);
    }

    #[test]
    fn clear_call_only_touches_that_call() {
        let reconciler = Reconciler::new(Duration::from_secs(5));
        reconciler.record(call(), MutationField::AudioMuted, true, false, 1);
        reconciler.record(
            CallId::from("c2"),
            MutationField::AudioMuted,
            true,
            false,
            1,
        );

        reconciler.clear_call(&call());
        assert_eq!(reconciler.len(), 1);
    }
}
