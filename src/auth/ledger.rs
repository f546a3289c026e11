//! In-process ledger of failed login attempts per remote identity.
//!
//! Flow overview:
//! 1) Track failure timestamps per remote identity inside `lockout_window`.
//! 2) Apply a progressive delay between attempts while failures accumulate.
//! 3) Engage a single, non-rolling lockout once `max_failed_attempts` is
//!    reached; further failures during lockout do not extend it.
//! 4) Clear the whole failure history once the lockout expires naturally.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::warn;

use super::now_unix;

/// Wait before the next attempt is permitted, by live failure count.
/// Index 0 is unused; counts of five or more share the last entry.
const DELAY_SCHEDULE: [u64; 6] = [0, 0, 2, 5, 10, 30];

/// Outcome of consulting the ledger before a verification attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Seconds until the next attempt is permitted.
    Delay(u64),
    /// Seconds until the active lockout expires.
    LockedOut(u64),
}

#[derive(Debug, Default)]
struct AttemptRecord {
    /// Unix seconds of recent failures, append-only until pruned by age.
    failures: Vec<i64>,
    lockout_until: Option<i64>,
    user_agents: HashSet<String>,
}

impl AttemptRecord {
    fn prune(&mut self, cutoff: i64) {
        self.failures.retain(|&at| at > cutoff);
    }

    fn is_empty(&self) -> bool {
        self.failures.is_empty() && self.lockout_until.is_none()
    }
}

/// Per-remote-identity failure ledger. Operations on a single record are
/// linearizable; the outer map lock is held only while resolving the
/// record handle.
pub struct AttemptLedger {
    max_failed_attempts: u32,
    lockout_window: u64,
    records: RwLock<HashMap<String, Arc<Mutex<AttemptRecord>>>>,
}

impl AttemptLedger {
    #[must_use]
    pub fn new(max_failed_attempts: u32, lockout_window: u64) -> Self {
        Self {
            max_failed_attempts,
            lockout_window,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Record a failed verification from `remote_id`.
    ///
    /// A failure during an active lockout is ignored: the attacker gets
    /// one lockout, not a rolling one.
    pub fn observe_failure(&self, remote_id: &str, user_agent: Option<&str>) {
        let now = now_unix();
        let record = self.record_handle(remote_id);
        let mut guard = lock(&record);

        if let Some(until) = guard.lockout_until {
            if until > now {
                return;
            }
            // Lockout lapsed without a check() in between; start fresh.
            guard.failures.clear();
            guard.user_agents.clear();
            guard.lockout_until = None;
        }

        guard.prune(now - self.window());
        guard.failures.push(now);
        if let Some(agent) = user_agent {
            guard.user_agents.insert(agent.to_string());
        }

        if guard.failures.len() >= self.max_failed_attempts as usize {
            guard.lockout_until = Some(now + self.window());
            warn!(
                remote_id,
                failures = guard.failures.len(),
                distinct_user_agents = guard.user_agents.len(),
                "Lockout engaged after repeated authentication failures"
            );
        }
    }

    /// Decide whether the next attempt from `remote_id` may proceed.
    #[must_use]
    pub fn check(&self, remote_id: &str) -> Decision {
        let now = now_unix();
        let record = {
            let map = read(&self.records);
            map.get(remote_id).cloned()
        };
        let Some(record) = record else {
            return Decision::Allow;
        };

        let mut guard = lock(&record);
        if let Some(until) = guard.lockout_until {
            if until > now {
                return Decision::LockedOut(seconds_until(now, until));
            }
            // Expired lockout clears the entire history before deciding.
            guard.failures.clear();
            guard.user_agents.clear();
            guard.lockout_until = None;
        }

        guard.prune(now - self.window());
        if guard.failures.is_empty() {
            drop(guard);
            self.remove_if_empty(remote_id);
            return Decision::Allow;
        }

        let live = guard.failures.len();
        let most_recent = guard.failures.iter().copied().max().unwrap_or(now);
        let ready_at = most_recent + delay_for(live) as i64;
        if ready_at > now {
            Decision::Delay(seconds_until(now, ready_at))
        } else {
            Decision::Allow
        }
    }

    /// Forget everything about `remote_id`; called on successful login.
    pub fn clear(&self, remote_id: &str) {
        let mut map = write(&self.records);
        map.remove(remote_id);
    }

    /// Live failure count inside the window, for `remaining_attempts`
    /// reporting.
    #[must_use]
    pub fn live_failures(&self, remote_id: &str) -> u32 {
        let record = {
            let map = read(&self.records);
            map.get(remote_id).cloned()
        };
        let Some(record) = record else {
            return 0;
        };
        let now = now_unix();
        let mut guard = lock(&record);
        guard.prune(now - self.window());
        u32::try_from(guard.failures.len()).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn remaining_attempts(&self, remote_id: &str) -> u32 {
        self.max_failed_attempts
            .saturating_sub(self.live_failures(remote_id))
    }

    /// Drop records that hold no live failures and no lockout.
    pub fn prune_expired(&self) {
        let now = now_unix();
        let mut map = write(&self.records);
        map.retain(|_, record| {
            let mut guard = lock(record);
            if guard.lockout_until.is_some_and(|until| until <= now) {
                guard.failures.clear();
                guard.user_agents.clear();
                guard.lockout_until = None;
            }
            guard.prune(now - self.window());
            !guard.is_empty()
        });
    }

    fn record_handle(&self, remote_id: &str) -> Arc<Mutex<AttemptRecord>> {
        {
            let map = read(&self.records);
            if let Some(record) = map.get(remote_id) {
                return Arc::clone(record);
            }
        }
        let mut map = write(&self.records);
        Arc::clone(map.entry(remote_id.to_string()).or_default())
    }

    fn remove_if_empty(&self, remote_id: &str) {
        let mut map = write(&self.records);
        let empty = map
            .get(remote_id)
            .is_none_or(|record| lock(record).is_empty());
        if empty {
            map.remove(remote_id);
        }
    }

    fn window(&self) -> i64 {
        i64::try_from(self.lockout_window).unwrap_or(i64::MAX)
    }
}

fn delay_for(live_failures: usize) -> u64 {
    let index = live_failures.min(DELAY_SCHEDULE.len() - 1);
    DELAY_SCHEDULE[index]
}

fn seconds_until(now: i64, later: i64) -> u64 {
    u64::try_from(later.saturating_sub(now)).unwrap_or(0)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<'a, T>(lock: &'a RwLock<T>) -> std::sync::RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<'a, T>(lock: &'a RwLock<T>) -> std::sync::RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REMOTE: &str = "203.0.113.9";

    fn ledger() -> AttemptLedger {
        AttemptLedger::new(5, 900)
    }

    #[test]
    fn unknown_remote_is_allowed() {
        assert_eq!(ledger().check(REMOTE), Decision::Allow);
        assert_eq!(ledger().remaining_attempts(REMOTE), 5);
    }

    #[test]
    fn single_failure_allows_immediately() {
        let ledger = ledger();
        ledger.observe_failure(REMOTE, Some("curl/8.0"));
        // N=1 carries no delay in the schedule.
        assert_eq!(ledger.check(REMOTE), Decision::Allow);
        assert_eq!(ledger.remaining_attempts(REMOTE), 4);
    }

    #[test]
    fn progressive_delay_after_second_failure() {
        let ledger = ledger();
        ledger.observe_failure(REMOTE, None);
        ledger.observe_failure(REMOTE, None);
        match ledger.check(REMOTE) {
            Decision::Delay(seconds) => assert!(seconds >= 1 && seconds <= 2),
            other => panic!("expected Delay, got {other:?}"),
        }
    }

    #[test]
    fn lockout_after_max_failures() {
        let ledger = ledger();
        for _ in 0..5 {
            ledger.observe_failure(REMOTE, Some("curl/8.0"));
        }
        match ledger.check(REMOTE) {
            Decision::LockedOut(seconds) => assert!(seconds > 0 && seconds <= 900),
            other => panic!("expected LockedOut, got {other:?}"),
        }
    }

    #[test]
    fn lockout_is_not_extended_by_further_failures() {
        let ledger = ledger();
        for _ in 0..5 {
            ledger.observe_failure(REMOTE, None);
        }
        let before = match ledger.check(REMOTE) {
            Decision::LockedOut(seconds) => seconds,
            other => panic!("expected LockedOut, got {other:?}"),
        };
        for _ in 0..10 {
            ledger.observe_failure(REMOTE, None);
        }
        match ledger.check(REMOTE) {
            Decision::LockedOut(seconds) => assert!(seconds <= before),
            other => panic!("expected LockedOut, got {other:?}"),
        }
    }

    #[test]
    fn expired_lockout_clears_history() {
        let ledger = AttemptLedger::new(3, 900);
        for _ in 0..3 {
            ledger.observe_failure(REMOTE, None);
        }
        // Rewind the lockout so it reads as expired.
        {
            let map = read(&ledger.records);
            let record = map.get(REMOTE).cloned().expect("record exists");
            drop(map);
            let mut guard = lock(&record);
            guard.lockout_until = Some(now_unix() - 1);
        }
        assert_eq!(ledger.check(REMOTE), Decision::Allow);
        assert_eq!(ledger.remaining_attempts(REMOTE), 3);
    }

    #[test]
    fn clear_removes_record() {
        let ledger = ledger();
        ledger.observe_failure(REMOTE, None);
        ledger.clear(REMOTE);
        assert_eq!(ledger.check(REMOTE), Decision::Allow);
        assert_eq!(ledger.remaining_attempts(REMOTE), 5);
    }

    #[test]
    fn remotes_are_independent() {
        let ledger = ledger();
        for _ in 0..5 {
            ledger.observe_failure(REMOTE, None);
        }
        assert_eq!(ledger.check("198.51.100.7"), Decision::Allow);
    }

    #[test]
    fn prune_expired_drops_stale_records() {
        let ledger = ledger();
        ledger.observe_failure(REMOTE, None);
        {
            let map = read(&ledger.records);
            let record = map.get(REMOTE).cloned().expect("record exists");
            drop(map);
            let mut guard = lock(&record);
            guard.failures = vec![now_unix() - 10_000];
        }
        ledger.prune_expired();
        assert!(read(&ledger.records).is_empty());
    }
}
