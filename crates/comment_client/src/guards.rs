use std::{
    collections::HashSet,
    sync::atomic::{AtomicI64, Ordering},
};

use chrono::Utc;
use shared::domain::{CommentId, ContainerId};

pub const DEFAULT_POST_INTERVAL_SECS: i64 = 10;

pub trait Clock: Send + Sync {
    fn now_epoch_seconds(&self) -> i64;
}

/// Wall clock, rounded up to the next whole second.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_seconds(&self) -> i64 {
        let millis = Utc::now().timestamp_millis();
        (millis + 999).div_euclid(1000)
    }
}

/// Settable clock for tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self(AtomicI64::new(now))
    }

    pub fn set(&self, now: i64) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_epoch_seconds(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Session-wide spacing between comment creations.
#[derive(Debug, Clone)]
pub struct RateLimitWindow {
    interval_secs: i64,
    last_post_epoch_seconds: Option<i64>,
}

impl RateLimitWindow {
    pub fn new(interval_secs: i64) -> Self {
        Self {
            interval_secs,
            last_post_epoch_seconds: None,
        }
    }

    pub fn interval_secs(&self) -> i64 {
        self.interval_secs
    }

    pub fn last_post(&self) -> Option<i64> {
        self.last_post_epoch_seconds
    }

    pub fn blocked(&self, now: i64) -> bool {
        self.retry_after(now).is_some()
    }

    /// Seconds left until the next post is allowed, if any.
    pub fn retry_after(&self, now: i64) -> Option<i64> {
        let last = self.last_post_epoch_seconds?;
        let elapsed = now - last;
        (elapsed < self.interval_secs).then(|| self.interval_secs - elapsed)
    }

    /// Only called after the store confirmed a create.
    pub fn record_post(&mut self, now: i64) {
        self.last_post_epoch_seconds = Some(now);
    }
}

impl Default for RateLimitWindow {
    fn default() -> Self {
        Self::new(DEFAULT_POST_INTERVAL_SECS)
    }
}

/// Per-comment vote locks for this session.
///
/// A lock is taken when a vote is dispatched and dropped again only when the
/// store refuses it; a confirmed vote keeps the comment locked.
#[derive(Debug, Default, Clone)]
pub struct VoteGuard {
    locked: HashSet<CommentId>,
}

impl VoteGuard {
    pub fn already_voted(&self, comment: &CommentId) -> bool {
        self.locked.contains(comment)
    }

    /// Returns false when the comment is already locked.
    pub fn try_lock(&mut self, comment: &CommentId) -> bool {
        self.locked.insert(comment.clone())
    }

    pub fn release(&mut self, comment: &CommentId) {
        self.locked.remove(comment);
    }
}

/// UI affordances that may have at most one request in flight.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ControlKey {
    Submit(ContainerId),
    Save(CommentId),
    Delete(CommentId),
    Subscription(ContainerId),
    More(ContainerId),
}

#[derive(Debug, Default, Clone)]
pub struct ControlLocks {
    inflight: HashSet<ControlKey>,
}

impl ControlLocks {
    pub fn is_locked(&self, key: &ControlKey) -> bool {
        self.inflight.contains(key)
    }

    pub fn try_lock(&mut self, key: ControlKey) -> bool {
        self.inflight.insert(key)
    }

    pub fn unlock(&mut self, key: &ControlKey) {
        self.inflight.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_blocks_inside_window_only() {
        let mut window = RateLimitWindow::default();
        assert!(!window.blocked(1000));
        window.record_post(1000);
        assert!(window.blocked(1005));
        assert_eq!(window.retry_after(1005), Some(5));
        assert!(!window.blocked(1010));
        assert!(!window.blocked(1011));
    }

    #[test]
    fn vote_lock_is_exclusive_until_released() {
        let mut guard = VoteGuard::default();
        let id = CommentId::from("c1");
        assert!(guard.try_lock(&id));
        assert!(guard.already_voted(&id));
        assert!(!guard.try_lock(&id));
        guard.release(&id);
        assert!(!guard.already_voted(&id));
    }

    #[test]
    fn control_locks_are_keyed_per_control() {
        let mut locks = ControlLocks::default();
        assert!(locks.try_lock(ControlKey::Submit("a".into())));
        assert!(!locks.try_lock(ControlKey::Submit("a".into())));
        assert!(locks.try_lock(ControlKey::Submit("b".into())));
        locks.unlock(&ControlKey::Submit("a".into()));
        assert!(!locks.is_locked(&ControlKey::Submit("a".into())));
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1000);
        clock.advance(11);
        assert_eq!(clock.now_epoch_seconds(), 1011);
    }
}
