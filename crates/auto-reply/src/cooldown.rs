use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use dashmap::{DashMap, mapref::entry::Entry};

const CLEANUP_EVERY_CHECKS: u64 = 256;

/// Per-sender fixed window: at most one acquisition per window.
#[derive(Clone)]
pub struct CooldownMap {
    window: Duration,
    last_sent: Arc<DashMap<String, Instant>>,
    checks_seen: Arc<AtomicU64>,
}

impl CooldownMap {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_sent: Arc::new(DashMap::new()),
            checks_seen: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Claim the window for `sender`. Returns `false` while a previous claim
    /// is still inside the window.
    pub fn try_acquire(&self, sender: &str) -> bool {
        self.try_acquire_at(sender, Instant::now())
    }

    /// The entry lock makes check-and-mark atomic per sender.
    pub fn try_acquire_at(&self, sender: &str, now: Instant) -> bool {
        let acquired = match self.last_sent.entry(sender.to_string()) {
            Entry::Occupied(mut occupied) => {
                if now.saturating_duration_since(*occupied.get()) >= self.window {
                    occupied.insert(now);
                    true
                } else {
                    false
                }
            },
            Entry::Vacant(vacant) => {
                vacant.insert(now);
                true
            },
        };
        self.cleanup_if_needed(now);
        acquired
    }

    /// Time left before `sender` may be acknowledged again.
    pub fn remaining(&self, sender: &str) -> Option<Duration> {
        let last = *self.last_sent.get(sender)?;
        let left = self.window.saturating_sub(last.elapsed());
        (!left.is_zero()).then_some(left)
    }

    pub fn len(&self) -> usize {
        self.last_sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_sent.is_empty()
    }

    fn cleanup_if_needed(&self, now: Instant) {
        let seen = self.checks_seen.fetch_add(1, Ordering::Relaxed) + 1;
        if !seen.is_multiple_of(CLEANUP_EVERY_CHECKS) {
            return;
        }
        self.last_sent
            .retain(|_, sent| now.saturating_duration_since(*sent) < self.window);
    }
}
