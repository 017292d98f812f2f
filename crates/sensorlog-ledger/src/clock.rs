//! Append-time source for ledgers.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Where a ledger takes append timestamps from (Unix seconds).
#[derive(Debug, Clone, Default)]
pub enum Clock {
    /// Wall clock.
    #[default]
    System,
    /// A settable clock shared with the caller. Used by tests and replays.
    Manual(Arc<AtomicI64>),
}

impl Clock {
    /// A manual clock starting at `start`.
    pub fn manual(start: i64) -> Self {
        Clock::Manual(Arc::new(AtomicI64::new(start)))
    }

    pub fn now(&self) -> i64 {
        match self {
            Clock::System => now_secs(),
            Clock::Manual(t) => t.load(Ordering::SeqCst),
        }
    }

    /// Set a manual clock. No-op on the system clock.
    pub fn set(&self, secs: i64) {
        if let Clock::Manual(t) = self {
            t.store(secs, Ordering::SeqCst);
        }
    }

    /// Advance a manual clock. No-op on the system clock.
    pub fn advance(&self, secs: i64) {
        if let Clock::Manual(t) = self {
            t.fetch_add(secs, Ordering::SeqCst);
        }
    }
}

/// Get current time in seconds.
pub(crate) fn now_secs() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared() {
        let clock = Clock::manual(100);
        let handle = clock.clone();
        handle.advance(5);
        assert_eq!(clock.now(), 105);
        clock.set(7);
        assert_eq!(handle.now(), 7);
    }

    #[test]
    fn test_system_clock_ignores_set() {
        let clock = Clock::System;
        clock.set(0);
        assert!(clock.now() > 1_500_000_000);
    }
}
