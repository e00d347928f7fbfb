//! Injectable clock abstraction (§4.1: "the store depends on an injectable
//! monotonic-ish `clock.now()` returning seconds").
//!
//! Production wires `SystemClock`; tests substitute `FakeClock` to make
//! retry-scheduling and retention assertions deterministic.

use std::{
    sync::atomic::{AtomicI64, Ordering},
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current wall-clock time, in seconds.
    fn now(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the unix epoch")
            .as_secs() as i64
    }
}

/// A clock whose value is set explicitly, for deterministic tests of
/// retry scheduling and retention cutoffs.
#[derive(Debug, Clone)]
pub struct FakeClock(Arc<AtomicI64>);

impl FakeClock {
    #[must_use]
    pub fn new(start: i64) -> Self {
        Self(Arc::new(AtomicI64::new(start)))
    }

    pub fn advance(&self, seconds: i64) {
        self.0.fetch_add(seconds, Ordering::SeqCst);
    }

    pub fn set(&self, value: i64) {
        self.0.store(value, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances() {
        let clock = FakeClock::new(1_000);
        assert_eq!(clock.now(), 1_000);
        clock.advance(600);
        assert_eq!(clock.now(), 1_600);
        clock.set(0);
        assert_eq!(clock.now(), 0);
    }

    #[test]
    fn system_clock_is_plausible() {
        let now = SystemClock.now();
        assert!(now > 1_700_000_000);
    }
}
