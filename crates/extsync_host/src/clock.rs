use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of record timestamps, in nanoseconds.
pub trait Clock: Send + Sync {
    fn now_ns(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ns(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX))
            .unwrap_or_default()
    }
}

/// Advances by a fixed step on every read.
#[derive(Debug)]
pub struct SteppingClock {
    next: AtomicI64,
    step: i64,
}

impl SteppingClock {
    pub fn new(start: i64, step: i64) -> Self {
        Self {
            next: AtomicI64::new(start),
            step,
        }
    }
}

impl Clock for SteppingClock {
    fn now_ns(&self) -> i64 {
        self.next.fetch_add(self.step, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_after_epoch() {
        assert!(SystemClock.now_ns() > 0);
    }

    #[test]
    fn stepping_clock_is_strictly_increasing() {
        let clock = SteppingClock::new(100, 5);
        assert_eq!(clock.now_ns(), 100);
        assert_eq!(clock.now_ns(), 105);
    }
}
