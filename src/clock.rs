//! Time source injected into the lifecycle managers. All timestamps are unix seconds.

use std::sync::atomic::{AtomicI64, Ordering};

pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 { chrono::Utc::now().timestamp() }
}

/// Clock that only moves when told to. Used by tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: i64) -> Self { Self { now: AtomicI64::new(start) } }
    pub fn set(&self, t: i64) { self.now.store(t, Ordering::SeqCst); }
    pub fn advance(&self, secs: i64) { self.now.fetch_add(secs, Ordering::SeqCst); }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 { self.now.load(Ordering::SeqCst) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_on_request() {
        let c = ManualClock::new(100);
        assert_eq!(c.now(), 100);
        c.advance(5);
        assert_eq!(c.now(), 105);
        c.set(7);
        assert_eq!(c.now(), 7);
    }
}
