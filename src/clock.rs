use chrono::{DateTime, Utc};
use std::sync::Mutex;

/// Time source abstraction. Every component that needs wall time takes a
/// `Clock` by dependency injection rather than calling `Utc::now()` directly,
/// so tests can pin `first_seen`, cache timestamps, and backoff sleeps to a
/// fixed instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed-instant clock for tests. `set` lets a test advance time explicitly
/// (e.g. to exercise the 7-day `first_seen` pruning window) without sleeping.
pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
}

impl FakeClock {
    pub fn new(fixed: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(fixed),
        }
    }

    pub fn set(&self, fixed: DateTime<Utc>) {
        *self.now.lock().expect("clock mutex poisoned") = fixed;
    }

    pub fn advance(&self, delta: chrono::Duration) {
        let mut guard = self.now.lock().expect("clock mutex poisoned");
        *guard += delta;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn system_clock_advances() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn fake_clock_holds_fixed_instant() {
        let fixed = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let clock = FakeClock::new(fixed);
        assert_eq!(clock.now(), fixed);
        assert_eq!(clock.now(), fixed);
    }

    #[test]
    fn fake_clock_advance_moves_time_forward() {
        let fixed = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let clock = FakeClock::new(fixed);
        clock.advance(chrono::Duration::days(20));
        assert_eq!(clock.now(), fixed + chrono::Duration::days(20));
    }
}
