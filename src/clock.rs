/// Monotonic time and blocking sleep.
///
/// Every wait in the node (debounce settling, association polling, modem
/// handshakes) goes through this trait so tests can drive time by hand.
pub trait Clock {
    /// Milliseconds since boot.
    fn now_ms(&self) -> u64;

    /// Block the control loop for `ms` milliseconds.
    fn sleep_ms(&self, ms: u32);
}

/// Poll `condition` up to `attempts` times, sleeping `interval_ms` between
/// polls. Returns `true` as soon as the condition holds.
pub fn poll_until<C: Clock>(
    clock: &C,
    attempts: u32,
    interval_ms: u32,
    mut condition: impl FnMut() -> bool,
) -> bool {
    for _ in 0..attempts {
        if condition() {
            return true;
        }
        clock.sleep_ms(interval_ms);
    }
    condition()
}

#[cfg(test)]
pub mod mock {
    use core::cell::Cell;

    use super::Clock;

    /// Deterministic clock: `sleep_ms` advances time instantly.
    #[derive(Default)]
    pub struct MockClock {
        now: Cell<u64>,
        slept: Cell<u64>,
    }

    impl MockClock {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set(&self, ms: u64) {
            self.now.set(ms);
        }

        pub fn advance(&self, ms: u64) {
            self.now.set(self.now.get() + ms);
        }

        /// Total time spent in `sleep_ms`.
        pub fn slept_ms(&self) -> u64 {
            self.slept.get()
        }
    }

    impl Clock for MockClock {
        fn now_ms(&self) -> u64 {
            self.now.get()
        }

        fn sleep_ms(&self, ms: u32) {
            self.advance(ms as u64);
            self.slept.set(self.slept.get() + ms as u64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockClock;
    use super::*;

    #[test]
    fn poll_until_returns_early() {
        let clock = MockClock::new();
        let mut calls = 0;
        let ok = poll_until(&clock, 15, 500, || {
            calls += 1;
            calls == 3
        });
        assert!(ok);
        assert_eq!(calls, 3);
        assert_eq!(clock.now_ms(), 1000);
    }

    #[test]
    fn poll_until_is_bounded() {
        let clock = MockClock::new();
        let ok = poll_until(&clock, 15, 500, || false);
        assert!(!ok);
        assert_eq!(clock.slept_ms(), 7500);
    }
}
