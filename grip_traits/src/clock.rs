//! Time source for the scheduler, PID, offset estimator and frame reader.
//!
//! Everything time-dependent takes an `Arc<dyn Clock + Send + Sync>` so tests
//! can swap in [`test_clock::TestClock`] and run cycles without sleeping.
use std::time::{Duration, Instant};

pub trait Clock {
    fn now(&self) -> Instant;

    /// Block for `d`. Virtual clocks advance instead.
    fn sleep(&self, d: Duration);

    /// One iteration of the busy-wait used just before a cycle deadline.
    fn spin(&self) {
        std::hint::spin_loop();
    }

    /// Whole milliseconds from `epoch` to now; 0 if `epoch` is in the future.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let ms = self.now().saturating_duration_since(epoch).as_millis();
        u64::try_from(ms).unwrap_or(u64::MAX)
    }
}

/// Wall-clock implementation over `Instant::now` and `thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub const fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            std::thread::sleep(d);
        }
    }
}

#[cfg(any(test, feature = "test-clock"))]
pub mod test_clock {
    use super::{Clock, Duration, Instant};
    use std::sync::{Arc, Mutex, PoisonError};

    /// Virtual time shared by every clone.
    ///
    /// `sleep(d)` moves time forward by `d` and returns at once; `spin()`
    /// moves it by 1 µs so deadline loops always terminate.
    #[derive(Debug, Clone)]
    pub struct TestClock {
        start: Instant,
        now: Arc<Mutex<Instant>>,
    }

    impl Default for TestClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestClock {
        pub fn new() -> Self {
            let start = Instant::now();
            Self {
                start,
                now: Arc::new(Mutex::new(start)),
            }
        }

        pub fn advance(&self, d: Duration) {
            let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
            *now += d;
        }

        /// Virtual time since construction.
        pub fn elapsed(&self) -> Duration {
            self.now() - self.start
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap_or_else(PoisonError::into_inner)
        }

        fn sleep(&self, d: Duration) {
            self.advance(d);
        }

        fn spin(&self) {
            self.advance(Duration::from_micros(1));
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn clones_share_virtual_time() {
            let clock = TestClock::new();
            let other = clock.clone();
            let t0 = clock.now();
            other.sleep(Duration::from_millis(3));
            clock.spin();
            assert_eq!(clock.now() - t0, Duration::from_micros(3_001));
            assert_eq!(other.ms_since(t0), 3);
            assert_eq!(clock.elapsed(), Duration::from_micros(3_001));
        }

        #[test]
        fn future_epoch_saturates() {
            let clock = TestClock::new();
            let later = clock.now() + Duration::from_secs(1);
            assert_eq!(clock.ms_since(later), 0);
        }
    }
}
