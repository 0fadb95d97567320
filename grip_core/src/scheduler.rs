//! Fixed-period cycle scheduler.
//!
//! Deadlines are absolute: `next = start + k·period`, advanced by exactly one
//! period per cycle however long the work took, so error never accumulates.
//! Waiting is a coarse sleep in `poll`-sized chunks until `spin_margin` remains,
//! then a tight poll to the deadline. Cancellation is checked between every
//! chunk and on every poll iteration.
use std::sync::Arc;
use std::time::{Duration, Instant};

use grip_traits::{Clock, MonotonicClock};

use crate::cancel::CancelToken;

/// One cycle boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// 1-based cycle number.
    pub cycle: u64,
    pub deadline: Instant,
    pub woke_at: Instant,
    /// How far past the deadline the wake-up happened.
    pub late: Duration,
    /// The deadline had already passed when the wait began.
    pub overrun: bool,
}

/// Wake-up latency and overrun counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    pub cycles: u64,
    pub overruns: u64,
    pub min_late: Duration,
    pub max_late: Duration,
    sum_late: Duration,
}

impl Default for CycleStats {
    fn default() -> Self {
        Self {
            cycles: 0,
            overruns: 0,
            min_late: Duration::MAX,
            max_late: Duration::ZERO,
            sum_late: Duration::ZERO,
        }
    }
}

impl CycleStats {
    #[inline]
    pub fn record(&mut self, late: Duration, overrun: bool) {
        self.cycles += 1;
        if overrun {
            self.overruns += 1;
        }
        self.min_late = self.min_late.min(late);
        self.max_late = self.max_late.max(late);
        self.sum_late = self.sum_late.saturating_add(late);
    }

    pub fn avg_late(&self) -> Duration {
        if self.cycles == 0 {
            return Duration::ZERO;
        }
        let n = u32::try_from(self.cycles).unwrap_or(u32::MAX);
        self.sum_late / n
    }

    /// `min_late`, or zero before the first cycle.
    pub fn min_late_or_zero(&self) -> Duration {
        if self.cycles == 0 {
            Duration::ZERO
        } else {
            self.min_late
        }
    }
}

pub struct Scheduler {
    period: Duration,
    spin_margin: Duration,
    poll: Duration,
    clock: Arc<dyn Clock + Send + Sync>,
    next: Option<Instant>,
    cycle: u64,
    stats: CycleStats,
}

impl Scheduler {
    pub fn new(period: Duration, spin_margin: Duration, poll: Duration) -> Self {
        Self {
            period: period.max(Duration::from_micros(1)),
            spin_margin: spin_margin.min(period),
            poll: poll.max(Duration::from_micros(1)),
            clock: Arc::new(MonotonicClock::new()),
            next: None,
            cycle: 0,
            stats: CycleStats::default(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Anchor the time base at now; the first deadline is one period later.
    pub fn start(&mut self) -> Instant {
        let now = self.clock.now();
        self.next = Some(now + self.period);
        self.cycle = 0;
        self.stats = CycleStats::default();
        now
    }

    /// Block until the next deadline. Returns `None` once `cancel` is set.
    pub fn wait_next(&mut self, cancel: &CancelToken) -> Option<Tick> {
        if cancel.is_cancelled() {
            return None;
        }
        let deadline = match self.next {
            Some(d) => d,
            None => {
                self.start();
                self.next?
            }
        };

        let mut now = self.clock.now();
        let overrun = now >= deadline;
        if !overrun {
            loop {
                let remaining = deadline.saturating_duration_since(now);
                if remaining <= self.spin_margin {
                    break;
                }
                self.clock
                    .sleep((remaining - self.spin_margin).min(self.poll));
                if cancel.is_cancelled() {
                    return None;
                }
                now = self.clock.now();
            }
            while self.clock.now() < deadline {
                if cancel.is_cancelled() {
                    return None;
                }
                self.clock.spin();
            }
        }

        let woke_at = self.clock.now();
        let late = woke_at.saturating_duration_since(deadline);
        self.cycle += 1;
        self.next = Some(deadline + self.period);
        self.stats.record(late, overrun);
        if overrun {
            tracing::trace!(cycle = self.cycle, late_us = late.as_micros(), "cycle overrun");
        }

        Some(Tick {
            cycle: self.cycle,
            deadline,
            woke_at,
            late,
            overrun,
        })
    }

    pub const fn stats(&self) -> &CycleStats {
        &self.stats
    }
}
