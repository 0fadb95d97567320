//! Process-wide stop signal passed explicitly to every loop.
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Why a session stopped. The first reason recorded wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Configured run time elapsed.
    Completed,
    /// SIGINT / Ctrl-C.
    Interrupt,
    /// Explicit operator stop command.
    Operator,
    /// The presentation layer went away.
    UiClosed,
    /// No valid sensor data within the watchdog window.
    Watchdog,
    /// A resource error; an error is returned alongside.
    Fault,
}

impl StopReason {
    const fn code(self) -> u8 {
        match self {
            Self::Completed => 1,
            Self::Interrupt => 2,
            Self::Operator => 3,
            Self::UiClosed => 4,
            Self::Watchdog => 5,
            Self::Fault => 6,
        }
    }

    const fn from_code(c: u8) -> Option<Self> {
        match c {
            1 => Some(Self::Completed),
            2 => Some(Self::Interrupt),
            3 => Some(Self::Operator),
            4 => Some(Self::UiClosed),
            5 => Some(Self::Watchdog),
            6 => Some(Self::Fault),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Interrupt => "interrupt",
            Self::Operator => "operator",
            Self::UiClosed => "ui_closed",
            Self::Watchdog => "watchdog",
            Self::Fault => "fault",
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cloneable cancellation token. All clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<AtomicU8>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Returns `true` if this call set the reason.
    pub fn cancel(&self, reason: StopReason) -> bool {
        let won = self
            .state
            .compare_exchange(0, reason.code(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            tracing::debug!(reason = %reason, "stop requested");
        }
        won
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) != 0
    }

    pub fn reason(&self) -> Option<StopReason> {
        StopReason::from_code(self.state.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_reason_wins_across_clones() {
        let a = CancelToken::new();
        let b = a.clone();
        assert!(!a.is_cancelled());
        assert!(b.cancel(StopReason::Watchdog));
        assert!(!a.cancel(StopReason::Interrupt));
        assert!(a.is_cancelled());
        assert_eq!(a.reason(), Some(StopReason::Watchdog));
    }

    #[test]
    fn visible_from_another_thread() {
        let tok = CancelToken::new();
        let t = tok.clone();
        std::thread::spawn(move || t.cancel(StopReason::Operator))
            .join()
            .unwrap();
        assert_eq!(tok.reason(), Some(StopReason::Operator));
    }
}
