//! Per-action-reference circuit breaker.
//!
//! One breaker instance is shared (via the invoker) across every concurrent
//! task run that uses the same action reference.  Failures and timeouts
//! within a rolling window trip the circuit; while open, invocations are
//! short-circuited without calling the action.  After the cool-down a single
//! half-open probe is allowed per cool-down period.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Thresholds for tripping and recovering the circuit.
#[derive(Debug, Clone)]
pub struct BreakerOptions {
    /// Number of failures within the window that opens the circuit.
    pub failure_threshold: u32,
    /// Rolling window over which failures are counted.
    pub window: Duration,
    /// How long the circuit stays open before a half-open probe is allowed.
    pub cooldown: Duration,
}

impl Default for BreakerOptions {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window: Duration::from_secs(60),
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Normal operation, invocations pass through.
    Closed,
    /// Circuit tripped, invocations are short-circuited.
    Open,
    /// A recovery probe is in flight.
    HalfOpen,
}

struct BreakerInner {
    state: BreakerState,
    /// Timestamps of recent failures, pruned to the window.
    failures: VecDeque<Instant>,
    /// When the circuit last opened.
    opened_at: Option<Instant>,
}

/// Rolling-window circuit breaker with a single half-open probe.
pub struct Breaker {
    options: BreakerOptions,
    inner: Mutex<BreakerInner>,
}

impl Breaker {
    pub fn new(options: BreakerOptions) -> Self {
        Self {
            options,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failures: VecDeque::new(),
                opened_at: None,
            }),
        }
    }

    /// Whether the next invocation may call the underlying action.
    ///
    /// Returning `true` from the `Open` state claims the one half-open probe
    /// for this cool-down period; concurrent callers are rejected until the
    /// probe resolves.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let cooled_down = inner
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.options.cooldown);
                if cooled_down {
                    inner.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
            // The probe is already in flight.
            BreakerState::HalfOpen => false,
        }
    }

    /// Record a successful invocation.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state == BreakerState::HalfOpen {
            inner.state = BreakerState::Closed;
            inner.opened_at = None;
            inner.failures.clear();
        }
    }

    /// Record a failed or timed-out invocation.
    pub fn record_failure(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        match inner.state {
            BreakerState::HalfOpen => {
                // Probe failed: re-open for another full cool-down.
                inner.state = BreakerState::Open;
                inner.opened_at = Some(now);
            }
            BreakerState::Closed => {
                inner.failures.push_back(now);
                let window = self.options.window;
                while inner
                    .failures
                    .front()
                    .is_some_and(|&t| now.duration_since(t) > window)
                {
                    inner.failures.pop_front();
                }
                if inner.failures.len() >= self.options.failure_threshold as usize {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(now);
                }
            }
            BreakerState::Open => {}
        }
    }

    /// Current state, for logs and tests.
    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, window_ms: u64, cooldown_ms: u64) -> Breaker {
        Breaker::new(BreakerOptions {
            failure_threshold: threshold,
            window: Duration::from_millis(window_ms),
            cooldown: Duration::from_millis(cooldown_ms),
        })
    }

    #[test]
    fn opens_after_threshold_failures_within_window() {
        let b = breaker(3, 10_000, 10_000);
        assert!(b.try_acquire());

        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Closed);

        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
        assert!(!b.try_acquire());
    }

    #[test]
    fn success_does_not_reset_window_while_closed() {
        let b = breaker(2, 10_000, 10_000);
        b.record_failure();
        b.record_success();
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
    }

    #[test]
    fn allows_single_probe_after_cooldown() {
        let b = breaker(1, 10_000, 0);
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);

        // Cool-down of zero: the first caller claims the probe...
        assert!(b.try_acquire());
        assert_eq!(b.state(), BreakerState::HalfOpen);
        // ...and concurrent callers are still rejected.
        assert!(!b.try_acquire());
    }

    #[test]
    fn successful_probe_closes_the_circuit() {
        let b = breaker(1, 10_000, 0);
        b.record_failure();
        assert!(b.try_acquire());
        b.record_success();
        assert_eq!(b.state(), BreakerState::Closed);
        assert!(b.try_acquire());
    }

    #[test]
    fn failed_probe_reopens_the_circuit() {
        let b = breaker(1, 10_000, 0);
        b.record_failure();
        assert!(b.try_acquire());
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
    }
}
