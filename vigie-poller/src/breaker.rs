//! Per-device circuit breaker driven by consecutive read failures.
//!
//! A device starts Closed and is polled every cycle. Once `max_failures`
//! consecutive failures accumulate the circuit is Open and the device is
//! skipped, except for one probe attempt every `retry_interval`-th global
//! cycle. A successful read (probe included) resets the counter and closes
//! the circuit again. Cadence is expressed in scheduler cycles, not wall
//! clock, which keeps the whole state machine deterministic under test.

/// Gating state derived from the consecutive-failure counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Circuit {
    Closed,
    Open,
}

/// What the scheduler should do with a device this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDecision {
    /// Circuit closed: normal read attempt.
    Read,
    /// Circuit open, but this is a retry cycle: one forced attempt.
    Probe,
    /// Circuit open: no attempt at all this cycle.
    Skip,
}

#[derive(Debug)]
pub struct FailureTracker {
    failures: u32,
    max_failures: u32,
}

impl FailureTracker {
    pub fn new(max_failures: u32) -> Self {
        FailureTracker {
            failures: 0,
            max_failures,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// `Open` iff the consecutive-failure count has reached the limit.
    pub fn circuit(&self) -> Circuit {
        if self.failures >= self.max_failures {
            Circuit::Open
        } else {
            Circuit::Closed
        }
    }

    /// Gate for the given global cycle number.
    ///
    /// The probe cadence is computed from the scheduler's global cycle
    /// counter, so devices that opened at different times share the same
    /// retry instants.
    pub fn decide(&self, cycle: u64, retry_interval: u64) -> PollDecision {
        match self.circuit() {
            Circuit::Closed => PollDecision::Read,
            Circuit::Open => {
                if cycle % retry_interval == 0 {
                    PollDecision::Probe
                } else {
                    PollDecision::Skip
                }
            }
        }
    }

    /// A successful read closes the circuit regardless of prior count.
    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    /// A failed read or probe; an Open circuit simply stays Open.
    pub fn record_failure(&mut self) {
        self.failures += 1;
    }
}
