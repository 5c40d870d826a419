//! Run-length stability gate for noisy classifications.
//!
//! A candidate state is only committed once it has been observed on
//! `threshold` consecutive samples. Any differing sample restarts the run.

/// Debounce gate over a discrete state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebounceGate<S> {
    committed: S,
    candidate: Option<S>,
    run: u32,
    threshold: u32,
}

impl<S: Copy + Eq> DebounceGate<S> {
    /// New gate starting at `initial`. The first sample never commits on its
    /// own (unless `threshold` is 1).
    pub fn new(initial: S, threshold: u32) -> Self {
        Self {
            committed: initial,
            candidate: None,
            run: 0,
            threshold: threshold.max(1),
        }
    }

    /// Feed one candidate classification; returns the committed state.
    pub fn observe(&mut self, candidate: S) -> S {
        if self.candidate == Some(candidate) {
            self.run = self.run.saturating_add(1);
        } else {
            self.candidate = Some(candidate);
            self.run = 1;
        }

        if candidate != self.committed && self.run >= self.threshold {
            self.committed = candidate;
        }
        self.committed
    }

    /// Commit a state immediately, bypassing the run-length requirement.
    pub fn force(&mut self, state: S) {
        self.committed = state;
        self.candidate = None;
        self.run = 0;
    }

    pub fn committed(&self) -> S {
        self.committed
    }

    /// Length of the current run of identical candidates.
    pub fn run_length(&self) -> u32 {
        self.run
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}
