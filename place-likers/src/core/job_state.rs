//! Per-source job state and the transition table of the retry loop.
//!
//! ```text
//! PENDING --limit--> ABORTED
//! PENDING ---------> RUNNING
//! RUNNING/RETRY --completed--------> COMPLETED
//! RUNNING/RETRY --limit------------> ABORTED
//! RUNNING/RETRY --attempts at max--> EXHAUSTED
//! RUNNING/RETRY -------------------> RETRY
//! ```

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Pending,
    Running,
    Retry,
    Completed,
    Aborted,
    Exhausted,
}

impl JobPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobPhase::Completed | JobPhase::Aborted | JobPhase::Exhausted
        )
    }
}

/// Attempt bookkeeping for one source. Discarded when the source ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobState {
    completed: bool,
    attempts: u32,
    failures: u32,
}

impl JobState {
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Start a new attempt and return its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    pub fn mark_completed(&mut self) {
        self.completed = true;
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }
}

/// Compute the next phase given the current one and a fresh limit reading.
///
/// `max_attempts = None` leaves retries unbounded. Terminal phases are sticky.
pub fn next_phase(
    current: JobPhase,
    state: &JobState,
    limit_reached: bool,
    max_attempts: Option<u32>,
) -> JobPhase {
    match current {
        JobPhase::Pending if limit_reached => JobPhase::Aborted,
        JobPhase::Pending => JobPhase::Running,
        JobPhase::Running | JobPhase::Retry => {
            if state.completed {
                JobPhase::Completed
            } else if limit_reached {
                JobPhase::Aborted
            } else if max_attempts.is_some_and(|max| state.attempts >= max) {
                JobPhase::Exhausted
            } else {
                JobPhase::Retry
            }
        }
        terminal => terminal,
    }
}
