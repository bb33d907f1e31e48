//! Resilient execution of one source: attempt, recover, re-check, retry.
//!
//! The controller holds a single cross-attempt signal, the completion flag.
//! The work unit is expected to remember its own scroll position between
//! attempts at the same source, so a retry resumes instead of restarting.

use std::fmt;

use anyhow::{Error, Result};
use tracing::{debug, info, warn};

use crate::core::job_state::{JobPhase, JobState, next_phase};
use crate::core::policy::{FollowLimit, InteractionPolicy};
use crate::core::scroll_end::ScrollEndConfig;
use crate::core::session::{LimitScope, Limits, SessionState};

/// Everything that stays fixed across the attempts at one source.
#[derive(Debug, Clone, Copy)]
pub struct Job<'a> {
    pub source: &'a str,
    pub policy: &'a InteractionPolicy,
    pub follow_limit: &'a FollowLimit,
    pub scroll_end: &'a ScrollEndConfig,
    pub limits: &'a Limits,
    /// `None` retries until completion or a limit.
    pub max_attempts: Option<u32>,
}

/// What a work unit sees during one attempt.
pub struct AttemptContext<'a> {
    pub source: &'a str,
    pub attempt: u32,
    pub policy: &'a InteractionPolicy,
    pub follow_limit: &'a FollowLimit,
    pub scroll_end: &'a ScrollEndConfig,
    pub limits: &'a Limits,
    pub session: &'a mut SessionState,
}

/// One pass of enumerating a source's likers and interacting with them.
///
/// Returns `Ok` whenever the pass ran to its end, regardless of per-liker
/// results. Any `Err` is a failed attempt; wrap it in [`UnrecoverableError`]
/// to stop the whole run instead of retrying.
pub trait WorkUnit {
    fn run(&mut self, ctx: &mut AttemptContext<'_>) -> Result<()>;
}

/// A failed attempt handed to [`Recovery`].
#[derive(Debug)]
pub struct AttemptFailure<'a> {
    pub source: &'a str,
    pub attempt: u32,
    pub error: &'a Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Device state restored; the attempt may be retried.
    Retry,
    /// Nothing left to try; stop the run.
    Abort { reason: String },
}

/// Recovery step run after every failed attempt (device reset, diagnostics).
pub trait Recovery {
    fn recover(
        &mut self,
        failure: &AttemptFailure<'_>,
        session: &mut SessionState,
        limits: &Limits,
    ) -> Result<RecoveryAction>;
}

/// Failure that must end the run rather than be retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnrecoverableError {
    pub place: String,
    pub attempt: u32,
    pub reason: String,
}

impl fmt::Display for UnrecoverableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unrecoverable failure at {} (attempt {}): {}",
            self.place, self.attempt, self.reason
        )
    }
}

impl std::error::Error for UnrecoverableError {}

/// How a source's job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEnd {
    Completed,
    /// A session limit was reached; the run must stop.
    LimitReached,
    /// The attempt bound ran out before the work unit completed.
    AttemptsExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub source: String,
    pub attempts: u32,
    pub failures: u32,
    pub end: JobEnd,
}

/// Run `work_unit` for one source until it completes, a limit is reached, or
/// the attempt bound runs out.
///
/// The limit is read before the first attempt and after each attempt; an
/// attempt in flight is never interrupted. Recovered failures are swallowed.
/// An [`UnrecoverableError`], from the work unit or from a recovery that
/// gives up, is returned as `Err`.
pub fn run_job<W: WorkUnit, R: Recovery>(
    job: &Job<'_>,
    session: &mut SessionState,
    work_unit: &mut W,
    recovery: &mut R,
) -> Result<JobOutcome> {
    let mut state = JobState::default();
    let mut phase = next_phase(
        JobPhase::Pending,
        &state,
        session.check_limit(job.limits, LimitScope::All),
        job.max_attempts,
    );

    while !phase.is_terminal() {
        let attempt = state.begin_attempt();
        debug!(source = job.source, attempt, ?phase, "starting attempt");

        let result = {
            let mut ctx = AttemptContext {
                source: job.source,
                attempt,
                policy: job.policy,
                follow_limit: job.follow_limit,
                scroll_end: job.scroll_end,
                limits: job.limits,
                session: &mut *session,
            };
            work_unit.run(&mut ctx)
        };

        match result {
            Ok(()) => state.mark_completed(),
            Err(err) => {
                if err.downcast_ref::<UnrecoverableError>().is_some() {
                    return Err(err);
                }
                state.record_failure();
                warn!(source = job.source, attempt, err = %format!("{err:#}"), "attempt failed");
                let failure = AttemptFailure {
                    source: job.source,
                    attempt,
                    error: &err,
                };
                if let RecoveryAction::Abort { reason } =
                    recovery.recover(&failure, session, job.limits)?
                {
                    return Err(UnrecoverableError {
                        place: job.source.to_string(),
                        attempt,
                        reason,
                    }
                    .into());
                }
            }
        }

        let limit_reached = session.check_limit(job.limits, LimitScope::All);
        phase = next_phase(phase, &state, limit_reached, job.max_attempts);
        if phase == JobPhase::Retry {
            info!(source = job.source, attempt, "source not finished, retrying");
        }
    }

    let end = match phase {
        JobPhase::Completed => JobEnd::Completed,
        JobPhase::Exhausted => {
            warn!(
                source = job.source,
                attempts = state.attempts(),
                "giving up on source after too many failed attempts"
            );
            JobEnd::AttemptsExhausted
        }
        _ => JobEnd::LimitReached,
    };
    Ok(JobOutcome {
        source: job.source.to_string(),
        attempts: state.attempts(),
        failures: state.failures(),
        end,
    })
}
