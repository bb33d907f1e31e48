//! Source loop for `place-likers run`: one job per sampled place, in order.

use anyhow::Result;
use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};

use crate::core::policy::{FollowLimit, InteractionPolicy, build_interaction_policy};
use crate::core::sampling::{sample_sources, sources_for_mode};
use crate::core::scroll_end::ScrollEndConfig;
use crate::core::session::{LimitKind, LimitScope, Limits, SessionState};
use crate::core::types::Mode;
use crate::io::config::LikersConfig;
use crate::job::{Job, JobEnd, JobOutcome, Recovery, WorkUnit, run_job};

/// Why `run_sources` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStop {
    /// Every planned source was handled (completed or given up on).
    Completed,
    /// A session limit was reached while handling `source`.
    LimitReached {
        source: String,
        limits: Vec<LimitKind>,
    },
}

/// Summary of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub mode: Mode,
    pub jobs: Vec<JobOutcome>,
    pub stop: RunStop,
}

impl RunOutcome {
    pub fn total_attempts(&self) -> u32 {
        self.jobs.iter().map(|job| job.attempts).sum()
    }
}

/// Places to handle this session for `mode`, sampled per `truncate_sources`.
///
/// Fails before anything touches the device when no place is configured.
pub fn plan_sources<R: Rng + ?Sized>(
    mode: Mode,
    config: &LikersConfig,
    rng: &mut R,
) -> Result<Vec<String>> {
    let configured = sources_for_mode(
        mode,
        &config.place_likers_top,
        &config.place_likers_recent,
    )?;
    let sources = sample_sources(configured, config.truncate_sources, rng);
    info!(
        %mode,
        configured = configured.len(),
        planned = sources.len(),
        places = %sources.join(", "),
        "sources planned"
    );
    Ok(sources)
}

/// Per-source parameters, resolved once before the first attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreparedSource {
    pub policy: InteractionPolicy,
    pub follow_limit: FollowLimit,
    pub scroll_end: ScrollEndConfig,
}

/// Build the policy, follow limit and scroll thresholds for `source`.
pub fn prepare_source<R: Rng + ?Sized>(
    mode: Mode,
    source: &str,
    my_username: &str,
    config: &LikersConfig,
    rng: &mut R,
) -> PreparedSource {
    let policy = build_interaction_policy(source, mode, my_username, &config.interaction, rng);
    let follow_limit = FollowLimit::for_source(config.follow_limit, source);
    let scroll_end =
        ScrollEndConfig::resolve(config.skipped_list_limit, config.fling_when_skipped, rng);
    PreparedSource {
        policy,
        follow_limit,
        scroll_end,
    }
}

/// Fixed inputs of one run.
#[derive(Debug, Clone, Copy)]
pub struct RunPlan<'a> {
    pub mode: Mode,
    pub sources: &'a [String],
    pub config: &'a LikersConfig,
    pub limits: &'a Limits,
}

/// Handle the planned sources in order until all are done or a session limit
/// stops the run.
///
/// Each source gets its own interaction policy, follow limit and scroll
/// thresholds, built once and shared by all of its attempts. Sources whose
/// attempt bound runs out are skipped; an unrecoverable failure is returned as
/// `Err` and ends the run.
pub fn run_sources<W, C, R, F>(
    plan: &RunPlan<'_>,
    session: &mut SessionState,
    work_unit: &mut W,
    recovery: &mut C,
    rng: &mut R,
    mut on_job: F,
) -> Result<RunOutcome>
where
    W: WorkUnit,
    C: Recovery,
    R: Rng + ?Sized,
    F: FnMut(&JobOutcome),
{
    let RunPlan {
        mode,
        sources,
        config,
        limits,
    } = *plan;
    let mut jobs = Vec::with_capacity(sources.len());

    for source in sources {
        info!(source = %source, "Handle {source}");
        let prepared = prepare_source(mode, source, &session.my_username, config, rng);
        let job = Job {
            source,
            policy: &prepared.policy,
            follow_limit: &prepared.follow_limit,
            scroll_end: &prepared.scroll_end,
            limits,
            max_attempts: config.max_attempts(),
        };

        let outcome = run_job(&job, session, work_unit, recovery)?;
        on_job(&outcome);
        let end = outcome.end;
        jobs.push(outcome);

        match end {
            JobEnd::Completed => {}
            JobEnd::AttemptsExhausted => {
                warn!(source = %source, "moving on to the next source");
            }
            JobEnd::LimitReached => {
                info!("session limit reached, stopping");
                session.check_limit_verbose(limits, LimitScope::All);
                return Ok(RunOutcome {
                    mode,
                    jobs,
                    stop: RunStop::LimitReached {
                        source: source.clone(),
                        limits: session.reached_limits(limits, LimitScope::All),
                    },
                });
            }
        }
    }

    Ok(RunOutcome {
        mode,
        jobs,
        stop: RunStop::Completed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value_range::ValueRange;
    use crate::job::UnrecoverableError;
    use crate::test_support::{ScriptedAttempt, ScriptedRecovery, ScriptedWorkUnit, test_limits};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn places(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn run(
        sources: &[String],
        limits: &Limits,
        session: &mut SessionState,
        unit: &mut ScriptedWorkUnit,
    ) -> Result<RunOutcome> {
        let config = LikersConfig {
            username: "me".to_string(),
            ..LikersConfig::default()
        };
        let plan = RunPlan {
            mode: Mode::PlaceLikersTop,
            sources,
            config: &config,
            limits,
        };
        run_sources(
            &plan,
            session,
            unit,
            &mut ScriptedRecovery::default(),
            &mut StdRng::seed_from_u64(1),
            |_| {},
        )
    }

    #[test]
    fn plan_rejects_missing_places_for_mode() {
        let config = LikersConfig {
            place_likers_top: places(&["CafeA"]),
            ..LikersConfig::default()
        };
        let err = plan_sources(
            Mode::PlaceLikersRecent,
            &config,
            &mut StdRng::seed_from_u64(0),
        )
        .unwrap_err();
        assert!(err.to_string().contains("no places configured"));
    }

    #[test]
    fn plan_honours_truncation() {
        let config = LikersConfig {
            place_likers_recent: places(&["a", "b", "c", "d"]),
            truncate_sources: Some(ValueRange::Fixed(2)),
            ..LikersConfig::default()
        };
        let planned = plan_sources(
            Mode::PlaceLikersRecent,
            &config,
            &mut StdRng::seed_from_u64(0),
        )
        .expect("plan");
        assert_eq!(planned.len(), 2);
    }

    #[test]
    fn handles_every_source_in_order() {
        let sources = places(&["CafeA", "CafeB"]);
        let mut session = SessionState::new("s", "me");
        let mut unit = ScriptedWorkUnit::default().script(
            "CafeB",
            vec![
                ScriptedAttempt::fail("lost"),
                ScriptedAttempt::fail("lost"),
                ScriptedAttempt::complete(),
            ],
        );

        let outcome = run(&sources, &test_limits(), &mut session, &mut unit).expect("run");

        assert_eq!(outcome.stop, RunStop::Completed);
        assert_eq!(outcome.total_attempts(), 4);
        assert_eq!(unit.attempts_for("CafeA"), 1);
        assert_eq!(unit.attempts_for("CafeB"), 3);
        assert!(outcome.jobs.iter().all(|job| job.end == JobEnd::Completed));
    }

    #[test]
    fn limit_after_first_source_skips_the_rest() {
        let sources = places(&["CafeA", "CafeB", "CafeC"]);
        let limits = test_limits();
        let mut session = SessionState::new("s", "me");
        let mut unit = ScriptedWorkUnit::default().script(
            "CafeA",
            vec![ScriptedAttempt::complete().with_likes(limits.likes)],
        );

        let outcome = run(&sources, &limits, &mut session, &mut unit).expect("run");

        assert_eq!(unit.attempts_for("CafeA"), 1);
        assert_eq!(unit.attempts_for("CafeB"), 0);
        assert_eq!(unit.attempts_for("CafeC"), 0);
        assert_eq!(
            outcome.stop,
            RunStop::LimitReached {
                source: "CafeB".to_string(),
                limits: vec![LimitKind::Likes],
            }
        );
    }

    #[test]
    fn policy_is_built_per_source() {
        let sources = places(&["CafeA", "CafeB"]);
        let mut session = SessionState::new("s", "me");
        let mut unit = ScriptedWorkUnit::default();

        run(&sources, &test_limits(), &mut session, &mut unit).expect("run");

        let seen: Vec<&str> = unit
            .policies
            .iter()
            .map(|policy| policy.source.as_str())
            .collect();
        assert_eq!(seen, vec!["CafeA", "CafeB"]);
        assert!(unit.policies.iter().all(|policy| policy.my_username == "me"));
    }

    #[test]
    fn exhausted_source_moves_on() {
        let sources = places(&["CafeA", "CafeB"]);
        let mut session = SessionState::new("s", "me");
        let mut unit = ScriptedWorkUnit::default().script(
            "CafeA",
            (0..10).map(|_| ScriptedAttempt::fail("broken")).collect(),
        );

        let outcome = run(&sources, &test_limits(), &mut session, &mut unit).expect("run");

        assert_eq!(outcome.jobs[0].end, JobEnd::AttemptsExhausted);
        assert_eq!(outcome.jobs[0].attempts, 5);
        assert_eq!(outcome.jobs[1].end, JobEnd::Completed);
        assert_eq!(outcome.stop, RunStop::Completed);
    }

    #[test]
    fn unrecoverable_failure_ends_the_run() {
        let sources = places(&["CafeA", "CafeB"]);
        let mut session = SessionState::new("s", "me");
        let mut unit = ScriptedWorkUnit::default()
            .script("CafeA", vec![ScriptedAttempt::unrecoverable("banned")]);

        let err = run(&sources, &test_limits(), &mut session, &mut unit).unwrap_err();

        assert!(err.downcast_ref::<UnrecoverableError>().is_some());
        assert_eq!(unit.attempts_for("CafeB"), 0);
    }
}
