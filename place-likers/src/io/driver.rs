//! Process-backed work unit: one driver invocation per attempt.
//!
//! The driver receives an [`AttemptRequest`] as JSON on stdin and reports what
//! it did as newline-delimited JSON events on stdout. The exit code tells the
//! controller how the attempt ended.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::core::policy::InteractionPolicy;
use crate::core::scroll_end::ScrollEndConfig;
use crate::core::session::Limits;
use crate::core::types::{InteractionOutcome, Mode};
use crate::io::config::DriverConfig;
use crate::io::process::{command_from_argv, run_command_with_timeout};
use crate::io::storage::{InteractionRecord, Storage};
use crate::job::{AttemptContext, UnrecoverableError, WorkUnit};

const STDERR_TAIL_BYTES: usize = 2000;

/// Input document written to the driver's stdin.
#[derive(Debug, Serialize)]
pub struct AttemptRequest<'a> {
    pub source: &'a str,
    pub mode: Mode,
    pub attempt: u32,
    pub session_id: &'a str,
    pub policy: &'a InteractionPolicy,
    pub follow_limit: Option<u32>,
    /// Following is already exhausted for this source.
    pub follow_limit_reached: bool,
    pub scroll_end: &'a ScrollEndConfig,
    pub limits: &'a Limits,
    pub storage_dir: &'a Path,
    /// Never unfollowed.
    pub whitelist: &'a [String],
    /// Never interacted with.
    pub blacklist: &'a [String],
    /// Interacted with in the last three days; skipped this attempt.
    pub recently_interacted: Vec<&'a str>,
}

/// One line of driver stdout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DriverEvent {
    Like {
        count: u32,
    },
    Watch {
        count: u32,
    },
    Interaction {
        username: String,
        #[serde(default)]
        succeeded: bool,
        #[serde(default)]
        followed: bool,
        #[serde(default)]
        scraped: bool,
        #[serde(default)]
        commented: bool,
        #[serde(default)]
        liked: u32,
        #[serde(default)]
        watched: u32,
    },
}

/// Parse driver stdout, skipping lines that are not events.
pub fn parse_events(stdout: &[u8]) -> Vec<DriverEvent> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(event) => Some(event),
            Err(err) => {
                warn!(err = %err, line, "ignoring unparseable driver output");
                None
            }
        })
        .collect()
}

pub struct DriverWorkUnit {
    config: DriverConfig,
    storage: Storage,
}

impl DriverWorkUnit {
    pub fn new(config: DriverConfig, storage: Storage) -> Self {
        Self { config, storage }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Apply events to the session and storage.
    ///
    /// Every event reaches the session even when persisting an interaction
    /// fails; those failures are logged and the attempt result is left alone.
    fn apply_events(&mut self, ctx: &mut AttemptContext<'_>, events: Vec<DriverEvent>) {
        let mut ended = false;
        for event in events {
            match event {
                DriverEvent::Like { count } => ctx.policy.on_like(ctx.session, count),
                DriverEvent::Watch { count } => ctx.policy.on_watch(ctx.session, count),
                DriverEvent::Interaction {
                    username,
                    succeeded,
                    followed,
                    scraped,
                    commented,
                    liked,
                    watched,
                } => {
                    let outcome = InteractionOutcome {
                        succeeded,
                        followed,
                        scraped,
                        commented,
                    };
                    let record = InteractionRecord {
                        session_id: &ctx.session.id,
                        job_name: Some(ctx.policy.mode.label()),
                        target: Some(ctx.source),
                        followed,
                        unfollowed: false,
                        scraped,
                        liked,
                        watched,
                        commented: u32::from(commented),
                    };
                    if let Err(err) = self.storage.add_interacted_user(&username, &record) {
                        warn!(
                            username = %username,
                            err = %format!("{err:#}"),
                            "could not store interaction"
                        );
                    }
                    if !ctx.policy.on_interaction(ctx.session, ctx.limits, outcome) && !ended {
                        ended = true;
                        info!(source = ctx.source, "interaction policy ended the source");
                    }
                }
            }
        }
    }
}

impl WorkUnit for DriverWorkUnit {
    #[instrument(skip_all, fields(source = ctx.source, attempt = ctx.attempt))]
    fn run(&mut self, ctx: &mut AttemptContext<'_>) -> Result<()> {
        let request = AttemptRequest {
            source: ctx.source,
            mode: ctx.policy.mode,
            attempt: ctx.attempt,
            session_id: &ctx.session.id,
            policy: ctx.policy,
            follow_limit: ctx.follow_limit.ceiling,
            follow_limit_reached: ctx.follow_limit.is_reached(ctx.session),
            scroll_end: ctx.scroll_end,
            limits: ctx.limits,
            storage_dir: self.storage.dir(),
            whitelist: self.storage.whitelist(),
            blacklist: self.storage.blacklist(),
            recently_interacted: self
                .storage
                .recently_interacted(Local::now().naive_local()),
        };
        let input = serde_json::to_vec(&request).context("serialize attempt request")?;

        let cmd = command_from_argv(&self.config.command, None).context("build driver command")?;
        let output = run_command_with_timeout(
            cmd,
            Some(&input),
            Duration::from_secs(self.config.attempt_timeout_secs),
            self.config.output_limit_bytes,
        )
        .context("run driver")?;

        // Work the driver reported before failing still counts toward the session.
        let events = parse_events(&output.stdout);
        debug!(events = events.len(), "driver events");
        self.apply_events(ctx, events);

        if output.timed_out {
            return Err(anyhow!(
                "driver timed out after {}s",
                self.config.attempt_timeout_secs
            ));
        }
        match output.status.code() {
            Some(0) => Ok(()),
            Some(code) if code == self.config.unrecoverable_exit_code => Err(UnrecoverableError {
                place: ctx.source.to_string(),
                attempt: ctx.attempt,
                reason: output.stderr_tail(STDERR_TAIL_BYTES),
            }
            .into()),
            code => Err(anyhow!(
                "driver exited with {code:?}: {}",
                output.stderr_tail(STDERR_TAIL_BYTES)
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::policy::{FollowLimit, PolicySettings, build_interaction_policy};
    use crate::core::session::{LimitKind, SessionState};
    use crate::test_support::test_limits;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn parses_known_events_and_skips_noise() {
        let stdout = br#"{"event":"like","count":2}
starting device
{"event":"interaction","username":"alice","succeeded":true,"followed":true}

{"event":"watch","count":1}
"#;
        let events = parse_events(stdout);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], DriverEvent::Like { count: 2 });
        assert!(matches!(
            &events[1],
            DriverEvent::Interaction { username, followed: true, scraped: false, .. }
                if username == "alice"
        ));
    }

    #[cfg(unix)]
    struct Fixture {
        temp: tempfile::TempDir,
        policy: InteractionPolicy,
        follow_limit: FollowLimit,
        scroll_end: ScrollEndConfig,
        limits: Limits,
        unit: DriverWorkUnit,
    }

    #[cfg(unix)]
    fn fixture(script: &str) -> Fixture {
        fixture_with(script, |_| {})
    }

    /// `prepare` receives the account directory before storage is opened.
    #[cfg(unix)]
    fn fixture_with(script: &str, prepare: impl FnOnce(&Path)) -> Fixture {
        let temp = tempfile::tempdir().expect("tempdir");
        let account_dir = temp.path().join("me");
        std::fs::create_dir_all(&account_dir).expect("account dir");
        prepare(&account_dir);
        let storage = Storage::open(temp.path(), "me").expect("storage");
        let config = DriverConfig {
            command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            attempt_timeout_secs: 10,
            ..DriverConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(0);
        Fixture {
            policy: build_interaction_policy(
                "CafeA",
                Mode::PlaceLikersTop,
                "me",
                &PolicySettings::default(),
                &mut rng,
            ),
            follow_limit: FollowLimit::for_source(Some(3), "CafeA"),
            scroll_end: ScrollEndConfig::resolve(None, None, &mut rng),
            limits: test_limits(),
            unit: DriverWorkUnit::new(config, storage),
            temp,
        }
    }

    #[cfg(unix)]
    fn attempt(fixture: &mut Fixture, session: &mut SessionState) -> Result<()> {
        let mut ctx = AttemptContext {
            source: "CafeA",
            attempt: 1,
            policy: &fixture.policy,
            follow_limit: &fixture.follow_limit,
            scroll_end: &fixture.scroll_end,
            limits: &fixture.limits,
            session,
        };
        fixture.unit.run(&mut ctx)
    }

    #[cfg(unix)]
    #[test]
    fn successful_driver_updates_session_and_storage() {
        let mut fixture = fixture(
            r#"cat > /dev/null
echo '{"event":"like","count":2}'
echo '{"event":"interaction","username":"alice","succeeded":true,"followed":true,"liked":2}'"#,
        );
        let mut session = SessionState::new("s1", "me");

        attempt(&mut fixture, &mut session).expect("attempt");

        assert_eq!(session.count(LimitKind::Likes), 2);
        assert_eq!(session.followed_from("CafeA"), 1);
        let user = fixture.unit.storage().user("alice").expect("stored");
        assert_eq!(user.liked, 2);
        assert_eq!(user.job_name.as_deref(), Some("place-likers-top"));
    }

    #[cfg(unix)]
    #[test]
    fn driver_receives_the_attempt_request() {
        let mut fixture = fixture(
            r#"input=$(cat)
case "$input" in
  *'"source":"CafeA"'*'"follow_limit":3'*) exit 0 ;;
esac
exit 1"#,
        );
        let mut session = SessionState::new("s1", "me");
        attempt(&mut fixture, &mut session).expect("request names source and follow limit");
    }

    #[cfg(unix)]
    #[test]
    fn request_carries_skip_lists() {
        let mut fixture = fixture_with(
            r#"input=$(cat)
case "$input" in
  *'"blacklist":["spammer"]'*'"recently_interacted":["alice"]'*) exit 0 ;;
esac
exit 1"#,
            |dir| std::fs::write(dir.join("blacklist.txt"), "spammer\n").expect("blacklist"),
        );
        let record = InteractionRecord {
            session_id: "earlier",
            ..InteractionRecord::default()
        };
        fixture
            .unit
            .storage
            .add_interacted_user("alice", &record)
            .expect("store alice");
        let mut session = SessionState::new("s1", "me");

        attempt(&mut fixture, &mut session).expect("request lists blacklist and alice");
    }

    #[cfg(unix)]
    #[test]
    fn storage_failure_keeps_a_completed_attempt_completed() {
        let mut fixture = fixture(
            r#"cat > /dev/null
echo '{"event":"interaction","username":"alice","succeeded":true,"followed":true}'
echo '{"event":"interaction","username":"bob","succeeded":true,"followed":true}'"#,
        );
        let account_dir = fixture.temp.path().join("me");
        std::fs::remove_dir_all(&account_dir).expect("remove account dir");
        std::fs::write(&account_dir, "not a directory").expect("block account dir");
        let mut session = SessionState::new("s1", "me");

        attempt(&mut fixture, &mut session).expect("attempt stays completed");

        assert_eq!(session.followed_from("CafeA"), 2);
        assert!(fixture.unit.storage().user("bob").is_some());
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_a_recoverable_failure_that_keeps_events() {
        let mut fixture = fixture(
            r#"cat > /dev/null
echo '{"event":"like","count":1}'
echo 'device disconnected' >&2
exit 1"#,
        );
        let mut session = SessionState::new("s1", "me");

        let err = attempt(&mut fixture, &mut session).unwrap_err();

        assert!(err.downcast_ref::<UnrecoverableError>().is_none());
        assert!(format!("{err:#}").contains("device disconnected"));
        assert_eq!(session.count(LimitKind::Likes), 1);
    }

    #[cfg(unix)]
    #[test]
    fn unrecoverable_exit_code_is_typed() {
        let mut fixture = fixture("cat > /dev/null; echo 'account banned' >&2; exit 3");
        let mut session = SessionState::new("s1", "me");

        let err = attempt(&mut fixture, &mut session).unwrap_err();

        let unrecoverable = err
            .downcast_ref::<UnrecoverableError>()
            .expect("unrecoverable error");
        assert_eq!(unrecoverable.reason, "account banned");
        assert_eq!(unrecoverable.place, "CafeA");
    }
}
