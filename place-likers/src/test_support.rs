//! Test-only helpers: scripted work units, scripted recovery, temp accounts.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::policy::InteractionPolicy;
use crate::core::session::{Limits, SessionState};
use crate::core::types::InteractionOutcome;
use crate::io::config::{LikersConfig, write_config};
use crate::job::{
    AttemptContext, AttemptFailure, Recovery, RecoveryAction, UnrecoverableError, WorkUnit,
};

/// Generous ceilings so tests only trip the limits they aim at.
pub fn test_limits() -> Limits {
    Limits {
        likes: 10,
        follows: 10,
        watches: 10,
        comments: 10,
        successful_interactions: 50,
        total_interactions: 100,
        scraped: 10,
        crashes: 5,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedResult {
    Complete,
    Fail(String),
    Unrecoverable(String),
}

/// One scripted attempt: session effects first, then the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedAttempt {
    pub likes: u32,
    pub interactions: Vec<InteractionOutcome>,
    pub result: ScriptedResult,
}

impl ScriptedAttempt {
    pub fn complete() -> Self {
        Self {
            likes: 0,
            interactions: Vec::new(),
            result: ScriptedResult::Complete,
        }
    }

    pub fn fail(message: &str) -> Self {
        Self {
            result: ScriptedResult::Fail(message.to_string()),
            ..Self::complete()
        }
    }

    pub fn unrecoverable(message: &str) -> Self {
        Self {
            result: ScriptedResult::Unrecoverable(message.to_string()),
            ..Self::complete()
        }
    }

    /// Register `likes` through the policy's `on_like` callback during the attempt.
    pub fn with_likes(mut self, likes: u32) -> Self {
        self.likes = likes;
        self
    }

    pub fn with_interaction(mut self, outcome: InteractionOutcome) -> Self {
        self.interactions.push(outcome);
        self
    }
}

/// Work unit that replays scripted attempts per source.
///
/// A source with no script left completes immediately.
#[derive(Debug, Default)]
pub struct ScriptedWorkUnit {
    scripts: BTreeMap<String, VecDeque<ScriptedAttempt>>,
    /// `(source, attempt)` for every call, in order.
    pub calls: Vec<(String, u32)>,
    pub policies: Vec<InteractionPolicy>,
}

impl ScriptedWorkUnit {
    pub fn script(mut self, source: &str, attempts: Vec<ScriptedAttempt>) -> Self {
        self.scripts.insert(source.to_string(), attempts.into());
        self
    }

    pub fn attempts_for(&self, source: &str) -> usize {
        self.calls.iter().filter(|(called, _)| called == source).count()
    }
}

impl WorkUnit for ScriptedWorkUnit {
    fn run(&mut self, ctx: &mut AttemptContext<'_>) -> Result<()> {
        self.calls.push((ctx.source.to_string(), ctx.attempt));
        self.policies.push(ctx.policy.clone());
        let scripted = self
            .scripts
            .get_mut(ctx.source)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(ScriptedAttempt::complete);

        if scripted.likes > 0 {
            ctx.policy.on_like(ctx.session, scripted.likes);
        }
        for outcome in scripted.interactions {
            ctx.policy.on_interaction(ctx.session, ctx.limits, outcome);
        }

        match scripted.result {
            ScriptedResult::Complete => Ok(()),
            ScriptedResult::Fail(message) => Err(anyhow!(message)),
            ScriptedResult::Unrecoverable(reason) => Err(UnrecoverableError {
                place: ctx.source.to_string(),
                attempt: ctx.attempt,
                reason,
            }
            .into()),
        }
    }
}

/// Recovery that records each failure and replays queued actions
/// (defaulting to `Retry`).
#[derive(Debug, Default)]
pub struct ScriptedRecovery {
    actions: VecDeque<RecoveryAction>,
    pub recovered: Vec<(String, u32)>,
}

impl ScriptedRecovery {
    pub fn then(mut self, action: RecoveryAction) -> Self {
        self.actions.push_back(action);
        self
    }
}

impl Recovery for ScriptedRecovery {
    fn recover(
        &mut self,
        failure: &AttemptFailure<'_>,
        _session: &mut SessionState,
        _limits: &Limits,
    ) -> Result<RecoveryAction> {
        self.recovered
            .push((failure.source.to_string(), failure.attempt));
        Ok(self.actions.pop_front().unwrap_or(RecoveryAction::Retry))
    }
}

/// Temporary working directory holding a config file and account storage.
pub struct TestAccount {
    dir: TempDir,
}

impl TestAccount {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp dir")?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("place-likers.toml")
    }

    /// Config rooted in this directory for user `me`.
    pub fn config(&self) -> LikersConfig {
        LikersConfig {
            username: "me".to_string(),
            storage_dir: self.dir.path().join("accounts"),
            crash_dir: self.dir.path().join("crashes"),
            ..LikersConfig::default()
        }
    }

    pub fn write_config(&self, config: &LikersConfig) -> Result<PathBuf> {
        let path = self.config_path();
        write_config(&path, config)?;
        Ok(path)
    }
}
