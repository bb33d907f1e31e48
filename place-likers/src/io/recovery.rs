//! Crash recovery between attempts: report, count, reset the device.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{info, warn};

use crate::core::session::{LimitKind, LimitScope, Limits, SessionState};
use crate::io::process::{command_from_argv, run_command_with_timeout};
use crate::job::{AttemptFailure, Recovery, RecoveryAction};

const RESET_TIMEOUT: Duration = Duration::from_secs(120);
const RESET_OUTPUT_LIMIT_BYTES: usize = 64 * 1024;

pub struct CrashRecovery {
    crash_dir: PathBuf,
    reset_command: Vec<String>,
}

impl CrashRecovery {
    pub fn new(crash_dir: PathBuf, reset_command: Vec<String>) -> Self {
        Self {
            crash_dir,
            reset_command,
        }
    }

    /// `<crash_dir>/<session>/<source>-<attempt>.log`
    pub fn report_path(&self, session_id: &str, failure: &AttemptFailure<'_>) -> PathBuf {
        self.crash_dir
            .join(sanitize(session_id))
            .join(format!("{}-{}.log", sanitize(failure.source), failure.attempt))
    }

    fn write_report(
        &self,
        session: &SessionState,
        failure: &AttemptFailure<'_>,
    ) -> Result<PathBuf> {
        let path = self.report_path(&session.id, failure);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let report = format!(
            "time: {}\nsession: {}\naccount: {}\nsource: {}\nattempt: {}\nerror: {:#}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            session.id,
            session.my_username,
            failure.source,
            failure.attempt,
            failure.error,
        );
        fs::write(&path, report).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    fn reset_device(&self) {
        if self.reset_command.is_empty() {
            return;
        }
        let result = command_from_argv(&self.reset_command, None).and_then(|cmd| {
            run_command_with_timeout(cmd, None, RESET_TIMEOUT, RESET_OUTPUT_LIMIT_BYTES)
        });
        match result {
            Ok(output) if output.status.success() => info!("device reset"),
            Ok(output) => warn!(
                exit_code = ?output.status.code(),
                timed_out = output.timed_out,
                stderr = %output.stderr_tail(500),
                "reset command failed"
            ),
            Err(err) => warn!(err = %format!("{err:#}"), "reset command failed"),
        }
    }
}

impl Recovery for CrashRecovery {
    fn recover(
        &mut self,
        failure: &AttemptFailure<'_>,
        session: &mut SessionState,
        limits: &Limits,
    ) -> Result<RecoveryAction> {
        session.add_crash();
        match self.write_report(session, failure) {
            Ok(report) => info!(
                report = %report.display(),
                crashes = session.count(LimitKind::Crashes),
                "crash report saved"
            ),
            Err(err) => warn!(
                err = %format!("{err:#}"),
                crashes = session.count(LimitKind::Crashes),
                "could not save crash report"
            ),
        }

        if session.check_limit(limits, LimitScope::Only(LimitKind::Crashes)) {
            return Ok(RecoveryAction::Abort {
                reason: format!(
                    "reached crash limit ({})",
                    limits.ceiling(LimitKind::Crashes)
                ),
            });
        }

        self.reset_device();
        Ok(RecoveryAction::Retry)
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
