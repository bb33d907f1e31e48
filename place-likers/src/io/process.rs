//! Child-process helper for the driver and reset commands.

use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Last `max_bytes` of stderr, for error messages.
    pub fn stderr_tail(&self, max_bytes: usize) -> String {
        let start = self.stderr.len().saturating_sub(max_bytes);
        String::from_utf8_lossy(&self.stderr[start..]).trim().to_string()
    }
}

/// Build a [`Command`] from an argv-style array.
pub fn command_from_argv(argv: &[String], workdir: Option<&Path>) -> Result<Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("empty command"))?;
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = workdir {
        cmd.current_dir(dir);
    }
    Ok(cmd)
}

/// Run a command with a timeout, feeding `stdin` and capturing bounded output.
///
/// stdout/stderr are drained on their own threads while the child runs, so a
/// chatty child cannot deadlock on a full pipe. Bytes past
/// `output_limit_bytes` are counted and dropped.
///
/// On unix the child leads its own process group, and a timeout kills the
/// whole group so wrapper scripts cannot outlive it holding the pipes.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!("spawning child process");
    let mut child = cmd.spawn().context("spawn command")?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        // A child that exits without reading its input is not our failure.
        if let Err(err) = child_stdin.write_all(input) {
            warn!(err = %err, "child closed stdin early");
        }
    }

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            timed_out = true;
            kill_process_tree(&mut child)?;
            child.wait().context("wait command after kill")?
        }
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;
    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

#[cfg(unix)]
fn kill_process_tree(child: &mut Child) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pgid = i32::try_from(child.id()).context("child pid out of range")?;
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(err) => Err(err).context("kill process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_tree(child: &mut Child) -> Result<()> {
    child.kill().context("kill command")
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        let keep = n.min(remaining);
        buf.extend_from_slice(&chunk[..keep]);
        truncated += n - keep;
    }

    Ok((buf, truncated))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let argv = vec!["sh".to_string(), "-c".to_string(), script.to_string()];
        command_from_argv(&argv, None).expect("command")
    }

    #[test]
    fn captures_stdout_and_feeds_stdin() {
        let output = run_command_with_timeout(
            sh("cat; echo done >&2"),
            Some(b"hello\n"),
            Duration::from_secs(10),
            1024,
        )
        .expect("run");
        assert!(output.status.success());
        assert_eq!(output.stdout, b"hello\n");
        assert_eq!(output.stderr_tail(100), "done");
        assert!(!output.timed_out);
    }

    #[test]
    fn truncates_output_beyond_limit() {
        let output =
            run_command_with_timeout(sh("printf 'abcdefgh'"), None, Duration::from_secs(10), 3)
                .expect("run");
        assert_eq!(output.stdout, b"abc");
        assert_eq!(output.stdout_truncated, 5);
    }

    #[test]
    fn kills_on_timeout() {
        let output =
            run_command_with_timeout(sh("exec sleep 5"), None, Duration::from_millis(100), 1024)
                .expect("run");
        assert!(output.timed_out);
        assert!(!output.status.success());
    }

    #[test]
    fn timeout_kills_grandchildren_holding_the_pipes() {
        let started = std::time::Instant::now();
        let output =
            run_command_with_timeout(sh("sleep 4; true"), None, Duration::from_millis(200), 1024)
                .expect("run");
        assert!(output.timed_out);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn empty_argv_is_rejected() {
        assert!(command_from_argv(&[], None).is_err());
    }
}
