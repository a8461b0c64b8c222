//! Process execution helpers for docship.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::UtilError;

/// Upper bound on captured output kept for diagnostics; older output is dropped.
pub const MAX_CAPTURED_OUTPUT: usize = 64 * 1024;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Structured output from a command execution.
#[derive(Debug)]
pub struct CommandOutput {
    /// Standard output as a string.
    pub stdout: String,
    /// Standard error as a string.
    pub stderr: String,
    /// Whether the command exited successfully.
    pub success: bool,
    /// The exit code, if the process was not killed by a signal.
    pub exit_code: Option<i32>,
}

/// How a time-bounded process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The process exited on its own.
    Exited {
        success: bool,
        exit_code: Option<i32>,
    },
    /// The process was still running at its deadline and was killed.
    TimedOut,
}

/// Output of [`run_with_timeout`].
#[derive(Debug)]
pub struct BoundedOutput {
    /// Interleaved stdout and stderr, tail-truncated to [`MAX_CAPTURED_OUTPUT`].
    pub output: String,
    pub termination: Termination,
    pub elapsed: Duration,
}

impl BoundedOutput {
    /// Whether the process exited on its own with status zero.
    pub fn success(&self) -> bool {
        matches!(self.termination, Termination::Exited { success: true, .. })
    }
}

/// Execute a command and capture its output.
///
/// Stdin is closed so a command waiting for input fails instead of hanging.
///
/// # Errors
/// Returns an error if the command cannot be spawned (e.g. binary not found).
/// A non-zero exit code is **not** an error; check `CommandOutput::success` instead.
pub fn run_command(cmd: &mut Command) -> Result<CommandOutput, UtilError> {
    debug!(command = ?cmd, "running");
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(|source| UtilError::CommandExec {
            command: describe(cmd),
            source,
        })?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        success: output.status.success(),
        exit_code: output.status.code(),
    })
}

/// Execute a command, killing it if it runs longer than `timeout`.
///
/// Stdout and stderr share one capture file so their output stays interleaved
/// in the order it was written. On Unix the child is placed in its own process
/// group and the whole group is killed on timeout, so processes started by a
/// shell wrapper do not outlive the deadline.
///
/// # Errors
/// Returns an error if the capture file cannot be created, the command cannot
/// be spawned, or waiting on it fails. Non-zero exit and timeout are reported
/// through [`BoundedOutput::termination`], not as errors.
pub fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<BoundedOutput, UtilError> {
    let capture_error = |source: std::io::Error| UtilError::Io {
        path: "<output capture>".to_owned(),
        source,
    };
    let mut capture = tempfile::tempfile().map_err(capture_error)?;
    let stdout = capture.try_clone().map_err(capture_error)?;
    let stderr = capture.try_clone().map_err(capture_error)?;

    cmd.stdin(Stdio::null()).stdout(stdout).stderr(stderr);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!(command = ?cmd, timeout_secs = timeout.as_secs(), "running with timeout");
    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|source| UtilError::CommandExec {
        command: describe(cmd),
        source,
    })?;

    let termination = loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                break Termination::Exited {
                    success: status.success(),
                    exit_code: status.code(),
                }
            }
            Ok(None) => {}
            Err(source) => {
                terminate(&mut child);
                return Err(UtilError::CommandExec {
                    command: describe(cmd),
                    source,
                });
            }
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            terminate(&mut child);
            break Termination::TimedOut;
        }
        std::thread::sleep(POLL_INTERVAL.min(timeout.saturating_sub(elapsed)));
    };
    let elapsed = start.elapsed();

    let raw = read_tail(&mut capture, MAX_CAPTURED_OUTPUT).map_err(capture_error)?;

    Ok(BoundedOutput {
        output: truncate_tail(&String::from_utf8_lossy(&raw), MAX_CAPTURED_OUTPUT),
        termination,
        elapsed,
    })
}

/// Read at most the last `max` bytes of `file`.
fn read_tail(file: &mut File, max: usize) -> std::io::Result<Vec<u8>> {
    let len = file.seek(SeekFrom::End(0))?;
    let start = len.saturating_sub(u64::try_from(max).unwrap_or(u64::MAX));
    file.seek(SeekFrom::Start(start))?;
    let mut raw = Vec::new();
    file.read_to_end(&mut raw)?;
    Ok(raw)
}

/// Keep at most the last `max` bytes of `text`, cut at a char boundary.
pub fn truncate_tail(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_owned();
    }
    let start = text.len().saturating_sub(max);
    let boundary = text
        .char_indices()
        .map(|(i, _)| i)
        .find(|&i| i >= start)
        .unwrap_or(text.len());
    text.get(boundary..).unwrap_or_default().to_owned()
}

fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Ok(pid) = i32::try_from(child.id()) {
            let _ = killpg(Pid::from_raw(pid), Signal::SIGKILL);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn describe(cmd: &Command) -> String {
    cmd.get_program().to_string_lossy().into_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn run_command_success() {
        let output = run_command(Command::new("echo").arg("hello")).unwrap();
        assert!(output.success);
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.exit_code, Some(0));
    }

    #[test]
    fn run_command_failure() {
        let output = run_command(&mut Command::new("false")).unwrap();
        assert!(!output.success);
        assert_ne!(output.exit_code, Some(0));
    }

    #[test]
    fn run_command_missing_binary() {
        let err = run_command(&mut Command::new("nonexistent_binary_xyz_123")).unwrap_err();
        assert!(err.to_string().contains("nonexistent_binary_xyz_123"));
    }

    #[test]
    fn run_command_captures_stderr() {
        let output = run_command(Command::new("sh").arg("-c").arg("echo err >&2")).unwrap();
        assert!(output.stderr.contains("err"));
    }

    #[test]
    fn bounded_success_captures_interleaved_output() {
        let result = run_with_timeout(
            Command::new("sh")
                .arg("-c")
                .arg("echo one; echo two >&2; echo three"),
            Duration::from_secs(10),
        )
        .unwrap();
        assert!(result.success());
        assert_eq!(result.output, "one\ntwo\nthree\n");
    }

    #[test]
    fn bounded_non_zero_exit_is_not_timeout() {
        let result = run_with_timeout(
            Command::new("sh").arg("-c").arg("echo failing; exit 3"),
            Duration::from_secs(10),
        )
        .unwrap();
        assert!(!result.success());
        assert_eq!(
            result.termination,
            Termination::Exited {
                success: false,
                exit_code: Some(3)
            }
        );
        assert!(result.output.contains("failing"));
    }

    #[test]
    fn bounded_timeout_kills_process() {
        let result = run_with_timeout(
            Command::new("sh").arg("-c").arg("echo started; sleep 30"),
            Duration::from_millis(200),
        )
        .unwrap();
        assert_eq!(result.termination, Termination::TimedOut);
        assert!(result.elapsed < Duration::from_secs(10));
        assert!(result.output.contains("started"));
    }

    #[cfg(unix)]
    #[test]
    fn bounded_timeout_kills_grandchildren() {
        let tmp = tempfile::tempdir().unwrap();
        let marker = tmp.path().join("survived");
        let script = format!("(sleep 1; touch {}) & wait", marker.display());
        let result = run_with_timeout(
            Command::new("sh").arg("-c").arg(script),
            Duration::from_millis(100),
        )
        .unwrap();
        assert_eq!(result.termination, Termination::TimedOut);

        std::thread::sleep(Duration::from_millis(1500));
        assert!(!marker.exists(), "background process outlived the timeout");
    }

    #[test]
    fn bounded_runs_in_working_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let result = run_with_timeout(
            Command::new("sh")
                .arg("-c")
                .arg("mkdir build && echo ok > build/index.html")
                .current_dir(tmp.path()),
            Duration::from_secs(10),
        )
        .unwrap();
        assert!(result.success());
        assert!(tmp.path().join("build").join("index.html").is_file());
    }

    #[test]
    fn bounded_output_keeps_only_the_tail() {
        let script = "i=0; while [ $i -lt 20000 ]; do echo line-$i; i=$((i+1)); done; echo done";
        let result = run_with_timeout(
            Command::new("sh").arg("-c").arg(script),
            Duration::from_secs(30),
        )
        .unwrap();
        assert!(result.success());
        assert!(result.output.len() <= MAX_CAPTURED_OUTPUT);
        assert!(result.output.ends_with("line-19999\ndone\n"));
        assert!(!result.output.contains("line-0\n"));
    }

    #[test]
    fn read_tail_of_short_file_reads_everything() {
        let mut file = tempfile::tempfile().unwrap();
        std::io::Write::write_all(&mut file, b"abcdef").unwrap();
        assert_eq!(read_tail(&mut file, 4).unwrap(), b"cdef");
        assert_eq!(read_tail(&mut file, 100).unwrap(), b"abcdef");
    }

    #[test]
    fn bounded_missing_binary_errors() {
        let result = run_with_timeout(
            &mut Command::new("nonexistent_binary_xyz_123"),
            Duration::from_secs(1),
        );
        assert!(result.is_err());
    }

    #[test]
    fn truncate_tail_keeps_end() {
        assert_eq!(truncate_tail("abcdef", 10), "abcdef");
        assert_eq!(truncate_tail("abcdef", 3), "def");
    }

    #[test]
    fn truncate_tail_respects_char_boundaries() {
        let text = "ééé";
        let tail = truncate_tail(text, 3);
        assert_eq!(tail, "é");
    }
}
