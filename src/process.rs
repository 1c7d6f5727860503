//! Child process execution
//!
//! Runs external commands (git, the bundler, worker processes) with captured
//! output. A non-zero exit becomes [`Error::ChildProcess`] carrying both
//! streams.
//!
//! Long-running commands (a watching bundler, the dev server) go through
//! [`run_attached`] instead, which shares the terminal with the child.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use log::debug;

use crate::error::{Error, Result};

/// Captured output of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

fn describe(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run `program args...` in `cwd`, optionally feeding `stdin`.
pub fn run_child_process(
    program: &str,
    args: &[&str],
    cwd: &Path,
    stdin: Option<&str>,
) -> Result<ProcessOutput> {
    let command_line = describe(program, args);
    debug!("[spawn] Spawning: {} (cwd: {})", command_line, cwd.display());

    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::ChildProcess {
            command: command_line.clone(),
            code: None,
            stdout: String::new(),
            stderr: e.to_string(),
        })?;
    debug!("[spawn] childProcess.pid= {}", child.id());

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input.as_bytes())?;
        // Dropping the pipe closes the child's stdin.
    }

    let output = child.wait_with_output()?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    for line in stdout.lines() {
        debug!("[spawn] stdout {}", line);
    }
    for line in stderr.lines() {
        debug!("[spawn] stderr {}", line);
    }
    debug!("[spawn] childProcess exited with {}", output.status);

    if !output.status.success() {
        return Err(Error::ChildProcess {
            command: command_line,
            code: output.status.code(),
            stdout,
            stderr,
        });
    }

    Ok(ProcessOutput { stdout, stderr })
}

/// Run `program args...` in `cwd` with inherited stdio and wait for it to exit.
///
/// Output reaches the terminal as the child writes it, so nothing is captured.
pub fn run_attached(program: &str, args: &[&str], cwd: &Path) -> Result<()> {
    let command_line = describe(program, args);
    debug!("[spawn] Attaching: {} (cwd: {})", command_line, cwd.display());

    let spawn_error = |e: std::io::Error| Error::ChildProcess {
        command: command_line.clone(),
        code: None,
        stdout: String::new(),
        stderr: e.to_string(),
    };
    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(spawn_error)?;
    debug!("[spawn] childProcess.pid= {}", child.id());

    let status = child.wait()?;
    debug!("[spawn] childProcess exited with {}", status);
    if !status.success() {
        return Err(Error::ChildProcess {
            command: command_line,
            code: status.code(),
            stdout: String::new(),
            stderr: String::new(),
        });
    }
    Ok(())
}

/// Current commit hash of the repository containing `cwd`.
pub fn git_commit_hash(cwd: &Path) -> Result<String> {
    let output = run_child_process("git", &["rev-parse", "HEAD"], cwd, None)?;
    Ok(output.stdout.trim().to_string())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_run_child_process_captures_stdout() {
        let temp = TempDir::new().unwrap();
        let output = run_child_process("sh", &["-c", "echo hello; echo oops >&2"], temp.path(), None)
            .unwrap();
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[test]
    fn test_run_child_process_feeds_stdin() {
        let temp = TempDir::new().unwrap();
        let output = run_child_process("cat", &[], temp.path(), Some("{\"a\":1}\n")).unwrap();
        assert_eq!(output.stdout, "{\"a\":1}\n");
    }

    #[test]
    fn test_non_zero_exit_is_child_process_error() {
        let temp = TempDir::new().unwrap();
        let err = run_child_process("sh", &["-c", "echo partial; echo bad >&2; exit 3"], temp.path(), None)
            .unwrap_err();
        match err {
            Error::ChildProcess {
                code,
                stdout,
                stderr,
                command,
            } => {
                assert_eq!(code, Some(3));
                assert_eq!(stdout.trim(), "partial");
                assert_eq!(stderr.trim(), "bad");
                assert!(command.starts_with("sh -c"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_run_attached_waits_for_exit() {
        let temp = TempDir::new().unwrap();
        run_attached("sh", &["-c", "sleep 0.1; touch done"], temp.path()).unwrap();
        assert!(temp.path().join("done").exists());
    }

    #[test]
    fn test_run_attached_reports_exit_code() {
        let temp = TempDir::new().unwrap();
        let err = run_attached("sh", &["-c", "exit 4"], temp.path()).unwrap_err();
        assert!(matches!(err, Error::ChildProcess { code: Some(4), .. }));

        let err = run_attached("definitely-not-a-real-program-xyz", &[], temp.path()).unwrap_err();
        assert!(matches!(err, Error::ChildProcess { code: None, .. }));
    }

    #[test]
    fn test_missing_program_is_child_process_error() {
        let temp = TempDir::new().unwrap();
        let err = run_child_process("definitely-not-a-real-program-xyz", &[], temp.path(), None)
            .unwrap_err();
        assert!(matches!(err, Error::ChildProcess { code: None, .. }));
    }
}
