use crate::ConvertError;
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
/// How long output readers may lag behind the child's exit. Descendants that
/// inherited the pipes can keep them open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
    pub duration_ms: u128,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    /// stdout and stderr joined for error reports.
    pub fn combined_output(&self) -> String {
        let stdout = self.stdout.trim_end();
        let stderr = self.stderr.trim_end();
        match (stdout.is_empty(), stderr.is_empty()) {
            (true, true) => String::new(),
            (false, true) => stdout.to_string(),
            (true, false) => stderr.to_string(),
            (false, false) => format!("{stdout}\n{stderr}"),
        }
    }
}

/// Runs a child process to completion. Blocks the caller.
pub trait CommandRunner: Send + Sync {
    fn run(&self, spec: &CommandSpec) -> Result<ExecResult, ConvertError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LocalCommandRunner;

impl CommandRunner for LocalCommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<ExecResult, ConvertError> {
        let started = Instant::now();
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(|error| {
            ConvertError::io(
                format!("failed to launch '{}'", spec.program.display()),
                error,
            )
        })?;

        let stdout = child.stdout.take().map(PipeDrain::spawn);
        let stderr = child.stderr.take().map(PipeDrain::spawn);
        let deadline = spec.timeout.map(|timeout| started + timeout);

        let mut timed_out = false;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Some(status),
                Ok(None) => {}
                Err(error) => {
                    kill_process_tree(&mut child);
                    return Err(ConvertError::io("failed to poll child process", error));
                }
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                timed_out = true;
                kill_process_tree(&mut child);
                break None;
            }
            thread::sleep(POLL_INTERVAL);
        };

        let drain_deadline = Instant::now() + DRAIN_GRACE;
        Ok(ExecResult {
            stdout: stdout
                .map(|drain| drain.collect(drain_deadline))
                .unwrap_or_default(),
            stderr: stderr
                .map(|drain| drain.collect(drain_deadline))
                .unwrap_or_default(),
            exit_code: status.and_then(|status| status.code()).unwrap_or(-1),
            timed_out,
            duration_ms: started.elapsed().as_millis(),
        })
    }
}

/// Kills the child and everything in its process group, then reaps it.
fn kill_process_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let group = Pid::from_raw(child.id() as i32);
        if let Err(error) = killpg(group, Signal::SIGKILL) {
            tracing::debug!(error = %error, "process group kill failed; killing child only");
            let _ = child.kill();
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child.kill();
    }
    // The child may already have exited between the poll and the kill.
    let _ = child.wait();
}

/// Reads one output pipe on a helper thread into a shared buffer.
struct PipeDrain {
    buffer: Arc<Mutex<Vec<u8>>>,
    finished: mpsc::Receiver<()>,
}

impl PipeDrain {
    fn spawn<R: Read + Send + 'static>(mut pipe: R) -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let (done, finished) = mpsc::channel();
        let sink = Arc::clone(&buffer);
        thread::spawn(move || {
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(read) => {
                        if let Ok(mut buffer) = sink.lock() {
                            buffer.extend_from_slice(&chunk[..read]);
                        }
                    }
                    Err(error) if error.kind() == ErrorKind::Interrupted => {}
                    Err(_) => break,
                }
            }
            let _ = done.send(());
        });
        Self { buffer, finished }
    }

    /// Waits for end-of-stream until `deadline`, then returns what was read.
    fn collect(self, deadline: Instant) -> String {
        let grace = deadline.saturating_duration_since(Instant::now());
        if self.finished.recv_timeout(grace).is_err() {
            warn!("output pipe still held open after child exit; returning partial output");
        }
        let bytes = self
            .buffer
            .lock()
            .map(|buffer| buffer.clone())
            .unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_output_joins_non_empty_streams() {
        let result = ExecResult {
            stdout: "loaded 12 nodes\n".to_string(),
            stderr: "Traceback\n".to_string(),
            exit_code: 1,
            ..ExecResult::default()
        };
        assert_eq!(result.combined_output(), "loaded 12 nodes\nTraceback");
        assert!(!result.success());
    }

    #[cfg(unix)]
    #[test]
    fn local_runner_captures_output_and_exit_code() {
        let result = LocalCommandRunner
            .run(&CommandSpec {
                program: PathBuf::from("sh"),
                args: vec!["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()],
                ..CommandSpec::default()
            })
            .expect("sh should launch");
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stdout.trim(), "out");
        assert_eq!(result.stderr.trim(), "err");
        assert!(!result.timed_out);
    }

    #[cfg(unix)]
    #[test]
    fn local_runner_timeout_expected_killed() {
        let result = LocalCommandRunner
            .run(&CommandSpec {
                program: PathBuf::from("sh"),
                args: vec!["-c".to_string(), "exec sleep 5".to_string()],
                timeout: Some(Duration::from_millis(100)),
                ..CommandSpec::default()
            })
            .expect("sh should launch");
        assert!(result.timed_out);
        assert!(!result.success());
        assert!(result.duration_ms < 5_000);
    }

    #[cfg(unix)]
    #[test]
    fn local_runner_timeout_with_grandchild_expected_prompt_return() {
        let started = Instant::now();
        let result = LocalCommandRunner
            .run(&CommandSpec {
                program: PathBuf::from("sh"),
                args: vec!["-c".to_string(), "sleep 4; true".to_string()],
                timeout: Some(Duration::from_millis(100)),
                ..CommandSpec::default()
            })
            .expect("sh should launch");
        assert!(result.timed_out);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[cfg(unix)]
    #[test]
    fn local_runner_background_descendant_expected_return_after_exit() {
        let started = Instant::now();
        let result = LocalCommandRunner
            .run(&CommandSpec {
                program: PathBuf::from("sh"),
                args: vec!["-c".to_string(), "echo ready; sleep 4 & exit 0".to_string()],
                ..CommandSpec::default()
            })
            .expect("sh should launch");
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout.trim(), "ready");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn local_runner_missing_program_expected_io_error() {
        let error = LocalCommandRunner
            .run(&CommandSpec {
                program: PathBuf::from("/definitely/not/a/real/interpreter"),
                ..CommandSpec::default()
            })
            .expect_err("spawn should fail");
        assert!(matches!(error, ConvertError::Io { .. }));
    }
}
