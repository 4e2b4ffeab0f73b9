use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::Notify;
use tokio::time;

use crate::types::{ExecutionOutcome, ExitStatus};

/// One child-process invocation: what to run, where, what to feed it, and
/// the limits it runs under.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub stdin: Vec<u8>,
    pub timeout: Duration,
    pub max_output_bytes: usize,
}

/// Seam between the judge pipeline and real process spawning. Pipeline tests
/// substitute scripted runners to observe invocations.
#[allow(async_fn_in_trait)]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: RunSpec) -> ExecutionOutcome;
}

/// Spawns the child in its own process group with piped stdio, writes the
/// stdin payload, drains stdout/stderr under a byte cap, and enforces the
/// wall-clock deadline. Total: every call returns an `ExecutionOutcome`.
pub struct ProcessRunner;

enum WaitEvent {
    Exited(std::process::ExitStatus),
    WaitFailed(std::io::Error),
    Overflow,
    TimedOut,
}

impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: RunSpec) -> ExecutionOutcome {
        let started = Instant::now();

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ExecutionOutcome::system_error(
                    format!("failed to spawn {}: {e}", spec.program),
                    elapsed_ms(started),
                );
            }
        };
        let pgid = child.id();
        // Dropping the run future (caller cancellation) must take the whole
        // group with it; kill_on_drop only reaches the direct child. The
        // guard also sweeps stragglers a normally-exited child left behind.
        let _group_guard = GroupKillGuard { pgid };

        let overflow = Arc::new(Notify::new());
        let stdin_pipe = child.stdin.take();
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let payload = spec.stdin;
        let cap = spec.max_output_bytes;

        // Stdin write and both drains run concurrently with the wait below;
        // a child blocked on a full pipe would otherwise never exit.
        let io_task = tokio::spawn({
            let overflow = overflow.clone();
            async move {
                let feed = async {
                    if let Some(mut pipe) = stdin_pipe {
                        // the child may exit without reading; EPIPE is not our error
                        if let Err(e) = pipe.write_all(&payload).await {
                            tracing::debug!("stdin write aborted: {e}");
                        }
                    }
                };
                let stdout = drain_capped(stdout_pipe, cap, &overflow);
                let stderr = drain_capped(stderr_pipe, cap, &overflow);
                let (_, stdout, stderr) = tokio::join!(feed, stdout, stderr);
                (stdout, stderr)
            }
        });

        let waited = time::timeout(spec.timeout, async {
            tokio::select! {
                res = child.wait() => Some(res),
                _ = overflow.notified() => None,
            }
        })
        .await;

        let wait = match waited {
            Ok(Some(Ok(status))) => WaitEvent::Exited(status),
            Ok(Some(Err(e))) => WaitEvent::WaitFailed(e),
            Ok(None) => {
                kill_group(pgid, &mut child).await;
                WaitEvent::Overflow
            }
            Err(_) => {
                kill_group(pgid, &mut child).await;
                WaitEvent::TimedOut
            }
        };

        let wall_time_ms = elapsed_ms(started);

        // After a kill the pipes hit EOF and the capture task finishes
        // promptly. The grace period covers the one remaining hazard: a
        // grandchild that outlived a normally-exited child and still holds
        // the write ends open.
        let mut capture_stalled = false;
        let ((stdout, stdout_over), (stderr, stderr_over)) =
            match time::timeout(Duration::from_secs(2), io_task).await {
                Ok(Ok(buffers)) => buffers,
                Ok(Err(e)) => {
                    tracing::error!("output capture task failed: {e}");
                    ((Vec::new(), false), (Vec::new(), false))
                }
                Err(_) => {
                    kill_group(pgid, &mut child).await;
                    capture_stalled = true;
                    ((Vec::new(), false), (Vec::new(), false))
                }
            };
        let overflowed = stdout_over || stderr_over || matches!(wait, WaitEvent::Overflow);

        let status = match &wait {
            WaitEvent::TimedOut => ExitStatus::TimedOut,
            WaitEvent::Overflow => ExitStatus::SystemError,
            WaitEvent::WaitFailed(_) => ExitStatus::SystemError,
            WaitEvent::Exited(_) if overflowed || capture_stalled => ExitStatus::SystemError,
            WaitEvent::Exited(s) if s.success() => ExitStatus::Ok,
            WaitEvent::Exited(_) => ExitStatus::RuntimeError,
        };

        let stderr_text = match &wait {
            WaitEvent::WaitFailed(e) => format!("failed to wait for child: {e}"),
            _ if capture_stalled => "output capture stalled after exit".to_string(),
            _ if overflowed && !matches!(wait, WaitEvent::TimedOut) => {
                format!("output limit of {cap} bytes exceeded")
            }
            _ => trimmed_text(&stderr),
        };

        ExecutionOutcome {
            stdout: trimmed_text(&stdout),
            stderr: stderr_text,
            status,
            wall_time_ms,
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn trimmed_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

struct GroupKillGuard {
    pgid: Option<u32>,
}

impl Drop for GroupKillGuard {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid {
            // ESRCH when the group is already gone; harmless
            unsafe {
                libc::killpg(pgid as i32, libc::SIGKILL);
            }
        }
    }
}

/// Kill the whole process group; compiler wrappers and interpreters can leave
/// children behind if only the direct child dies.
async fn kill_group(pgid: Option<u32>, child: &mut Child) {
    if let Some(pgid) = pgid {
        // the child was spawned as its own group leader
        unsafe {
            libc::killpg(pgid as i32, libc::SIGKILL);
        }
    }
    if let Err(e) = child.kill().await {
        tracing::debug!("kill after group signal: {e}");
    }
}

/// Reads a stream into a byte-capped buffer. Past the cap the stream is still
/// drained (and discarded) so the child is never wedged on a full pipe, but
/// the overflow is flagged and signalled so the caller can kill the group.
async fn drain_capped<R: AsyncRead + Unpin>(
    pipe: Option<R>,
    cap: usize,
    overflow: &Notify,
) -> (Vec<u8>, bool) {
    let Some(mut pipe) = pipe else {
        return (Vec::new(), false);
    };
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut over = false;
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if over {
                    continue;
                }
                if buffer.len() + n <= cap {
                    buffer.extend_from_slice(&chunk[..n]);
                } else {
                    buffer.extend_from_slice(&chunk[..cap - buffer.len()]);
                    over = true;
                    overflow.notify_one();
                }
            }
            Err(_) => break,
        }
    }
    (buffer, over)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> RunSpec {
        RunSpec {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            cwd: std::env::temp_dir(),
            stdin: Vec::new(),
            timeout: Duration::from_secs(5),
            max_output_bytes: 64 * 1024,
        }
    }

    #[tokio::test]
    async fn echoes_stdin_with_ok_status() {
        let mut spec = sh("cat");
        spec.stdin = b"hello judge".to_vec();
        let outcome = ProcessRunner.run(spec).await;
        assert_eq!(outcome.status, ExitStatus::Ok);
        assert_eq!(outcome.stdout, "hello judge");
        assert_eq!(outcome.stderr, "");
    }

    #[tokio::test]
    async fn nonzero_exit_is_runtime_error() {
        let outcome = ProcessRunner.run(sh("echo oops 1>&2; exit 3")).await;
        assert_eq!(outcome.status, ExitStatus::RuntimeError);
        assert_eq!(outcome.stderr, "oops");
    }

    #[tokio::test]
    async fn deadline_expiry_is_timed_out() {
        let mut spec = sh("sleep 30");
        spec.timeout = Duration::from_millis(300);
        let started = Instant::now();
        let outcome = ProcessRunner.run(spec).await;
        assert_eq!(outcome.status, ExitStatus::TimedOut);
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "timed-out child must be killed promptly"
        );
    }

    #[tokio::test]
    async fn partial_output_is_captured_before_timeout() {
        let mut spec = sh("echo early; sleep 30");
        spec.timeout = Duration::from_millis(500);
        let outcome = ProcessRunner.run(spec).await;
        assert_eq!(outcome.status, ExitStatus::TimedOut);
        assert_eq!(outcome.stdout, "early");
    }

    #[tokio::test]
    async fn spawn_failure_is_system_error() {
        let mut spec = sh("");
        spec.program = "judged-no-such-binary".to_string();
        let outcome = ProcessRunner.run(spec).await;
        assert_eq!(outcome.status, ExitStatus::SystemError);
        assert!(outcome.stderr.contains("failed to spawn"));
    }

    fn marker_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "judged-runner-{tag}-{}",
            crate::utils::gen_random_id(8)
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn lingering_grandchildren_die_with_the_run() {
        let dir = marker_dir("sweep");
        let marker = dir.join("marker");
        // the subshell releases the pipes, so the run completes while the
        // grandchild still sleeps; the group sweep must catch it
        let mut spec = sh("( sleep 1; : > marker ) > /dev/null 2>&1 & echo ok");
        spec.cwd = dir.clone();
        let outcome = ProcessRunner.run(spec).await;
        assert_eq!(outcome.status, ExitStatus::Ok);
        assert_eq!(outcome.stdout, "ok");

        time::sleep(Duration::from_millis(1500)).await;
        assert!(
            !marker.exists(),
            "background grandchild outlived the run that spawned it"
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn dropping_the_run_future_kills_the_whole_group() {
        let dir = marker_dir("cancel");
        let marker = dir.join("marker");
        let mut spec = sh("( sleep 1; : > marker ) > /dev/null 2>&1 & sleep 30");
        spec.cwd = dir.clone();

        let run = ProcessRunner.run(spec);
        tokio::select! {
            _ = run => panic!("run should still be in flight"),
            _ = time::sleep(Duration::from_millis(300)) => {}
        }

        time::sleep(Duration::from_millis(1500)).await;
        assert!(
            !marker.exists(),
            "cancelled run left its process group behind"
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn runaway_output_is_a_system_error_not_truncation() {
        let mut spec = sh("while :; do echo aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa; done");
        spec.max_output_bytes = 4 * 1024;
        let started = Instant::now();
        let outcome = ProcessRunner.run(spec).await;
        assert_eq!(outcome.status, ExitStatus::SystemError);
        assert!(outcome.stderr.contains("output limit"));
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "overflowing child must be killed, not run to its deadline"
        );
    }
}
