//! # Child process supervision.
//!
//! [`spawn`] builds and starts the child for one attempt; the returned
//! [`RunningProcess`] is consumed by [`RunningProcess::supervise`], which
//! resolves exactly one outcome per process lifetime: natural exit,
//! cancellation or timeout.
//!
//! ## Architecture
//! ```text
//!   spawn(def)            supervise(cancel, timeout, grace)
//!  ┌──────────┐   wait ──────────────► Exited / Signaled
//!  │  child   │   cancel ──┐
//!  │ stdout ──┼─► reader   ├─► SIGTERM ── grace ──► SIGKILL
//!  │ stderr ──┼─► reader   │
//!  └──────────┘   timeout ─┘
//! ```
//!
//! ## Rules
//! - `kill_on_drop(true)` on every child; a dropped handle never leaks a
//!   process.
//! - One reader task per stream feeds the bounded capture buffer; readers
//!   never backpressure the child.
//! - Termination escalates: SIGTERM, wait up to `grace`, then SIGKILL.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::error::SpawnError;
use crate::instance::Cause;
use crate::jobs::JobDefinition;
use crate::process::output::{CapturedOutput, OutputBuffer};

/// Outcome of one supervised attempt.
#[derive(Debug)]
pub(crate) struct ProcessOutcome {
    pub(crate) cause: Cause,
    pub(crate) output: CapturedOutput,
}

/// Live child process with its stream readers.
#[derive(Debug)]
pub(crate) struct RunningProcess {
    child: tokio::process::Child,
    stdout_task: JoinHandle<OutputBuffer>,
    stderr_task: JoinHandle<OutputBuffer>,
}

/// Starts the child for one attempt.
///
/// The definition's env overlay is applied first, then `extra_env`, so a
/// submission override of the same key wins.
pub(crate) fn spawn(
    def: &JobDefinition,
    extra_env: &[(String, String)],
    output_limit: usize,
) -> Result<RunningProcess, SpawnError> {
    let mut cmd = Command::new(def.command());
    cmd.args(def.args())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in def.env() {
        cmd.env(key, value);
    }
    for (key, value) in extra_env {
        cmd.env(key, value);
    }
    if let Some(dir) = def.cwd() {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|source| SpawnError {
        program: def.command().to_string(),
        source,
    })?;
    let stdout_task = drain(child.stdout.take(), output_limit);
    let stderr_task = drain(child.stderr.take(), output_limit);
    Ok(RunningProcess {
        child,
        stdout_task,
        stderr_task,
    })
}

impl RunningProcess {
    pub(crate) fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Waits for the first of natural exit, cancellation or timeout.
    ///
    /// On cancel and timeout the child is terminated with escalation
    /// before this returns; the exit status is always collected, never
    /// leaked to the reaper.
    pub(crate) async fn supervise(
        mut self,
        cancel: &CancellationToken,
        limit: Option<Duration>,
        grace: Duration,
    ) -> ProcessOutcome {
        let cause = tokio::select! {
            status = self.child.wait() => classify_wait(status),
            _ = cancel.cancelled() => {
                self.terminate(grace).await;
                Cause::Cancelled
            }
            _ = sleep(limit.unwrap_or(Duration::MAX)), if limit.is_some() => {
                self.terminate(grace).await;
                Cause::TimedOut {
                    limit_ms: limit.unwrap_or_default().as_millis() as u64,
                }
            }
        };
        let output = self.collect_output(grace).await;
        ProcessOutcome { cause, output }
    }

    /// SIGTERM, wait up to `grace`, then SIGKILL.
    async fn terminate(&mut self, grace: Duration) {
        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            if timeout(grace, self.child.wait()).await.is_ok() {
                return;
            }
            tracing::warn!(pid, ?grace, "child ignored SIGTERM, escalating to SIGKILL");
        }
        let _ = self.child.kill().await;
    }

    /// Joins the reader tasks. The pipes hit EOF once the child (and any
    /// descendant holding them) is gone; a descendant that keeps the pipe
    /// open past `grace` forfeits its captured output.
    async fn collect_output(self, grace: Duration) -> CapturedOutput {
        let stdout = join_reader(self.stdout_task, grace, "stdout").await;
        let stderr = join_reader(self.stderr_task, grace, "stderr").await;
        CapturedOutput::from_buffers(stdout, stderr)
    }
}

async fn join_reader(task: JoinHandle<OutputBuffer>, grace: Duration, stream: &str) -> OutputBuffer {
    match timeout(grace, task).await {
        Ok(Ok(buf)) => buf,
        Ok(Err(_)) => OutputBuffer::default(),
        Err(_) => {
            tracing::warn!(stream, ?grace, "output pipe still open after child exit");
            OutputBuffer::default()
        }
    }
}

fn drain<R>(pipe: Option<R>, cap: usize) -> JoinHandle<OutputBuffer>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = OutputBuffer::new(cap);
        let Some(mut pipe) = pipe else {
            return buf;
        };
        let mut chunk = [0u8; 4096];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buf.push(&chunk[..n]),
            }
        }
        buf
    })
}

fn classify_wait(status: std::io::Result<std::process::ExitStatus>) -> Cause {
    match status {
        Ok(status) => classify_status(status),
        Err(err) => Cause::SpawnFailed {
            reason: format!("wait failed: {err}"),
        },
    }
}

#[cfg(unix)]
fn classify_status(status: std::process::ExitStatus) -> Cause {
    use std::os::unix::process::ExitStatusExt;
    match status.code() {
        Some(code) => Cause::Exited { code },
        None => Cause::Signaled {
            signal: status.signal().unwrap_or(0),
        },
    }
}

#[cfg(not(unix))]
fn classify_status(status: std::process::ExitStatus) -> Cause {
    Cause::Exited {
        code: status.code().unwrap_or(-1),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh(id: &str, script: &str) -> JobDefinition {
        JobDefinition::builder(id, "/bin/sh")
            .with_args(["-c", script])
            .build()
            .unwrap()
    }

    async fn run(def: &JobDefinition) -> ProcessOutcome {
        let token = CancellationToken::new();
        spawn(def, &[], 64 * 1024)
            .unwrap()
            .supervise(&token, None, Duration::from_secs(5))
            .await
    }

    #[tokio::test]
    async fn clean_exit_is_classified_with_its_code() {
        let outcome = run(&sh("exit-zero", "echo ok")).await;
        assert_eq!(outcome.cause, Cause::Exited { code: 0 });
        assert_eq!(outcome.output.stdout_lossy(), "ok\n");
    }

    #[tokio::test]
    async fn nonzero_exit_keeps_the_code() {
        let outcome = run(&sh("exit-three", "exit 3")).await;
        assert_eq!(outcome.cause, Cause::Exited { code: 3 });
    }

    #[tokio::test]
    async fn stderr_is_captured_separately() {
        let outcome = run(&sh("stderr", "echo oops >&2")).await;
        assert_eq!(outcome.output.stderr_lossy(), "oops\n");
        assert!(outcome.output.stdout.is_empty());
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let def = JobDefinition::builder("ghost", "/definitely/not/here")
            .build()
            .unwrap();
        let err = spawn(&def, &[], 1024).unwrap_err();
        assert_eq!(err.program, "/definitely/not/here");
    }

    #[tokio::test]
    async fn self_signal_is_classified_as_signaled() {
        let outcome = run(&sh("self-term", "kill -TERM $$")).await;
        assert_eq!(outcome.cause, Cause::Signaled { signal: 15 });
    }

    #[tokio::test]
    async fn timeout_kills_a_sleeper_quickly() {
        let def = sh("sleeper", "sleep 30");
        let token = CancellationToken::new();
        let started = Instant::now();
        let outcome = spawn(&def, &[], 1024)
            .unwrap()
            .supervise(&token, Some(Duration::from_millis(100)), Duration::from_millis(200))
            .await;
        assert_eq!(outcome.cause, Cause::TimedOut { limit_ms: 100 });
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "termination must not wait for the sleep to finish"
        );
    }

    #[tokio::test]
    async fn cancellation_terminates_the_child() {
        let def = sh("cancelled", "sleep 30");
        let token = CancellationToken::new();
        let proc = spawn(&def, &[], 1024).unwrap();
        let canceller = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });
        let started = Instant::now();
        let outcome = proc
            .supervise(&token, None, Duration::from_millis(200))
            .await;
        assert_eq!(outcome.cause, Cause::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn override_env_wins_over_definition_env() {
        let def = JobDefinition::builder("env-overlay", "/bin/sh")
            .with_args(["-c", "printf %s \"$MARKER\""])
            .with_env("MARKER", "from-def")
            .build()
            .unwrap();
        let extra = vec![("MARKER".to_string(), "from-override".to_string())];
        let token = CancellationToken::new();
        let outcome = spawn(&def, &extra, 1024)
            .unwrap()
            .supervise(&token, None, Duration::from_secs(5))
            .await;
        assert_eq!(outcome.output.stdout_lossy(), "from-override");
    }

    #[tokio::test]
    async fn oversized_output_is_truncated_with_a_count() {
        let def = sh("chatty", "i=0; while [ $i -lt 1000 ]; do echo 0123456789; i=$((i+1)); done");
        let token = CancellationToken::new();
        let outcome = spawn(&def, &[], 256)
            .unwrap()
            .supervise(&token, None, Duration::from_secs(5))
            .await;
        assert_eq!(outcome.output.stdout.len(), 256);
        assert!(outcome.output.dropped_stdout > 0);
        assert!(outcome.output.is_truncated());
    }
}
