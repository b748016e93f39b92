//! Program runner: one task per active program.
//!
//! The loop runs the program, archives its combined output, then sleeps for
//! the interval it was started with. Cancellation is checked before every run
//! and raced against the sleep, so a stop request is honoured at the latest
//! when the current run completes.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::archive::OutputArchive;
use crate::shell::process;

/// Live runner owned by the supervisor. Never persisted.
#[derive(Debug)]
pub struct RunnerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    interval: u64,
}

impl RunnerHandle {
    /// Request the runner to exit. Does not wait.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the runner task has returned.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Interval (seconds) this runner captured at start.
    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Wait for the runner task to return.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            if e.is_panic() {
                error!("Runner task panicked: {e}");
            }
        }
    }
}

/// Everything a runner needs besides its name and interval.
#[derive(Debug, Clone)]
pub struct RunnerContext {
    pub shell: String,
    pub archive: OutputArchive,
}

/// Spawn the execution loop for `program`.
pub fn spawn(program: String, interval: u64, ctx: RunnerContext) -> RunnerHandle {
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run_loop(program, interval, ctx, cancel.clone()));
    RunnerHandle {
        cancel,
        task,
        interval,
    }
}

async fn run_loop(program: String, interval: u64, ctx: RunnerContext, cancel: CancellationToken) {
    info!("Runner for '{program}' started (interval {interval}s)");
    let pause = Duration::from_secs(interval);

    while !cancel.is_cancelled() {
        let output = match process::exec_command(&ctx.shell, &program).await {
            Ok(result) => {
                debug!(
                    "'{program}' exited with {} in {}ms",
                    result.exit_code, result.duration_ms
                );
                result.combined()
            }
            Err(e) => {
                error!("'{program}' could not be run: {e}");
                format!("{e}\n")
            }
        };

        match ctx.archive.write_artifact(&program, &output).await {
            Ok(path) => debug!("'{program}' output written to {}", path.display()),
            Err(e) => error!("Failed to archive output of '{program}': {e}"),
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(pause) => {}
        }
    }

    info!("Runner for '{program}' stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(dir: &std::path::Path) -> RunnerContext {
        RunnerContext {
            shell: "/bin/sh".to_string(),
            archive: OutputArchive::new(dir, "txt"),
        }
    }

    #[tokio::test]
    async fn test_first_run_happens_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let handle = spawn("echo hello".to_string(), 60, ctx.clone());

        let mut combined = String::new();
        for _ in 0..50 {
            if let Ok(out) = ctx.archive.read_all("echo hello").await {
                if out.contains("hello") {
                    combined = out;
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(combined.contains("==== run_"));
        assert!(combined.contains("hello\n"));

        handle.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle.join())
            .await
            .expect("runner should exit promptly once cancelled");
    }

    #[tokio::test]
    async fn test_cancel_interrupts_the_wait() {
        let dir = tempfile::tempdir().unwrap();
        let handle = spawn("true".to_string(), 3600, context(dir.path()));
        assert_eq!(handle.interval(), 3600);

        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.cancel();
        assert!(handle.is_cancelled());
        tokio::time::timeout(Duration::from_secs(1), handle.join())
            .await
            .expect("cancellation should not wait out the interval");
    }
}
