//! One-shot command execution with output capture.
//!
//! [`exec_command`] runs a program line via `<shell> -c "<command>"`, reading
//! stdout and stderr concurrently so neither pipe can fill up and stall the
//! child. Output is decoded lossily: invalid byte sequences become U+FFFD
//! instead of failing the run.

use std::process::Stdio;
use std::time::Instant;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// Outcome of one [`exec_command`] call.
#[derive(Debug)]
pub struct ExecResult {
    /// Process exit code, or `-1` if unavailable (e.g. killed by signal).
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Wall-clock duration of the command in milliseconds.
    pub duration_ms: u64,
}

impl ExecResult {
    /// Stdout followed by stderr, the layout of a run artifact.
    pub fn combined(&self) -> String {
        let mut out = String::with_capacity(self.stdout.len() + self.stderr.len());
        out.push_str(&self.stdout);
        out.push_str(&self.stderr);
        out
    }
}

/// Errors that keep a command from producing a result at all.
#[derive(Debug)]
pub enum ExecError {
    /// The shell binary could not be started (e.g. not found, permission denied).
    SpawnFailed(String),
    /// The child process started but `wait()` failed.
    ProcessFailed(String),
}

impl std::fmt::Display for ExecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecError::SpawnFailed(e) => write!(f, "Failed to spawn process: {e}"),
            ExecError::ProcessFailed(e) => write!(f, "Process error: {e}"),
        }
    }
}

impl std::error::Error for ExecError {}

/// Execute `command` through `shell` and wait for it to finish.
///
/// There is no timeout: a run lasts as long as the program does. The child is
/// placed in its own process group so a Ctrl-C aimed at the daemon's terminal
/// does not tear through a run in progress, and it is killed if the future is
/// dropped.
pub async fn exec_command(shell: &str, command: &str) -> Result<ExecResult, ExecError> {
    let start = Instant::now();

    let mut cmd = Command::new(shell);
    cmd.arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    own_process_group(&mut cmd);
    let mut child = cmd
        .spawn()
        .map_err(|e| ExecError::SpawnFailed(e.to_string()))?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| ExecError::ProcessFailed("Failed to take stdout pipe".to_string()))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| ExecError::ProcessFailed("Failed to take stderr pipe".to_string()))?;

    let (stdout_data, stderr_data) = tokio::join!(
        read_lossy(&mut stdout),
        read_lossy(&mut stderr),
    );
    drop(stdout);
    drop(stderr);

    let status = child
        .wait()
        .await
        .map_err(|e| ExecError::ProcessFailed(e.to_string()))?;

    #[allow(clippy::cast_possible_truncation)]
    let duration_ms = start.elapsed().as_millis() as u64;

    Ok(ExecResult {
        exit_code: status.code().unwrap_or(-1),
        stdout: stdout_data,
        stderr: stderr_data,
        duration_ms,
    })
}

#[cfg(unix)]
fn own_process_group(cmd: &mut Command) {
    // SAFETY: setpgid is async-signal-safe per POSIX.
    unsafe {
        cmd.pre_exec(|| {
            libc::setpgid(0, 0);
            Ok(())
        });
    }
}

/// Drain a pipe to EOF. A read error ends the stream with whatever arrived.
async fn read_lossy(reader: &mut (impl tokio::io::AsyncRead + Unpin)) -> String {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 8192];
    loop {
        match reader.read(&mut tmp).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&tmp[..n]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
