//! Program lifecycle management.
//!
//! [`Supervisor`] is the single authority over which programs are registered,
//! which are active, and which have a live runner. It guarantees at most one
//! [`RunnerHandle`] per program name.
//!
//! ## Concurrency
//!
//! The durable state and the runner map live behind one `Mutex`. Every
//! control operation holds it from the precondition check through the
//! state-file write, so concurrent requests on the same name cannot interleave
//! and the file on disk always matches memory. Each mutation is first written
//! to disk from a copy of the state and only then applied in memory; a failed
//! write leaves both untouched. `get_output` only reads the archive and does
//! not take the lock.

pub mod runner;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::archive::OutputArchive;
use crate::error::{Result, SupervisorError};
use crate::shell;
use crate::store::{ProgramEntry, StateStore, SupervisorState};
pub use runner::{RunnerContext, RunnerHandle};

/// Shared supervisor. Cloneable: all clones share the same inner state.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Mutex<Inner>>,
    store: StateStore,
    ctx: RunnerContext,
}

struct Inner {
    state: SupervisorState,
    runners: HashMap<String, RunnerHandle>,
}

impl Inner {
    /// Install a fresh runner for `program`, tearing down any previous one.
    fn start_runner(&mut self, program: &str, ctx: &RunnerContext) {
        let handle = runner::spawn(program.to_string(), self.state.interval, ctx.clone());
        if let Some(previous) = self.runners.insert(program.to_string(), handle) {
            warn!("Replacing stale runner for '{program}'");
            previous.cancel();
        }
    }
}

impl Supervisor {
    /// Build a supervisor around already-loaded state. No runners are started.
    pub fn new(
        store: StateStore,
        state: SupervisorState,
        archive: OutputArchive,
        shell: &str,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state,
                runners: HashMap::new(),
            })),
            store,
            ctx: RunnerContext {
                shell: shell.to_string(),
                archive,
            },
        }
    }

    /// Load state from `store` and build a supervisor around it.
    pub async fn open(
        store: StateStore,
        archive: OutputArchive,
        shell: &str,
        default_interval: u64,
    ) -> Result<Self> {
        let state = store.load(default_interval).await?;
        Ok(Self::new(store, state, archive, shell))
    }

    /// Start a runner for every program flagged active. Returns how many
    /// were started.
    pub async fn start_active(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let active: Vec<String> = inner
            .state
            .active_programs()
            .filter(|name| !inner.runners.contains_key(*name))
            .map(ToString::to_string)
            .collect();
        for name in &active {
            inner.start_runner(name, &self.ctx);
        }
        if !active.is_empty() {
            info!("Restored {} active program(s)", active.len());
        }
        active.len()
    }

    /// Register a new program and start running it.
    pub async fn add(&self, program: &str) -> Result<String> {
        if shell::resolve_executable(program).is_none() {
            return Err(SupervisorError::UnsafeProgram(program.to_string()));
        }

        let mut inner = self.inner.lock().await;
        if inner.state.programs.contains_key(program) {
            return Err(SupervisorError::AlreadyExists(program.to_string()));
        }

        let mut next = inner.state.clone();
        next.programs
            .insert(program.to_string(), ProgramEntry { active: true });
        self.store.save(&next).await?;
        inner.state = next;
        inner.start_runner(program, &self.ctx);

        Ok(format!("Program '{program}' added and started."))
    }

    /// Cancel a program's runner and mark it inactive.
    pub async fn stop(&self, program: &str) -> Result<String> {
        let mut inner = self.inner.lock().await;
        if !inner.runners.contains_key(program) {
            return Err(SupervisorError::NotRunning(program.to_string()));
        }

        let mut next = inner.state.clone();
        if let Some(entry) = next.programs.get_mut(program) {
            entry.active = false;
        }
        self.store.save(&next).await?;
        inner.state = next;
        if let Some(handle) = inner.runners.remove(program) {
            handle.cancel();
        }

        Ok(format!("Program '{program}' stopped."))
    }

    /// Start a stopped program again with the current global interval.
    pub async fn resume(&self, program: &str) -> Result<String> {
        let mut inner = self.inner.lock().await;
        match inner.state.programs.get(program) {
            None => return Err(SupervisorError::NotFound(program.to_string())),
            Some(entry) if entry.active => {
                return Err(SupervisorError::AlreadyActive(program.to_string()));
            }
            Some(_) => {}
        }

        let mut next = inner.state.clone();
        next.programs
            .insert(program.to_string(), ProgramEntry { active: true });
        self.store.save(&next).await?;
        inner.state = next;
        inner.start_runner(program, &self.ctx);

        Ok(format!("Program '{program}' resumed."))
    }

    /// Change the global interval. Runners already going keep the interval
    /// they were started with; only runners started afterwards pick it up.
    pub async fn set_interval(&self, raw: &str) -> Result<String> {
        let interval = parse_interval(raw)?;

        let mut inner = self.inner.lock().await;
        let mut next = inner.state.clone();
        next.interval = interval;
        self.store.save(&next).await?;
        inner.state = next;

        Ok(format!("Interval set to {interval} seconds."))
    }

    /// Full output history of a program, oldest run first.
    pub async fn get_output(&self, program: &str) -> Result<String> {
        self.ctx.archive.read_all(program).await
    }

    /// Current global interval.
    pub async fn interval(&self) -> u64 {
        self.inner.lock().await.state.interval
    }

    /// Copy of the in-memory durable state.
    pub async fn snapshot(&self) -> SupervisorState {
        self.inner.lock().await.state.clone()
    }

    /// Names of programs that currently have a runner installed, sorted.
    pub async fn live_runners(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        let mut names: Vec<String> = inner.runners.keys().cloned().collect();
        names.sort();
        names
    }

    /// Interval captured by the installed runner of `program`, if any.
    pub async fn runner_interval(&self, program: &str) -> Option<u64> {
        let inner = self.inner.lock().await;
        inner.runners.get(program).map(RunnerHandle::interval)
    }

    /// Cancel every runner and flush state to disk. Active flags are kept so
    /// the same programs come back on the next start.
    ///
    /// Returns the handles so a caller may wait for them; dropping them does
    /// not stop the cancellation.
    pub async fn shutdown(&self) -> Result<Vec<RunnerHandle>> {
        let mut inner = self.inner.lock().await;
        let handles: Vec<RunnerHandle> = inner
            .runners
            .drain()
            .map(|(name, handle)| {
                handle.cancel();
                info!("Stopped runner for '{name}' (shutdown)");
                handle
            })
            .collect();
        self.store.save(&inner.state).await?;
        info!("Shut down {} runner(s), state saved", handles.len());
        Ok(handles)
    }
}

/// Parse a wire interval: a base-10 integer of at least one second.
pub fn parse_interval(raw: &str) -> Result<u64> {
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(SupervisorError::InvalidInterval(raw.to_string())),
    }
}
