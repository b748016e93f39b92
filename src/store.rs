//! Durable supervisor state.
//!
//! One JSON document holds the global interval and every registered program:
//!
//! ```json
//! {"interval": 10, "programs": {"ping -c 1 127.0.0.1": {"active": true}}}
//! ```
//!
//! The file is rewritten in full after every mutation. Writes go to a temp
//! file in the same directory which is then renamed over the target, so a
//! crash mid-write never leaves a truncated document behind.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, SupervisorError};

/// Counter for unique temp-file names within this process.
static WRITE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Registration record for one program. Never deleted once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramEntry {
    /// Whether the program should currently have a live runner.
    pub active: bool,
}

/// Process-wide scheduling state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorState {
    /// Seconds between runs, captured by each runner when it starts.
    pub interval: u64,
    /// Program name (the command line) to its registration.
    #[serde(default)]
    pub programs: BTreeMap<String, ProgramEntry>,
}

impl SupervisorState {
    pub fn new(interval: u64) -> Self {
        Self {
            interval,
            programs: BTreeMap::new(),
        }
    }

    /// Names of every program flagged active.
    pub fn active_programs(&self) -> impl Iterator<Item = &str> {
        self.programs
            .iter()
            .filter(|(_, entry)| entry.active)
            .map(|(name, _)| name.as_str())
    }
}

/// Location of the state file.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the state file, or start fresh with `default_interval` when it
    /// does not exist yet. A file that exists but fails to parse is an error.
    ///
    /// A stored interval of zero is replaced by `default_interval`, which
    /// itself must be at least one second.
    pub async fn load(&self, default_interval: u64) -> Result<SupervisorState> {
        if default_interval == 0 {
            return Err(SupervisorError::InvalidInterval(default_interval.to_string()));
        }
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let mut state: SupervisorState = serde_json::from_slice(&bytes)?;
                if state.interval == 0 {
                    warn!(
                        "State file {} has interval 0, using {default_interval}s",
                        self.path.display()
                    );
                    state.interval = default_interval;
                }
                info!(
                    "Loaded state from {} ({} programs, interval {}s)",
                    self.path.display(),
                    state.programs.len(),
                    state.interval
                );
                Ok(state)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "No state file at {}, starting empty (interval {default_interval}s)",
                    self.path.display()
                );
                Ok(SupervisorState::new(default_interval))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Rewrite the state file atomically.
    pub async fn save(&self, state: &SupervisorState) -> Result<()> {
        let bytes = serde_json::to_vec(state)?;

        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&parent).await?;

        let seq = WRITE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_path = parent.join(format!(".progd_tmp_{}_{}", std::process::id(), seq));

        tokio::fs::write(&temp_path, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&temp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        debug!("State saved to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let state = store.load(7).await.unwrap();
        assert_eq!(state, SupervisorState::new(7));
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));

        let mut state = SupervisorState::new(20);
        state
            .programs
            .insert("echo a".into(), ProgramEntry { active: true });
        state
            .programs
            .insert("echo b".into(), ProgramEntry { active: false });
        store.save(&state).await.unwrap();

        let loaded = store.load(10).await.unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.active_programs().collect::<Vec<_>>(), vec!["echo a"]);
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        store.save(&SupervisorState::new(5)).await.unwrap();
        store.save(&SupervisorState::new(6)).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["state.json".to_string()]);
    }

    #[tokio::test]
    async fn test_reads_reference_document_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"interval": 15, "programs": {"ls -la": {"active": false}}}"#,
        )
        .unwrap();

        let state = StateStore::new(&path).load(10).await.unwrap();
        assert_eq!(state.interval, 15);
        assert_eq!(
            state.programs.get("ls -la"),
            Some(&ProgramEntry { active: false })
        );
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(StateStore::new(&path).load(10).await.is_err());
    }

    #[tokio::test]
    async fn test_zero_interval_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"interval": 0, "programs": {"echo spin": {"active": true}}}"#,
        )
        .unwrap();

        let state = StateStore::new(&path).load(10).await.unwrap();
        assert_eq!(state.interval, 10);
        assert!(state.programs["echo spin"].active);
    }

    #[tokio::test]
    async fn test_zero_default_interval_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let err = store.load(0).await.unwrap_err();
        assert!(matches!(err, SupervisorError::InvalidInterval(_)));
    }
}
