//! Per-program output archive.
//!
//! Each program gets one directory under the output root. Every run writes a
//! new artifact `run_<YYYY-MM-DD_HH-MM-SS>.<ext>` holding stdout followed by
//! stderr; artifacts are never modified afterwards. Reading the archive back
//! concatenates all artifacts in filename order, which is chronological.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Local;
use tracing::warn;

use crate::error::{Result, SupervisorError};

/// Artifact filename prefix.
const ARTIFACT_PREFIX: &str = "run_";

/// Timestamp layout used in artifact names (second resolution, local time).
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Counter for unique staging-file names within this process.
static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Handle on the output root. Cheap to clone.
#[derive(Debug, Clone)]
pub struct OutputArchive {
    root: PathBuf,
    extension: String,
}

impl OutputArchive {
    pub fn new(root: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            root: root.into(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    /// Directory holding the artifacts of `program`.
    pub fn program_dir(&self, program: &str) -> PathBuf {
        self.root.join(encode_dir_name(program))
    }

    /// Store one run's output as a new artifact and return its path.
    ///
    /// Creates the program directory on first use. The content is written to
    /// a hidden staging file and then linked under its final name, so readers
    /// never see a partial artifact. Two runs finishing in the same second
    /// get `_001`, `_002`, ... appended so neither is overwritten.
    pub async fn write_artifact(&self, program: &str, content: &str) -> Result<PathBuf> {
        let dir = self.program_dir(program);
        tokio::fs::create_dir_all(&dir).await?;

        let seq = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);
        let staging = dir.join(format!(".progd_tmp_{}_{}", std::process::id(), seq));
        tokio::fs::write(&staging, content.as_bytes()).await?;

        let stamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        let mut attempt = 0u32;
        let linked = loop {
            let file_name = if attempt == 0 {
                format!("{ARTIFACT_PREFIX}{stamp}.{}", self.extension)
            } else {
                format!("{ARTIFACT_PREFIX}{stamp}_{attempt:03}.{}", self.extension)
            };
            let path = dir.join(file_name);
            match tokio::fs::hard_link(&staging, &path).await {
                Ok(()) => break Ok(path),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => break Err(e),
            }
        };

        if let Err(e) = tokio::fs::remove_file(&staging).await {
            warn!("Failed to remove staging file {}: {e}", staging.display());
        }
        linked.map_err(Into::into)
    }

    /// Concatenate every artifact of `program`, oldest first, each preceded
    /// by a `==== <filename> ====` delimiter line.
    pub async fn read_all(&self, program: &str) -> Result<String> {
        let dir = self.program_dir(program);
        let mut read_dir = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SupervisorError::OutputNotFound(program.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(ARTIFACT_PREFIX) {
                names.push(name);
            }
        }
        names.sort();

        let mut combined = String::new();
        for name in &names {
            let bytes = tokio::fs::read(dir.join(name)).await?;
            let _ = write!(
                combined,
                "\n==== {name} ====\n{}\n",
                String::from_utf8_lossy(&bytes)
            );
        }
        Ok(combined)
    }
}

/// Map a program name onto a single flat directory name.
///
/// Only `/` and `%` are escaped; everything else (spaces included) is kept so
/// the directory stays recognisable next to the command it came from.
pub fn encode_dir_name(program: &str) -> String {
    let mut out = String::with_capacity(program.len());
    for c in program.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            _ => out.push(c),
        }
    }
    if out == "." || out == ".." {
        out = out.replace('.', "%2E");
    }
    out
}
