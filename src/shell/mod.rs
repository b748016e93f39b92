//! Shell process management.
//!
//! - [`resolve_executable`]: vet a program name before it is ever spawned.
//! - [`process::exec_command`]: run one command line via `<shell> -c` and
//!   capture its output.

use std::path::{Path, PathBuf};

pub mod process;

/// First whitespace-separated token of a command line.
pub fn executable_token(program: &str) -> Option<&str> {
    program.split_whitespace().next()
}

/// Resolve the executable a program name would invoke.
///
/// Tokens containing `/` are treated as paths and must point at an existing
/// executable file; bare names are looked up on `PATH`. Returns `None` when
/// the name is empty or nothing runnable is found.
pub fn resolve_executable(program: &str) -> Option<PathBuf> {
    let token = executable_token(program)?;
    if token.contains('/') {
        let path = Path::new(token);
        return is_executable_file(path).then(|| path.to_path_buf());
    }
    which::which(token).ok()
}

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executable_token() {
        assert_eq!(executable_token("  ping -c 1 127.0.0.1"), Some("ping"));
        assert_eq!(executable_token("ls"), Some("ls"));
        assert_eq!(executable_token("   "), None);
    }

    #[test]
    fn test_resolves_shell_builtin_path() {
        assert!(resolve_executable("sh -c 'echo hi'").is_some());
        assert!(resolve_executable("/bin/sh -c true").is_some());
    }

    #[test]
    fn test_rejects_unknown_and_empty() {
        assert!(resolve_executable("definitely-not-a-real-program-xyz --flag").is_none());
        assert!(resolve_executable("/nonexistent/dir/prog").is_none());
        assert!(resolve_executable("").is_none());
    }
}
