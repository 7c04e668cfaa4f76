//! Command path resolution and checksums.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Extensions tried, in order, when the command as given does not exist.
pub const PROBE_EXTENSIONS: [&str; 4] = ["exe", "bat", "cmd", "lnk"];

/// Access to the command files a request names.
pub trait CommandFiles: Send + Sync {
    /// Resolves a bare or partial command to an existing file.
    fn resolve(&self, command: &str) -> Option<PathBuf>;

    /// Lower-case hex MD5 of the file, `None` if it cannot be read.
    fn md5(&self, path: &Path) -> Option<String>;
}

/// Returns `true` for commands naming a shell built-in.
///
/// Matches `cd`, `dir` and `type` anywhere in the command,
/// case-insensitively.
#[must_use]
pub fn is_shell_builtin(command: &str) -> bool {
    let lower = command.to_lowercase();
    ["cd", "dir", "type"].iter().any(|b| lower.contains(b))
}

/// [`CommandFiles`] backed by the local filesystem and `PATH`.
#[derive(Debug, Clone, Default)]
pub struct LocalFiles {
    search_path: Option<OsString>,
}

impl LocalFiles {
    /// Searches the process `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Searches `path` (in `PATH` syntax) instead of the process `PATH`.
    #[must_use]
    pub fn with_search_path(path: impl Into<OsString>) -> Self {
        Self {
            search_path: Some(path.into()),
        }
    }

    fn search_dirs(&self) -> Vec<PathBuf> {
        let path = match &self.search_path {
            Some(p) => Some(p.clone()),
            None => std::env::var_os("PATH"),
        };
        path.map(|p| std::env::split_paths(&p).collect())
            .unwrap_or_default()
    }
}

/// `path` itself, else `path` with each candidate extension appended.
fn existing_file(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    PROBE_EXTENSIONS.iter().find_map(|ext| {
        let mut candidate = path.as_os_str().to_os_string();
        candidate.push(".");
        candidate.push(ext);
        let candidate = PathBuf::from(candidate);
        candidate.is_file().then_some(candidate)
    })
}

impl CommandFiles for LocalFiles {
    fn resolve(&self, command: &str) -> Option<PathBuf> {
        if command.contains(['\\', '/']) {
            return existing_file(Path::new(command));
        }
        self.search_dirs()
            .iter()
            .filter(|dir| !dir.as_os_str().is_empty())
            .find_map(|dir| existing_file(&dir.join(command)))
    }

    fn md5(&self, path: &Path) -> Option<String> {
        match std::fs::read(path) {
            Ok(bytes) => Some(format!("{:x}", md5::compute(bytes))),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "checksum read failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_match_as_substrings() {
        assert!(is_shell_builtin("cd"));
        assert!(is_shell_builtin("DIR"));
        assert!(is_shell_builtin("c:\\windows\\Type.exe"));
        assert!(is_shell_builtin("mkdir"));
        assert!(!is_shell_builtin("c:\\tools\\build.exe"));
    }

    #[test]
    fn resolves_explicit_path_with_probing() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("tool");
        std::fs::write(dir.path().join("tool.bat"), "@echo off").unwrap();
        std::fs::write(dir.path().join("tool.cmd"), "@echo off").unwrap();

        let files = LocalFiles::with_search_path("");
        let resolved = files.resolve(plain.to_str().unwrap()).unwrap();
        assert_eq!(resolved, dir.path().join("tool.bat"));

        std::fs::write(&plain, "x").unwrap();
        assert_eq!(files.resolve(plain.to_str().unwrap()).unwrap(), plain);
    }

    #[test]
    fn searches_path_in_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(second.path().join("build.exe"), "x").unwrap();
        std::fs::write(first.path().join("build.lnk"), "x").unwrap();

        let path = std::env::join_paths([first.path(), second.path()]).unwrap();
        let files = LocalFiles::with_search_path(path);
        assert_eq!(
            files.resolve("build").unwrap(),
            first.path().join("build.lnk")
        );
        assert!(files.resolve("missing").is_none());
    }

    #[test]
    fn md5_of_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.exe");
        std::fs::write(&path, b"").unwrap();
        let files = LocalFiles::new();
        assert_eq!(
            files.md5(&path).as_deref(),
            Some("d41d8cd98f00b204e9800998ecf8427e")
        );
        assert!(files.md5(&dir.path().join("nope")).is_none());
    }
}
