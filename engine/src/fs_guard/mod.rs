use sdk::errors::EngineError;
use std::path::{Component, Path, PathBuf};

/// System directories that no tool may modify.
pub const PROTECTED_PREFIXES: &[&str] = &[
    "/etc", "/boot", "/sys", "/proc", "/dev", "/usr/bin", "/usr/sbin", "/bin", "/sbin",
];

/// FileSystemGuard rejects writes into protected system directories.
///
/// The check is static and unconditional: a rejected path never reaches the
/// permission gate. Matching is per path component, so `/etcetera` is not
/// covered by `/etc`.
///
/// # Security Model
///
/// The guard runs three gates over an absolute target path:
/// 1. Check the lexically normalized path (`.` and `..` folded)
/// 2. Canonicalize the deepest existing ancestor to resolve symlinks
/// 3. Check the canonical form again (catches links into system dirs)
///
/// Paths that do not exist yet are supported, since writes usually create
/// new files.
#[derive(Debug, Clone)]
pub struct FileSystemGuard {
    protected: Vec<PathBuf>,
}

impl Default for FileSystemGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystemGuard {
    /// Creates a guard over the fixed system prefixes.
    pub fn new() -> Self {
        Self {
            protected: PROTECTED_PREFIXES.iter().map(PathBuf::from).collect(),
        }
    }

    /// Adds more protected prefixes on top of the fixed list.
    pub fn with_extra<I, P>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.protected.extend(extra.into_iter().map(Into::into));
        self
    }

    /// Validates that `path` may be written.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ProtectedPath` naming the matched prefix.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::Path;
    /// use clio_engine::fs_guard::FileSystemGuard;
    ///
    /// let guard = FileSystemGuard::new();
    /// assert!(guard.check_writable(Path::new("/etc/passwd")).is_err());
    /// assert!(guard.check_writable(Path::new("/tmp/project/notes.txt")).is_ok());
    /// ```
    pub fn check_writable(&self, path: &Path) -> Result<(), EngineError> {
        // Gate 1: lexical
        let normalized = normalize(path);
        self.check_prefix(&normalized)?;

        // Gates 2 and 3: resolve symlinks through the deepest existing ancestor
        if let Some(canonical) = canonicalize_existing_prefix(&normalized) {
            if canonical != normalized {
                self.check_prefix(&canonical)?;
            }
        }

        Ok(())
    }

    fn check_prefix(&self, path: &Path) -> Result<(), EngineError> {
        match self.protected.iter().find(|p| path.starts_with(p)) {
            Some(prefix) => Err(EngineError::ProtectedPath {
                path: path.to_path_buf(),
                prefix: prefix.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Returns the protected prefixes.
    pub fn protected_prefixes(&self) -> &[PathBuf] {
        &self.protected
    }
}

/// Fold `.` and `..` without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize the longest existing ancestor and re-append the rest.
fn canonicalize_existing_prefix(path: &Path) -> Option<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut rest = Vec::new();

    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut full = canonical;
            for part in rest.iter().rev() {
                full.push(part);
            }
            return Some(full);
        }
        let name = existing.file_name()?.to_os_string();
        rest.push(name);
        if !existing.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_every_fixed_prefix_blocked() {
        let guard = FileSystemGuard::new();
        for prefix in PROTECTED_PREFIXES {
            let target = Path::new(prefix).join("anything");
            let result = guard.check_writable(&target);
            assert!(
                matches!(result, Err(EngineError::ProtectedPath { .. })),
                "{} should be protected",
                target.display()
            );
        }
    }

    #[test]
    fn test_prefix_itself_blocked() {
        let guard = FileSystemGuard::new();
        assert!(guard.check_writable(Path::new("/etc")).is_err());
    }

    #[test]
    fn test_component_match_not_string_prefix() {
        let guard = FileSystemGuard::new();
        assert!(guard.check_writable(Path::new("/etcetera/file")).is_ok());
        assert!(guard.check_writable(Path::new("/binaries/x")).is_ok());
    }

    #[test]
    fn test_traversal_into_protected() {
        let guard = FileSystemGuard::new();
        let result = guard.check_writable(Path::new("/tmp/../etc/hosts"));
        assert!(matches!(
            result,
            Err(EngineError::ProtectedPath { ref prefix, .. }) if prefix == Path::new("/etc")
        ));
    }

    #[test]
    fn test_new_file_in_temp_allowed() {
        let temp = TempDir::new().unwrap();
        let guard = FileSystemGuard::new();
        let target = temp.path().join("a/b/new.txt");
        assert!(guard.check_writable(&target).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_into_protected_dir() {
        let temp = TempDir::new().unwrap();
        let link = temp.path().join("sneaky");
        std::os::unix::fs::symlink("/etc", &link).unwrap();

        let guard = FileSystemGuard::new();
        let result = guard.check_writable(&link.join("hosts"));
        assert!(matches!(result, Err(EngineError::ProtectedPath { .. })));
    }

    #[test]
    fn test_extra_prefixes() {
        let temp = TempDir::new().unwrap();
        let locked = temp.path().join("locked");
        fs::create_dir(&locked).unwrap();

        let guard = FileSystemGuard::new().with_extra([locked.clone()]);
        assert!(guard.check_writable(&locked.join("x.txt")).is_err());
        assert_eq!(guard.protected_prefixes().len(), PROTECTED_PREFIXES.len() + 1);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("a/../../b")), PathBuf::from("../b"));
    }
}
