//! Containment check for deletion candidates
//!
//! A path is safe when it resolves, symlinks followed, to a location under
//! the deletion root and not into a system directory. `/mnt` is allowed when
//! the deletion root itself lives below it, which is the usual Unraid layout.

use std::path::{Path, PathBuf};

use crate::error::{AuditError, AuditResult};

pub const PROTECTED_PATHS: &[&str] = &[
    "/", "/bin", "/boot", "/dev", "/etc", "/home", "/lib", "/lib64", "/mnt", "/opt", "/proc",
    "/root", "/run", "/sbin", "/srv", "/sys", "/tmp", "/usr", "/var",
];

const USER_MOUNT: &str = "/mnt";

#[derive(Debug, Clone)]
pub struct PathSafety {
    delete_root: PathBuf,
    protected: Vec<PathBuf>,
}

impl PathSafety {
    /// Resolve `delete_root` and check it against the default protected list
    pub fn new(delete_root: &Path) -> AuditResult<Self> {
        Self::with_protected_paths(delete_root, PROTECTED_PATHS.iter().map(PathBuf::from).collect())
    }

    pub fn with_protected_paths(delete_root: &Path, protected: Vec<PathBuf>) -> AuditResult<Self> {
        let resolved = delete_root
            .canonicalize()
            .map_err(|source| AuditError::DeleteRootUnresolvable {
                path: delete_root.to_path_buf(),
                source,
            })?;
        if protected.iter().any(|p| p == &resolved) {
            return Err(AuditError::UnsafeDeleteRoot(resolved));
        }
        Ok(Self {
            delete_root: resolved,
            protected,
        })
    }

    pub fn delete_root(&self) -> &Path {
        &self.delete_root
    }

    /// Whether the deletion root sits inside a protected tree, which makes
    /// every candidate unsafe
    pub fn root_is_shadowed(&self) -> bool {
        self.protected_hit(&self.delete_root).is_some()
    }

    fn protected_hit(&self, resolved: &Path) -> Option<&Path> {
        let carve_out = self.delete_root.starts_with(USER_MOUNT) && self.delete_root != Path::new(USER_MOUNT);
        self.protected
            .iter()
            .map(PathBuf::as_path)
            .filter(|p| !(carve_out && *p == Path::new(USER_MOUNT)))
            .find(|p| {
                if *p == Path::new("/") {
                    resolved == *p
                } else {
                    resolved.starts_with(p)
                }
            })
    }

    /// Resolve `path` and return it when it may be deleted
    pub fn resolve_safe(&self, path: &Path) -> Option<PathBuf> {
        let resolved = path.canonicalize().ok()?;
        if !resolved.starts_with(&self.delete_root) || resolved == self.delete_root {
            return None;
        }
        if self.protected_hit(&resolved).is_some() {
            return None;
        }
        Some(resolved)
    }

    pub fn is_safe(&self, path: &Path) -> bool {
        self.resolve_safe(path).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Temp dirs live under /tmp, which is itself protected
    fn safety_for(root: &Path) -> PathSafety {
        let protected = PROTECTED_PATHS
            .iter()
            .filter(|p| **p != "/tmp")
            .map(PathBuf::from)
            .collect();
        PathSafety::with_protected_paths(root, protected).unwrap()
    }

    #[test]
    fn test_system_path_root_is_rejected() {
        assert!(matches!(
            PathSafety::new(Path::new("/etc")),
            Err(AuditError::UnsafeDeleteRoot(_))
        ));
        assert!(matches!(
            PathSafety::new(Path::new("/")),
            Err(AuditError::UnsafeDeleteRoot(_))
        ));
    }

    #[test]
    fn test_missing_root_is_unresolvable() {
        assert!(matches!(
            PathSafety::new(Path::new("/definitely/not/here")),
            Err(AuditError::DeleteRootUnresolvable { .. })
        ));
    }

    #[test]
    fn test_containment() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("media");
        fs::create_dir_all(&root).unwrap();
        let inside = root.join("a.mkv");
        let outside = dir.path().join("b.mkv");
        fs::write(&inside, b"x").unwrap();
        fs::write(&outside, b"x").unwrap();

        let safety = safety_for(&root);
        assert!(safety.is_safe(&inside));
        assert!(!safety.is_safe(&outside));
        assert!(!safety.is_safe(&root));
        assert!(!safety.is_safe(&root.join("missing.mkv")));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escaping_root_is_unsafe() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("media");
        fs::create_dir_all(&root).unwrap();
        let target = dir.path().join("elsewhere.mkv");
        fs::write(&target, b"x").unwrap();
        let link = root.join("link.mkv");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert!(!safety_for(&root).is_safe(&link));
    }

    #[test]
    fn test_default_list_blocks_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.mkv");
        fs::write(&file, b"x").unwrap();
        let safety = PathSafety::new(dir.path()).unwrap();
        if safety.delete_root().starts_with("/tmp") {
            assert!(safety.root_is_shadowed());
            assert!(!safety.is_safe(&file));
        }
    }
}
