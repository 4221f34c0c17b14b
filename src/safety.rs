use std::io::Write;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Directories below the project root that patches never touch:
/// version control metadata, installed dependencies and build caches.
const FORBIDDEN_DIRS: &[&str] = &[".git", "vendor", "node_modules", "var"];

/// Keeps patch targets inside the project root.
#[derive(Debug, Clone)]
pub struct WorkspaceGuard {
    /// Canonical project root
    workspace_root: PathBuf,
    forbidden_paths: Vec<PathBuf>,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("path is outside the project: {path} (project: {workspace})")]
    OutsideWorkspace { path: PathBuf, workspace: PathBuf },

    #[error("path is in a protected directory: {path} (protected: {forbidden})")]
    ForbiddenPath { path: PathBuf, forbidden: PathBuf },

    #[error("path escapes its parent directory: {path}")]
    ParentTraversal { path: PathBuf },

    #[error("failed to resolve path: {0}")]
    Canonicalize(#[from] std::io::Error),
}

impl WorkspaceGuard {
    /// The root is canonicalized so symlinked checkouts compare correctly.
    pub fn new(workspace_root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        let workspace_root = workspace_root.as_ref().canonicalize()?;
        let forbidden_paths = FORBIDDEN_DIRS
            .iter()
            .map(|dir| workspace_root.join(dir))
            .collect();
        Ok(Self {
            workspace_root,
            forbidden_paths,
        })
    }

    /// Check an existing file. Returns its canonical path.
    pub fn validate_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let canonical = self.absolute(path.as_ref()).canonicalize()?;
        self.check_canonical(&canonical)?;
        Ok(canonical)
    }

    /// Check a file that may not exist yet.
    ///
    /// The nearest existing ancestor is canonicalized and the missing tail
    /// is appended. Paths containing `..` are rejected outright.
    pub fn validate_new_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let path = path.as_ref();
        if path
            .components()
            .any(|part| matches!(part, Component::ParentDir))
        {
            return Err(SafetyError::ParentTraversal {
                path: path.to_path_buf(),
            });
        }

        let absolute = self.absolute(path);
        if absolute.exists() {
            return self.validate_path(&absolute);
        }

        let mut existing = absolute.as_path();
        let mut missing = Vec::new();
        while !existing.exists() {
            let (Some(name), Some(parent)) = (existing.file_name(), existing.parent()) else {
                return Err(SafetyError::ParentTraversal { path: absolute });
            };
            missing.push(name.to_os_string());
            existing = parent;
        }

        let mut resolved = existing.canonicalize()?;
        resolved.extend(missing.iter().rev());
        self.check_canonical(&resolved)?;
        Ok(resolved)
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        }
    }

    fn check_canonical(&self, canonical: &Path) -> Result<(), SafetyError> {
        if !canonical.starts_with(&self.workspace_root) {
            return Err(SafetyError::OutsideWorkspace {
                path: canonical.to_path_buf(),
                workspace: self.workspace_root.clone(),
            });
        }

        for forbidden in &self.forbidden_paths {
            if canonical.starts_with(forbidden) {
                return Err(SafetyError::ForbiddenPath {
                    path: canonical.to_path_buf(),
                    forbidden: forbidden.clone(),
                });
            }
        }

        Ok(())
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Path relative to the project root, for reports.
    pub fn display_path<'p>(&self, path: &'p Path) -> &'p Path {
        path.strip_prefix(&self.workspace_root).unwrap_or(path)
    }
}

/// Atomic file write: tempfile in the same directory, fsync, rename.
///
/// Readers see either the old or the new content, never a partial file.
pub fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path has no parent directory",
        )
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;

    // keep the permissions of the file being replaced
    if let Ok(metadata) = std::fs::metadata(path) {
        temp.as_file().set_permissions(metadata.permissions())?;
    }

    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn accepts_files_inside_the_project() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path();
        let guard = WorkspaceGuard::new(root).unwrap();

        let file = root.join("config/packages/doctrine.yaml");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, b"").unwrap();

        assert!(guard.validate_path(&file).is_ok());
        assert!(guard.validate_path("config/packages/doctrine.yaml").is_ok());
    }

    #[test]
    fn rejects_files_outside_the_project() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("project");
        fs::create_dir_all(&root).unwrap();
        let guard = WorkspaceGuard::new(&root).unwrap();

        let outside = temp_dir.path().join("outside.yaml");
        fs::write(&outside, b"").unwrap();

        assert!(matches!(
            guard.validate_path(&outside),
            Err(SafetyError::OutsideWorkspace { .. })
        ));
    }

    #[test]
    fn rejects_protected_directories() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path();
        let file = root.join("vendor/acme/config.yaml");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, b"").unwrap();

        let guard = WorkspaceGuard::new(root).unwrap();
        assert!(matches!(
            guard.validate_path(&file),
            Err(SafetyError::ForbiddenPath { .. })
        ));
    }

    #[test]
    fn new_paths_resolve_through_existing_ancestor() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("config")).unwrap();
        let guard = WorkspaceGuard::new(root).unwrap();

        let resolved = guard
            .validate_new_path("config/packages/api_platform.yaml")
            .unwrap();
        assert_eq!(
            resolved,
            guard
                .workspace_root()
                .join("config/packages/api_platform.yaml")
        );
        assert!(matches!(
            guard.validate_new_path("config/../../escape.yaml"),
            Err(SafetyError::ParentTraversal { .. })
        ));
    }

    #[test]
    #[cfg(unix)]
    fn rejects_symlink_escape() {
        use std::os::unix::fs::symlink;

        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("project");
        fs::create_dir_all(&root).unwrap();

        let outside = temp_dir.path().join("outside.yaml");
        fs::write(&outside, b"").unwrap();
        symlink(&outside, root.join("escape.yaml")).unwrap();

        let guard = WorkspaceGuard::new(&root).unwrap();
        assert!(matches!(
            guard.validate_path(root.join("escape.yaml")),
            Err(SafetyError::OutsideWorkspace { .. })
        ));
    }

    #[test]
    fn atomic_write_replaces_content() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("services.yaml");
        fs::write(&file, "old\n").unwrap();
        atomic_write(&file, b"new\n").unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "new\n");
    }
}
