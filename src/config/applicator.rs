//! Patch-set applicator.
//!
//! Patches are grouped by target file in declaration order. Each file is
//! read once, every patch for it runs in memory against the output of the
//! previous one, and the file is written once, atomically, only when all of
//! its patches succeeded and the text actually changed.

use crate::config::schema::{PatchConfig, PatchDefinition};
use crate::patch::{ConfigPatcher, PatchError, PatchStatus};
use crate::safety::{atomic_write, SafetyError, WorkspaceGuard};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result of a single patch that did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
#[must_use = "PatchReport should be checked for success/failure"]
pub enum PatchReport {
    /// The document changed (or would change, when checking)
    Applied { file: String },
    /// The document already satisfied the patch
    AlreadyApplied { file: String, reason: String },
    /// Not attempted or not persisted because another patch for the same
    /// file failed
    Skipped { file: String, reason: String },
}

impl fmt::Display for PatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchReport::Applied { file } => write!(f, "applied to {file}"),
            PatchReport::AlreadyApplied { file, reason } => {
                write!(f, "already applied to {file} ({reason})")
            }
            PatchReport::Skipped { file, reason } => write!(f, "skipped {file}: {reason}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("target file does not exist: {path} (set create_missing to create it)")]
    MissingFile { path: PathBuf },

    #[error("refusing to touch '{file}': {source}")]
    Safety {
        file: String,
        #[source]
        source: SafetyError,
    },

    #[error("cannot infer the document format of '{file}'")]
    UnknownFormat { file: String },

    #[error("{file}: {source}")]
    Patch {
        file: String,
        #[source]
        source: PatchError,
    },
}

impl ApplicationError {
    /// Copy for reporting the same failure against several patches.
    /// `std::io::Error` is not `Clone`, so it is rebuilt from kind and text.
    fn duplicate(&self) -> Self {
        match self {
            ApplicationError::Io { path, source } => ApplicationError::Io {
                path: path.clone(),
                source: std::io::Error::new(source.kind(), source.to_string()),
            },
            ApplicationError::MissingFile { path } => {
                ApplicationError::MissingFile { path: path.clone() }
            }
            ApplicationError::Safety { file, source } => ApplicationError::Safety {
                file: file.clone(),
                source: match source {
                    SafetyError::OutsideWorkspace { path, workspace } => {
                        SafetyError::OutsideWorkspace {
                            path: path.clone(),
                            workspace: workspace.clone(),
                        }
                    }
                    SafetyError::ForbiddenPath { path, forbidden } => SafetyError::ForbiddenPath {
                        path: path.clone(),
                        forbidden: forbidden.clone(),
                    },
                    SafetyError::ParentTraversal { path } => {
                        SafetyError::ParentTraversal { path: path.clone() }
                    }
                    SafetyError::Canonicalize(error) => SafetyError::Canonicalize(
                        std::io::Error::new(error.kind(), error.to_string()),
                    ),
                },
            },
            ApplicationError::UnknownFormat { file } => {
                ApplicationError::UnknownFormat { file: file.clone() }
            }
            ApplicationError::Patch { file, source } => ApplicationError::Patch {
                file: file.clone(),
                source: source.clone(),
            },
        }
    }
}

pub type PatchOutcome = (String, Result<PatchReport, ApplicationError>);

/// Before and after text of one file the run changed (or would change).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Path as declared in the patch set
    pub file: String,
    pub path: PathBuf,
    pub before: String,
    pub after: String,
    /// The file did not exist before the run
    pub created: bool,
}

#[derive(Debug, Default)]
pub struct ApplyOutcome {
    /// One entry per patch, in declaration order
    pub results: Vec<PatchOutcome>,
    pub changes: Vec<FileChange>,
}

impl ApplyOutcome {
    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|(_, result)| result.is_err())
    }

    pub fn count(&self, predicate: impl Fn(&PatchReport) -> bool) -> usize {
        self.results
            .iter()
            .filter(|(_, result)| result.as_ref().is_ok_and(&predicate))
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Write,
    DryRun,
}

/// Apply a patch set to the project at `root`.
pub fn apply_patches(config: &PatchConfig, root: &Path) -> Result<ApplyOutcome, ApplicationError> {
    run(config, root, Mode::Write)
}

/// Same pipeline as [`apply_patches`] without writing anything.
/// `Applied` means "would apply".
pub fn check_patches(config: &PatchConfig, root: &Path) -> Result<ApplyOutcome, ApplicationError> {
    run(config, root, Mode::DryRun)
}

fn run(config: &PatchConfig, root: &Path, mode: Mode) -> Result<ApplyOutcome, ApplicationError> {
    let guard = WorkspaceGuard::new(root).map_err(|source| ApplicationError::Safety {
        file: root.display().to_string(),
        source,
    })?;

    // Group by declared file, keeping the order of first appearance
    let mut groups: Vec<(&str, Vec<(usize, &PatchDefinition)>)> = Vec::new();
    for (index, patch) in config.patches.iter().enumerate() {
        match groups.iter_mut().find(|(file, _)| *file == patch.file) {
            Some((_, members)) => members.push((index, patch)),
            None => groups.push((patch.file.as_str(), vec![(index, patch)])),
        }
    }

    let mut slots: Vec<Option<PatchOutcome>> = Vec::new();
    slots.resize_with(config.patches.len(), || None);
    let mut changes = Vec::new();

    for (file, members) in groups {
        let span = tracing::debug_span!("file", file);
        let _entered = span.enter();

        let (results, change) = process_file(&guard, file, &members, mode);
        for ((index, patch), result) in members.iter().zip(results) {
            slots[*index] = Some((patch.id.clone(), result));
        }
        changes.extend(change);
    }

    Ok(ApplyOutcome {
        results: slots.into_iter().flatten().collect(),
        changes,
    })
}

fn process_file(
    guard: &WorkspaceGuard,
    file: &str,
    members: &[(usize, &PatchDefinition)],
    mode: Mode,
) -> (Vec<Result<PatchReport, ApplicationError>>, Option<FileChange>) {
    let fail_all = |error: ApplicationError| {
        tracing::warn!(%error, "skipping every patch for this file");
        let results: Vec<Result<PatchReport, ApplicationError>> =
            members.iter().map(|_| Err(error.duplicate())).collect();
        (results, None)
    };

    let path = match guard.validate_new_path(file) {
        Ok(path) => path,
        Err(source) => {
            return fail_all(ApplicationError::Safety {
                file: file.to_string(),
                source,
            })
        }
    };

    let exists = path.is_file();
    let create_missing = members.iter().any(|(_, patch)| patch.create_missing);
    if !exists && !create_missing {
        return fail_all(ApplicationError::MissingFile { path });
    }

    let before = if exists {
        match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(source) => return fail_all(ApplicationError::Io { path, source }),
        }
    } else {
        tracing::debug!(path = %path.display(), "target missing; starting from an empty document");
        String::new()
    };

    let mut text = before.clone();
    let mut reports = Vec::with_capacity(members.len());
    for (position, (_, patch)) in members.iter().enumerate() {
        match apply_one(patch, &text) {
            Ok((updated, status)) => {
                let report = match status {
                    PatchStatus::Applied => PatchReport::Applied {
                        file: file.to_string(),
                    },
                    PatchStatus::Unchanged { reason } => PatchReport::AlreadyApplied {
                        file: file.to_string(),
                        reason,
                    },
                };
                tracing::debug!(patch = %patch.id, %report, "patch evaluated");
                text = updated;
                reports.push(Ok(report));
            }
            Err(error) => {
                tracing::warn!(patch = %patch.id, %error, "patch failed; file left untouched");
                let reason = format!("patch '{}' failed; file left untouched", patch.id);
                let results = members
                    .iter()
                    .enumerate()
                    .map(|(other, _)| {
                        if other == position {
                            Err(error.duplicate())
                        } else {
                            Ok(PatchReport::Skipped {
                                file: file.to_string(),
                                reason: reason.clone(),
                            })
                        }
                    })
                    .collect();
                return (results, None);
            }
        }
    }

    if text == before {
        return (reports, None);
    }

    if mode == Mode::Write {
        if let Err(error) = persist(&path, &text) {
            return fail_all(error);
        }
        tracing::info!(
            path = %guard.display_path(&path).display(),
            created = !exists,
            "wrote patched file"
        );
    }

    let change = FileChange {
        file: file.to_string(),
        path,
        before,
        after: text,
        created: !exists,
    };
    (reports, Some(change))
}

fn apply_one(patch: &PatchDefinition, text: &str) -> Result<(String, PatchStatus), ApplicationError> {
    let file = patch.file.clone();
    let format = patch
        .resolved_format()
        .ok_or_else(|| ApplicationError::UnknownFormat { file: file.clone() })?;
    let instruction = patch
        .to_instruction()
        .map_err(|source| ApplicationError::Patch {
            file: file.clone(),
            source,
        })?;
    if instruction.format() != format {
        return Err(ApplicationError::Patch {
            file,
            source: PatchError::FormatMismatch {
                expected: instruction.format(),
                found: format,
            },
        });
    }

    let patched = ConfigPatcher::apply(text, &instruction)
        .map_err(|source| ApplicationError::Patch { file, source })?;
    Ok((patched.text, patched.status))
}

fn persist(path: &Path, text: &str) -> Result<(), ApplicationError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ApplicationError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    atomic_write(path, text.as_bytes()).map_err(|source| ApplicationError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_from_str;

    fn project(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        dir
    }

    #[test]
    fn applies_patches_for_one_file_in_sequence() {
        let dir = project(&[("config/app.yaml", "app:\n    name: demo\n")]);
        let config = load_from_str(
            r#"
[[patches]]
id = "debug"
file = "config/app.yaml"
operation = { type = "set-value", path = "app.debug", value = true }

[[patches]]
id = "bundles"
file = "config/app.yaml"
operation = { type = "append-to-list", path = "app.bundles", value = "Demo" }
"#,
        )
        .unwrap();

        let outcome = apply_patches(&config, dir.path()).unwrap();
        assert!(!outcome.has_failures());
        assert_eq!(outcome.changes.len(), 1);
        assert_eq!(
            fs::read_to_string(dir.path().join("config/app.yaml")).unwrap(),
            "app:\n    name: demo\n    debug: true\n    bundles:\n        - Demo\n"
        );

        let again = apply_patches(&config, dir.path()).unwrap();
        assert!(again.changes.is_empty());
        assert_eq!(
            again.count(|report| matches!(report, PatchReport::AlreadyApplied { .. })),
            2
        );
    }

    #[test]
    fn failing_patch_leaves_file_untouched() {
        let original = "app:\n    name: demo\n";
        let dir = project(&[("app.yaml", original)]);
        let config = load_from_str(
            r#"
[[patches]]
id = "ok"
file = "app.yaml"
operation = { type = "set-value", path = "app.debug", value = true }

[[patches]]
id = "conflict"
file = "app.yaml"
operation = { type = "append-to-list", path = "app.name", value = "x" }
"#,
        )
        .unwrap();

        let outcome = apply_patches(&config, dir.path()).unwrap();
        assert!(matches!(
            outcome.results[0].1,
            Ok(PatchReport::Skipped { .. })
        ));
        assert!(matches!(
            outcome.results[1].1,
            Err(ApplicationError::Patch { .. })
        ));
        assert!(outcome.changes.is_empty());
        assert_eq!(fs::read_to_string(dir.path().join("app.yaml")).unwrap(), original);
    }

    #[test]
    fn missing_file_fails_unless_create_missing() {
        let dir = project(&[]);
        let config = load_from_str(
            r#"
[[patches]]
id = "paths"
file = "config/packages/api_platform.yaml"
operation = { type = "append-to-list", path = "api_platform.mapping.paths", value = "/src" }
"#,
        )
        .unwrap();
        let outcome = apply_patches(&config, dir.path()).unwrap();
        assert!(matches!(
            outcome.results[0].1,
            Err(ApplicationError::MissingFile { .. })
        ));

        let mut config = config;
        config.patches[0].create_missing = true;
        let outcome = apply_patches(&config, dir.path()).unwrap();
        assert!(!outcome.has_failures());
        assert!(outcome.changes[0].created);
        assert_eq!(
            fs::read_to_string(dir.path().join("config/packages/api_platform.yaml")).unwrap(),
            "api_platform:\n    mapping:\n        paths:\n            - /src\n"
        );
    }

    #[test]
    fn create_missing_writes_new_xml_document() {
        let dir = project(&[]);
        let config = load_from_str(
            r#"
[[patches]]
id = "app-env"
file = "phpunit.xml.dist"
create_missing = true
operation = { type = "ensure-element", selector = "/phpunit/php/env[@name='APP_ENV']", attributes = { value = "test" } }

[[patches]]
id = "kernel"
file = "phpunit.xml.dist"
operation = { type = "ensure-element", selector = "/phpunit/php/env[@name='KERNEL_CLASS']", attributes = { value = 'App\Kernel' } }
"#,
        )
        .unwrap();

        let outcome = apply_patches(&config, dir.path()).unwrap();
        assert!(!outcome.has_failures(), "{:?}", outcome.results);
        assert!(outcome.changes[0].created);
        assert_eq!(
            fs::read_to_string(dir.path().join("phpunit.xml.dist")).unwrap(),
            "<phpunit>\n    <php>\n        <env name=\"APP_ENV\" value=\"test\"/>\n        <env name=\"KERNEL_CLASS\" value=\"App\\Kernel\"/>\n    </php>\n</phpunit>\n"
        );

        let again = apply_patches(&config, dir.path()).unwrap();
        assert!(again.changes.is_empty());
    }

    #[test]
    fn check_never_writes() {
        let dir = project(&[("services.xml", "<container/>\n")]);
        let config = load_from_str(
            r#"
[[patches]]
id = "service"
file = "services.xml"
operation = { type = "ensure-element", selector = "/container/services/service[@id='a']" }
"#,
        )
        .unwrap();

        let outcome = check_patches(&config, dir.path()).unwrap();
        assert!(matches!(
            outcome.results[0].1,
            Ok(PatchReport::Applied { .. })
        ));
        assert_eq!(outcome.changes.len(), 1);
        assert_eq!(
            fs::read_to_string(dir.path().join("services.xml")).unwrap(),
            "<container/>\n"
        );
    }

    #[test]
    fn targets_outside_the_project_are_refused() {
        let dir = project(&[]);
        let config = load_from_str(
            r#"
[[patches]]
id = "escape"
file = "../outside.yaml"
create_missing = true
operation = { type = "set-value", path = "a", value = 1 }
"#,
        )
        .unwrap();
        let outcome = apply_patches(&config, dir.path()).unwrap();
        assert!(matches!(
            outcome.results[0].1,
            Err(ApplicationError::Safety { .. })
        ));
    }
}
