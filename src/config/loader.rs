use crate::config::schema::{PatchConfig, ValidationError};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read patch set {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse patch set TOML{}: {source}", describe(path))]
    Toml {
        path: Option<PathBuf>,
        #[source]
        source: toml_edit::de::Error,
    },

    #[error("invalid patch set{}:\n{source}", describe(path))]
    Validation {
        path: Option<PathBuf>,
        #[source]
        source: ValidationError,
    },

    #[error("failed to scan {} for patch sets: {source}", dir.display())]
    Discovery {
        dir: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

fn describe(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|path| format!(" ({})", path.display()))
        .unwrap_or_default()
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = Some(path.to_path_buf());
        match self {
            ConfigError::Toml { path: None, source } => ConfigError::Toml { path, source },
            ConfigError::Validation { path: None, source } => {
                ConfigError::Validation { path, source }
            }
            other => other,
        }
    }
}

pub fn load_from_str(input: &str) -> Result<PatchConfig, ConfigError> {
    let config: PatchConfig = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    config
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(config)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<PatchConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.with_path(path))
}

/// Every `*.toml` file below `dir`, sorted so runs are reproducible.
/// A missing directory yields no files.
pub fn discover(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, ConfigError> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|source| ConfigError::Discovery {
            dir: dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|ext| ext.to_str()) == Some("toml")
        {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{Operation, ValidationIssue};
    use crate::patch::{ConfigValue, DocumentFormat};

    const DOCTRINE_TYPES: &str = r#"
[meta]
name = "doctrine-types"

[[patches]]
id = "customer-id-type"
file = "config/packages/doctrine.yaml"

[patches.operation]
type = "set-value"
path = "doctrine.dbal.types.customer_id"
value = 'App\Infrastructure\Doctrine\DBAL\Type\CustomerIdType'

[[patches]]
id = "services-entry"
file = "config/services.xml"

[patches.operation]
type = "ensure-element"
selector = "/container/services/service[@id='app.customer']"
attributes = { class = 'App\Customer' }
"#;

    #[test]
    fn loads_operations_of_each_format() {
        let config = load_from_str(DOCTRINE_TYPES).unwrap();
        assert_eq!(config.meta.name, "doctrine-types");
        assert_eq!(config.patches.len(), 2);

        let first = &config.patches[0];
        assert_eq!(first.resolved_format(), Some(DocumentFormat::Yaml));
        assert_eq!(
            first.operation,
            Operation::SetValue {
                path: "doctrine.dbal.types.customer_id".to_string(),
                value: ConfigValue::String(
                    r"App\Infrastructure\Doctrine\DBAL\Type\CustomerIdType".to_string()
                ),
            }
        );
        assert_eq!(config.patches[1].resolved_format(), Some(DocumentFormat::Xml));
        assert!(config.patches[1].to_instruction().is_ok());
    }

    #[test]
    fn collects_every_validation_issue() {
        let input = r#"
[[patches]]
id = "dup"
file = "a.yaml"
operation = { type = "set-value", path = "a..b", value = 1 }

[[patches]]
id = "dup"
file = "b.yaml"
operation = { type = "ensure-element", selector = "/root" }

[[patches]]
id = "unknown"
file = "composer.json"
operation = { type = "append-to-list", path = "a", value = "x" }
"#;
        let err = load_from_str(input).unwrap_err();
        let ConfigError::Validation { source, .. } = err else {
            panic!("expected validation error, got {err}");
        };
        assert_eq!(source.issues.len(), 4);
        assert!(source
            .issues
            .contains(&ValidationIssue::DuplicateId { id: "dup".to_string() }));
    }

    #[test]
    fn rejects_datetime_values() {
        let input = r#"
[[patches]]
id = "when"
file = "a.yaml"
operation = { type = "set-value", path = "a", value = 1979-05-27 }
"#;
        assert!(matches!(
            load_from_str(input),
            Err(ConfigError::Toml { .. })
        ));
    }

    #[test]
    fn explicit_format_overrides_extension() {
        let input = r#"
[[patches]]
id = "dist"
file = "config/app.conf"
format = "yaml"
operation = { type = "set-if-absent", path = "app.debug", value = false }
"#;
        let config = load_from_str(input).unwrap();
        assert_eq!(config.patches[0].resolved_format(), Some(DocumentFormat::Yaml));
    }

    #[test]
    fn empty_patch_list_is_invalid() {
        let err = load_from_str("[meta]\nname = \"nothing\"\n").unwrap_err();
        assert!(err.to_string().contains("contains no patches"));
    }

    #[test]
    fn path_errors_mention_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("broken.toml");
        fs::write(&file, "[[patches]\n").unwrap();
        let err = load_from_path(&file).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn discovers_toml_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("b.toml"), "").unwrap();
        fs::write(dir.path().join("nested/a.toml"), "").unwrap();
        fs::write(dir.path().join("notes.md"), "").unwrap();

        let files = discover(dir.path()).unwrap();
        assert_eq!(
            files,
            vec![dir.path().join("b.toml"), dir.path().join("nested/a.toml")]
        );
        assert!(discover(dir.path().join("missing")).unwrap().is_empty());
    }
}
