//! Patch instructions and the stateless `ConfigPatcher` entry points.
//!
//! Every operation follows the same lifecycle: parse the input, plan one
//! byte-span [`Edit`], splice it in, then re-parse and re-plan the result.
//! The re-plan must come back as a no-op, which is what makes every
//! operation idempotent.

pub mod errors;
pub mod path;
pub mod value;

pub use errors::PatchError;
pub use path::KeyPath;
pub use value::ConfigValue;

use crate::edit::{Edit, EditResult};
use crate::xml::{ElementSelector, XmlEditor};
use crate::yaml::YamlEditor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Yaml,
    Xml,
}

impl DocumentFormat {
    /// Infer the format from a file name, looking through a trailing `.dist`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        let name = name.strip_suffix(".dist").unwrap_or(&name);
        let extension = name.rsplit_once('.')?.1;
        match extension {
            "yaml" | "yml" => Some(DocumentFormat::Yaml),
            "xml" => Some(DocumentFormat::Xml),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentFormat::Yaml => write!(f, "YAML"),
            DocumentFormat::Xml => write!(f, "XML"),
        }
    }
}

/// What an instruction does at its target.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchMode {
    SetScalar(ConfigValue),
    EnsureListContains(ConfigValue),
    SetIfAbsent(ConfigValue),
    EnsureElement(BTreeMap<String, String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Key(KeyPath),
    Element(ElementSelector),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Key(path) => write!(f, "{path}"),
            Target::Element(selector) => write!(f, "{selector}"),
        }
    }
}

/// A single desired mutation. Constructed through the mode-specific
/// constructors so the target always fits the mode.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchInstruction {
    target: Target,
    mode: PatchMode,
}

impl PatchInstruction {
    pub fn set_value(path: KeyPath, value: impl Into<ConfigValue>) -> Self {
        Self {
            target: Target::Key(path),
            mode: PatchMode::SetScalar(value.into()),
        }
    }

    pub fn append_to_list(path: KeyPath, value: impl Into<ConfigValue>) -> Self {
        Self {
            target: Target::Key(path),
            mode: PatchMode::EnsureListContains(value.into()),
        }
    }

    pub fn set_if_absent(path: KeyPath, value: impl Into<ConfigValue>) -> Self {
        Self {
            target: Target::Key(path),
            mode: PatchMode::SetIfAbsent(value.into()),
        }
    }

    pub fn ensure_element<I, K, V>(selector: ElementSelector, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let attributes = attributes
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect();
        Self {
            target: Target::Element(selector),
            mode: PatchMode::EnsureElement(attributes),
        }
    }

    pub fn format(&self) -> DocumentFormat {
        match self.target {
            Target::Key(_) => DocumentFormat::Yaml,
            Target::Element(_) => DocumentFormat::Xml,
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn mode(&self) -> &PatchMode {
        &self.mode
    }
}

impl fmt::Display for PatchInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.mode {
            PatchMode::SetScalar(value) => write!(f, "set {} = {}", self.target, value),
            PatchMode::EnsureListContains(value) => {
                write!(f, "append {} to {}", value, self.target)
            }
            PatchMode::SetIfAbsent(value) => {
                write!(f, "set {} = {} if absent", self.target, value)
            }
            PatchMode::EnsureElement(attributes) => {
                write!(f, "ensure element {}", self.target)?;
                for (name, value) in attributes {
                    write!(f, " @{name}='{value}'")?;
                }
                Ok(())
            }
        }
    }
}

/// Outcome of planning an instruction against a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Edit(Edit),
    NoOp(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchStatus {
    Applied,
    Unchanged { reason: String },
}

/// Successful patch output. For `Unchanged` the text is the input verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "the patched text must be persisted by the caller"]
pub struct Patched {
    pub text: String,
    pub status: PatchStatus,
}

impl Patched {
    pub fn changed(&self) -> bool {
        matches!(self.status, PatchStatus::Applied)
    }
}

pub type PatchResult = Result<Patched, PatchError>;

/// Stateless facade over the YAML and XML editors.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigPatcher;

impl ConfigPatcher {
    pub fn apply(text: &str, instruction: &PatchInstruction) -> PatchResult {
        match (&instruction.target, &instruction.mode) {
            (Target::Key(path), PatchMode::SetScalar(value)) => {
                Self::set_mapping_value(text, path, value)
            }
            (Target::Key(path), PatchMode::EnsureListContains(value)) => {
                Self::append_to_list(text, path, value)
            }
            (Target::Key(path), PatchMode::SetIfAbsent(value)) => {
                Self::set_if_absent(text, path, value)
            }
            (Target::Element(selector), PatchMode::EnsureElement(attributes)) => {
                Self::ensure_element(text, selector, attributes)
            }
            (Target::Key(_), PatchMode::EnsureElement(_)) => Err(PatchError::FormatMismatch {
                expected: DocumentFormat::Xml,
                found: DocumentFormat::Yaml,
            }),
            (Target::Element(_), _) => Err(PatchError::FormatMismatch {
                expected: DocumentFormat::Yaml,
                found: DocumentFormat::Xml,
            }),
        }
    }

    /// Ensure the node at `path` holds exactly `value`.
    pub fn set_mapping_value(text: &str, path: &KeyPath, value: &ConfigValue) -> PatchResult {
        let plan = YamlEditor::parse(text)?.plan_set(path, value)?;
        finish(text, plan, |updated| {
            YamlEditor::parse(updated)?.plan_set(path, value)
        })
    }

    /// Ensure the list at `path` contains `value` exactly once.
    pub fn append_to_list(text: &str, path: &KeyPath, value: &ConfigValue) -> PatchResult {
        let plan = YamlEditor::parse(text)?.plan_append(path, value)?;
        finish(text, plan, |updated| {
            YamlEditor::parse(updated)?.plan_append(path, value)
        })
    }

    /// Create the node at `path` only when nothing is there yet.
    pub fn set_if_absent(text: &str, path: &KeyPath, value: &ConfigValue) -> PatchResult {
        let plan = YamlEditor::parse(text)?.plan_set_if_absent(path, value)?;
        finish(text, plan, |updated| {
            YamlEditor::parse(updated)?.plan_set_if_absent(path, value)
        })
    }

    /// Ensure an element matching `selector` exists and carries `attributes`.
    pub fn ensure_element(
        text: &str,
        selector: &ElementSelector,
        attributes: &BTreeMap<String, String>,
    ) -> PatchResult {
        let plan = XmlEditor::parse(text)?.plan_ensure(selector, attributes)?;
        finish(text, plan, |updated| {
            XmlEditor::parse(updated)?.plan_ensure(selector, attributes)
        })
    }
}

fn finish<F>(text: &str, plan: Plan, replan: F) -> PatchResult
where
    F: Fn(&str) -> Result<Plan, PatchError>,
{
    let edit = match plan {
        Plan::NoOp(reason) => {
            tracing::debug!(%reason, "no change needed");
            return Ok(Patched {
                text: text.to_string(),
                status: PatchStatus::Unchanged { reason },
            });
        }
        Plan::Edit(edit) => edit,
    };

    tracing::debug!(
        byte_start = edit.byte_start,
        byte_end = edit.byte_end,
        "splicing planned edit"
    );

    let updated = match edit.apply_to(text)? {
        EditResult::Applied { text, .. } => text,
        EditResult::AlreadyApplied => {
            return Ok(Patched {
                text: text.to_string(),
                status: PatchStatus::Unchanged {
                    reason: "span already holds the new text".to_string(),
                },
            });
        }
    };

    match replan(&updated)? {
        Plan::NoOp(_) => Ok(Patched {
            text: updated,
            status: PatchStatus::Applied,
        }),
        Plan::Edit(_) => Err(PatchError::unsupported(
            "edit did not converge; the document uses a construct this patcher cannot reproduce",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(text: &str) -> KeyPath {
        KeyPath::parse(text).unwrap()
    }

    #[test]
    fn format_from_path() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("config/packages/doctrine.yaml")),
            Some(DocumentFormat::Yaml)
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("phpunit.xml.dist")),
            Some(DocumentFormat::Xml)
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("services.yml")),
            Some(DocumentFormat::Yaml)
        );
        assert_eq!(DocumentFormat::from_path(Path::new("composer.json")), None);
        assert_eq!(DocumentFormat::from_path(Path::new("Makefile")), None);
    }

    #[test]
    fn set_then_append_scenario() {
        let input = "doctrine:\n  orm:\n    mappings: {}\n";
        let first = ConfigPatcher::set_mapping_value(
            input,
            &path("doctrine.dbal.types.customer_id"),
            &r"App\Type\CustomerIdType".into(),
        )
        .unwrap();
        assert!(first.changed());
        assert!(first.text.starts_with("doctrine:\n  orm:\n    mappings: {}\n"));

        let doc: serde_yaml::Value = serde_yaml::from_str(&first.text).unwrap();
        assert_eq!(
            doc["doctrine"]["dbal"]["types"]["customer_id"],
            serde_yaml::Value::String(r"App\Type\CustomerIdType".to_string())
        );

        let paths = path("api_platform.mapping.paths");
        let second =
            ConfigPatcher::append_to_list(&first.text, &paths, &"/src/Resource".into()).unwrap();
        let third =
            ConfigPatcher::append_to_list(&second.text, &paths, &"/src/Resource".into()).unwrap();
        assert!(second.changed());
        assert!(!third.changed());
        assert_eq!(second.text, third.text);

        let doc: serde_yaml::Value = serde_yaml::from_str(&third.text).unwrap();
        let list = doc["api_platform"]["mapping"]["paths"].as_sequence().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0], serde_yaml::Value::String("/src/Resource".into()));
    }

    #[test]
    fn apply_dispatches_element_instruction() {
        let selector = ElementSelector::parse("/container").unwrap();
        let instruction = PatchInstruction::ensure_element(selector, [("a", "b")]);
        assert_eq!(instruction.format(), DocumentFormat::Xml);
        let result = ConfigPatcher::apply("<container/>", &instruction).unwrap();
        assert_eq!(result.text, "<container a=\"b\"/>");
    }

    #[test]
    fn unchanged_returns_input_verbatim() {
        let input = "# keep\nkey: value   # trailing\n";
        let result = ConfigPatcher::set_mapping_value(input, &path("key"), &"value".into()).unwrap();
        assert_eq!(result.text, input);
        assert!(matches!(result.status, PatchStatus::Unchanged { .. }));
    }

    #[test]
    fn parse_errors_are_reported() {
        let err = ConfigPatcher::set_mapping_value("key: [unclosed", &path("key"), &"x".into())
            .unwrap_err();
        assert!(err.is_parse_error());
    }
}
