use crate::patch::{ConfigValue, DocumentFormat, KeyPath, PatchError, PatchInstruction};
use crate::xml::ElementSelector;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct PatchConfig {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub patches: Vec<PatchDefinition>,
}

impl PatchConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.patches.is_empty() {
            issues.push(ValidationIssue::EmptyPatchList);
        }

        let mut seen = HashSet::new();
        for patch in &self.patches {
            let patch_id = (!patch.id.trim().is_empty()).then(|| patch.id.clone());
            match &patch_id {
                None => issues.push(ValidationIssue::MissingField {
                    patch_id: None,
                    field: "id",
                }),
                Some(id) => {
                    if !seen.insert(patch.id.as_str()) {
                        issues.push(ValidationIssue::DuplicateId { id: id.clone() });
                    }
                }
            }

            if patch.file.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: patch_id.clone(),
                    field: "file",
                });
            } else {
                match patch.resolved_format() {
                    None => issues.push(ValidationIssue::InvalidCombo {
                        patch_id: patch_id.clone(),
                        message: format!(
                            "cannot infer the document format of '{}'; set `format`",
                            patch.file
                        ),
                    }),
                    Some(format) if format != patch.operation.format() => {
                        issues.push(ValidationIssue::InvalidCombo {
                            patch_id: patch_id.clone(),
                            message: format!(
                                "{} operation cannot target a {format} document",
                                patch.operation.kind()
                            ),
                        })
                    }
                    Some(_) => {}
                }
            }

            match &patch.operation {
                Operation::SetValue { path, .. }
                | Operation::AppendToList { path, .. }
                | Operation::SetIfAbsent { path, .. } => {
                    if path.trim().is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            patch_id: patch_id.clone(),
                            field: "operation.path",
                        });
                    } else if let Err(error) = KeyPath::parse(path) {
                        issues.push(ValidationIssue::InvalidCombo {
                            patch_id: patch_id.clone(),
                            message: error.to_string(),
                        });
                    }
                }
                Operation::EnsureElement { selector, .. } => {
                    if selector.trim().is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            patch_id: patch_id.clone(),
                            field: "operation.selector",
                        });
                    } else if let Err(error) = ElementSelector::parse(selector) {
                        issues.push(ValidationIssue::InvalidCombo {
                            patch_id: patch_id.clone(),
                            message: error.to_string(),
                        });
                    }
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PatchDefinition {
    pub id: String,
    /// Path of the target document, relative to the project root
    pub file: String,
    /// Overrides the format inferred from the file extension
    #[serde(default)]
    pub format: Option<DocumentFormat>,
    /// Treat a missing file as an empty document and create it
    #[serde(default)]
    pub create_missing: bool,
    pub operation: Operation,
}

impl PatchDefinition {
    pub fn resolved_format(&self) -> Option<DocumentFormat> {
        self.format
            .or_else(|| DocumentFormat::from_path(Path::new(&self.file)))
    }

    pub fn to_instruction(&self) -> Result<PatchInstruction, PatchError> {
        let instruction = match &self.operation {
            Operation::SetValue { path, value } => {
                PatchInstruction::set_value(KeyPath::parse(path)?, value.clone())
            }
            Operation::AppendToList { path, value } => {
                PatchInstruction::append_to_list(KeyPath::parse(path)?, value.clone())
            }
            Operation::SetIfAbsent { path, value } => {
                PatchInstruction::set_if_absent(KeyPath::parse(path)?, value.clone())
            }
            Operation::EnsureElement {
                selector,
                attributes,
            } => PatchInstruction::ensure_element(
                ElementSelector::parse(selector)?,
                attributes.clone(),
            ),
        };
        Ok(instruction)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Operation {
    SetValue {
        path: String,
        value: ConfigValue,
    },
    AppendToList {
        path: String,
        value: ConfigValue,
    },
    SetIfAbsent {
        path: String,
        value: ConfigValue,
    },
    EnsureElement {
        selector: String,
        #[serde(default)]
        attributes: BTreeMap<String, String>,
    },
}

impl Operation {
    pub fn format(&self) -> DocumentFormat {
        match self {
            Operation::EnsureElement { .. } => DocumentFormat::Xml,
            _ => DocumentFormat::Yaml,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Operation::SetValue { .. } => "set-value",
            Operation::AppendToList { .. } => "append-to-list",
            Operation::SetIfAbsent { .. } => "set-if-absent",
            Operation::EnsureElement { .. } => "ensure-element",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    EmptyPatchList,
    MissingField {
        patch_id: Option<String>,
        field: &'static str,
    },
    DuplicateId {
        id: String,
    },
    InvalidCombo {
        patch_id: Option<String>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyPatchList => write!(f, "patch config contains no patches"),
            ValidationIssue::MissingField { patch_id, field } => match patch_id {
                Some(id) => write!(f, "patch '{id}' missing required field '{field}'"),
                None => write!(f, "patch missing required field '{field}'"),
            },
            ValidationIssue::DuplicateId { id } => write!(f, "duplicate patch id '{id}'"),
            ValidationIssue::InvalidCombo { patch_id, message } => match patch_id {
                Some(id) => write!(f, "patch '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid patch configuration: {message}"),
            },
        }
    }
}
