use crate::edit::EditError;
use crate::patch::DocumentFormat;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("invalid {format} document: {message}")]
    Parse {
        format: DocumentFormat,
        message: String,
    },

    #[error("incompatible shape at '{path}': expected {expected}, found {found}")]
    IncompatibleShape {
        path: String,
        expected: String,
        found: String,
    },

    #[error("cannot create '{path}': '{blocking}' holds a {found}, not a mapping")]
    PathNotCreatable {
        path: String,
        blocking: String,
        found: String,
    },

    #[error("ambiguous match for '{selector}': {count} elements")]
    AmbiguousMatch { selector: String, count: usize },

    #[error("invalid key path '{input}': {message}")]
    InvalidPath { input: String, message: String },

    #[error("invalid element selector '{input}': {message}")]
    InvalidSelector { input: String, message: String },

    #[error("instruction targets {expected} but the document is {found}")]
    FormatMismatch {
        expected: DocumentFormat,
        found: DocumentFormat,
    },

    #[error("unsupported construct: {message}")]
    Unsupported { message: String },

    #[error("edit error: {0}")]
    Edit(#[from] EditError),
}

impl PatchError {
    pub(crate) fn yaml(message: impl Into<String>) -> Self {
        PatchError::Parse {
            format: DocumentFormat::Yaml,
            message: message.into(),
        }
    }

    pub(crate) fn xml(message: impl Into<String>) -> Self {
        PatchError::Parse {
            format: DocumentFormat::Xml,
            message: message.into(),
        }
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        PatchError::Unsupported {
            message: message.into(),
        }
    }

    /// True for every error caused by the document holding a value of the
    /// wrong shape for the requested edit.
    pub fn is_shape_conflict(&self) -> bool {
        matches!(
            self,
            PatchError::IncompatibleShape { .. } | PatchError::PathNotCreatable { .. }
        )
    }

    pub fn is_parse_error(&self) -> bool {
        matches!(self, PatchError::Parse { .. })
    }
}
