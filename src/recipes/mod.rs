//! Configuration patches performed by the model and API resource
//! generators, derived from explicit choice records.
//!
//! A generator decides what to create; a recipe only turns those decisions
//! into patch definitions so the result runs through the same applicator
//! as hand-written patch sets.

pub mod api_platform;
pub mod doctrine;

pub use api_platform::{resource_patches, ConfigFlavor, ResourceChoices, ResourceNames};
pub use doctrine::{
    model_patches, EntityMapping, IdentityKind, IdentityNames, ModelChoices, ModelNames,
};

use crate::config::{Metadata, PatchConfig, PatchDefinition};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Root namespace of generated classes.
pub const APP_NAMESPACE: &str = "App";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecipeError {
    #[error("invalid class name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("could not find model {class}")]
    MissingModel { class: String },

    #[error("could not find model identity for {model}; checked for {id_class} and {uuid_class}")]
    MissingIdentity {
        model: String,
        id_class: String,
        uuid_class: String,
    },
}

/// Answers whether a class already exists in the host project.
///
/// Generators check for previously generated classes; the answer comes
/// from whoever knows the project, never from this crate.
pub trait SymbolLookup {
    fn class_exists(&self, class: &str) -> bool;
}

/// Fixed set of known class names.
#[derive(Debug, Clone, Default)]
pub struct KnownSymbols {
    classes: HashSet<String>,
}

impl KnownSymbols {
    pub fn new<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            classes: classes
                .into_iter()
                .map(|class| class.into().trim_start_matches('\\').to_string())
                .collect(),
        }
    }
}

impl SymbolLookup for KnownSymbols {
    fn class_exists(&self, class: &str) -> bool {
        self.classes.contains(class.trim_start_matches('\\'))
    }
}

/// Resolves `App\Foo\Bar` to `<root>/src/Foo/Bar.php`, the default
/// autoload layout of the projects these recipes target.
#[derive(Debug, Clone)]
pub struct SourceTreeLookup {
    root: PathBuf,
}

impl SourceTreeLookup {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn class_path(&self, class: &str) -> Option<PathBuf> {
        let relative = class
            .trim_start_matches('\\')
            .strip_prefix(APP_NAMESPACE)?
            .strip_prefix('\\')?;
        let mut path = self.root.join("src");
        path.extend(relative.split('\\'));
        path.set_extension("php");
        Some(path)
    }
}

impl SymbolLookup for SourceTreeLookup {
    fn class_exists(&self, class: &str) -> bool {
        self.class_path(class).is_some_and(|path| path.is_file())
    }
}

/// Lookup that asks each member in turn.
pub struct AnyOf<'a>(pub Vec<&'a dyn SymbolLookup>);

impl SymbolLookup for AnyOf<'_> {
    fn class_exists(&self, class: &str) -> bool {
        self.0.iter().any(|lookup| lookup.class_exists(class))
    }
}

/// Patch definitions produced by one generator run.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
    pub name: String,
    pub description: String,
    pub patches: Vec<PatchDefinition>,
}

impl Recipe {
    pub fn into_config(self) -> PatchConfig {
        PatchConfig {
            meta: Metadata {
                name: self.name,
                description: Some(self.description),
            },
            patches: self.patches,
        }
    }
}

/// Validate a class short name and upper-case its first letter.
pub fn class_name(name: &str) -> Result<String, RecipeError> {
    let invalid = |reason| RecipeError::InvalidName {
        name: name.to_string(),
        reason,
    };
    let trimmed = name.trim();
    let mut chars = trimmed.chars();
    let first = chars.next().ok_or_else(|| invalid("name is empty"))?;
    if !first.is_ascii_alphabetic() {
        return Err(invalid("must start with a letter"));
    }
    if !chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        return Err(invalid("only letters, digits and '_' are allowed"));
    }
    Ok(first.to_ascii_uppercase().to_string() + &trimmed[first.len_utf8()..])
}

/// Normalize a base path (`Catalog/Pricing`, `\Catalog\`) into its segments.
pub(crate) fn base_segments(base_path: Option<&str>) -> Result<Vec<String>, RecipeError> {
    let Some(base) = base_path else {
        return Ok(Vec::new());
    };
    base.split(['/', '\\'])
        .filter(|segment| !segment.is_empty())
        .map(class_name)
        .collect()
}

/// `CustomerId` -> `customer_id`, `HTTPClient` -> `http_client`.
pub fn snake_case(input: &str) -> String {
    split_words(input).join("_")
}

fn split_words(input: &str) -> Vec<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (idx, &ch) in chars.iter().enumerate() {
        if ch == '_' || ch == '-' || ch.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if ch.is_uppercase() && !current.is_empty() {
            let prev = chars[idx - 1];
            let next_is_lower = chars.get(idx + 1).is_some_and(|next| next.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower)
            {
                words.push(std::mem::take(&mut current));
            }
        }
        current.extend(ch.to_lowercase());
    }

    if !current.is_empty() {
        words.push(current);
    }
    words
}
