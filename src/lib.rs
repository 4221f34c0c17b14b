//! Config Patcher: minimal-diff, idempotent edits to YAML and XML
//! configuration files.
//!
//! Code generators need to register a new type, mapping directory or
//! environment variable in configuration files that people also edit by
//! hand. Re-serializing those files would drop comments and reformat
//! everything, so every change here is a surgical byte-span splice.
//!
//! # Architecture
//!
//! All operations compile down to a single primitive: [`Edit`], a verified
//! byte-span replacement. The YAML and XML editors locate spans in the
//! original text and plan the smallest edit that reaches the desired state;
//! [`ConfigPatcher`] splices it in and re-plans the result, which must come
//! back as a no-op.
//!
//! # Guarantees
//!
//! - Untouched bytes are preserved: comments, blank lines, quoting, key order
//! - Applying an instruction twice equals applying it once
//! - Existing values of an incompatible shape are reported, never coerced
//! - Patch sets write each file once, atomically, inside the project root
//!
//! # Example
//!
//! ```
//! use config_patcher::{ConfigPatcher, KeyPath};
//!
//! let input = "doctrine:\n    orm:\n        auto_mapping: true # keep\n";
//! let path = KeyPath::parse("doctrine.dbal.types.customer_id").unwrap();
//! let patched = ConfigPatcher::set_mapping_value(
//!     input,
//!     &path,
//!     &r"App\Infrastructure\Doctrine\DBAL\Type\CustomerIdType".into(),
//! )
//! .unwrap();
//!
//! assert!(patched.text.starts_with(input));
//! assert!(patched.changed());
//! ```

pub mod config;
pub mod edit;
pub mod patch;
pub mod recipes;
pub mod safety;
pub mod xml;
pub mod yaml;

// Re-exports
pub use config::{
    apply_patches, check_patches, load_from_path, load_from_str, ApplicationError, ApplyOutcome,
    ConfigError, PatchConfig, PatchReport,
};
pub use edit::{Edit, EditError, EditResult, EditVerification};
pub use patch::{
    ConfigPatcher, ConfigValue, DocumentFormat, KeyPath, PatchError, PatchInstruction,
    PatchStatus, Patched,
};
pub use recipes::{RecipeError, SymbolLookup};
pub use safety::{SafetyError, WorkspaceGuard};
pub use xml::ElementSelector;
