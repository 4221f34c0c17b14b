pub mod applicator;
pub mod loader;
pub mod schema;

pub use applicator::{
    apply_patches, check_patches, ApplicationError, ApplyOutcome, FileChange, PatchOutcome,
    PatchReport,
};
pub use loader::{discover, load_from_path, load_from_str, ConfigError};
pub use schema::{
    Metadata, Operation, PatchConfig, PatchDefinition, ValidationError, ValidationIssue,
};
