use crate::patch::PatchError;
use serde_yaml::Value;

/// Parse `text` into its semantic tree. Blank and comment-only documents
/// are treated as an empty (null) document.
pub fn parse_document(text: &str) -> Result<Value, PatchError> {
    let has_content = text.lines().any(|line| {
        let trimmed = line.trim();
        !trimmed.is_empty() && !trimmed.starts_with('#') && trimmed != "---" && trimmed != "..."
    });
    if !has_content {
        return Ok(Value::Null);
    }
    serde_yaml::from_str(text).map_err(|err| PatchError::yaml(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_documents_are_null() {
        assert_eq!(parse_document("").unwrap(), Value::Null);
        assert_eq!(parse_document("# only a comment\n\n").unwrap(), Value::Null);
        assert_eq!(parse_document("---\n").unwrap(), Value::Null);
    }

    #[test]
    fn invalid_documents_fail() {
        let err = parse_document("a: [1, 2\n").unwrap_err();
        assert!(err.is_parse_error());
        let err = parse_document("a: b: c\n").unwrap_err();
        assert!(err.is_parse_error());
    }
}
