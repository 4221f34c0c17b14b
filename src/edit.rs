use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// A verified byte-span replacement against an in-memory document.
///
/// Every patch operation compiles down to a single `Edit` against the
/// document text it was planned on. Intelligence lives in span location,
/// not in application.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Edit does nothing until apply_to() is called"]
pub struct Edit {
    /// Inclusive start offset
    pub byte_start: usize,
    /// Exclusive end offset
    pub byte_end: usize,
    /// New text to place at [byte_start, byte_end)
    pub new_text: String,
    /// What the span must hold when the edit is applied
    pub expected_before: EditVerification,
}

/// How the before-text of a span is checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerification {
    ExactMatch(String),
    /// xxh3 of the before-text, used for spans over 1 KiB
    Hash(u64),
}

impl EditVerification {
    pub fn matches(&self, text: &str) -> bool {
        match self {
            EditVerification::ExactMatch(expected) => text == expected,
            EditVerification::Hash(expected_hash) => xxh3_64(text.as_bytes()) == *expected_hash,
        }
    }

    pub fn from_text(text: &str) -> Self {
        if text.len() > 1024 {
            EditVerification::Hash(xxh3_64(text.as_bytes()))
        } else {
            EditVerification::ExactMatch(text.to_string())
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    #[error("before-text verification failed at byte {byte_start}")]
    BeforeTextMismatch {
        byte_start: usize,
        byte_end: usize,
        expected: String,
        found: String,
    },

    #[error("invalid byte range: [{byte_start}, {byte_end}) in document of length {len}")]
    InvalidByteRange {
        byte_start: usize,
        byte_end: usize,
        len: usize,
    },

    #[error("edit boundary at byte {offset} splits a UTF-8 character")]
    NotCharBoundary { offset: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "EditResult should be checked for applied/already-applied"]
pub enum EditResult {
    /// Edit was applied; carries the full updated document
    Applied { text: String, bytes_changed: usize },
    /// The span already holds `new_text`
    AlreadyApplied,
}

impl Edit {
    /// Edit whose before-text check is derived from `expected_before`.
    pub fn new(
        byte_start: usize,
        byte_end: usize,
        new_text: impl Into<String>,
        expected_before: impl AsRef<str>,
    ) -> Self {
        Self {
            byte_start,
            byte_end,
            new_text: new_text.into(),
            expected_before: EditVerification::from_text(expected_before.as_ref()),
        }
    }

    /// Pure insertion at `offset`.
    pub fn insert(offset: usize, new_text: impl Into<String>) -> Self {
        Self::new(offset, offset, new_text, "")
    }

    /// Replace the span `[byte_start, byte_end)` of `content`, capturing the
    /// current text as the expected before-text.
    pub fn replace(
        content: &str,
        byte_start: usize,
        byte_end: usize,
        new_text: impl Into<String>,
    ) -> Self {
        let current = content.get(byte_start..byte_end).unwrap_or_default();
        Self::new(byte_start, byte_end, new_text, current)
    }

    /// Range, boundary and before-text checks. Returns the current span.
    fn validate<'a>(&self, content: &'a str) -> Result<&'a str, EditError> {
        if self.byte_start > self.byte_end || self.byte_end > content.len() {
            return Err(EditError::InvalidByteRange {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                len: content.len(),
            });
        }

        for offset in [self.byte_start, self.byte_end] {
            if !content.is_char_boundary(offset) {
                return Err(EditError::NotCharBoundary { offset });
            }
        }

        let current = &content[self.byte_start..self.byte_end];

        // Idempotency: the span already holds the replacement
        if current == self.new_text {
            return Ok(current);
        }

        if !self.expected_before.matches(current) {
            return Err(EditError::BeforeTextMismatch {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                expected: format!("{:?}", self.expected_before),
                found: current.to_string(),
            });
        }

        Ok(current)
    }

    /// Apply this edit to `content`, producing the updated document.
    pub fn apply_to(&self, content: &str) -> Result<EditResult, EditError> {
        let current = self.validate(content)?;
        if current == self.new_text {
            return Ok(EditResult::AlreadyApplied);
        }

        let mut updated = String::with_capacity(
            content.len() + self.new_text.len() - (self.byte_end - self.byte_start),
        );
        updated.push_str(&content[..self.byte_start]);
        updated.push_str(&self.new_text);
        updated.push_str(&content[self.byte_end..]);

        Ok(EditResult::Applied {
            text: updated,
            bytes_changed: self.new_text.len(),
        })
    }
}
