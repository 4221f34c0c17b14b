use crate::patch::errors::PatchError;
use std::fmt;
use std::str::FromStr;

/// A path of mapping keys into a YAML document.
///
/// The text form is dotted; segments containing dots or whitespace are
/// quoted: `doctrine.orm.mappings."App.Legacy"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPath {
    parts: Vec<String>,
}

impl KeyPath {
    pub fn new<I, S>(parts: I) -> Result<Self, PatchError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parts: Vec<String> = parts.into_iter().map(Into::into).collect();
        if parts.is_empty() {
            return Err(PatchError::InvalidPath {
                input: String::new(),
                message: "empty key path".to_string(),
            });
        }
        if parts.iter().any(String::is_empty) {
            return Err(PatchError::InvalidPath {
                input: parts.join("."),
                message: "empty path segment".to_string(),
            });
        }
        Ok(Self { parts })
    }

    pub fn parse(input: &str) -> Result<Self, PatchError> {
        let parts = parse_dotted_path(input)?;
        if parts.is_empty() {
            return Err(PatchError::InvalidPath {
                input: input.to_string(),
                message: "empty key path".to_string(),
            });
        }
        Ok(Self { parts })
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Text form of the first `depth` segments.
    pub fn prefix(&self, depth: usize) -> String {
        self.parts[..depth.min(self.parts.len())]
            .iter()
            .map(|part| quote_segment(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn as_string(&self) -> String {
        self.prefix(self.parts.len())
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

impl FromStr for KeyPath {
    type Err = PatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn quote_segment(part: &str) -> String {
    if part
        .chars()
        .any(|ch| ch == '.' || ch == '"' || ch == '\'' || ch.is_whitespace())
    {
        format!("\"{}\"", part.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        part.to_string()
    }
}

fn parse_dotted_path(input: &str) -> Result<Vec<String>, PatchError> {
    let invalid = |message: &str| PatchError::InvalidPath {
        input: input.to_string(),
        message: message.to_string(),
    };

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars().peekable();
    let mut in_quotes = false;
    let mut quote_char = '\0';
    let mut quoted_segment = false;

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == quote_char {
                in_quotes = false;
                continue;
            }

            if quote_char == '"' && ch == '\\' {
                if let Some(next) = chars.next() {
                    let escaped = match next {
                        'n' => '\n',
                        't' => '\t',
                        other => other,
                    };
                    current.push(escaped);
                    continue;
                }
            }

            current.push(ch);
            continue;
        }

        match ch {
            '.' => {
                if current.is_empty() && !quoted_segment {
                    return Err(invalid("empty path segment"));
                }
                parts.push(std::mem::take(&mut current));
                quoted_segment = false;
            }
            '"' | '\'' => {
                if !current.is_empty() || quoted_segment {
                    return Err(invalid("unexpected quote inside key"));
                }
                in_quotes = true;
                quote_char = ch;
                quoted_segment = true;
            }
            ch if ch.is_whitespace() => {
                return Err(invalid("whitespace not allowed in unquoted key"));
            }
            other => {
                if quoted_segment {
                    return Err(invalid("unexpected text after quoted key"));
                }
                current.push(other);
            }
        }
    }

    if in_quotes {
        return Err(invalid("unterminated quoted key"));
    }

    if !current.is_empty() || quoted_segment {
        if current.is_empty() {
            return Err(invalid("empty path segment"));
        }
        parts.push(current);
    } else if !parts.is_empty() {
        return Err(invalid("trailing dot"));
    }

    Ok(parts)
}
