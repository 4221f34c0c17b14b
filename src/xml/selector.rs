use crate::patch::PatchError;
use crate::xml::scanner::Element;
use std::fmt;
use std::str::FromStr;

/// Absolute element path: `/container/services/service[@id='app.x']`.
///
/// Predicates both filter existing elements and become attributes of
/// elements created to satisfy the selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementSelector {
    steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Step {
    pub name: String,
    pub predicates: Vec<(String, String)>,
}

impl Step {
    pub fn matches(&self, element: &Element) -> bool {
        element.name == self.name
            && self
                .predicates
                .iter()
                .all(|(name, value)| element.attribute(name) == Some(value.as_str()))
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for (name, value) in &self.predicates {
            if value.contains('\'') {
                write!(f, "[@{name}=\"{value}\"]")?;
            } else {
                write!(f, "[@{name}='{value}']")?;
            }
        }
        Ok(())
    }
}

impl ElementSelector {
    pub fn parse(input: &str) -> Result<Self, PatchError> {
        let invalid = |message: &str| PatchError::InvalidSelector {
            input: input.to_string(),
            message: message.to_string(),
        };

        let body = input
            .strip_prefix('/')
            .ok_or_else(|| invalid("selector must start with '/'"))?;
        if body.starts_with('/') {
            return Err(invalid("descendant steps ('//') are not supported"));
        }

        let mut steps = Vec::new();
        for raw in split_steps(body).map_err(|message| invalid(&message))? {
            steps.push(parse_step(&raw).map_err(|message| invalid(&message))?);
        }
        if steps.is_empty() {
            return Err(invalid("selector has no steps"));
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Text form of the first `count` steps.
    pub fn prefix(&self, count: usize) -> String {
        self.steps[..count.min(self.steps.len())]
            .iter()
            .map(|step| format!("/{step}"))
            .collect()
    }
}

impl fmt::Display for ElementSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix(self.steps.len()))
    }
}

impl FromStr for ElementSelector {
    type Err = PatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn split_steps(body: &str) -> Result<Vec<String>, String> {
    let mut steps = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;

    for ch in body.chars() {
        match quote {
            Some(open) => {
                if ch == open {
                    quote = None;
                }
                current.push(ch);
            }
            None => match ch {
                '\'' | '"' if depth > 0 => {
                    quote = Some(ch);
                    current.push(ch);
                }
                '[' => {
                    depth += 1;
                    current.push(ch);
                }
                ']' => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| "unbalanced ']'".to_string())?;
                    current.push(ch);
                }
                '/' if depth == 0 => {
                    if current.is_empty() {
                        return Err("empty step".to_string());
                    }
                    steps.push(std::mem::take(&mut current));
                }
                other => current.push(other),
            },
        }
    }

    if quote.is_some() {
        return Err("unterminated quoted value".to_string());
    }
    if depth != 0 {
        return Err("unterminated predicate".to_string());
    }
    if current.is_empty() {
        if !steps.is_empty() {
            return Err("trailing '/'".to_string());
        }
    } else {
        steps.push(current);
    }
    Ok(steps)
}

fn parse_step(raw: &str) -> Result<Step, String> {
    let name_end = raw.find('[').unwrap_or(raw.len());
    let name = &raw[..name_end];
    if name == "*" || name.contains('*') {
        return Err("wildcard steps are not supported".to_string());
    }
    if !is_valid_name(name) {
        return Err(format!("invalid element name '{name}'"));
    }

    let mut predicates = Vec::new();
    let mut rest = &raw[name_end..];
    while !rest.is_empty() {
        let inner_end = closing_bracket(rest).ok_or_else(|| "unterminated predicate".to_string())?;
        let inner = rest[1..inner_end].trim();
        let predicate = inner
            .strip_prefix('@')
            .ok_or_else(|| format!("unsupported predicate '[{inner}]'"))?;
        let (attr, value) = predicate
            .split_once('=')
            .ok_or_else(|| format!("predicate '[{inner}]' needs a value"))?;
        let attr = attr.trim();
        if !is_valid_name(attr) {
            return Err(format!("invalid attribute name '{attr}'"));
        }
        let value = value.trim();
        let unquoted = ['\'', '"']
            .iter()
            .find_map(|quote| {
                value
                    .strip_prefix(*quote)
                    .and_then(|inner| inner.strip_suffix(*quote))
            })
            .filter(|_| value.len() >= 2)
            .ok_or_else(|| format!("predicate value for '@{attr}' must be quoted"))?;
        if predicates.iter().any(|(existing, _): &(String, String)| existing == attr) {
            return Err(format!("duplicate predicate for '@{attr}'"));
        }
        predicates.push((attr.to_string(), unquoted.to_string()));
        rest = &rest[inner_end + 1..];
    }

    Ok(Step {
        name: name.to_string(),
        predicates,
    })
}

/// Index of the `]` closing the predicate that starts at `rest[0]`.
fn closing_bracket(rest: &str) -> Option<usize> {
    if !rest.starts_with('[') {
        return None;
    }
    let mut quote = None;
    for (idx, ch) in rest.char_indices().skip(1) {
        match quote {
            Some(open) if ch == open => quote = None,
            Some(_) => {}
            None if ch == '\'' || ch == '"' => quote = Some(ch),
            None if ch == ']' => return Some(idx),
            None => {}
        }
    }
    None
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' || first == ':' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_alphanumeric() || matches!(ch, '_' | ':' | '-' | '.'))
}
