use crate::edit::Edit;
use crate::patch::{PatchError, Plan};
use crate::xml::scanner::{self, escape_attribute, Element, XmlDocument};
use crate::xml::selector::{ElementSelector, Step};
use std::collections::BTreeMap;

const DEFAULT_UNIT: &str = "    ";

/// Plans element and attribute edits against one XML document.
///
/// A blank text has no document yet; ensuring an element there writes the
/// whole selector chain as the new root.
pub struct XmlEditor<'a> {
    text: &'a str,
    document: Option<XmlDocument>,
    unit: String,
}

impl<'a> XmlEditor<'a> {
    pub fn parse(text: &'a str) -> Result<Self, PatchError> {
        if text.trim().is_empty() {
            return Ok(Self {
                text,
                document: None,
                unit: DEFAULT_UNIT.to_string(),
            });
        }
        let document = scanner::parse(text)?;
        let unit = detect_unit(text, &document.root).unwrap_or_else(|| DEFAULT_UNIT.to_string());
        Ok(Self {
            text,
            document: Some(document),
            unit,
        })
    }

    pub fn root(&self) -> Option<&Element> {
        self.document.as_ref().map(|document| &document.root)
    }

    /// Single element matched by `selector`, if the whole path exists.
    pub fn find(&self, selector: &ElementSelector) -> Result<Option<&Element>, PatchError> {
        let Some(document) = &self.document else {
            return Ok(None);
        };
        match self.descend(document, selector)? {
            Descent::Found(element) => Ok(Some(element)),
            Descent::Missing { .. } => Ok(None),
        }
    }

    pub fn plan_ensure(
        &self,
        selector: &ElementSelector,
        attributes: &BTreeMap<String, String>,
    ) -> Result<Plan, PatchError> {
        check_predicates(selector, attributes)?;

        let Some(document) = &self.document else {
            tracing::debug!(root = %selector.prefix(1), "blank document; writing a new root");
            let chain = self.render_chain(selector.steps(), attributes, "");
            return Ok(Plan::Edit(Edit::replace(
                self.text,
                0,
                self.text.len(),
                format!("{chain}{}", self.newline()),
            )));
        };

        match self.descend(document, selector)? {
            Descent::Found(element) => Ok(self.merge(element, selector, attributes)),
            Descent::Missing { parent, depth } => {
                let steps = &selector.steps()[depth..];
                tracing::debug!(
                    parent = %selector.prefix(depth),
                    missing = steps.len(),
                    "creating element chain"
                );
                Ok(Plan::Edit(self.create_chain(parent, steps, attributes)))
            }
        }
    }

    fn descend<'d>(
        &self,
        document: &'d XmlDocument,
        selector: &ElementSelector,
    ) -> Result<Descent<'d>, PatchError> {
        let steps = selector.steps();
        let root = &document.root;
        let first = &steps[0];
        if !first.matches(root) {
            return Err(PatchError::IncompatibleShape {
                path: selector.prefix(1),
                expected: format!("root element <{first}>"),
                found: format!("<{}>", root.name),
            });
        }

        let mut current = root;
        for (depth, step) in steps.iter().enumerate().skip(1) {
            let matching: Vec<&Element> = current
                .children
                .iter()
                .filter(|child| step.matches(child))
                .collect();
            match matching.as_slice() {
                [] => {
                    return Ok(Descent::Missing {
                        parent: current,
                        depth,
                    })
                }
                [only] => current = *only,
                _ => {
                    return Err(PatchError::AmbiguousMatch {
                        selector: selector.prefix(depth + 1),
                        count: matching.len(),
                    })
                }
            }
        }
        Ok(Descent::Found(current))
    }

    /// Rewrite the attribute region of the start tag, keeping every
    /// untouched attribute as written.
    fn merge(
        &self,
        element: &Element,
        selector: &ElementSelector,
        attributes: &BTreeMap<String, String>,
    ) -> Plan {
        let mut replacements = Vec::new();
        let mut additions = String::new();

        for (name, value) in attributes {
            match element.attributes.iter().find(|attr| &attr.name == name) {
                Some(attr) if &attr.value == value => {}
                Some(attr) => replacements.push((
                    attr.value_start,
                    attr.value_end,
                    escape_attribute(value, attr.quote),
                )),
                None => {
                    additions.push_str(&format!(" {name}=\"{}\"", escape_attribute(value, b'"')));
                }
            }
        }

        if replacements.is_empty() && additions.is_empty() {
            return Plan::NoOp(format!("{selector} already carries the requested attributes"));
        }

        replacements.sort_by_key(|(start, _, _)| *start);
        let span_start = replacements
            .first()
            .map_or(element.attrs_end, |(start, _, _)| *start);

        let mut new_text = String::new();
        let mut cursor = span_start;
        for (start, end, escaped) in &replacements {
            new_text.push_str(&self.text[cursor..*start]);
            new_text.push_str(escaped);
            cursor = *end;
        }
        new_text.push_str(&self.text[cursor..element.attrs_end]);
        new_text.push_str(&additions);

        Plan::Edit(Edit::replace(self.text, span_start, element.attrs_end, new_text))
    }

    fn create_chain(
        &self,
        parent: &Element,
        steps: &[Step],
        attributes: &BTreeMap<String, String>,
    ) -> Edit {
        let newline = self.newline();
        let parent_indent = line_indent(self.text, parent.start);
        let child_indent = match parent.children.last() {
            Some(last) if line_start(self.text, last.start) != line_start(self.text, parent.start) => {
                line_indent(self.text, last.start).to_string()
            }
            _ => format!("{parent_indent}{}", self.unit),
        };
        let chain = self.render_chain(steps, attributes, &child_indent);

        if parent.self_closing {
            let replacement =
                format!(">{newline}{chain}{newline}{parent_indent}</{}>", parent.name);
            Edit::replace(self.text, parent.attrs_end, parent.tag_end, replacement)
        } else if !parent.has_content() {
            let replacement = format!("{newline}{chain}{newline}{parent_indent}");
            Edit::replace(self.text, parent.tag_end, parent.close_start, replacement)
        } else {
            // text or an inline close tag after the last content stays where it is
            Edit::insert(parent.last_content_end, format!("{newline}{chain}"))
        }
    }

    fn render_chain(
        &self,
        steps: &[Step],
        attributes: &BTreeMap<String, String>,
        indent: &str,
    ) -> String {
        let Some((step, rest)) = steps.split_first() else {
            return String::new();
        };
        let newline = self.newline();

        let mut tag = format!("{indent}<{}", step.name);
        for (name, value) in &step.predicates {
            tag.push_str(&format!(" {name}=\"{}\"", escape_attribute(value, b'"')));
        }

        if rest.is_empty() {
            for (name, value) in attributes {
                if step.predicates.iter().all(|(predicate, _)| predicate != name) {
                    tag.push_str(&format!(" {name}=\"{}\"", escape_attribute(value, b'"')));
                }
            }
            tag.push_str("/>");
            return tag;
        }

        let inner = self.render_chain(rest, attributes, &format!("{indent}{}", self.unit));
        format!("{tag}>{newline}{inner}{newline}{indent}</{}>", step.name)
    }

    fn newline(&self) -> &'static str {
        match &self.document {
            Some(document) => document.newline,
            None if self.text.contains("\r\n") => "\r\n",
            None => "\n",
        }
    }
}

enum Descent<'d> {
    Found(&'d Element),
    Missing { parent: &'d Element, depth: usize },
}

fn check_predicates(
    selector: &ElementSelector,
    attributes: &BTreeMap<String, String>,
) -> Result<(), PatchError> {
    let Some(last) = selector.steps().last() else {
        return Ok(());
    };
    for (name, expected) in &last.predicates {
        if let Some(value) = attributes.get(name) {
            if value != expected {
                return Err(PatchError::InvalidSelector {
                    input: selector.to_string(),
                    message: format!(
                        "attribute '{name}' = '{value}' contradicts the predicate '{expected}'"
                    ),
                });
            }
        }
    }
    Ok(())
}

fn line_start(text: &str, pos: usize) -> usize {
    text[..pos].rfind('\n').map_or(0, |idx| idx + 1)
}

fn line_indent(text: &str, pos: usize) -> &str {
    let start = line_start(text, pos);
    let line = &text[start..pos];
    let width = line.len() - line.trim_start_matches([' ', '\t']).len();
    &line[..width]
}

/// Indentation added between the first parent and child found on
/// separate lines.
fn detect_unit(text: &str, element: &Element) -> Option<String> {
    let parent_indent = line_indent(text, element.start);
    for child in &element.children {
        if line_start(text, child.start) == line_start(text, element.start) {
            continue;
        }
        let child_indent = line_indent(text, child.start);
        if let Some(unit) = child_indent.strip_prefix(parent_indent) {
            if !unit.is_empty() {
                return Some(unit.to_string());
            }
        }
    }
    element
        .children
        .iter()
        .find_map(|child| detect_unit(text, child))
}
