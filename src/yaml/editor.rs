use crate::edit::Edit;
use crate::patch::value::{kind_of, lookup, untag};
use crate::patch::{ConfigValue, KeyPath, PatchError, PatchMode, Plan};
use crate::yaml::render::{self, BlockStyle};
use crate::yaml::scanner::{scan, Document, Entry, Node, NodeKind};
use crate::yaml::validator::parse_document;
use serde_yaml::Value;

const DEFAULT_INDENT: usize = 4;
const ROOT_NAME: &str = "(document root)";

/// Plans minimal edits against one YAML document.
///
/// Shape decisions come from the serde_yaml tree; byte positions come from
/// the span tree. Both are walked in lockstep so an edit is never planned
/// against text the parser disagrees with.
pub struct YamlEditor<'a> {
    text: &'a str,
    value: Value,
    document: Document,
    style: BlockStyle,
}

enum Location<'d> {
    Found {
        value: &'d Value,
        entry: &'d Entry,
    },
    Missing {
        depth: usize,
        holder: Holder<'d>,
    },
}

#[derive(Clone, Copy)]
enum Holder<'d> {
    Root(&'d Node),
    Entry(&'d Entry),
}

impl<'d> Holder<'d> {
    fn node(self) -> &'d Node {
        match self {
            Holder::Root(node) => node,
            Holder::Entry(entry) => &entry.value,
        }
    }
}

impl<'a> YamlEditor<'a> {
    pub fn parse(text: &'a str) -> Result<Self, PatchError> {
        let value = parse_document(text)?;
        let document = scan(text)?;
        let style = BlockStyle {
            unit: detect_indent_unit(&document.root).unwrap_or(DEFAULT_INDENT),
            newline: document.newline,
        };
        Ok(Self {
            text,
            value,
            document,
            style,
        })
    }

    /// The parsed semantic tree.
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn indent_unit(&self) -> usize {
        self.style.unit
    }

    pub fn get(&self, path: &KeyPath) -> Option<&Value> {
        path.parts().iter().try_fold(&self.value, |current, segment| {
            match untag(current) {
                Value::Mapping(mapping) => lookup(mapping, segment),
                _ => None,
            }
        })
    }

    pub fn plan(&self, path: &KeyPath, mode: &PatchMode) -> Result<Plan, PatchError> {
        match mode {
            PatchMode::SetScalar(value) => self.plan_set(path, value),
            PatchMode::EnsureListContains(value) => self.plan_append(path, value),
            PatchMode::SetIfAbsent(value) => self.plan_set_if_absent(path, value),
            PatchMode::EnsureElement(_) => Err(PatchError::FormatMismatch {
                expected: crate::patch::DocumentFormat::Xml,
                found: crate::patch::DocumentFormat::Yaml,
            }),
        }
    }

    pub fn plan_set(&self, path: &KeyPath, value: &ConfigValue) -> Result<Plan, PatchError> {
        match self.locate(path)? {
            Location::Found {
                value: current,
                entry,
            } => {
                if value.matches(current) {
                    return Ok(Plan::NoOp(format!("{path} already set to {value}")));
                }
                self.replace_value(entry, value).map(Plan::Edit)
            }
            Location::Missing { depth, holder } => {
                self.insert_missing(path, depth, holder, value).map(Plan::Edit)
            }
        }
    }

    pub fn plan_set_if_absent(
        &self,
        path: &KeyPath,
        value: &ConfigValue,
    ) -> Result<Plan, PatchError> {
        match self.locate(path)? {
            Location::Found { .. } => Ok(Plan::NoOp(format!("{path} already present"))),
            Location::Missing { depth, holder } => {
                self.insert_missing(path, depth, holder, value).map(Plan::Edit)
            }
        }
    }

    pub fn plan_append(&self, path: &KeyPath, item: &ConfigValue) -> Result<Plan, PatchError> {
        match self.locate(path)? {
            Location::Found { value, entry } => match untag(value) {
                Value::Sequence(items) => {
                    if items.iter().any(|existing| item.matches(existing)) {
                        return Ok(Plan::NoOp(format!("{path} already contains {item}")));
                    }
                    self.append_item(path, entry, item).map(Plan::Edit)
                }
                Value::Null => self
                    .replace_value(entry, &ConfigValue::Sequence(vec![item.clone()]))
                    .map(Plan::Edit),
                other => Err(PatchError::IncompatibleShape {
                    path: path.to_string(),
                    expected: "sequence".to_string(),
                    found: kind_of(other).to_string(),
                }),
            },
            Location::Missing { depth, holder } => {
                let list = ConfigValue::Sequence(vec![item.clone()]);
                self.insert_missing(path, depth, holder, &list)
                    .map(Plan::Edit)
            }
        }
    }

    /// The found value keeps its tag; values walked through on the way are
    /// read untagged.
    fn locate<'d>(&'d self, path: &KeyPath) -> Result<Location<'d>, PatchError> {
        let mut value = &self.value;
        let mut holder = Holder::Root(&self.document.root);

        for (depth, segment) in path.parts().iter().enumerate() {
            let node = holder.node();
            match untag(value) {
                Value::Null => return Ok(Location::Missing { depth, holder }),
                Value::Mapping(mapping) => {
                    let Some(child) = lookup(mapping, segment) else {
                        return Ok(Location::Missing { depth, holder });
                    };
                    let entry = node
                        .find_entry(segment)
                        .ok_or_else(|| unlocatable(node, path, depth))?;
                    value = child;
                    holder = Holder::Entry(entry);
                }
                other => {
                    return Err(PatchError::PathNotCreatable {
                        path: path.to_string(),
                        blocking: blocking_name(path, depth),
                        found: kind_of(other).to_string(),
                    });
                }
            }
        }

        match holder {
            Holder::Entry(entry) => Ok(Location::Found { value, entry }),
            Holder::Root(_) => Err(PatchError::InvalidPath {
                input: path.to_string(),
                message: "empty key path".to_string(),
            }),
        }
    }

    fn insert_missing(
        &self,
        path: &KeyPath,
        depth: usize,
        holder: Holder<'_>,
        leaf: &ConfigValue,
    ) -> Result<Edit, PatchError> {
        let parts = path.parts();
        let key = &parts[depth];
        let nested = ConfigValue::nest(&parts[depth + 1..], leaf.clone());
        match holder {
            Holder::Root(node) => self.insert_into_root(node, key, &nested),
            Holder::Entry(entry) => self.insert_into_entry(entry, key, &nested),
        }
    }

    fn insert_into_root(
        &self,
        node: &Node,
        key: &str,
        value: &ConfigValue,
    ) -> Result<Edit, PatchError> {
        let nl = self.style.newline;
        match &node.kind {
            NodeKind::BlockMap { indent, .. } => Ok(Edit::insert(
                node.end,
                format!("{nl}{}", render::block_entry(key, value, *indent, self.style)),
            )),
            NodeKind::FlowMap { entries } if !entries.is_empty() => {
                Ok(self.append_flow_entry(entries, key, value))
            }
            NodeKind::Empty => {
                let separator = if self.text.is_empty() || self.text.ends_with('\n') {
                    ""
                } else {
                    nl
                };
                Ok(Edit::insert(
                    node.start,
                    format!(
                        "{separator}{}{nl}",
                        render::block_entry(key, value, 0, self.style)
                    ),
                ))
            }
            NodeKind::FlowMap { .. } | NodeKind::Scalar { alias: false } => Ok(Edit::replace(
                self.text,
                node.start,
                node.end,
                render::block_entry(key, value, 0, self.style),
            )),
            _ => Err(PatchError::unsupported("cannot insert into the document root")),
        }
    }

    fn insert_into_entry(
        &self,
        entry: &Entry,
        key: &str,
        value: &ConfigValue,
    ) -> Result<Edit, PatchError> {
        let node = &entry.value;
        let nl = self.style.newline;
        match &node.kind {
            NodeKind::BlockMap { indent, .. } => Ok(Edit::insert(
                node.end,
                format!("{nl}{}", render::block_entry(key, value, *indent, self.style)),
            )),
            NodeKind::FlowMap { entries } if !entries.is_empty() => {
                Ok(self.append_flow_entry(entries, key, value))
            }
            NodeKind::FlowMap { .. } | NodeKind::Empty | NodeKind::Scalar { alias: false } => {
                let mapping = ConfigValue::Mapping(vec![(key.to_string(), value.clone())]);
                self.replace_value(entry, &mapping)
            }
            _ => Err(PatchError::unsupported(format!(
                "cannot insert under '{}'",
                entry.key
            ))),
        }
    }

    fn append_flow_entry(&self, entries: &[Entry], key: &str, value: &ConfigValue) -> Edit {
        let anchor = entries.last().map(|last| last.value.end).unwrap_or_default();
        Edit::insert(
            anchor,
            format!(", {}: {}", render::render_key(key, true), render::flow(value)),
        )
    }

    fn append_item(
        &self,
        path: &KeyPath,
        entry: &Entry,
        item: &ConfigValue,
    ) -> Result<Edit, PatchError> {
        let node = &entry.value;
        match &node.kind {
            NodeKind::BlockSeq { indent, .. } => Ok(Edit::insert(
                node.end,
                format!(
                    "{}{}",
                    self.style.newline,
                    render::block_item(item, *indent, self.style)
                ),
            )),
            NodeKind::FlowSeq { items } => match items.last() {
                Some(last) => Ok(Edit::insert(last.end, format!(", {}", render::flow(item)))),
                None => Ok(Edit::replace(
                    self.text,
                    node.start,
                    node.end,
                    format!("[{}]", render::flow(item)),
                )),
            },
            _ => Err(unlocatable(node, path, path.len())),
        }
    }

    /// Replace the value of `entry` with `new`, keeping the key, any anchor
    /// and the comment on the key's line. A tag on the old value is dropped.
    fn replace_value(&self, entry: &Entry, new: &ConfigValue) -> Result<Edit, PatchError> {
        let node = &entry.value;
        if entry.flow {
            let rendered = render::flow(new);
            if let Some(colon) = entry.colon {
                let props = &self.text[colon + 1..node.start.max(colon + 1)];
                if has_tag(props) {
                    return Ok(Edit::replace(
                        self.text,
                        colon + 1,
                        node.end,
                        format!("{} {rendered}", kept_anchors(props)),
                    ));
                }
            }
            return Ok(match (&node.kind, entry.colon) {
                (NodeKind::Empty, None) => Edit::insert(entry.key_end, format!(": {rendered}")),
                (NodeKind::Empty, Some(_)) => Edit::insert(node.start, format!(" {rendered}")),
                _ => Edit::replace(self.text, node.start, node.end, rendered),
            });
        }

        let colon = entry.colon.ok_or_else(|| {
            PatchError::unsupported(format!("entry '{}' has no value indicator", entry.key))
        })?;
        if let Some(edit) = self.replace_tagged(entry, colon, new) {
            return Ok(edit);
        }
        let nl = self.style.newline;
        let block = new.is_block_collection();
        let child_indent = entry.indent + self.style.unit;

        match &node.kind {
            NodeKind::FlowMap { entries } if !entries.is_empty() => Ok(Edit::replace(
                self.text,
                node.start,
                node.end,
                render::flow(new),
            )),
            NodeKind::FlowSeq { items } if !items.is_empty() => Ok(Edit::replace(
                self.text,
                node.start,
                node.end,
                render::flow(new),
            )),
            NodeKind::Empty if block => Ok(Edit::insert(
                entry.line_end,
                format!("{nl}{}", render::block_body(new, child_indent, self.style)),
            )),
            NodeKind::Empty => Ok(Edit::insert(node.start, format!(" {}", render::inline(new)))),
            _ if node.start <= entry.line_end => {
                // value starts on the key line
                if block {
                    let start = self.trim_blanks_before(node.start, colon + 1);
                    let body = format!("{nl}{}", render::block_body(new, child_indent, self.style));
                    if node.end <= entry.line_end {
                        // keep a trailing comment on the key line
                        let trailing = &self.text[node.end..entry.line_end];
                        let trailing = if trailing.trim().is_empty() { "" } else { trailing };
                        Ok(Edit::replace(
                            self.text,
                            start,
                            entry.line_end,
                            format!("{trailing}{body}"),
                        ))
                    } else {
                        Ok(Edit::replace(self.text, start, node.end, body))
                    }
                } else {
                    Ok(Edit::replace(
                        self.text,
                        node.start,
                        node.end,
                        render::inline(new),
                    ))
                }
            }
            kind => {
                // value lives on the lines below the key
                if block {
                    let indent = match kind {
                        NodeKind::BlockMap { indent, .. } | NodeKind::BlockSeq { indent, .. }
                            if *indent > entry.indent =>
                        {
                            *indent
                        }
                        _ => child_indent,
                    };
                    Ok(Edit::replace(
                        self.text,
                        entry.line_end,
                        node.end,
                        format!("{nl}{}", render::block_body(new, indent, self.style)),
                    ))
                } else {
                    let tail = &self.text[colon + 1..entry.line_end];
                    let props = properties_len(tail);
                    Ok(Edit::replace(
                        self.text,
                        colon + 1,
                        node.end,
                        format!("{} {}{}", &tail[..props], render::inline(new), &tail[props..]),
                    ))
                }
            }
        }
    }

    /// Rewrite everything after the colon when the key line carries a tag.
    /// Anchors and a trailing comment are kept.
    fn replace_tagged(&self, entry: &Entry, colon: usize, new: &ConfigValue) -> Option<Edit> {
        let node = &entry.value;
        let tail = &self.text[colon + 1..entry.line_end];
        let props_end = colon + 1 + properties_len(tail);
        let props = &self.text[colon + 1..props_end];
        if !has_tag(props) {
            return None;
        }

        let same_line = !matches!(node.kind, NodeKind::Empty) && node.start <= entry.line_end;
        let (end, trailing) = if !same_line {
            (node.end.max(entry.line_end), &self.text[props_end..entry.line_end])
        } else if node.end <= entry.line_end {
            (entry.line_end, &self.text[node.end..entry.line_end])
        } else {
            (node.end, "")
        };
        let trailing = if trailing.trim().is_empty() { "" } else { trailing };
        let anchors = kept_anchors(props);

        let replacement = if new.is_block_collection() {
            let indent = match &node.kind {
                NodeKind::BlockMap { indent, .. } | NodeKind::BlockSeq { indent, .. }
                    if *indent > entry.indent =>
                {
                    *indent
                }
                _ => entry.indent + self.style.unit,
            };
            format!(
                "{anchors}{trailing}{}{}",
                self.style.newline,
                render::block_body(new, indent, self.style)
            )
        } else {
            format!("{anchors} {}{trailing}", render::inline(new))
        };
        Some(Edit::replace(self.text, colon + 1, end, replacement))
    }

    fn trim_blanks_before(&self, mut pos: usize, floor: usize) -> usize {
        let bytes = self.text.as_bytes();
        while pos > floor && matches!(bytes[pos - 1], b' ' | b'\t') {
            pos -= 1;
        }
        pos
    }
}

fn unlocatable(node: &Node, path: &KeyPath, depth: usize) -> PatchError {
    if node.is_alias() {
        PatchError::unsupported(format!(
            "'{}' is an alias; edit the anchored node instead",
            path.prefix(depth)
        ))
    } else {
        PatchError::unsupported(format!(
            "could not locate '{}' in the document text",
            path.prefix(depth.max(1))
        ))
    }
}

fn blocking_name(path: &KeyPath, depth: usize) -> String {
    if depth == 0 {
        ROOT_NAME.to_string()
    } else {
        path.prefix(depth)
    }
}

/// Length of the anchor/tag prefix of the text after a colon, excluding
/// trailing blanks.
fn properties_len(tail: &str) -> usize {
    let bytes = tail.as_bytes();
    let mut pos = 0;
    let mut end = 0;
    loop {
        while pos < bytes.len() && matches!(bytes[pos], b' ' | b'\t') {
            pos += 1;
        }
        if pos >= bytes.len() || !matches!(bytes[pos], b'&' | b'!') {
            return end;
        }
        while pos < bytes.len() && !matches!(bytes[pos], b' ' | b'\t') {
            pos += 1;
        }
        end = pos;
    }
}

fn has_tag(props: &str) -> bool {
    props.split_whitespace().any(|token| token.starts_with('!'))
}

/// Anchors among `props`, each with a leading blank.
fn kept_anchors(props: &str) -> String {
    props
        .split_whitespace()
        .filter(|token| token.starts_with('&'))
        .map(|anchor| format!(" {anchor}"))
        .collect()
}

/// Offset between the first nested block mapping and its parent.
fn detect_indent_unit(node: &Node) -> Option<usize> {
    let NodeKind::BlockMap { indent, entries } = &node.kind else {
        return None;
    };
    entries.iter().find_map(|entry| match &entry.value.kind {
        NodeKind::BlockMap { indent: child, .. } | NodeKind::BlockSeq { indent: child, .. }
            if child > indent =>
        {
            Some(child - indent)
        }
        _ => detect_indent_unit(&entry.value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::EditResult;

    fn path(text: &str) -> KeyPath {
        KeyPath::parse(text).unwrap()
    }

    fn apply(text: &str, plan: Plan) -> String {
        match plan {
            Plan::Edit(edit) => match edit.apply_to(text).unwrap() {
                EditResult::Applied { text, .. } => text,
                EditResult::AlreadyApplied => text.to_string(),
            },
            Plan::NoOp(_) => text.to_string(),
        }
    }

    fn set(text: &str, key: &str, value: ConfigValue) -> String {
        let plan = YamlEditor::parse(text).unwrap().plan_set(&path(key), &value).unwrap();
        apply(text, plan)
    }

    fn append(text: &str, key: &str, value: ConfigValue) -> String {
        let plan = YamlEditor::parse(text)
            .unwrap()
            .plan_append(&path(key), &value)
            .unwrap();
        apply(text, plan)
    }

    #[test]
    fn detects_indent_unit() {
        let editor = YamlEditor::parse("a:\n  b: 1\n").unwrap();
        assert_eq!(editor.indent_unit(), 2);
        let editor = YamlEditor::parse("a: 1\n").unwrap();
        assert_eq!(editor.indent_unit(), DEFAULT_INDENT);
        let editor = YamlEditor::parse("a:\n- x\nb:\n   c: 1\n").unwrap();
        assert_eq!(editor.indent_unit(), 3);
    }

    #[test]
    fn inserts_new_key_at_end_of_block() {
        let text = "doctrine:\n    dbal:\n        url: x # db\n    orm: ~\n";
        let out = set(text, "doctrine.dbal.types.uuid", "Uuid".into());
        assert_eq!(
            out,
            "doctrine:\n    dbal:\n        url: x # db\n        types:\n            uuid: Uuid\n    orm: ~\n"
        );
    }

    #[test]
    fn replaces_scalar_in_place() {
        let text = "a:\n  b: old # keep me\n  c: 1\n";
        assert_eq!(set(text, "a.b", "new".into()), "a:\n  b: new # keep me\n  c: 1\n");
    }

    #[test]
    fn replaces_block_with_scalar_keeping_key_comment() {
        let text = "a: # note\n  b: 1\nz: 2\n";
        assert_eq!(set(text, "a", "flat".into()), "a: flat # note\nz: 2\n");
    }

    #[test]
    fn fills_null_slot_with_block() {
        let text = "a:\nb: 1\n";
        assert_eq!(set(text, "a.c", ConfigValue::Integer(3)), "a:\n    c: 3\nb: 1\n");
        let text = "a: ~\n";
        assert_eq!(set(text, "a.c", ConfigValue::Integer(3)), "a:\n    c: 3\n");
    }

    #[test]
    fn empty_flow_mapping_becomes_block() {
        let text = "doctrine:\n  orm:\n    mappings: {} # none yet\n";
        assert_eq!(
            set(text, "doctrine.orm.mappings.App.type", "attribute".into()),
            "doctrine:\n  orm:\n    mappings: # none yet\n      App:\n        type: attribute\n"
        );
    }

    #[test]
    fn non_empty_flow_mapping_stays_flow() {
        let text = "a: { x: 1 }\n";
        assert_eq!(set(text, "a.y", ConfigValue::Integer(2)), "a: { x: 1, y: 2 }\n");
        assert_eq!(set(text, "a.x", ConfigValue::Integer(5)), "a: { x: 5 }\n");
    }

    #[test]
    fn appends_to_block_sequence_at_item_indent() {
        let text = "paths:\n    - a\n    - b\nother: 1\n";
        assert_eq!(
            append(text, "paths", "c".into()),
            "paths:\n    - a\n    - b\n    - c\nother: 1\n"
        );
        let text = "paths:\n- a\n";
        assert_eq!(append(text, "paths", "b".into()), "paths:\n- a\n- b\n");
    }

    #[test]
    fn appends_to_flow_sequence() {
        assert_eq!(append("p: [a]\n", "p", "b".into()), "p: [a, b]\n");
        assert_eq!(append("p: []\n", "p", "b".into()), "p: [b]\n");
    }

    #[test]
    fn append_creates_list_for_null_and_missing() {
        assert_eq!(append("p:\n", "p", "x".into()), "p:\n    - x\n");
        assert_eq!(
            append("a: 1\n", "api_platform.mapping.paths", "/src".into()),
            "a: 1\napi_platform:\n    mapping:\n        paths:\n            - /src\n"
        );
    }

    #[test]
    fn append_is_noop_when_present() {
        let editor = YamlEditor::parse("p: [a, 'b']\n").unwrap();
        let plan = editor.plan_append(&path("p"), &"b".into()).unwrap();
        assert!(matches!(plan, Plan::NoOp(_)));
    }

    #[test]
    fn append_to_scalar_is_shape_conflict() {
        let editor = YamlEditor::parse("p: scalar\nm: { a: 1 }\n").unwrap();
        let err = editor.plan_append(&path("p"), &"x".into()).unwrap_err();
        assert!(matches!(
            err,
            PatchError::IncompatibleShape { ref expected, ref found, .. }
                if expected == "sequence" && found == "string"
        ));
        let err = editor.plan_append(&path("m"), &"x".into()).unwrap_err();
        assert!(err.is_shape_conflict());
    }

    #[test]
    fn set_through_scalar_is_not_creatable() {
        let editor = YamlEditor::parse("a:\n  b: [1]\n").unwrap();
        let err = editor
            .plan_set(&path("a.b.c"), &ConfigValue::Integer(1))
            .unwrap_err();
        assert_eq!(
            err,
            PatchError::PathNotCreatable {
                path: "a.b.c".to_string(),
                blocking: "a.b".to_string(),
                found: "sequence".to_string(),
            }
        );
    }

    #[test]
    fn set_if_absent_leaves_existing_values() {
        let editor = YamlEditor::parse("a: 1\n").unwrap();
        let plan = editor
            .plan_set_if_absent(&path("a"), &ConfigValue::Integer(2))
            .unwrap();
        assert!(matches!(plan, Plan::NoOp(_)));
        let plan = editor
            .plan_set_if_absent(&path("b"), &ConfigValue::Integer(2))
            .unwrap();
        assert_eq!(apply("a: 1\n", plan), "a: 1\nb: 2\n");
    }

    #[test]
    fn empty_document_receives_entries() {
        assert_eq!(set("", "a.b", "c".into()), "a:\n    b: c\n");
        assert_eq!(set("# header", "a", "c".into()), "# header\na: c\n");
        assert_eq!(set("---\n", "a", "c".into()), "---\na: c\n");
    }

    #[test]
    fn crlf_documents_keep_crlf() {
        let text = "a:\r\n  b: 1\r\n";
        assert_eq!(set(text, "a.c", ConfigValue::Integer(2)), "a:\r\n  b: 1\r\n  c: 2\r\n");
    }

    #[test]
    fn anchors_survive_replacement() {
        let text = "base: &base 1\nother: *base\n";
        assert_eq!(set(text, "base", ConfigValue::Integer(2)), "base: &base 2\nother: *base\n");
    }

    #[test]
    fn overwriting_drops_application_tags() {
        let text = "a: !php/const\n  Foo::BAR\n";
        assert_eq!(set(text, "a", "baz".into()), "a: baz\n");
        let text = "a: !php/const Foo::BAR # const\nb: 1\n";
        assert_eq!(set(text, "a", "baz".into()), "a: baz # const\nb: 1\n");
        let text = "a: { b: !php/const X }\n";
        assert_eq!(set(text, "a.b", "Y".into()), "a: { b: Y }\n");
    }

    #[test]
    fn overwriting_tagged_value_keeps_anchor() {
        let text = "a: &x !php/const Foo::BAR\nb: *x\n";
        assert_eq!(set(text, "a", "baz".into()), "a: &x baz\nb: *x\n");
    }

    #[test]
    fn tagged_value_is_not_already_set() {
        let editor = YamlEditor::parse("a: !php/const baz\n").unwrap();
        let plan = editor.plan_set(&path("a"), &"baz".into()).unwrap();
        assert!(matches!(plan, Plan::Edit(_)));
        assert_eq!(apply("a: !php/const baz\n", plan), "a: baz\n");
    }

    #[test]
    fn tagged_block_replaced_by_block() {
        let text = "a: !tagged_iterator\n  - x\nb: 1\n";
        assert_eq!(
            set(text, "a", ConfigValue::Sequence(vec!["y".into()])),
            "a:\n  - y\nb: 1\n"
        );
    }

    #[test]
    fn append_does_not_treat_tagged_item_as_present() {
        let text = "p:\n    - !php/const X\n";
        assert_eq!(append(text, "p", "X".into()), "p:\n    - !php/const X\n    - X\n");
        assert_eq!(append("p: [!php/const X]\n", "p", "X".into()), "p: [!php/const X, X]\n");
    }

    #[test]
    fn editing_through_alias_is_unsupported() {
        let editor = YamlEditor::parse("base: &b { x: 1 }\ncopy: *b\n").unwrap();
        let err = editor
            .plan_set(&path("copy.y"), &ConfigValue::Integer(2))
            .unwrap_err();
        assert!(matches!(err, PatchError::Unsupported { .. }));
    }
}
