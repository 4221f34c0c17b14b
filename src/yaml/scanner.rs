//! Span scanner for YAML configuration files.
//!
//! Builds a tree of byte ranges (block and flow collections, scalars, empty
//! slots) that the editor walks in lockstep with the semantic tree parsed
//! by serde_yaml. The scanner only runs on text serde_yaml accepted, so it
//! reports constructs it cannot locate as `Unsupported` rather than trying
//! to diagnose invalid YAML.

use crate::patch::PatchError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    /// First byte of the value (tags included, anchors excluded)
    pub start: usize,
    /// End of the value; for block collections the end of their last line
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    BlockMap { indent: usize, entries: Vec<Entry> },
    BlockSeq { indent: usize, items: Vec<Node> },
    FlowMap { entries: Vec<Entry> },
    FlowSeq { items: Vec<Node> },
    Scalar { alias: bool },
    /// No value text at all (`key:` or `- `); `start == end`
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub key_start: usize,
    pub key_end: usize,
    /// Column of the key; unused for flow entries
    pub indent: usize,
    pub colon: Option<usize>,
    /// End of the key's line (comment included); for flow entries the value end
    pub line_end: usize,
    pub value: Node,
    pub flow: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub root: Node,
    pub newline: &'static str,
}

impl Node {
    pub(crate) fn empty(at: usize) -> Self {
        Self {
            kind: NodeKind::Empty,
            start: at,
            end: at,
        }
    }

    pub fn entries(&self) -> &[Entry] {
        match &self.kind {
            NodeKind::BlockMap { entries, .. } | NodeKind::FlowMap { entries } => entries,
            _ => &[],
        }
    }

    pub fn find_entry(&self, key: &str) -> Option<&Entry> {
        self.entries().iter().find(|entry| entry.key == key)
    }

    pub fn is_alias(&self) -> bool {
        matches!(self.kind, NodeKind::Scalar { alias: true })
    }
}

pub fn scan(text: &str) -> Result<Document, PatchError> {
    let scanner = Scanner::new(text);
    let root = scanner.scan_root()?;
    let newline = if text.contains("\r\n") { "\r\n" } else { "\n" };
    Ok(Document { root, newline })
}

#[derive(Debug, Clone, Copy)]
struct Line {
    start: usize,
    /// Excludes the line terminator
    end: usize,
    indent: usize,
    blank: bool,
    comment: bool,
}

struct KeyToken {
    key: String,
    start: usize,
    end: usize,
    colon: usize,
}

struct Scanner<'a> {
    text: &'a str,
    bytes: &'a [u8],
    lines: Vec<Line>,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            bytes: text.as_bytes(),
            lines: split_lines(text),
        }
    }

    fn scan_root(&self) -> Result<Node, PatchError> {
        let mut idx = 0;
        let first = loop {
            let Some(n) = self.next_content(idx) else {
                return Ok(Node::empty(self.text.len()));
            };
            let line = self.lines[n];
            let content = &self.text[line.start..line.end];
            if line.indent == 0 && content.starts_with('%') {
                idx = n + 1;
                continue;
            }
            if self.is_marker(n) {
                if content.starts_with("...") {
                    return Ok(Node::empty(self.text.len()));
                }
                let after = content[3..].trim_start();
                if !after.is_empty() && !after.starts_with('#') {
                    return Err(self.unsupported_at(line.start, "content on the document start line"));
                }
                idx = n + 1;
                continue;
            }
            break n;
        };

        let (root, last) = self.block_node(first, self.lines[first].indent, -1)?;
        if let Some(n) = self.next_content(last + 1) {
            let line = self.lines[n];
            if !(self.is_marker(n) && self.text[line.start..].starts_with("...")) {
                return Err(self.unsupported_at(line.start, "content after the document"));
            }
        }
        Ok(root)
    }

    /// Node starting at column `col` of line `idx`, where the rest of the
    /// line is its first text.
    fn block_node(&self, idx: usize, col: usize, parent: isize) -> Result<(Node, usize), PatchError> {
        let line = self.lines[idx];
        let pos = line.start + col;
        let rest = self.rest(idx, col);
        if is_seq_indicator(rest) {
            return self.block_seq(idx, col);
        }
        if rest == "?" || rest.starts_with("? ") {
            return Err(self.unsupported_at(pos, "complex mapping key"));
        }
        if self.read_key(pos, line.end)?.is_some() {
            return self.block_map(idx, col);
        }
        self.inline_node(idx, pos, parent)
    }

    fn block_map(&self, first: usize, col: usize) -> Result<(Node, usize), PatchError> {
        let mut entries = Vec::new();
        let mut idx = first;
        let last = loop {
            let line = self.lines[idx];
            let pos = line.start + col;
            let Some(key) = self.read_key(pos, line.end)? else {
                return Err(self.unsupported_at(pos, "unrecognized mapping entry"));
            };
            let (value, last) = self.value_node(idx, key.colon + 1, col as isize, true)?;
            entries.push(Entry {
                key: key.key,
                key_start: key.start,
                key_end: key.end,
                indent: col,
                colon: Some(key.colon),
                line_end: line.end,
                value,
                flow: false,
            });

            match self.next_content(last + 1) {
                Some(next) if !self.is_marker(next) && self.lines[next].indent == col => {
                    let rest = self.rest(next, col);
                    if rest == "?" || rest.starts_with("? ") {
                        return Err(self.unsupported_at(self.lines[next].start, "complex mapping key"));
                    }
                    idx = next;
                }
                Some(next) if !self.is_marker(next) && self.lines[next].indent > col => {
                    return Err(self.unsupported_at(self.lines[next].start, "unexpected indentation"));
                }
                _ => break last,
            }
        };

        Ok((
            Node {
                kind: NodeKind::BlockMap {
                    indent: col,
                    entries,
                },
                start: self.lines[first].start + col,
                end: self.lines[last].end,
            },
            last,
        ))
    }

    fn block_seq(&self, first: usize, col: usize) -> Result<(Node, usize), PatchError> {
        let mut items = Vec::new();
        let mut idx = first;
        let last = loop {
            let dash = self.lines[idx].start + col;
            let (item, last) = self.value_node(idx, dash + 1, col as isize, false)?;
            items.push(item);

            match self.next_content(last + 1) {
                Some(next)
                    if !self.is_marker(next)
                        && self.lines[next].indent == col
                        && is_seq_indicator(self.rest(next, col)) =>
                {
                    idx = next;
                }
                Some(next) if !self.is_marker(next) && self.lines[next].indent > col => {
                    return Err(self.unsupported_at(self.lines[next].start, "unexpected indentation"));
                }
                _ => break last,
            }
        };

        Ok((
            Node {
                kind: NodeKind::BlockSeq { indent: col, items },
                start: self.lines[first].start + col,
                end: self.lines[last].end,
            },
            last,
        ))
    }

    /// Value following a `key:` or `-` indicator that ends at `after`.
    fn value_node(
        &self,
        idx: usize,
        after: usize,
        parent: isize,
        in_map: bool,
    ) -> Result<(Node, usize), PatchError> {
        let line = self.lines[idx];
        let mut pos = self.skip_blanks(after, line.end);
        let mut tag_start = None;
        let mut props_end = after;
        while pos < line.end && matches!(self.bytes[pos], b'&' | b'!') {
            if self.bytes[pos] == b'!' {
                tag_start.get_or_insert(pos);
            }
            props_end = self.token_end(pos, line.end);
            pos = self.skip_blanks(props_end, line.end);
        }

        if pos >= line.end || self.bytes[pos] == b'#' {
            if let Some(next) = self.next_content(idx + 1) {
                let next_line = self.lines[next];
                let indent = next_line.indent as isize;
                let nested = indent > parent
                    || (in_map && indent == parent && is_seq_indicator(self.rest(next, next_line.indent)));
                if nested && !self.is_marker(next) {
                    return self.block_node(next, next_line.indent, parent);
                }
            }
            return Ok((Node::empty(props_end), idx));
        }

        if !in_map {
            // compact collections: `- - a`, `- key: value`
            let col = pos - line.start;
            if is_seq_indicator(&self.text[pos..line.end]) {
                return self.block_seq(idx, col);
            }
            if self.read_key(pos, line.end)?.is_some() {
                return self.block_map(idx, col);
            }
        }

        let (mut node, last) = self.inline_node(idx, pos, parent)?;
        if let Some(start) = tag_start {
            node.start = start;
        }
        Ok((node, last))
    }

    /// Scalar or flow collection whose first byte is at `pos`.
    fn inline_node(&self, idx: usize, pos: usize, parent: isize) -> Result<(Node, usize), PatchError> {
        let line = self.lines[idx];
        match self.bytes[pos] {
            b'|' | b'>' => {
                let header_end = self.plain_end(pos, line.end);
                let mut last = idx;
                for next in idx + 1..self.lines.len() {
                    let candidate = self.lines[next];
                    if candidate.blank {
                        continue;
                    }
                    if self.is_marker(next) || candidate.indent as isize <= parent {
                        break;
                    }
                    last = next;
                }
                let end = if last == idx {
                    header_end
                } else {
                    self.lines[last].end
                };
                Ok((scalar(pos, end), last))
            }
            b'{' | b'[' => {
                let (node, end) = self.flow_node(pos)?;
                let last = self.line_of(end - 1);
                self.expect_line_end(end, last)?;
                Ok((node, last))
            }
            b'"' | b'\'' => {
                let end = if self.bytes[pos] == b'"' {
                    self.scan_double(pos)?
                } else {
                    self.scan_single(pos)?
                };
                let last = self.line_of(end - 1);
                self.expect_line_end(end, last)?;
                Ok((scalar(pos, end), last))
            }
            b'*' => {
                let end = self.token_end(pos, line.end);
                Ok((
                    Node {
                        kind: NodeKind::Scalar { alias: true },
                        start: pos,
                        end,
                    },
                    idx,
                ))
            }
            _ => {
                let mut end = self.plain_end(pos, line.end);
                let mut last = idx;
                for next in idx + 1..self.lines.len() {
                    let candidate = self.lines[next];
                    if candidate.blank {
                        continue;
                    }
                    if candidate.comment
                        || self.is_marker(next)
                        || candidate.indent as isize <= parent
                    {
                        break;
                    }
                    last = next;
                    end = self.plain_end(candidate.start + candidate.indent, candidate.end);
                }
                Ok((scalar(pos, end), last))
            }
        }
    }

    fn flow_node(&self, pos: usize) -> Result<(Node, usize), PatchError> {
        let open = self.bytes[pos];
        let close = if open == b'{' { b'}' } else { b']' };
        let mut entries = Vec::new();
        let mut items = Vec::new();
        let mut i = pos + 1;

        loop {
            i = self.skip_flow_space(i);
            match self.bytes.get(i) {
                None => return Err(self.malformed(pos, "unterminated flow collection")),
                Some(&byte) if byte == close => {
                    i += 1;
                    break;
                }
                Some(_) => {}
            }

            if open == b'{' {
                let (entry, next) = self.flow_entry(i, close)?;
                entries.push(entry);
                i = next;
            } else {
                let (item, next) = self.flow_value(i)?;
                if self.bytes.get(self.skip_flow_space(next)) == Some(&b':') {
                    return Err(self.unsupported_at(i, "single-pair mapping inside a flow sequence"));
                }
                items.push(item);
                i = next;
            }

            i = self.skip_flow_space(i);
            match self.bytes.get(i) {
                Some(b',') => i += 1,
                Some(&byte) if byte == close => {
                    i += 1;
                    break;
                }
                _ => return Err(self.malformed(i, "expected ',' in flow collection")),
            }
        }

        let kind = if open == b'{' {
            NodeKind::FlowMap { entries }
        } else {
            NodeKind::FlowSeq { items }
        };
        Ok((
            Node {
                kind,
                start: pos,
                end: i,
            },
            i,
        ))
    }

    fn flow_entry(&self, start: usize, close: u8) -> Result<(Entry, usize), PatchError> {
        let (key, key_end) = match self.bytes[start] {
            b'"' => {
                let end = self.scan_double(start)?;
                (decode_quoted(&self.text[start..end])?, end)
            }
            b'\'' => {
                let end = self.scan_single(start)?;
                (decode_quoted(&self.text[start..end])?, end)
            }
            b'?' => return Err(self.unsupported_at(start, "complex mapping key")),
            b'{' | b'[' => return Err(self.unsupported_at(start, "collection used as a mapping key")),
            _ => {
                let end = self.flow_plain_end(start);
                if end == start {
                    return Err(self.malformed(start, "expected a mapping key"));
                }
                (self.text[start..end].to_string(), end)
            }
        };

        let mut i = self.skip_flow_space(key_end);
        if self.bytes.get(i) != Some(&b':') {
            let entry = Entry {
                key,
                key_start: start,
                key_end,
                indent: 0,
                colon: None,
                line_end: key_end,
                value: Node::empty(key_end),
                flow: true,
            };
            return Ok((entry, key_end));
        }

        let colon = i;
        i = self.skip_flow_space(colon + 1);
        let value = match self.bytes.get(i) {
            None => return Err(self.malformed(start, "unterminated flow collection")),
            Some(&byte) if byte == b',' || byte == close => Node::empty(colon + 1),
            Some(_) => {
                let (node, next) = self.flow_value(i)?;
                i = next;
                node
            }
        };

        let entry = Entry {
            key,
            key_start: start,
            key_end,
            indent: 0,
            colon: Some(colon),
            line_end: value.end,
            value,
            flow: true,
        };
        Ok((entry, i))
    }

    fn flow_value(&self, start: usize) -> Result<(Node, usize), PatchError> {
        let mut pos = start;
        while matches!(self.bytes.get(pos), Some(b'&' | b'!')) {
            pos = self.flow_token_end(pos);
            pos = self.skip_flow_space(pos);
        }
        match self.bytes.get(pos) {
            None => Err(self.malformed(start, "unterminated flow collection")),
            Some(b'{' | b'[') => self.flow_node(pos),
            Some(b'"') => {
                let end = self.scan_double(pos)?;
                Ok((scalar(pos, end), end))
            }
            Some(b'\'') => {
                let end = self.scan_single(pos)?;
                Ok((scalar(pos, end), end))
            }
            Some(b'*') => {
                let end = self.flow_token_end(pos);
                Ok((
                    Node {
                        kind: NodeKind::Scalar { alias: true },
                        start: pos,
                        end,
                    },
                    end,
                ))
            }
            Some(_) => {
                let end = self.flow_plain_end(pos);
                Ok((scalar(pos, end), end))
            }
        }
    }

    fn read_key(&self, pos: usize, end: usize) -> Result<Option<KeyToken>, PatchError> {
        let line = &self.text[pos..end];
        let Some(first) = line.bytes().next() else {
            return Ok(None);
        };

        let (key, key_end) = match first {
            b'"' | b'\'' => {
                let close = if first == b'"' {
                    self.scan_double(pos)?
                } else {
                    self.scan_single(pos)?
                };
                if close > end {
                    return Ok(None);
                }
                (decode_quoted(&self.text[pos..close])?, close)
            }
            b'[' | b'{' | b'#' | b'&' | b'*' | b'!' | b'|' | b'>' | b'%' | b'@' | b'`' => {
                return Ok(None);
            }
            b'-' if is_seq_indicator(line) => return Ok(None),
            _ => {
                let mut prev_blank = false;
                let mut colon = None;
                for (i, ch) in line.char_indices() {
                    if ch == '#' && prev_blank {
                        break;
                    }
                    if ch == ':' && matches!(line[i + 1..].chars().next(), None | Some(' ' | '\t')) {
                        colon = Some(i);
                        break;
                    }
                    prev_blank = ch == ' ' || ch == '\t';
                }
                let Some(colon) = colon else {
                    return Ok(None);
                };
                let key = line[..colon].trim_end();
                if key.is_empty() {
                    return Ok(None);
                }
                (key.to_string(), pos + key.len())
            }
        };

        let colon = self.skip_blanks(key_end, end);
        if colon >= end || self.bytes[colon] != b':' {
            return Ok(None);
        }
        if colon + 1 < end && !matches!(self.bytes[colon + 1], b' ' | b'\t') {
            return Ok(None);
        }
        Ok(Some(KeyToken {
            key,
            start: pos,
            end: key_end,
            colon,
        }))
    }

    fn scan_double(&self, pos: usize) -> Result<usize, PatchError> {
        let mut i = pos + 1;
        while i < self.bytes.len() {
            match self.bytes[i] {
                b'\\' => i += 2,
                b'"' => return Ok(i + 1),
                _ => i += 1,
            }
        }
        Err(self.malformed(pos, "unterminated double-quoted scalar"))
    }

    fn scan_single(&self, pos: usize) -> Result<usize, PatchError> {
        let mut i = pos + 1;
        while i < self.bytes.len() {
            if self.bytes[i] == b'\'' {
                if self.bytes.get(i + 1) == Some(&b'\'') {
                    i += 2;
                    continue;
                }
                return Ok(i + 1);
            }
            i += 1;
        }
        Err(self.malformed(pos, "unterminated single-quoted scalar"))
    }

    /// End of a plain scalar on one line: stops at a comment, trailing
    /// blanks trimmed.
    fn plain_end(&self, pos: usize, end: usize) -> usize {
        let mut stop = end;
        for i in pos + 1..end {
            if self.bytes[i] == b'#' && matches!(self.bytes[i - 1], b' ' | b'\t') {
                stop = i;
                break;
            }
        }
        while stop > pos && matches!(self.bytes[stop - 1], b' ' | b'\t') {
            stop -= 1;
        }
        stop
    }

    fn flow_plain_end(&self, pos: usize) -> usize {
        let mut end = pos;
        let mut i = pos;
        while i < self.bytes.len() {
            match self.bytes[i] {
                b',' | b'[' | b']' | b'{' | b'}' | b'\n' | b'\r' => break,
                b':' if matches!(
                    self.bytes.get(i + 1),
                    None | Some(b' ' | b'\t' | b'\n' | b'\r' | b',' | b']' | b'}')
                ) =>
                {
                    break
                }
                b'#' if i > pos && matches!(self.bytes[i - 1], b' ' | b'\t') => break,
                b' ' | b'\t' => {}
                _ => end = i + 1,
            }
            i += 1;
        }
        end
    }

    fn flow_token_end(&self, pos: usize) -> usize {
        let mut i = pos;
        while i < self.bytes.len()
            && !matches!(
                self.bytes[i],
                b' ' | b'\t' | b'\n' | b'\r' | b',' | b'[' | b']' | b'{' | b'}'
            )
        {
            i += 1;
        }
        i
    }

    fn skip_flow_space(&self, mut i: usize) -> usize {
        loop {
            match self.bytes.get(i) {
                Some(b' ' | b'\t' | b'\n' | b'\r') => i += 1,
                Some(b'#') if i == 0 || matches!(self.bytes[i - 1], b' ' | b'\t' | b'\n' | b'\r') => {
                    while i < self.bytes.len() && self.bytes[i] != b'\n' {
                        i += 1;
                    }
                }
                _ => return i,
            }
        }
    }

    fn skip_blanks(&self, mut pos: usize, end: usize) -> usize {
        while pos < end && matches!(self.bytes[pos], b' ' | b'\t') {
            pos += 1;
        }
        pos
    }

    fn token_end(&self, mut pos: usize, end: usize) -> usize {
        while pos < end && !matches!(self.bytes[pos], b' ' | b'\t') {
            pos += 1;
        }
        pos
    }

    fn expect_line_end(&self, end: usize, line: usize) -> Result<(), PatchError> {
        let line_end = self.lines[line].end;
        let pos = self.skip_blanks(end, line_end);
        if pos < line_end && self.bytes[pos] != b'#' {
            return Err(self.unsupported_at(end, "unexpected content after value"));
        }
        Ok(())
    }

    fn rest(&self, idx: usize, col: usize) -> &'a str {
        let line = self.lines[idx];
        &self.text[(line.start + col).min(line.end)..line.end]
    }

    fn next_content(&self, from: usize) -> Option<usize> {
        (from..self.lines.len()).find(|&idx| !self.lines[idx].blank && !self.lines[idx].comment)
    }

    fn is_marker(&self, idx: usize) -> bool {
        let line = self.lines[idx];
        line.indent == 0 && is_marker_text(&self.text[line.start..line.end])
    }

    fn line_of(&self, offset: usize) -> usize {
        self.lines
            .partition_point(|line| line.start <= offset)
            .saturating_sub(1)
    }

    fn unsupported_at(&self, offset: usize, what: &str) -> PatchError {
        PatchError::unsupported(format!("{what} at line {}", self.line_of(offset) + 1))
    }

    fn malformed(&self, offset: usize, what: &str) -> PatchError {
        PatchError::yaml(format!("{what} at line {}", self.line_of(offset) + 1))
    }
}

fn scalar(start: usize, end: usize) -> Node {
    Node {
        kind: NodeKind::Scalar { alias: false },
        start,
        end,
    }
}

fn split_lines(text: &str) -> Vec<Line> {
    let bytes = text.as_bytes();
    let mut lines = Vec::new();
    let mut start = 0;
    loop {
        let newline = text[start..].find('\n').map(|offset| start + offset);
        let mut end = newline.unwrap_or(text.len());
        if end > start && bytes[end - 1] == b'\r' {
            end -= 1;
        }
        let indent = bytes[start..end].iter().take_while(|byte| **byte == b' ').count();
        let trimmed = text[start + indent..end].trim_start();
        lines.push(Line {
            start,
            end,
            indent,
            blank: trimmed.is_empty(),
            comment: trimmed.starts_with('#'),
        });
        match newline {
            Some(pos) => start = pos + 1,
            None => break,
        }
    }
    lines
}

fn is_seq_indicator(rest: &str) -> bool {
    rest == "-" || rest.starts_with("- ") || rest.starts_with("-\t")
}

fn is_marker_text(line: &str) -> bool {
    ["---", "..."].iter().any(|marker| {
        line.strip_prefix(marker)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(' ') || rest.starts_with('\t'))
    })
}

fn decode_quoted(raw: &str) -> Result<String, PatchError> {
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return Ok(raw[1..raw.len() - 1].replace("''", "'"));
    }
    serde_yaml::from_str::<String>(raw).map_err(|err| PatchError::yaml(err.to_string()))
}
