//! Element-tree scanner for XML configuration files.
//!
//! Records byte spans for start tags, attributes and end tags so edits can
//! touch a single tag and leave everything else as written.

use crate::patch::PatchError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    pub root: Element,
    pub newline: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    /// Offset of `<`
    pub start: usize,
    pub attributes: Vec<Attribute>,
    /// End of the last attribute (or of the name); new attributes go here
    pub attrs_end: usize,
    /// Offset just past the start tag's `>`
    pub tag_end: usize,
    pub self_closing: bool,
    pub children: Vec<Element>,
    /// End of the last non-blank content inside the element
    pub last_content_end: usize,
    /// Offset of `</`; equals `tag_end` for self-closing elements
    pub close_start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    /// First byte inside the quotes
    pub value_start: usize,
    pub value_end: usize,
    /// Value with entities decoded
    pub value: String,
    pub quote: u8,
}

impl Element {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    pub fn has_content(&self) -> bool {
        self.last_content_end > self.tag_end
    }
}

pub fn parse(text: &str) -> Result<XmlDocument, PatchError> {
    let mut parser = Parser {
        text,
        bytes: text.as_bytes(),
        pos: 0,
    };
    let root = parser.document()?;
    let newline = if text.contains("\r\n") { "\r\n" } else { "\n" };
    Ok(XmlDocument { root, newline })
}

struct Parser<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn document(&mut self) -> Result<Element, PatchError> {
        if self.text.starts_with('\u{feff}') {
            self.pos = '\u{feff}'.len_utf8();
        }

        let root = loop {
            self.skip_whitespace();
            if self.pos >= self.bytes.len() {
                return Err(self.error(self.pos, "document has no root element"));
            }
            if self.skip_misc()? {
                continue;
            }
            if self.starts_with("<!DOCTYPE") {
                self.skip_doctype()?;
                continue;
            }
            if self.bytes[self.pos] == b'<' {
                break self.element()?;
            }
            return Err(self.error(self.pos, "text outside the root element"));
        };

        loop {
            self.skip_whitespace();
            if self.pos >= self.bytes.len() {
                break;
            }
            if self.skip_misc()? {
                continue;
            }
            if self.bytes[self.pos] == b'<' {
                return Err(self.error(self.pos, "multiple root elements"));
            }
            return Err(self.error(self.pos, "text outside the root element"));
        }

        Ok(root)
    }

    /// Skip a comment or processing instruction at the cursor.
    fn skip_misc(&mut self) -> Result<bool, PatchError> {
        if self.starts_with("<!--") {
            self.skip_past(self.pos + 4, "-->", "unterminated comment")?;
            return Ok(true);
        }
        if self.starts_with("<?") {
            self.skip_past(self.pos + 2, "?>", "unterminated processing instruction")?;
            return Ok(true);
        }
        Ok(false)
    }

    fn skip_doctype(&mut self) -> Result<(), PatchError> {
        let start = self.pos;
        let mut depth = 0usize;
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b'[' => depth += 1,
                b']' => depth = depth.saturating_sub(1),
                b'>' if depth == 0 => {
                    self.pos += 1;
                    return Ok(());
                }
                _ => {}
            }
            self.pos += 1;
        }
        Err(self.error(start, "unterminated DOCTYPE"))
    }

    fn element(&mut self) -> Result<Element, PatchError> {
        let start = self.pos;
        self.pos += 1;
        let name = self.name()?;
        let mut attributes: Vec<Attribute> = Vec::new();
        let mut attrs_end = self.pos;

        let self_closing = loop {
            let blank = self.skip_whitespace();
            match self.bytes.get(self.pos) {
                None => return Err(self.error(start, &format!("unterminated start tag <{name}>"))),
                Some(b'>') => {
                    self.pos += 1;
                    break false;
                }
                Some(b'/') => {
                    if self.bytes.get(self.pos + 1) != Some(&b'>') {
                        return Err(self.error(self.pos, "expected '/>'"));
                    }
                    self.pos += 2;
                    break true;
                }
                Some(_) => {
                    if blank == 0 {
                        return Err(self.error(self.pos, "expected whitespace before attribute"));
                    }
                    let attribute = self.attribute()?;
                    if attributes.iter().any(|existing| existing.name == attribute.name) {
                        return Err(self.error(
                            self.pos,
                            &format!("duplicate attribute '{}'", attribute.name),
                        ));
                    }
                    attrs_end = self.pos;
                    attributes.push(attribute);
                }
            }
        };

        let tag_end = self.pos;
        if self_closing {
            return Ok(Element {
                name,
                start,
                attributes,
                attrs_end,
                tag_end,
                self_closing,
                children: Vec::new(),
                last_content_end: tag_end,
                close_start: tag_end,
                end: tag_end,
            });
        }

        let mut children = Vec::new();
        let mut last_content_end = tag_end;
        let close_start = loop {
            if self.pos >= self.bytes.len() {
                return Err(self.error(start, &format!("unclosed element <{name}>")));
            }
            if self.starts_with("</") {
                let close_start = self.pos;
                self.pos += 2;
                let closing = self.name()?;
                if closing != name {
                    return Err(self.error(
                        close_start,
                        &format!("mismatched end tag: expected </{name}>, found </{closing}>"),
                    ));
                }
                self.skip_whitespace();
                if self.bytes.get(self.pos) != Some(&b'>') {
                    return Err(self.error(self.pos, "expected '>'"));
                }
                self.pos += 1;
                break close_start;
            }
            if self.skip_misc()? {
                last_content_end = self.pos;
                continue;
            }
            if self.starts_with("<![CDATA[") {
                self.skip_past(self.pos + 9, "]]>", "unterminated CDATA section")?;
                last_content_end = self.pos;
                continue;
            }
            if self.bytes[self.pos] == b'<' {
                let child = self.element()?;
                last_content_end = child.end;
                children.push(child);
                continue;
            }

            let text_start = self.pos;
            while self.pos < self.bytes.len() && self.bytes[self.pos] != b'<' {
                self.pos += 1;
            }
            let text = &self.text[text_start..self.pos];
            let trimmed = text.trim_end();
            if !trimmed.trim_start().is_empty() {
                last_content_end = text_start + trimmed.len();
            }
        };

        Ok(Element {
            name,
            start,
            attributes,
            attrs_end,
            tag_end,
            self_closing,
            children,
            last_content_end,
            close_start,
            end: self.pos,
        })
    }

    fn attribute(&mut self) -> Result<Attribute, PatchError> {
        let name = self.name()?;
        self.skip_whitespace();
        if self.bytes.get(self.pos) != Some(&b'=') {
            return Err(self.error(self.pos, &format!("expected '=' after attribute '{name}'")));
        }
        self.pos += 1;
        self.skip_whitespace();
        let quote = match self.bytes.get(self.pos).copied() {
            Some(quote @ (b'"' | b'\'')) => quote,
            _ => return Err(self.error(self.pos, "expected quoted attribute value")),
        };
        let value_start = self.pos + 1;
        let mut end = value_start;
        while end < self.bytes.len() && self.bytes[end] != quote {
            if self.bytes[end] == b'<' {
                return Err(self.error(end, "'<' not allowed in attribute value"));
            }
            end += 1;
        }
        if end >= self.bytes.len() {
            return Err(self.error(self.pos, "unterminated attribute value"));
        }
        let value = decode_entities(&self.text[value_start..end])
            .map_err(|message| self.error(value_start, &message))?;
        self.pos = end + 1;
        Ok(Attribute {
            name,
            value_start,
            value_end: end,
            value,
            quote,
        })
    }

    fn name(&mut self) -> Result<String, PatchError> {
        let start = self.pos;
        for (offset, ch) in self.text[start..].char_indices() {
            let valid = if offset == 0 {
                ch.is_alphabetic() || ch == '_' || ch == ':'
            } else {
                ch.is_alphanumeric() || matches!(ch, '_' | ':' | '-' | '.')
            };
            if !valid {
                break;
            }
            self.pos = start + offset + ch.len_utf8();
        }
        if self.pos == start {
            return Err(self.error(start, "expected a name"));
        }
        Ok(self.text[start..self.pos].to_string())
    }

    fn skip_whitespace(&mut self) -> usize {
        let start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        self.pos - start
    }

    fn skip_past(&mut self, from: usize, terminator: &str, message: &str) -> Result<(), PatchError> {
        match self.text[from..].find(terminator) {
            Some(offset) => {
                self.pos = from + offset + terminator.len();
                Ok(())
            }
            None => Err(self.error(self.pos, message)),
        }
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.bytes[self.pos..].starts_with(prefix.as_bytes())
    }

    fn error(&self, offset: usize, message: &str) -> PatchError {
        let (line, column) = line_column(self.text, offset);
        PatchError::xml(format!("{message} at line {line}, column {column}"))
    }
}

fn line_column(text: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(text.len());
    let before = &text.as_bytes()[..offset];
    let line = before.iter().filter(|byte| **byte == b'\n').count() + 1;
    let line_start = before
        .iter()
        .rposition(|byte| *byte == b'\n')
        .map_or(0, |pos| pos + 1);
    (line, offset - line_start + 1)
}

fn decode_entities(raw: &str) -> Result<String, String> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = after
            .find(';')
            .ok_or_else(|| "unterminated entity reference".to_string())?;
        let entity = &after[..semi];
        let decoded = match entity {
            "lt" => '<',
            "gt" => '>',
            "amp" => '&',
            "quot" => '"',
            "apos" => '\'',
            _ => {
                let code = if let Some(hex) = entity.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse::<u32>().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32)
                    .ok_or_else(|| format!("unknown entity '&{entity};'"))?
            }
        };
        out.push(decoded);
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Escape an attribute value for the given quote character.
pub fn escape_attribute(value: &str, quote: u8) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' if quote == b'"' => out.push_str("&quot;"),
            '\'' if quote == b'\'' => out.push_str("&apos;"),
            '\n' => out.push_str("&#10;"),
            '\t' => out.push_str("&#9;"),
            other => out.push(other),
        }
    }
    out
}
