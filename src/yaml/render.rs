//! Rendering of new YAML text in the style hand-written config files use.

use crate::patch::ConfigValue;
use serde_yaml::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockStyle {
    /// Spaces added per nesting level
    pub unit: usize,
    pub newline: &'static str,
}

impl Default for BlockStyle {
    fn default() -> Self {
        Self {
            unit: 4,
            newline: "\n",
        }
    }
}

/// `key: value` at `indent`, with nested blocks below it. No trailing newline.
pub fn block_entry(key: &str, value: &ConfigValue, indent: usize, style: BlockStyle) -> String {
    let pad = " ".repeat(indent);
    if value.is_block_collection() {
        format!(
            "{pad}{}:{}{}",
            render_key(key, false),
            style.newline,
            block_body(value, indent + style.unit, style)
        )
    } else {
        format!("{pad}{}: {}", render_key(key, false), inline(value))
    }
}

/// Lines of a non-empty mapping or sequence, every line indented to `indent`.
pub fn block_body(value: &ConfigValue, indent: usize, style: BlockStyle) -> String {
    match value {
        ConfigValue::Mapping(entries) if !entries.is_empty() => entries
            .iter()
            .map(|(key, value)| block_entry(key, value, indent, style))
            .collect::<Vec<_>>()
            .join(style.newline),
        ConfigValue::Sequence(items) if !items.is_empty() => items
            .iter()
            .map(|item| block_item(item, indent, style))
            .collect::<Vec<_>>()
            .join(style.newline),
        other => format!("{}{}", " ".repeat(indent), inline(other)),
    }
}

/// `- item` at `indent`. Mappings continue on the following lines aligned
/// with their first key; nested sequences use flow style.
pub fn block_item(value: &ConfigValue, indent: usize, style: BlockStyle) -> String {
    let pad = " ".repeat(indent);
    match value {
        ConfigValue::Mapping(entries) if !entries.is_empty() => {
            let body = block_body(value, indent + 2, style);
            format!("{pad}- {}", &body[indent + 2..])
        }
        other => format!("{pad}- {}", inline(other)),
    }
}

/// Single-line form: scalars, empty collections, flow for the rest.
pub fn inline(value: &ConfigValue) -> String {
    match value {
        ConfigValue::Mapping(_) | ConfigValue::Sequence(_) => flow(value),
        scalar => render_scalar(scalar, false),
    }
}

pub fn flow(value: &ConfigValue) -> String {
    match value {
        ConfigValue::Mapping(entries) if entries.is_empty() => "{}".to_string(),
        ConfigValue::Mapping(entries) => {
            let body = entries
                .iter()
                .map(|(key, value)| format!("{}: {}", render_key(key, true), flow(value)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{{ {body} }}")
        }
        ConfigValue::Sequence(items) => {
            let body = items.iter().map(flow).collect::<Vec<_>>().join(", ");
            format!("[{body}]")
        }
        scalar => render_scalar(scalar, true),
    }
}

pub fn render_key(key: &str, in_flow: bool) -> String {
    render_string(key, in_flow)
}

fn render_scalar(value: &ConfigValue, in_flow: bool) -> String {
    match value {
        ConfigValue::Null => "null".to_string(),
        ConfigValue::Bool(flag) => flag.to_string(),
        ConfigValue::Integer(int) => int.to_string(),
        ConfigValue::Float(float) => render_float(*float),
        ConfigValue::String(text) => render_string(text, in_flow),
        ConfigValue::Mapping(_) | ConfigValue::Sequence(_) => flow(value),
    }
}

fn render_float(float: f64) -> String {
    if float.is_nan() {
        ".nan".to_string()
    } else if float.is_infinite() {
        if float > 0.0 { ".inf" } else { "-.inf" }.to_string()
    } else {
        // Debug keeps the fractional part (`1.0`), Display would not
        format!("{float:?}")
    }
}

fn render_string(text: &str, in_flow: bool) -> String {
    if is_plain_safe(text, in_flow) {
        text.to_string()
    } else if text.chars().any(char::is_control) {
        // JSON string syntax is valid YAML double-quoted syntax
        serde_json::to_string(text).unwrap_or_else(|_| single_quoted(text))
    } else {
        single_quoted(text)
    }
}

fn single_quoted(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn is_plain_safe(text: &str, in_flow: bool) -> bool {
    let Some(first) = text.chars().next() else {
        return false;
    };
    if "-?:,[]{}#&*!|>'\"%@`".contains(first) || first.is_whitespace() {
        return false;
    }
    if text.ends_with(char::is_whitespace) || text.ends_with(':') {
        return false;
    }
    if text.chars().any(char::is_control) || text.contains(": ") || text.contains(" #") {
        return false;
    }
    if in_flow && text.contains([',', '[', ']', '{', '}']) {
        return false;
    }
    // rules out `true`, `42`, `~` and friends
    matches!(serde_yaml::from_str::<Value>(text), Ok(Value::String(parsed)) if parsed == text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_when_round_trip_safe() {
        assert_eq!(inline(&r"App\Type\CustomerIdType".into()), r"App\Type\CustomerIdType");
        assert_eq!(inline(&"/src/Resource".into()), "/src/Resource");
        assert_eq!(inline(&"attribute".into()), "attribute");
    }

    #[test]
    fn quoted_when_ambiguous() {
        assert_eq!(
            inline(&"%kernel.project_dir%/src".into()),
            "'%kernel.project_dir%/src'"
        );
        assert_eq!(inline(&"true".into()), "'true'");
        assert_eq!(inline(&"42".into()), "'42'");
        assert_eq!(inline(&"".into()), "''");
        assert_eq!(inline(&"it's: here".into()), "'it''s: here'");
        assert_eq!(inline(&"line\nbreak".into()), "\"line\\nbreak\"");
    }

    #[test]
    fn scalars_of_other_types() {
        assert_eq!(inline(&ConfigValue::Null), "null");
        assert_eq!(inline(&ConfigValue::Bool(false)), "false");
        assert_eq!(inline(&ConfigValue::Integer(-3)), "-3");
        assert_eq!(inline(&ConfigValue::Float(1.0)), "1.0");
        assert_eq!(inline(&ConfigValue::Float(f64::INFINITY)), ".inf");
    }

    #[test]
    fn flow_collections() {
        let value = ConfigValue::Mapping(vec![
            ("a".to_string(), ConfigValue::Sequence(vec!["x,y".into(), ConfigValue::Integer(1)])),
            ("b".to_string(), ConfigValue::Mapping(vec![])),
        ]);
        assert_eq!(flow(&value), "{ a: ['x,y', 1], b: {} }");
    }

    #[test]
    fn block_entries_nest_with_unit() {
        let value = ConfigValue::nest(
            &["types".to_string()],
            ConfigValue::Mapping(vec![("customer_id".to_string(), "X".into())]),
        );
        let style = BlockStyle {
            unit: 2,
            newline: "\n",
        };
        assert_eq!(
            block_entry("dbal", &value, 2, style),
            "  dbal:\n    types:\n      customer_id: X"
        );
    }

    #[test]
    fn block_items_with_mappings() {
        let item = ConfigValue::Mapping(vec![
            ("a".to_string(), ConfigValue::Integer(1)),
            ("b".to_string(), ConfigValue::Sequence(vec!["x".into()])),
        ]);
        assert_eq!(
            block_item(&item, 4, BlockStyle::default()),
            "    - a: 1\n      b:\n          - x"
        );
    }
}
