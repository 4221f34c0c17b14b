use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_yaml::value::Tag;
use serde_yaml::{Mapping, Number, Value};
use std::fmt;

/// A value written into a configuration document.
///
/// Mapping entries keep their insertion order so rendered output is stable,
/// but equality against document content ignores key order.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Sequence(Vec<ConfigValue>),
    Mapping(Vec<(String, ConfigValue)>),
}

impl ConfigValue {
    /// Interpret command-line text as a YAML scalar or flow collection,
    /// falling back to the literal string.
    pub fn parse_inline(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return ConfigValue::String(text.to_string());
        }
        let is_flow = trimmed.starts_with('{') || trimmed.starts_with('[');
        match serde_yaml::from_str::<Value>(trimmed) {
            Ok(Value::Mapping(_) | Value::Sequence(_)) if !is_flow => {
                ConfigValue::String(text.to_string())
            }
            Ok(value) => {
                Self::from_yaml(&value).unwrap_or_else(|| ConfigValue::String(text.to_string()))
            }
            Err(_) => ConfigValue::String(text.to_string()),
        }
    }

    /// Convert a parsed YAML value. Returns `None` for mapping keys that are
    /// themselves collections.
    pub fn from_yaml(value: &Value) -> Option<Self> {
        Some(match value {
            Value::Null => ConfigValue::Null,
            Value::Bool(flag) => ConfigValue::Bool(*flag),
            Value::Number(number) => match number.as_i64() {
                Some(int) => ConfigValue::Integer(int),
                None => ConfigValue::Float(number.as_f64()?),
            },
            Value::String(text) => ConfigValue::String(text.clone()),
            Value::Sequence(items) => ConfigValue::Sequence(
                items
                    .iter()
                    .map(Self::from_yaml)
                    .collect::<Option<Vec<_>>>()?,
            ),
            Value::Mapping(mapping) => {
                let mut entries = Vec::with_capacity(mapping.len());
                for (key, value) in mapping {
                    entries.push((scalar_key(key)?, Self::from_yaml(value)?));
                }
                ConfigValue::Mapping(entries)
            }
            Value::Tagged(tagged) => Self::from_yaml(&tagged.value)?,
        })
    }

    pub fn to_yaml(&self) -> Value {
        match self {
            ConfigValue::Null => Value::Null,
            ConfigValue::Bool(flag) => Value::Bool(*flag),
            ConfigValue::Integer(int) => Value::Number(Number::from(*int)),
            ConfigValue::Float(float) => Value::Number(Number::from(*float)),
            ConfigValue::String(text) => Value::String(text.clone()),
            ConfigValue::Sequence(items) => {
                Value::Sequence(items.iter().map(Self::to_yaml).collect())
            }
            ConfigValue::Mapping(entries) => {
                let mut mapping = Mapping::new();
                for (key, value) in entries {
                    mapping.insert(Value::String(key.clone()), value.to_yaml());
                }
                Value::Mapping(mapping)
            }
        }
    }

    /// Value equality against document content. Mapping key order is not
    /// significant and integers never equal floats. Only YAML core tags
    /// (`!!str`, `!!int`, ...) are looked through; an application tag such as
    /// `!php/const` changes what the value means, so it never matches.
    pub fn matches(&self, other: &Value) -> bool {
        let Some(other) = untag_core(other) else {
            return false;
        };
        match (self, other) {
            (ConfigValue::Null, Value::Null) => true,
            (ConfigValue::Bool(a), Value::Bool(b)) => a == b,
            (ConfigValue::Integer(a), Value::Number(b)) => b.as_i64() == Some(*a),
            (ConfigValue::Float(a), Value::Number(b)) => b.is_f64() && b.as_f64() == Some(*a),
            (ConfigValue::String(a), Value::String(b)) => a == b,
            (ConfigValue::Sequence(a), Value::Sequence(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(left, right)| left.matches(right))
            }
            (ConfigValue::Mapping(a), Value::Mapping(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(key, value)| {
                        lookup(b, key).is_some_and(|existing| value.matches(existing))
                    })
            }
            _ => false,
        }
    }

    /// Wrap `leaf` in one single-entry mapping per segment, outermost first.
    pub fn nest(segments: &[String], leaf: ConfigValue) -> ConfigValue {
        segments.iter().rev().fold(leaf, |inner, key| {
            ConfigValue::Mapping(vec![(key.clone(), inner)])
        })
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ConfigValue::Null => "null",
            ConfigValue::Bool(_) => "boolean",
            ConfigValue::Integer(_) => "integer",
            ConfigValue::Float(_) => "float",
            ConfigValue::String(_) => "string",
            ConfigValue::Sequence(_) => "sequence",
            ConfigValue::Mapping(_) => "mapping",
        }
    }

    /// Non-empty sequences and mappings are rendered as indented blocks.
    pub fn is_block_collection(&self) -> bool {
        match self {
            ConfigValue::Sequence(items) => !items.is_empty(),
            ConfigValue::Mapping(entries) => !entries.is_empty(),
            _ => false,
        }
    }
}

pub(crate) fn untag(value: &Value) -> &Value {
    match value {
        Value::Tagged(tagged) => untag(&tagged.value),
        other => other,
    }
}

fn untag_core(value: &Value) -> Option<&Value> {
    match value {
        Value::Tagged(tagged) if is_core_tag(&tagged.tag) => untag_core(&tagged.value),
        Value::Tagged(_) => None,
        other => Some(other),
    }
}

fn is_core_tag(tag: &Tag) -> bool {
    let name = tag.to_string();
    let core = name
        .strip_prefix("!!")
        .or_else(|| name.strip_prefix("!tag:yaml.org,2002:"))
        .or_else(|| name.strip_prefix("tag:yaml.org,2002:"));
    matches!(
        core,
        Some("str" | "int" | "float" | "bool" | "null" | "seq" | "map")
    )
}

/// Find the entry for a path segment. Numeric and boolean keys match their
/// plain text form.
pub(crate) fn lookup<'v>(mapping: &'v Mapping, segment: &str) -> Option<&'v Value> {
    mapping
        .iter()
        .find(|(key, _)| scalar_key(key).as_deref() == Some(segment))
        .map(|(_, value)| value)
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match untag(value) {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(number) if number.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

fn scalar_key(key: &Value) -> Option<String> {
    match untag(key) {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::yaml::render::flow(self))
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::String(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Integer(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        ConfigValue::Float(value)
    }
}

impl From<Vec<ConfigValue>> for ConfigValue {
    fn from(value: Vec<ConfigValue>) -> Self {
        ConfigValue::Sequence(value)
    }
}

// toml_edit hands datetimes over as a single-entry map with this key.
const TOML_DATETIME_KEY: &str = "$__toml_private_datetime";

impl<'de> Deserialize<'de> for ConfigValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ConfigValueVisitor)
    }
}

struct ConfigValueVisitor;

impl<'de> Visitor<'de> for ConfigValueVisitor {
    type Value = ConfigValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string, number, boolean, array or table")
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> Result<ConfigValue, E> {
        Ok(ConfigValue::Bool(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<ConfigValue, E> {
        Ok(ConfigValue::Integer(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<ConfigValue, E> {
        match i64::try_from(value) {
            Ok(int) => Ok(ConfigValue::Integer(int)),
            Err(_) => Err(E::custom(format!("integer {value} is out of range"))),
        }
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<ConfigValue, E> {
        Ok(ConfigValue::Float(value))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<ConfigValue, E> {
        Ok(ConfigValue::String(value.to_string()))
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<ConfigValue, E> {
        Ok(ConfigValue::String(value))
    }

    fn visit_unit<E: de::Error>(self) -> Result<ConfigValue, E> {
        Ok(ConfigValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<ConfigValue, E> {
        Ok(ConfigValue::Null)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<ConfigValue, D::Error>
    where
        D: Deserializer<'de>,
    {
        ConfigValue::deserialize(deserializer)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<ConfigValue, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(ConfigValue::Sequence(items))
    }

    fn visit_map<A>(self, mut map: A) -> Result<ConfigValue, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries: Vec<(String, ConfigValue)> = Vec::new();
        while let Some(key) = map.next_key::<String>()? {
            if key == TOML_DATETIME_KEY {
                return Err(de::Error::custom("datetime values are not supported"));
            }
            let value = map.next_value()?;
            if entries.iter().any(|(existing, _)| *existing == key) {
                return Err(de::Error::custom(format!("duplicate key '{key}'")));
            }
            entries.push((key, value));
        }
        Ok(ConfigValue::Mapping(entries))
    }
}
