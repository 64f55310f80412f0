use serde_yaml::{Mapping, Value};
use thiserror::Error;

// ============================================================================
// Accessibility tree grammar
//
//   header := role [ "\"" name "\"" | "/" pattern "/" ] { "[" key [ "=" value ] "]" }
//
// The raw tree is ARIA-snapshot YAML. A sequence item is either a bare header
// string or a single-entry mapping `header: value`, where `value` is inline
// text (string) or the child list (sequence). The same header grammar applies
// to list items and mapping keys.
// ============================================================================

/// Keys starting with this prefix carry metadata (e.g. `/url`), not nodes.
pub const METADATA_PREFIX: char = '/';

#[derive(Debug, Clone, PartialEq)]
pub struct AriaHeader {
    pub role: String,
    pub name: Option<String>,
    /// `name` came from `/pattern/` and is a regular expression, not text.
    pub name_is_pattern: bool,
    pub attrs: Vec<AriaAttr>,
}

impl AriaHeader {
    pub fn attr(&self, key: &str) -> Option<&AriaAttr> {
        self.attrs.iter().find(|a| a.key == key)
    }

    pub fn attr_value(&self, key: &str) -> Option<&str> {
        self.attr(key).and_then(|a| a.value.as_deref())
    }

    pub fn has_flag(&self, key: &str) -> bool {
        self.attr(key)
            .is_some_and(|a| a.value.as_deref().is_none_or(|v| v == "true"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AriaAttr {
    pub key: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AriaEntry {
    Node {
        header: AriaHeader,
        text: Option<String>,
        children: Vec<AriaEntry>,
    },
    /// Header did not match the grammar. Children are kept so the walk can
    /// still reach well-formed descendants.
    Malformed {
        raw: String,
        reason: HeaderError,
        children: Vec<AriaEntry>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("missing role")]
    MissingRole,
    #[error("unterminated name")]
    UnterminatedName,
    #[error("unterminated attribute")]
    UnterminatedAttribute,
    #[error("empty attribute")]
    EmptyAttribute,
    #[error("unexpected trailing input {0:?}")]
    Trailing(String),
    #[error("non-string key")]
    NonStringKey,
}

/// Parse a whole ARIA-snapshot document.
pub fn parse_tree(yaml: &str) -> Result<Vec<AriaEntry>, serde_yaml::Error> {
    if yaml.trim().is_empty() {
        return Ok(Vec::new());
    }
    let value: Value = serde_yaml::from_str(yaml)?;
    Ok(entries_from_value(&value))
}

pub fn entries_from_value(value: &Value) -> Vec<AriaEntry> {
    match value {
        Value::Sequence(items) => items.iter().flat_map(entries_from_item).collect(),
        Value::Mapping(map) => entries_from_mapping(map),
        Value::String(s) => entry_from_header(s, None, Vec::new()).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn entries_from_item(item: &Value) -> Vec<AriaEntry> {
    match item {
        Value::String(s) => entry_from_header(s, None, Vec::new()).into_iter().collect(),
        Value::Mapping(map) => entries_from_mapping(map),
        Value::Null => Vec::new(),
        other => vec![AriaEntry::Malformed {
            raw: scalar_text(other).unwrap_or_default(),
            reason: HeaderError::MissingRole,
            children: Vec::new(),
        }],
    }
}

fn entries_from_mapping(map: &Mapping) -> Vec<AriaEntry> {
    map.iter()
        .filter_map(|(key, value)| {
            let (text, children) = match value {
                Value::Sequence(_) | Value::Mapping(_) => (None, entries_from_value(value)),
                other => (scalar_text(other), Vec::new()),
            };

            match key.as_str() {
                Some(k) => entry_from_header(k, text, children),
                None => Some(AriaEntry::Malformed {
                    raw: scalar_text(key).unwrap_or_default(),
                    reason: HeaderError::NonStringKey,
                    children,
                }),
            }
        })
        .collect()
}

/// `None` for metadata keys: they are dropped together with their subtree.
fn entry_from_header(raw: &str, text: Option<String>, children: Vec<AriaEntry>) -> Option<AriaEntry> {
    if raw.trim_start().starts_with(METADATA_PREFIX) {
        return None;
    }

    Some(match parse_header(raw) {
        Ok(header) => AriaEntry::Node {
            header,
            text,
            children,
        },
        Err(reason) => AriaEntry::Malformed {
            raw: raw.to_string(),
            reason,
            children,
        },
    })
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// ============================================================================
// Header parser
// ============================================================================

pub fn parse_header(raw: &str) -> Result<AriaHeader, HeaderError> {
    let mut rest = raw.trim();

    let role_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .unwrap_or(rest.len());
    if role_len == 0 {
        return Err(HeaderError::MissingRole);
    }
    let role = rest[..role_len].to_ascii_lowercase();
    rest = rest[role_len..].trim_start();

    let mut name_is_pattern = false;
    let name = match rest.chars().next() {
        Some('"') => {
            let (name, tail) = take_delimited(&rest[1..], '"').ok_or(HeaderError::UnterminatedName)?;
            rest = tail.trim_start();
            Some(name)
        }
        Some('/') => {
            let (pattern, tail) = take_pattern(&rest[1..]).ok_or(HeaderError::UnterminatedName)?;
            rest = tail.trim_start();
            name_is_pattern = true;
            Some(pattern)
        }
        _ => None,
    };

    let mut attrs = Vec::new();
    while let Some(tail) = rest.strip_prefix('[') {
        let close = tail.find(']').ok_or(HeaderError::UnterminatedAttribute)?;
        let body = tail[..close].trim();
        if body.is_empty() {
            return Err(HeaderError::EmptyAttribute);
        }
        attrs.push(match body.split_once('=') {
            Some((k, v)) => AriaAttr {
                key: k.trim().to_string(),
                value: Some(unquote(v.trim())),
            },
            None => AriaAttr {
                key: body.to_string(),
                value: None,
            },
        });
        rest = tail[close + 1..].trim_start();
    }

    if !rest.is_empty() {
        return Err(HeaderError::Trailing(rest.to_string()));
    }

    Ok(AriaHeader {
        role,
        name,
        name_is_pattern,
        attrs,
    })
}

/// Read up to the closing delimiter, honouring backslash escapes.
fn take_delimited(input: &str, delim: char) -> Option<(String, &str)> {
    let mut out = String::new();
    let mut chars = input.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                let (_, escaped) = chars.next()?;
                match escaped {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    other => out.push(other),
                }
            }
            c if c == delim => return Some((out, &input[i + c.len_utf8()..])),
            c => out.push(c),
        }
    }

    None
}

/// Read a regex body up to the closing `/`. Escapes are kept as written,
/// except `\/`, which only guards the delimiter.
fn take_pattern(input: &str) -> Option<(String, &str)> {
    let mut out = String::new();
    let mut chars = input.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                let (_, escaped) = chars.next()?;
                if escaped != '/' {
                    out.push('\\');
                }
                out.push(escaped);
            }
            '/' => return Some((out, &input[i + 1..])),
            c => out.push(c),
        }
    }

    None
}

fn unquote(value: &str) -> String {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .to_string()
}
