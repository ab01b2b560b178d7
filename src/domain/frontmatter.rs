//! Permissive frontmatter codec.
//!
//! An item file may start with a header block:
//!
//! ```text
//! ---
//! type: email
//! priority: High
//! ---
//! body text...
//! ```
//!
//! Every header line containing `:` is split on the first colon; other lines are
//! ignored. Without a closing `---` the whole file is body. Keys keep their order and
//! unknown keys survive a decode/encode cycle untouched.

use std::fmt;

use chrono::NaiveDateTime;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::clock::parse_timestamp;
use crate::domain::priority::Priority;

const DELIMITER: &str = "---";

/// Ordered string-to-string header mapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frontmatter {
    entries: Vec<(String, String)>,
}

impl Frontmatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set a key; an existing key keeps its position
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Set a key only when it is absent
    pub fn set_default(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if !self.contains_key(&key) {
            self.entries.push((key, value.into()));
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `priority` key, `Normal` when absent or unrecognised
    pub fn priority(&self) -> Priority {
        self.priority_opt().unwrap_or_default()
    }

    /// `priority` key if present and recognised
    pub fn priority_opt(&self) -> Option<Priority> {
        self.get("priority").and_then(|p| p.parse().ok())
    }

    /// A timestamp-valued key, `None` when absent or unparseable
    pub fn timestamp(&self, key: &str) -> Option<NaiveDateTime> {
        self.get(key).and_then(parse_timestamp)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Frontmatter {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fm = Frontmatter::new();
        for (k, v) in iter {
            fm.set(k, v);
        }
        fm
    }
}

impl Serialize for Frontmatter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Frontmatter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FrontmatterVisitor;

        impl<'de> Visitor<'de> for FrontmatterVisitor {
            type Value = Frontmatter;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of header keys to scalar values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut fm = Frontmatter::new();
                while let Some((key, value)) = access.next_entry::<String, serde_json::Value>()? {
                    let value = match value {
                        serde_json::Value::String(s) => s,
                        serde_json::Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    fm.set(key, value);
                }
                Ok(fm)
            }
        }

        deserializer.deserialize_map(FrontmatterVisitor)
    }
}

fn is_delimiter(line: &str) -> bool {
    line.trim_end() == DELIMITER
}

/// Split a file into header and body
pub fn decode(text: &str) -> (Frontmatter, String) {
    let mut lines = text.split_inclusive('\n');

    match lines.next() {
        Some(first) if is_delimiter(first) => {}
        _ => return (Frontmatter::new(), text.to_string()),
    }

    let mut fm = Frontmatter::new();
    let mut consumed = text.split_inclusive('\n').next().map(str::len).unwrap_or(0);
    for line in lines {
        consumed += line.len();
        if is_delimiter(line) {
            return (fm, text[consumed..].to_string());
        }
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim();
            if !key.is_empty() {
                fm.set(key, value.trim());
            }
        }
    }

    // No closing delimiter: the header was never a header
    (Frontmatter::new(), text.to_string())
}

/// Render header and body back into file text
///
/// `decode(encode(fm, body))` returns `fm` unchanged only when every key is
/// non-empty, has no `:` and no surrounding whitespace, and every value is a single
/// line without leading or trailing whitespace. Outside that domain the header is
/// normalized: newlines inside values become spaces, values come back trimmed,
/// and a key containing `:` is split at its first colon.
pub fn encode(fm: &Frontmatter, body: &str) -> String {
    let body_looks_like_header = body.split_inclusive('\n').next().is_some_and(is_delimiter);
    if fm.is_empty() && !body_looks_like_header {
        return body.to_string();
    }

    let mut out = String::with_capacity(body.len() + fm.len() * 24 + 8);
    out.push_str(DELIMITER);
    out.push('\n');
    for (key, value) in fm.iter() {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(&value.replace(['\r', '\n'], " "));
        out.push('\n');
    }
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(body);
    out
}
