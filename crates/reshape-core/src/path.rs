//! Dotted path language used to read and write values inside JSON documents.
//!
//! Read paths ([`Query`]) understand keys, array indices, the `#` fan-out /
//! length selector, `@modifier` segments and `|` chaining. Write paths
//! ([`WritePath`]) understand keys, indices and the `-1` append slot.
//!
//! The text-level helpers (`get_raw`, `get_text`, `set_raw`, ...) take and
//! return JSON text and trim the path they are given; the value-level
//! methods operate on parsed `serde_json::Value` trees and take paths as-is.

use crate::pivot::{FanOutPolicy, pivot};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// How far past the end of an array a write may pad with `null`.
pub const MAX_ARRAY_GAP: usize = 1024;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("path '{path}' is not writable: {reason}")]
    NotWritable { path: String, reason: &'static str },
    #[error("cannot write '{path}': found {found} where a container was expected")]
    TypeConflict { path: String, found: &'static str },
    #[error("invalid raw JSON fragment: {0}")]
    InvalidFragment(#[source] serde_json::Error),
    #[error("invalid JSON document: {0}")]
    InvalidDocument(#[source] serde_json::Error),
}

/// One lexed segment, before it is classified as a read or write segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RawSegment {
    Key(String),
    Hash,
    Modifier(String),
    Append,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    This,
    Group,
    Reverse,
}

impl Modifier {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "this" => Some(Self::This),
            "group" => Some(Self::Group),
            "reverse" => Some(Self::Reverse),
            _ => None,
        }
    }

    fn apply(self, value: &Value) -> Option<Value> {
        match self {
            Self::This => Some(value.clone()),
            // Pad never reports a mismatch.
            Self::Group => pivot(value, FanOutPolicy::Pad).ok(),
            Self::Reverse => Some(match value {
                Value::Array(items) => Value::Array(items.iter().rev().cloned().collect()),
                Value::Object(map) => Value::Object(
                    map.iter()
                        .rev()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                ),
                other => other.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySegment {
    Key(String),
    Hash,
    Modifier(Modifier),
    /// An `@name` that is not a known modifier. It matches nothing.
    UnknownModifier(String),
}

/// A parsed read path. Stages are separated by `|`; each stage runs against
/// the result of the previous one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    stages: Vec<Vec<QuerySegment>>,
}

impl Query {
    pub fn parse(text: &str) -> Self {
        if text.is_empty() {
            return Self { stages: Vec::new() };
        }
        let stages = split_pipes(text)
            .into_iter()
            .map(|part| {
                lex(part)
                    .into_iter()
                    .map(|raw| match raw {
                        RawSegment::Key(key) => QuerySegment::Key(key),
                        RawSegment::Append => QuerySegment::Key("-1".to_string()),
                        RawSegment::Hash => QuerySegment::Hash,
                        RawSegment::Modifier(name) => match Modifier::from_name(&name) {
                            Some(modifier) => QuerySegment::Modifier(modifier),
                            None => QuerySegment::UnknownModifier(name),
                        },
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        Self { stages }
    }

    /// An empty query matches nothing.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Look up the value addressed by this query. `None` means nothing
    /// matched, which callers treat as a soft miss rather than a failure.
    pub fn get(&self, doc: &Value) -> Option<Value> {
        let (first, rest) = self.stages.split_first()?;
        let mut current = select(doc, first)?;
        for stage in rest {
            current = select(&current, stage)?;
        }
        Some(current)
    }
}

fn select(value: &Value, segments: &[QuerySegment]) -> Option<Value> {
    let Some((first, rest)) = segments.split_first() else {
        return Some(value.clone());
    };
    match first {
        QuerySegment::Key(key) => select(child(value, key)?, rest),
        QuerySegment::Hash => {
            let items = value.as_array()?;
            if rest.is_empty() {
                return Some(Value::from(items.len()));
            }
            Some(Value::Array(
                items.iter().filter_map(|item| select(item, rest)).collect(),
            ))
        }
        QuerySegment::Modifier(modifier) => select(&modifier.apply(value)?, rest),
        QuerySegment::UnknownModifier(_) => None,
    }
}

fn child<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => items.get(key.parse::<usize>().ok()?),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WriteSegment {
    Key(String),
    Append,
}

/// A parsed write path. An empty path addresses the document root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct WritePath {
    segments: Vec<WriteSegment>,
}

impl WritePath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self, PathError> {
        Self::from_raw(text, lex_single(text)?)
    }

    pub(crate) fn from_raw(text: &str, raw: Vec<RawSegment>) -> Result<Self, PathError> {
        let mut segments = Vec::with_capacity(raw.len());
        for segment in raw {
            segments.push(match segment {
                RawSegment::Key(key) => WriteSegment::Key(key),
                RawSegment::Append => WriteSegment::Append,
                RawSegment::Hash => {
                    return Err(not_writable(text, "'#' selects, it cannot be written"));
                }
                RawSegment::Modifier(_) => {
                    return Err(not_writable(text, "modifiers cannot be written"));
                }
            });
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[WriteSegment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// True when `prefix` addresses this path or one of its ancestors.
    pub fn starts_with(&self, prefix: &WritePath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// Read the value stored at this path. Append slots never resolve.
    pub fn get<'a>(&self, doc: &'a Value) -> Option<&'a Value> {
        let mut current = doc;
        for segment in &self.segments {
            match segment {
                WriteSegment::Key(key) => current = child(current, key)?,
                WriteSegment::Append => return None,
            }
        }
        Some(current)
    }

    /// Write `value` at this path, creating missing objects and arrays on the
    /// way down. `null` slots are treated as missing: a numeric key creates an
    /// array, any other key an object.
    pub fn set(&self, doc: &mut Value, value: Value) -> Result<(), PathError> {
        let mut slot = doc;
        for segment in &self.segments {
            slot = match segment {
                WriteSegment::Key(key) => {
                    if slot.is_null() {
                        *slot = if key.parse::<usize>().is_ok() {
                            Value::Array(Vec::new())
                        } else {
                            Value::Object(Map::new())
                        };
                    }
                    match slot {
                        Value::Object(map) => map.entry(key.clone()).or_insert(Value::Null),
                        Value::Array(items) => {
                            let Ok(index) = key.parse::<usize>() else {
                                return Err(self.conflict("array"));
                            };
                            self.pad(items, index)?;
                            &mut items[index]
                        }
                        other => return Err(self.conflict(type_name(other))),
                    }
                }
                WriteSegment::Append => {
                    if slot.is_null() {
                        *slot = Value::Array(Vec::new());
                    }
                    match slot {
                        Value::Array(items) => {
                            items.push(Value::Null);
                            let last = items.len() - 1;
                            &mut items[last]
                        }
                        other => return Err(self.conflict(type_name(other))),
                    }
                }
            };
        }
        *slot = value;
        Ok(())
    }

    /// Remove the value at this path. Returns whether anything was removed.
    pub fn delete(&self, doc: &mut Value) -> Result<bool, PathError> {
        let Some((last, parents)) = self.segments.split_last() else {
            let removed = !doc.is_null();
            *doc = Value::Null;
            return Ok(removed);
        };
        let mut current = doc;
        for segment in parents {
            let next = match (segment, current) {
                (WriteSegment::Key(key), Value::Object(map)) => map.get_mut(key),
                (WriteSegment::Key(key), Value::Array(items)) => key
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| items.get_mut(index)),
                _ => None,
            };
            let Some(next) = next else {
                return Ok(false);
            };
            current = next;
        }
        match (last, current) {
            (WriteSegment::Key(key), Value::Object(map)) => {
                let before = map.len();
                map.retain(|k, _| k != key);
                Ok(map.len() != before)
            }
            (WriteSegment::Key(key), Value::Array(items)) => {
                match key.parse::<usize>() {
                    Ok(index) if index < items.len() => {
                        items.remove(index);
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            }
            (WriteSegment::Append, _) => Err(not_writable(
                &self.to_string(),
                "an append slot cannot be deleted",
            )),
            _ => Ok(false),
        }
    }

    /// Grow `items` so `index` is in bounds, up to [`MAX_ARRAY_GAP`] slots
    /// past the current end.
    fn pad(&self, items: &mut Vec<Value>, index: usize) -> Result<(), PathError> {
        let len = index
            .checked_add(1)
            .filter(|len| *len <= items.len().saturating_add(MAX_ARRAY_GAP))
            .ok_or_else(|| {
                not_writable(&self.to_string(), "index is too far past the end of the array")
            })?;
        if items.len() < len {
            items.resize(len, Value::Null);
        }
        Ok(())
    }

    fn conflict(&self, found: &'static str) -> PathError {
        PathError::TypeConflict {
            path: self.to_string(),
            found,
        }
    }
}

impl fmt::Display for WritePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            match segment {
                WriteSegment::Append => f.write_str("-1")?,
                WriteSegment::Key(key) => {
                    if key == "-1" || key == "#" || key.starts_with('@') {
                        f.write_str("\\")?;
                    }
                    for ch in key.chars() {
                        if matches!(ch, '.' | '|' | '\\') {
                            f.write_str("\\")?;
                        }
                        write!(f, "{ch}")?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn not_writable(path: &str, reason: &'static str) -> PathError {
    PathError::NotWritable {
        path: path.to_string(),
        reason,
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Split on unescaped `|`, keeping escapes for the segment lexer.
fn split_pipes(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, ch) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '|' => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Lex one pipe-free path into segments. A segment containing an escape is
/// always a plain key.
fn lex(text: &str) -> Vec<RawSegment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut literal = false;
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                literal = true;
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '.' => {
                segments.push(classify(std::mem::take(&mut current), literal));
                literal = false;
            }
            _ => current.push(ch),
        }
    }
    segments.push(classify(current, literal));
    segments
}

fn classify(text: String, literal: bool) -> RawSegment {
    if literal {
        return RawSegment::Key(text);
    }
    if text == "#" {
        return RawSegment::Hash;
    }
    if text == "-1" {
        return RawSegment::Append;
    }
    match text.strip_prefix('@') {
        Some(name) => RawSegment::Modifier(name.to_string()),
        None => RawSegment::Key(text),
    }
}

/// Lex a path that must not chain stages. Empty text is the root.
pub(crate) fn lex_single(text: &str) -> Result<Vec<RawSegment>, PathError> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    if split_pipes(text).len() > 1 {
        return Err(not_writable(text, "'|' chains queries, it cannot be written"));
    }
    Ok(lex(text))
}

/// Parse document text. Blank text is an empty document (`null`).
pub fn parse_document(text: &str) -> Result<Value, serde_json::Error> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text)
}

fn render_document(doc: &Value) -> String {
    if doc.is_null() {
        String::new()
    } else {
        doc.to_string()
    }
}

/// Literal JSON text at `path`, or the empty string when nothing matches.
pub fn get_raw(doc: &str, path: &str) -> Result<String, PathError> {
    let doc = parse_document(doc).map_err(PathError::InvalidDocument)?;
    Ok(Query::parse(path.trim())
        .get(&doc)
        .map(|value| value.to_string())
        .unwrap_or_default())
}

/// Text at `path`: a string match comes back unquoted, other values as JSON,
/// and `null` or no match as the empty string.
pub fn get_text(doc: &str, path: &str) -> Result<String, PathError> {
    let doc = parse_document(doc).map_err(PathError::InvalidDocument)?;
    Ok(Query::parse(path.trim())
        .get(&doc)
        .map(|value| text_of(&value))
        .unwrap_or_default())
}

pub(crate) fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Write a literal JSON fragment at `path` and return the new document text.
pub fn set_raw(doc: &str, path: &str, raw: &str) -> Result<String, PathError> {
    let value = serde_json::from_str(raw.trim()).map_err(PathError::InvalidFragment)?;
    set_value(doc, path, value)
}

/// Write `value` at `path` and return the new document text.
pub fn set_value(doc: &str, path: &str, value: Value) -> Result<String, PathError> {
    let mut doc = parse_document(doc).map_err(PathError::InvalidDocument)?;
    WritePath::parse(path.trim())?.set(&mut doc, value)?;
    Ok(render_document(&doc))
}

/// Remove the value at `path` and return the new document text.
pub fn delete(doc: &str, path: &str) -> Result<String, PathError> {
    let mut doc = parse_document(doc).map_err(PathError::InvalidDocument)?;
    WritePath::parse(path.trim())?.delete(&mut doc)?;
    Ok(render_document(&doc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query(doc: &Value, path: &str) -> Option<Value> {
        Query::parse(path).get(doc)
    }

    #[test]
    fn query_keys_and_indices() {
        let doc = json!({"a": {"b": [10, 20, {"c": "x"}]}});
        assert_eq!(query(&doc, "a.b.1"), Some(json!(20)));
        assert_eq!(query(&doc, "a.b.2.c"), Some(json!("x")));
        assert_eq!(query(&doc, "a.missing"), None);
        assert_eq!(query(&doc, "a.b.9"), None);
    }

    #[test]
    fn hash_counts_when_last_and_fans_out_otherwise() {
        let doc = json!({"people": [{"n": "a"}, {"m": 1}, {"n": "c"}]});
        assert_eq!(query(&doc, "people.#"), Some(json!(3)));
        assert_eq!(query(&doc, "people.#.n"), Some(json!(["a", "c"])));
        assert_eq!(query(&doc, "people.0.#"), None);
    }

    #[test]
    fn this_modifier_and_pipe_group() {
        let doc = json!([{"id": 1}, {"id": 2}]);
        assert_eq!(query(&doc, "@this"), Some(doc.clone()));
        assert_eq!(query(&doc, "@this.#.id"), Some(json!([1, 2])));

        let columns = json!({"cols": {"id": [1, 2], "v": ["a", "b"]}});
        assert_eq!(
            query(&columns, "cols|@group"),
            Some(json!([{"id": 1, "v": "a"}, {"id": 2, "v": "b"}]))
        );
        assert_eq!(query(&json!([3, 2, 1]), "@reverse"), Some(json!([1, 2, 3])));
    }

    #[test]
    fn unknown_modifier_matches_nothing() {
        let doc = json!({"a": {"b": 1}});
        assert_eq!(query(&doc, "a.@nope"), None);
        assert_eq!(query(&doc, "a|@nope.b"), None);
        assert_eq!(query(&doc, "a.b"), Some(json!(1)));
    }

    #[test]
    fn keys_keep_surrounding_spaces() {
        let doc = json!({" a ": 1, "a": 2});
        assert_eq!(query(&doc, " a "), Some(json!(1)));
        assert_eq!(get_raw(r#"{" a ":1,"a":2}"#, " a ").unwrap(), "2");
    }

    #[test]
    fn escaped_dots_stay_inside_one_key() {
        let doc = json!({"a.b": {"c": true}, "#": 5});
        assert_eq!(query(&doc, "a\\.b.c"), Some(json!(true)));
        assert_eq!(query(&doc, "\\#"), Some(json!(5)));
    }

    #[test]
    fn empty_query_matches_nothing() {
        assert_eq!(query(&json!({"a": 1}), ""), None);
    }

    #[test]
    fn set_vivifies_objects_and_arrays() {
        let mut doc = Value::Null;
        WritePath::parse("a.b").unwrap().set(&mut doc, json!(1)).unwrap();
        WritePath::parse("list.-1").unwrap().set(&mut doc, json!("x")).unwrap();
        WritePath::parse("list.-1").unwrap().set(&mut doc, json!("y")).unwrap();
        WritePath::parse("list.3").unwrap().set(&mut doc, json!("z")).unwrap();
        assert_eq!(doc, json!({"a": {"b": 1}, "list": ["x", "y", null, "z"]}));
    }

    #[test]
    fn numeric_key_on_missing_parent_creates_an_array() {
        let mut doc = Value::Null;
        WritePath::parse("items.0.id").unwrap().set(&mut doc, json!(1)).unwrap();
        WritePath::parse("items.2.id").unwrap().set(&mut doc, json!(3)).unwrap();
        WritePath::parse("meta.x").unwrap().set(&mut doc, json!(true)).unwrap();
        assert_eq!(
            doc,
            json!({"items": [{"id": 1}, null, {"id": 3}], "meta": {"x": true}})
        );
    }

    #[test]
    fn far_index_is_not_writable() {
        let mut doc = json!({"arr": [1]});
        for path in ["arr.18446744073709551615", "arr.10000000000", "fresh.5000"] {
            let err = WritePath::parse(path)
                .unwrap()
                .set(&mut doc, json!(2))
                .expect_err("far index must be rejected");
            assert!(matches!(err, PathError::NotWritable { .. }), "{path}: {err}");
        }
        let edge = format!("arr.{MAX_ARRAY_GAP}");
        WritePath::parse(&edge).unwrap().set(&mut doc, json!(2)).unwrap();
        assert_eq!(doc["arr"].as_array().map(Vec::len), Some(MAX_ARRAY_GAP + 1));
    }

    #[test]
    fn set_below_scalar_is_a_type_conflict() {
        let mut doc = json!({"a": 5});
        let err = WritePath::parse("a.b")
            .unwrap()
            .set(&mut doc, json!(1))
            .expect_err("scalar parent must be rejected");
        assert!(matches!(err, PathError::TypeConflict { found: "number", .. }));
        assert_eq!(doc, json!({"a": 5}));
    }

    #[test]
    fn empty_write_path_replaces_root() {
        let mut doc = json!({"old": true});
        WritePath::root().set(&mut doc, json!([1])).unwrap();
        assert_eq!(doc, json!([1]));
    }

    #[test]
    fn write_path_rejects_selectors() {
        assert!(matches!(
            WritePath::parse("a.#.b"),
            Err(PathError::NotWritable { .. })
        ));
        assert!(matches!(
            WritePath::parse("a|@group"),
            Err(PathError::NotWritable { .. })
        ));
    }

    #[test]
    fn write_path_display_round_trips_escapes() {
        let path = WritePath::parse("a\\.b.-1.\\#").unwrap();
        assert_eq!(path.to_string(), "a\\.b.-1.\\#");
        assert_eq!(WritePath::parse(&path.to_string()).unwrap(), path);
    }

    #[test]
    fn raw_helpers_keep_key_order_and_literals() {
        let doc = r#"{"z":1,"a":{"n":1.50}}"#;
        assert_eq!(get_raw(doc, "a").unwrap(), r#"{"n":1.50}"#);
        assert_eq!(get_raw(doc, "nothing").unwrap(), "");
        assert_eq!(get_raw(r#"{"name":"Ada"}"#, "name").unwrap(), r#""Ada""#);
        assert_eq!(
            set_raw(doc, "m.k", r#"[true]"#).unwrap(),
            r#"{"z":1,"a":{"n":1.50},"m":{"k":[true]}}"#
        );
        assert_eq!(delete(doc, "z").unwrap(), r#"{"a":{"n":1.50}}"#);
        assert_eq!(delete(doc, "missing.deep").unwrap(), doc);
    }

    #[test]
    fn text_lookup_unquotes_strings_only() {
        let doc = r#"{"name":"Ada","age":36,"tags":["x"],"none":null}"#;
        assert_eq!(get_text(doc, " name ").unwrap(), "Ada");
        assert_eq!(get_text(doc, "age").unwrap(), "36");
        assert_eq!(get_text(doc, "tags").unwrap(), r#"["x"]"#);
        assert_eq!(get_text(doc, "none").unwrap(), "");
        assert_eq!(get_text(doc, "missing").unwrap(), "");
    }

    #[test]
    fn raw_helpers_report_bad_json() {
        assert!(matches!(
            set_raw("{}", "a", "{oops"),
            Err(PathError::InvalidFragment(_))
        ));
        assert!(matches!(
            get_raw("[1,", "0"),
            Err(PathError::InvalidDocument(_))
        ));
        assert_eq!(set_raw("", "a", "1").unwrap(), r#"{"a":1}"#);
    }
}
