//! Mapping rules: `[{"src": "...", "dst": "..."}, ...]`.

use crate::error::ReshapeError;
use crate::path::{self, PathError, RawSegment, WritePath};
use serde_json::Value;

/// One `{src, dst}` mapping. Missing or non-textual fields are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathRule {
    pub src: String,
    pub dst: String,
}

impl PathRule {
    pub fn new(src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
        }
    }

    fn from_entry(entry: &Value) -> Self {
        Self {
            src: field_text(entry, "src"),
            dst: field_text(entry, "dst"),
        }
    }
}

fn field_text(entry: &Value, field: &str) -> String {
    match entry.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(v @ (Value::Number(_) | Value::Bool(_))) => v.to_string(),
        _ => String::new(),
    }
}

/// Ordered list of rules. Order decides write order into the output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<PathRule>,
}

impl RuleSet {
    /// Parse the rule list argument. Only a rule list that is not JSON, or
    /// not an array, is an error; malformed entries degrade to empty rules.
    pub fn parse(text: &str) -> Result<Self, ReshapeError> {
        let value: Value = serde_json::from_str(text.trim()).map_err(ReshapeError::InvalidRules)?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, ReshapeError> {
        let entries = value.as_array().ok_or(ReshapeError::RulesNotArray {
            found: path::type_name(value),
        })?;
        Ok(Self {
            rules: entries.iter().map(PathRule::from_entry).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PathRule> {
        self.rules.iter()
    }
}

impl FromIterator<PathRule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = PathRule>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a PathRule;
    type IntoIter = std::slice::Iter<'a, PathRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

/// A classified `dst`.
///
/// Without an array marker the rule assigns straight to `target`. With a
/// marker (`items.-1.id`) the rule appends a column: `target` is the column
/// slot (`items.id`) and `array_key` is the container (`items`) that the
/// regroup pass later turns into rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub target: WritePath,
    pub array_key: Option<WritePath>,
}

impl Destination {
    pub fn parse(dst: &str) -> Result<Self, PathError> {
        let raw = path::lex_single(dst)?;
        let markers: Vec<usize> = raw
            .iter()
            .enumerate()
            .filter(|(_, segment)| **segment == RawSegment::Append)
            .map(|(i, _)| i)
            .collect();

        let &[marker] = markers.as_slice() else {
            if markers.is_empty() {
                return Ok(Self {
                    target: WritePath::from_raw(dst, raw)?,
                    array_key: None,
                });
            }
            return Err(PathError::NotWritable {
                path: dst.to_string(),
                reason: "only one array marker is allowed",
            });
        };

        let mut parent = raw[..marker].to_vec();
        // `items.#.-1` means the same as `items.-1`.
        while parent.last() == Some(&RawSegment::Hash) {
            parent.pop();
        }
        let mut column = parent.clone();
        column.extend_from_slice(&raw[marker + 1..]);

        Ok(Self {
            target: WritePath::from_raw(dst, column)?,
            array_key: Some(WritePath::from_raw(dst, parent)?),
        })
    }
}
