//! Column-to-row regrouping.
//!
//! A column set is an object mapping a field name to the values of that
//! field, in row order. [`pivot`] zips the columns by position into an array
//! of row objects:
//!
//! ```text
//! {"id": [1, 2], "name": ["a", "b"]}  =>  [{"id": 1, "name": "a"}, {"id": 2, "name": "b"}]
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// How rows are counted when columns disagree on length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanOutPolicy {
    /// Run to the longest column; missing cells become `null`.
    #[default]
    Pad,
    /// Run to the shortest column.
    Truncate,
    /// Reject column sets whose lengths differ.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("columns have mismatched lengths ({})", describe(.lengths))]
pub struct FanOutMismatch {
    pub lengths: Vec<(String, usize)>,
}

fn describe(lengths: &[(String, usize)]) -> String {
    lengths
        .iter()
        .map(|(field, len)| format!("{field}={len}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Regroup a column set into rows.
///
/// Arrays are already row-oriented and come back unchanged, so pivoting is
/// idempotent. Anything that is neither an object nor an array has no
/// columns and yields an empty array.
pub fn pivot(value: &Value, policy: FanOutPolicy) -> Result<Value, FanOutMismatch> {
    match value {
        Value::Object(columns) => Ok(Value::Array(pivot_columns(columns, policy)?)),
        Value::Array(_) => Ok(value.clone()),
        _ => Ok(Value::Array(Vec::new())),
    }
}

fn pivot_columns(
    columns: &Map<String, Value>,
    policy: FanOutPolicy,
) -> Result<Vec<Value>, FanOutMismatch> {
    let mut cells: Vec<(&str, Vec<Value>)> = Vec::with_capacity(columns.len());
    for (field, column) in columns {
        let values = match column {
            Value::Array(items) => items.clone(),
            // A nested column set becomes a column of nested row objects.
            Value::Object(nested) => pivot_columns(nested, policy)?,
            Value::Null => Vec::new(),
            scalar => vec![scalar.clone()],
        };
        cells.push((field.as_str(), values));
    }

    let rows = row_count(&cells, policy)?;
    Ok((0..rows)
        .map(|row| {
            let mut object = Map::with_capacity(cells.len());
            for (field, values) in &cells {
                let cell = values.get(row).cloned().unwrap_or(Value::Null);
                object.insert((*field).to_string(), cell);
            }
            Value::Object(object)
        })
        .collect())
}

fn row_count(cells: &[(&str, Vec<Value>)], policy: FanOutPolicy) -> Result<usize, FanOutMismatch> {
    let mut lengths = cells.iter().map(|(_, values)| values.len());
    let Some(first) = lengths.next() else {
        return Ok(0);
    };
    let (min, max) = lengths.fold((first, first), |(lo, hi), len| (lo.min(len), hi.max(len)));
    match policy {
        FanOutPolicy::Pad => Ok(max),
        FanOutPolicy::Truncate => Ok(min),
        FanOutPolicy::Strict if min == max => Ok(max),
        FanOutPolicy::Strict => Err(FanOutMismatch {
            lengths: cells
                .iter()
                .map(|(field, values)| ((*field).to_string(), values.len()))
                .collect(),
        }),
    }
}
