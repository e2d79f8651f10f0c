//! GetSet: project a document through `{src, dst}` rules.
//!
//! Two passes run per call:
//!
//! 1. Projection, in rule order: the value at `src` is written at `dst`.
//!    A `dst` carrying the array marker (`items.-1.id`) writes a column under
//!    its array key (`items.id`) instead of a row slot.
//! 2. Regroup, once per distinct array key in first-seen order: the column
//!    set under the key is pivoted into an array of row objects.
//!
//! Every call owns its buffers; a `Reshaper` can be shared across threads.

use crate::error::ReshapeError;
use crate::observer::{ExecutionObserver, ExecutionRecord};
use crate::path::{self, PathError, Query, WritePath};
use crate::pivot::{FanOutPolicy, pivot};
use crate::rules::{Destination, PathRule, RuleSet};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReshapeOptions {
    pub fan_out: FanOutPolicy,
    pub pretty: bool,
}

#[derive(Default)]
struct CallStats {
    rules: usize,
    array_keys: usize,
}

#[derive(Clone, Default)]
pub struct Reshaper {
    options: ReshapeOptions,
    observer: Option<Arc<dyn ExecutionObserver>>,
}

impl fmt::Debug for Reshaper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reshaper")
            .field("options", &self.options)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl Reshaper {
    pub fn new(options: ReshapeOptions) -> Self {
        Self {
            options,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn options(&self) -> &ReshapeOptions {
        &self.options
    }

    /// Text in, text out. Returns the empty string when no rule wrote
    /// anything (an empty rule list).
    pub fn get_set(&self, document: &str, rules: &str) -> Result<String, ReshapeError> {
        self.observe("get_set", |stats| {
            let rules = RuleSet::parse(rules)?;
            stats.rules = rules.len();
            let document = parse_input(document)?;
            match self.transform(&document, &rules, stats)? {
                Some(output) => self.render(&output),
                None => Ok(String::new()),
            }
        })
    }

    /// Structured variant of [`Reshaper::get_set`]. `None` means no rule
    /// wrote anything.
    pub fn apply(&self, document: &Value, rules: &RuleSet) -> Result<Option<Value>, ReshapeError> {
        self.observe("apply", |stats| {
            stats.rules = rules.len();
            self.transform(document, rules, stats)
        })
    }

    fn observe<T>(
        &self,
        operation: &'static str,
        call: impl FnOnce(&mut CallStats) -> Result<T, ReshapeError>,
    ) -> Result<T, ReshapeError> {
        let started = Instant::now();
        let mut stats = CallStats::default();
        let result = call(&mut stats);
        if let Some(observer) = &self.observer {
            observer.on_complete(&ExecutionRecord {
                operation,
                rules: stats.rules,
                array_keys: stats.array_keys,
                elapsed: started.elapsed(),
                error: result.as_ref().err().map(ToString::to_string),
            });
        }
        result
    }

    fn transform(
        &self,
        document: &Value,
        rules: &RuleSet,
        stats: &mut CallStats,
    ) -> Result<Option<Value>, ReshapeError> {
        let mut output: Option<Value> = None;
        let mut array_keys: Vec<WritePath> = Vec::new();

        for (index, rule) in rules.iter().enumerate() {
            let fail = |source: PathError| rule_error(index, rule, source);
            let query = Query::parse(&rule.src);
            let dest = Destination::parse(&rule.dst).map_err(fail)?;

            if let Some(key) = dest.array_key {
                if !array_keys.contains(&key) {
                    array_keys.push(key);
                }
            }

            let fragment = query.get(document);
            debug!(
                index,
                src = %rule.src,
                dst = %dest.target,
                matched = fragment.is_some(),
                "projecting rule"
            );
            let buffer = output.get_or_insert(Value::Null);
            dest.target
                .set(buffer, fragment.unwrap_or(Value::Null))
                .map_err(fail)?;
        }

        check_disjoint(&array_keys)?;
        stats.array_keys = array_keys.len();

        if let Some(buffer) = output.as_mut() {
            for key in &array_keys {
                regroup(buffer, key, self.options.fan_out)?;
            }
        }
        Ok(output)
    }

    fn render(&self, output: &Value) -> Result<String, ReshapeError> {
        let text = if self.options.pretty {
            serde_json::to_string_pretty(output)
        } else {
            serde_json::to_string(output)
        };
        text.map_err(ReshapeError::Render)
    }
}

/// GetSet with default options and no observer.
pub fn get_set(document: &str, rules: &str) -> Result<String, ReshapeError> {
    Reshaper::default().get_set(document, rules)
}

pub(crate) fn parse_input(document: &str) -> Result<Value, ReshapeError> {
    path::parse_document(document).map_err(ReshapeError::InvalidDocument)
}

fn rule_error(index: usize, rule: &PathRule, source: PathError) -> ReshapeError {
    ReshapeError::Rule {
        index,
        src: rule.src.clone(),
        dst: rule.dst.clone(),
        source,
    }
}

/// Pivot the columns under `key` into rows. A key that a later rule wrote
/// over (so it no longer resolves) is left alone.
fn regroup(buffer: &mut Value, key: &WritePath, policy: FanOutPolicy) -> Result<(), ReshapeError> {
    let Some(columns) = key.get(buffer) else {
        debug!(key = %key, "array key no longer present, skipping regroup");
        return Ok(());
    };
    let rows = pivot(columns, policy).map_err(|source| ReshapeError::Regroup {
        key: key.to_string(),
        source,
    })?;
    debug!(key = %key, rows = rows.as_array().map_or(0, Vec::len), "regrouped columns");
    key.set(buffer, rows)
        .map_err(|source| ReshapeError::RegroupWrite {
            key: key.to_string(),
            source,
        })
}

/// Array keys must not nest: regrouping the outer key would consume the
/// inner key's columns.
fn check_disjoint(keys: &[WritePath]) -> Result<(), ReshapeError> {
    for (i, outer) in keys.iter().enumerate() {
        for inner in &keys[i + 1..] {
            let (outer, inner) = if inner.starts_with(outer) {
                (outer, inner)
            } else if outer.starts_with(inner) {
                (inner, outer)
            } else {
                continue;
            };
            return Err(ReshapeError::OverlappingArrayKeys {
                outer: outer.to_string(),
                inner: inner.to_string(),
            });
        }
    }
    Ok(())
}
