//! JSON expression runtime hosting the reshape modules.
//!
//! An array whose first element names a registered operator is a call:
//! `["gsjson.get_set", ["var", "doc"], ["var", "rules"]]`. Other arrays and
//! objects evaluate element-wise; scalars evaluate to themselves.

use crate::error::ReshapeError;
use crate::getset::Reshaper;
use crate::modules;
use crate::path::{PathError, Query, WritePath};
use crate::storage::Storage;
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

pub type EvalResult = Result<Value, EvalError>;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("{op}: wrong number of arguments (expected {expected}, found {found})")]
    WrongNumArguments {
        op: String,
        expected: usize,
        found: usize,
    },
    #[error("invalid type for argument '{name}': expected {expected}, found {found}")]
    InvalidArgumentType {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error(transparent)]
    Reshape(#[from] ReshapeError),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("{0}")]
    Message(String),
}

impl EvalError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::WrongNumArguments { .. } | Self::InvalidArgumentType { .. } => "RESHAPE_E_ARGS",
            Self::Reshape(err) => err.code(),
            Self::Path(_) => "RESHAPE_E_PATH",
            Self::Message(_) => "RESHAPE_E_EVAL",
        }
    }
}

/// Script-visible state: named variables and the storage object.
#[derive(Debug, Clone, Default)]
pub struct State {
    pub vars: Map<String, Value>,
    pub storage: Storage,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variables taken from a JSON object; other values give empty state.
    pub fn from_vars(vars: Value) -> Self {
        let vars = match vars {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            vars,
            storage: Storage::new(),
        }
    }
}

pub struct Context<'a> {
    pub state: &'a mut State,
    pub operators: &'a Operators,
    pub reshaper: &'a Reshaper,
}

pub type Operator = fn(args: &[Value], ctx: &mut Context) -> EvalResult;

pub struct Operators {
    ops: HashMap<String, Operator>,
}

impl Operators {
    /// Core operators plus the `gsjson.*` and `storage.*` modules.
    pub fn new() -> Self {
        let mut ops: HashMap<String, Operator> = HashMap::new();
        ops.insert("var".into(), op_var as Operator);
        ops.insert("set".into(), op_set as Operator);
        ops.insert("do".into(), op_do as Operator);
        ops.insert("log".into(), op_log as Operator);
        let mut operators = Self { ops };
        modules::install(&mut operators);
        operators
    }

    pub fn get(&self, name: &str) -> Option<Operator> {
        self.ops.get(name).copied()
    }

    pub fn register(&mut self, name: impl Into<String>, operator: Operator) -> Option<Operator> {
        self.ops.insert(name.into(), operator)
    }

    /// Registered operator names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.ops.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for Operators {
    fn default() -> Self {
        Self::new()
    }
}

pub fn evaluate(node: &Value, ctx: &mut Context) -> EvalResult {
    match node {
        Value::Array(arr) => {
            if arr.is_empty() {
                return Ok(Value::Array(vec![]));
            }
            if let Some(op_name) = arr.first().and_then(|v| v.as_str()) {
                if let Some(op) = ctx.operators.get(op_name) {
                    return op(&arr[1..], ctx);
                }
            }
            let mut out = Vec::with_capacity(arr.len());
            for item in arr {
                out.push(evaluate(item, ctx)?);
            }
            Ok(Value::Array(out))
        }
        Value::Object(obj) => {
            let mut out = Map::new();
            for (k, v) in obj {
                out.insert(k.clone(), evaluate(v, ctx)?);
            }
            Ok(Value::Object(out))
        }
        _ => Ok(node.clone()),
    }
}

/// Evaluate every argument, left to right.
pub fn evaluate_args(args: &[Value], ctx: &mut Context) -> Result<Vec<Value>, EvalError> {
    args.iter().map(|arg| evaluate(arg, ctx)).collect()
}

fn require_arg<'a>(args: &'a [Value], index: usize, op: &str) -> Result<&'a Value, EvalError> {
    args.get(index)
        .ok_or_else(|| EvalError::new(format!("{op} requires argument {index}")))
}

fn op_var(args: &[Value], ctx: &mut Context) -> EvalResult {
    let raw = evaluate(require_arg(args, 0, "var")?, ctx)?;
    let Some(path) = raw.as_str() else {
        return Ok(Value::Null);
    };
    let vars = Value::Object(ctx.state.vars.clone());
    Ok(Query::parse(path).get(&vars).unwrap_or(Value::Null))
}

fn op_set(args: &[Value], ctx: &mut Context) -> EvalResult {
    let path_val = evaluate(require_arg(args, 0, "set")?, ctx)?;
    let value = evaluate(require_arg(args, 1, "set")?, ctx)?;
    let Some(path) = path_val.as_str() else {
        return Err(EvalError::new("set path must evaluate to string"));
    };
    let path = WritePath::parse(path)?;
    if path.is_root() {
        return Err(EvalError::new("set path must not be empty"));
    }
    let mut vars = Value::Object(std::mem::take(&mut ctx.state.vars));
    let written = path.set(&mut vars, value.clone());
    if let Value::Object(map) = vars {
        ctx.state.vars = map;
    }
    written?;
    Ok(value)
}

fn op_do(args: &[Value], ctx: &mut Context) -> EvalResult {
    let mut last = Value::Null;
    for arg in args {
        last = evaluate(arg, ctx)?;
    }
    Ok(last)
}

fn op_log(args: &[Value], ctx: &mut Context) -> EvalResult {
    let out = Value::Array(evaluate_args(args, ctx)?);
    tracing::info!(target: "reshape::script", values = %out, "log");
    Ok(out)
}
