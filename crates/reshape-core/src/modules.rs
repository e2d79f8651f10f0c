//! Host modules exposed to scripts.
//!
//! `gsjson.*` functions are stateless and take the document as their first
//! argument. `storage.*` functions act on the document held in
//! [`State::storage`](crate::runtime::State) and return its new text.

use crate::path;
use crate::runtime::{Context, EvalError, EvalResult, Operator, Operators, evaluate_args};
use serde_json::Value;

pub(crate) fn install(operators: &mut Operators) {
    let entries: [(&str, Operator); 12] = [
        ("gsjson.get", gsjson_get),
        ("gsjson.set", gsjson_set),
        ("gsjson.set_raw", gsjson_set_raw),
        ("gsjson.get_set", gsjson_get_set),
        ("gsjson.delete", gsjson_delete),
        ("storage.get", storage_get),
        ("storage.set", storage_set),
        ("storage.set_raw", storage_set_raw),
        ("storage.get_set", storage_get_set),
        ("storage.delete", storage_delete),
        ("storage.document", storage_document),
        ("storage.memory", storage_memory),
    ];
    for (name, op) in entries {
        operators.register(name, op);
    }
}

/// Evaluate the arguments of `op` and check that exactly `expected` were given.
fn arguments(
    op: &str,
    expected: usize,
    args: &[Value],
    ctx: &mut Context,
) -> Result<Vec<Value>, EvalError> {
    if args.len() != expected {
        return Err(EvalError::WrongNumArguments {
            op: op.to_string(),
            expected,
            found: args.len(),
        });
    }
    evaluate_args(args, ctx)
}

/// String coercion for module arguments. Numbers and booleans render as
/// text, arrays and objects as JSON; `null` is rejected.
fn string_arg(op: &str, values: &[Value], index: usize) -> Result<String, EvalError> {
    match &values[index] {
        Value::String(s) => Ok(s.clone()),
        Value::Null => Err(EvalError::InvalidArgumentType {
            name: format!("{op}.arg{}", index + 1),
            expected: "string",
            found: "null",
        }),
        other => Ok(other.to_string()),
    }
}

fn gsjson_get(args: &[Value], ctx: &mut Context) -> EvalResult {
    let values = arguments("gsjson.get", 2, args, ctx)?;
    let doc = string_arg("gsjson.get", &values, 0)?;
    let path = string_arg("gsjson.get", &values, 1)?;
    Ok(Value::String(path::get_text(&doc, &path)?))
}

fn gsjson_set(args: &[Value], ctx: &mut Context) -> EvalResult {
    let mut values = arguments("gsjson.set", 3, args, ctx)?;
    let doc = string_arg("gsjson.set", &values, 0)?;
    let path = string_arg("gsjson.set", &values, 1)?;
    let value = values.swap_remove(2);
    Ok(Value::String(path::set_value(&doc, &path, value)?))
}

fn gsjson_set_raw(args: &[Value], ctx: &mut Context) -> EvalResult {
    let values = arguments("gsjson.set_raw", 3, args, ctx)?;
    let doc = string_arg("gsjson.set_raw", &values, 0)?;
    let path = string_arg("gsjson.set_raw", &values, 1)?;
    let raw = string_arg("gsjson.set_raw", &values, 2)?;
    Ok(Value::String(path::set_raw(&doc, &path, &raw)?))
}

fn gsjson_get_set(args: &[Value], ctx: &mut Context) -> EvalResult {
    let values = arguments("gsjson.get_set", 2, args, ctx)?;
    let doc = string_arg("gsjson.get_set", &values, 0)?;
    let rules = string_arg("gsjson.get_set", &values, 1)?;
    Ok(Value::String(ctx.reshaper.get_set(&doc, &rules)?))
}

fn gsjson_delete(args: &[Value], ctx: &mut Context) -> EvalResult {
    let values = arguments("gsjson.delete", 2, args, ctx)?;
    let doc = string_arg("gsjson.delete", &values, 0)?;
    let path = string_arg("gsjson.delete", &values, 1)?;
    Ok(Value::String(path::delete(&doc, &path)?))
}

fn storage_get(args: &[Value], ctx: &mut Context) -> EvalResult {
    let values = arguments("storage.get", 1, args, ctx)?;
    let path = string_arg("storage.get", &values, 0)?;
    Ok(Value::String(ctx.state.storage.get(&path)))
}

fn storage_set(args: &[Value], ctx: &mut Context) -> EvalResult {
    let mut values = arguments("storage.set", 2, args, ctx)?;
    let path = string_arg("storage.set", &values, 0)?;
    let value = values.swap_remove(1);
    Ok(Value::String(ctx.state.storage.set(&path, value)?.document()))
}

fn storage_set_raw(args: &[Value], ctx: &mut Context) -> EvalResult {
    let values = arguments("storage.set_raw", 2, args, ctx)?;
    let path = string_arg("storage.set_raw", &values, 0)?;
    let raw = string_arg("storage.set_raw", &values, 1)?;
    Ok(Value::String(ctx.state.storage.set_raw(&path, &raw)?.document()))
}

fn storage_get_set(args: &[Value], ctx: &mut Context) -> EvalResult {
    let values = arguments("storage.get_set", 1, args, ctx)?;
    let rules = string_arg("storage.get_set", &values, 0)?;
    let storage = ctx.state.storage.get_set(ctx.reshaper, &rules)?;
    Ok(Value::String(storage.document()))
}

fn storage_delete(args: &[Value], ctx: &mut Context) -> EvalResult {
    let values = arguments("storage.delete", 1, args, ctx)?;
    let path = string_arg("storage.delete", &values, 0)?;
    Ok(Value::String(ctx.state.storage.delete(&path)?.document()))
}

fn storage_document(args: &[Value], ctx: &mut Context) -> EvalResult {
    arguments("storage.document", 0, args, ctx)?;
    Ok(Value::String(ctx.state.storage.document()))
}

fn storage_memory(args: &[Value], ctx: &mut Context) -> EvalResult {
    arguments("storage.memory", 0, args, ctx)?;
    Ok(Value::Object(ctx.state.storage.memory().clone()))
}
