//! Built-in query directives: `where`, `orderBy`, `limit`, `offset`,
//! `slice`, `map` and `select`.
//!
//! Directives that work on collections leave non-array values untouched.

use super::{
    eval::{QueryOperator, QueryOperatorTable},
    filter::compare_values,
    Mapper, QueryArg, QueryContext, WhereClause,
};
use crate::{
    access,
    error::{StoreError, StoreResult},
    Path,
};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::sync::Arc;

pub(crate) fn builtin_query_operators() -> QueryOperatorTable {
    let mut table = QueryOperatorTable::new();
    let mut add = |name: &str, op: QueryOperator| {
        table.insert(name.to_string(), op);
    };
    add("where", Arc::new(op_where));
    add("orderBy", Arc::new(op_order_by));
    add("limit", Arc::new(op_limit));
    add("offset", Arc::new(op_offset));
    add("slice", Arc::new(op_slice));
    add("map", Arc::new(op_map));
    add("select", Arc::new(op_select));
    table
}

fn op_where(arg: &QueryArg, input: Value, _ctx: &mut QueryContext<'_>) -> StoreResult<Value> {
    let keep: Box<dyn Fn(&Value) -> bool + '_> = match arg {
        QueryArg::Predicate(p) => Box::new(move |item: &Value| p(item)),
        QueryArg::Where(clause) => Box::new(move |item: &Value| clause.matches(item)),
        QueryArg::Value(descriptor) => {
            let clause = WhereClause::from_json(descriptor.clone())?;
            Box::new(move |item: &Value| clause.matches(item))
        }
        _ => {
            return Err(StoreError::invalid_query(
                "where",
                "expected a descriptor or a predicate",
            ))
        }
    };
    Ok(match input {
        Value::Array(items) => Value::Array(items.into_iter().filter(|item| keep(item)).collect()),
        other => other,
    })
}

enum SortKey {
    Field(Path),
    Selector(Mapper),
}

impl SortKey {
    fn extract(&self, item: &Value) -> Value {
        match self {
            SortKey::Field(path) => access::get(item, path).cloned().unwrap_or(Value::Null),
            SortKey::Selector(f) => f(item),
        }
    }
}

fn direction(raw: &Value) -> StoreResult<bool> {
    let descending = match raw {
        Value::String(s) if s.eq_ignore_ascii_case("asc") => false,
        Value::String(s) if s.eq_ignore_ascii_case("desc") => true,
        Value::Number(n) if n.as_i64() == Some(1) => false,
        Value::Number(n) if n.as_i64() == Some(-1) => true,
        other => {
            return Err(StoreError::invalid_query(
                "orderBy",
                format!("unknown direction {other}"),
            ))
        }
    };
    Ok(descending)
}

fn sort_keys(raw: &Value, out: &mut Vec<(SortKey, bool)>) -> StoreResult<()> {
    match raw {
        Value::String(field) => out.push((SortKey::Field(Path::parse(field)), false)),
        Value::Object(fields) => {
            for (field, dir) in fields {
                out.push((SortKey::Field(Path::parse(field)), direction(dir)?));
            }
        }
        Value::Array(items) => {
            for item in items {
                sort_keys(item, out)?;
            }
        }
        other => {
            return Err(StoreError::invalid_query(
                "orderBy",
                format!("expected a field, a field map or a list of them, got {other}"),
            ))
        }
    }
    Ok(())
}

fn op_order_by(arg: &QueryArg, input: Value, _ctx: &mut QueryContext<'_>) -> StoreResult<Value> {
    let Value::Array(mut items) = input else {
        return Ok(input);
    };
    match arg {
        QueryArg::Comparator(cmp) => items.sort_by(|a, b| cmp(a, b)),
        QueryArg::Mapper(selector) => {
            let key = SortKey::Selector(Arc::clone(selector));
            items.sort_by(|a, b| compare_values(&key.extract(a), &key.extract(b)))
        }
        QueryArg::Value(raw) => {
            let mut keys = Vec::new();
            sort_keys(raw, &mut keys)?;
            items.sort_by(|a, b| {
                keys.iter()
                    .map(|(key, desc)| {
                        let ord = compare_values(&key.extract(a), &key.extract(b));
                        if *desc {
                            ord.reverse()
                        } else {
                            ord
                        }
                    })
                    .find(|o| o.is_ne())
                    .unwrap_or(Ordering::Equal)
            });
        }
        _ => {
            return Err(StoreError::invalid_query(
                "orderBy",
                "expected a field spec, a selector or a comparator",
            ))
        }
    }
    Ok(Value::Array(items))
}

fn count_arg(operator: &str, arg: &QueryArg) -> StoreResult<usize> {
    arg.as_value()
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .ok_or_else(|| StoreError::invalid_query(operator, "expected a non-negative integer"))
}

fn op_limit(arg: &QueryArg, input: Value, _ctx: &mut QueryContext<'_>) -> StoreResult<Value> {
    let n = count_arg("limit", arg)?;
    Ok(match input {
        Value::Array(mut items) => {
            items.truncate(n);
            Value::Array(items)
        }
        other => other,
    })
}

fn op_offset(arg: &QueryArg, input: Value, _ctx: &mut QueryContext<'_>) -> StoreResult<Value> {
    let n = count_arg("offset", arg)?;
    Ok(match input {
        Value::Array(items) => Value::Array(items.into_iter().skip(n).collect()),
        other => other,
    })
}

/// Resolve a possibly negative bound against `len`.
fn bound(raw: Option<&Value>, len: usize, default: usize) -> StoreResult<usize> {
    let Some(raw) = raw.filter(|v| !v.is_null()) else {
        return Ok(default);
    };
    let n = raw
        .as_i64()
        .ok_or_else(|| StoreError::invalid_query("slice", "bounds must be integers"))?;
    let len = len as i64;
    let resolved = if n < 0 { (len + n).max(0) } else { n.min(len) };
    Ok(resolved as usize)
}

fn op_slice(arg: &QueryArg, input: Value, _ctx: &mut QueryContext<'_>) -> StoreResult<Value> {
    let Value::Array(items) = input else {
        return Ok(input);
    };
    let (start, end) = match arg.as_value() {
        Some(Value::Array(bounds)) => (bounds.first(), bounds.get(1)),
        Some(Value::Object(bounds)) => (bounds.get("start"), bounds.get("end")),
        Some(n @ Value::Number(_)) => (Some(n), None),
        _ => {
            return Err(StoreError::invalid_query(
                "slice",
                "expected [start, end], {start, end} or a start index",
            ))
        }
    };
    let len = items.len();
    let start = bound(start, len, 0)?;
    let end = bound(end, len, len)?;
    if start >= end {
        return Ok(Value::Array(Vec::new()));
    }
    Ok(Value::Array(items[start..end].to_vec()))
}

fn op_map(arg: &QueryArg, input: Value, _ctx: &mut QueryContext<'_>) -> StoreResult<Value> {
    let map: Box<dyn Fn(&Value) -> Value + '_> = match arg {
        QueryArg::Mapper(f) => Box::new(move |item: &Value| f(item)),
        QueryArg::Value(Value::String(field)) => {
            let path = Path::parse(field);
            Box::new(move |item: &Value| access::get(item, &path).cloned().unwrap_or(Value::Null))
        }
        _ => {
            return Err(StoreError::invalid_query(
                "map",
                "expected a mapper or a field path",
            ))
        }
    };
    Ok(match input {
        Value::Array(items) => Value::Array(items.iter().map(|item| map(item)).collect()),
        other => map(&other),
    })
}

fn op_select(arg: &QueryArg, input: Value, _ctx: &mut QueryContext<'_>) -> StoreResult<Value> {
    let fields: Vec<Path> = match arg.as_value() {
        Some(Value::String(field)) => vec![Path::parse(field)],
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(Path::parse).ok_or_else(|| {
                    StoreError::invalid_query("select", "field names must be strings")
                })
            })
            .collect::<StoreResult<_>>()?,
        _ => {
            return Err(StoreError::invalid_query(
                "select",
                "expected a field name or a list of field names",
            ))
        }
    };
    let pick = |item: Value| -> Value {
        if !item.is_object() {
            return item;
        }
        let mut out = Value::Object(Map::new());
        for field in &fields {
            if let Some(value) = access::get(&item, field) {
                // Writes into a fresh object cannot hit a root or type error.
                let _ = access::set(&mut out, field, value.clone());
            }
        }
        out
    };
    Ok(match input {
        Value::Array(items) => Value::Array(items.into_iter().map(pick).collect()),
        other => pick(other),
    })
}
