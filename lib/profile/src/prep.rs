//! Row cleanup applied to raw JSON rows before they become a population.
//!
//! Exports of user data tend to wrap every column in a list. The steps here
//! unwrap singleton lists in scalar columns, drop rows whose multi-valued
//! columns are implausibly long, and normalise multi-valued cells to sorted
//! lists (with anything that is not a list becoming the empty list).

use lookalike_core::{FeatureKind, FeatureSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use tracing::info;

/// Default maximum length of a multi-valued cell
pub const DEFAULT_MAX_LIST_LEN: usize = 16;

/// Options for [`prepare_rows`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepConfig {
    /// Rows with a longer multi-valued cell are dropped
    #[serde(default = "default_max_list_len")]
    pub max_list_len: usize,
}

fn default_max_list_len() -> usize {
    DEFAULT_MAX_LIST_LEN
}

impl Default for PrepConfig {
    fn default() -> Self {
        Self {
            max_list_len: DEFAULT_MAX_LIST_LEN,
        }
    }
}

/// Outcome of [`prepare_rows`]
#[derive(Debug, Clone, PartialEq)]
pub struct PrepReport {
    pub rows: Vec<Value>,
    pub dropped: usize,
}

/// Run all cleanup steps in order: unwrap singletons, drop oversized rows,
/// normalise multi-valued cells.
pub fn prepare_rows(mut rows: Vec<Value>, schema: &FeatureSchema, config: &PrepConfig) -> PrepReport {
    coerce_singletons(&mut rows, schema);
    let (mut rows, dropped) = drop_oversized(rows, schema, config.max_list_len);
    normalize_multi(&mut rows, schema);

    info!(kept = rows.len(), dropped, "Rows prepared");
    PrepReport { rows, dropped }
}

/// In scalar columns, replace a one-element list by its element and an empty
/// list by null. Longer lists are left for schema validation to reject.
pub fn coerce_singletons(rows: &mut [Value], schema: &FeatureSchema) {
    for object in rows.iter_mut().filter_map(Value::as_object_mut) {
        for spec in schema.features.iter().filter(|f| f.kind == FeatureKind::Scalar) {
            if let Some(cell) = object.get_mut(&spec.name) {
                let unwrapped = match cell {
                    Value::Array(items) if items.is_empty() => Some(Value::Null),
                    Value::Array(items) if items.len() == 1 => items.pop(),
                    _ => None,
                };
                if let Some(value) = unwrapped {
                    *cell = value;
                }
            }
        }
    }
}

/// Remove rows where any multi-valued column holds more than `max_len`
/// elements. Returns the kept rows and the number dropped.
pub fn drop_oversized(rows: Vec<Value>, schema: &FeatureSchema, max_len: usize) -> (Vec<Value>, usize) {
    let multi: Vec<&str> = schema.multi_valued().collect();
    let before = rows.len();
    let kept: Vec<Value> = rows
        .into_iter()
        .filter(|row| {
            multi.iter().all(|name| match row.get(name) {
                Some(Value::Array(items)) => items.len() <= max_len,
                _ => true,
            })
        })
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

/// Sort multi-valued cells; anything that is not a list (null, a scalar, a
/// missing key) becomes `[]`.
pub fn normalize_multi(rows: &mut [Value], schema: &FeatureSchema) {
    let multi: Vec<&str> = schema.multi_valued().collect();
    for object in rows.iter_mut().filter_map(Value::as_object_mut) {
        for name in &multi {
            if let Some(Value::Array(items)) = object.get_mut(*name) {
                items.sort_by(compare_json);
                continue;
            }
            object.insert(name.to_string(), Value::Array(Vec::new()));
        }
    }
}

/// Total order over scalar JSON values: null < bool < number < string, with
/// containers last.
fn compare_json(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) | Value::Object(_) => 4,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)).then_with(|| a.to_string().cmp(&b.to_string())),
    }
}
