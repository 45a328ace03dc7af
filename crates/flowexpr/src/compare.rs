use flowcore::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    In,
    NotIn,
    Empty,
    NotEmpty,
    IsNull,
    NotNull,
}

impl CompareOp {
    /// Operators that only look at the left operand.
    pub fn is_unary(&self) -> bool {
        matches!(
            self,
            CompareOp::Empty | CompareOp::NotEmpty | CompareOp::IsNull | CompareOp::NotNull
        )
    }

    pub fn apply(&self, left: &Value, right: &Value) -> bool {
        match self {
            CompareOp::Eq => loose_eq(left, right),
            CompareOp::Ne => !loose_eq(left, right),
            CompareOp::Gt => ordering(left, right) == Some(Ordering::Greater),
            CompareOp::Ge => matches!(
                ordering(left, right),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            CompareOp::Lt => ordering(left, right) == Some(Ordering::Less),
            CompareOp::Le => matches!(ordering(left, right), Some(Ordering::Less | Ordering::Equal)),
            CompareOp::Contains => contains(left, right),
            CompareOp::NotContains => !contains(left, right),
            CompareOp::StartsWith => match (left, right) {
                (Value::String(s), target) => s.starts_with(&target.to_display_string()),
                _ => false,
            },
            CompareOp::EndsWith => match (left, right) {
                (Value::String(s), target) => s.ends_with(&target.to_display_string()),
                _ => false,
            },
            CompareOp::In => contains(right, left),
            CompareOp::NotIn => !contains(right, left),
            CompareOp::Empty => is_empty(left),
            CompareOp::NotEmpty => !is_empty(left),
            CompareOp::IsNull => left.is_null(),
            CompareOp::NotNull => !left.is_null(),
        }
    }
}

/// Numeric view that also accepts numeric strings and booleans.
pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(n) => Some(*n as f64),
        Value::Number(n) => Some(*n),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Equality with cross-type coercion: `"42" == 42`, `"true" == true`.
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }
    match (left, right) {
        (Value::Integer(_) | Value::Number(_), Value::Integer(_) | Value::Number(_))
        | (Value::String(_), Value::Integer(_) | Value::Number(_))
        | (Value::Integer(_) | Value::Number(_), Value::String(_)) => {
            match (to_number(left), to_number(right)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        (Value::Bool(b), Value::String(s)) | (Value::String(s), Value::Bool(b)) => {
            match s.trim().to_ascii_lowercase().as_str() {
                "true" => *b,
                "false" => !*b,
                _ => false,
            }
        }
        _ => false,
    }
}

fn ordering(left: &Value, right: &Value) -> Option<Ordering> {
    if let (Value::String(a), Value::String(b)) = (left, right) {
        if let (Ok(x), Ok(y)) = (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
            return x.partial_cmp(&y);
        }
        return Some(a.cmp(b));
    }
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        _ => to_number(left)?.partial_cmp(&to_number(right)?),
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::String(s) => !needle.is_null() && s.contains(&needle.to_display_string()),
        Value::Array(items) => items.iter().any(|item| loose_eq(item, needle)),
        Value::Object(map) => needle.as_str().is_some_and(|key| map.contains_key(key)),
        _ => false,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
