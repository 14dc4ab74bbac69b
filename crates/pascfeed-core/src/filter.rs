//! Field filters evaluated against an event's serialized form.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operator of a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOp {
    /// Same JSON type and value.
    Equal,
    /// Equal after coercion: numbers and numeric strings compare
    /// numerically, booleans match `"true"`/`"false"`, `null` matches a
    /// missing value, anything else compares by its string form.
    LooseEqual,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    /// Unrecognized operator; places no constraint.
    Unknown(String),
}

impl FilterOp {
    pub fn parse(s: &str) -> Self {
        match s {
            "eq" | "===" => Self::Equal,
            "like" | "==" => Self::LooseEqual,
            "lt" | "<" => Self::LessThan,
            "lte" | "<=" => Self::LessOrEqual,
            "gt" | ">" => Self::GreaterThan,
            "gte" | ">=" => Self::GreaterOrEqual,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Equal => "eq",
            Self::LooseEqual => "like",
            Self::LessThan => "lt",
            Self::LessOrEqual => "lte",
            Self::GreaterThan => "gt",
            Self::GreaterOrEqual => "gte",
            Self::Unknown(s) => s,
        }
    }
}

/// A filter as sent by clients: `{property, type, value}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub property: String,
    #[serde(rename = "type")]
    pub op: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    property: String,
    op: FilterOp,
    value: Value,
}

impl Filter {
    pub fn new(property: impl Into<String>, op: FilterOp, value: Value) -> Self {
        let property = property.into();
        if let FilterOp::Unknown(name) = &op {
            tracing::warn!(property = %property, op = %name, "unknown filter operator, filter always passes");
        }
        Self {
            property,
            op,
            value,
        }
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn op(&self) -> &FilterOp {
        &self.op
    }

    /// Evaluate `actual <op> stored`. A missing value fails every operator
    /// except `Unknown`.
    pub fn is_valid(&self, actual: Option<&Value>) -> bool {
        if let FilterOp::Unknown(_) = self.op {
            return true;
        }
        let Some(actual) = actual else {
            return self.op == FilterOp::LooseEqual && self.value.is_null();
        };
        match self.op {
            FilterOp::Equal => *actual == self.value,
            FilterOp::LooseEqual => loose_eq(actual, &self.value),
            FilterOp::LessThan => compare(actual, &self.value) == Some(Ordering::Less),
            FilterOp::LessOrEqual => matches!(
                compare(actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::GreaterThan => compare(actual, &self.value) == Some(Ordering::Greater),
            FilterOp::GreaterOrEqual => matches!(
                compare(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Unknown(_) => true,
        }
    }

    pub fn to_spec(&self) -> FilterSpec {
        FilterSpec {
            property: self.property.clone(),
            op: self.op.as_str().to_string(),
            value: self.value.clone(),
        }
    }
}

impl From<FilterSpec> for Filter {
    fn from(spec: FilterSpec) -> Self {
        Self::new(spec.property, FilterOp::parse(&spec.op), spec.value)
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn as_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => false,
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => as_text(a) == as_text(b),
        },
    }
}

/// Numeric when both sides are numeric, lexicographic when both are strings.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => match (a, b) {
            (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filter(op: &str, value: Value) -> Filter {
        Filter::new("x", FilterOp::parse(op), value)
    }

    #[test]
    fn strict_equality_checks_type() {
        let f = filter("eq", json!("10"));
        assert!(f.is_valid(Some(&json!("10"))));
        assert!(!f.is_valid(Some(&json!(10))));
    }

    #[test]
    fn loose_equality_coerces() {
        let f = filter("like", json!("10"));
        assert!(f.is_valid(Some(&json!(10))));
        assert!(f.is_valid(Some(&json!(10.0))));
        assert!(!f.is_valid(Some(&json!(11))));
        assert!(filter("==", json!(true)).is_valid(Some(&json!("true"))));
        assert!(filter("==", Value::Null).is_valid(None));
    }

    #[test]
    fn greater_than_means_greater() {
        let f = filter("gt", json!(10));
        assert!(f.is_valid(Some(&json!(11))));
        assert!(!f.is_valid(Some(&json!(10))));
        assert!(!f.is_valid(Some(&json!(9))));
        assert!(filter(">=", json!(10)).is_valid(Some(&json!(10))));
    }

    #[test]
    fn less_than_operators() {
        assert!(filter("lt", json!(10)).is_valid(Some(&json!(9.5))));
        assert!(!filter("lt", json!(10)).is_valid(Some(&json!(10))));
        assert!(filter("lte", json!("10")).is_valid(Some(&json!(10))));
    }

    #[test]
    fn strings_compare_lexicographically() {
        assert!(filter("lt", json!("b")).is_valid(Some(&json!("a"))));
        assert!(!filter("lt", json!("b")).is_valid(Some(&json!(true))));
    }

    #[test]
    fn missing_value_fails_except_unknown_operator() {
        for op in ["eq", "like", "lt", "lte", "gt", "gte"] {
            assert!(!filter(op, json!(1)).is_valid(None), "{op}");
        }
        assert!(filter("between", json!(1)).is_valid(None));
        assert!(filter("between", json!(1)).is_valid(Some(&json!(99))));
    }

    #[test]
    fn spec_round_trip_keeps_unknown_operator_name() {
        let spec: FilterSpec =
            serde_json::from_value(json!({"property": "a.b", "type": "~", "value": 1})).unwrap();
        let f = Filter::from(spec.clone());
        assert_eq!(f.op(), &FilterOp::Unknown("~".into()));
        assert_eq!(f.to_spec(), spec);
    }
}
