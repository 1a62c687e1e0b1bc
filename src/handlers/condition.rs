//! Condition - evaluates rules against the run context
//!
//! Field paths resolve through [`template::lookup`], so `api_call_result.status`
//! and `user.tier` both work. Comparisons are loose in the way workflow authors
//! expect: `"42"` equals `42` and numeric strings compare as numbers.

use super::JobContext;
use crate::core::{ConditionAttrs, ConditionRule, Logic, Operator};
use crate::template;
use serde_json::{json, Value};

pub(super) fn execute(attrs: &ConditionAttrs, ctx: &mut JobContext) -> Value {
    let mut evaluated = Vec::with_capacity(attrs.conditions.len());
    let mut outcomes = Vec::with_capacity(attrs.conditions.len());

    for rule in &attrs.conditions {
        let actual = template::lookup(&ctx.context, &rule.field).cloned();
        let passed = evaluate_rule(rule, &ctx.context);
        ctx.log(format!(
            "{} {} {} -> {}",
            rule.field, rule.operator, rule.value, passed
        ));
        evaluated.push(json!({
            "field": rule.field,
            "operator": rule.operator,
            "expected": rule.value,
            "actual": actual,
            "passed": passed,
        }));
        outcomes.push(passed);
    }

    // An empty AND is vacuously true, an empty OR is false
    let condition_result = match attrs.logic {
        Logic::And => outcomes.iter().all(|p| *p),
        Logic::Or => outcomes.iter().any(|p| *p),
    };
    ctx.log(format!("Condition evaluated to {}", condition_result));

    json!({
        "conditionResult": condition_result,
        "logic": attrs.logic,
        "evaluated": evaluated,
    })
}

/// Evaluate a single rule against a context object
pub fn evaluate_rule(rule: &ConditionRule, context: &Value) -> bool {
    let actual = template::lookup(context, &rule.field);
    let expected = &rule.value;

    match rule.operator {
        Operator::Equals => loosely_equal(actual, expected),
        Operator::NotEquals => !loosely_equal(actual, expected),
        Operator::GreaterThan => compare(actual, expected, |a, b| a > b),
        Operator::LessThan => compare(actual, expected, |a, b| a < b),
        Operator::Contains => contains(actual, expected),
        Operator::NotContains => !contains(actual, expected),
        Operator::IsEmpty => is_empty(actual),
        Operator::IsNotEmpty => !is_empty(actual),
    }
}

fn loosely_equal(actual: Option<&Value>, expected: &Value) -> bool {
    let Some(actual) = actual else {
        return expected.is_null();
    };
    if actual == expected {
        return true;
    }
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::String(_), _) | (_, Value::String(_)) => {
            match (as_number(actual), as_number(expected)) {
                (Some(a), Some(b)) => a == b,
                _ => as_text(actual) == as_text(expected),
            }
        }
        _ => false,
    }
}

fn compare(actual: Option<&Value>, expected: &Value, op: fn(f64, f64) -> bool) -> bool {
    match (actual.and_then(as_number), as_number(expected)) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

fn contains(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        Some(Value::String(s)) => s.contains(as_text(expected).as_str()),
        Some(Value::Array(items)) => items.iter().any(|item| loosely_equal(Some(item), expected)),
        Some(Value::Object(map)) => map.contains_key(as_text(expected).as_str()),
        _ => false,
    }
}

fn is_empty(actual: Option<&Value>) -> bool {
    match actual {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
