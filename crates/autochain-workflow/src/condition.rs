//! Safe condition evaluation.
//!
//! Conditions are a single `variable operator literal` comparison against a
//! read-only snapshot of the triggering context. Nothing is executed: the
//! grammar is a fixed regex and anything it rejects evaluates to `false`.
//!
//! Variables: `context_type`, `confidence`, `details`, `project_path`,
//! `session_name`, `timestamp`.
//!
//! Operators: `==`, `!=`, `>`, `<`, `>=`, `<=`, `in`, `not in`.

use std::cmp::Ordering;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

use autochain_core::ContextInfo;

fn condition_grammar() -> &'static Regex {
    static GRAMMAR: OnceLock<Regex> = OnceLock::new();
    GRAMMAR.get_or_init(|| {
        Regex::new(r"^\s*(\w+)\s+(==|!=|>=|<=|>|<|not\s+in|in)\s+(.+?)\s*$")
            .expect("Invalid condition grammar regex")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    In,
    NotIn,
}

impl Operator {
    fn parse(op: &str) -> Option<Self> {
        match op {
            "==" => Some(Operator::Eq),
            "!=" => Some(Operator::Ne),
            ">" => Some(Operator::Gt),
            "<" => Some(Operator::Lt),
            ">=" => Some(Operator::Ge),
            "<=" => Some(Operator::Le),
            "in" => Some(Operator::In),
            other => {
                let mut words = other.split_whitespace();
                match (words.next(), words.next(), words.next()) {
                    (Some("not"), Some("in"), None) => Some(Operator::NotIn),
                    _ => None,
                }
            }
        }
    }
}

/// Evaluates condition strings against one context snapshot.
pub struct ConditionEvaluator {
    context: Map<String, Value>,
}

impl ConditionEvaluator {
    pub fn new(context: &ContextInfo) -> Self {
        Self {
            context: context.condition_snapshot(),
        }
    }

    /// Evaluate against an arbitrary variable map.
    pub fn from_map(context: Map<String, Value>) -> Self {
        Self { context }
    }

    /// Evaluate `condition`. Never fails: malformed input is `false`.
    pub fn evaluate(&self, condition: &str) -> bool {
        match condition.trim().to_lowercase().as_str() {
            "true" | "1" => return true,
            "false" | "0" => return false,
            _ => {}
        }

        let Some(caps) = condition_grammar().captures(condition) else {
            warn!(condition = %condition, "Invalid condition format");
            return false;
        };

        let variable = &caps[1];
        let Some(left) = self.context.get(variable) else {
            warn!(condition = %condition, variable = %variable, "Unknown variable in condition");
            return false;
        };

        let Some(op) = Operator::parse(&caps[2]) else {
            warn!(condition = %condition, "Unsupported operator in condition");
            return false;
        };

        let right = parse_literal(&caps[3]);
        apply(op, left, &right)
    }
}

/// Evaluate `condition` against `context` in one call.
pub fn evaluate_condition(condition: &str, context: &ContextInfo) -> bool {
    ConditionEvaluator::new(context).evaluate(condition)
}

/// Parse the right-hand literal of a condition.
///
/// Quoted text is a string, `true`/`false` are booleans, `none` is null,
/// numbers containing `.` are floats, other numbers are integers, and
/// everything else is a bare string.
fn parse_literal(raw: &str) -> Value {
    let s = raw.trim();

    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        return Value::String(s[1..s.len() - 1].to_string());
    }

    match s.to_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "none" => return Value::Null,
        _ => {}
    }

    if s.contains('.') {
        if let Some(n) = s.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
            return Value::Number(n);
        }
    } else if let Ok(n) = s.parse::<i64>() {
        return Value::from(n);
    }

    Value::String(s.to_string())
}

fn apply(op: Operator, left: &Value, right: &Value) -> bool {
    match op {
        Operator::Eq => values_equal(left, right),
        Operator::Ne => !values_equal(left, right),
        Operator::Gt => compare(left, right) == Some(Ordering::Greater),
        Operator::Lt => compare(left, right) == Some(Ordering::Less),
        Operator::Ge => matches!(compare(left, right), Some(Ordering::Greater | Ordering::Equal)),
        Operator::Le => matches!(compare(left, right), Some(Ordering::Less | Ordering::Equal)),
        Operator::In => contains(left, right).unwrap_or(false),
        // A container that cannot hold the value does not contain it.
        Operator::NotIn => contains(left, right).map_or(true, |found| !found),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        _ => left == right,
    }
}

/// Ordering between two values, `None` where they are not comparable.
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Membership of `needle` in `haystack`, `None` on a type mismatch.
fn contains(haystack: &Value, needle: &Value) -> Option<bool> {
    match haystack {
        Value::String(s) => needle.as_str().map(|n| s.contains(n)),
        Value::Array(items) => Some(items.iter().any(|item| values_equal(item, needle))),
        Value::Object(map) => Some(needle.as_str().is_some_and(|key| map.contains_key(key))),
        _ => None,
    }
}
