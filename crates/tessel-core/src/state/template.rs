use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::{Number, Value};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("placeholder pattern is valid"));

static NUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?(\d+\.?\d*|\.\d+)([eE][-+]?\d+)?$").expect("numeric pattern is valid")
});

/// Requested type for a string-valued state entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastHint {
    Boolean,
    Number,
}

impl std::str::FromStr for CastHint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Ok(CastHint::Boolean),
            "number" | "num" => Ok(CastHint::Number),
            other => Err(format!("unknown cast '{}', expected 'boolean' or 'number'", other)),
        }
    }
}

/// Apply `cast` to a raw value, or substitute `${key}` placeholders.
///
/// Only strings are touched. The snapshot is taken lazily since most lookups
/// never need it.
pub fn resolve<F>(raw: Value, cast: Option<CastHint>, snapshot: F) -> Value
where
    F: FnOnce() -> HashMap<String, Value>,
{
    let text = match raw {
        Value::String(text) => text,
        other => return other,
    };

    match cast {
        Some(CastHint::Boolean) if text == "true" => return Value::Bool(true),
        Some(CastHint::Boolean) if text == "false" => return Value::Bool(false),
        Some(CastHint::Number) => {
            if let Some(number) = parse_number(&text) {
                return Value::Number(number);
            }
        }
        _ => {}
    }

    if !text.contains("${") {
        return Value::String(text);
    }
    Value::String(substitute(&text, &snapshot()))
}

/// Single pass: substituted text is never scanned again.
pub fn substitute(text: &str, values: &HashMap<String, Value>) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures<'_>| match values.get(&caps[1]) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn parse_number(text: &str) -> Option<Number> {
    if !NUMERIC.is_match(text) {
        return None;
    }
    if let Ok(int) = text.parse::<i64>() {
        return Some(Number::from(int));
    }
    text.parse::<f64>().ok().and_then(Number::from_f64)
}
