//! Variable types, values, and coercion rules.
//!
//! Every value stored in a variable is coerced into its type's domain:
//!
//! | Type      | Domain                     | Reset value |
//! |-----------|----------------------------|-------------|
//! | `boolean` | `Bool` or `Null`           | `false`     |
//! | `number`  | `Int`, `Float` or `Null`   | `0`         |
//! | `string`  | `String` or `Null`         | `""`        |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Display state of a boolean variable whose value is truthy.
pub const STATE_ON: &str = "on";

/// Display state of a boolean variable whose value is falsy.
pub const STATE_OFF: &str = "off";

/// Strings that coerce to `true` for boolean variables (compared lowercase).
const TRUTHY_STRINGS: [&str; 4] = ["on", "true", "1", "yes"];

/// Type of a runtime variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    /// On/off flag.
    Boolean,
    /// Integer or floating point number.
    Number,
    /// Free-form text.
    #[default]
    String,
}

impl VariableType {
    /// Returns the canonical lowercase name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            VariableType::Boolean => "boolean",
            VariableType::Number => "number",
            VariableType::String => "string",
        }
    }

    /// Returns the value a variable of this type resets to.
    pub fn default_value(&self) -> Value {
        match self {
            VariableType::Boolean => Value::Bool(false),
            VariableType::Number => Value::Int(0),
            VariableType::String => Value::String(String::new()),
        }
    }

    /// Coerces a raw value into this type's domain.
    ///
    /// Never fails: unparseable numbers become `0`.
    pub fn coerce(&self, raw: &Value) -> Value {
        if raw.is_null() {
            return Value::Null;
        }

        match self {
            VariableType::Boolean => match raw {
                Value::Bool(b) => Value::Bool(*b),
                Value::String(s) => {
                    let lowered = s.to_lowercase();
                    Value::Bool(TRUTHY_STRINGS.contains(&lowered.as_str()))
                }
                other => Value::Bool(other.is_truthy()),
            },
            VariableType::Number => match raw {
                Value::Int(_) | Value::Float(_) => raw.clone(),
                Value::Bool(b) => Value::Int(i64::from(*b)),
                Value::String(s) => parse_number(s),
                Value::Null => Value::Null,
            },
            VariableType::String => match raw {
                Value::String(s) => Value::String(s.clone()),
                other => Value::String(other.to_string()),
            },
        }
    }

    /// Returns the externally observable state for a value of this type.
    ///
    /// Boolean variables always display `on` or `off`; other types display
    /// nothing for `Null`.
    pub fn display_state(&self, value: &Value) -> Option<String> {
        match (self, value) {
            (VariableType::Boolean, v) => Some(
                if v.is_truthy() { STATE_ON } else { STATE_OFF }.to_string(),
            ),
            (_, Value::Null) => None,
            (_, v) => Some(v.to_string()),
        }
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown variable type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown variable type '{0}' (expected boolean, number or string)")]
pub struct ParseVariableTypeError(pub String);

impl FromStr for VariableType {
    type Err = ParseVariableTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "boolean" => Ok(VariableType::Boolean),
            "number" => Ok(VariableType::Number),
            "string" => Ok(VariableType::String),
            _ => Err(ParseVariableTypeError(s.to_string())),
        }
    }
}

/// A variable value.
///
/// Serializes to the natural JSON form (`null`, `true`, `7`, `3.5`, `"x"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    /// The absence marker.
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Value {
    /// Returns true for the absence marker.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness: `Null`, `false`, zero and the empty string are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
        }
    }

    /// Returns true if the value fits the given type's domain.
    pub fn matches_type(&self, var_type: VariableType) -> bool {
        match (self, var_type) {
            (Value::Null, _) => true,
            (Value::Bool(_), VariableType::Boolean) => true,
            (Value::Int(_) | Value::Float(_), VariableType::Number) => true,
            (Value::String(_), VariableType::String) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", format_float(*x)),
            Value::String(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

/// Parses numeric text: floats when a `.` is present, otherwise integers
/// with a float fallback. Anything else (including non-finite results) is `0`.
fn parse_number(raw: &str) -> Value {
    let text = raw.trim();
    let parsed = if text.contains('.') {
        parse_float(text)
    } else {
        text.parse::<i64>()
            .ok()
            .map(Value::Int)
            .or_else(|| parse_float(text))
    };
    parsed.unwrap_or(Value::Int(0))
}

fn parse_float(text: &str) -> Option<Value> {
    text.parse::<f64>()
        .ok()
        .filter(|x| x.is_finite())
        .map(Value::Float)
}

/// Integral floats keep a trailing `.0` so they stay distinguishable from ints.
fn format_float(x: f64) -> String {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{:.1}", x)
    } else {
        x.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_TYPES: [VariableType; 3] = [
        VariableType::Boolean,
        VariableType::Number,
        VariableType::String,
    ];

    fn sample_inputs() -> Vec<Value> {
        vec![
            Value::Null,
            Value::Bool(true),
            Value::Bool(false),
            Value::Int(0),
            Value::Int(-12),
            Value::Float(3.5),
            Value::Float(0.0),
            Value::from(""),
            Value::from("on"),
            Value::from("3"),
            Value::from("3.5"),
            Value::from("abc"),
            Value::from("1e3"),
            Value::from("nan"),
        ]
    }

    #[test]
    fn test_coerce_always_matches_type() {
        for var_type in ALL_TYPES {
            for raw in sample_inputs() {
                let coerced = var_type.coerce(&raw);
                assert!(
                    coerced.matches_type(var_type),
                    "{:?} coerced to {:?} under {}",
                    raw,
                    coerced,
                    var_type
                );
            }
        }
    }

    #[test]
    fn test_coerce_null_is_preserved() {
        for var_type in ALL_TYPES {
            assert_eq!(var_type.coerce(&Value::Null), Value::Null);
        }
    }

    #[test]
    fn test_coerce_number_from_strings() {
        let number = VariableType::Number;
        assert_eq!(number.coerce(&Value::from("3.5")), Value::Float(3.5));
        assert_eq!(number.coerce(&Value::from("3")), Value::Int(3));
        assert_eq!(number.coerce(&Value::from("abc")), Value::Int(0));
        assert_eq!(number.coerce(&Value::from(" 42 ")), Value::Int(42));
        assert_eq!(number.coerce(&Value::from("1e3")), Value::Float(1000.0));
        assert_eq!(number.coerce(&Value::from("1.2.3")), Value::Int(0));
        assert_eq!(number.coerce(&Value::from("inf")), Value::Int(0));
    }

    #[test]
    fn test_coerce_number_passthrough() {
        let number = VariableType::Number;
        assert_eq!(number.coerce(&Value::Int(7)), Value::Int(7));
        assert_eq!(number.coerce(&Value::Float(2.25)), Value::Float(2.25));
        assert_eq!(number.coerce(&Value::Bool(true)), Value::Int(1));
    }

    #[test]
    fn test_coerce_boolean_from_strings() {
        let boolean = VariableType::Boolean;
        assert_eq!(boolean.coerce(&Value::from("On")), Value::Bool(true));
        assert_eq!(boolean.coerce(&Value::from("YES")), Value::Bool(true));
        assert_eq!(boolean.coerce(&Value::from("1")), Value::Bool(true));
        assert_eq!(boolean.coerce(&Value::from("true")), Value::Bool(true));
        assert_eq!(boolean.coerce(&Value::from("off")), Value::Bool(false));
        assert_eq!(boolean.coerce(&Value::from("maybe")), Value::Bool(false));
    }

    #[test]
    fn test_coerce_boolean_truthiness() {
        let boolean = VariableType::Boolean;
        assert_eq!(boolean.coerce(&Value::Int(5)), Value::Bool(true));
        assert_eq!(boolean.coerce(&Value::Int(0)), Value::Bool(false));
        assert_eq!(boolean.coerce(&Value::Float(0.1)), Value::Bool(true));
    }

    #[test]
    fn test_coerce_string_renders_values() {
        let string = VariableType::String;
        assert_eq!(string.coerce(&Value::Int(7)), Value::from("7"));
        assert_eq!(string.coerce(&Value::Float(2.0)), Value::from("2.0"));
        assert_eq!(string.coerce(&Value::Float(0.25)), Value::from("0.25"));
        assert_eq!(string.coerce(&Value::Bool(true)), Value::from("true"));
    }

    #[test]
    fn test_default_values() {
        assert_eq!(VariableType::Boolean.default_value(), Value::Bool(false));
        assert_eq!(VariableType::Number.default_value(), Value::Int(0));
        assert_eq!(VariableType::String.default_value(), Value::from(""));
    }

    #[test]
    fn test_display_state() {
        assert_eq!(
            VariableType::Boolean.display_state(&Value::Bool(true)),
            Some("on".to_string())
        );
        assert_eq!(
            VariableType::Boolean.display_state(&Value::Null),
            Some("off".to_string())
        );
        assert_eq!(VariableType::Number.display_state(&Value::Null), None);
        assert_eq!(
            VariableType::Number.display_state(&Value::Float(1.5)),
            Some("1.5".to_string())
        );
        assert_eq!(
            VariableType::String.display_state(&Value::from("")),
            Some(String::new())
        );
    }

    #[test]
    fn test_parse_variable_type() {
        assert_eq!("boolean".parse::<VariableType>().unwrap(), VariableType::Boolean);
        assert_eq!("Number".parse::<VariableType>().unwrap(), VariableType::Number);
        assert!("integer".parse::<VariableType>().is_err());
    }

    #[test]
    fn test_value_json_forms() {
        let values: Vec<Value> = serde_json::from_str(r#"[null, true, 7, 3.5, "x"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Bool(true),
                Value::Int(7),
                Value::Float(3.5),
                Value::from("x"),
            ]
        );
        assert_eq!(serde_json::to_string(&Value::Int(7)).unwrap(), "7");
        assert_eq!(serde_json::to_string(&Value::Null).unwrap(), "null");
    }

    #[test]
    fn test_variable_type_serialization() {
        let json = serde_json::to_string(&VariableType::Boolean).unwrap();
        assert_eq!(json, "\"boolean\"");
    }
}
