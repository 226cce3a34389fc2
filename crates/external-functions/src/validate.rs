//! Parameter validation and return-value cleaning.
//!
//! Both directions share one set of coercion rules ([`coerce`]) so a value accepted as input
//! of kind `int` is exactly a value that would be emitted as output of kind `int`.

use crate::error::{FunctionError, Result};
use crate::schema::{ParamKind, Requiredness, ReturnShape, SchemaField};
use serde_json::{Map, Value};

/// Coerce a raw JSON value to the canonical representation of `kind`.
///
/// Returns `None` when the value cannot represent the kind. `null` is never coercible; callers
/// decide what `null` means for a given field.
#[must_use]
pub fn coerce(kind: ParamKind, value: &Value) -> Option<Value> {
    match (kind, value) {
        (_, Value::Null) => None,
        (ParamKind::Raw, v) => Some(v.clone()),

        (ParamKind::Int, Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                return Some(Value::from(i));
            }
            // Integral floats (`5.0`) are accepted; anything with a fraction is not.
            let f = n.as_f64()?;
            #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
            let as_int = (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64)
                .then_some(f as i64);
            as_int.map(Value::from)
        }
        (ParamKind::Int, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),

        (ParamKind::Float, Value::Number(n)) => n.as_f64().map(Value::from),
        (ParamKind::Float, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Value::from),

        (ParamKind::Bool, Value::Bool(b)) => Some(Value::Bool(*b)),
        (ParamKind::Bool, Value::Number(n)) => match n.as_i64() {
            Some(0) => Some(Value::Bool(false)),
            Some(1) => Some(Value::Bool(true)),
            _ => None,
        },
        (ParamKind::Bool, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        },

        (ParamKind::Text, Value::String(s)) => Some(Value::String(s.clone())),
        (ParamKind::Text, Value::Number(n)) => Some(Value::String(n.to_string())),
        (ParamKind::Text, Value::Bool(b)) => Some(Value::String(b.to_string())),

        _ => None,
    }
}

fn describe(value: &Value) -> String {
    let s = value.to_string();
    if s.len() > 64 {
        let cut = s
            .char_indices()
            .map(|(i, _)| i)
            .take_while(|i| *i <= 61)
            .last()
            .unwrap_or(0);
        format!("{}...", &s[..cut])
    } else {
        s
    }
}

/// Input parameters that passed validation, in schema order.
///
/// Every declared field has an entry; `None` means "unset" (optional field not supplied).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedParams {
    values: Vec<(String, Option<Value>)>,
}

impl ValidatedParams {
    /// Raw access to a validated value. `None` if unset or undeclared.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(k, _)| k == name)
            .and_then(|(_, v)| v.as_ref())
    }

    #[must_use]
    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some_and(|v| !v.is_null())
    }

    /// A required integer parameter.
    ///
    /// # Errors
    ///
    /// Returns `MissingParameter` if the value is unset, `TypeMismatch` if it is not an integer
    /// (only possible when the caller asks for a field under the wrong kind).
    pub fn int(&self, name: &str) -> Result<i64> {
        self.opt_int(name)?.ok_or_else(|| FunctionError::MissingParameter {
            name: name.to_string(),
        })
    }

    /// An optional integer parameter.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if the value is set but is not an integer.
    pub fn opt_int(&self, name: &str) -> Result<Option<i64>> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v.as_i64().map(Some).ok_or_else(|| FunctionError::TypeMismatch {
                name: name.to_string(),
                expected: ParamKind::Int,
                got: describe(v),
            }),
        }
    }

    /// A required text parameter.
    ///
    /// # Errors
    ///
    /// Returns `MissingParameter` if unset, `TypeMismatch` if it is not text.
    pub fn text(&self, name: &str) -> Result<&str> {
        self.opt_text(name)?.ok_or_else(|| FunctionError::MissingParameter {
            name: name.to_string(),
        })
    }

    /// An optional text parameter.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if the value is set but is not text.
    pub fn opt_text(&self, name: &str) -> Result<Option<&str>> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v.as_str().map(Some).ok_or_else(|| FunctionError::TypeMismatch {
                name: name.to_string(),
                expected: ParamKind::Text,
                got: describe(v),
            }),
        }
    }
}

/// Validate and coerce raw arguments against an input schema.
///
/// Fields are checked in schema order; undeclared keys are reported after all declared fields
/// pass.
///
/// # Errors
///
/// - `MissingParameter` for an absent required field
/// - `TypeMismatch` for a value that cannot be coerced to the declared kind
/// - `UnexpectedParameter` for a key that is not declared
pub fn validate_parameters(
    schema: &[SchemaField],
    raw: &Map<String, Value>,
) -> Result<ValidatedParams> {
    let mut values = Vec::with_capacity(schema.len());

    for field in schema {
        let value = match raw.get(&field.name) {
            None => absent_value(field)?,
            Some(Value::Null) => null_value(field)?,
            Some(v) => Some(coerce(field.kind, v).ok_or_else(|| FunctionError::TypeMismatch {
                name: field.name.clone(),
                expected: field.kind,
                got: describe(v),
            })?),
        };
        values.push((field.name.clone(), value));
    }

    if let Some(unknown) = raw
        .keys()
        .find(|k| !schema.iter().any(|f| &f.name == *k))
    {
        return Err(FunctionError::UnexpectedParameter {
            name: unknown.clone(),
        });
    }

    Ok(ValidatedParams { values })
}

fn absent_value(field: &SchemaField) -> Result<Option<Value>> {
    match &field.requiredness {
        Requiredness::Required => Err(FunctionError::MissingParameter {
            name: field.name.clone(),
        }),
        Requiredness::Optional => Ok(None),
        Requiredness::Default(d) => Ok(Some(d.clone())),
    }
}

fn null_value(field: &SchemaField) -> Result<Option<Value>> {
    match &field.requiredness {
        Requiredness::Required if field.allow_null => Ok(Some(Value::Null)),
        Requiredness::Required => Err(FunctionError::TypeMismatch {
            name: field.name.clone(),
            expected: field.kind,
            got: "null".to_string(),
        }),
        Requiredness::Optional | Requiredness::Default(_) => absent_value(field),
    }
}

/// Check a handler's return value against its declared shape and strip undeclared fields.
///
/// # Errors
///
/// Returns `InvalidResponse` naming the offending path when the value does not fit the shape.
pub fn clean_return_value(shape: &ReturnShape, value: Value) -> Result<Value> {
    clean_at(shape, value, "$")
}

fn clean_at(shape: &ReturnShape, value: Value, path: &str) -> Result<Value> {
    match shape {
        ReturnShape::Value { kind } => coerce(*kind, &value).ok_or_else(|| {
            FunctionError::InvalidResponse(format!(
                "{path}: expected {kind}, got {}",
                describe(&value)
            ))
        }),
        ReturnShape::Single { fields } => {
            let Value::Object(mut obj) = value else {
                return Err(FunctionError::InvalidResponse(format!(
                    "{path}: expected object, got {}",
                    describe(&value)
                )));
            };
            let mut out = Map::new();
            for field in fields {
                let field_path = format!("{path}.{}", field.name);
                match obj.remove(&field.name) {
                    None => match &field.requiredness {
                        Requiredness::Required => {
                            return Err(FunctionError::InvalidResponse(format!(
                                "{field_path}: missing required field"
                            )));
                        }
                        Requiredness::Optional => {}
                        Requiredness::Default(d) => {
                            out.insert(field.name.clone(), d.clone());
                        }
                    },
                    Some(Value::Null) if field.allow_null => {
                        out.insert(field.name.clone(), Value::Null);
                    }
                    Some(Value::Null) if !field.is_required() => {}
                    Some(v) => {
                        let cleaned = coerce(field.kind, &v).ok_or_else(|| {
                            FunctionError::InvalidResponse(format!(
                                "{field_path}: expected {}, got {}",
                                field.kind,
                                describe(&v)
                            ))
                        })?;
                        out.insert(field.name.clone(), cleaned);
                    }
                }
            }
            Ok(Value::Object(out))
        }
        ReturnShape::Multiple { item } => {
            let Value::Array(items) = value else {
                return Err(FunctionError::InvalidResponse(format!(
                    "{path}: expected list, got {}",
                    describe(&value)
                )));
            };
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| clean_at(item, v, &format!("{path}[{i}]")))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array)
        }
    }
}
