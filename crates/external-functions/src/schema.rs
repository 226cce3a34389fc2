//! Declarative parameter and return-value shapes.
//!
//! Every registered function declares an ordered list of [`SchemaField`]s for its input and a
//! [`ReturnShape`] for its output. Both are plain data: they are serialized as-is for the
//! `/functions` documentation endpoint.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Primitive kind of a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Int,
    Float,
    Bool,
    Text,
    /// Any non-null JSON value, passed through untouched.
    Raw,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Text => "text",
            Self::Raw => "raw",
        };
        f.write_str(s)
    }
}

/// Whether a field must be present, and what happens when it is not.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "mode", content = "value")]
pub enum Requiredness {
    Required,
    /// Absent values stay unset.
    Optional,
    /// Absent values are replaced by the given default.
    Default(Value),
}

/// One named, typed field of an input schema or of a `single` return structure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaField {
    pub name: String,
    pub kind: ParamKind,
    pub requiredness: Requiredness,
    /// Accept an explicit `null` for this field.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub allow_null: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl SchemaField {
    #[must_use]
    pub fn required(name: impl Into<String>, kind: ParamKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            requiredness: Requiredness::Required,
            allow_null: false,
            description: description.into(),
        }
    }

    #[must_use]
    pub fn optional(name: impl Into<String>, kind: ParamKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            requiredness: Requiredness::Optional,
            allow_null: false,
            description: description.into(),
        }
    }

    #[must_use]
    pub fn with_default(
        name: impl Into<String>,
        kind: ParamKind,
        default: Value,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            requiredness: Requiredness::Default(default),
            allow_null: false,
            description: description.into(),
        }
    }

    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.allow_null = true;
        self
    }

    #[must_use]
    pub fn is_required(&self) -> bool {
        matches!(self.requiredness, Requiredness::Required)
    }
}

/// Ordered input schema of a function.
pub type InputSchema = Vec<SchemaField>;

/// Shape of a function's return value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ReturnShape {
    /// A single primitive value.
    Value { kind: ParamKind },
    /// An object with the declared fields (undeclared fields are dropped when cleaning).
    Single { fields: Vec<SchemaField> },
    /// A list whose every element has the inner shape.
    Multiple { item: Box<ReturnShape> },
}

impl ReturnShape {
    #[must_use]
    pub fn single(fields: Vec<SchemaField>) -> Self {
        Self::Single { fields }
    }

    #[must_use]
    pub fn multiple(item: Self) -> Self {
        Self::Multiple {
            item: Box::new(item),
        }
    }
}
