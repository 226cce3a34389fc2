//! Function descriptors and the handler trait.

use crate::error::Result;
use crate::schema::{InputSchema, ReturnShape};
use crate::validate::ValidatedParams;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Whether a function only reads, or also mutates, external state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    Read,
    Write,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
        })
    }
}

/// Registration record of an external function.
///
/// Immutable once registered.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDescriptor {
    /// Unique, fully-qualified name (e.g. `core_user_get_user_logs`).
    pub name: String,
    /// Short handler name callers may use instead of `name` (e.g. `get_user_logs`).
    pub method_name: String,
    pub description: String,
    pub access: AccessMode,
    pub parameters: InputSchema,
    pub returns: ReturnShape,
}

/// A callable external function.
///
/// Implementations receive parameters that already passed validation against
/// [`FunctionDescriptor::parameters`]; their return value is cleaned against
/// [`FunctionDescriptor::returns`] by the registry before it reaches the caller.
#[async_trait]
pub trait ExternalFunction: Send + Sync {
    fn descriptor(&self) -> &FunctionDescriptor;

    async fn call(&self, params: ValidatedParams) -> Result<Value>;
}
