//! Function registry and dispatch.
//!
//! A call runs: lookup by name → [`validate_parameters`] → handler → [`clean_return_value`].
//! Validation failures never reach the handler.

use crate::error::{FunctionError, RegistryError, Result};
use crate::function::{ExternalFunction, FunctionDescriptor};
use crate::validate::{clean_return_value, validate_parameters};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Clone)]
pub struct FunctionRegistry {
    inner: Arc<FunctionRegistryInner>,
}

struct FunctionRegistryInner {
    functions: Vec<Arc<dyn ExternalFunction>>,
}

impl FunctionRegistry {
    /// Build a registry from a fixed set of functions.
    ///
    /// The resulting registry is immutable and cheap to clone.
    ///
    /// # Errors
    ///
    /// Returns an error if two functions share a name or method name, or if a function
    /// declares the same parameter twice.
    pub fn new(
        functions: impl IntoIterator<Item = Arc<dyn ExternalFunction>>,
    ) -> std::result::Result<Self, RegistryError> {
        let functions: Vec<Arc<dyn ExternalFunction>> = functions.into_iter().collect();
        let mut names: HashSet<&str> = HashSet::new();

        for f in &functions {
            let d = f.descriptor();
            if !names.insert(d.name.as_str()) {
                return Err(RegistryError::DuplicateName(d.name.clone()));
            }
            if d.method_name != d.name && !names.insert(d.method_name.as_str()) {
                return Err(RegistryError::DuplicateName(d.method_name.clone()));
            }

            let mut params: HashSet<&str> = HashSet::new();
            for p in &d.parameters {
                if !params.insert(p.name.as_str()) {
                    return Err(RegistryError::DuplicateParameter {
                        function: d.name.clone(),
                        param: p.name.clone(),
                    });
                }
            }
        }

        Ok(Self {
            inner: Arc::new(FunctionRegistryInner { functions }),
        })
    }

    /// Descriptors of all registered functions, in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<&FunctionDescriptor> {
        self.inner.functions.iter().map(|f| f.descriptor()).collect()
    }

    /// Resolve a function by its registered name or its method name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ExternalFunction>> {
        self.inner.functions.iter().find(|f| {
            let d = f.descriptor();
            d.name == name || d.method_name == name
        })
    }

    /// Dispatch a call.
    ///
    /// # Errors
    ///
    /// Returns:
    /// - `UnknownFunction` if no function matches `name`
    /// - a validation error if `arguments` do not satisfy the input schema (the handler does
    ///   not run)
    /// - whatever the handler returns
    /// - `InvalidResponse` if the handler's value does not satisfy the return shape
    pub async fn call(&self, name: &str, arguments: &Map<String, Value>) -> Result<Value> {
        let function = self
            .get(name)
            .ok_or_else(|| FunctionError::UnknownFunction(name.to_string()))?;
        let descriptor = function.descriptor();
        let started = Instant::now();

        let outcome = async {
            let params = validate_parameters(&descriptor.parameters, arguments)?;
            let value = function.call(params).await?;
            clean_return_value(&descriptor.returns, value)
        }
        .await;

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match &outcome {
            Ok(_) => info!(
                function = %descriptor.name,
                access = %descriptor.access,
                elapsed_ms,
                "external function call succeeded"
            ),
            Err(e) => warn!(
                function = %descriptor.name,
                access = %descriptor.access,
                errorcode = e.error_code(),
                error = %e,
                elapsed_ms,
                "external function call failed"
            ),
        }

        outcome
    }
}
