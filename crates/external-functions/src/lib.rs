//! Typed external-function gateway: schemas, validation and dispatch.
//!
//! This crate is intended to be used by `lms-gateway`, which registers the concrete
//! functions and exposes the registry over HTTP.
//!
//! It intentionally contains **no** storage logic and **no** transport code.

pub mod error;
pub mod function;
pub mod registry;
pub mod schema;
pub mod validate;

pub use error::{FunctionError, RegistryError};
pub use function::{AccessMode, ExternalFunction, FunctionDescriptor};
pub use registry::FunctionRegistry;
pub use schema::{ParamKind, Requiredness, ReturnShape, SchemaField};
pub use validate::ValidatedParams;
