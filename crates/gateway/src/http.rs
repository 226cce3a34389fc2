//! HTTP surface.
//!
//! - `GET  /health`
//! - `GET  /functions`                        registered descriptors
//! - `POST /functions/{name}`                 JSON object body
//! - `POST /webservice/rest/server.php`       form body with `wsfunction` + string params

use axum::{
    Extension, Form, Json, Router,
    extract::{
        Path,
        rejection::{FormRejection, JsonRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use lms_external_functions::{FunctionError, FunctionRegistry, ParamKind};
use serde::Serialize;
use serde_json::{Map, Value, map::Entry};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Form fields that address the REST endpoint itself rather than the function.
const REST_CONTROL_FIELDS: &[&str] = &["wsfunction", "wstoken", "moodlewsrestformat"];

#[derive(Clone)]
pub struct GatewayState {
    pub registry: FunctionRegistry,
    pub request_timeout: Option<Duration>,
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/functions", get(list_functions))
        .route("/functions/{name}", post(call_function_json))
        .route("/webservice/rest/server.php", post(call_function_rest))
        .layer(Extension(Arc::new(state)))
}

/// Error body, mirroring the host web service's exception shape.
#[derive(Debug, Serialize)]
struct ErrorBody {
    exception: &'static str,
    errorcode: &'static str,
    message: String,
}

fn error_body(
    status: StatusCode,
    exception: &'static str,
    errorcode: &'static str,
    message: String,
) -> Response {
    (
        status,
        Json(ErrorBody {
            exception,
            errorcode,
            message,
        }),
    )
        .into_response()
}

fn error_response(e: &FunctionError) -> Response {
    let (status, exception) = match e {
        FunctionError::UnknownFunction(_) => (StatusCode::NOT_FOUND, "unknown_function_exception"),
        FunctionError::MissingParameter { .. }
        | FunctionError::TypeMismatch { .. }
        | FunctionError::UnexpectedParameter { .. } => {
            (StatusCode::BAD_REQUEST, "invalid_parameter_exception")
        }
        FunctionError::NotFound { .. } => (StatusCode::NOT_FOUND, "dml_missing_record_exception"),
        FunctionError::DataAccess(_) => (StatusCode::SERVICE_UNAVAILABLE, "dml_read_exception"),
        FunctionError::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, "dml_write_exception"),
        FunctionError::Operation(_) => (StatusCode::INTERNAL_SERVER_ERROR, "coding_exception"),
        FunctionError::InvalidResponse(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "invalid_response_exception")
        }
    };
    error_body(status, exception, e.error_code(), e.to_string())
}

/// A request body that could not be read as the endpoint's payload.
fn body_rejection(message: String) -> Response {
    error_body(
        StatusCode::BAD_REQUEST,
        "invalid_parameter_exception",
        "invalidparameter",
        message,
    )
}

fn json_response<T: Serialize>(value: &T) -> Response {
    match serde_json::to_value(value) {
        Ok(v) => Json(v).into_response(),
        Err(e) => {
            warn!(error = %e, "response serialization failed");
            error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                "invalid_response_exception",
                "invalidresponse",
                format!("response could not be serialized: {e}"),
            )
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn list_functions(Extension(state): Extension<Arc<GatewayState>>) -> Response {
    json_response(&state.registry.list())
}

async fn call_function_json(
    Extension(state): Extension<Arc<GatewayState>>,
    Path(name): Path<String>,
    payload: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(args)) => dispatch(&state, &name, &args).await,
        Err(rejection) => body_rejection(rejection.body_text()),
    }
}

async fn call_function_rest(
    Extension(state): Extension<Arc<GatewayState>>,
    payload: Result<Form<Vec<(String, String)>>, FormRejection>,
) -> Response {
    let fields = match payload {
        Ok(Form(fields)) => fields,
        Err(rejection) => return body_rejection(rejection.body_text()),
    };

    let mut names = fields.iter().filter(|(k, _)| k == "wsfunction").map(|(_, v)| v);
    let name = match (names.next(), names.next()) {
        (Some(name), None) => name.clone(),
        (None, _) => {
            return error_response(&FunctionError::MissingParameter {
                name: "wsfunction".to_string(),
            });
        }
        (Some(_), Some(_)) => {
            return error_response(&FunctionError::TypeMismatch {
                name: "wsfunction".to_string(),
                expected: ParamKind::Text,
                got: "repeated value".to_string(),
            });
        }
    };

    dispatch(&state, &name, &rest_arguments(fields)).await
}

/// Form fields as string arguments. A repeated key becomes an array of its values so the
/// validator rejects it instead of one value silently winning.
fn rest_arguments(fields: Vec<(String, String)>) -> Map<String, Value> {
    let mut args = Map::new();
    for (k, v) in fields {
        if REST_CONTROL_FIELDS.contains(&k.as_str()) {
            continue;
        }
        match args.entry(k) {
            Entry::Vacant(e) => {
                e.insert(Value::String(v));
            }
            Entry::Occupied(mut e) => match e.get_mut() {
                Value::Array(values) => values.push(Value::String(v)),
                first => {
                    let prev = first.take();
                    *first = Value::Array(vec![prev, Value::String(v)]);
                }
            },
        }
    }
    args
}

async fn dispatch(state: &GatewayState, name: &str, args: &Map<String, Value>) -> Response {
    let call = state.registry.call(name, args);
    let outcome = match state.request_timeout {
        Some(timeout) => match tokio::time::timeout(timeout, call).await {
            Ok(r) => r,
            Err(_) => {
                warn!(function = %name, timeout_secs = timeout.as_secs(), "external function call timed out");
                return error_body(
                    StatusCode::GATEWAY_TIMEOUT,
                    "timeout_exception",
                    "timeout",
                    format!("call to '{name}' timed out after {}s", timeout.as_secs()),
                );
            }
        },
        None => call.await,
    };

    match outcome {
        Ok(v) => Json(v).into_response(),
        Err(e) => error_response(&e),
    }
}
