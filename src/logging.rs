use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::middleware::{handler_fn, Handler, Middleware, Next as RpcNext};

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started_at = Instant::now();

    let response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = started_at.elapsed().as_millis();

    info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        duration_ms = elapsed_ms,
        "request summary"
    );

    if status.is_server_error() {
        warn!(method = %method, path = %path, status = status.as_u16(), "server error");
    }

    response
}

/// Logs every call that passes through the dispatch chain, with sensitive params redacted.
#[derive(Debug, Default, Clone, Copy)]
pub struct AuditMiddleware;

impl Middleware for AuditMiddleware {
    fn wrap(&self, next: Handler) -> Handler {
        let next = RpcNext::from(next);
        handler_fn(move |ctx| {
            let next = next.clone();
            async move {
                let method = ctx.request.method.clone();
                let id = ctx.request.id.clone();
                let params = redact_audit_params(ctx.request.params.as_ref());
                let started_at = Instant::now();

                let outcome = next.run(ctx).await;

                info!(
                    method = %method,
                    id = ?id,
                    params = %params,
                    outcome = if outcome.is_ok() { "success" } else { "failure" },
                    duration_ms = started_at.elapsed().as_millis(),
                    "rpc call audited"
                );
                outcome
            }
        })
    }
}

pub fn redact_audit_params(params: Option<&Value>) -> Value {
    params.map(redact_audit_value).unwrap_or(Value::Null)
}

pub fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "authorization" | "bearer" | "api_key" | "apikey"
    ) || ["token", "secret", "password", "credential"]
        .iter()
        .any(|fragment| normalized.contains(fragment))
}
