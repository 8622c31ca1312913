use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

pub mod config;
pub mod contract;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod features;
pub mod http;
pub mod logging;
pub mod middleware;
pub mod registry;
pub mod rpc;
pub mod service;

use contract::ConverterRegistry;
use dispatch::{DispatchOptions, Dispatcher, DispatcherBuilder};
use errors::ConfigurationError;
use registry::{MethodNaming, MethodRegistryBuilder};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

/// Registers the bundled services and wraps dispatch in the audit middleware.
pub fn build_dispatcher(
    naming: MethodNaming,
    options: DispatchOptions,
) -> Result<Dispatcher, ConfigurationError> {
    let builder =
        MethodRegistryBuilder::new(ConverterRegistry::with_defaults()).with_naming(naming);
    domain::register_services(&builder)?;
    let registry = builder.build()?;

    Ok(
        DispatcherBuilder::new(registry, Arc::new(domain::service_container()))
            .layer(logging::AuditMiddleware)
            .options(options)
            .build(),
    )
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(http::handlers::health))
        .route("/.well-known/rpc", get(http::handlers::discovery))
        .route("/rpc", post(http::handlers::rpc_endpoint))
        .layer(axum::middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;

    fn app_with(naming: MethodNaming) -> Router {
        let dispatcher =
            build_dispatcher(naming, DispatchOptions::default()).expect("dispatcher builds");
        build_app(AppState::new(Arc::new(dispatcher)))
    }

    fn app() -> Router {
        app_with(MethodNaming::AsDeclared)
    }

    async fn post_rpc(app: Router, body: &str) -> (StatusCode, Option<Value>) {
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/rpc")
                    .method("POST")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        if body.is_empty() {
            return (status, None);
        }
        let body_json = serde_json::from_slice(&body).expect("valid json response");
        (status, Some(body_json))
    }

    async fn call(body: &str) -> Value {
        let (status, body) = post_rpc(app(), body).await;
        assert_eq!(status, StatusCode::OK);
        body.expect("response body")
    }

    #[tokio::test]
    async fn health_is_ok() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .method("GET")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        assert_eq!(body, "{\"status\":\"ok\"}");
    }

    #[tokio::test]
    async fn discovery_lists_methods_without_ambient_params() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/.well-known/rpc")
                    .method("GET")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        let body_json: Value = serde_json::from_slice(&body).expect("valid json response");

        assert_eq!(body_json["rpc_endpoint"], "/rpc");
        let methods = body_json["methods"].as_array().expect("methods array");
        let wait = methods
            .iter()
            .find(|method| method["name"] == "wait")
            .expect("wait listed");
        assert_eq!(wait["params"], json!([{"name": "ms", "type": "int", "optional": false}]));
        let greet = methods
            .iter()
            .find(|method| method["name"] == "greet")
            .expect("greet listed");
        assert_eq!(greet["params"][1]["optional"], json!(true));
    }

    #[tokio::test]
    async fn add_returns_result() {
        let body = call(r#"{"jsonrpc":"2.0","id":1,"method":"add","params":{"a":1,"b":2}}"#).await;

        assert_eq!(body, json!({"jsonrpc": "2.0", "id": 1, "result": 3}));
    }

    #[tokio::test]
    async fn greet_uses_target_default() {
        let body = call(r#"{"jsonrpc":"2.0","id":2,"method":"greet","params":{"name":"Ann"}}"#).await;

        assert_eq!(body["result"], "Hello, Ann!");
    }

    #[tokio::test]
    async fn unknown_method_returns_method_not_found() {
        let body = call(r#"{"jsonrpc":"2.0","id":1,"method":"Foo"}"#).await;

        assert_eq!(body["error"]["code"], -32601);
        assert_eq!(body["error"]["message"], "Method not found");
        assert_eq!(body["id"], 1);
    }

    #[tokio::test]
    async fn missing_parameter_returns_invalid_params() {
        let body = call(r#"{"jsonrpc":"2.0","id":3,"method":"add","params":{"a":1}}"#).await;

        assert_eq!(body["error"]["code"], -32602);
        assert_eq!(
            body["error"]["data"]["message"],
            "missing required parameter b for method add"
        );
    }

    #[tokio::test]
    async fn wrong_type_reports_parameter_context() {
        let body = call(r#"{"jsonrpc":"2.0","id":4,"method":"sum","params":{"values":[1.0,"x"]}}"#).await;

        assert_eq!(body["error"]["code"], -32602);
        assert_eq!(body["error"]["data"]["parameter"], "values");
        assert_eq!(body["error"]["data"]["method"], "sum");
    }

    #[tokio::test]
    async fn structured_target_error_reaches_the_wire() {
        let body = call(r#"{"jsonrpc":"2.0","id":5,"method":"divide","params":{"a":1,"b":0}}"#).await;

        assert_eq!(
            body["error"],
            json!({"code": -32000, "message": "division by zero", "data": {"a": 1, "b": 0}})
        );
    }

    #[tokio::test]
    async fn nullable_and_list_results_convert() {
        let empty = call(r#"{"jsonrpc":"2.0","id":6,"method":"latest","params":{"times":[]}}"#).await;
        assert_eq!(empty["result"], Value::Null);

        let latest = call(
            r#"{"jsonrpc":"2.0","id":7,"method":"latest","params":{"times":["2026-02-27T01:00:00Z","2026-02-27T03:00:00.000Z"]}}"#,
        )
        .await;
        assert_eq!(latest["result"], "2026-02-27T03:00:00.000Z");
    }

    #[tokio::test]
    async fn extension_data_reaches_the_target() {
        let body = call(
            r#"{"jsonrpc":"2.0","id":8,"method":"profile","params":{"name":"Ann","team":"core"}}"#,
        )
        .await;

        assert_eq!(body["result"], json!({"name": "Ann", "extra": {"team": "core"}}));
    }

    #[tokio::test]
    async fn null_id_request_is_answered() {
        let body = call(r#"{"jsonrpc":"2.0","id":null,"method":"add","params":{"a":1,"b":2}}"#).await;

        assert_eq!(body, json!({"jsonrpc": "2.0", "id": null, "result": 3}));
    }

    #[tokio::test]
    async fn notification_returns_no_content() {
        let (status, body) = post_rpc(
            app(),
            r#"{"jsonrpc":"2.0","method":"record_visit","params":{"name":"Ann"}}"#,
        )
        .await;

        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_none());
    }

    #[tokio::test]
    async fn batch_keeps_only_request_responses() {
        let (status, body) = post_rpc(
            app(),
            r#"[
                {"jsonrpc":"2.0","id":1,"method":"add","params":{"a":2,"b":3}},
                {"jsonrpc":"2.0","method":"record_visit","params":{"name":"Ann"}},
                {"jsonrpc":"2.0","id":2,"method":"Foo"}
            ]"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let responses = body.expect("batch body");
        let responses = responses.as_array().expect("array");
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["result"], 5);
        assert_eq!(responses[1]["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn batch_of_notifications_returns_no_content() {
        let (status, body) = post_rpc(
            app(),
            r#"[{"jsonrpc":"2.0","method":"record_visit","params":{"name":"Ann"}}]"#,
        )
        .await;

        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_none());
    }

    #[tokio::test]
    async fn empty_batch_is_invalid_request() {
        let body = call("[]").await;

        assert_eq!(body[0]["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn malformed_json_is_parse_error() {
        let body = call(r#"{"jsonrpc":"2.0","#).await;

        assert_eq!(body["error"]["code"], -32700);
        assert_eq!(body["id"], Value::Null);
    }

    #[tokio::test]
    async fn camel_case_naming_renames_methods() {
        let (_, body) = post_rpc(
            app_with(MethodNaming::CamelCase),
            r#"{"jsonrpc":"2.0","id":9,"method":"recordVisit","params":{"name":"Ann"}}"#,
        )
        .await;

        assert_eq!(body.expect("response")["result"], Value::Null);
    }

    #[tokio::test]
    async fn rpc_requires_post() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/rpc")
                    .method("GET")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
