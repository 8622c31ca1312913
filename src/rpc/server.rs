//! JSON-RPC envelope handling
//!
//! Validates one decoded JSON value as a request, hands it to the dispatcher and renders
//! the response back to JSON.

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::dispatch::Dispatcher;
use crate::rpc::message::{
    error_codes, ErrorObject, RequestId, RequestMessage, ResponseMessage, JSONRPC_VERSION,
};

pub async fn handle_json_rpc_value(
    dispatcher: &Dispatcher,
    payload: Value,
    cancellation: CancellationToken,
) -> Option<Value> {
    if !payload.is_object() {
        return Some(invalid_request(None));
    }

    let request_id = payload
        .get("id")
        .cloned()
        .and_then(|id| serde_json::from_value::<RequestId>(id).ok());

    if payload.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Some(invalid_request(request_id));
    }

    let request: RequestMessage = match serde_json::from_value(payload) {
        Ok(request) => request,
        Err(_) => return Some(invalid_request(request_id)),
    };

    if request.method.trim().is_empty() {
        return (!request.is_notification()).then(|| invalid_request(request.id));
    }

    let response = dispatcher.dispatch(request, cancellation).await?;
    Some(response_to_value(&response))
}

pub fn json_rpc_error(id: Option<RequestId>, code: i64, message: &str) -> Value {
    response_to_value(&ResponseMessage::error(id, ErrorObject::new(code, message)))
}

pub fn response_to_value(response: &ResponseMessage) -> Value {
    serde_json::to_value(response).unwrap_or_else(|err| {
        warn!(error = %err, "response serialization failed");
        json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": response.id,
            "error": { "code": error_codes::INTERNAL_ERROR, "message": "Internal error" }
        })
    })
}

fn invalid_request(id: Option<RequestId>) -> Value {
    json_rpc_error(id, error_codes::INVALID_REQUEST, "Invalid Request")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::contract::{ConverterRegistry, TypeTag};
    use crate::dispatch::DispatcherBuilder;
    use crate::registry::MethodRegistryBuilder;
    use crate::service::{MethodSpec, ServiceContainer, ServiceDefinition};

    struct Echo;

    fn dispatcher() -> Dispatcher {
        let builder = MethodRegistryBuilder::new(ConverterRegistry::with_defaults());
        builder
            .register_service(ServiceDefinition::<Echo>::new().method(
                MethodSpec::new("echo")
                    .param("text", TypeTag::Text)
                    .returns(TypeTag::Text),
                |_echo, args| async move { args.required::<String>(0) },
            ))
            .expect("register echo");
        let registry = builder.build().expect("build registry");
        DispatcherBuilder::new(registry, Arc::new(ServiceContainer::new().with(Arc::new(Echo))))
            .build()
    }

    async fn handle(payload: Value) -> Option<Value> {
        handle_json_rpc_value(&dispatcher(), payload, CancellationToken::new()).await
    }

    #[tokio::test]
    async fn valid_request_is_dispatched() {
        let response = handle(json!({
            "jsonrpc": "2.0",
            "method": "echo",
            "params": {"text": "hi"},
            "id": "abc"
        }))
        .await
        .expect("response");

        assert_eq!(response, json!({"jsonrpc": "2.0", "result": "hi", "id": "abc"}));
    }

    #[tokio::test]
    async fn non_object_payload_is_invalid_request() {
        let response = handle(json!(42)).await.expect("response");

        assert_eq!(response["error"]["code"], json!(error_codes::INVALID_REQUEST));
        assert_eq!(response["id"], Value::Null);
    }

    #[tokio::test]
    async fn wrong_version_echoes_the_id() {
        let response = handle(json!({"jsonrpc": "1.0", "method": "echo", "id": 7}))
            .await
            .expect("response");

        assert_eq!(response["error"]["code"], json!(error_codes::INVALID_REQUEST));
        assert_eq!(response["id"], json!(7));
    }

    #[tokio::test]
    async fn empty_method_is_rejected_unless_notification() {
        let request = handle(json!({"jsonrpc": "2.0", "method": " ", "id": 1}))
            .await
            .expect("response");
        assert_eq!(request["error"]["code"], json!(error_codes::INVALID_REQUEST));

        assert!(handle(json!({"jsonrpc": "2.0", "method": ""})).await.is_none());
    }

    #[tokio::test]
    async fn notification_produces_nothing() {
        let response = handle(json!({
            "jsonrpc": "2.0",
            "method": "echo",
            "params": {"text": "quiet"}
        }))
        .await;

        assert!(response.is_none());
    }

    #[tokio::test]
    async fn missing_method_field_is_invalid_request() {
        let response = handle(json!({"jsonrpc": "2.0", "id": 3}))
            .await
            .expect("response");

        assert_eq!(response["error"]["code"], json!(error_codes::INVALID_REQUEST));
        assert_eq!(response["id"], json!(3));
    }

    #[test]
    fn error_helper_renders_wire_shape() {
        let value = json_rpc_error(Some(RequestId::Number(1)), error_codes::PARSE_ERROR, "Parse error");

        assert_eq!(
            value,
            json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32700, "message": "Parse error"}})
        );
    }
}
