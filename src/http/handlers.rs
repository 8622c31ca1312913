//! Axum HTTP handlers for the web server
//!
//! Provides the JSON-RPC endpoint and general metadata endpoints.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::rpc::message::error_codes;
use crate::rpc::server::{handle_json_rpc_value, json_rpc_error};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub rpc_endpoint: &'static str,
    pub methods: Vec<MethodSummary>,
}

#[derive(Debug, Serialize)]
pub struct MethodSummary {
    pub name: String,
    pub params: Vec<ParamSummary>,
    pub returns: String,
    pub notification: bool,
}

#[derive(Debug, Serialize)]
pub struct ParamSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub optional: bool,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn discovery(State(state): State<AppState>) -> Json<DiscoveryResponse> {
    let methods = state
        .dispatcher
        .registry()
        .descriptors()
        .map(|descriptor| MethodSummary {
            name: descriptor.name.clone(),
            params: descriptor
                .parameters
                .iter()
                .filter(|parameter| !parameter.is_ambient())
                .map(|parameter| ParamSummary {
                    name: parameter.name.clone(),
                    type_name: parameter.type_tag.to_string(),
                    optional: parameter.optional,
                })
                .collect(),
            returns: descriptor.returns.type_tag.to_string(),
            notification: descriptor.notification,
        })
        .collect();

    Json(DiscoveryResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        rpc_endpoint: "/rpc",
        methods,
    })
}

pub async fn rpc_endpoint(State(state): State<AppState>, body: Bytes) -> Response {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(_) => {
            return (
                StatusCode::OK,
                Json(json_rpc_error(None, error_codes::PARSE_ERROR, "Parse error")),
            )
                .into_response()
        }
    };

    // Fires when axum drops this future, e.g. after the client disconnects.
    let cancellation = CancellationToken::new();
    let _guard = cancellation.clone().drop_guard();

    if let Some(batch) = payload.as_array() {
        if batch.is_empty() {
            return (
                StatusCode::OK,
                Json(vec![json_rpc_error(
                    None,
                    error_codes::INVALID_REQUEST,
                    "Invalid Request",
                )]),
            )
                .into_response();
        }

        let mut responses = Vec::new();
        for item in batch {
            if let Some(response) =
                handle_json_rpc_value(&state.dispatcher, item.clone(), cancellation.child_token())
                    .await
            {
                responses.push(response);
            }
        }

        if responses.is_empty() {
            return StatusCode::NO_CONTENT.into_response();
        }

        return (StatusCode::OK, Json(Value::Array(responses))).into_response();
    }

    match handle_json_rpc_value(&state.dispatcher, payload, cancellation.child_token()).await {
        Some(response) => (StatusCode::OK, Json(response)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
