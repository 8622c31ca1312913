use std::fmt;

use serde_json::{json, Value};
use thiserror::Error;

use crate::contract::TypeTag;
use crate::rpc::message::{error_codes, ErrorObject};

/// Raised while registering services or building the registry. Always fatal at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("method name must not be empty")]
    EmptyMethodName,
    #[error("method {method} declares a parameter with an empty name")]
    EmptyParameterName { method: String },
    #[error("method {method} is registered more than once")]
    DuplicateMethod { method: String },
    #[error("method {method} declares parameter {parameter} more than once")]
    DuplicateParameter { method: String, parameter: String },
    #[error("method {method} parameter {parameter} has no converter for type {type_tag}")]
    UnresolvedParameterType {
        method: String,
        parameter: String,
        type_tag: TypeTag,
    },
    #[error("method {method} has no converter for return type {type_tag}")]
    UnresolvedReturnType { method: String, type_tag: TypeTag },
    #[error("method {method} declares more than one cancellation parameter")]
    MultipleAmbientParameters { method: String },
    #[error("notification method {method} must not return a value")]
    NotificationWithResult { method: String },
    #[error("no converter registered for type {type_tag}")]
    UnresolvedType { type_tag: TypeTag },
    #[error("registry is already built; registrations are closed")]
    RegistryFrozen,
}

/// A converter could not map between a JSON value and the declared type.
#[derive(Debug, Clone, Error, PartialEq)]
pub struct ConversionError {
    pub expected: String,
    pub received: Value,
    pub parameter: Option<String>,
    pub method: Option<String>,
}

impl ConversionError {
    pub fn new(expected: impl ToString, received: Value) -> Self {
        Self {
            expected: expected.to_string(),
            received,
            parameter: None,
            method: None,
        }
    }

    pub fn in_parameter(mut self, parameter: &str, method: &str) -> Self {
        self.parameter = Some(parameter.to_string());
        self.method = Some(method.to_string());
        self
    }

    pub fn in_result(mut self, method: &str) -> Self {
        self.method = Some(method.to_string());
        self
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot convert {} to {}", self.received, self.expected)?;
        if let Some(parameter) = &self.parameter {
            write!(f, " for parameter {parameter}")?;
        }
        if let Some(method) = &self.method {
            write!(f, " of method {method}")?;
        }
        Ok(())
    }
}

/// The request does not fit the method contract.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvalidRequest {
    #[error("method {method} not found")]
    MethodNotFound { method: String },
    #[error("missing required parameter {parameter} for method {method}")]
    MissingParameter { parameter: String, method: String },
    #[error("malformed params for method {method}: {reason}")]
    MalformedParams { method: String, reason: String },
    #[error("method {method} takes {expected} arguments, {supplied} supplied")]
    TooManyArguments {
        method: String,
        expected: usize,
        supplied: usize,
    },
    #[error("parameter {parameter} of method {method} received an argument of the wrong kind")]
    ArgumentKindMismatch { parameter: String, method: String },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MarshalError {
    #[error(transparent)]
    Contract(#[from] InvalidRequest),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// Structured failure raised by a target method; surfaced to the caller as-is.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message} ({code})")]
pub struct RpcException {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl RpcException {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error(transparent)]
    Rpc(#[from] RpcException),
    #[error("request cancelled")]
    Cancelled,
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Per-request failure caught at the dispatch boundary and turned into a wire error.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    InvalidRequest(#[from] InvalidRequest),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error("method {method} failed: {error}")]
    Target {
        method: String,
        error: InvocationError,
    },
    #[error("middleware failed: {0}")]
    Middleware(anyhow::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<MarshalError> for DispatchError {
    fn from(err: MarshalError) -> Self {
        match err {
            MarshalError::Contract(err) => Self::InvalidRequest(err),
            MarshalError::Conversion(err) => Self::Conversion(err),
        }
    }
}

impl DispatchError {
    pub fn middleware(err: impl Into<anyhow::Error>) -> Self {
        Self::Middleware(err.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Structured error carried by a target or middleware failure, if any.
    pub fn rpc_exception(&self) -> Option<&RpcException> {
        match self {
            Self::Target {
                error: InvocationError::Rpc(exception),
                ..
            } => Some(exception),
            Self::Target {
                error: InvocationError::Failed(err),
                ..
            }
            | Self::Middleware(err) => err.downcast_ref::<RpcException>(),
            _ => None,
        }
    }

    pub fn is_internal(&self) -> bool {
        let opaque = matches!(
            self,
            Self::Middleware(_)
                | Self::Internal(_)
                | Self::Target {
                    error: InvocationError::Failed(_),
                    ..
                }
        );
        opaque && self.rpc_exception().is_none()
    }

    /// Wire error for this failure. Generic failure text is only attached when `expose_details` is set.
    pub fn to_error_object(&self, expose_details: bool) -> ErrorObject {
        if let Some(exception) = self.rpc_exception() {
            return ErrorObject {
                code: exception.code,
                message: exception.message.clone(),
                data: exception.data.clone(),
            };
        }

        match self {
            Self::InvalidRequest(InvalidRequest::MethodNotFound { method }) => {
                ErrorObject::new(error_codes::METHOD_NOT_FOUND, "Method not found")
                    .with_data(json!({ "method": method }))
            }
            Self::InvalidRequest(err) => {
                ErrorObject::new(error_codes::INVALID_PARAMS, "Invalid params")
                    .with_data(json!({ "message": err.to_string() }))
            }
            Self::Conversion(err) => ErrorObject::new(error_codes::INVALID_PARAMS, "Invalid params")
                .with_data(json!({
                    "message": err.to_string(),
                    "parameter": err.parameter,
                    "method": err.method,
                    "expected": err.expected,
                    "received": err.received,
                })),
            Self::Target {
                error: InvocationError::Cancelled,
                ..
            } => ErrorObject::new(error_codes::REQUEST_CANCELLED, "Request cancelled"),
            Self::Target {
                error: InvocationError::Rpc(_) | InvocationError::Failed(_),
                ..
            }
            | Self::Middleware(_)
            | Self::Internal(_) => {
                let error = ErrorObject::new(error_codes::INTERNAL_ERROR, "Internal error");
                if expose_details {
                    error.with_data(json!({ "details": self.to_string() }))
                } else {
                    error
                }
            }
        }
    }
}

/// A feature was stored under a capability it does not satisfy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid argument: {provided} does not satisfy capability {capability}")]
pub struct FeatureError {
    pub capability: String,
    pub provided: String,
}
