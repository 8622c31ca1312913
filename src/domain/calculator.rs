//! Integer and float arithmetic, plus a cancellable wait.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::contract::{Arguments, TypeTag};
use crate::errors::{InvocationError, RpcException};
use crate::rpc::message::error_codes;
use crate::service::{MethodSpec, ServiceDefinition};

pub const DIVISION_BY_ZERO: i64 = -32000;
pub const ARITHMETIC_OVERFLOW: i64 = -32001;

#[derive(Debug, Default)]
pub struct Calculator;

impl Calculator {
    pub fn add(&self, a: i64, b: i64) -> Result<i64, RpcException> {
        a.checked_add(b).ok_or_else(|| overflow(a, b))
    }

    pub fn divide(&self, a: i64, b: i64) -> Result<i64, RpcException> {
        if b == 0 {
            return Err(RpcException::new(DIVISION_BY_ZERO, "division by zero")
                .with_data(json!({ "a": a, "b": b })));
        }
        a.checked_div(b).ok_or_else(|| overflow(a, b))
    }

    pub fn sum(&self, values: &[f64]) -> f64 {
        values.iter().sum()
    }

    /// Sleeps for `ms` unless `cancel` fires first.
    pub async fn wait(&self, ms: u64, cancel: CancellationToken) -> Result<u64, InvocationError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(InvocationError::Cancelled),
            _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(ms),
        }
    }
}

fn overflow(a: i64, b: i64) -> RpcException {
    RpcException::new(ARITHMETIC_OVERFLOW, "arithmetic overflow").with_data(json!({ "a": a, "b": b }))
}

pub fn definition() -> ServiceDefinition<Calculator> {
    ServiceDefinition::new()
        .method(
            MethodSpec::new("add")
                .param("a", TypeTag::Int)
                .param("b", TypeTag::Int)
                .returns(TypeTag::Int),
            add,
        )
        .method(
            MethodSpec::new("divide")
                .param("a", TypeTag::Int)
                .param("b", TypeTag::Int)
                .returns(TypeTag::Int),
            divide,
        )
        .method(
            MethodSpec::new("sum")
                .param("values", TypeTag::list_of(TypeTag::Float))
                .returns(TypeTag::Float),
            sum,
        )
        .method(
            MethodSpec::new("wait")
                .param("ms", TypeTag::Int)
                .cancellation("cancel")
                .returns(TypeTag::Int),
            wait,
        )
}

async fn add(calculator: Arc<Calculator>, args: Arguments) -> Result<i64, InvocationError> {
    Ok(calculator.add(args.required(0)?, args.required(1)?)?)
}

async fn divide(calculator: Arc<Calculator>, args: Arguments) -> Result<i64, InvocationError> {
    Ok(calculator.divide(args.required(0)?, args.required(1)?)?)
}

async fn sum(calculator: Arc<Calculator>, args: Arguments) -> Result<f64, InvocationError> {
    let values: Vec<f64> = args.required(0)?;
    Ok(calculator.sum(&values))
}

async fn wait(calculator: Arc<Calculator>, args: Arguments) -> Result<i64, InvocationError> {
    let ms: i64 = args.required(0)?;
    let ms = u64::try_from(ms).map_err(|_| {
        RpcException::new(error_codes::INVALID_PARAMS, "ms must not be negative")
            .with_data(json!({ "ms": ms }))
    })?;
    let waited = calculator.wait(ms, args.cancellation(1)).await?;
    Ok(i64::try_from(waited).unwrap_or(i64::MAX))
}
