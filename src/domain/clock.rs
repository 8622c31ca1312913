//! Timestamp arithmetic over RFC 3339 UTC values.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use crate::contract::{Arguments, TypeTag};
use crate::errors::{InvocationError, RpcException};
use crate::rpc::message::error_codes;
use crate::service::{MethodSpec, ServiceDefinition};

#[derive(Debug, Default)]
pub struct Clock;

impl Clock {
    pub fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    pub fn shift(&self, at: DateTime<Utc>, seconds: i64) -> Result<DateTime<Utc>, RpcException> {
        Duration::try_seconds(seconds)
            .and_then(|delta| at.checked_add_signed(delta))
            .ok_or_else(|| {
                RpcException::new(error_codes::INVALID_PARAMS, "timestamp out of range")
                    .with_data(json!({ "seconds": seconds }))
            })
    }

    /// Most recent of `times`, or `None` for an empty list.
    pub fn latest(&self, times: &[DateTime<Utc>]) -> Option<DateTime<Utc>> {
        times.iter().max().copied()
    }
}

pub fn definition() -> ServiceDefinition<Clock> {
    ServiceDefinition::new()
        .method(MethodSpec::new("now").returns(TypeTag::Timestamp), now)
        .method(
            MethodSpec::new("shift")
                .param("at", TypeTag::Timestamp)
                .param("seconds", TypeTag::Int)
                .returns(TypeTag::Timestamp),
            shift,
        )
        .method(
            MethodSpec::new("latest")
                .param("times", TypeTag::list_of(TypeTag::Timestamp))
                .returns(TypeTag::nullable(TypeTag::Timestamp)),
            latest,
        )
}

async fn now(clock: Arc<Clock>, _args: Arguments) -> Result<DateTime<Utc>, InvocationError> {
    Ok(clock.now())
}

async fn shift(clock: Arc<Clock>, args: Arguments) -> Result<DateTime<Utc>, InvocationError> {
    Ok(clock.shift(args.required(0)?, args.required(1)?)?)
}

async fn latest(clock: Arc<Clock>, args: Arguments) -> Result<Option<DateTime<Utc>>, InvocationError> {
    let times: Vec<DateTime<Utc>> = args.required(0)?;
    Ok(clock.latest(&times))
}
