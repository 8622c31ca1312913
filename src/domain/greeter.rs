//! Greetings, visit counting and free-form profiles.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::contract::{Arguments, TypeTag};
use crate::errors::InvocationError;
use crate::service::{MethodSpec, ServiceDefinition};

#[derive(Debug, Default)]
pub struct Greeter {
    visits: AtomicU64,
}

impl Greeter {
    /// `shout` defaults to `false` when the caller leaves it out.
    pub fn greet(&self, name: &str, shout: Option<bool>) -> String {
        let greeting = format!("Hello, {name}!");
        if shout.unwrap_or(false) {
            greeting.to_uppercase()
        } else {
            greeting
        }
    }

    pub fn record_visit(&self, name: &str) {
        let total = self.visits.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(name = %name, total, "visit recorded");
    }

    pub fn visits(&self) -> u64 {
        self.visits.load(Ordering::Relaxed)
    }

    /// Echoes `name` alongside whatever unknown params the caller attached.
    pub fn profile(&self, name: String, extra: Option<&Map<String, Value>>) -> Value {
        json!({
            "name": name,
            "extra": extra.cloned().unwrap_or_default(),
        })
    }
}

pub fn definition() -> ServiceDefinition<Greeter> {
    ServiceDefinition::new()
        .method(
            MethodSpec::new("greet")
                .param("name", TypeTag::Text)
                .optional("shout", TypeTag::Bool)
                .returns(TypeTag::Text),
            greet,
        )
        .method(
            MethodSpec::new("record_visit")
                .param("name", TypeTag::Text)
                .notification(),
            record_visit,
        )
        .method(MethodSpec::new("visits").returns(TypeTag::Int), visits)
        .method(
            MethodSpec::new("profile")
                .param("name", TypeTag::Text)
                .returns(TypeTag::Json)
                .accepts_extension_data(),
            profile,
        )
}

async fn greet(greeter: Arc<Greeter>, args: Arguments) -> Result<String, InvocationError> {
    let name: String = args.required(0)?;
    Ok(greeter.greet(&name, args.optional(1)?))
}

async fn record_visit(greeter: Arc<Greeter>, args: Arguments) -> Result<(), InvocationError> {
    let name: String = args.required(0)?;
    greeter.record_visit(&name);
    Ok(())
}

async fn visits(greeter: Arc<Greeter>, _args: Arguments) -> Result<i64, InvocationError> {
    Ok(i64::try_from(greeter.visits()).unwrap_or(i64::MAX))
}

async fn profile(greeter: Arc<Greeter>, args: Arguments) -> Result<Value, InvocationError> {
    Ok(greeter.profile(args.required(0)?, args.extension_data()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greet_applies_own_default() {
        let greeter = Greeter::default();

        assert_eq!(greeter.greet("Ann", None), "Hello, Ann!");
        assert_eq!(greeter.greet("Ann", Some(true)), "HELLO, ANN!");
    }

    #[test]
    fn visits_accumulate() {
        let greeter = Greeter::default();
        greeter.record_visit("Ann");
        greeter.record_visit("Bob");

        assert_eq!(greeter.visits(), 2);
    }

    #[test]
    fn profile_without_extras_is_empty_object() {
        let profile = Greeter::default().profile("Ann".to_string(), None);

        assert_eq!(profile, json!({ "name": "Ann", "extra": {} }));
    }
}
