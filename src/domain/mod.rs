//! Sample services exposed over JSON-RPC
//!
//! The binary registers these so the dispatch core can be exercised end to end.

pub mod calculator;
pub mod clock;
pub mod greeter;

use std::sync::Arc;

use crate::errors::ConfigurationError;
use crate::registry::MethodRegistryBuilder;
use crate::service::ServiceContainer;

pub use calculator::Calculator;
pub use clock::Clock;
pub use greeter::Greeter;

pub fn register_services(builder: &MethodRegistryBuilder) -> Result<(), ConfigurationError> {
    builder.register_service(calculator::definition())?;
    builder.register_service(clock::definition())?;
    builder.register_service(greeter::definition())?;
    Ok(())
}

pub fn service_container() -> ServiceContainer {
    ServiceContainer::new()
        .with(Arc::new(Calculator))
        .with(Arc::new(Clock))
        .with(Arc::new(Greeter::default()))
}
