//! Immutable method metadata produced by the registry build.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::contract::converter::ValueConverter;
use crate::contract::value::{Arguments, NativeValue, TypeTag};
use crate::errors::InvocationError;
use crate::service::ServiceKey;

/// Target object a method is invoked on.
pub type ServiceInstance = Arc<dyn Any + Send + Sync>;

/// Typed invocation adapter for one concrete method.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(
        &self,
        instance: ServiceInstance,
        args: Arguments,
    ) -> Result<NativeValue, InvocationError>;
}

#[derive(Clone)]
pub struct ParameterContract {
    pub name: String,
    pub type_tag: TypeTag,
    pub optional: bool,
    /// `None` only for the ambient cancellation parameter.
    pub converter: Option<Arc<dyn ValueConverter>>,
}

impl ParameterContract {
    pub fn is_ambient(&self) -> bool {
        self.type_tag.is_ambient()
    }
}

impl fmt::Debug for ParameterContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterContract")
            .field("name", &self.name)
            .field("type_tag", &self.type_tag)
            .field("optional", &self.optional)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct ReturnContract {
    pub type_tag: TypeTag,
    pub converter: Arc<dyn ValueConverter>,
}

impl fmt::Debug for ReturnContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReturnContract")
            .field("type_tag", &self.type_tag)
            .finish_non_exhaustive()
    }
}

pub struct MethodDescriptor {
    pub service: ServiceKey,
    pub name: String,
    pub notification: bool,
    pub extension_data: bool,
    pub parameters: Vec<ParameterContract>,
    pub returns: ReturnContract,
    pub invoker: Arc<dyn Invoker>,
}

impl MethodDescriptor {
    pub fn parameter(&self, name: &str) -> Option<&ParameterContract> {
        self.parameters.iter().find(|parameter| parameter.name == name)
    }

    pub fn parameter_names(&self) -> Vec<String> {
        self.parameters
            .iter()
            .map(|parameter| parameter.name.clone())
            .collect()
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("service", &self.service)
            .field("name", &self.name)
            .field("notification", &self.notification)
            .field("extension_data", &self.extension_data)
            .field("parameters", &self.parameters)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}
