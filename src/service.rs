//! Service declarations and the per-call instance factory.
//!
//! A service type lists its callable methods explicitly through [`ServiceDefinition`];
//! each entry carries a typed handler that becomes the method's invocation adapter.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::contract::descriptor::{Invoker, ServiceInstance};
use crate::contract::value::{Arguments, NativeValue, TypeTag};
use crate::errors::InvocationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl ServiceKey {
    pub fn of<S: Any>() -> Self {
        Self {
            type_id: TypeId::of::<S>(),
            type_name: type_name::<S>(),
        }
    }
}

/// Resolves the target instance for a service type, once per call.
pub trait ServiceFactory: Send + Sync {
    fn resolve(&self, service: &ServiceKey) -> Option<ServiceInstance>;
}

/// Map-backed factory handing out shared singletons.
#[derive(Default, Clone)]
pub struct ServiceContainer {
    instances: HashMap<TypeId, ServiceInstance>,
}

impl ServiceContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<S: Send + Sync + 'static>(mut self, instance: Arc<S>) -> Self {
        self.insert(instance);
        self
    }

    pub fn insert<S: Send + Sync + 'static>(&mut self, instance: Arc<S>) {
        self.instances.insert(TypeId::of::<S>(), instance);
    }
}

impl ServiceFactory for ServiceContainer {
    fn resolve(&self, service: &ServiceKey) -> Option<ServiceInstance> {
        self.instances.get(&service.type_id).cloned()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub type_tag: TypeTag,
    pub optional: bool,
}

/// Declared shape of one method before converters are resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSpec {
    pub name: String,
    pub params: Vec<ParamSpec>,
    pub returns: TypeTag,
    pub notification: bool,
    pub extension_data: bool,
}

impl MethodSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: TypeTag::Unit,
            notification: false,
            extension_data: false,
        }
    }

    pub fn param(self, name: impl Into<String>, type_tag: TypeTag) -> Self {
        self.push_param(name, type_tag, false)
    }

    /// A parameter the caller may omit; the handler applies its own default.
    pub fn optional(self, name: impl Into<String>, type_tag: TypeTag) -> Self {
        self.push_param(name, type_tag, true)
    }

    /// Slot bound to the request's cancellation token instead of wire params.
    pub fn cancellation(self, name: impl Into<String>) -> Self {
        self.push_param(name, TypeTag::Cancellation, true)
    }

    pub fn returns(mut self, type_tag: TypeTag) -> Self {
        self.returns = type_tag;
        self
    }

    pub fn notification(mut self) -> Self {
        self.notification = true;
        self
    }

    pub fn accepts_extension_data(mut self) -> Self {
        self.extension_data = true;
        self
    }

    fn push_param(mut self, name: impl Into<String>, type_tag: TypeTag, optional: bool) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            type_tag,
            optional,
        });
        self
    }
}

pub(crate) struct MethodEntry {
    pub(crate) spec: MethodSpec,
    pub(crate) invoker: Arc<dyn Invoker>,
}

/// The callable surface of service type `S`.
pub struct ServiceDefinition<S> {
    pub(crate) methods: Vec<MethodEntry>,
    _service: PhantomData<fn() -> S>,
}

impl<S: Send + Sync + 'static> ServiceDefinition<S> {
    pub fn new() -> Self {
        Self {
            methods: Vec::new(),
            _service: PhantomData,
        }
    }

    pub fn key(&self) -> ServiceKey {
        ServiceKey::of::<S>()
    }

    pub fn method<F, Fut, R>(mut self, spec: MethodSpec, handler: F) -> Self
    where
        F: Fn(Arc<S>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, InvocationError>> + Send + 'static,
        R: Into<NativeValue> + Send + 'static,
    {
        self.methods.push(MethodEntry {
            spec,
            invoker: Arc::new(TypedInvoker {
                handler,
                _service: PhantomData::<fn() -> S>,
            }),
        });
        self
    }
}

impl<S: Send + Sync + 'static> Default for ServiceDefinition<S> {
    fn default() -> Self {
        Self::new()
    }
}

struct TypedInvoker<S, F> {
    handler: F,
    _service: PhantomData<fn() -> S>,
}

#[async_trait]
impl<S, F, Fut, R> Invoker for TypedInvoker<S, F>
where
    S: Send + Sync + 'static,
    F: Fn(Arc<S>, Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, InvocationError>> + Send + 'static,
    R: Into<NativeValue> + Send + 'static,
{
    async fn invoke(
        &self,
        instance: ServiceInstance,
        args: Arguments,
    ) -> Result<NativeValue, InvocationError> {
        let service = instance.downcast::<S>().map_err(|_| {
            InvocationError::Failed(anyhow::anyhow!(
                "resolved instance is not a {}",
                type_name::<S>()
            ))
        })?;
        (self.handler)(service, args).await.map(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter;

    #[test]
    fn container_resolves_by_type() {
        let container = ServiceContainer::new().with(Arc::new(Counter));

        assert!(container.resolve(&ServiceKey::of::<Counter>()).is_some());
        assert!(container.resolve(&ServiceKey::of::<String>()).is_none());
    }

    #[test]
    fn method_spec_records_declaration_order() {
        let spec = MethodSpec::new("greet")
            .param("name", TypeTag::Text)
            .optional("shout", TypeTag::Bool)
            .cancellation("cancel");

        let names: Vec<&str> = spec.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["name", "shout", "cancel"]);
        assert!(!spec.params[0].optional);
        assert!(spec.params[1].optional);
        assert_eq!(spec.params[2].type_tag, TypeTag::Cancellation);
    }

    #[tokio::test]
    async fn typed_invoker_rejects_foreign_instance() {
        let definition = ServiceDefinition::<Counter>::new()
            .method(MethodSpec::new("tick"), |_counter, _args| async {
                Ok::<_, InvocationError>(1_i64)
            });
        let invoker = Arc::clone(&definition.methods[0].invoker);

        let foreign: ServiceInstance = Arc::new(String::from("not a counter"));
        let args = Arguments::new("tick", vec![], vec![], None);
        let err = invoker.invoke(foreign, args).await.expect_err("wrong instance");
        assert!(err.to_string().contains("Counter"));
    }
}
