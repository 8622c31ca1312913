//! Binds the registry, the composed middleware chain and the shared feature layer into
//! one request → response function.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::contract::Marshaler;
use crate::errors::{DispatchError, InvalidRequest};
use crate::features::{CallMetadata, Feature, FeatureCollection};
use crate::middleware::{Handler, Middleware, MiddlewareChainBuilder, Next, RequestContext, RequestHandler};
use crate::registry::MethodRegistry;
use crate::rpc::message::{RequestMessage, ResponseMessage};
use crate::service::ServiceFactory;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Attach generic failure text under `error.data.details`.
    pub expose_error_details: bool,
}

pub struct DispatcherBuilder {
    registry: Arc<MethodRegistry>,
    base_features: FeatureCollection,
    chain: MiddlewareChainBuilder,
    options: DispatchOptions,
}

impl DispatcherBuilder {
    pub fn new(registry: MethodRegistry, services: Arc<dyn ServiceFactory>) -> Self {
        let mut base_features = FeatureCollection::new();
        base_features.insert(Feature::Services(services));
        Self {
            registry: Arc::new(registry),
            base_features,
            chain: MiddlewareChainBuilder::new(),
            options: DispatchOptions::default(),
        }
    }

    pub fn layer(mut self, middleware: impl Middleware + 'static) -> Self {
        self.chain = self.chain.layer(middleware);
        self
    }

    pub fn layer_fn<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(RequestContext, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, DispatchError>> + Send + 'static,
    {
        self.chain = self.chain.layer_fn(f);
        self
    }

    /// Adds a feature every request can read through its base layer.
    pub fn feature(mut self, feature: Feature) -> Self {
        self.base_features.insert(feature);
        self
    }

    pub fn options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Dispatcher {
        let terminal: Handler = Arc::new(MethodDispatchHandler {
            registry: Arc::clone(&self.registry),
        });
        Dispatcher {
            registry: self.registry,
            root: self.chain.build(terminal),
            base_features: Arc::new(self.base_features),
            options: self.options,
        }
    }
}

pub struct Dispatcher {
    registry: Arc<MethodRegistry>,
    root: Handler,
    base_features: Arc<FeatureCollection>,
    options: DispatchOptions,
}

impl Dispatcher {
    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    /// Runs one request through the chain. Notifications never produce a response,
    /// even when they fail.
    pub async fn dispatch(
        &self,
        request: RequestMessage,
        cancellation: CancellationToken,
    ) -> Option<ResponseMessage> {
        let id = request.id.clone();
        let method = request.method.clone();
        let notification = request.is_notification();

        let mut features = FeatureCollection::layered_on(Arc::clone(&self.base_features));
        features.insert(Feature::Cancellation(cancellation));
        features.insert(Feature::CallMetadata(CallMetadata {
            method: method.clone(),
            id: id.clone(),
        }));

        let response = match self.root.handle(RequestContext::new(request, features)).await {
            Ok(result) => ResponseMessage::success(id, result),
            Err(err) => {
                if err.is_internal() {
                    error!(method = %method, error = %err, "rpc dispatch failed");
                } else {
                    debug!(method = %method, error = %err, "rpc request rejected");
                }
                ResponseMessage::error(id, err.to_error_object(self.options.expose_error_details))
            }
        };

        (!notification).then_some(response)
    }
}

/// Innermost handler: lookup, unmarshal, resolve the instance, invoke, marshal the result.
struct MethodDispatchHandler {
    registry: Arc<MethodRegistry>,
}

#[async_trait]
impl RequestHandler for MethodDispatchHandler {
    async fn handle(&self, ctx: RequestContext) -> Result<Value, DispatchError> {
        let RequestContext { request, features } = ctx;
        let descriptor = self
            .registry
            .get(&request.method)
            .cloned()
            .ok_or_else(|| InvalidRequest::MethodNotFound {
                method: request.method.clone(),
            })?;

        let marshaler = Marshaler::new(&descriptor);
        let args = marshaler.unmarshal(&request, &features)?;

        let instance = features
            .services()
            .and_then(|services| services.resolve(&descriptor.service))
            .ok_or_else(|| {
                DispatchError::internal(format!(
                    "no instance available for service {}",
                    descriptor.service.type_name
                ))
            })?;

        let result = descriptor
            .invoker
            .invoke(instance, args)
            .await
            .map_err(|error| DispatchError::Target {
                method: descriptor.name.clone(),
                error,
            })?;

        marshaler.marshal_result(&result).map_err(|err| {
            DispatchError::internal(format!("cannot marshal result of {}: {err}", descriptor.name))
        })
    }
}
