//! Request interceptors and their composition into one root handler.
//!
//! Both registration forms compose the same way: the first registered layer is the
//! outermost one. It sees the request first and the outcome last.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::errors::DispatchError;
use crate::features::FeatureCollection;
use crate::rpc::message::RequestMessage;

/// One request on its way through the chain.
#[derive(Debug)]
pub struct RequestContext {
    pub request: RequestMessage,
    pub features: FeatureCollection,
}

impl RequestContext {
    pub fn new(request: RequestMessage, features: FeatureCollection) -> Self {
        Self { request, features }
    }

    pub fn method(&self) -> &str {
        &self.request.method
    }
}

#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, ctx: RequestContext) -> Result<Value, DispatchError>;
}

pub type Handler = Arc<dyn RequestHandler>;

/// Wraps the next handler in the chain.
pub trait Middleware: Send + Sync {
    fn wrap(&self, next: Handler) -> Handler;
}

/// Continuation handed to function middleware.
#[derive(Clone)]
pub struct Next {
    inner: Handler,
}

impl From<Handler> for Next {
    fn from(inner: Handler) -> Self {
        Self { inner }
    }
}

impl Next {
    pub async fn run(self, ctx: RequestContext) -> Result<Value, DispatchError> {
        self.inner.handle(ctx).await
    }
}

/// Adapts `f(ctx, next)` into a [`Middleware`].
pub fn from_fn<F, Fut>(f: F) -> FnMiddleware<F>
where
    F: Fn(RequestContext, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, DispatchError>> + Send + 'static,
{
    FnMiddleware { f: Arc::new(f) }
}

pub struct FnMiddleware<F> {
    f: Arc<F>,
}

impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(RequestContext, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, DispatchError>> + Send + 'static,
{
    fn wrap(&self, next: Handler) -> Handler {
        Arc::new(FnLayer {
            f: Arc::clone(&self.f),
            next: Next { inner: next },
        })
    }
}

struct FnLayer<F> {
    f: Arc<F>,
    next: Next,
}

#[async_trait]
impl<F, Fut> RequestHandler for FnLayer<F>
where
    F: Fn(RequestContext, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, DispatchError>> + Send + 'static,
{
    async fn handle(&self, ctx: RequestContext) -> Result<Value, DispatchError> {
        (self.f)(ctx, self.next.clone()).await
    }
}

/// Turns an async closure into a terminal handler.
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, DispatchError>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> RequestHandler for FnHandler<F>
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, DispatchError>> + Send + 'static,
{
    async fn handle(&self, ctx: RequestContext) -> Result<Value, DispatchError> {
        (self.f)(ctx).await
    }
}

/// Ordered middleware registrations. `build` consumes the builder, so the composed
/// chain cannot change afterwards.
#[derive(Default)]
pub struct MiddlewareChainBuilder {
    layers: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer(mut self, middleware: impl Middleware + 'static) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    pub fn layer_fn<F, Fut>(self, f: F) -> Self
    where
        F: Fn(RequestContext, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, DispatchError>> + Send + 'static,
    {
        self.layer(from_fn(f))
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Folds right to left so the first registration ends up outermost.
    pub fn build(self, terminal: Handler) -> Handler {
        debug!(layers = self.layers.len(), "middleware chain composed");
        self.layers
            .iter()
            .rev()
            .fold(terminal, |next, middleware| middleware.wrap(next))
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use serde_json::{json, Map};

    use super::*;

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Recording {
        label: &'static str,
        journal: Journal,
    }

    impl Middleware for Recording {
        fn wrap(&self, next: Handler) -> Handler {
            let label = self.label;
            let journal = Arc::clone(&self.journal);
            let next = Next { inner: next };
            handler_fn(move |ctx| {
                let journal = Arc::clone(&journal);
                let next = next.clone();
                async move {
                    journal.lock().push(format!("in:{label}"));
                    let outcome = next.run(ctx).await;
                    journal.lock().push(format!("out:{label}"));
                    outcome
                }
            })
        }
    }

    fn recording(label: &'static str, journal: &Journal) -> Recording {
        Recording {
            label,
            journal: Arc::clone(journal),
        }
    }

    fn layer_recording_fn(
        builder: MiddlewareChainBuilder,
        label: &'static str,
        journal: &Journal,
    ) -> MiddlewareChainBuilder {
        let journal = Arc::clone(journal);
        builder.layer_fn(move |ctx, next| {
            let journal = Arc::clone(&journal);
            async move {
                journal.lock().push(format!("in:{label}"));
                let outcome = next.run(ctx).await;
                journal.lock().push(format!("out:{label}"));
                outcome
            }
        })
    }

    fn terminal(journal: &Journal) -> Handler {
        let journal = Arc::clone(journal);
        handler_fn(move |ctx| {
            let journal = Arc::clone(&journal);
            async move {
                journal.lock().push("target".to_string());
                Ok(json!(ctx.method()))
            }
        })
    }

    fn context(method: &str) -> RequestContext {
        RequestContext::new(
            RequestMessage::new(method, Map::new(), None),
            FeatureCollection::new(),
        )
    }

    #[tokio::test]
    async fn first_registered_layer_is_outermost() {
        let journal = Journal::default();
        let root = MiddlewareChainBuilder::new()
            .layer(recording("A", &journal))
            .layer(recording("B", &journal))
            .layer(recording("C", &journal))
            .build(terminal(&journal));

        let result = root.handle(context("ping")).await.expect("chain succeeds");

        assert_eq!(result, json!("ping"));
        assert_eq!(
            *journal.lock(),
            ["in:A", "in:B", "in:C", "target", "out:C", "out:B", "out:A"]
        );
    }

    #[tokio::test]
    async fn function_layers_follow_registration_order() {
        let journal = Journal::default();
        let builder = layer_recording_fn(MiddlewareChainBuilder::new(), "A", &journal);
        let root = layer_recording_fn(builder, "B", &journal).build(terminal(&journal));

        root.handle(context("ping")).await.expect("chain succeeds");

        assert_eq!(*journal.lock(), ["in:A", "in:B", "target", "out:B", "out:A"]);
    }

    #[tokio::test]
    async fn mixed_forms_share_one_ordering() {
        let journal = Journal::default();
        let builder = layer_recording_fn(MiddlewareChainBuilder::new(), "A", &journal)
            .layer(recording("B", &journal));
        let root = layer_recording_fn(builder, "C", &journal).build(terminal(&journal));

        root.handle(context("ping")).await.expect("chain succeeds");

        assert_eq!(
            *journal.lock(),
            ["in:A", "in:B", "in:C", "target", "out:C", "out:B", "out:A"]
        );
    }

    #[tokio::test]
    async fn layer_can_short_circuit() {
        let journal = Journal::default();
        let root = MiddlewareChainBuilder::new()
            .layer_fn(|_ctx, _next| async { Ok(json!("cached")) })
            .layer(recording("inner", &journal))
            .build(terminal(&journal));

        let result = root.handle(context("ping")).await.expect("short circuit");

        assert_eq!(result, json!("cached"));
        assert!(journal.lock().is_empty());
    }

    #[tokio::test]
    async fn failures_propagate_through_outer_layers() {
        let journal = Journal::default();
        let failing = handler_fn(|_ctx| async { Err(DispatchError::internal("boom")) });
        let root = MiddlewareChainBuilder::new()
            .layer(recording("A", &journal))
            .layer_fn(|ctx, next| async move {
                next.run(ctx)
                    .await
                    .map_err(|err| DispatchError::middleware(anyhow::anyhow!("wrapped: {err}")))
            })
            .build(failing);

        let err = root.handle(context("ping")).await.expect_err("failure");

        assert!(err.to_string().contains("wrapped: internal error: boom"));
        assert_eq!(*journal.lock(), ["in:A", "out:A"]);
    }

    #[tokio::test]
    async fn empty_chain_is_the_terminal_handler() {
        let journal = Journal::default();
        let builder = MiddlewareChainBuilder::new();
        assert!(builder.is_empty());

        let root = builder.build(terminal(&journal));
        assert_eq!(root.handle(context("echo")).await.expect("terminal"), json!("echo"));
    }
}
