use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::kernel::context::Kernel;
use crate::kernel::error::Result;
use crate::registry::Token;
use crate::registry::catalog::ErasedAction;

/// Something an event listener invokes.
///
/// `call` runs in the emitting context. `call_isolated` runs in a fresh fork
/// and lets handlers bound to an instance resolve their own copy there.
pub trait Handler: Send + Sync {
    fn call(&self, cx: &Kernel, data: Value) -> BoxFuture<'static, Result<Value>>;

    fn call_isolated(&self, fork: &Kernel, data: Value) -> BoxFuture<'static, Result<Value>> {
        self.call(fork, data)
    }

    /// True if the handler already forks per invocation.
    fn forks(&self) -> bool {
        false
    }
}

/// Strategy running `handler` inside a per-invocation fork.
pub fn isolate(handler: Arc<dyn Handler>) -> Arc<dyn Handler> {
    if handler.forks() {
        handler
    } else {
        Arc::new(ForkingHandler::new(handler))
    }
}

/// Closure registered through `Kernel::on`.
pub struct FnHandler<F> {
    f: F,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(Kernel, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Kernel, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    fn call(&self, cx: &Kernel, data: Value) -> BoxFuture<'static, Result<Value>> {
        (self.f)(cx.clone(), data).boxed()
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

/// Component method bound to the instance it was subscribed for.
pub struct BoundHandler {
    token: Token,
    property: String,
    instance: Arc<dyn Any + Send + Sync>,
    action: ErasedAction,
}

impl BoundHandler {
    pub(crate) fn new(
        token: Token,
        property: String,
        instance: Arc<dyn Any + Send + Sync>,
        action: ErasedAction,
    ) -> Self {
        Self {
            token,
            property,
            instance,
            action,
        }
    }
}

impl Handler for BoundHandler {
    fn call(&self, cx: &Kernel, data: Value) -> BoxFuture<'static, Result<Value>> {
        (self.action)(self.instance.clone(), cx.clone(), data)
    }

    fn call_isolated(&self, fork: &Kernel, data: Value) -> BoxFuture<'static, Result<Value>> {
        match fork.resolve_token(self.token, None) {
            Ok(instance) => (self.action)(instance.concrete(), fork.clone(), data),
            Err(e) => async move { Err(e) }.boxed(),
        }
    }
}

impl fmt::Debug for BoundHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundHandler")
            .field("token", &self.token)
            .field("property", &self.property)
            .finish_non_exhaustive()
    }
}

/// Forks the emitting context for every invocation of the wrapped handler.
pub struct ForkingHandler {
    inner: Arc<dyn Handler>,
}

impl ForkingHandler {
    pub fn new(inner: Arc<dyn Handler>) -> Self {
        Self { inner }
    }
}

impl Handler for ForkingHandler {
    fn call(&self, cx: &Kernel, data: Value) -> BoxFuture<'static, Result<Value>> {
        let fork = cx.fork(None);
        log::debug!("Dispatching into fork {}", fork.id());
        self.inner.call_isolated(&fork, data)
    }

    fn call_isolated(&self, fork: &Kernel, data: Value) -> BoxFuture<'static, Result<Value>> {
        self.inner.call_isolated(fork, data)
    }

    fn forks(&self) -> bool {
        true
    }
}

impl fmt::Debug for ForkingHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForkingHandler").finish_non_exhaustive()
    }
}
