//! # Tessel Event Bus
//!
//! Per-context publish/subscribe registry behind `Kernel::on` and
//! `Kernel::emit`.
//!
//! - Listeners match on exact keys and fire in registration order.
//! - `unique` listeners are removed *before* they are invoked, so they fire at
//!   most once even if the handler is slow, fails or re-emits.
//! - All handlers of one emission start back-to-back and are joined; a failing
//!   or panicking handler only turns its own slot of the result vector into an
//!   `Err`.
//! - With `fork`, every invocation runs in a fresh fork of the emitting context
//!   (see [`handler::ForkingHandler`]).
pub mod error;
pub mod handler;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::{any::Any, fmt};

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::kernel::context::{Kernel, WeakKernel};
use crate::kernel::error::{Error, Result};

pub use error::EventSystemError;
pub use handler::{BoundHandler, FnHandler, ForkingHandler, Handler, isolate};

/// Type for listener identifiers
pub type ListenerId = u64;

/// Options for `Kernel::on_with`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenOptions {
    /// Remove the listener before its first invocation.
    pub unique: bool,
    /// Always run in a per-invocation fork.
    pub fork: bool,
}

impl ListenOptions {
    pub fn unique() -> Self {
        Self {
            unique: true,
            fork: false,
        }
    }

    pub fn forked() -> Self {
        Self {
            unique: false,
            fork: true,
        }
    }
}

/// Options for `Kernel::emit`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitOptions {
    /// Bubble the emission up to the parent context and append its results.
    pub parent: bool,
    /// Run every handler in its own fork of the emitting context.
    pub fork: bool,
}

impl EmitOptions {
    pub fn forked() -> Self {
        Self {
            parent: false,
            fork: true,
        }
    }

    pub fn bubbling() -> Self {
        Self {
            parent: true,
            fork: false,
        }
    }
}

struct Listener {
    id: ListenerId,
    key: String,
    unique: bool,
    handler: Arc<dyn Handler>,
}

/// Listener registry of one context.
pub struct EventBus {
    listeners: Mutex<Vec<Listener>>,
    next_id: AtomicU64,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count(None))
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self, key: &str, handler: Arc<dyn Handler>, options: ListenOptions) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handler = if options.fork { isolate(handler) } else { handler };
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.push(Listener {
            id,
            key: key.to_string(),
            unique: options.unique,
            handler,
        });
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        listeners.len() < before
    }

    /// Handlers for `key` in registration order; unique ones are deregistered.
    pub fn take_matching(&self, key: &str) -> Vec<Arc<dyn Handler>> {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let matching = listeners
            .iter()
            .filter(|l| l.key == key)
            .map(|l| l.handler.clone())
            .collect();
        listeners.retain(|l| !(l.unique && l.key == key));
        matching
    }

    /// Number of listeners, optionally only those for `key`.
    pub fn listener_count(&self, key: Option<&str>) -> usize {
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        match key {
            Some(key) => listeners.iter().filter(|l| l.key == key).count(),
            None => listeners.len(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by `Kernel::on`. Dropping it keeps the listener registered.
#[derive(Debug, Clone)]
pub struct Observer {
    kernel: WeakKernel,
    key: String,
    id: ListenerId,
}

impl Observer {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Deregister the listener. Returns false if it was already gone.
    pub fn free(&self) -> bool {
        self.kernel
            .upgrade()
            .map(|kernel| kernel.bus().unsubscribe(self.id))
            .unwrap_or(false)
    }

    /// Resolves with the payload of the next emission of this key.
    ///
    /// The one-shot listener is registered immediately, not on first poll.
    pub fn wait(&self) -> impl Future<Output = Result<Value>> + Send + 'static {
        let (tx, rx) = oneshot::channel::<Value>();
        let key = self.key.clone();
        let registered = self.kernel.upgrade().map(|kernel| {
            let tx = Mutex::new(Some(tx));
            kernel.on_with(&key, ListenOptions::unique(), move |_, data: Value| {
                if let Some(tx) = tx.lock().unwrap_or_else(PoisonError::into_inner).take() {
                    let _ = tx.send(data.clone());
                }
                async move { Ok(data) }
            })
        });

        async move {
            if registered.is_none() {
                return Err(Error::IllegalState(format!(
                    "kernel context dropped before waiting on '{}'",
                    key
                )));
            }
            rx.await
                .map_err(|_| EventSystemError::WaitAbandoned { event: key }.into())
        }
    }
}

impl Kernel {
    /// Listen for `key` with an async closure receiving the dispatching context.
    pub fn on<F, Fut>(&self, key: &str, handler: F) -> Observer
    where
        F: Fn(Kernel, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.on_with(key, ListenOptions::default(), handler)
    }

    pub fn on_with<F, Fut>(&self, key: &str, options: ListenOptions, handler: F) -> Observer
    where
        F: Fn(Kernel, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.subscribe(key, Arc::new(FnHandler::new(handler)), options)
    }

    /// Register an arbitrary [`Handler`] strategy.
    pub fn subscribe(&self, key: &str, handler: Arc<dyn Handler>, options: ListenOptions) -> Observer {
        let id = self.bus().subscribe(key, handler, options);
        log::debug!("Listener {} registered for '{}' in context {}", id, key, self.id());
        Observer {
            kernel: self.downgrade(),
            key: key.to_string(),
            id,
        }
    }

    /// Invoke every listener for `key` and collect their results.
    ///
    /// Never fails as a whole: handler errors and panics come back as `Err`
    /// entries. With `options.parent` the emission bubbles up and the
    /// ancestors' results are appended.
    pub fn emit<'a>(
        &'a self,
        key: &'a str,
        data: Value,
        options: EmitOptions,
    ) -> BoxFuture<'a, Vec<Result<Value>>> {
        async move {
            let pending = self.dispatch(key, data.clone(), options.fork);
            log::debug!(
                "Emitting '{}' in context {} to {} listener(s)",
                key,
                self.id(),
                pending.len()
            );
            let mut results = join_all(pending).await;
            if options.parent {
                if let Some(parent) = self.parent() {
                    results.extend(parent.emit(key, data, options).await);
                }
            }
            results
        }
        .boxed()
    }

    /// Select listeners now (dropping unique ones) and return their pending invocations.
    pub(crate) fn dispatch(&self, key: &str, data: Value, fork: bool) -> Vec<BoxFuture<'static, Result<Value>>> {
        self.bus()
            .take_matching(key)
            .into_iter()
            .map(|handler| {
                let handler = if fork { isolate(handler) } else { handler };
                invoke(handler, self.clone(), key.to_string(), data.clone())
            })
            .collect()
    }

    /// Fire-and-forget emission on the current tokio runtime.
    ///
    /// Without a runtime nothing is dispatched and unique listeners stay registered.
    pub(crate) fn notify(&self, key: &str, data: Value) {
        if self.bus().listener_count(Some(key)) == 0 {
            return;
        }
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                log::warn!(
                    "No async runtime available; dropped notification for '{}' in context {}",
                    key,
                    self.id()
                );
                return;
            }
        };
        let pending = self.dispatch(key, data, false);
        let key = key.to_string();
        handle.spawn(async move {
            for result in join_all(pending).await {
                if let Err(e) = result {
                    log::warn!("Listener for '{}' failed: {}", key, e);
                }
            }
        });
    }
}

fn invoke(
    handler: Arc<dyn Handler>,
    cx: Kernel,
    key: String,
    data: Value,
) -> BoxFuture<'static, Result<Value>> {
    async move {
        let call = async { handler.call(&cx, data).await };
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(EventSystemError::HandlerPanicked {
                event: key,
                message: panic_message(panic.as_ref()),
            }
            .into()),
        }
    }
    .boxed()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
