//! # Tessel Instance Resolver
//!
//! Builds instances for declarations and wires them into their context:
//!
//! 1. readonly state bindings are checked before anything is constructed,
//! 2. [`Component::construct`] runs with a [`Construction`] that hands out lazy
//!    [`Inject`] handles and live [`Setting`] handles,
//! 3. singletons are cached on their declaration,
//! 4. listener bindings are subscribed on the context's event bus.
pub mod inject;

use std::cell::RefCell;
use std::sync::Arc;

use crate::event::handler::BoundHandler;
use crate::kernel::context::Kernel;
use crate::kernel::error::{Error, Result};
use crate::registry::{ClassDescriptor, Descriptor, Instance, Token, Use};
use crate::state::StateSystemError;

pub use inject::{Inject, Setting};

/// A class the kernel can build.
///
/// `describe` is the static metadata pass (injection points, state bindings,
/// listeners, lifecycle); it runs once per catalog. `construct` builds a fresh
/// value and must not resolve dependencies eagerly.
pub trait Component: Send + Sync + Sized + 'static {
    fn describe(_descriptor: &mut Descriptor<Self>) {}

    fn construct(cx: &Construction<'_>) -> Result<Self>;
}

/// Context handed to [`Component::construct`].
pub struct Construction<'a> {
    kernel: &'a Kernel,
    descriptor: &'a ClassDescriptor,
    token: Token,
}

impl<'a> Construction<'a> {
    pub fn kernel(&self) -> &Kernel {
        self.kernel
    }

    pub fn descriptor(&self) -> &ClassDescriptor {
        self.descriptor
    }

    /// Token of the declaration being built.
    pub fn token(&self) -> Token {
        self.token
    }

    /// Lazy handle for a declared injection point.
    pub fn inject<T: ?Sized + Send + Sync + 'static>(&self, property: &str) -> Result<Inject<T>> {
        let point = self.descriptor.injection(property).ok_or_else(|| {
            Error::resolution(
                self.descriptor.class().name(),
                format!("no injection point named '{}'", property),
            )
        })?;
        if point.token != Token::of::<T>() {
            return Err(Error::InvalidArgument(format!(
                "injection point '{}.{}' is declared as {}, requested as {}",
                self.descriptor.class().short_name(),
                property,
                point.token,
                std::any::type_name::<T>()
            )));
        }
        Ok(Inject::new(self.kernel, self.token))
    }

    /// Live handle for a declared state binding.
    pub fn setting(&self, property: &str) -> Result<Setting> {
        let binding = self.descriptor.binding(property).ok_or_else(|| {
            Error::resolution(
                self.descriptor.class().name(),
                format!("no state binding named '{}'", property),
            )
        })?;
        Ok(Setting::new(self.kernel, binding.clone()))
    }
}

thread_local! {
    // (context address, token) pairs currently under construction on this thread
    static RESOLVING: RefCell<Vec<(usize, Token)>> = const { RefCell::new(Vec::new()) };
}

struct ResolutionGuard {
    key: (usize, Token),
}

impl ResolutionGuard {
    fn enter(kernel: &Kernel, token: Token) -> Result<Self> {
        let key = (kernel.address(), token);
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(&key) {
                let path: Vec<&str> = stack
                    .iter()
                    .filter(|(ctx, _)| *ctx == key.0)
                    .map(|(_, t)| t.short_name())
                    .collect();
                return Err(Error::resolution(
                    token.name(),
                    format!("circular construction: {} -> {}", path.join(" -> "), token.short_name()),
                ));
            }
            stack.push(key);
            Ok(Self { key })
        })
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|entry| *entry == self.key) {
                stack.remove(pos);
            }
        });
    }
}

impl Kernel {
    /// Resolve a declared token in this context.
    pub(crate) fn resolve_token(&self, token: Token, requester: Option<Token>) -> Result<Instance> {
        if token == Token::of::<Kernel>() {
            return Ok(Instance::from_value(Arc::new(self.clone())));
        }

        let (using, singleton) = {
            let mut registry = self.registry();
            if let Some(requester) = requester {
                registry.add_child(requester, token);
            }
            let declaration = registry.get(token).ok_or_else(|| {
                Error::resolution(token.name(), format!("not declared in context {}", self.id()))
            })?;
            if declaration.singleton {
                if let Some(instance) = &declaration.instance {
                    return Ok(instance.clone());
                }
            }
            (declaration.using.clone(), declaration.singleton)
        };

        let (instance, descriptor) = {
            let _guard = ResolutionGuard::enter(self, token)?;
            self.instantiate(token, &using)?
        };

        if singleton {
            let mut registry = self.registry();
            if let Some(declaration) = registry.get_mut(token) {
                if let Some(existing) = &declaration.instance {
                    // Someone else finished first; keep theirs.
                    return Ok(existing.clone());
                }
                declaration.instance = Some(instance.clone());
            }
        }

        // Transient instances are never subscribed; the bus would keep each one alive.
        match descriptor {
            Some(descriptor) if singleton => self.bind_listeners(token, &descriptor, &instance),
            Some(descriptor) if !descriptor.listeners().is_empty() => log::debug!(
                "Skipped {} listener binding(s) of transient {}",
                descriptor.listeners().len(),
                token
            ),
            _ => {}
        }
        log::debug!("Resolved {} in context {} (singleton: {})", token, self.id(), singleton);
        Ok(instance)
    }

    fn instantiate(&self, token: Token, using: &Use) -> Result<(Instance, Option<Arc<ClassDescriptor>>)> {
        match using {
            Use::Class(class) => {
                let descriptor = (class.describe)(self.catalog());
                self.check_readonly(&descriptor)?;
                let cx = Construction {
                    kernel: self,
                    descriptor: &descriptor,
                    token,
                };
                let instance = (class.build)(&cx)?;
                Ok((instance, Some(descriptor)))
            }
            Use::Factory(factory) => Ok(((factory.build)(self)?, None)),
            Use::Value(instance) => Ok((instance.clone(), None)),
        }
    }

    fn check_readonly(&self, descriptor: &ClassDescriptor) -> Result<()> {
        for binding in descriptor.bindings().iter().filter(|b| b.readonly) {
            if binding.default.is_none() && self.env(&binding.state, binding.cast).is_none() {
                return Err(StateSystemError::MissingConfiguration {
                    class: descriptor.class().short_name().to_string(),
                    property: binding.property.clone(),
                    key: binding.state.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn bind_listeners(&self, token: Token, descriptor: &ClassDescriptor, instance: &Instance) {
        for listener in descriptor.listeners() {
            let handler = BoundHandler::new(
                token,
                listener.property.clone(),
                instance.concrete(),
                listener.action.clone(),
            );
            self.bus().subscribe(&listener.event, Arc::new(handler), listener.options);
        }
    }
}

// Test module declaration
#[cfg(test)]
mod tests;
