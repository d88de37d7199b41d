//! Class metadata catalog.
//!
//! Each component describes itself once through [`Component::describe`]. The
//! resulting [`Descriptor`] is flattened (base components merged in) and stored
//! in the [`Catalog`] arena under a [`ClassId`]. Kernels and their forks share
//! one catalog.
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::event::ListenOptions;
use crate::kernel::context::Kernel;
use crate::kernel::error::{Error, Result};
use crate::kernel::lifecycle::Lifecycle;
use crate::registry::definition::{AnyDefinition, Definition};
use crate::registry::token::Token;
use crate::resolver::Component;
use crate::state::CastHint;

pub(crate) type ErasedAction = Arc<
    dyn Fn(Arc<dyn Any + Send + Sync>, Kernel, Value) -> BoxFuture<'static, Result<Value>>
        + Send
        + Sync,
>;

pub(crate) type LifecycleAdapter =
    Arc<dyn Fn(Arc<dyn Any + Send + Sync>) -> Option<Arc<dyn Lifecycle>> + Send + Sync>;

/// Index of a descriptor in the catalog arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(usize);

impl ClassId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A field that receives a lazily resolved dependency.
#[derive(Clone)]
pub struct InjectionPoint {
    pub property: String,
    pub token: Token,
    /// Registration used when the token is not declared yet.
    pub(crate) fallback: Option<fn() -> AnyDefinition>,
}

impl fmt::Debug for InjectionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectionPoint")
            .field("property", &self.property)
            .field("token", &self.token)
            .field("auto_register", &self.fallback.is_some())
            .finish()
    }
}

/// A field bound to a state key.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub property: String,
    pub state: String,
    pub readonly: bool,
    pub cast: Option<CastHint>,
    pub default: Option<Value>,
}

impl Binding {
    pub fn new(property: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            state: state.into(),
            readonly: false,
            cast: None,
            default: None,
        }
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    pub fn cast(mut self, cast: CastHint) -> Self {
        self.cast = Some(cast);
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// A method subscribed to an event whenever an instance is built.
#[derive(Clone)]
pub struct ListenerBinding {
    pub property: String,
    pub event: String,
    pub options: ListenOptions,
    pub(crate) action: ErasedAction,
}

impl fmt::Debug for ListenerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerBinding")
            .field("property", &self.property)
            .field("event", &self.event)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Flattened, type-erased metadata of one component class.
#[derive(Clone)]
pub struct ClassDescriptor {
    id: ClassId,
    class: Token,
    injections: Vec<InjectionPoint>,
    bindings: Vec<Binding>,
    listeners: Vec<ListenerBinding>,
    lifecycle: Option<LifecycleAdapter>,
}

impl ClassDescriptor {
    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn class(&self) -> Token {
        self.class
    }

    pub fn injections(&self) -> &[InjectionPoint] {
        &self.injections
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn listeners(&self) -> &[ListenerBinding] {
        &self.listeners
    }

    /// A class with lifecycle hooks is a provider.
    pub fn is_provider(&self) -> bool {
        self.lifecycle.is_some()
    }

    pub fn injection(&self, property: &str) -> Option<&InjectionPoint> {
        self.injections.iter().find(|p| p.property == property)
    }

    pub fn binding(&self, property: &str) -> Option<&Binding> {
        self.bindings.iter().find(|b| b.property == property)
    }

    pub(crate) fn lifecycle_of(
        &self,
        instance: Arc<dyn Any + Send + Sync>,
    ) -> Option<Arc<dyn Lifecycle>> {
        self.lifecycle.as_ref().and_then(|adapter| adapter(instance))
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("id", &self.id)
            .field("class", &self.class)
            .field("injections", &self.injections)
            .field("bindings", &self.bindings)
            .field("listeners", &self.listeners)
            .field("provider", &self.is_provider())
            .finish()
    }
}

/// Builder handed to [`Component::describe`].
pub struct Descriptor<C> {
    injections: Vec<InjectionPoint>,
    bindings: Vec<Binding>,
    listeners: Vec<ListenerBinding>,
    lifecycle: Option<LifecycleAdapter>,
    _class: PhantomData<fn() -> C>,
}

impl<C: Component> Descriptor<C> {
    pub(crate) fn new() -> Self {
        Self {
            injections: Vec::new(),
            bindings: Vec::new(),
            listeners: Vec::new(),
            lifecycle: None,
            _class: PhantomData,
        }
    }

    /// Inject another component. It is auto-registered if nobody declared it.
    pub fn inject<T: Component>(&mut self, property: &str) -> &mut Self {
        self.upsert_injection(InjectionPoint {
            property: property.to_string(),
            token: Token::of::<T>(),
            fallback: Some(|| Definition::<T>::class().into()),
        })
    }

    /// Inject an abstract token (e.g. `dyn Store`) that must be declared explicitly.
    pub fn inject_token<T: ?Sized + Send + Sync + 'static>(&mut self, property: &str) -> &mut Self {
        self.upsert_injection(InjectionPoint {
            property: property.to_string(),
            token: Token::of::<T>(),
            fallback: None,
        })
    }

    /// Bind a property to a state key.
    pub fn bind(&mut self, binding: Binding) -> &mut Self {
        match self.bindings.iter_mut().find(|b| b.property == binding.property) {
            Some(existing) => *existing = binding,
            None => self.bindings.push(binding),
        }
        self
    }

    /// Subscribe a method to `event` on every instance built from this class.
    pub fn listen<F, Fut>(&mut self, property: &str, event: &str, action: F) -> &mut Self
    where
        F: Fn(Arc<C>, Kernel, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.listen_with(property, event, ListenOptions::default(), action)
    }

    pub fn listen_with<F, Fut>(
        &mut self,
        property: &str,
        event: &str,
        options: ListenOptions,
        action: F,
    ) -> &mut Self
    where
        F: Fn(Arc<C>, Kernel, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let property_name = property.to_string();
        let erased: ErasedAction = Arc::new(
            move |instance: Arc<dyn Any + Send + Sync>, kernel: Kernel, data: Value| {
                match instance.downcast::<C>() {
                    Ok(this) => action(this, kernel, data).boxed(),
                    Err(_) => {
                        let message = format!(
                            "listener '{}' invoked with an instance that is not a {}",
                            property_name,
                            std::any::type_name::<C>()
                        );
                        async move { Err(Error::InvalidArgument(message)) }.boxed()
                    }
                }
            },
        );
        self.listeners.retain(|l| l.property != property);
        self.listeners.push(ListenerBinding {
            property: property.to_string(),
            event: event.to_string(),
            options,
            action: erased,
        });
        self
    }

    /// Mark the class as a provider: its [`Lifecycle`] hooks take part in start/stop.
    pub fn lifecycle(&mut self) -> &mut Self
    where
        C: Lifecycle,
    {
        self.lifecycle = Some(Arc::new(|instance: Arc<dyn Any + Send + Sync>| {
            instance
                .downcast::<C>()
                .ok()
                .map(|this| this as Arc<dyn Lifecycle>)
        }));
        self
    }

    /// Flatten a base component's injection points and bindings into this class.
    /// Entries the class declares itself win.
    pub fn inherit<B: Component>(&mut self) -> &mut Self {
        let mut base = Descriptor::<B>::new();
        B::describe(&mut base);
        for point in base.injections {
            if self.injections.iter().all(|p| p.property != point.property) {
                self.injections.push(point);
            }
        }
        for binding in base.bindings {
            if self.bindings.iter().all(|b| b.property != binding.property) {
                self.bindings.push(binding);
            }
        }
        self
    }

    fn upsert_injection(&mut self, point: InjectionPoint) -> &mut Self {
        match self.injections.iter_mut().find(|p| p.property == point.property) {
            Some(existing) => *existing = point,
            None => self.injections.push(point),
        }
        self
    }

    fn finish(self, id: ClassId) -> ClassDescriptor {
        ClassDescriptor {
            id,
            class: Token::of::<C>(),
            injections: self.injections,
            bindings: self.bindings,
            listeners: self.listeners,
            lifecycle: self.lifecycle,
        }
    }
}

#[derive(Default)]
struct CatalogInner {
    arena: Vec<Arc<ClassDescriptor>>,
    index: HashMap<TypeId, ClassId>,
}

/// Arena of class descriptors, indexed by [`ClassId`].
#[derive(Default)]
pub struct Catalog {
    inner: RwLock<CatalogInner>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Describe `C` ahead of time. Returns its id.
    pub fn register<C: Component>(&self) -> ClassId {
        self.describe::<C>().id()
    }

    /// Descriptor of `C`, built on first request.
    pub fn describe<C: Component>(&self) -> Arc<ClassDescriptor> {
        let type_id = TypeId::of::<C>();
        {
            let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(id) = inner.index.get(&type_id) {
                return inner.arena[id.0].clone();
            }
        }

        // Build outside the lock; describe() may flatten other classes.
        let mut descriptor = Descriptor::<C>::new();
        C::describe(&mut descriptor);

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = inner.index.get(&type_id) {
            return inner.arena[id.0].clone();
        }
        let id = ClassId(inner.arena.len());
        let described = Arc::new(descriptor.finish(id));
        log::debug!(
            "Catalogued {} as {:?} ({} injections, {} bindings, {} listeners)",
            described.class(),
            id,
            described.injections().len(),
            described.bindings().len(),
            described.listeners().len()
        );
        inner.arena.push(described.clone());
        inner.index.insert(type_id, id);
        described
    }

    pub fn get(&self, id: ClassId) -> Option<Arc<ClassDescriptor>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.arena.get(id.0).cloned()
    }

    pub fn lookup(&self, class: Token) -> Option<Arc<ClassDescriptor>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .index
            .get(&class.type_id())
            .and_then(|id| inner.arena.get(id.0).cloned())
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .arena
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog").field("classes", &self.len()).finish()
    }
}
