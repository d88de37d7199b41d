use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::kernel::context::Kernel;
use crate::kernel::error::Result;
use crate::registry::Instance;
use crate::registry::catalog::{Catalog, ClassDescriptor};
use crate::registry::token::Token;
use crate::resolver::{Component, Construction};

type ClassBuild = Arc<dyn Fn(&Construction<'_>) -> Result<Instance> + Send + Sync>;
type FactoryBuild = Arc<dyn Fn(&Kernel) -> Result<Instance> + Send + Sync>;

/// Constructible side of a class declaration.
#[derive(Clone)]
pub struct ClassUse {
    pub(crate) class: Token,
    pub(crate) describe: fn(&Catalog) -> Arc<ClassDescriptor>,
    pub(crate) build: ClassBuild,
}

/// Factory side of a declaration; receives the resolving context.
#[derive(Clone)]
pub struct FactoryUse {
    pub(crate) build: FactoryBuild,
}

/// What a declaration builds. Chosen explicitly at the registration call site.
#[derive(Clone)]
pub enum Use {
    Class(ClassUse),
    Factory(FactoryUse),
    /// A pre-built instance.
    Value(Instance),
}

impl Use {
    pub(crate) fn class<T, C, F>(cast: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        C: Component,
        F: Fn(Arc<C>) -> Arc<T> + Send + Sync + 'static,
    {
        Use::Class(ClassUse {
            class: Token::of::<C>(),
            describe: |catalog: &Catalog| catalog.describe::<C>(),
            build: Arc::new(move |cx: &Construction<'_>| {
                let this = Arc::new(C::construct(cx)?);
                let provided = cast(this.clone());
                Ok(Instance::new(provided, this, cx.descriptor()))
            }),
        })
    }

    /// Same constructible: same class, same factory closure or same value.
    pub fn same(&self, other: &Use) -> bool {
        match (self, other) {
            (Use::Class(a), Use::Class(b)) => a.class == b.class,
            (Use::Factory(a), Use::Factory(b)) => Arc::ptr_eq(&a.build, &b.build),
            (Use::Value(a), Use::Value(b)) => a.same(b),
            _ => false,
        }
    }

    pub(crate) fn descriptor(&self, catalog: &Catalog) -> Option<Arc<ClassDescriptor>> {
        match self {
            Use::Class(class) => Some((class.describe)(catalog)),
            _ => None,
        }
    }

    pub(crate) fn is_provider(&self, catalog: &Catalog) -> bool {
        match self {
            Use::Class(class) => (class.describe)(catalog).is_provider(),
            Use::Factory(_) => false,
            Use::Value(instance) => instance.lifecycle().is_some(),
        }
    }
}

impl fmt::Debug for Use {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Use::Class(class) => write!(f, "Use::Class({})", class.class),
            Use::Factory(_) => f.write_str("Use::Factory(..)"),
            Use::Value(_) => f.write_str("Use::Value(..)"),
        }
    }
}

/// Typed registration request for token `T`.
///
/// ```ignore
/// kernel.with([
///     Definition::<dyn Store>::provide().use_class::<MemoryStore>(|s| s).into(),
///     Definition::<Api>::class().into(),
/// ])?;
/// ```
pub struct Definition<T: ?Sized> {
    inner: AnyDefinition,
    _token: PhantomData<fn() -> Arc<T>>,
}

impl<T: Component> Definition<T> {
    /// Declare a component under its own type. Leaves an existing declaration alone.
    pub fn class() -> Self {
        let mut definition = Self::provide();
        definition.inner.fallback = Some(Use::class::<T, T, _>(|this| this));
        definition
    }
}

impl<T: ?Sized + Send + Sync + 'static> Definition<T> {
    /// Start a `{provide: T, use: ...}` pair.
    pub fn provide() -> Self {
        Self {
            inner: AnyDefinition {
                token: Token::of::<T>(),
                using: None,
                fallback: None,
                singleton: None,
            },
            _token: PhantomData,
        }
    }

    /// Build `C` and expose it as `T` (usually `|c| c`, coercing to a trait object).
    pub fn use_class<C, F>(mut self, cast: F) -> Self
    where
        C: Component,
        F: Fn(Arc<C>) -> Arc<T> + Send + Sync + 'static,
    {
        self.inner.using = Some(Use::class::<T, C, F>(cast));
        self
    }

    pub fn use_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Kernel) -> Result<Arc<T>> + Send + Sync + 'static,
    {
        self.inner.using = Some(Use::Factory(FactoryUse {
            build: Arc::new(move |kernel: &Kernel| factory(kernel).map(Instance::from_value)),
        }));
        self
    }

    pub fn use_value(mut self, value: Arc<T>) -> Self {
        self.inner.using = Some(Use::Value(Instance::from_value(value)));
        self
    }

    pub fn singleton(mut self, singleton: bool) -> Self {
        self.inner.singleton = Some(singleton);
        self
    }

    pub fn transient(self) -> Self {
        self.singleton(false)
    }

    pub fn token(&self) -> Token {
        self.inner.token
    }

    pub fn erase(self) -> AnyDefinition {
        self.inner
    }
}

impl<T: ?Sized> From<Definition<T>> for AnyDefinition {
    fn from(definition: Definition<T>) -> Self {
        definition.inner
    }
}

/// Type-erased [`Definition`], as accepted by `Kernel::with`.
#[derive(Clone)]
pub struct AnyDefinition {
    pub(crate) token: Token,
    /// Explicit `use`; overrides a differing declaration.
    pub(crate) using: Option<Use>,
    /// Used only when nothing is declared for the token yet.
    pub(crate) fallback: Option<Use>,
    pub(crate) singleton: Option<bool>,
}

impl AnyDefinition {
    pub fn token(&self) -> Token {
        self.token
    }

    pub(crate) fn with_value(mut self, instance: Instance) -> Self {
        self.using = Some(Use::Value(instance));
        self
    }
}

impl fmt::Debug for AnyDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyDefinition")
            .field("token", &self.token)
            .field("using", &self.using)
            .field("fallback", &self.fallback)
            .field("singleton", &self.singleton)
            .finish()
    }
}
