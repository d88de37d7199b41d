use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde_json::Value;

use crate::event::EventBus;
use crate::kernel::constants;
use crate::kernel::error::{Error, Result};
use crate::kernel::lifecycle::LifecycleState;
use crate::registry::{
    AnyDefinition, Catalog, Declaration, DeclarationInfo, DeclarationRegistry, Definition, Instance, Token,
};
use crate::resolver::Component;
use crate::state::{CastHint, StateStore};

/// A kernel context: declarations, instances, state, listeners and lifecycle.
///
/// `Kernel` is a cheap handle (`Arc` inside); clones share the same context.
/// [`fork`](Kernel::fork) derives a new context instead.
#[derive(Clone)]
pub struct Kernel {
    inner: Arc<KernelInner>,
}

struct KernelInner {
    id: String,
    parent: Option<Kernel>,
    catalog: Arc<Catalog>,
    declarations: Mutex<DeclarationRegistry>,
    store: Arc<StateStore>,
    bus: EventBus,
    phase: Mutex<LifecycleState>,
}

/// Non-owning handle, held by lazy injections and setting bindings.
#[derive(Clone, Default)]
pub struct WeakKernel {
    inner: Weak<KernelInner>,
}

impl WeakKernel {
    pub fn upgrade(&self) -> Option<Kernel> {
        self.inner.upgrade().map(|inner| Kernel { inner })
    }
}

impl fmt::Debug for WeakKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(kernel) => write!(f, "WeakKernel({})", kernel.id()),
            None => f.write_str("WeakKernel(<dropped>)"),
        }
    }
}

/// Options for [`Kernel::get_with`].
pub struct GetOptions<T: ?Sized> {
    /// Resolve on behalf of this token; it gains a child edge to the result.
    pub parent: Option<Token>,
    /// Declare the definition before resolving it.
    pub register: bool,
    /// Use this pre-built instance instead of constructing one.
    pub instance: Option<Arc<T>>,
}

impl<T: ?Sized> Default for GetOptions<T> {
    fn default() -> Self {
        Self {
            parent: None,
            register: true,
            instance: None,
        }
    }
}

impl Kernel {
    pub(crate) fn from_parts(
        id: String,
        parent: Option<Kernel>,
        catalog: Arc<Catalog>,
        declarations: DeclarationRegistry,
        store: Arc<StateStore>,
        phase: LifecycleState,
    ) -> Self {
        Self {
            inner: Arc::new(KernelInner {
                id,
                parent,
                catalog,
                declarations: Mutex::new(declarations),
                store,
                bus: EventBus::new(),
                phase: Mutex::new(phase),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// The context this one was forked from.
    pub fn parent(&self) -> Option<&Kernel> {
        self.inner.parent.as_ref()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn downgrade(&self) -> WeakKernel {
        WeakKernel {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// True if both handles point at the same context.
    pub fn ptr_eq(&self, other: &Kernel) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn address(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    pub(crate) fn registry(&self) -> MutexGuard<'_, DeclarationRegistry> {
        self.inner
            .declarations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn phase(&self) -> MutexGuard<'_, LifecycleState> {
        self.inner.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        *self.phase()
    }

    pub fn is_started(&self) -> bool {
        self.lifecycle_state() == LifecycleState::Started
    }

    /// Declare every definition, then resolve the singletons among them.
    pub fn with<I>(&self, definitions: I) -> Result<&Self>
    where
        I: IntoIterator<Item = AnyDefinition>,
    {
        let definitions: Vec<AnyDefinition> = definitions.into_iter().collect();
        for definition in &definitions {
            self.declare(definition.clone(), true)?;
        }
        for definition in &definitions {
            let singleton = self
                .registry()
                .get(definition.token)
                .map(|d| d.singleton)
                .unwrap_or(false);
            if singleton {
                self.resolve_token(definition.token, None)?;
            }
        }
        Ok(self)
    }

    /// Declare `C` under its own type if needed and resolve it.
    pub fn get<C: Component>(&self) -> Result<Arc<C>> {
        self.get_with(Definition::<C>::class(), GetOptions::default())
    }

    /// Resolve an already declared token, e.g. `resolve::<dyn Store>()`.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.resolve_token(Token::of::<T>(), None)?.downcast::<T>()
    }

    pub fn get_with<T: ?Sized + Send + Sync + 'static>(
        &self,
        definition: Definition<T>,
        options: GetOptions<T>,
    ) -> Result<Arc<T>> {
        let mut definition = definition.erase();
        let token = definition.token;
        if options.instance.is_some() && !options.register {
            return Err(Error::InvalidArgument(format!(
                "an instance for {} is only used when it is registered",
                token
            )));
        }
        if let Some(instance) = options.instance {
            definition = definition.with_value(Instance::from_value(instance));
        }
        if options.register {
            self.declare(definition, options.parent.is_none())?;
        }
        self.resolve_token(token, options.parent)?.downcast::<T>()
    }

    /// Register a declaration.
    ///
    /// Idempotent per token. A differing explicit `use` replaces the existing
    /// declaration while stopped and prunes what became unreachable.
    pub(crate) fn declare(&self, definition: AnyDefinition, explicit: bool) -> Result<()> {
        let token = definition.token;
        if token == Token::of::<Kernel>() {
            return Err(Error::InvalidArgument(
                "the kernel context is always injectable and cannot be re-declared".to_string(),
            ));
        }

        let pending = {
            let mut registry = self.registry();
            let existing = registry
                .get(token)
                .map(|d| (d.using.clone(), d.explicit));

            let (using, replaced) = match (existing, definition.using, definition.fallback) {
                (Some((current, was_explicit)), requested, _) => match requested {
                    Some(requested) if !current.same(&requested) => {
                        let phase = self.lifecycle_state();
                        if phase != LifecycleState::Stopped {
                            return Err(Error::IllegalState(format!(
                                "cannot override {} while the kernel is {}",
                                token, phase
                            )));
                        }
                        (requested, Some(was_explicit))
                    }
                    _ => {
                        if explicit && !was_explicit {
                            if let Some(declaration) = registry.get_mut(token) {
                                declaration.explicit = true;
                            }
                        }
                        return Ok(());
                    }
                },
                (None, Some(using), _) | (None, None, Some(using)) => (using, None),
                (None, None, None) => {
                    return Err(Error::InvalidArgument(format!(
                        "{} has no use and is not constructible",
                        token
                    )));
                }
            };

            if using.is_provider(self.catalog()) {
                let phase = self.lifecycle_state();
                if phase != LifecycleState::Stopped {
                    return Err(Error::IllegalState(format!(
                        "cannot register provider {} while the kernel is {}",
                        token, phase
                    )));
                }
            }

            let mut children = Vec::new();
            let mut pending = Vec::new();
            if let Some(descriptor) = using.descriptor(self.catalog()) {
                for point in descriptor.injections() {
                    if point.token == Token::of::<Kernel>() || point.token == token {
                        continue;
                    }
                    if !children.contains(&point.token) {
                        children.push(point.token);
                    }
                    if let Some(fallback) = point.fallback {
                        pending.push(fallback());
                    }
                }
            }

            if replaced.is_some() {
                registry.remove(token);
            }
            registry.insert(Declaration {
                token,
                using,
                singleton: definition.singleton.unwrap_or(true),
                children,
                explicit: explicit || replaced.unwrap_or(false),
                instance: None,
            });
            log::debug!(
                "Declared {} in context {} (explicit: {})",
                token,
                self.id(),
                explicit
            );

            if replaced.is_some() {
                let pruned = registry.prune_unreachable();
                if !pruned.is_empty() {
                    let names: Vec<&str> = pruned.iter().map(|t| t.short_name()).collect();
                    log::warn!(
                        "Override of {} pruned unreachable declarations: {}",
                        token,
                        names.join(", ")
                    );
                }
            }
            pending
        };

        for child in pending {
            if !self.registry().contains(child.token) {
                self.declare(child, false)?;
            }
        }
        Ok(())
    }

    /// Snapshot of the declarations, in registration order.
    pub fn declarations(&self) -> Vec<DeclarationInfo> {
        self.registry().infos(self.catalog())
    }

    pub fn is_declared<T: ?Sized + 'static>(&self) -> bool {
        self.registry().contains(Token::of::<T>())
    }

    /// Raw value of `key`, local first, then inherited.
    pub fn state(&self, key: &str) -> Option<Value> {
        self.inner.store.get(key)
    }

    /// Write `key`. Keys an ancestor already resolves are written there, and
    /// `state:mutate` fires on whichever context ends up owning the change.
    pub fn set_state(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let write = self.inner.store.set(&key, value.into());
        if let Some(mutation) = write.mutation {
            let owner = self.ancestor(write.depth);
            log::debug!("State '{}' changed in context {}", key, owner.id());
            owner.notify(constants::STATE_MUTATE, mutation.to_payload());
        }
    }

    /// Typed lookup with casting and `${key}` substitution.
    pub fn env(&self, key: &str, cast: Option<CastHint>) -> Option<Value> {
        self.inner.store.env(key, cast)
    }

    /// Local and inherited state, flattened.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.inner.store.snapshot()
    }

    /// Derive a context that shares topology and configuration but owns its
    /// instances, state writes and listeners.
    pub fn fork(&self, initial_store: Option<HashMap<String, Value>>) -> Kernel {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(constants::FORK_SUFFIX_LEN)
            .map(char::from)
            .collect::<String>()
            .to_lowercase();
        let id = format!("{}.{}", self.id(), suffix);
        let topology = self.registry().topology();
        let phase = self.lifecycle_state().settled();
        let store = StateStore::child(self.inner.store.clone(), initial_store.unwrap_or_default());
        log::debug!("Forked context {} ({})", id, phase);
        Kernel::from_parts(
            id,
            Some(self.clone()),
            self.inner.catalog.clone(),
            topology,
            Arc::new(store),
            phase,
        )
    }

    fn ancestor(&self, depth: usize) -> &Kernel {
        let mut cx = self;
        for _ in 0..depth {
            match cx.parent() {
                Some(parent) => cx = parent,
                None => break,
            }
        }
        cx
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("id", &self.id())
            .field("state", &self.lifecycle_state())
            .field("declarations", &self.registry().len())
            .field("listeners", &self.bus().listener_count(None))
            .finish()
    }
}
