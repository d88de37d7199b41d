//! # Tessel Declaration Registry
//!
//! Tracks, per context, which [`Token`]s are declared, what they build
//! ([`Use`]), whether they are singletons, which tokens they depend on
//! (`children`) and the cached [`Instance`] once a singleton is materialized.
//!
//! The registry is plain data guarded by the owning kernel context; the
//! registration rules (override, pruning, provider checks) live in
//! `Kernel::declare`, which drives the methods here.
pub mod catalog;
pub mod definition;
pub mod token;

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::kernel::error::{Error, Result};
use crate::kernel::lifecycle::Lifecycle;

pub use catalog::{Binding, Catalog, ClassDescriptor, ClassId, Descriptor, InjectionPoint, ListenerBinding};
pub use definition::{AnyDefinition, Definition, Use};
pub use token::Token;

/// A built object plus what the kernel needs to drive it.
#[derive(Clone)]
pub struct Instance {
    /// `Arc<T>` for the provided token `T`, boxed as `Any`.
    provided: Arc<dyn Any + Send + Sync>,
    /// The concrete class instance, target of bound listeners.
    concrete: Arc<dyn Any + Send + Sync>,
    lifecycle: Option<Arc<dyn Lifecycle>>,
}

impl Instance {
    pub(crate) fn new<T, C>(provided: Arc<T>, concrete: Arc<C>, descriptor: &ClassDescriptor) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        C: Send + Sync + 'static,
    {
        let concrete: Arc<dyn Any + Send + Sync> = concrete;
        let lifecycle = descriptor.lifecycle_of(concrete.clone());
        Self {
            provided: Arc::new(provided),
            concrete,
            lifecycle,
        }
    }

    pub(crate) fn from_value<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        let provided: Arc<dyn Any + Send + Sync> = Arc::new(value);
        Self {
            concrete: provided.clone(),
            provided,
            lifecycle: None,
        }
    }

    /// The instance as `Arc<T>`; fails if `T` is not the token it was built for.
    pub fn downcast<T: ?Sized + 'static>(&self) -> Result<Arc<T>> {
        self.provided
            .downcast_ref::<Arc<T>>()
            .cloned()
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "instance is not registered as {}",
                    std::any::type_name::<T>()
                ))
            })
    }

    pub(crate) fn concrete(&self) -> Arc<dyn Any + Send + Sync> {
        self.concrete.clone()
    }

    pub(crate) fn lifecycle(&self) -> Option<&Arc<dyn Lifecycle>> {
        self.lifecycle.as_ref()
    }

    /// Same underlying object.
    pub fn same(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.provided, &other.provided)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("provider", &self.lifecycle.is_some())
            .finish_non_exhaustive()
    }
}

/// Registry entry binding a token to what builds it.
#[derive(Debug, Clone)]
pub(crate) struct Declaration {
    pub token: Token,
    pub using: Use,
    pub singleton: bool,
    pub children: Vec<Token>,
    /// Declared by the user rather than pulled in as somebody's dependency.
    pub explicit: bool,
    pub instance: Option<Instance>,
}

/// Read-only view of a declaration, handed to lifecycle hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclarationInfo {
    pub token: Token,
    pub singleton: bool,
    pub children: Vec<Token>,
    pub explicit: bool,
    pub materialized: bool,
    pub provider: bool,
}

/// Declarations of one context, in registration order.
#[derive(Debug, Default)]
pub(crate) struct DeclarationRegistry {
    entries: Vec<Declaration>,
}

impl DeclarationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, token: Token) -> bool {
        self.entries.iter().any(|d| d.token == token)
    }

    pub fn get(&self, token: Token) -> Option<&Declaration> {
        self.entries.iter().find(|d| d.token == token)
    }

    pub fn get_mut(&mut self, token: Token) -> Option<&mut Declaration> {
        self.entries.iter_mut().find(|d| d.token == token)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.entries.iter()
    }

    pub fn tokens(&self) -> Vec<Token> {
        self.entries.iter().map(|d| d.token).collect()
    }

    pub fn insert(&mut self, declaration: Declaration) {
        match self.get_mut(declaration.token) {
            Some(existing) => *existing = declaration,
            None => self.entries.push(declaration),
        }
    }

    pub fn remove(&mut self, token: Token) -> Option<Declaration> {
        let idx = self.entries.iter().position(|d| d.token == token)?;
        Some(self.entries.remove(idx))
    }

    /// Record that `parent` depends on `child`. Returns false if `parent` is unknown.
    pub fn add_child(&mut self, parent: Token, child: Token) -> bool {
        match self.get_mut(parent) {
            Some(declaration) => {
                if parent != child && !declaration.children.contains(&child) {
                    declaration.children.push(child);
                }
                true
            }
            None => false,
        }
    }

    /// Same tokens, uses, flags and edges; no cached instances.
    pub fn topology(&self) -> Self {
        let entries = self
            .entries
            .iter()
            .map(|d| Declaration {
                instance: None,
                ..d.clone()
            })
            .collect();
        Self { entries }
    }

    /// Every token reachable from `token` through `children`.
    pub fn closure(&self, token: Token) -> HashSet<Token> {
        let mut seen = HashSet::new();
        let mut stack: Vec<Token> = self
            .get(token)
            .map(|d| d.children.clone())
            .unwrap_or_default();
        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                if let Some(declaration) = self.get(next) {
                    stack.extend(declaration.children.iter().copied());
                }
            }
        }
        seen
    }

    /// Drop non-explicit declarations no explicit root can reach any more.
    pub fn prune_unreachable(&mut self) -> Vec<Token> {
        let mut reachable: HashSet<Token> = HashSet::new();
        for root in self.entries.iter().filter(|d| d.explicit) {
            reachable.insert(root.token);
            reachable.extend(self.closure(root.token));
        }
        let mut pruned = Vec::new();
        self.entries.retain(|d| {
            let keep = d.explicit || reachable.contains(&d.token);
            if !keep {
                pruned.push(d.token);
            }
            keep
        });
        pruned
    }

    pub fn infos(&self, catalog: &Catalog) -> Vec<DeclarationInfo> {
        self.entries
            .iter()
            .map(|d| DeclarationInfo {
                token: d.token,
                singleton: d.singleton,
                children: d.children.clone(),
                explicit: d.explicit,
                materialized: d.instance.is_some(),
                provider: d.using.is_provider(catalog),
            })
            .collect()
    }
}
