//! # Tessel State Store
//!
//! Hierarchical key/value store backing `Kernel::state`, `Kernel::set_state`
//! and `Kernel::env`.
//!
//! Every kernel context owns one [`StateStore`]. A forked context's store keeps
//! a pointer to its parent's store:
//!
//! - reads fall through to the parent until the context writes the key itself;
//! - writes to a key an ancestor already resolves are forwarded to that
//!   ancestor, so ancestors keep ownership of the keys they define.
//!
//! Values are `serde_json::Value`. [`CastHint`] drives the typed reads done by
//! [`StateStore::env`] (see the `template` submodule).
pub mod config;
pub mod error;
pub mod template;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::{Value, json};

pub use config::{ConfigData, ConfigFormat};
pub use error::StateSystemError;
pub use template::CastHint;

/// A local write that changed a value.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Value,
}

impl Mutation {
    /// Payload of the `state:mutate` event.
    pub fn to_payload(&self) -> Value {
        json!({
            "key": self.key,
            "oldValue": self.old_value.clone().unwrap_or(Value::Null),
            "newValue": self.new_value,
        })
    }
}

/// Outcome of [`StateStore::set`].
#[derive(Debug, Clone, PartialEq)]
pub struct Write {
    /// How many levels up the chain the value landed (0 = this store).
    pub depth: usize,
    /// `None` when the write did not change the stored value.
    pub mutation: Option<Mutation>,
}

/// Key/value store owned by one kernel context.
#[derive(Debug, Default)]
pub struct StateStore {
    parent: Option<Arc<StateStore>>,
    local: RwLock<HashMap<String, Value>>,
}

impl StateStore {
    /// Create a root store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store delegating to `parent`, with `initial` written locally.
    pub fn child(parent: Arc<StateStore>, initial: HashMap<String, Value>) -> Self {
        Self {
            parent: Some(parent),
            local: RwLock::new(initial),
        }
    }

    pub fn parent(&self) -> Option<&Arc<StateStore>> {
        self.parent.as_ref()
    }

    /// Resolve `key`, preferring a local write over anything inherited.
    pub fn get(&self, key: &str) -> Option<Value> {
        {
            let local = self.local.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(value) = local.get(key) {
                return Some(value.clone());
            }
        }
        self.parent.as_ref().and_then(|parent| parent.get(key))
    }

    /// True if this store has written `key` itself.
    pub fn owns(&self, key: &str) -> bool {
        self.local
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Write `key`, forwarding to the nearest ancestor that already resolves it.
    pub fn set(&self, key: &str, value: Value) -> Write {
        if !self.owns(key) {
            if let Some(parent) = &self.parent {
                if parent.get(key).is_some() {
                    let write = parent.set(key, value);
                    return Write {
                        depth: write.depth + 1,
                        mutation: write.mutation,
                    };
                }
            }
        }

        let mut local = self.local.write().unwrap_or_else(PoisonError::into_inner);
        let old_value = local.insert(key.to_string(), value.clone());
        let mutation = match old_value {
            Some(ref old) if *old == value => None,
            _ => Some(Mutation {
                key: key.to_string(),
                old_value,
                new_value: value,
            }),
        };
        Write { depth: 0, mutation }
    }

    /// Write values locally without forwarding or change detection.
    pub fn seed(&self, values: HashMap<String, Value>) {
        let mut local = self.local.write().unwrap_or_else(PoisonError::into_inner);
        local.extend(values);
    }

    /// Local + inherited values, local entries shadowing inherited ones.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        let mut merged = self
            .parent
            .as_ref()
            .map(|parent| parent.snapshot())
            .unwrap_or_default();
        let local = self.local.read().unwrap_or_else(PoisonError::into_inner);
        merged.extend(local.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    /// Typed lookup: casts and `${key}` substitution on top of [`get`](Self::get).
    pub fn env(&self, key: &str, cast: Option<CastHint>) -> Option<Value> {
        let raw = self.get(key)?;
        Some(template::resolve(raw, cast, || self.snapshot()))
    }
}

// Test module declaration
#[cfg(test)]
mod tests;
