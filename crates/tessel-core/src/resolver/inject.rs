use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::kernel::context::{Kernel, WeakKernel};
use crate::kernel::error::{Error, Result};
use crate::registry::{Binding, Token};
use crate::state::StateSystemError;

/// Lazily resolved dependency.
///
/// Nothing is resolved when the owning instance is built; the first
/// [`get`](Inject::get) resolves the token in the owning context and caches it.
/// Declaration order therefore never matters. The kernel context itself is
/// never cached, only looked up again through a weak handle.
pub struct Inject<T: ?Sized> {
    kernel: WeakKernel,
    token: Token,
    requester: Token,
    cell: OnceLock<Arc<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> Inject<T> {
    pub(crate) fn new(kernel: &Kernel, requester: Token) -> Self {
        Self {
            kernel: kernel.downgrade(),
            token: Token::of::<T>(),
            requester,
            cell: OnceLock::new(),
        }
    }

    pub fn get(&self) -> Result<Arc<T>> {
        if let Some(resolved) = self.cell.get() {
            return Ok(resolved.clone());
        }
        let kernel = self.kernel.upgrade().ok_or_else(|| {
            Error::IllegalState(format!(
                "kernel context dropped before {} was resolved",
                self.token
            ))
        })?;
        let resolved = kernel
            .resolve_token(self.token, Some(self.requester))?
            .downcast::<T>()?;
        // A cached strong handle to the owning context would keep it alive forever.
        if self.token == Token::of::<Kernel>() {
            return Ok(resolved);
        }
        Ok(self.cell.get_or_init(|| resolved).clone())
    }

    pub fn is_resolved(&self) -> bool {
        self.cell.get().is_some()
    }

    pub fn token(&self) -> Token {
        self.token
    }
}

impl<T: ?Sized> fmt::Debug for Inject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inject")
            .field("token", &self.token)
            .field("resolved", &self.cell.get().is_some())
            .finish()
    }
}

/// Property bound to a state key; reads the live store on every access.
#[derive(Clone)]
pub struct Setting {
    kernel: WeakKernel,
    binding: Binding,
}

impl Setting {
    pub(crate) fn new(kernel: &Kernel, binding: Binding) -> Self {
        Self {
            kernel: kernel.downgrade(),
            binding,
        }
    }

    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    /// Current value (cast applied), falling back to the binding's default.
    pub fn get(&self) -> Option<Value> {
        self.kernel
            .upgrade()
            .and_then(|kernel| kernel.env(&self.binding.state, self.binding.cast))
            .or_else(|| self.binding.default.clone())
    }

    /// Current value deserialized into `T`.
    pub fn value<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match self.get() {
            None => Ok(None),
            Some(raw) => serde_json::from_value(raw).map(Some).map_err(|e| {
                StateSystemError::InvalidValue {
                    key: self.binding.state.clone(),
                    message: e.to_string(),
                }
                .into()
            }),
        }
    }

    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        if self.binding.readonly {
            return Err(StateSystemError::ReadonlyBinding {
                property: self.binding.property.clone(),
                key: self.binding.state.clone(),
            }
            .into());
        }
        let kernel = self.kernel.upgrade().ok_or_else(|| {
            Error::IllegalState(format!(
                "kernel context dropped before '{}' was written",
                self.binding.state
            ))
        })?;
        kernel.set_state(self.binding.state.clone(), value);
        Ok(())
    }
}

impl fmt::Debug for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setting").field("binding", &self.binding).finish()
    }
}
