#![cfg(test)]

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::kernel::error::Result;
use crate::kernel::{Kernel, Lifecycle};
use crate::registry::{DeclarationInfo, Descriptor};
use crate::resolver::{Component, Construction, Inject};

/// Append `entry` to the string stored under `key`.
pub fn append(kernel: &Kernel, key: &str, entry: &str) {
    let current = kernel
        .state(key)
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    kernel.set_state(key, format!("{}{}", current, entry));
}

pub fn text(kernel: &Kernel, key: &str) -> String {
    kernel
        .state(key)
        .and_then(|v| match v {
            Value::String(s) => Some(s),
            _ => None,
        })
        .unwrap_or_default()
}

/// Provider with no dependencies; records its hooks in kernel state.
pub struct ProviderA {
    kernel: Inject<Kernel>,
}

impl Component for ProviderA {
    fn describe(d: &mut Descriptor<Self>) {
        d.inject_token::<Kernel>("kernel").lifecycle();
    }

    fn construct(cx: &Construction<'_>) -> Result<Self> {
        Ok(ProviderA {
            kernel: cx.inject("kernel")?,
        })
    }
}

#[async_trait]
impl Lifecycle for ProviderA {
    async fn on_configure(&self, _declarations: &[DeclarationInfo]) -> Result<()> {
        append(&*self.kernel.get()?, "trace.configure", "->A");
        Ok(())
    }

    async fn on_start(&self, _declarations: &[DeclarationInfo]) -> Result<()> {
        append(&*self.kernel.get()?, "trace.start", "A");
        Ok(())
    }

    async fn on_stop(&self, _declarations: &[DeclarationInfo]) -> Result<()> {
        append(&*self.kernel.get()?, "trace.stop", "A");
        Ok(())
    }
}

/// Provider depending on [`ProviderA`].
pub struct ProviderB {
    kernel: Inject<Kernel>,
    pub a: Inject<ProviderA>,
}

impl Component for ProviderB {
    fn describe(d: &mut Descriptor<Self>) {
        d.inject_token::<Kernel>("kernel")
            .inject::<ProviderA>("a")
            .lifecycle();
    }

    fn construct(cx: &Construction<'_>) -> Result<Self> {
        Ok(ProviderB {
            kernel: cx.inject("kernel")?,
            a: cx.inject("a")?,
        })
    }
}

#[async_trait]
impl Lifecycle for ProviderB {
    async fn on_configure(&self, _declarations: &[DeclarationInfo]) -> Result<()> {
        append(&*self.kernel.get()?, "trace.configure", "->B");
        Ok(())
    }

    async fn on_start(&self, _declarations: &[DeclarationInfo]) -> Result<()> {
        append(&*self.kernel.get()?, "trace.start", "B");
        Ok(())
    }

    async fn on_stop(&self, _declarations: &[DeclarationInfo]) -> Result<()> {
        append(&*self.kernel.get()?, "trace.stop", "B");
        Ok(())
    }
}

/// Component with process-local, non-state-bound data.
pub struct Session {
    pub x: Mutex<String>,
}

impl Component for Session {
    fn construct(_cx: &Construction<'_>) -> Result<Self> {
        Ok(Session {
            x: Mutex::new("initial".to_string()),
        })
    }
}
