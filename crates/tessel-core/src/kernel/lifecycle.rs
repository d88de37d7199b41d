//! Lifecycle orchestration: configure, start and stop hooks across providers.
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::event::EmitOptions;
use crate::kernel::constants;
use crate::kernel::context::Kernel;
use crate::kernel::error::{Error, KernelLifecyclePhase, Result};
use crate::registry::{DeclarationInfo, Token};

/// Hooks of a provider. Every hook receives all declarations of the context.
///
/// Implementors opt in with `Descriptor::lifecycle()` in `Component::describe`.
#[async_trait]
pub trait Lifecycle: Send + Sync + 'static {
    async fn on_configure(&self, _declarations: &[DeclarationInfo]) -> Result<()> {
        Ok(())
    }

    async fn on_start(&self, _declarations: &[DeclarationInfo]) -> Result<()> {
        Ok(())
    }

    async fn on_stop(&self, _declarations: &[DeclarationInfo]) -> Result<()> {
        Ok(())
    }
}

/// Where a context is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Stopped,
    Starting,
    Started,
    Stopping,
}

impl LifecycleState {
    /// The state a transition started from; forks inherit this.
    pub fn settled(self) -> Self {
        match self {
            LifecycleState::Starting => LifecycleState::Stopped,
            LifecycleState::Stopping => LifecycleState::Started,
            other => other,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Started => "started",
            LifecycleState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Order nodes so that every node comes after the nodes in its dependency
/// closure. Stable: ties keep their input order. Nodes that depend on each
/// other are left in input order.
pub(crate) fn dependency_order(nodes: &[(Token, HashSet<Token>)]) -> Vec<usize> {
    let mut remaining: Vec<usize> = (0..nodes.len()).collect();
    let mut order = Vec::with_capacity(nodes.len());
    while !remaining.is_empty() {
        let ready = remaining
            .iter()
            .position(|&i| {
                let (token, closure) = &nodes[i];
                remaining.iter().all(|&j| {
                    j == i || !closure.contains(&nodes[j].0) || nodes[j].1.contains(token)
                })
            })
            .unwrap_or(0);
        order.push(remaining.remove(ready));
    }
    order
}

type Providers = Vec<(Token, Arc<dyn Lifecycle>)>;

impl Kernel {
    /// Run every provider's `on_configure`, then every `on_start`, dependencies first.
    pub async fn start(&self) -> Result<()> {
        self.begin(LifecycleState::Stopped, LifecycleState::Starting, "start")?;
        log::info!("Starting kernel context {}", self.id());

        match self.run_start().await {
            Ok(()) => {
                *self.phase() = LifecycleState::Started;
                log::info!("Kernel context {} started", self.id());
                self.announce(constants::KERNEL_START).await;
                Ok(())
            }
            Err(e) => {
                *self.phase() = LifecycleState::Stopped;
                log::error!("Kernel context {} failed to start: {}", self.id(), e);
                Err(e)
            }
        }
    }

    /// Run every provider's `on_stop`, dependents first.
    pub async fn stop(&self) -> Result<()> {
        self.begin(LifecycleState::Started, LifecycleState::Stopping, "stop")?;
        log::info!("Stopping kernel context {}", self.id());

        match self.run_stop().await {
            Ok(()) => {
                *self.phase() = LifecycleState::Stopped;
                log::info!("Kernel context {} stopped", self.id());
                self.announce(constants::KERNEL_STOP).await;
                Ok(())
            }
            Err(e) => {
                *self.phase() = LifecycleState::Started;
                log::error!("Kernel context {} failed to stop: {}", self.id(), e);
                Err(e)
            }
        }
    }

    fn begin(&self, from: LifecycleState, to: LifecycleState, action: &str) -> Result<()> {
        let mut phase = self.phase();
        if *phase != from {
            return Err(Error::IllegalState(format!(
                "cannot {} kernel context {} while it is {}",
                action,
                self.id(),
                *phase
            )));
        }
        *phase = to;
        Ok(())
    }

    async fn run_start(&self) -> Result<()> {
        let unresolved: Vec<Token> = {
            let registry = self.registry();
            registry
                .iter()
                .filter(|d| d.singleton && d.instance.is_none() && d.using.is_provider(self.catalog()))
                .map(|d| d.token)
                .collect()
        };
        for token in unresolved {
            self.resolve_token(token, None)?;
        }

        let (providers, declarations) = self.providers_in_order();
        for (token, provider) in &providers {
            log::debug!("Configuring {}", token);
            provider
                .on_configure(&declarations)
                .await
                .map_err(|e| Error::lifecycle(KernelLifecyclePhase::Configure, token.short_name(), e))?;
        }
        for (token, provider) in &providers {
            log::debug!("Starting {}", token);
            provider
                .on_start(&declarations)
                .await
                .map_err(|e| Error::lifecycle(KernelLifecyclePhase::Start, token.short_name(), e))?;
        }
        Ok(())
    }

    async fn run_stop(&self) -> Result<()> {
        let (providers, declarations) = self.providers_in_order();
        for (token, provider) in providers.iter().rev() {
            log::debug!("Stopping {}", token);
            provider
                .on_stop(&declarations)
                .await
                .map_err(|e| Error::lifecycle(KernelLifecyclePhase::Stop, token.short_name(), e))?;
        }
        Ok(())
    }

    /// Materialized providers in dependency order, plus the declaration view
    /// handed to their hooks.
    pub(crate) fn providers_in_order(&self) -> (Providers, Vec<DeclarationInfo>) {
        let registry = self.registry();
        let declarations = registry.infos(self.catalog());
        let mut nodes = Vec::new();
        let mut providers = Vec::new();
        for declaration in registry.iter() {
            let lifecycle = declaration
                .instance
                .as_ref()
                .and_then(|instance| instance.lifecycle().cloned());
            if let Some(lifecycle) = lifecycle {
                nodes.push((declaration.token, registry.closure(declaration.token)));
                providers.push(Some((declaration.token, lifecycle)));
            }
        }
        let ordered = dependency_order(&nodes)
            .into_iter()
            .filter_map(|i| providers[i].take())
            .collect();
        (ordered, declarations)
    }

    /// Tokens of the materialized providers, in the order `start()` runs them.
    pub fn start_order(&self) -> Vec<Token> {
        self.providers_in_order()
            .0
            .into_iter()
            .map(|(token, _)| token)
            .collect()
    }

    async fn announce(&self, event: &str) {
        let results = self
            .emit(event, json!({ "id": self.id() }), EmitOptions::default())
            .await;
        for result in results {
            if let Err(e) = result {
                log::warn!("Listener for '{}' failed: {}", event, e);
            }
        }
    }
}
