//! # tessel-core
//!
//! An in-process dependency-injection kernel: typed declarations, lazily
//! injected components, provider lifecycles, hierarchical state and a small
//! event bus, with cheap forks for per-request isolation.
pub mod event;
pub mod kernel;
pub mod registry;
pub mod resolver;
pub mod state;

// Re-export key public types/traits for easier use by the binary
pub use event::{EmitOptions, EventSystemError, Handler, ListenOptions, Observer};
pub use kernel::error::Error as KernelError;
pub use kernel::{
    Error, ErrorKind, GetOptions, Kernel, KernelBuilder, Lifecycle, LifecycleState, Result,
};
pub use registry::{AnyDefinition, Binding, Catalog, DeclarationInfo, Definition, Descriptor, Token};
pub use resolver::{Component, Construction, Inject, Setting};
pub use state::{CastHint, ConfigData, ConfigFormat, StateSystemError};

#[cfg(test)]
mod tests;
