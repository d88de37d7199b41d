//! # Tessel Kernel
//!
//! The `kernel` module is the entry point of `tessel-core`. A [`Kernel`] is one
//! context of the dependency-injection runtime: it owns the declaration graph,
//! the resolved instances, a hierarchical state store and an event bus, and it
//! drives provider lifecycles.
//!
//! ## Key Responsibilities & Components:
//!
//! - **Bootstrapping**: [`KernelBuilder`](bootstrap::KernelBuilder) seeds the
//!   root context's state from config files, the process environment and
//!   explicit values.
//! - **Context**: [`Kernel`](context::Kernel) registers definitions
//!   (`with`, `get`, `get_with`), exposes state (`state`, `set_state`, `env`)
//!   and derives isolated per-unit-of-work contexts with `fork`.
//! - **Lifecycle**: the [`Lifecycle`](lifecycle::Lifecycle) trait and the
//!   `start`/`stop` orchestration, dependencies first on the way up and last on
//!   the way down.
//! - **Core Constants**: event names and defaults in `constants`.
//! - **Error Handling**: the shared [`Error`](error::Error) type and `Result`
//!   alias in `error`.
pub mod bootstrap;
pub mod constants;
pub mod context;
pub mod error;
pub mod lifecycle;

pub use bootstrap::KernelBuilder;
pub use context::{GetOptions, Kernel, WeakKernel};
pub use error::{Error, ErrorKind, KernelLifecyclePhase, Result};
pub use lifecycle::{Lifecycle, LifecycleState};

// Test module declaration
#[cfg(test)]
mod tests;
