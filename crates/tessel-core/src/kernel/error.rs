//! # Tessel Kernel Errors
//!
//! Defines the error type shared by every kernel surface.
//!
//! [`Error`] aggregates the subsystem errors ([`StateSystemError`],
//! [`EventSystemError`]) through `#[from]` conversions and adds the kernel's own
//! categories: illegal lifecycle transitions, invalid declarations, failed
//! resolution and failing lifecycle hooks. [`Error::kind`] folds everything
//! into the coarse [`ErrorKind`] taxonomy callers usually match on.
use std::result::Result as StdResult;

use crate::event::error::EventSystemError;
use crate::state::error::StateSystemError;
use thiserror::Error as ThisError;

/// Custom error type for the Tessel kernel
#[derive(Debug, ThisError)]
pub enum Error {
    /// Operation not allowed in the current lifecycle state
    /// (double start, stop before start, provider re-declared after start).
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// A declaration or handle was malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A token, property or action could not be resolved.
    #[error("Resolution error for '{token}': {message}")]
    Resolution { token: String, message: String },

    /// A lifecycle hook failed during a specific phase.
    #[error("Kernel lifecycle error during {phase} in '{component}': {source}")]
    KernelLifecycleError {
        phase: KernelLifecyclePhase,
        component: String,
        #[source]
        source: Box<Error>,
    },

    /// Specific, typed state store error
    #[error("State system error: {0}")]
    StateSystem(#[from] StateSystemError),

    /// Specific, typed event bus error
    #[error("Event system error: {0}")]
    EventSystem(#[from] EventSystemError),

    /// Generic error with message
    #[error("Error: {0}")]
    Other(String),
}

/// Represents a specific phase in the kernel's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
pub enum KernelLifecyclePhase {
    #[error("Configure")]
    Configure,
    #[error("Start")]
    Start,
    #[error("Stop")]
    Stop,
}

/// Coarse error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    IllegalState,
    InvalidArgument,
    MissingConfiguration,
    Resolution,
    Lifecycle,
    Event,
    Config,
    Other,
}

/// Shorthand for Result with our Error type
pub type Result<T> = StdResult<T, Error>;

impl Error {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::IllegalState(_) => ErrorKind::IllegalState,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::Resolution { .. } => ErrorKind::Resolution,
            Error::KernelLifecycleError { .. } => ErrorKind::Lifecycle,
            Error::StateSystem(StateSystemError::MissingConfiguration { .. }) => {
                ErrorKind::MissingConfiguration
            }
            Error::StateSystem(StateSystemError::ReadonlyBinding { .. }) => ErrorKind::IllegalState,
            Error::StateSystem(_) => ErrorKind::Config,
            Error::EventSystem(_) => ErrorKind::Event,
            Error::Other(_) => ErrorKind::Other,
        }
    }

    pub(crate) fn resolution(token: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Resolution {
            token: token.into(),
            message: message.into(),
        }
    }

    pub(crate) fn lifecycle(phase: KernelLifecyclePhase, component: &str, source: Error) -> Self {
        Error::KernelLifecycleError {
            phase,
            component: component.to_string(),
            source: Box::new(source),
        }
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}
