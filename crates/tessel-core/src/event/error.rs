//! # Tessel Event Bus Errors
//!
//! Errors that end up inside `emit()` result vectors or surface from
//! [`Observer::wait`](crate::event::Observer::wait).
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventSystemError {
    #[error("Handler for event '{event}' panicked: {message}")]
    HandlerPanicked { event: String, message: String },

    #[error("Wait on event '{event}' was abandoned before it fired")]
    WaitAbandoned { event: String },
}
