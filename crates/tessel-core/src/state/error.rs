//! # Tessel State Store Errors
//!
//! Errors raised by state bindings and by the configuration loaders that seed
//! the root store.
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateSystemError {
    #[error("Missing configuration '{key}' for readonly binding '{class}.{property}'")]
    MissingConfiguration {
        class: String,
        property: String,
        key: String,
    },

    #[error("Binding '{property}' is readonly and cannot write state key '{key}'")]
    ReadonlyBinding { property: String, key: String },

    #[error("Value of state key '{key}' cannot be converted: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Unknown or unsupported config format for path: {path}")]
    UnsupportedConfigFormat { path: PathBuf },

    #[error("I/O error during '{operation}' on path '{path}': {source}")]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
        operation: String,
    },

    #[error("Failed to deserialize {format} config: {message}")]
    Deserialization { format: String, message: String },
}
