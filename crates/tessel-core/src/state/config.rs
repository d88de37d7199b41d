use std::collections::HashMap;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
#[cfg(feature = "yaml-config")]
use serde_yaml;
#[cfg(feature = "toml-config")]
use toml;

use crate::state::error::StateSystemError;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigFormat {
    /// JSON format (.json)
    Json,
    /// YAML format (.yaml, .yml) - requires "yaml-config" feature
    #[cfg(feature = "yaml-config")]
    Yaml,
    /// TOML format (.toml) - requires "toml-config" feature
    #[cfg(feature = "toml-config")]
    Toml,
}

impl ConfigFormat {
    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Json => "json",
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => "yaml",
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => "toml",
        }
    }

    /// Determine format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "json" => Some(ConfigFormat::Json),
                #[cfg(feature = "yaml-config")]
                "yaml" | "yml" => Some(ConfigFormat::Yaml),
                #[cfg(feature = "toml-config")]
                "toml" => Some(ConfigFormat::Toml),
                _ => None,
            })
    }
}

/// Flat configuration values used to seed a kernel's root state store.
///
/// Nested tables are flattened into dotted keys, so `{"db": {"url": "x"}}`
/// becomes `db.url = "x"`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigData {
    values: HashMap<String, Value>,
}

impl ConfigData {
    /// Create a new empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration from already-flat values
    pub fn from_hashmap(values: HashMap<String, Value>) -> Self {
        Self { values }
    }

    /// Get a configuration value
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Set a configuration value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Check if key exists
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Merge with another config, overriding existing values
    pub fn merge(&mut self, other: ConfigData) {
        self.values.extend(other.values);
    }

    pub fn into_values(self) -> HashMap<String, Value> {
        self.values
    }

    /// Deserialize from string based on format
    pub fn deserialize(data: &str, format: ConfigFormat) -> Result<Self, StateSystemError> {
        let document: Value = match format {
            ConfigFormat::Json => serde_json::from_str(data)
                .map_err(|e| deserialization_error("JSON", e))?,
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::from_str(data)
                .map_err(|e| deserialization_error("YAML", e))?,
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::from_str(data)
                .map_err(|e| deserialization_error("TOML", e))?,
        };

        match document {
            Value::Object(map) => {
                let mut values = HashMap::new();
                flatten_into(&mut values, None, map);
                Ok(Self { values })
            }
            Value::Null => Ok(Self::new()),
            other => Err(StateSystemError::Deserialization {
                format: format.extension().to_uppercase(),
                message: format!("expected a table at the document root, found {}", other),
            }),
        }
    }

    /// Load a config file, picking the format from its extension
    pub fn load(path: &Path) -> Result<Self, StateSystemError> {
        let format = ConfigFormat::from_path(path).ok_or_else(|| {
            StateSystemError::UnsupportedConfigFormat {
                path: path.to_path_buf(),
            }
        })?;
        let data = std::fs::read_to_string(path).map_err(|source| StateSystemError::Io {
            source,
            path: path.to_path_buf(),
            operation: "read_config".to_string(),
        })?;
        log::debug!("Loading {:?} config from {}", format, path.display());
        Self::deserialize(&data, format)
    }

    /// Import process environment variables as string values.
    ///
    /// With a prefix, only matching variables are kept; the prefix is stripped,
    /// the rest lowercased and `__` turned into `.` (`APP_DB__URL` -> `db.url`).
    pub fn from_env(prefix: Option<&str>) -> Self {
        Self::from_vars(std::env::vars(), prefix)
    }

    pub(crate) fn from_vars<I>(vars: I, prefix: Option<&str>) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let values = vars
            .into_iter()
            .filter_map(|(name, value)| match prefix {
                None => Some((name, Value::String(value))),
                Some(prefix) => name.strip_prefix(prefix).filter(|rest| !rest.is_empty()).map(|rest| {
                    (rest.to_lowercase().replace("__", "."), Value::String(value))
                }),
            })
            .collect();
        Self { values }
    }
}

fn deserialization_error(format: &str, e: impl std::fmt::Display) -> StateSystemError {
    StateSystemError::Deserialization {
        format: format.to_string(),
        message: e.to_string(),
    }
}

fn flatten_into(out: &mut HashMap<String, Value>, prefix: Option<&str>, map: Map<String, Value>) {
    for (key, value) in map {
        let full_key = match prefix {
            Some(prefix) => format!("{}.{}", prefix, key),
            None => key,
        };
        match value {
            Value::Object(nested) if !nested.is_empty() => flatten_into(out, Some(&full_key), nested),
            other => {
                out.insert(full_key, other);
            }
        }
    }
}
