use std::fs;
use std::path::Path;

use serde_json::json;
use tempfile::tempdir;

use crate::state::{ConfigData, ConfigFormat, StateSystemError};

#[test]
fn test_format_from_path() {
    assert_eq!(ConfigFormat::from_path(Path::new("app.json")), Some(ConfigFormat::Json));
    #[cfg(feature = "yaml-config")]
    assert_eq!(ConfigFormat::from_path(Path::new("app.YML")), Some(ConfigFormat::Yaml));
    #[cfg(feature = "toml-config")]
    assert_eq!(ConfigFormat::from_path(Path::new("app.toml")), Some(ConfigFormat::Toml));
    assert_eq!(ConfigFormat::from_path(Path::new("app.ini")), None);
    assert_eq!(ConfigFormat::from_path(Path::new("noext")), None);
}

#[test]
fn test_json_is_flattened_to_dotted_keys() {
    let data = ConfigData::deserialize(
        r#"{"port": 8080, "db": {"url": "postgres://x", "pool": {"size": 4}}, "tags": ["a"]}"#,
        ConfigFormat::Json,
    )
    .expect("valid json");

    assert_eq!(data.len(), 4);
    assert_eq!(data.get::<u16>("port"), Some(8080));
    assert_eq!(data.get::<String>("db.url").as_deref(), Some("postgres://x"));
    assert_eq!(data.get::<u32>("db.pool.size"), Some(4));
    assert_eq!(data.get::<Vec<String>>("tags"), Some(vec!["a".to_string()]));
}

#[test]
fn test_non_table_root_is_rejected() {
    let err = ConfigData::deserialize("[1, 2]", ConfigFormat::Json).unwrap_err();
    assert!(matches!(err, StateSystemError::Deserialization { .. }));

    let err = ConfigData::deserialize("{ broken", ConfigFormat::Json).unwrap_err();
    assert!(matches!(err, StateSystemError::Deserialization { .. }));
}

#[cfg(feature = "toml-config")]
#[test]
fn test_load_toml_file() {
    let dir = tempdir().expect("Failed to create temporary directory");
    let path = dir.path().join("app.toml");
    fs::write(&path, "name = \"demo\"\n[server]\nport = \"9000\"\n").expect("write config");

    let data = ConfigData::load(&path).expect("load toml");
    assert_eq!(data.get::<String>("name").as_deref(), Some("demo"));
    assert_eq!(data.get::<String>("server.port").as_deref(), Some("9000"));
}

#[cfg(feature = "yaml-config")]
#[test]
fn test_load_yaml_file() {
    let dir = tempdir().expect("Failed to create temporary directory");
    let path = dir.path().join("app.yaml");
    fs::write(&path, "feature:\n  enabled: \"true\"\n").expect("write config");

    let data = ConfigData::load(&path).expect("load yaml");
    assert_eq!(data.get::<String>("feature.enabled").as_deref(), Some("true"));
}

#[test]
fn test_load_errors() {
    let dir = tempdir().expect("Failed to create temporary directory");

    let unsupported = dir.path().join("app.ini");
    fs::write(&unsupported, "a=b").expect("write config");
    assert!(matches!(
        ConfigData::load(&unsupported),
        Err(StateSystemError::UnsupportedConfigFormat { .. })
    ));

    let missing = dir.path().join("missing.json");
    assert!(matches!(
        ConfigData::load(&missing),
        Err(StateSystemError::Io { .. })
    ));
}

#[test]
fn test_merge_overrides() {
    let mut base = ConfigData::new();
    base.set("a", "1");
    base.set("b", "2");
    let mut other = ConfigData::new();
    other.set("b", "3");
    base.merge(other);

    assert_eq!(base.get::<String>("a").as_deref(), Some("1"));
    assert_eq!(base.get::<String>("b").as_deref(), Some("3"));
}

#[test]
fn test_vars_with_prefix() {
    let vars = vec![
        ("APP_PORT".to_string(), "8080".to_string()),
        ("APP_DB__URL".to_string(), "sqlite://".to_string()),
        ("APP_".to_string(), "ignored".to_string()),
        ("OTHER".to_string(), "x".to_string()),
    ];
    let data = ConfigData::from_vars(vars, Some("APP_"));

    assert_eq!(data.len(), 2);
    assert_eq!(data.get::<String>("port").as_deref(), Some("8080"));
    assert_eq!(data.get::<String>("db.url").as_deref(), Some("sqlite://"));

    let all = ConfigData::from_vars(vec![("X".to_string(), "1".to_string())], None);
    assert_eq!(all.into_values().get("X"), Some(&json!("1")));
}
