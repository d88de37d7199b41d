use std::fs;
use std::sync::Arc;

use serde_json::json;
use tempfile::tempdir;

use crate::kernel::bootstrap::*;
use crate::kernel::error::ErrorKind;
use crate::kernel::{Kernel, LifecycleState};
use crate::registry::Catalog;
use crate::state::ConfigData;

#[test]
fn test_new_kernel_defaults() {
    let kernel = Kernel::new();
    assert_eq!(kernel.id(), "kernel");
    assert!(kernel.parent().is_none());
    assert_eq!(kernel.lifecycle_state(), LifecycleState::Stopped);
    assert!(kernel.declarations().is_empty());
    assert!(kernel.snapshot().is_empty());
}

#[test]
fn test_builder_layers_sources_in_order() {
    let dir = tempdir().expect("Failed to create temporary directory");
    let path = dir.path().join("app.json");
    fs::write(&path, r#"{"port": "8080", "db": {"url": "file.db"}}"#).expect("write config");

    let mut overrides = ConfigData::new();
    overrides.set("db.url", "memory");

    let kernel = KernelBuilder::new()
        .id("app")
        .config_file(&path)
        .expect("load config")
        .config(overrides)
        .state("port", "9090")
        .build();

    assert_eq!(kernel.id(), "app");
    assert_eq!(kernel.state("port"), Some(json!("9090")));
    assert_eq!(kernel.state("db.url"), Some(json!("memory")));
}

#[test]
fn test_builder_rejects_unknown_config_format() {
    let dir = tempdir().expect("Failed to create temporary directory");
    let path = dir.path().join("app.conf");
    fs::write(&path, "port=1").expect("write config");

    let err = KernelBuilder::new().config_file(&path).err().expect("unsupported format");
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn test_builder_shares_catalog() {
    struct Thing;
    impl crate::resolver::Component for Thing {
        fn construct(_cx: &crate::resolver::Construction<'_>) -> crate::kernel::Result<Self> {
            Ok(Thing)
        }
    }

    let catalog = Arc::new(Catalog::new());
    let first = KernelBuilder::new().catalog(catalog.clone()).build();
    let second = KernelBuilder::new().catalog(catalog.clone()).build();
    first.get::<Thing>().expect("resolve");
    second.get::<Thing>().expect("resolve");
    assert_eq!(catalog.len(), 1);
}
