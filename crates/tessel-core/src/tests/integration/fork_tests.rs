#![cfg(test)]

use std::sync::Arc;

use serde_json::{Value, json};

use crate::event::{EmitOptions, ListenOptions};
use crate::kernel::Kernel;
use crate::registry::Definition;
use crate::tests::integration::common::{ProviderB, Session, text};

#[test]
fn test_instance_fields_are_isolated_across_forks() {
    let kernel = Kernel::new();
    let root_session = kernel.get::<Session>().expect("root session");

    let child = kernel.fork(None);
    let child_session = child.get::<Session>().expect("child session");
    *child_session.x.lock().unwrap() = "c".to_string();

    assert!(!Arc::ptr_eq(&root_session, &child_session));
    assert_eq!(*root_session.x.lock().unwrap(), "initial");
    assert_eq!(*kernel.get::<Session>().expect("root session").x.lock().unwrap(), "initial");
}

#[tokio::test]
async fn test_started_kernel_forks_without_rerunning_hooks() {
    let kernel = Kernel::new();
    kernel
        .with([Definition::<ProviderB>::class().into()])
        .expect("declare B");
    kernel.start().await.expect("start");

    let fork = kernel.fork(None);
    assert!(fork.is_started());
    let b = fork.get::<ProviderB>().expect("B in fork");
    b.a.get().expect("A in fork");
    assert_eq!(text(&kernel, "trace.start"), "AB", "no hook ran for the fork");
}

#[tokio::test]
async fn test_request_per_fork() {
    let kernel = Kernel::builder().state("greeting", "hello").build();
    kernel.on_with("request", ListenOptions::forked(), |cx: Kernel, data: Value| async move {
        let name = data["name"].as_str().unwrap_or("anonymous").to_string();
        cx.set_state("request.name", name);
        cx.set_state("reply", "${greeting}, ${request.name}");
        Ok(cx.env("reply", None).unwrap_or(Value::Null))
    });

    for name in ["ada", "linus"] {
        let results = kernel
            .emit("request", json!({ "name": name }), EmitOptions::default())
            .await;
        assert_eq!(results[0].as_ref().ok(), Some(&json!(format!("hello, {}", name))));
    }
    assert_eq!(kernel.state("request.name"), None);
    assert_eq!(kernel.state("reply"), None);
}
