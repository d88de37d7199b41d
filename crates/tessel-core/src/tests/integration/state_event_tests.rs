#![cfg(test)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use serde_json::{Value, json};

use crate::event::{EmitOptions, ListenOptions};
use crate::kernel::Kernel;
use crate::state::CastHint;

#[test]
fn test_port_lookup_with_and_without_cast() {
    let kernel = Kernel::new();
    kernel.set_state("port", "8080");

    assert_eq!(kernel.env("port", None), Some(json!("8080")));
    assert_eq!(kernel.env("port", Some(CastHint::Number)), Some(json!(8080)));
}

#[tokio::test]
async fn test_unique_and_free() {
    let kernel = Kernel::new();
    let unique_hits = Arc::new(AtomicU32::new(0));
    let plain_hits = Arc::new(AtomicU32::new(0));

    let u = unique_hits.clone();
    kernel.on_with("evt", ListenOptions::unique(), move |_, _| {
        u.fetch_add(1, Ordering::SeqCst);
        async { Ok(Value::Null) }
    });
    let p = plain_hits.clone();
    let observer = kernel.on("evt", move |_, _| {
        p.fetch_add(1, Ordering::SeqCst);
        async { Ok(Value::Null) }
    });

    for _ in 0..3 {
        kernel.emit("evt", Value::Null, EmitOptions::default()).await;
    }
    observer.free();
    kernel.emit("evt", Value::Null, EmitOptions::default()).await;

    assert_eq!(unique_hits.load(Ordering::SeqCst), 1);
    assert_eq!(plain_hits.load(Ordering::SeqCst), 3);
}
