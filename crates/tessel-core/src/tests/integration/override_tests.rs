#![cfg(test)]

use std::sync::Arc;

use crate::kernel::Kernel;
use crate::kernel::error::Result;
use crate::registry::{Definition, Descriptor};
use crate::resolver::{Component, Construction, Inject};

trait Backend: Send + Sync {
    fn name(&self) -> &'static str;
}

struct RealBackend;

impl Backend for RealBackend {
    fn name(&self) -> &'static str {
        "real"
    }
}

impl Component for RealBackend {
    fn construct(_cx: &Construction<'_>) -> Result<Self> {
        Ok(RealBackend)
    }
}

struct MockBackend;

impl Backend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }
}

impl Component for MockBackend {
    fn construct(_cx: &Construction<'_>) -> Result<Self> {
        Ok(MockBackend)
    }
}

struct Client {
    b: Inject<dyn Backend>,
}

impl Component for Client {
    fn describe(d: &mut Descriptor<Self>) {
        d.inject_token::<dyn Backend>("b");
    }

    fn construct(cx: &Construction<'_>) -> Result<Self> {
        Ok(Client { b: cx.inject("b")? })
    }
}

fn backend<C: Component + Backend>() -> Definition<dyn Backend> {
    Definition::<dyn Backend>::provide().use_class::<C, _>(|c| c)
}

#[test]
fn test_mock_replaces_dependency() {
    let kernel = Kernel::new();
    kernel
        .with([backend::<MockBackend>().into(), Definition::<Client>::class().into()])
        .expect("declare mock and client");

    let client = kernel.get::<Client>().expect("client");
    assert_eq!(client.b.get().expect("backend").name(), "mock");
}

#[test]
fn test_mock_after_real_while_stopped() {
    let kernel = Kernel::new();
    kernel
        .with([backend::<RealBackend>().into(), Definition::<Client>::class().into()])
        .expect("declare real");
    kernel
        .with([backend::<MockBackend>().into()])
        .expect("swap in the mock");

    // The client instance was built earlier; its lazy handle resolves the new declaration.
    let client = kernel.get::<Client>().expect("client");
    assert_eq!(client.b.get().expect("backend").name(), "mock");
}

#[test]
fn test_value_override() {
    let kernel = Kernel::new();
    let fixed: Arc<dyn Backend> = Arc::new(MockBackend);
    kernel
        .with([
            Definition::<dyn Backend>::provide().use_value(fixed.clone()).into(),
            Definition::<Client>::class().into(),
        ])
        .expect("declare value");

    let client = kernel.get::<Client>().expect("client");
    assert!(Arc::ptr_eq(&client.b.get().expect("backend"), &fixed));
}
