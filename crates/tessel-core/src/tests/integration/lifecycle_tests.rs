#![cfg(test)]

use crate::kernel::error::ErrorKind;
use crate::kernel::{Kernel, LifecycleState};
use crate::registry::{Definition, Token};
use crate::tests::integration::common::{ProviderA, ProviderB, text};

#[tokio::test]
async fn test_provider_trace_through_start_and_stop() {
    let kernel = Kernel::new();
    kernel
        .with([Definition::<ProviderB>::class().into()])
        .expect("declare B");

    kernel.start().await.expect("start");
    assert_eq!(text(&kernel, "trace.configure"), "->A->B");
    assert_eq!(text(&kernel, "trace.start"), "AB");
    assert_eq!(
        kernel.start_order(),
        vec![Token::of::<ProviderA>(), Token::of::<ProviderB>()]
    );

    kernel.stop().await.expect("stop");
    assert_eq!(text(&kernel, "trace.stop"), "BA");
}

#[tokio::test]
async fn test_restart_cycle() {
    let kernel = Kernel::new();
    kernel
        .with([Definition::<ProviderB>::class().into()])
        .expect("declare B");

    assert_eq!(kernel.stop().await.err().map(|e| e.kind()), Some(ErrorKind::IllegalState));
    kernel.start().await.expect("first start");
    assert_eq!(kernel.start().await.err().map(|e| e.kind()), Some(ErrorKind::IllegalState));
    kernel.stop().await.expect("stop");
    kernel.start().await.expect("second start");

    assert_eq!(kernel.lifecycle_state(), LifecycleState::Started);
    assert_eq!(text(&kernel, "trace.start"), "ABAB");
    assert_eq!(text(&kernel, "trace.stop"), "BA");
}

#[tokio::test]
async fn test_singleton_identity_and_lazy_dependency() {
    let kernel = Kernel::new();
    let b = kernel.get::<ProviderB>().expect("resolve B");
    let again = kernel.get::<ProviderB>().expect("resolve B again");
    assert!(std::sync::Arc::ptr_eq(&b, &again));

    assert!(!b.a.is_resolved());
    let a = b.a.get().expect("resolve A through B");
    assert!(std::sync::Arc::ptr_eq(&a, &kernel.get::<ProviderA>().expect("A")));
}
