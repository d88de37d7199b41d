use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;

use crate::kernel::error::{ErrorKind, Result};
use crate::kernel::{GetOptions, Kernel};
use crate::registry::{Definition, Descriptor, Token};
use crate::resolver::{Component, Construction, Inject};

static BUILT: AtomicUsize = AtomicUsize::new(0);

struct Counter {
    serial: usize,
}

impl Component for Counter {
    fn construct(_cx: &Construction<'_>) -> Result<Self> {
        Ok(Counter {
            serial: BUILT.fetch_add(1, Ordering::SeqCst),
        })
    }
}

trait Greeter: Send + Sync {
    fn greet(&self) -> String;
}

struct English;

impl Greeter for English {
    fn greet(&self) -> String {
        "hello".to_string()
    }
}

impl Component for English {
    fn construct(_cx: &Construction<'_>) -> Result<Self> {
        Ok(English)
    }
}

struct Welcome {
    greeter: Inject<dyn Greeter>,
}

impl Component for Welcome {
    fn describe(d: &mut Descriptor<Self>) {
        d.inject_token::<dyn Greeter>("greeter");
    }

    fn construct(cx: &Construction<'_>) -> Result<Self> {
        Ok(Welcome {
            greeter: cx.inject("greeter")?,
        })
    }
}

#[test]
fn test_singleton_returns_same_instance() {
    let kernel = Kernel::new();
    let first = kernel.get::<Counter>().expect("resolve counter");
    let second = kernel.get::<Counter>().expect("resolve counter");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.serial, second.serial);
}

#[test]
fn test_transient_builds_every_time() {
    let kernel = Kernel::new();
    kernel
        .with([Definition::<Counter>::class().transient().into()])
        .expect("declare transient");

    let first = kernel.resolve::<Counter>().expect("resolve");
    let second = kernel.resolve::<Counter>().expect("resolve");
    assert!(!Arc::ptr_eq(&first, &second));
    assert_ne!(first.serial, second.serial);
}

#[test]
fn test_trait_object_token() {
    let kernel = Kernel::new();
    kernel
        .with([Definition::<dyn Greeter>::provide().use_class::<English, _>(|e| e).into()])
        .expect("declare greeter");

    let welcome = kernel.get::<Welcome>().expect("resolve welcome");
    assert!(!welcome.greeter.is_resolved());
    assert_eq!(welcome.greeter.get().expect("greeter").greet(), "hello");
    assert!(welcome.greeter.is_resolved());

    // Resolving on behalf of Welcome recorded the dependency edge.
    let info = kernel
        .declarations()
        .into_iter()
        .find(|d| d.token == Token::of::<Welcome>())
        .expect("welcome declared");
    assert_eq!(info.children, vec![Token::of::<dyn Greeter>()]);
}

#[test]
fn test_missing_token_fails_lazily() {
    let kernel = Kernel::new();
    let welcome = kernel.get::<Welcome>().expect("construction does not resolve eagerly");
    let err = welcome.greeter.get().err().expect("greeter is not declared");
    assert_eq!(err.kind(), ErrorKind::Resolution);
}

#[test]
fn test_factory_and_value_uses() {
    let kernel = Kernel::new();
    kernel
        .with([
            Definition::<String>::provide()
                .use_factory(|cx: &Kernel| Ok(Arc::new(format!("built in {}", cx.id()))))
                .into(),
            Definition::<u32>::provide().use_value(Arc::new(7)).into(),
        ])
        .expect("declare factory and value");

    assert_eq!(*kernel.resolve::<String>().expect("factory"), "built in kernel");
    assert_eq!(*kernel.resolve::<u32>().expect("value"), 7);
}

#[test]
fn test_get_with_instance() {
    let kernel = Kernel::new();
    let given = Arc::new(Counter { serial: 999 });
    let resolved = kernel
        .get_with(
            Definition::<Counter>::class(),
            GetOptions {
                instance: Some(given.clone()),
                ..GetOptions::default()
            },
        )
        .expect("resolve given instance");
    assert!(Arc::ptr_eq(&given, &resolved));
}

#[test]
fn test_get_with_unregistered_instance_is_invalid() {
    let kernel = Kernel::new();
    let err = kernel
        .get_with(
            Definition::<Counter>::class(),
            GetOptions {
                instance: Some(Arc::new(Counter { serial: 1 })),
                register: false,
                ..GetOptions::default()
            },
        )
        .err()
        .expect("instance without registration");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(!kernel.is_declared::<Counter>());
}

struct Audit;

impl Component for Audit {
    fn describe(d: &mut Descriptor<Self>) {
        d.listen("record", "audit", |_this: Arc<Audit>, _cx: Kernel, data: Value| async move {
            Ok(data)
        });
    }

    fn construct(_cx: &Construction<'_>) -> Result<Self> {
        Ok(Audit)
    }
}

#[test]
fn test_listener_bindings_only_for_singletons() {
    let kernel = Kernel::new();
    kernel
        .with([Definition::<Audit>::class().transient().into()])
        .expect("declare transient audit");
    for _ in 0..3 {
        kernel.resolve::<Audit>().expect("transient audit");
    }
    assert_eq!(kernel.bus().listener_count(Some("audit")), 0);

    let singleton = Kernel::new();
    singleton.get::<Audit>().expect("singleton audit");
    singleton.get::<Audit>().expect("cached audit");
    assert_eq!(singleton.bus().listener_count(Some("audit")), 1);
}

#[test]
fn test_provide_without_use_is_invalid() {
    let kernel = Kernel::new();
    let err = kernel
        .with([Definition::<dyn Greeter>::provide().into()])
        .err()
        .expect("no use given");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_undeclared_resolve_fails() {
    let kernel = Kernel::new();
    let err = kernel.resolve::<dyn Greeter>().err().expect("not declared");
    assert_eq!(err.kind(), ErrorKind::Resolution);
}

#[test]
fn test_kernel_is_injectable() {
    struct NeedsKernel {
        kernel: Inject<Kernel>,
    }

    impl Component for NeedsKernel {
        fn describe(d: &mut Descriptor<Self>) {
            d.inject_token::<Kernel>("kernel");
        }

        fn construct(cx: &Construction<'_>) -> Result<Self> {
            Ok(NeedsKernel {
                kernel: cx.inject("kernel")?,
            })
        }
    }

    let kernel = Kernel::new();
    let holder = kernel.get::<NeedsKernel>().expect("resolve");
    let injected = holder.kernel.get().expect("kernel resolves");
    assert!(injected.ptr_eq(&kernel));

    let fork = kernel.fork(None);
    let resolved = fork.resolve::<Kernel>().expect("kernel resolves in fork");
    assert!(resolved.ptr_eq(&fork));
}

#[test]
fn test_self_resolving_factory_is_circular() {
    let kernel = Kernel::new();
    let err = kernel
        .with([Definition::<String>::provide()
            .use_factory(|cx: &Kernel| cx.resolve::<String>())
            .into()])
        .err()
        .expect("circular construction");
    assert_eq!(err.kind(), ErrorKind::Resolution);
    assert!(err.to_string().contains("circular"));
}

#[test]
fn test_injection_type_mismatch() {
    struct Wrong;

    impl Component for Wrong {
        fn describe(d: &mut Descriptor<Self>) {
            d.inject::<Counter>("counter");
        }

        fn construct(cx: &Construction<'_>) -> Result<Self> {
            let _wrong: Inject<English> = cx.inject("counter")?;
            Ok(Wrong)
        }
    }

    let kernel = Kernel::new();
    let err = kernel.get::<Wrong>().err().expect("mismatched injection");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_unknown_injection_point() {
    struct Undeclared;

    impl Component for Undeclared {
        fn construct(cx: &Construction<'_>) -> Result<Self> {
            let _missing: Inject<Counter> = cx.inject("counter")?;
            Ok(Undeclared)
        }
    }

    let err = Kernel::new().get::<Undeclared>().err().expect("no such injection point");
    assert_eq!(err.kind(), ErrorKind::Resolution);
}
