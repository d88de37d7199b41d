use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tessel_core::event::ListenOptions;
use tessel_core::{
    Binding, Component, Construction, DeclarationInfo, Descriptor, Inject, Kernel, Lifecycle, Result, Setting,
};

/// State keys the demo providers append their hook calls to.
pub const TRACE_CONFIGURE: &str = "trace.configure";
pub const TRACE_START: &str = "trace.start";
pub const TRACE_STOP: &str = "trace.stop";

fn record(kernel: &Kernel, key: &str, entry: &str) {
    let current = kernel
        .state(key)
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    kernel.set_state(key, format!("{}{}", current, entry));
}

/// Pretend storage backend; "connects" on start.
pub struct Database {
    kernel: Inject<Kernel>,
    url: Setting,
    connected: AtomicBool,
}

impl Database {
    pub fn url(&self) -> String {
        match self.url.get() {
            Some(Value::String(url)) => url,
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Component for Database {
    fn describe(d: &mut Descriptor<Self>) {
        d.inject_token::<Kernel>("kernel")
            .bind(Binding::new("url", "db.url").default_value("memory://"))
            .lifecycle();
    }

    fn construct(cx: &Construction<'_>) -> Result<Self> {
        Ok(Database {
            kernel: cx.inject("kernel")?,
            url: cx.setting("url")?,
            connected: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Lifecycle for Database {
    async fn on_configure(&self, declarations: &[DeclarationInfo]) -> Result<()> {
        log::debug!("Database sees {} declarations", declarations.len());
        record(&*self.kernel.get()?, TRACE_CONFIGURE, "->Database");
        Ok(())
    }

    async fn on_start(&self, _declarations: &[DeclarationInfo]) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        log::info!("Database connected to {}", self.url());
        record(&*self.kernel.get()?, TRACE_START, "Database");
        Ok(())
    }

    async fn on_stop(&self, _declarations: &[DeclarationInfo]) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        record(&*self.kernel.get()?, TRACE_STOP, "Database");
        Ok(())
    }
}

/// Answers `request` events, each in its own fork.
pub struct Greeter {
    kernel: Inject<Kernel>,
    db: Inject<Database>,
    greeting: Setting,
}

impl Greeter {
    fn handle(&self, cx: &Kernel, data: &Value) -> Result<Value> {
        let name = data["name"].as_str().unwrap_or("guest");
        cx.set_state("request.name", name);
        let greeting = self
            .greeting
            .value::<String>()?
            .unwrap_or_else(|| "hello".to_string());
        let db = self.db.get()?;
        Ok(json!({
            "reply": format!("{}, {}", greeting, name),
            "context": cx.id(),
            "db": db.url(),
        }))
    }
}

impl Component for Greeter {
    fn describe(d: &mut Descriptor<Self>) {
        d.inject_token::<Kernel>("kernel")
            .inject::<Database>("db")
            .bind(Binding::new("greeting", "greeting").readonly().default_value("hello"))
            .listen_with(
                "handle",
                "request",
                ListenOptions::forked(),
                |this: Arc<Greeter>, cx: Kernel, data: Value| async move { this.handle(&cx, &data) },
            )
            .lifecycle();
    }

    fn construct(cx: &Construction<'_>) -> Result<Self> {
        Ok(Greeter {
            kernel: cx.inject("kernel")?,
            db: cx.inject("db")?,
            greeting: cx.setting("greeting")?,
        })
    }
}

#[async_trait]
impl Lifecycle for Greeter {
    async fn on_configure(&self, _declarations: &[DeclarationInfo]) -> Result<()> {
        record(&*self.kernel.get()?, TRACE_CONFIGURE, "->Greeter");
        Ok(())
    }

    async fn on_start(&self, _declarations: &[DeclarationInfo]) -> Result<()> {
        let db = self.db.get()?;
        if !db.is_connected() {
            return Err("database is not connected".into());
        }
        record(&*self.kernel.get()?, TRACE_START, "Greeter");
        Ok(())
    }

    async fn on_stop(&self, _declarations: &[DeclarationInfo]) -> Result<()> {
        record(&*self.kernel.get()?, TRACE_STOP, "Greeter");
        Ok(())
    }
}
