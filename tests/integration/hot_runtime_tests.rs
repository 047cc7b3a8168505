use async_trait::async_trait;
use ember::client::HotRuntime;
use ember::core::interfaces::{ImportedModule, ModuleImporter, PageReloader};
use ember::core::protocol::Update;
use ember::utils::Result;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Importer that records into a shared log and yields mid-import
struct OrderRecordingImporter {
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ModuleImporter for OrderRecordingImporter {
    async fn import(&self, url: &str) -> Result<ImportedModule> {
        self.log.lock().push(format!("import-start {}", url));
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.log.lock().push(format!("import-end {}", url));
        Ok(ImportedModule {
            url: url.to_string(),
            exports: Value::Null,
        })
    }
}

#[derive(Default)]
struct CountingReloader(AtomicUsize);

impl PageReloader for CountingReloader {
    fn reload(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn runtime_with_log() -> (Arc<HotRuntime>, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let importer = Arc::new(OrderRecordingImporter { log: log.clone() });
    let (runtime, _upstream) = HotRuntime::new(importer, Arc::new(CountingReloader::default()));
    (runtime, log)
}

#[tokio::test]
async fn test_updates_apply_strictly_in_order() {
    let (runtime, log) = runtime_with_log();

    for owner in ["/src/A.js", "/src/B.js"] {
        let ctx = runtime.create_hot_context(owner);
        let entry = log.clone();
        ctx.dispose(move |_| entry.lock().push(format!("dispose {}", owner)));
        let entry = log.clone();
        ctx.accept_dep("/src/shared.js", move |_| entry.lock().push(format!("accept {}", owner)));
    }

    runtime
        .handle_update(&[
            Update::js("/src/A.js", "/src/shared.js", 1),
            Update::js("/src/B.js", "/src/shared.js", 1),
        ])
        .await
        .unwrap();

    assert_eq!(
        *log.lock(),
        vec![
            "dispose /src/A.js",
            "import-start /src/shared.js?t=1",
            "import-end /src/shared.js?t=1",
            "accept /src/A.js",
            "dispose /src/B.js",
            "import-start /src/shared.js?t=1",
            "import-end /src/shared.js?t=1",
            "accept /src/B.js",
        ]
    );
}

#[tokio::test]
async fn test_multiple_accept_registrations_tested_independently() {
    let (runtime, log) = runtime_with_log();
    let ctx = runtime.create_hot_context("/src/App.js");

    for (tag, deps) in [("one", vec!["/src/a.js"]), ("two", vec!["/src/b.js", "/src/a.js"]), ("three", vec!["/src/c.js"])] {
        let entry = log.clone();
        ctx.accept_deps(deps, move |_| entry.lock().push(format!("accept {}", tag)));
    }

    runtime
        .handle_update(&[Update::js("/src/App.js", "/src/a.js", 9)])
        .await
        .unwrap();

    let accepted: Vec<String> = log.lock().iter().filter(|l| l.starts_with("accept")).cloned().collect();
    assert_eq!(accepted, vec!["accept one", "accept two"]);
}

#[tokio::test]
async fn test_pruned_path_behaves_like_unregistered() {
    let (runtime, log) = runtime_with_log();
    let ctx = runtime.create_hot_context("/src/Old.js");

    let entry = log.clone();
    ctx.accept_self(move |_| entry.lock().push("accept".to_string()));
    let entry = log.clone();
    ctx.dispose(move |data| entry.lock().push(format!("dispose {}", data.get("state").unwrap_or_default())));
    let entry = log.clone();
    ctx.prune(move |data| entry.lock().push(format!("prune {}", data.get("state").unwrap_or_default())));
    ctx.data().set("state", json!(42));

    runtime.handle_prune(&["/src/Old.js".to_string()]);
    assert_eq!(*log.lock(), vec!["dispose 42", "prune 42"]);

    {
        let registry = runtime.registry();
        for path in ["/src/Old.js", "/src/Never.js"] {
            assert!(!registry.is_registered(path));
            assert_eq!(registry.accept_count(path), 0);
            assert!(!registry.has_dispose(path));
            assert!(!registry.has_prune(path));
            assert!(!registry.has_data(path));
        }
    }

    log.lock().clear();
    runtime
        .handle_update(&[Update::js("/src/Old.js", "/src/Old.js", 2)])
        .await
        .unwrap();
    assert_eq!(
        *log.lock(),
        vec!["import-start /src/Old.js?t=2", "import-end /src/Old.js?t=2"]
    );

    let fresh = runtime.create_hot_context("/src/Old.js");
    assert_eq!(fresh.data().get("state"), None);
}

#[tokio::test]
async fn test_update_message_publishes_before_and_after() {
    let (runtime, log) = runtime_with_log();
    for event in ["vite:beforeUpdate", "vite:afterUpdate"] {
        let entry = log.clone();
        runtime.events().subscribe(event, move |payload| {
            entry.lock().push(format!("{} {}", event, payload["updates"].as_array().map_or(0, Vec::len)));
        });
    }

    runtime
        .handle_text(r#"{"type":"update","updates":[{"type":"js-update","path":"/a.js","acceptedPath":"/a.js","timestamp":3}]}"#)
        .await;

    let log = log.lock();
    assert_eq!(log.first().map(String::as_str), Some("vite:beforeUpdate 1"));
    assert_eq!(log.last().map(String::as_str), Some("vite:afterUpdate 1"));
}

#[tokio::test]
async fn test_error_message_reaches_listeners() {
    let (runtime, log) = runtime_with_log();
    let ctx = runtime.create_hot_context("/src/App.js");
    let entry = log.clone();
    ctx.on("vite:error", move |payload| {
        entry.lock().push(payload["err"]["message"].as_str().unwrap_or_default().to_string())
    });

    runtime
        .handle_text(r#"{"type":"error","err":{"message":"boom","stack":"at x"}}"#)
        .await;

    assert_eq!(*log.lock(), vec!["boom"]);
}
