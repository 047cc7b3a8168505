use async_trait::async_trait;
use ember::client::HotRuntime;
use ember::core::interfaces::{HmrBroadcaster, ImportedModule, ModuleImporter, PageReloader};
use ember::core::models::{ChangeKind, FanOutPolicy, PropagationConfig};
use ember::core::protocol::HmrPayload;
use ember::core::services::ChangePropagator;
use ember::graph::ModuleGraph;
use ember::infrastructure::processors::{OxcSpecifierExtractor, RegexSpecifierExtractor};
use ember::infrastructure::TokioModuleSource;
use ember::resolver::DependencyResolver;
use ember::utils::Result;
use parking_lot::Mutex;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Default)]
struct RecordingChannel {
    frames: Mutex<Vec<String>>,
}

impl HmrBroadcaster for RecordingChannel {
    fn broadcast(&self, payload: &HmrPayload) -> Result<usize> {
        self.frames.lock().push(serde_json::to_string(payload)?);
        Ok(1)
    }
}

#[derive(Default)]
struct RecordingImporter {
    urls: Mutex<Vec<String>>,
}

#[async_trait]
impl ModuleImporter for RecordingImporter {
    async fn import(&self, url: &str) -> Result<ImportedModule> {
        self.urls.lock().push(url.to_string());
        Ok(ImportedModule {
            url: url.to_string(),
            exports: json!({ "greeting": "hi" }),
        })
    }
}

struct NoReload;

impl PageReloader for NoReload {
    fn reload(&self) {
        panic!("unexpected full reload");
    }
}

fn write(root: &Path, rel: &str, text: &str) -> PathBuf {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, text).unwrap();
    path
}

fn project() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = ember::infrastructure::canonical_root(&dir.path().canonicalize().unwrap()).unwrap();
    write(&root, "src/utils.js", "export const greeting = 'hello'\n");
    write(&root, "src/App.js", "import { greeting } from './utils.js'\nexport default greeting\n");
    (dir, root)
}

fn propagator(root: &Path, channel: Arc<RecordingChannel>, config: PropagationConfig) -> ChangePropagator {
    let resolver = DependencyResolver::new(Arc::new(TokioModuleSource), Arc::new(RegexSpecifierExtractor::new()));
    ChangePropagator::new(root.to_path_buf(), ModuleGraph::shared(), resolver, channel, config)
}

#[tokio::test]
async fn test_utils_change_reaches_app_accept_callback() {
    let (_dir, root) = project();
    let channel = Arc::new(RecordingChannel::default());
    let propagator = propagator(&root, channel.clone(), PropagationConfig::default());

    let app = root.join("src/App.js");
    let utils = root.join("src/utils.js");
    propagator.load_entry(&app).await;

    {
        let graph = propagator.graph().read();
        let app_id = app.to_string_lossy();
        let utils_id = utils.to_string_lossy();
        assert_eq!(graph.get_dependencies(&app_id), vec![utils_id.to_string()]);
        assert_eq!(graph.get_dependents(&utils_id), vec![app_id.to_string()]);
    }

    let importer = Arc::new(RecordingImporter::default());
    let (runtime, _upstream) = HotRuntime::new(importer.clone(), Arc::new(NoReload));
    let app_hot = runtime.create_hot_context("/src/App.js");

    let received = Arc::new(Mutex::new(Vec::new()));
    let seen = received.clone();
    app_hot.accept_deps(["/src/utils.js"], move |module| seen.lock().push(module.clone()));

    write(&root, "src/utils.js", "export const greeting = 'hi'\n");
    let payloads = propagator.on_file_change(&utils, ChangeKind::Change).await;
    assert_eq!(payloads.len(), 1);

    let frames = channel.frames.lock().clone();
    assert_eq!(frames.len(), 1);
    let frame: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
    assert_eq!(frame["type"], "update");
    assert_eq!(frame["updates"][0]["path"], "/src/App.js");
    assert_eq!(frame["updates"][0]["acceptedPath"], "/src/utils.js");

    runtime.handle_text(&frames[0]).await;

    let received = received.lock();
    assert_eq!(received.len(), 1);
    assert!(received[0].url.starts_with("/src/utils.js?t="));
    assert_eq!(received[0].exports["greeting"], "hi");
    assert_eq!(importer.urls.lock().len(), 1);
}

#[tokio::test]
async fn test_fan_out_policies_on_disk() {
    for (policy, expected) in [(FanOutPolicy::All, 2), (FanOutPolicy::First, 1)] {
        let (_dir, root) = project();
        write(&root, "src/Nav.js", "import { greeting } from './utils.js'\n");
        write(&root, "src/main.js", "import App from './App.js'\nimport Nav from './Nav.js'\n");

        let channel = Arc::new(RecordingChannel::default());
        let config = PropagationConfig {
            fan_out: policy,
            ..Default::default()
        };
        let propagator = propagator(&root, channel, config);
        propagator.load_entry(&root.join("src/main.js")).await;

        write(&root, "src/utils.js", "export const greeting = 'changed'\n");
        let payloads = propagator.on_file_change(&root.join("src/utils.js"), ChangeKind::Change).await;

        let HmrPayload::Update { updates } = &payloads[0] else {
            panic!("expected an update, got {:?}", payloads);
        };
        assert_eq!(updates.len(), expected);
        assert_eq!(updates[0].path, "/src/App.js");
    }
}

#[tokio::test]
async fn test_duplicate_event_is_deduplicated() {
    let (_dir, root) = project();
    let channel = Arc::new(RecordingChannel::default());
    let propagator = propagator(&root, channel.clone(), PropagationConfig::default());
    propagator.load_entry(&root.join("src/App.js")).await;

    write(&root, "src/utils.js", "export const greeting = 'once'\n");
    let utils = root.join("src/utils.js");
    let first = propagator.on_file_change(&utils, ChangeKind::Change).await;
    let second = propagator.on_file_change(&utils, ChangeKind::Change).await;

    assert_eq!(first.len(), 1);
    assert!(second.is_empty());
    assert_eq!(channel.frames.lock().len(), 1);
}

#[tokio::test]
async fn test_deleted_file_is_pruned() {
    let (_dir, root) = project();
    let channel = Arc::new(RecordingChannel::default());
    let propagator = propagator(&root, channel, PropagationConfig::default());
    propagator.load_entry(&root.join("src/App.js")).await;

    let utils = root.join("src/utils.js");
    std::fs::remove_file(&utils).unwrap();
    let payloads = propagator.on_file_change(&utils, ChangeKind::Unlink).await;

    assert_eq!(
        payloads,
        vec![
            HmrPayload::Prune {
                paths: vec!["/src/utils.js".to_string()]
            },
            HmrPayload::FullReload {
                path: Some("/src/utils.js".to_string())
            },
        ]
    );
    assert!(!propagator.graph().read().contains(&utils.to_string_lossy()));
}

#[tokio::test]
async fn test_extractors_agree_on_plain_imports() {
    let (_dir, root) = project();
    write(
        &root,
        "src/main.ts",
        "import type { Props } from './types'\nimport App from './App.js'\nimport { createApp } from 'vue'\n",
    );

    let main = root.join("src/main.ts");
    let regex = DependencyResolver::new(Arc::new(TokioModuleSource), Arc::new(RegexSpecifierExtractor::new()));
    let oxc = DependencyResolver::new(Arc::new(TokioModuleSource), Arc::new(OxcSpecifierExtractor::new()));

    let from_regex = regex.parse_dependencies(&main).await.unwrap();
    let from_oxc = oxc.parse_dependencies(&main).await.unwrap();

    assert!(from_regex.contains(&"./App.js".to_string()));
    assert_eq!(from_oxc, vec!["./App.js", "vue"]);
}
