use async_trait::async_trait;
use ember::client::{self, HotRuntime};
use ember::core::interfaces::{ImportedModule, ModuleImporter, PageReloader};
use ember::core::models::{ChangeKind, PropagationConfig};
use ember::core::protocol::{HmrPayload, Update};
use ember::core::services::ChangePropagator;
use ember::graph::ModuleGraph;
use ember::infrastructure::processors::RegexSpecifierExtractor;
use ember::infrastructure::{HmrChannel, TokioModuleSource};
use ember::resolver::DependencyResolver;
use ember::utils::Result;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const WAIT: Duration = Duration::from_secs(5);

async fn start_channel() -> (HmrChannel, SocketAddr) {
    let channel = HmrChannel::new();
    let listener = HmrChannel::bind("127.0.0.1", 0).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = channel.clone();
    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });
    (channel, addr)
}

async fn wait_for_clients(channel: &HmrChannel, expected: usize) {
    timeout(WAIT, async {
        while channel.client_count() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("client count never settled");
}

async fn next_json<S>(stream: &mut S) -> Value
where
    S: futures::Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_client_receives_connected_then_broadcasts() {
    let (channel, addr) = start_channel().await;
    let (ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
    let (_sink, mut stream) = ws.split();

    assert_eq!(next_json(&mut stream).await, json!({"type": "connected"}));
    wait_for_clients(&channel, 1).await;

    let payload = HmrPayload::Update {
        updates: vec![Update::js("/src/App.js", "/src/utils.js", 11)],
    };
    assert_eq!(channel.send(&payload).unwrap(), 1);

    let received = next_json(&mut stream).await;
    assert_eq!(serde_json::from_value::<HmrPayload>(received).unwrap(), payload);
}

#[tokio::test]
async fn test_broadcast_reaches_every_client() {
    let (channel, addr) = start_channel().await;

    let mut streams = Vec::new();
    for _ in 0..3 {
        let (ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        let (sink, mut stream) = ws.split();
        next_json(&mut stream).await;
        streams.push((sink, stream));
    }
    wait_for_clients(&channel, 3).await;

    let reached = channel.send(&HmrPayload::FullReload { path: None }).unwrap();
    assert_eq!(reached, 3);
    for (_, stream) in &mut streams {
        assert_eq!(next_json(stream).await, json!({"type": "full-reload"}));
    }
}

#[tokio::test]
async fn test_disconnected_client_is_dropped() {
    let (channel, addr) = start_channel().await;
    let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
    next_json(&mut ws).await;
    wait_for_clients(&channel, 1).await;

    ws.close(None).await.unwrap();
    wait_for_clients(&channel, 0).await;
    assert_eq!(channel.send(&HmrPayload::Connected).unwrap(), 0);
}

#[tokio::test]
async fn test_custom_upstream_message_is_forwarded() {
    let (channel, addr) = start_channel().await;
    let mut messages = channel.subscribe_client_messages();

    let (ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
    let (mut sink, mut stream) = ws.split();
    next_json(&mut stream).await;

    sink.send(Message::Text("garbage".to_string())).await.unwrap();
    sink.send(Message::Text(
        json!({"type": "custom", "event": "vite:invalidate", "data": {"path": "/src/App.js"}}).to_string(),
    ))
    .await
    .unwrap();

    let message = timeout(WAIT, messages.recv()).await.unwrap().unwrap();
    assert_eq!(
        message.payload,
        HmrPayload::Custom {
            event: "vite:invalidate".to_string(),
            data: json!({"path": "/src/App.js"}),
        }
    );
}

struct ExportsImporter;

#[async_trait]
impl ModuleImporter for ExportsImporter {
    async fn import(&self, url: &str) -> Result<ImportedModule> {
        Ok(ImportedModule {
            url: url.to_string(),
            exports: json!({}),
        })
    }
}

struct NoReload;

impl PageReloader for NoReload {
    fn reload(&self) {}
}

#[tokio::test]
async fn test_file_change_reaches_connected_runtime() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    std::fs::create_dir_all(root.join("src")).unwrap();
    std::fs::write(root.join("src/utils.js"), "export const n = 1\n").unwrap();
    std::fs::write(root.join("src/App.js"), "import { n } from './utils.js'\n").unwrap();

    let (channel, addr) = start_channel().await;
    let resolver = DependencyResolver::new(Arc::new(TokioModuleSource), Arc::new(RegexSpecifierExtractor::new()));
    let propagator = ChangePropagator::new(
        root.clone(),
        ModuleGraph::shared(),
        resolver,
        Arc::new(channel.clone()),
        PropagationConfig::default(),
    );
    propagator.load_entry(&root.join("src/App.js")).await;

    let (runtime, upstream) = HotRuntime::new(Arc::new(ExportsImporter), Arc::new(NoReload));
    let connected = Arc::new(Notify::new());
    let signal = connected.clone();
    runtime.events().subscribe("vite:ws:connect", move |_| signal.notify_one());

    let accepted = Arc::new(Notify::new());
    let signal = accepted.clone();
    runtime
        .create_hot_context("/src/App.js")
        .accept_dep("/src/utils.js", move |_| signal.notify_one());

    let url = format!("ws://{}", addr);
    tokio::spawn(async move {
        let _ = client::connect(&url, runtime, upstream).await;
    });
    timeout(WAIT, connected.notified()).await.unwrap();

    std::fs::write(root.join("src/utils.js"), "export const n = 2\n").unwrap();
    let payloads = propagator.on_file_change(&root.join("src/utils.js"), ChangeKind::Change).await;
    assert!(matches!(payloads.as_slice(), [HmrPayload::Update { .. }]));

    timeout(WAIT, accepted.notified()).await.unwrap();
}
