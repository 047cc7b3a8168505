use crate::core::interfaces::HmrBroadcaster;
use crate::core::models::{ChangeKind, FanOutPolicy, PropagationConfig};
use crate::core::protocol::{now_ms, HmrPayload, Update};
use crate::graph::SharedGraph;
use crate::resolver::{content_hash, module_id, DependencyResolver, CONTENT_HASH_KEY};
use crate::utils::{paths, Logger, Timer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Turns file-change events into HMR payloads.
///
/// Every event runs under one async mutex, so a refresh and its propagation
/// never interleave with another event's.
pub struct ChangePropagator {
    root: PathBuf,
    graph: SharedGraph,
    resolver: DependencyResolver,
    channel: Arc<dyn HmrBroadcaster>,
    config: PropagationConfig,
    in_flight: Mutex<()>,
}

impl ChangePropagator {
    pub fn new(
        root: PathBuf,
        graph: SharedGraph,
        resolver: DependencyResolver,
        channel: Arc<dyn HmrBroadcaster>,
        config: PropagationConfig,
    ) -> Self {
        Self {
            root,
            graph,
            resolver,
            channel,
            config,
            in_flight: Mutex::new(()),
        }
    }

    pub fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn public_path(&self, id: &str) -> String {
        paths::public_path(&self.root, Path::new(id))
    }

    /// Seed the graph from an entry module; returns how many modules were analyzed.
    pub async fn load_entry(&self, entry: &Path) -> usize {
        let _guard = self.in_flight.lock().await;
        self.resolver.resolve_entry(&self.graph, entry).await
    }

    /// Refresh the graph for one event and broadcast what it implies.
    ///
    /// Returns the payloads that were handed to the channel.
    pub async fn on_file_change(&self, path: &Path, kind: ChangeKind) -> Vec<HmrPayload> {
        let _guard = self.in_flight.lock().await;
        let _timer = Timer::start(&format!("propagate {} {}", kind, path.display()));
        Logger::change_detected(path, &kind.to_string());

        let payloads = match kind {
            ChangeKind::Unlink => self.propagate_unlink(path),
            ChangeKind::Add | ChangeKind::Change => self.propagate_change(path, kind).await,
        };

        for payload in &payloads {
            self.emit(payload);
        }
        payloads
    }

    async fn propagate_change(&self, path: &Path, kind: ChangeKind) -> Vec<HmrPayload> {
        let id = module_id(path);

        let source = match self.resolver.source().read_source(path).await {
            Ok(source) => source,
            Err(e) => return vec![HmrPayload::error(e.format_detailed())],
        };

        if kind == ChangeKind::Change && self.stored_hash(&id).as_deref() == Some(content_hash(&source).as_str()) {
            Logger::debug(&format!("{} unchanged, skipping", path.display()));
            return Vec::new();
        }

        self.resolver.refresh_module(&self.graph, path).await;

        let accepted_path = self.public_path(&id);
        let dependents = self.graph.read().get_dependents(&id);

        let mut owners: Vec<String> = match self.config.fan_out {
            FanOutPolicy::All => dependents,
            FanOutPolicy::First => dependents.into_iter().take(1).collect(),
        };

        if owners.is_empty() {
            // a freshly added file nothing imports yet has no live instance to update
            if kind == ChangeKind::Add {
                return Vec::new();
            }
            if !self.config.self_accept_orphans {
                return vec![HmrPayload::FullReload {
                    path: Some(accepted_path),
                }];
            }
            owners.push(id);
        }

        let timestamp = now_ms();
        let updates = owners
            .iter()
            .map(|owner| Update::js(self.public_path(owner), accepted_path.clone(), timestamp))
            .collect();

        vec![HmrPayload::Update { updates }]
    }

    fn propagate_unlink(&self, path: &Path) -> Vec<HmrPayload> {
        let id = module_id(path);

        let (removed, had_dependents) = {
            let mut graph = self.graph.write();
            let Some(node) = graph.get_module(&id) else {
                return Vec::new();
            };
            let former_deps: Vec<String> = node.dependencies().map(str::to_string).collect();
            let had_dependents = node.dependents().next().is_some();

            graph.delete_module(&id);
            let mut removed = vec![id.clone()];
            for orphan in graph.orphaned_modules(&former_deps) {
                graph.delete_module(&orphan);
                removed.push(orphan);
            }
            (removed, had_dependents)
        };

        let mut payloads = vec![HmrPayload::Prune {
            paths: removed.iter().map(|id| self.public_path(id)).collect(),
        }];
        if had_dependents {
            payloads.push(HmrPayload::FullReload {
                path: Some(self.public_path(&id)),
            });
        }
        payloads
    }

    fn stored_hash(&self, id: &str) -> Option<String> {
        self.graph
            .read()
            .get_module_metadata(id)
            .and_then(|metadata| metadata.get(CONTENT_HASH_KEY))
            .and_then(|hash| hash.as_str().map(str::to_string))
    }

    fn emit(&self, payload: &HmrPayload) {
        match self.channel.broadcast(payload) {
            Ok(clients) => Logger::payload_sent(payload.kind(), clients),
            Err(e) => Logger::error(&format!("Failed to send {}: {}", payload.kind(), e)),
        }
    }
}
