//! Per-module hot contexts and the runtime that applies server payloads to them.

use crate::client::events::{EventBus, Subscription};
use crate::core::interfaces::{ImportedModule, ModuleImporter, PageReloader};
use crate::core::protocol::{HmrPayload, Update};
use crate::utils::{Logger, Result};
use parking_lot::{Mutex, MutexGuard};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

pub type AcceptCallback = Arc<dyn Fn(&ImportedModule) + Send + Sync>;
pub type DataCallback = Arc<dyn Fn(&HotData) + Send + Sync>;

/// Persistent per-module data slot, shared by every handle to it.
///
/// Survives hot updates of its module; dropped only when the module is pruned.
#[derive(Clone, Default)]
pub struct HotData(Arc<Mutex<Map<String, Value>>>);

impl HotData {
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.lock().get(key).cloned()
    }

    pub fn set(&self, key: &str, value: Value) {
        self.0.lock().insert(key.to_string(), value);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.lock().remove(key)
    }

    pub fn snapshot(&self) -> Map<String, Value> {
        self.0.lock().clone()
    }

    pub fn ptr_eq(&self, other: &HotData) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Clone)]
struct AcceptEntry {
    deps: Vec<String>,
    callback: AcceptCallback,
}

impl AcceptEntry {
    fn matches(&self, accepted_path: &str) -> bool {
        !accepted_path.is_empty() && self.deps.iter().any(|dep| dep.contains(accepted_path))
    }
}

/// The four per-path registries, keyed by owner public path
#[derive(Default)]
pub struct HotRegistry {
    accept: HashMap<String, Vec<AcceptEntry>>,
    dispose: HashMap<String, DataCallback>,
    prune: HashMap<String, DataCallback>,
    data: HashMap<String, HotData>,
}

impl HotRegistry {
    pub fn accept_count(&self, path: &str) -> usize {
        self.accept.get(path).map_or(0, Vec::len)
    }

    pub fn has_dispose(&self, path: &str) -> bool {
        self.dispose.contains_key(path)
    }

    pub fn has_prune(&self, path: &str) -> bool {
        self.prune.contains_key(path)
    }

    pub fn has_data(&self, path: &str) -> bool {
        self.data.contains_key(path)
    }

    /// True if any of the four entries exists for `path`
    pub fn is_registered(&self, path: &str) -> bool {
        self.accept.contains_key(path) || self.has_dispose(path) || self.has_prune(path) || self.has_data(path)
    }

    /// Drop the callbacks of a previous instance of `path`, keeping its data.
    fn reset_callbacks(&mut self, path: &str) {
        self.accept.remove(path);
        self.dispose.remove(path);
        self.prune.remove(path);
    }

    fn data_slot(&mut self, path: &str) -> HotData {
        self.data.entry(path.to_string()).or_default().clone()
    }

    fn matching_callbacks(&self, owner: &str, accepted_path: &str) -> Vec<AcceptCallback> {
        self.accept
            .get(owner)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| entry.matches(accepted_path))
                    .map(|entry| entry.callback.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn remove_path(&mut self, path: &str) {
        self.accept.remove(path);
        self.dispose.remove(path);
        self.prune.remove(path);
        self.data.remove(path);
    }
}

/// Client-side HMR runtime.
///
/// Owns the registry and event bus for one page. Callbacks always run with
/// the registry unlocked, so a callback may register further callbacks.
pub struct HotRuntime {
    registry: Mutex<HotRegistry>,
    events: EventBus,
    importer: Arc<dyn ModuleImporter>,
    reloader: Arc<dyn PageReloader>,
    upstream: mpsc::UnboundedSender<HmrPayload>,
}

impl HotRuntime {
    /// Returns the runtime and the receiver of messages it wants sent upstream.
    pub fn new(
        importer: Arc<dyn ModuleImporter>,
        reloader: Arc<dyn PageReloader>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<HmrPayload>) {
        let (upstream, upstream_rx) = mpsc::unbounded_channel();
        let runtime = Arc::new(Self {
            registry: Mutex::new(HotRegistry::default()),
            events: EventBus::new(),
            importer,
            reloader,
            upstream,
        });
        (runtime, upstream_rx)
    }

    /// Context for a fresh instance of the module served at `owner_path`.
    ///
    /// Callbacks registered by earlier instances are dropped; the data slot
    /// is kept if one already exists.
    pub fn create_hot_context(self: &Arc<Self>, owner_path: &str) -> HotContext {
        let mut registry = self.registry.lock();
        registry.reset_callbacks(owner_path);
        registry.data_slot(owner_path);
        drop(registry);
        HotContext {
            owner_path: owner_path.to_string(),
            runtime: self.clone(),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn registry(&self) -> MutexGuard<'_, HotRegistry> {
        self.registry.lock()
    }

    /// Apply `updates` strictly in order, each one fully before the next.
    ///
    /// A failed import stops the batch and requests a full reload.
    pub async fn handle_update(&self, updates: &[Update]) -> Result<()> {
        for update in updates {
            let dispose = {
                let mut registry = self.registry.lock();
                registry
                    .dispose
                    .get(&update.path)
                    .cloned()
                    .map(|dispose| (dispose, registry.data_slot(&update.path)))
            };
            if let Some((dispose, data)) = dispose {
                dispose(&data);
            }

            let url = format!("{}?t={}", update.accepted_path, update.timestamp);
            let module = match self.importer.import(&url).await {
                Ok(module) => module,
                Err(e) => {
                    Logger::error(&format!(
                        "Failed to reload {}. This could be due to syntax errors or importing non-existent modules: {}",
                        update.accepted_path, e
                    ));
                    self.events.publish(
                        "vite:error",
                        &json!({ "err": { "message": e.to_string() }, "path": update.accepted_path }),
                    );
                    self.reloader.reload();
                    return Err(e);
                }
            };

            let callbacks = self.registry.lock().matching_callbacks(&update.path, &update.accepted_path);
            for callback in callbacks {
                callback(&module);
            }
            Logger::debug(&format!("[hmr] {} updated via {}", update.accepted_path, update.path));
        }
        Ok(())
    }

    /// Run dispose then prune for each path and forget everything about it.
    pub fn handle_prune(&self, paths: &[String]) {
        for path in paths {
            let (dispose, prune, data) = {
                let registry = self.registry.lock();
                (
                    registry.dispose.get(path).cloned(),
                    registry.prune.get(path).cloned(),
                    registry.data.get(path).cloned().unwrap_or_default(),
                )
            };

            if let Some(dispose) = dispose {
                dispose(&data);
            }
            if let Some(prune) = prune {
                prune(&data);
            }
            self.registry.lock().remove_path(path);
        }
    }

    pub fn handle_full_reload(&self) {
        self.reloader.reload();
    }

    /// Dispatch one server payload, publishing lifecycle events around it.
    pub async fn handle_message(&self, payload: HmrPayload) {
        match payload {
            HmrPayload::Connected => {
                Logger::debug("[hmr] connected");
                self.events.publish("vite:ws:connect", &json!({}));
            }
            HmrPayload::Update { updates } => {
                let event_payload = json!({ "type": "update", "updates": updates });
                self.events.publish("vite:beforeUpdate", &event_payload);
                if self.handle_update(&updates).await.is_ok() {
                    self.events.publish("vite:afterUpdate", &event_payload);
                }
            }
            HmrPayload::Prune { paths } => {
                self.events.publish("vite:beforePrune", &json!({ "type": "prune", "paths": paths }));
                self.handle_prune(&paths);
            }
            HmrPayload::FullReload { path } => {
                self.events
                    .publish("vite:beforeFullReload", &json!({ "type": "full-reload", "path": path }));
                self.handle_full_reload();
            }
            HmrPayload::Error { err } => {
                Logger::error(&format!("[hmr] Internal Server Error: {}", err.message));
                self.events.publish("vite:error", &json!({ "err": err }));
            }
            HmrPayload::Custom { event, data } => {
                self.events.publish(&event, &data);
            }
        }
    }

    /// Parse and dispatch one raw frame; anything unparseable is ignored.
    pub async fn handle_text(&self, text: &str) {
        match serde_json::from_str::<HmrPayload>(text) {
            Ok(payload) => self.handle_message(payload).await,
            Err(e) => Logger::warn(&format!("[hmr] Ignoring unrecognized message: {}", e)),
        }
    }

    fn send_upstream(&self, payload: HmrPayload) {
        if self.upstream.send(payload).is_err() {
            Logger::debug("[hmr] upstream closed, message dropped");
        }
    }
}

/// The `import.meta.hot` capability handed to one module
#[derive(Clone)]
pub struct HotContext {
    owner_path: String,
    runtime: Arc<HotRuntime>,
}

impl HotContext {
    pub fn owner_path(&self) -> &str {
        &self.owner_path
    }

    /// Accept updates of this module itself.
    pub fn accept_self<F>(&self, callback: F)
    where
        F: Fn(&ImportedModule) + Send + Sync + 'static,
    {
        self.push_accept(vec![self.owner_path.clone()], Arc::new(callback));
    }

    pub fn accept_dep<F>(&self, dep: &str, callback: F)
    where
        F: Fn(&ImportedModule) + Send + Sync + 'static,
    {
        self.push_accept(vec![dep.to_string()], Arc::new(callback));
    }

    pub fn accept_deps<I, S, F>(&self, deps: I, callback: F)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&ImportedModule) + Send + Sync + 'static,
    {
        self.push_accept(deps.into_iter().map(Into::into).collect(), Arc::new(callback));
    }

    fn push_accept(&self, deps: Vec<String>, callback: AcceptCallback) {
        self.runtime
            .registry
            .lock()
            .accept
            .entry(self.owner_path.clone())
            .or_default()
            .push(AcceptEntry { deps, callback });
    }

    /// Replaces any previous dispose callback.
    pub fn dispose<F>(&self, callback: F)
    where
        F: Fn(&HotData) + Send + Sync + 'static,
    {
        self.runtime
            .registry
            .lock()
            .dispose
            .insert(self.owner_path.clone(), Arc::new(callback));
    }

    /// Replaces any previous prune callback.
    pub fn prune<F>(&self, callback: F)
    where
        F: Fn(&HotData) + Send + Sync + 'static,
    {
        self.runtime
            .registry
            .lock()
            .prune
            .insert(self.owner_path.clone(), Arc::new(callback));
    }

    /// Advisory: tells local listeners and the server this module cannot
    /// take the update it was given.
    pub fn invalidate(&self) {
        let data = json!({ "path": self.owner_path });
        self.runtime.events.publish("vite:invalidate", &data);
        self.runtime.send_upstream(HmrPayload::Custom {
            event: "vite:invalidate".to_string(),
            data,
        });
    }

    pub fn data(&self) -> HotData {
        self.runtime.registry.lock().data_slot(&self.owner_path)
    }

    pub fn on<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.runtime.events.subscribe(event, handler)
    }

    pub fn off(&self, subscription: &Subscription) -> bool {
        self.runtime.events.unsubscribe(subscription)
    }

    pub fn send(&self, event: &str, data: Value) {
        self.runtime.send_upstream(HmrPayload::Custom {
            event: event.to_string(),
            data,
        });
    }
}
