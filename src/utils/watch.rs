// File watcher for the dev pipeline
// Turns raw notify events into debounced (path, ChangeKind) pairs

use crate::core::models::{ChangeKind, DevConfig};
use crate::utils::{paths, Logger, Result};
use indexmap::IndexMap;
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

pub type WatchEvent = (PathBuf, ChangeKind);

/// Configuration for the file watcher
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Directory watched recursively
    pub root: PathBuf,
    /// Quiet period per path before its event is emitted
    pub debounce_ms: u64,
    /// Skip any path with a component starting with `.`
    pub ignore_dotfiles: bool,
    /// Extra path components or root-relative prefixes to skip
    pub ignore: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            debounce_ms: 50,
            ignore_dotfiles: true,
            ignore: Vec::new(),
        }
    }
}

impl From<&DevConfig> for WatchConfig {
    fn from(config: &DevConfig) -> Self {
        Self {
            root: config.watch_dir.clone(),
            debounce_ms: config.debounce_ms,
            ignore_dotfiles: config.ignore_dotfiles,
            ignore: config.ignore.clone(),
        }
    }
}

impl WatchConfig {
    pub fn should_ignore(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        if self.ignore_dotfiles && paths::is_dotfile_path(relative) {
            return true;
        }

        let mut names = relative.components().filter_map(|c| match c {
            Component::Normal(name) => name.to_str(),
            _ => None,
        });
        if names.any(|name| name == "node_modules" || self.ignore.iter().any(|ignored| ignored == name)) {
            return true;
        }

        let relative = relative.to_string_lossy().replace('\\', "/");
        self.ignore
            .iter()
            .any(|prefix| relative.starts_with(prefix.trim_start_matches("./")))
    }
}

/// Recursive watcher emitting debounced change events
pub struct FileWatcher {
    config: WatchConfig,
    watcher: Option<RecommendedWatcher>,
    task: Option<JoinHandle<()>>,
}

impl FileWatcher {
    pub fn new(config: WatchConfig) -> Self {
        Self {
            config,
            watcher: None,
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    /// Start watching; events arrive on the returned receiver until `stop`.
    pub fn start(&mut self) -> Result<mpsc::Receiver<WatchEvent>> {
        self.stop();

        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<WatchEvent>();
        let (out_tx, out_rx) = mpsc::channel(1024);

        let filter = self.config.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for change in classify_event(&event) {
                        if !filter.should_ignore(&change.0) {
                            let _ = raw_tx.send(change);
                        }
                    }
                }
                Err(e) => Logger::warn(&format!("Watch error: {}", e)),
            },
            notify::Config::default(),
        )?;
        watcher.watch(&self.config.root, RecursiveMode::Recursive)?;

        let delay = Duration::from_millis(self.config.debounce_ms);
        self.task = Some(tokio::spawn(debounce(raw_rx, out_tx, delay)));
        self.watcher = Some(watcher);

        Logger::info(&format!("👀 Watching {}", self.config.root.display()));
        Ok(out_rx)
    }

    /// Stop emitting and release the OS watch handles.
    pub fn stop(&mut self) {
        if self.watcher.take().is_some() {
            Logger::debug("Watcher stopped");
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn classify_event(event: &Event) -> Vec<WatchEvent> {
    event
        .paths
        .iter()
        .filter_map(|path| {
            let kind = match event.kind {
                EventKind::Create(_) => ChangeKind::Add,
                EventKind::Remove(_) => ChangeKind::Unlink,
                // renames report both ends; existence tells which one this is
                EventKind::Modify(ModifyKind::Name(_)) => {
                    if path.exists() {
                        ChangeKind::Add
                    } else {
                        ChangeKind::Unlink
                    }
                }
                EventKind::Modify(ModifyKind::Metadata(_)) => return None,
                EventKind::Modify(_) => ChangeKind::Change,
                _ => return None,
            };
            if kind != ChangeKind::Unlink && path.is_dir() {
                return None;
            }
            Some((path.clone(), kind))
        })
        .collect()
}

/// Fold two events for the same path seen inside one quiet period.
fn coalesce(previous: ChangeKind, next: ChangeKind) -> ChangeKind {
    match (previous, next) {
        (ChangeKind::Add, ChangeKind::Change) => ChangeKind::Add,
        // delete-then-create is how many editors save
        (ChangeKind::Unlink, ChangeKind::Add) => ChangeKind::Change,
        (_, next) => next,
    }
}

async fn debounce(mut raw: mpsc::UnboundedReceiver<WatchEvent>, out: mpsc::Sender<WatchEvent>, delay: Duration) {
    let mut pending: IndexMap<PathBuf, (ChangeKind, Instant)> = IndexMap::new();

    loop {
        let deadline = pending.values().map(|(_, seen)| *seen + delay).min();

        tokio::select! {
            received = raw.recv() => match received {
                Some((path, kind)) => {
                    let kind = match pending.get(&path) {
                        Some((previous, _)) => coalesce(*previous, kind),
                        None => kind,
                    };
                    pending.insert(path, (kind, Instant::now()));
                }
                None => break,
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                let now = Instant::now();
                let due: Vec<PathBuf> = pending
                    .iter()
                    .filter(|(_, (_, seen))| *seen + delay <= now)
                    .map(|(path, _)| path.clone())
                    .collect();

                for path in due {
                    if let Some((kind, _)) = pending.shift_remove(&path) {
                        if out.send((path, kind)).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }

    for (path, (kind, _)) in pending {
        if out.send((path, kind)).await.is_err() {
            return;
        }
    }
}
