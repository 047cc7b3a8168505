use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Kind of file-system event reported by the watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Change,
    Unlink,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ChangeKind::Add => "add",
            ChangeKind::Change => "change",
            ChangeKind::Unlink => "unlink",
        };
        f.write_str(label)
    }
}

/// How many `js-update` records one change produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanOutPolicy {
    /// One record per direct dependent
    #[default]
    All,
    /// Only the first dependent in insertion order
    First,
}

/// Which specifier extractor the resolver runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    #[default]
    Regex,
    Oxc,
}

/// Propagation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagationConfig {
    #[serde(default)]
    pub fan_out: FanOutPolicy,
    /// A changed module with no importers accepts itself instead of forcing a reload
    #[serde(default = "default_true")]
    pub self_accept_orphans: bool,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            fan_out: FanOutPolicy::All,
            self_accept_orphans: true,
        }
    }
}

/// Fully merged development server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Directory handed to the watcher; defaults to `root`
    #[serde(default = "default_root")]
    pub watch_dir: PathBuf,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub propagation: PropagationConfig,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_true")]
    pub ignore_dotfiles: bool,
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default)]
    pub extractor: ExtractorKind,
    /// Modules resolved at startup; every script under `root` when empty
    #[serde(default)]
    pub entries: Vec<PathBuf>,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5173
}

fn default_debounce_ms() -> u64 {
    50
}

fn default_true() -> bool {
    true
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            watch_dir: default_root(),
            host: default_host(),
            port: default_port(),
            propagation: PropagationConfig::default(),
            debounce_ms: default_debounce_ms(),
            ignore_dotfiles: true,
            ignore: Vec::new(),
            extractor: ExtractorKind::Regex,
            entries: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dev_config_defaults() {
        let config = DevConfig::default();
        assert_eq!(config.port, 5173);
        assert_eq!(config.propagation.fan_out, FanOutPolicy::All);
        assert!(config.propagation.self_accept_orphans);
        assert!(config.ignore_dotfiles);
    }

    #[test]
    fn test_change_kind_wire_names() {
        assert_eq!(serde_json::to_string(&ChangeKind::Unlink).unwrap(), "\"unlink\"");
        assert_eq!(ChangeKind::Add.to_string(), "add");
    }
}
