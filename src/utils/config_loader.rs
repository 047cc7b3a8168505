use crate::core::models::{DevConfig, ExtractorKind, FanOutPolicy, PropagationConfig};
use crate::utils::{EmberError, Logger, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "ember.config.json";

/// Configuration file format (ember.config.json)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EmberConfig {
    /// Directory to watch, relative to the project root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// "all" or "first"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan_out: Option<FanOutPolicy>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_accept_orphans: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_dotfiles: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore: Option<Vec<String>>,

    /// "regex" or "oxc"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extractor: Option<ExtractorKind>,

    /// Entry modules, relative to the project root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<String>>,
}

/// Values given on the command line; `None` means "not given"
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub watch: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub fan_out: Option<FanOutPolicy>,
    pub self_accept_orphans: Option<bool>,
    pub debounce_ms: Option<u64>,
    pub extractor: Option<ExtractorKind>,
    pub entries: Vec<PathBuf>,
}

/// Config loader that supports config files with CLI override
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load `ember.config.json` from the project root, if present.
    pub fn load_from_file(root: &Path) -> Result<Option<EmberConfig>> {
        let config_path = root.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            Logger::debug(&format!("No {} found, using defaults", CONFIG_FILE_NAME));
            return Ok(None);
        }

        Logger::debug(&format!("Loading config from {}", config_path.display()));
        let content = std::fs::read_to_string(&config_path)?;

        let config: EmberConfig = serde_json::from_str(&content)
            .map_err(|e| EmberError::config(format!("Failed to parse {}: {}", CONFIG_FILE_NAME, e)))?;

        Ok(Some(config))
    }

    /// Merge file config with CLI arguments (CLI > file > defaults).
    ///
    /// Relative paths from either source are resolved against `root`.
    pub fn merge_with_cli(file_config: Option<EmberConfig>, root: PathBuf, cli: CliOverrides) -> DevConfig {
        let base = file_config.unwrap_or_default();
        let defaults = DevConfig::default();

        let watch_dir = cli
            .watch
            .or_else(|| base.watch.map(PathBuf::from))
            .map(|dir| root.join(dir))
            .unwrap_or_else(|| root.clone());

        let entries = if cli.entries.is_empty() {
            base.entries.unwrap_or_default().into_iter().map(PathBuf::from).collect()
        } else {
            cli.entries
        };
        let entries = entries.into_iter().map(|entry| root.join(entry)).collect();

        DevConfig {
            watch_dir,
            host: cli.host.or(base.host).unwrap_or(defaults.host),
            port: cli.port.or(base.port).unwrap_or(defaults.port),
            propagation: PropagationConfig {
                fan_out: cli.fan_out.or(base.fan_out).unwrap_or_default(),
                self_accept_orphans: cli
                    .self_accept_orphans
                    .or(base.self_accept_orphans)
                    .unwrap_or(defaults.propagation.self_accept_orphans),
            },
            debounce_ms: cli.debounce_ms.or(base.debounce_ms).unwrap_or(defaults.debounce_ms),
            ignore_dotfiles: base.ignore_dotfiles.unwrap_or(defaults.ignore_dotfiles),
            ignore: base.ignore.unwrap_or_default(),
            extractor: cli.extractor.or(base.extractor).unwrap_or_default(),
            entries,
            root,
        }
    }

    /// Load and merge in one step.
    pub fn resolve(root: PathBuf, cli: CliOverrides) -> Result<DevConfig> {
        let file_config = Self::load_from_file(&root)?;
        Ok(Self::merge_with_cli(file_config, root, cli))
    }

    /// Contents for a starter config file
    pub fn generate_example() -> String {
        let example = EmberConfig {
            host: Some("127.0.0.1".to_string()),
            port: Some(5173),
            fan_out: Some(FanOutPolicy::All),
            self_accept_orphans: Some(true),
            debounce_ms: Some(50),
            ignore: Some(vec!["dist".to_string()]),
            extractor: Some(ExtractorKind::Regex),
            entries: Some(vec!["src/main.js".to_string()]),
            ..Default::default()
        };
        serde_json::to_string_pretty(&example).unwrap_or_default()
    }
}
