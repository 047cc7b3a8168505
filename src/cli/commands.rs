use crate::client::{self, HeadlessImporter, HeadlessReloader, HotRuntime};
use crate::core::models::{ChangeKind, DevConfig, ExtractorKind, FanOutPolicy};
use crate::core::services::ChangePropagator;
use crate::graph::{ModuleGraph, ModuleTree};
use crate::infrastructure::{
    canonical_root, create_extractor, generate_hmr_client_code, is_script_file, scan_script_files, HmrChannel,
    TokioModuleSource,
};
use crate::prebundle::scan_bare_specifiers;
use crate::resolver::DependencyResolver;
use crate::transform::inject_hot_context;
use crate::utils::{paths, CliOverrides, ConfigLoader, FileWatcher, Logger, WatchConfig};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "ember")]
#[command(about = "Ember - development-time module pipeline with hot module replacement")]
pub struct Cli {
    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FanOutArg {
    All,
    First,
}

impl From<FanOutArg> for FanOutPolicy {
    fn from(arg: FanOutArg) -> Self {
        match arg {
            FanOutArg::All => FanOutPolicy::All,
            FanOutArg::First => FanOutPolicy::First,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ExtractorArg {
    Regex,
    Oxc,
}

impl From<ExtractorArg> for ExtractorKind {
    fn from(arg: ExtractorArg) -> Self {
        match arg {
            ExtractorArg::Regex => ExtractorKind::Regex,
            ExtractorArg::Oxc => ExtractorKind::Oxc,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch the project and push HMR updates to connected browsers
    Dev {
        /// Root directory
        #[arg(short, long, default_value = ".")]
        root: String,
        /// HMR WebSocket port
        #[arg(short, long)]
        port: Option<u16>,
        /// HMR WebSocket host
        #[arg(long)]
        host: Option<String>,
        /// Directory to watch, relative to root
        #[arg(short, long)]
        watch: Option<PathBuf>,
        /// Entry module to resolve at startup (repeatable)
        #[arg(short, long = "entry")]
        entries: Vec<PathBuf>,
        /// How many js-update records one change produces
        #[arg(long, value_enum)]
        fan_out: Option<FanOutArg>,
        /// Send full-reload instead of self-accepting modules nothing imports
        #[arg(long)]
        no_self_accept: bool,
        /// Per-path quiet period before a change is propagated
        #[arg(long)]
        debounce_ms: Option<u64>,
        /// Import extraction strategy
        #[arg(long, value_enum)]
        extractor: Option<ExtractorArg>,
    },
    /// Print the dependency tree of one or more entry modules
    Graph {
        /// Root directory
        #[arg(short, long, default_value = ".")]
        root: String,
        /// Entry modules, relative to root
        #[arg(required = true)]
        entries: Vec<PathBuf>,
        /// Import extraction strategy
        #[arg(long, value_enum)]
        extractor: Option<ExtractorArg>,
        /// Emit JSON instead of a tree
        #[arg(long)]
        json: bool,
    },
    /// List bare specifiers imported anywhere under a directory
    Deps {
        /// Directory to scan
        #[arg(default_value = ".")]
        dir: String,
        /// Import extraction strategy
        #[arg(long, value_enum)]
        extractor: Option<ExtractorArg>,
    },
    /// Connect a headless HMR client and log what the server sends
    Client {
        /// HMR WebSocket URL
        #[arg(default_value = "ws://127.0.0.1:5173")]
        url: String,
    },
    /// Print a module with its hot-context bootstrap injected
    Inject {
        /// Module to instrument
        file: PathBuf,
        /// Root directory
        #[arg(short, long, default_value = ".")]
        root: String,
    },
    /// Print the browser HMR runtime served at /@ember/client
    Runtime {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(short, long, default_value_t = 5173)]
        port: u16,
    },
}

pub struct CliHandler;

impl CliHandler {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(&self) -> Result<()> {
        let cli = Cli::parse();
        Logger::init(cli.verbose);

        match cli.command {
            Commands::Dev {
                root,
                port,
                host,
                watch,
                entries,
                fan_out,
                no_self_accept,
                debounce_ms,
                extractor,
            } => {
                let overrides = CliOverrides {
                    watch,
                    host,
                    port,
                    fan_out: fan_out.map(Into::into),
                    self_accept_orphans: no_self_accept.then_some(false),
                    debounce_ms,
                    extractor: extractor.map(Into::into),
                    entries,
                };
                self.handle_dev_command(&root, overrides).await
            }
            Commands::Graph {
                root,
                entries,
                extractor,
                json,
            } => self.handle_graph_command(&root, &entries, extractor, json).await,
            Commands::Deps { dir, extractor } => self.handle_deps_command(&dir, extractor).await,
            Commands::Client { url } => self.handle_client_command(&url).await,
            Commands::Inject { file, root } => self.handle_inject_command(&file, &root).await,
            Commands::Runtime { host, port } => {
                print!("{}", generate_hmr_client_code(&host, port));
                Ok(())
            }
        }
    }

    async fn handle_dev_command(&self, root: &str, overrides: CliOverrides) -> Result<()> {
        let root = canonical_root(Path::new(root))?;
        let config = ConfigLoader::resolve(root, overrides).context("Failed to load configuration")?;
        Logger::dev_start(&config.root, &config.host, config.port);

        let channel = HmrChannel::new();
        let listener = HmrChannel::bind(&config.host, config.port).await?;
        let server = channel.clone();
        tokio::spawn(async move {
            if let Err(e) = server.serve(listener).await {
                Logger::error(&format!("HMR server error: {}", e));
            }
        });
        self.log_client_messages(&channel);

        let resolver = DependencyResolver::new(Arc::new(TokioModuleSource), create_extractor(config.extractor));
        let propagator = ChangePropagator::new(
            config.root.clone(),
            ModuleGraph::shared(),
            resolver,
            Arc::new(channel.clone()),
            config.propagation.clone(),
        );

        for entry in Self::startup_entries(&config).await? {
            propagator.load_entry(&entry).await;
        }
        Logger::info(&format!("📦 {} module(s) in graph", propagator.graph().read().len()));

        let mut watcher = FileWatcher::new(WatchConfig::from(&config));
        let mut events = watcher.start()?;
        Logger::info("Press Ctrl+C to stop the server");

        loop {
            tokio::select! {
                Some((path, kind)) = events.recv() => {
                    if kind != ChangeKind::Unlink && !is_script_file(&path) {
                        Logger::debug(&format!("Ignoring non-script change: {}", path.display()));
                        continue;
                    }
                    propagator.on_file_change(&path, kind).await;
                }
                _ = tokio::signal::ctrl_c() => {
                    Logger::info("👋 Stopping dev server...");
                    break;
                }
            }
        }

        watcher.stop();
        Ok(())
    }

    async fn startup_entries(config: &DevConfig) -> Result<Vec<PathBuf>> {
        if !config.entries.is_empty() {
            return Ok(config.entries.clone());
        }
        scan_script_files(&config.root)
            .await
            .with_context(|| format!("Failed to scan {}", config.root.display()))
    }

    fn log_client_messages(&self, channel: &HmrChannel) {
        let mut messages = channel.subscribe_client_messages();
        tokio::spawn(async move {
            loop {
                match messages.recv().await {
                    Ok(message) => Logger::debug(&format!(
                        "client {} sent {:?}",
                        message.client_id, message.payload
                    )),
                    Err(RecvError::Lagged(skipped)) => {
                        Logger::warn(&format!("Dropped {} client message(s)", skipped))
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    async fn handle_graph_command(
        &self,
        root: &str,
        entries: &[PathBuf],
        extractor: Option<ExtractorArg>,
        json: bool,
    ) -> Result<()> {
        let root = canonical_root(Path::new(root))?;
        let kind: ExtractorKind = extractor.map(Into::into).unwrap_or_default();
        let resolver = DependencyResolver::new(Arc::new(TokioModuleSource), create_extractor(kind));
        let graph = ModuleGraph::shared();

        let mut trees = Vec::new();
        for entry in entries {
            let entry = paths::normalize_path(&root.join(entry));
            resolver.resolve_entry(&graph, &entry).await;
            let tree = graph
                .read()
                .get_module_tree(&entry.to_string_lossy())
                .with_context(|| format!("{} is not in the graph", entry.display()))?;
            trees.push(tree);
        }

        if json {
            println!("{}", serde_json::to_string_pretty(&trees)?);
            return Ok(());
        }

        for tree in &trees {
            println!("{}", paths::public_path(&root, Path::new(&tree.id)).bold());
            print_children(&root, tree, "");
        }
        println!("{} module(s)", graph.read().len().to_string().cyan());
        Ok(())
    }

    async fn handle_deps_command(&self, dir: &str, extractor: Option<ExtractorArg>) -> Result<()> {
        let kind: ExtractorKind = extractor.map(Into::into).unwrap_or_default();
        let extractor = create_extractor(kind);
        let specifiers = scan_bare_specifiers(Path::new(dir), extractor.as_ref())
            .await
            .with_context(|| format!("Failed to scan {}", dir))?;

        for spec in &specifiers {
            println!("{}", spec);
        }
        Logger::info(&format!("{} bare specifier(s) found", specifiers.len()));
        Ok(())
    }

    async fn handle_client_command(&self, url: &str) -> Result<()> {
        let (runtime, upstream) = HotRuntime::new(Arc::new(HeadlessImporter), Arc::new(HeadlessReloader));
        for event in [
            "vite:ws:connect",
            "vite:beforeUpdate",
            "vite:afterUpdate",
            "vite:beforePrune",
            "vite:beforeFullReload",
            "vite:error",
        ] {
            runtime
                .events()
                .subscribe(event, move |payload| Logger::info(&format!("{} {}", event.yellow(), payload)));
        }

        client::connect(url, runtime, upstream)
            .await
            .with_context(|| format!("HMR connection to {} failed", url))?;
        Ok(())
    }

    async fn handle_inject_command(&self, file: &Path, root: &str) -> Result<()> {
        let root = canonical_root(Path::new(root))?;
        let file = paths::normalize_path(&root.join(file));
        let code = tokio::fs::read_to_string(&file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?;

        print!("{}", inject_hot_context(&root, &file, &code));
        Ok(())
    }
}

fn print_children(root: &Path, tree: &ModuleTree, prefix: &str) {
    let count = tree.dependencies.len();
    for (i, child) in tree.dependencies.iter().enumerate() {
        let last = i + 1 == count;
        let branch = if last { "└── " } else { "├── " };
        println!("{}{}{}", prefix, branch.dimmed(), paths::public_path(root, Path::new(&child.id)));

        let nested = format!("{}{}", prefix, if last { "    " } else { "│   " });
        print_children(root, child, &nested);
    }
}

impl Default for CliHandler {
    fn default() -> Self {
        Self::new()
    }
}
