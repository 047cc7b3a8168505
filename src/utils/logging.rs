use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

pub struct Logger;

impl Logger {
    /// Install the global subscriber. `RUST_LOG` wins over the default filter.
    pub fn init(verbose: bool) {
        let default_filter = if verbose { "ember=debug" } else { "ember=info" };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter));

        // A second init (tests, embedding) is not an error worth surfacing.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    }

    pub fn dev_start(root: &Path, host: &str, port: u16) {
        info!("🔥 Ember - Development Pipeline");
        info!("═══════════════════════════════════════");
        info!("📁 Root: {}", root.display());
        info!("🔌 HMR: ws://{}:{}", host, port);
        info!("ℹ️  Updates are eventually convergent, not delivery-guaranteed");
    }

    pub fn change_detected(path: &Path, kind: &str) {
        info!("📝 {} {}", kind, path.display());
    }

    pub fn payload_sent(kind: &str, clients: usize) {
        debug!("📡 Sent {} to {} client(s)", kind, clients);
    }

    pub fn analyzing_module(path: &Path) {
        debug!("🔍 Analyzing module: {}", path.display());
    }

    pub fn info(msg: &str) {
        info!("{}", msg);
    }

    pub fn debug(msg: &str) {
        debug!("{}", msg);
    }

    pub fn error(msg: &str) {
        error!("❌ {}", msg);
    }

    pub fn warn(msg: &str) {
        warn!("⚠️  {}", msg);
    }
}

pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    pub fn start(name: &str) -> Self {
        debug!("⏱️  Starting: {}", name);
        Self {
            start: Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        debug!("⏱️  Completed: {} in {:.2?}", self.name, self.elapsed());
    }
}
