use crate::core::models::BuildMode;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

pub struct Logger;

impl Logger {
    /// Installs the global subscriber. `RUST_LOG` wins over the default directive.
    pub fn init() {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("assetflow=info"));

        // A second init (tests, embedding) keeps the first subscriber.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    }

    pub fn pipeline_start(pipeline: &str, root: &str, outdir: &str, mode: BuildMode) {
        info!("🔨 assetflow {} ({})", pipeline, mode);
        info!("═══════════════════════════════════════");
        info!("📁 Root: {}", root);
        info!("📦 Output: {}", outdir);
    }

    pub fn task_start(name: &str) {
        info!("▶️  Starting '{}'", name);
    }

    pub fn task_finished(name: &str, elapsed: Duration) {
        info!("✅ Finished '{}' after {:.2?}", name, elapsed);
    }

    pub fn task_failed(name: &str, elapsed: Duration, err: &dyn std::fmt::Display) {
        error!("❌ '{}' errored after {:.2?}", name, elapsed);
        error!("{}", err);
    }

    pub fn processing_file(name: &str, step: &str) {
        debug!("⚡ Processing: {} ({})", name, step);
    }

    pub fn watching(path_set: &str, patterns: &[String]) {
        info!("👀 Watching '{}': {}", path_set, patterns.join(", "));
    }

    pub fn change_detected(path_set: &str, changes: usize) {
        info!("🔄 {} change(s) in '{}', rebuilding", changes, path_set);
    }

    pub fn server_ready(host: &str, port: u16) {
        info!("");
        info!("🌐 Local:   http://{}:{}", host, port);
        info!("🔥 Live reload active");
        info!("Press Ctrl+C to stop the server");
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

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        debug!("⏱️  Completed: {} in {:.2?}", self.name, self.elapsed());
    }
}
