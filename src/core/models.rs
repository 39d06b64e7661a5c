use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that selects the build mode.
pub const MODE_ENV_VAR: &str = "NODE_ENV";

/// Process-wide build mode. Resolved once at startup and passed by value
/// into every transform and bundler call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Production,
    #[default]
    Development,
}

impl BuildMode {
    pub fn from_env() -> Self {
        Self::from_env_value(std::env::var(MODE_ENV_VAR).ok().as_deref())
    }

    /// Only the exact value `production` selects production.
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value {
            Some("production") => BuildMode::Production,
            _ => BuildMode::Development,
        }
    }

    pub fn is_production(self) -> bool {
        self == BuildMode::Production
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildMode::Production => f.write_str("production"),
            BuildMode::Development => f.write_str("development"),
        }
    }
}

/// A named set of source glob patterns and the directory they build into.
///
/// Patterns are relative to the project root, the destination to the output
/// directory. A pattern prefixed with `!` removes files matched by earlier
/// patterns of the same set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathSet {
    pub name: String,
    #[serde(rename = "sources")]
    pub source_patterns: Vec<String>,
    pub destination: PathBuf,
}

impl PathSet {
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        source_patterns: impl IntoIterator<Item = S>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            source_patterns: source_patterns.into_iter().map(Into::into).collect(),
            destination: destination.into(),
        }
    }

    pub fn destination_in(&self, outdir: &Path) -> PathBuf {
        if self.destination.is_absolute() {
            self.destination.clone()
        } else {
            outdir.join(&self.destination)
        }
    }
}

/// Reverse proxy rule installed by the dev server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRule {
    pub match_prefix: String,
    pub target_origin: String,
    #[serde(default = "default_true")]
    pub rewrite_origin: bool,
    #[serde(default)]
    pub forward_web_socket: bool,
}

impl ProxyRule {
    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.match_prefix)
    }
}

fn default_true() -> bool {
    true
}

/// Which artifact step a task runs. Together with the task name this makes
/// every node of a pipeline addressable without running it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Clean,
    StaticCopy { path_set: String },
    Style { path_set: String },
    PluginScripts { path_set: String },
    CoreBundle,
    StartWatcher,
    StartServer,
}

impl TaskKind {
    pub fn default_name(&self) -> String {
        match self {
            TaskKind::Clean => "clean".to_string(),
            TaskKind::StaticCopy { path_set } => format!("copy:{}", path_set),
            TaskKind::Style { path_set } => format!("style:{}", path_set),
            TaskKind::PluginScripts { path_set } => format!("scripts:{}", path_set),
            TaskKind::CoreBundle => "core".to_string(),
            TaskKind::StartWatcher => "watch".to_string(),
            TaskKind::StartServer => "serve".to_string(),
        }
    }
}

/// Lifecycle of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Cleaning,
    Building,
    Ready,
    WatchingServing,
    Terminated { success: bool },
}

/// Shapes the core bundler can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Universal module definition, loadable by script tag, AMD or CommonJS.
    Umd,
    /// Native ES module.
    Esm,
}

impl OutputFormat {
    pub fn file_suffix(self) -> &'static str {
        match self {
            OutputFormat::Umd => "umd.js",
            OutputFormat::Esm => "esm.js",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMapMode {
    #[default]
    Inline,
    File,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolyfillMode {
    #[default]
    Usage,
    Off,
}

/// Which PathSets each artifact step builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskPlan {
    /// Static Copy sets.
    pub copy: Vec<String>,
    /// Style Transform sets.
    pub styles: Vec<String>,
    /// Plugin-Script Transform sets.
    pub scripts: Vec<String>,
    /// The set watched for core bundle rebuilds.
    pub core: String,
}

impl TaskPlan {
    /// Every referenced name, in plan order.
    pub fn referenced(&self) -> impl Iterator<Item = &str> {
        self.copy
            .iter()
            .chain(&self.styles)
            .chain(&self.scripts)
            .map(String::as_str)
            .chain(std::iter::once(self.core.as_str()))
    }
}

/// Bundler settings that do not depend on the build mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BundleSettings {
    pub entry: PathBuf,
    pub name: String,
    pub targets: Vec<String>,
    pub polyfills: PolyfillMode,
    pub source_map: SourceMapMode,
}

impl BundleSettings {
    /// UMD always; production adds the ESM artifact and minifies both.
    pub fn spec_for(&self, root: &Path, mode: BuildMode) -> BundleSpec {
        let formats = if mode.is_production() {
            vec![OutputFormat::Umd, OutputFormat::Esm]
        } else {
            vec![OutputFormat::Umd]
        };

        BundleSpec {
            root: root.to_path_buf(),
            entry: self.entry.clone(),
            library_name: self.name.clone(),
            formats,
            minify: mode.is_production(),
            targets: self.targets.clone(),
            polyfills: self.polyfills,
            source_map: self.source_map,
        }
    }
}

/// Fully resolved configuration of one orchestrator invocation.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub root: PathBuf,
    pub outdir: PathBuf,
    pub mode: BuildMode,
    pub path_sets: Vec<PathSet>,
    pub plan: TaskPlan,
    pub bundle: BundleSettings,
    pub host: String,
    pub port: u16,
    pub debounce: Duration,
    pub proxy: Vec<ProxyRule>,
    /// Bound on bundler and minifier invocations. `None` waits forever.
    pub task_timeout: Option<Duration>,
}

/// Everything the bundling service needs for one invocation. Built by the
/// orchestrator from the project config and the build mode.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleSpec {
    pub root: PathBuf,
    pub entry: PathBuf,
    /// Global name of the UMD export and stem of the output files.
    pub library_name: String,
    pub formats: Vec<OutputFormat>,
    pub minify: bool,
    pub targets: Vec<String>,
    pub polyfills: PolyfillMode,
    pub source_map: SourceMapMode,
}

impl BundleSpec {
    pub fn output_file_name(&self, format: OutputFormat) -> String {
        format!("{}.{}", self.library_name, format.file_suffix())
    }
}

/// One file produced by the bundler, held in memory until the whole
/// bundle succeeded.
#[derive(Debug, Clone)]
pub struct BundleArtifact {
    pub file_name: String,
    pub format: OutputFormat,
    pub code: String,
    /// Present only for [`SourceMapMode::File`].
    pub source_map: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OutputFile {
    pub path: PathBuf,
    pub size: u64,
}
