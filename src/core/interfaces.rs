use crate::core::models::*;
use crate::utils::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// A source file matched by a PathSet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Path below the glob base of the pattern that matched it.
    pub relative: PathBuf,
}

/// File system operations interface
#[async_trait]
pub trait FileSystemService: Send + Sync {
    /// Resolves a PathSet's patterns against `root`, in declaration order.
    async fn expand(&self, root: &Path, path_set: &PathSet) -> Result<Vec<SourceFile>>;
    async fn read_file(&self, path: &Path) -> Result<String>;
    async fn write_file(&self, path: &Path, content: &str) -> Result<()>;
    async fn copy_file(&self, from: &Path, to: &Path) -> Result<()>;
    /// Removes a directory tree. Returns false when there was nothing to remove.
    async fn remove_dir_all(&self, path: &Path) -> Result<bool>;
    /// Every file below `dir` with its size, sorted by path. Empty when the
    /// directory does not exist.
    async fn list_files(&self, dir: &Path) -> Result<Vec<OutputFile>>;
}

/// CSS optimization interface
#[async_trait]
pub trait CssOptimizer: Send + Sync {
    async fn optimize(&self, css: &str, file_name: &str) -> Result<String>;
}

/// Script minification interface. Minified output never contains console
/// calls or debugger statements.
#[async_trait]
pub trait ScriptMinifier: Send + Sync {
    async fn minify(&self, code: &str, file_name: &str) -> Result<String>;
}

/// Core module bundling service.
#[async_trait]
pub trait ModuleBundler: Send + Sync {
    /// Produces one artifact per requested format, in memory. Fails as a
    /// whole: either every format is returned or none.
    async fn bundle(&self, spec: &BundleSpec) -> Result<Vec<BundleArtifact>>;
}

/// Explicit reload trigger for connected browsers.
pub trait ReloadSignal: Send + Sync {
    fn reload(&self, reason: &str);
}

/// Reload signal that does nothing, for build-only runs.
pub struct NoReload;

impl ReloadSignal for NoReload {
    fn reload(&self, _reason: &str) {}
}
