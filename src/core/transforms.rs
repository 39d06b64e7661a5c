//! The artifact steps: static copy, style and plugin-script concatenation,
//! the core bundle writer and the cleaner.

use crate::core::interfaces::*;
use crate::core::models::*;
use crate::core::tasks::{with_timeout, Task};
use crate::utils::{Logger, Result};
use futures::future::try_join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const STYLE_ARTIFACT: &str = "index.css";
pub const SCRIPT_ARTIFACT: &str = "index.js";

/// Separator placed between concatenated sources.
const CONCAT_SEPARATOR: &str = "\n";

/// A step that reads a PathSet and writes into its destination.
#[async_trait::async_trait]
pub trait ArtifactTransform: Send + Sync {
    fn task_kind(&self, path_set: &PathSet) -> TaskKind;

    async fn apply(&self, path_set: &PathSet, mode: BuildMode) -> Result<()>;
}

/// Wraps a transform invocation for one PathSet as a named task.
pub fn transform_task(
    transform: Arc<dyn ArtifactTransform>,
    path_set: PathSet,
    mode: BuildMode,
) -> Task {
    let kind = transform.task_kind(&path_set);
    let path_set = Arc::new(path_set);
    Task::new(kind, move || {
        let transform = transform.clone();
        let path_set = path_set.clone();
        async move { transform.apply(&path_set, mode).await }
    })
}

/// Copies matched files unmodified, keeping their path below the glob base.
///
/// Destination files whose source disappeared are left in place: only the
/// cleaner deletes from the output directory.
pub struct StaticCopy {
    root: PathBuf,
    outdir: PathBuf,
    fs: Arc<dyn FileSystemService>,
}

impl StaticCopy {
    pub fn new(root: impl Into<PathBuf>, outdir: impl Into<PathBuf>, fs: Arc<dyn FileSystemService>) -> Self {
        Self {
            root: root.into(),
            outdir: outdir.into(),
            fs,
        }
    }
}

#[async_trait::async_trait]
impl ArtifactTransform for StaticCopy {
    fn task_kind(&self, path_set: &PathSet) -> TaskKind {
        TaskKind::StaticCopy {
            path_set: path_set.name.clone(),
        }
    }

    async fn apply(&self, path_set: &PathSet, _mode: BuildMode) -> Result<()> {
        let sources = self.fs.expand(&self.root, path_set).await?;
        let destination = path_set.destination_in(&self.outdir);

        try_join_all(sources.iter().map(|source| {
            let target = destination.join(&source.relative);
            Logger::processing_file(&source.relative.to_string_lossy(), "copy");
            async move { self.fs.copy_file(&source.path, &target).await }
        }))
        .await?;

        Logger::debug(&format!(
            "📄 Copied {} file(s) into {}",
            sources.len(),
            destination.display()
        ));
        Ok(())
    }
}

/// Concatenates stylesheets in PathSet order into `index.css`, optimized in
/// production.
pub struct StyleTransform {
    root: PathBuf,
    outdir: PathBuf,
    fs: Arc<dyn FileSystemService>,
    optimizer: Arc<dyn CssOptimizer>,
    timeout: Option<Duration>,
}

impl StyleTransform {
    pub fn new(
        root: impl Into<PathBuf>,
        outdir: impl Into<PathBuf>,
        fs: Arc<dyn FileSystemService>,
        optimizer: Arc<dyn CssOptimizer>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            root: root.into(),
            outdir: outdir.into(),
            fs,
            optimizer,
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl ArtifactTransform for StyleTransform {
    fn task_kind(&self, path_set: &PathSet) -> TaskKind {
        TaskKind::Style {
            path_set: path_set.name.clone(),
        }
    }

    async fn apply(&self, path_set: &PathSet, mode: BuildMode) -> Result<()> {
        let Some(concatenated) = concat_sources(&self.root, self.fs.as_ref(), path_set).await? else {
            return Ok(());
        };

        let output = if mode.is_production() {
            let task = format!("style:{}", path_set.name);
            with_timeout(
                &task,
                self.timeout,
                self.optimizer.optimize(&concatenated, STYLE_ARTIFACT),
            )
            .await?
        } else {
            concatenated
        };

        let target = path_set.destination_in(&self.outdir).join(STYLE_ARTIFACT);
        self.fs.write_file(&target, &output).await
    }
}

/// Concatenates third-party scripts into `index.js`, minified in production.
/// Scripts depend on each other by load order, so declaration order is kept.
pub struct PluginScriptTransform {
    root: PathBuf,
    outdir: PathBuf,
    fs: Arc<dyn FileSystemService>,
    minifier: Arc<dyn ScriptMinifier>,
    timeout: Option<Duration>,
}

impl PluginScriptTransform {
    pub fn new(
        root: impl Into<PathBuf>,
        outdir: impl Into<PathBuf>,
        fs: Arc<dyn FileSystemService>,
        minifier: Arc<dyn ScriptMinifier>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            root: root.into(),
            outdir: outdir.into(),
            fs,
            minifier,
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl ArtifactTransform for PluginScriptTransform {
    fn task_kind(&self, path_set: &PathSet) -> TaskKind {
        TaskKind::PluginScripts {
            path_set: path_set.name.clone(),
        }
    }

    async fn apply(&self, path_set: &PathSet, mode: BuildMode) -> Result<()> {
        let Some(concatenated) = concat_sources(&self.root, self.fs.as_ref(), path_set).await? else {
            return Ok(());
        };

        let output = if mode.is_production() {
            let task = format!("scripts:{}", path_set.name);
            with_timeout(
                &task,
                self.timeout,
                self.minifier.minify(&concatenated, SCRIPT_ARTIFACT),
            )
            .await?
        } else {
            concatenated
        };

        let target = path_set.destination_in(&self.outdir).join(SCRIPT_ARTIFACT);
        self.fs.write_file(&target, &output).await
    }
}

/// Reads every source of the set (concurrently) and joins them in
/// declaration order. `None` when the set matched nothing.
async fn concat_sources(
    root: &Path,
    fs: &dyn FileSystemService,
    path_set: &PathSet,
) -> Result<Option<String>> {
    let sources = fs.expand(root, path_set).await?;
    if sources.is_empty() {
        Logger::debug(&format!("'{}' matched no sources, nothing to write", path_set.name));
        return Ok(None);
    }

    let contents = try_join_all(sources.iter().map(|source| fs.read_file(&source.path))).await?;
    Ok(Some(contents.join(CONCAT_SEPARATOR)))
}

/// Invokes the bundling service and writes its artifacts. Nothing is written
/// unless every format was produced.
pub struct CoreBundle {
    outdir: PathBuf,
    fs: Arc<dyn FileSystemService>,
    bundler: Arc<dyn ModuleBundler>,
    timeout: Option<Duration>,
}

impl CoreBundle {
    pub fn new(
        outdir: impl Into<PathBuf>,
        fs: Arc<dyn FileSystemService>,
        bundler: Arc<dyn ModuleBundler>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            outdir: outdir.into(),
            fs,
            bundler,
            timeout,
        }
    }

    pub async fn apply(&self, spec: &BundleSpec) -> Result<Vec<PathBuf>> {
        let artifacts = with_timeout("core", self.timeout, self.bundler.bundle(spec)).await?;

        let mut written = Vec::with_capacity(artifacts.len());
        for artifact in &artifacts {
            let path = self.outdir.join(&artifact.file_name);
            self.fs.write_file(&path, &artifact.code).await?;
            written.push(path.clone());

            if let Some(map) = &artifact.source_map {
                let map_path = self.outdir.join(format!("{}.map", artifact.file_name));
                self.fs.write_file(&map_path, map).await?;
                written.push(map_path);
            }
        }
        Ok(written)
    }

    pub fn task(self: Arc<Self>, spec: BundleSpec) -> Task {
        let spec = Arc::new(spec);
        Task::new(TaskKind::CoreBundle, move || {
            let step = self.clone();
            let spec = spec.clone();
            async move { step.apply(&spec).await.map(|_| ()) }
        })
    }
}

/// Removes the output directory tree. A missing directory is not an error.
pub struct Cleaner {
    outdir: PathBuf,
    fs: Arc<dyn FileSystemService>,
}

impl Cleaner {
    pub fn new(outdir: impl Into<PathBuf>, fs: Arc<dyn FileSystemService>) -> Self {
        Self {
            outdir: outdir.into(),
            fs,
        }
    }

    pub async fn clean(&self) -> Result<()> {
        if self.fs.remove_dir_all(&self.outdir).await? {
            Logger::debug(&format!("🧹 Removed {}", self.outdir.display()));
        }
        Ok(())
    }

    pub fn task(self: Arc<Self>) -> Task {
        Task::new(TaskKind::Clean, move || {
            let cleaner = self.clone();
            async move { cleaner.clean().await }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{LightningCssProcessor, OxcMinifier, TokioFileSystemService};
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn fs() -> Arc<dyn FileSystemService> {
        Arc::new(TokioFileSystemService)
    }

    fn style_set() -> PathSet {
        PathSet::new("mainStyle", ["src/styles/a.css", "src/styles/b.css"], "assets/styles")
    }

    #[tokio::test]
    async fn style_development_concatenates_verbatim() {
        let dir = tempdir().unwrap();
        write(dir.path(), "src/styles/a.css", "a{color:red}");
        write(dir.path(), "src/styles/b.css", "b {\n  color: blue;\n}");

        let transform = StyleTransform::new(dir.path(), dir.path().join("dist"), fs(), Arc::new(LightningCssProcessor::new()), None);
        transform.apply(&style_set(), BuildMode::Development).await.unwrap();

        let out = std::fs::read_to_string(dir.path().join("dist/assets/styles/index.css")).unwrap();
        assert_eq!(out, "a{color:red}\nb {\n  color: blue;\n}");
    }

    #[tokio::test]
    async fn style_production_is_optimized() {
        let dir = tempdir().unwrap();
        write(dir.path(), "src/styles/a.css", "a {color:red}");
        write(dir.path(), "src/styles/b.css", "b { color: blue }");

        let transform = StyleTransform::new(dir.path(), dir.path().join("dist"), fs(), Arc::new(LightningCssProcessor::new()), None);
        transform.apply(&style_set(), BuildMode::Production).await.unwrap();

        let out = std::fs::read_to_string(dir.path().join("dist/assets/styles/index.css")).unwrap();
        assert!(out.contains("a{color:red}"));
        assert!(out.contains("b{color:"));
        assert!(!out.contains('\n'));
    }

    #[tokio::test]
    async fn unreadable_style_source_fails() {
        let dir = tempdir().unwrap();
        write(dir.path(), "src/styles/a.css", "a{}");

        let transform = StyleTransform::new(dir.path(), dir.path().join("dist"), fs(), Arc::new(LightningCssProcessor::new()), None);
        let err = transform.apply(&style_set(), BuildMode::Development).await.unwrap_err();
        assert!(matches!(err, crate::utils::FlowError::TransformIo { .. }));
    }

    #[tokio::test]
    async fn plugin_scripts_keep_declared_order() {
        let dir = tempdir().unwrap();
        write(dir.path(), "plugins/c.js", "var c = 3;");
        write(dir.path(), "plugins/a.js", "var a = 1;");
        write(dir.path(), "plugins/b.js", "var b = 2;");

        let set = PathSet::new("pluginsJs", ["plugins/a.js", "plugins/b.js", "plugins/c.js"], "plugins");
        let transform = PluginScriptTransform::new(dir.path(), dir.path().join("dist"), fs(), Arc::new(OxcMinifier::new()), None);
        transform.apply(&set, BuildMode::Development).await.unwrap();

        let out = std::fs::read_to_string(dir.path().join("dist/plugins/index.js")).unwrap();
        assert_eq!(out, "var a = 1;\nvar b = 2;\nvar c = 3;");
    }

    #[tokio::test]
    async fn plugin_scripts_production_drops_console() {
        let dir = tempdir().unwrap();
        write(dir.path(), "plugins/a.js", "window.plugin = function (x) {\n  console.log(x);\n  return x * 2;\n};");

        let set = PathSet::new("pluginsJs", ["plugins/a.js"], "plugins");
        let transform = PluginScriptTransform::new(dir.path(), dir.path().join("dist"), fs(), Arc::new(OxcMinifier::new()), None);
        transform.apply(&set, BuildMode::Production).await.unwrap();

        let out = std::fs::read_to_string(dir.path().join("dist/plugins/index.js")).unwrap();
        assert!(out.contains("window.plugin"));
        assert!(!out.contains("console"));
    }

    #[tokio::test]
    async fn static_copy_preserves_structure_and_keeps_stale_files() {
        let dir = tempdir().unwrap();
        write(dir.path(), "src/assets/img/logo.png", "png");
        write(dir.path(), "src/assets/fonts/a.woff", "woff");
        write(dir.path(), "dist/assets/old.txt", "stale");

        let set = PathSet::new("staticAssets", ["src/assets/**"], "assets");
        StaticCopy::new(dir.path(), dir.path().join("dist"), fs())
            .apply(&set, BuildMode::Development)
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(dir.path().join("dist/assets/img/logo.png")).unwrap(), "png");
        assert!(dir.path().join("dist/assets/fonts/a.woff").exists());
        assert!(dir.path().join("dist/assets/old.txt").exists());
    }

    #[tokio::test]
    async fn cleaner_removes_tree_and_tolerates_absence() {
        let dir = tempdir().unwrap();
        write(dir.path(), "dist/a/b.txt", "x");

        let cleaner = Arc::new(Cleaner::new(dir.path().join("dist"), fs()));
        cleaner.clean().await.unwrap();
        assert!(!dir.path().join("dist").exists());
        cleaner.clone().task().run().await.unwrap();
    }
}
