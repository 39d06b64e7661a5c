//! The task orchestrator: turns a [`BuildConfig`] into the `build` and `dev`
//! pipelines and runs them.

use crate::core::interfaces::*;
use crate::core::models::*;
use crate::core::registry::PathSetRegistry;
use crate::core::tasks::{Pipeline, Task};
use crate::core::transforms::*;
use crate::infrastructure::server::{DevServer, DevServerConfig};
use crate::infrastructure::watch::{FileWatcher, WatchBinding, WatchHandle};
use crate::utils::{FlowError, Logger, Result};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Notify;

/// Composes the artifact steps into pipelines and tracks the state of the
/// current run.
pub struct Orchestrator {
    config: BuildConfig,
    registry: PathSetRegistry,
    fs: Arc<dyn FileSystemService>,
    copy: Arc<dyn ArtifactTransform>,
    style: Arc<dyn ArtifactTransform>,
    scripts: Arc<dyn ArtifactTransform>,
    core: Arc<CoreBundle>,
    cleaner: Arc<Cleaner>,
    history: Mutex<Vec<PipelineState>>,
}

impl Orchestrator {
    /// Registers the PathSets and validates the task plan against them.
    /// Nothing touches the file system before this succeeds.
    pub fn new(
        config: BuildConfig,
        fs: Arc<dyn FileSystemService>,
        optimizer: Arc<dyn CssOptimizer>,
        minifier: Arc<dyn ScriptMinifier>,
        bundler: Arc<dyn ModuleBundler>,
    ) -> Result<Self> {
        let registry = PathSetRegistry::new(config.path_sets.clone())?;
        validate_plan(&registry, &config.plan)?;

        let root = config.root.clone();
        let outdir = config.outdir.clone();
        let timeout = config.task_timeout;

        Ok(Self {
            copy: Arc::new(StaticCopy::new(&root, &outdir, fs.clone())),
            style: Arc::new(StyleTransform::new(&root, &outdir, fs.clone(), optimizer, timeout)),
            scripts: Arc::new(PluginScriptTransform::new(&root, &outdir, fs.clone(), minifier, timeout)),
            core: Arc::new(CoreBundle::new(&outdir, fs.clone(), bundler, timeout)),
            cleaner: Arc::new(Cleaner::new(&outdir, fs.clone())),
            fs,
            registry,
            config,
            history: Mutex::new(vec![PipelineState::Idle]),
        })
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn registry(&self) -> &PathSetRegistry {
        &self.registry
    }

    pub fn state(&self) -> PipelineState {
        self.history
            .lock()
            .last()
            .cloned()
            .unwrap_or(PipelineState::Idle)
    }

    /// Every state the current run passed through, oldest first.
    pub fn history(&self) -> Vec<PipelineState> {
        self.history.lock().clone()
    }

    fn transition(&self, state: PipelineState) {
        Logger::debug(&format!("Pipeline state: {:?}", state));
        self.history.lock().push(state);
    }

    pub fn bundle_spec(&self) -> BundleSpec {
        self.config.bundle.spec_for(&self.config.root, self.config.mode)
    }

    fn clean_stage(&self) -> Pipeline {
        self.cleaner.clone().task().into()
    }

    /// Copy, style, plugin-script and core tasks, all started together.
    pub fn fan_out(&self) -> Result<Pipeline> {
        let plan = &self.config.plan;
        let mode = self.config.mode;
        let mut members = Vec::new();

        for (names, transform) in [
            (&plan.copy, &self.copy),
            (&plan.styles, &self.style),
            (&plan.scripts, &self.scripts),
        ] {
            for name in names {
                let path_set = self.registry.resolve(name)?.clone();
                members.push(transform_task(transform.clone(), path_set, mode).into());
            }
        }
        members.push(self.core.clone().task(self.bundle_spec()).into());

        Ok(Pipeline::parallel(members))
    }

    /// `clean > (copies | styles | scripts | core)`
    pub fn build_pipeline(&self) -> Result<Pipeline> {
        Ok(Pipeline::series([self.clean_stage(), self.fan_out()?]))
    }

    /// The tasks a change in `name` re-runs: exactly the steps that build
    /// from that PathSet, never a full rebuild.
    pub fn reaction_for(&self, name: &str) -> Result<Pipeline> {
        let path_set = self.registry.resolve(name)?;
        let plan = &self.config.plan;
        let mode = self.config.mode;
        let mut members: Vec<Pipeline> = Vec::new();

        for (names, transform) in [
            (&plan.copy, &self.copy),
            (&plan.styles, &self.style),
            (&plan.scripts, &self.scripts),
        ] {
            if names.iter().any(|n| n == name) {
                members.push(transform_task(transform.clone(), path_set.clone(), mode).into());
            }
        }
        if plan.core == name {
            members.push(self.core.clone().task(self.bundle_spec()).into());
        }

        match members.len() {
            0 => Err(FlowError::config(format!(
                "path set '{}' is not built by any task",
                name
            ))),
            1 => Ok(members.remove(0)),
            _ => Ok(Pipeline::parallel(members)),
        }
    }

    /// One binding per PathSet the plan references, in plan order.
    pub fn watch_bindings(&self) -> Result<Vec<WatchBinding>> {
        let mut seen: Vec<&str> = Vec::new();
        let mut bindings = Vec::new();

        for name in self.config.plan.referenced() {
            if seen.contains(&name) {
                continue;
            }
            seen.push(name);
            bindings.push(WatchBinding {
                path_set: self.registry.resolve(name)?.clone(),
                debounce: self.config.debounce,
                reaction: self.reaction_for(name)?,
            });
        }
        Ok(bindings)
    }

    /// `dev` is the build pipeline followed by the watcher and the server.
    /// The server task runs until `shutdown` is notified.
    pub fn dev_pipeline(&self, shutdown: Arc<Notify>) -> Result<DevPipeline> {
        let session = DevSession::default();
        let server = Arc::new(DevServer::new(self.server_config()));

        let watcher = {
            let root = self.config.root.clone();
            let outdir = self.config.outdir.clone();
            let bindings = self.watch_bindings()?;
            let reload = server.reload_signal();
            let slot = session.watcher.clone();
            Task::new(TaskKind::StartWatcher, move || {
                let watcher = FileWatcher::new(root.clone(), bindings.clone(), reload.clone())
                    .ignoring(outdir.clone());
                let slot = slot.clone();
                async move {
                    let handle = watcher.start()?;
                    Logger::info(&format!("👀 Watching {} path set(s)", handle.binding_count()));
                    *slot.lock() = Some(handle);
                    Ok(())
                }
            })
        };

        let server = {
            let host = self.config.host.clone();
            Task::new(TaskKind::StartServer, move || {
                let server = server.clone();
                let shutdown = shutdown.clone();
                let host = host.clone();
                async move {
                    let bound = server.bind().await?;
                    Logger::server_ready(&host, bound.local_addr().port());
                    bound.serve(async move { shutdown.notified().await }).await
                }
            })
        };

        Ok(DevPipeline {
            clean: self.clean_stage(),
            fan_out: self.fan_out()?,
            watcher: watcher.into(),
            server: server.into(),
            session,
        })
    }

    fn server_config(&self) -> DevServerConfig {
        DevServerConfig {
            host: self.config.host.clone(),
            port: self.config.port,
            outdir: self.config.outdir.clone(),
            proxy: self.config.proxy.clone(),
        }
    }

    /// Runs `build` and lists what ended up in the output directory.
    pub async fn build(&self) -> Result<Vec<OutputFile>> {
        self.log_start("build");
        let result = self.run_build_stages().await;
        match result {
            Ok(()) => {
                self.transition(PipelineState::Ready);
                self.fs.list_files(&self.config.outdir).await
            }
            Err(err) => {
                self.transition(PipelineState::Terminated { success: false });
                Err(err)
            }
        }
    }

    /// Runs `dev` until `shutdown` resolves. Only startup failures return
    /// an error; reaction failures are logged by the watcher.
    pub async fn dev<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.log_start("dev");
        let notify = Arc::new(Notify::new());
        let dev = self.dev_pipeline(notify.clone())?;

        let signal = tokio::spawn(async move {
            shutdown.await;
            notify.notify_one();
        });

        let result = self.run_dev_stages(&dev).await;
        signal.abort();
        dev.session.stop();

        self.transition(PipelineState::Terminated {
            success: result.is_ok(),
        });
        result
    }

    async fn run_build_stages(&self) -> Result<()> {
        self.transition(PipelineState::Cleaning);
        self.clean_stage().run().await?;
        self.transition(PipelineState::Building);
        self.fan_out()?.run().await
    }

    async fn run_dev_stages(&self, dev: &DevPipeline) -> Result<()> {
        self.transition(PipelineState::Cleaning);
        dev.clean.run().await?;
        self.transition(PipelineState::Building);
        dev.fan_out.run().await?;
        dev.watcher.run().await?;
        self.transition(PipelineState::WatchingServing);
        dev.server.run().await
    }

    fn log_start(&self, pipeline: &str) {
        Logger::pipeline_start(
            pipeline,
            &self.config.root.display().to_string(),
            &self.config.outdir.display().to_string(),
            self.config.mode,
        );
    }
}

/// The stages of `dev`, kept apart so the run can report its state between
/// them.
pub struct DevPipeline {
    pub clean: Pipeline,
    pub fan_out: Pipeline,
    pub watcher: Pipeline,
    pub server: Pipeline,
    pub session: DevSession,
}

impl DevPipeline {
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::series([
            self.clean.clone(),
            self.fan_out.clone(),
            self.watcher.clone(),
            self.server.clone(),
        ])
    }
}

/// Resources a running `dev` pipeline holds on to.
#[derive(Default, Clone)]
pub struct DevSession {
    watcher: Arc<Mutex<Option<WatchHandle>>>,
}

impl DevSession {
    pub fn is_watching(&self) -> bool {
        self.watcher.lock().is_some()
    }

    /// Stops the file watcher.
    pub fn stop(&self) {
        self.watcher.lock().take();
    }
}

/// Every name the plan uses must be registered, and two steps that write the
/// same artifact name may not share a destination.
pub fn validate_plan(registry: &PathSetRegistry, plan: &TaskPlan) -> Result<()> {
    for name in plan.referenced() {
        registry.resolve(name)?;
    }

    for (kind, names) in [("style", &plan.styles), ("script", &plan.scripts)] {
        for (i, name) in names.iter().enumerate() {
            let destination = &registry.resolve(name)?.destination;
            let clash = names[..i]
                .iter()
                .filter(|other| *other != name)
                .find(|other| {
                    registry
                        .resolve(other)
                        .is_ok_and(|set| &set.destination == destination)
                });
            if let Some(other) = clash {
                return Err(FlowError::config(format!(
                    "{} sets '{}' and '{}' both write into '{}'",
                    kind,
                    other,
                    name,
                    destination.display()
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    struct NoopFs;

    #[async_trait]
    impl FileSystemService for NoopFs {
        async fn expand(&self, _root: &Path, _path_set: &PathSet) -> Result<Vec<SourceFile>> {
            Ok(Vec::new())
        }
        async fn read_file(&self, path: &Path) -> Result<String> {
            Err(FlowError::transform_io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
            ))
        }
        async fn write_file(&self, _path: &Path, _content: &str) -> Result<()> {
            Ok(())
        }
        async fn copy_file(&self, _from: &Path, _to: &Path) -> Result<()> {
            Ok(())
        }
        async fn remove_dir_all(&self, _path: &Path) -> Result<bool> {
            Ok(false)
        }
        async fn list_files(&self, _dir: &Path) -> Result<Vec<OutputFile>> {
            Ok(Vec::new())
        }
    }

    struct Passthrough;

    #[async_trait]
    impl CssOptimizer for Passthrough {
        async fn optimize(&self, css: &str, _file_name: &str) -> Result<String> {
            Ok(css.to_string())
        }
    }

    #[async_trait]
    impl ScriptMinifier for Passthrough {
        async fn minify(&self, code: &str, _file_name: &str) -> Result<String> {
            Ok(code.to_string())
        }
    }

    struct BrokenBundler;

    #[async_trait]
    impl ModuleBundler for BrokenBundler {
        async fn bundle(&self, spec: &BundleSpec) -> Result<Vec<BundleArtifact>> {
            Err(FlowError::bundle(&spec.entry, "Unexpected token (1:4)"))
        }
    }

    fn config(plan: TaskPlan) -> BuildConfig {
        BuildConfig {
            root: PathBuf::from("/project"),
            outdir: PathBuf::from("/project/dist"),
            mode: BuildMode::Development,
            path_sets: vec![
                PathSet::new("staticHtml", ["src/*.html"], ""),
                PathSet::new("mainStyle", ["src/assets/styles/*.css"], "assets/styles"),
                PathSet::new("pluginsStyle", ["src/assets/plugins/*.css"], "assets/plugins"),
                PathSet::new("pluginsJs", ["src/plugins/*.js"], "plugins"),
                PathSet::new("core", ["src/**/*.js"], ""),
            ],
            plan,
            bundle: BundleSettings {
                entry: PathBuf::from("src/index.js"),
                name: "luckysheet".to_string(),
                targets: Vec::new(),
                polyfills: PolyfillMode::Off,
                source_map: SourceMapMode::None,
            },
            host: "127.0.0.1".to_string(),
            port: 0,
            debounce: Duration::from_millis(500),
            proxy: Vec::new(),
            task_timeout: None,
        }
    }

    fn plan() -> TaskPlan {
        TaskPlan {
            copy: vec!["staticHtml".to_string()],
            styles: vec!["mainStyle".to_string(), "pluginsStyle".to_string()],
            scripts: vec!["pluginsJs".to_string()],
            core: "core".to_string(),
        }
    }

    fn orchestrator(plan: TaskPlan) -> Result<Orchestrator> {
        Orchestrator::new(
            config(plan),
            Arc::new(NoopFs),
            Arc::new(Passthrough),
            Arc::new(Passthrough),
            Arc::new(BrokenBundler),
        )
    }

    #[test]
    fn build_pipeline_shape() {
        let orchestrator = orchestrator(plan()).unwrap();
        let pipeline = orchestrator.build_pipeline().unwrap();
        assert_eq!(
            pipeline.to_string(),
            "clean > (copy:staticHtml | style:mainStyle | style:pluginsStyle | scripts:pluginsJs | core)"
        );
        assert_eq!(orchestrator.state(), PipelineState::Idle);
    }

    #[test]
    fn unknown_plan_names_fail_before_any_io() {
        let mut broken = plan();
        broken.scripts.push("vendorJs".to_string());
        let err = orchestrator(broken).err().unwrap();
        assert!(matches!(err, FlowError::UnknownPathSet(name) if name == "vendorJs"));
    }

    #[test]
    fn style_sets_may_not_share_a_destination() {
        let mut cfg = config(plan());
        cfg.path_sets[2].destination = PathBuf::from("assets/styles");
        let err = Orchestrator::new(
            cfg,
            Arc::new(NoopFs),
            Arc::new(Passthrough),
            Arc::new(Passthrough),
            Arc::new(BrokenBundler),
        )
        .err()
        .unwrap();
        assert!(matches!(err, FlowError::Config(_)));
    }

    #[test]
    fn reactions_rebuild_only_their_step() {
        let orchestrator = orchestrator(plan()).unwrap();
        assert_eq!(orchestrator.reaction_for("mainStyle").unwrap().to_string(), "style:mainStyle");
        assert_eq!(orchestrator.reaction_for("core").unwrap().to_string(), "core");
        assert!(matches!(
            orchestrator.reaction_for("nope"),
            Err(FlowError::UnknownPathSet(_))
        ));
    }

    #[test]
    fn one_binding_per_planned_set() {
        let orchestrator = orchestrator(plan()).unwrap();
        let names: Vec<String> = orchestrator
            .watch_bindings()
            .unwrap()
            .into_iter()
            .map(|binding| binding.path_set.name)
            .collect();
        assert_eq!(names, vec!["staticHtml", "mainStyle", "pluginsStyle", "pluginsJs", "core"]);
    }

    #[test]
    fn dev_pipeline_appends_watch_and_serve() {
        let orchestrator = orchestrator(plan()).unwrap();
        let dev = orchestrator.dev_pipeline(Arc::new(Notify::new())).unwrap();
        let pipeline = dev.pipeline();
        let names = pipeline.task_names();
        assert_eq!(names.first(), Some(&"clean"));
        assert_eq!(&names[names.len() - 2..], &["watch", "serve"]);
        assert!(!dev.session.is_watching());
    }

    #[tokio::test]
    async fn failing_member_terminates_the_run() {
        let orchestrator = orchestrator(plan()).unwrap();
        let err = orchestrator.build().await.unwrap_err();
        assert!(matches!(err, FlowError::Bundle { .. }));
        assert_eq!(
            orchestrator.history(),
            vec![
                PipelineState::Idle,
                PipelineState::Cleaning,
                PipelineState::Building,
                PipelineState::Terminated { success: false },
            ]
        );
    }
}
