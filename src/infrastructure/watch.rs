// Watch mode: maps file-system changes onto PathSet bindings and runs the
// bound reaction once per debounce window.

use crate::core::interfaces::ReloadSignal;
use crate::core::models::PathSet;
use crate::core::tasks::Pipeline;
use crate::infrastructure::file_system::{glob_base, path_set_matches};
use crate::utils::{FlowError, Logger, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A PathSet, its quiet period and the pipeline that rebuilds its artifact.
#[derive(Debug, Clone)]
pub struct WatchBinding {
    pub path_set: PathSet,
    pub debounce: Duration,
    pub reaction: Pipeline,
}

pub struct FileWatcher {
    root: PathBuf,
    bindings: Vec<WatchBinding>,
    reload: Arc<dyn ReloadSignal>,
    ignored: Vec<PathBuf>,
}

/// Keeps the OS watcher and the binding tasks alive. Dropping it stops
/// watching.
pub struct WatchHandle {
    _watcher: Option<RecommendedWatcher>,
    tasks: Vec<JoinHandle<()>>,
}

impl WatchHandle {
    pub fn binding_count(&self) -> usize {
        self.tasks.len().saturating_sub(1)
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl FileWatcher {
    pub fn new(root: impl Into<PathBuf>, bindings: Vec<WatchBinding>, reload: Arc<dyn ReloadSignal>) -> Self {
        Self {
            root: root.into(),
            bindings,
            reload,
            ignored: Vec::new(),
        }
    }

    /// Changes below `dir` never trigger a reaction. Used for the output
    /// directory, which every reaction writes into.
    pub fn ignoring(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ignored.push(dir.into());
        self
    }

    /// Starts one OS watch per glob base and one task per binding.
    pub fn start(self) -> Result<WatchHandle> {
        let root = canonical(&self.root);
        let ignored: Vec<PathBuf> = self.ignored.iter().map(|dir| canonical(dir)).collect();
        let (tx, rx) = mpsc::unbounded_channel::<PathBuf>();

        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| {
                let Ok(event) = result else { return };
                if !is_relevant(&event.kind) {
                    return;
                }
                for path in event.paths {
                    let _ = tx.send(path);
                }
            },
            notify::Config::default(),
        )
        .map_err(|e| FlowError::config(format!("failed to create file watcher: {}", e)))?;

        let targets = watch_targets(&root, &self.bindings, &ignored);
        for target in &targets {
            let mode = if target.recursive {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            watcher.watch(&target.path, mode).map_err(|e| {
                FlowError::config(format!("failed to watch {}: {}", target.path.display(), e))
            })?;
        }
        Logger::debug(&format!("👀 {} watch target(s)", targets.len()));

        for binding in &self.bindings {
            Logger::watching(&binding.path_set.name, &binding.path_set.source_patterns);
        }

        let tasks = spawn_bindings(root, ignored, self.bindings, self.reload, rx);
        Ok(WatchHandle {
            _watcher: Some(watcher),
            tasks,
        })
    }

    /// Drives the bindings from an explicit change stream instead of the OS.
    pub fn start_with_events(self, changes: mpsc::UnboundedReceiver<PathBuf>) -> WatchHandle {
        let tasks = spawn_bindings(self.root, self.ignored, self.bindings, self.reload, changes);
        WatchHandle {
            _watcher: None,
            tasks,
        }
    }
}

/// A directory handed to the OS watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    pub path: PathBuf,
    pub recursive: bool,
}

/// The glob bases of every binding's include patterns, deduplicated.
/// Directories covered by a recursive target, missing directories and
/// anything below an ignored directory are left out.
pub fn watch_targets(root: &Path, bindings: &[WatchBinding], ignored: &[PathBuf]) -> Vec<WatchTarget> {
    let mut candidates: Vec<WatchTarget> = Vec::new();

    for binding in bindings {
        for pattern in &binding.path_set.source_patterns {
            if pattern.starts_with('!') {
                continue;
            }
            let base = glob_base(pattern);
            let remainder = Path::new(pattern)
                .strip_prefix(&base)
                .map(|rest| rest.components().count())
                .unwrap_or(1);
            let target = WatchTarget {
                path: root.join(&base),
                recursive: remainder > 1 || pattern.contains("**"),
            };
            if !target.path.is_dir() {
                Logger::debug(&format!("Not watching missing {}", target.path.display()));
                continue;
            }
            if ignored.iter().any(|dir| target.path.starts_with(dir)) {
                continue;
            }
            candidates.push(target);
        }
    }

    // Recursive targets first, shortest paths first, so covered ones drop out.
    candidates.sort_by(|a, b| {
        b.recursive
            .cmp(&a.recursive)
            .then_with(|| a.path.components().count().cmp(&b.path.components().count()))
            .then_with(|| a.path.cmp(&b.path))
    });

    let mut targets: Vec<WatchTarget> = Vec::new();
    for candidate in candidates {
        let covered = targets.iter().any(|kept| {
            kept.path == candidate.path || (kept.recursive && candidate.path.starts_with(&kept.path))
        });
        if !covered {
            targets.push(candidate);
        }
    }
    targets
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
    )
}

/// One router fanning changes out to every binding whose patterns match,
/// plus one debounce loop per binding.
fn spawn_bindings(
    root: PathBuf,
    ignored: Vec<PathBuf>,
    bindings: Vec<WatchBinding>,
    reload: Arc<dyn ReloadSignal>,
    mut changes: mpsc::UnboundedReceiver<PathBuf>,
) -> Vec<JoinHandle<()>> {
    let mut routes = Vec::with_capacity(bindings.len());
    let mut tasks = Vec::with_capacity(bindings.len() + 1);

    for binding in bindings {
        let (tx, rx) = mpsc::unbounded_channel();
        routes.push((binding.path_set.clone(), tx));
        tasks.push(tokio::spawn(run_binding(binding, rx, reload.clone())));
    }

    tasks.push(tokio::spawn(async move {
        while let Some(path) = changes.recv().await {
            if ignored.iter().any(|dir| path.starts_with(dir)) {
                continue;
            }
            route(&root, &routes, path);
        }
    }));

    tasks
}

fn route(root: &Path, routes: &[(PathSet, mpsc::UnboundedSender<PathBuf>)], path: PathBuf) {
    for (path_set, tx) in routes {
        if path_set_matches(root, path_set, &path) {
            let _ = tx.send(path.clone());
        }
    }
}

async fn run_binding(
    binding: WatchBinding,
    mut changes: mpsc::UnboundedReceiver<PathBuf>,
    reload: Arc<dyn ReloadSignal>,
) {
    let name = binding.path_set.name.clone();

    while let Some(first) = changes.recv().await {
        let mut pending = HashSet::from([first]);
        let mut closed = false;

        // Every further change restarts the quiet period.
        loop {
            match tokio::time::timeout(binding.debounce, changes.recv()).await {
                Ok(Some(path)) => {
                    pending.insert(path);
                }
                Ok(None) => {
                    closed = true;
                    break;
                }
                Err(_) => break,
            }
        }

        Logger::change_detected(&name, pending.len());
        match binding.reaction.run().await {
            Ok(()) => reload.reload(&name),
            Err(err) => {
                let failure = FlowError::WatchReaction {
                    path_set: name.clone(),
                    message: err.to_string(),
                };
                Logger::error(&failure.to_string());
            }
        }

        if closed {
            break;
        }
    }
}
