//! Named tasks and the two pipeline combinators.
//!
//! A [`Pipeline`] is plain data: it can be built, printed and inspected in
//! tests without touching the file system. Only [`Pipeline::run`] executes it.

use crate::core::models::TaskKind;
use crate::utils::{FlowError, Logger, Result};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub type TaskFuture = BoxFuture<'static, Result<()>>;
type TaskFn = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

/// A named, zero-argument unit of asynchronous work.
#[derive(Clone)]
pub struct Task {
    name: String,
    kind: TaskKind,
    run: TaskFn,
}

impl Task {
    pub fn new<F, Fut>(kind: TaskKind, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let name = kind.default_name();
        Self::named(name, kind, f)
    }

    pub fn named<F, Fut>(name: impl Into<String>, kind: TaskKind, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            kind,
            run: Arc::new(move || f().boxed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub async fn run(&self) -> Result<()> {
        Logger::task_start(&self.name);
        let started = Instant::now();
        let result = (self.run)().await;
        match &result {
            Ok(()) => Logger::task_finished(&self.name, started.elapsed()),
            Err(err) => Logger::task_failed(&self.name, started.elapsed(), err),
        }
        result
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub enum Pipeline {
    Task(Task),
    /// Each member starts only after the previous one succeeded.
    Sequence(Vec<Pipeline>),
    /// All members start together; the first failure fails the whole group.
    Parallel(Vec<Pipeline>),
}

impl From<Task> for Pipeline {
    fn from(task: Task) -> Self {
        Pipeline::Task(task)
    }
}

impl Pipeline {
    pub fn series(members: impl IntoIterator<Item = Pipeline>) -> Self {
        Pipeline::Sequence(members.into_iter().collect())
    }

    pub fn parallel(members: impl IntoIterator<Item = Pipeline>) -> Self {
        Pipeline::Parallel(members.into_iter().collect())
    }

    /// Runs the pipeline. On a parallel failure the siblings that already
    /// started keep running detached; their results are ignored.
    pub fn run(&self) -> TaskFuture {
        let pipeline = self.clone();
        async move {
            match pipeline {
                Pipeline::Task(task) => task.run().await,
                Pipeline::Sequence(members) => {
                    for member in members {
                        member.run().await?;
                    }
                    Ok(())
                }
                Pipeline::Parallel(members) => {
                    let mut running: FuturesUnordered<_> = members
                        .iter()
                        .map(|member| tokio::spawn(member.run()))
                        .collect();

                    while let Some(joined) = running.next().await {
                        match joined {
                            Ok(Ok(())) => {}
                            Ok(Err(err)) => return Err(err),
                            Err(join_err) if join_err.is_panic() => {
                                std::panic::resume_unwind(join_err.into_panic())
                            }
                            Err(join_err) => {
                                return Err(FlowError::Io(std::io::Error::new(
                                    std::io::ErrorKind::Interrupted,
                                    join_err.to_string(),
                                )))
                            }
                        }
                    }
                    Ok(())
                }
            }
        }
        .boxed()
    }

    /// Task names in depth-first declaration order.
    pub fn task_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Pipeline::Task(task) => names.push(task.name()),
            Pipeline::Sequence(members) | Pipeline::Parallel(members) => {
                for member in members {
                    member.collect_names(names);
                }
            }
        }
    }

    pub fn find(&self, name: &str) -> Option<&Task> {
        match self {
            Pipeline::Task(task) => (task.name() == name).then_some(task),
            Pipeline::Sequence(members) | Pipeline::Parallel(members) => {
                members.iter().find_map(|member| member.find(name))
            }
        }
    }
}

/// `a > (b | c) > d` notation: `>` is sequence, `|` is parallel.
impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pipeline::Task(task) => f.write_str(task.name()),
            Pipeline::Sequence(members) => write_joined(f, members, " > ", false),
            Pipeline::Parallel(members) => write_joined(f, members, " | ", true),
        }
    }
}

fn write_joined(
    f: &mut fmt::Formatter<'_>,
    members: &[Pipeline],
    separator: &str,
    parenthesize: bool,
) -> fmt::Result {
    if parenthesize {
        f.write_str("(")?;
    }
    for (i, member) in members.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{}", member)?;
    }
    if parenthesize {
        f.write_str(")")?;
    }
    Ok(())
}

/// Bounds an invocation of an external service when a limit is configured.
pub async fn with_timeout<T, Fut>(task: &str, limit: Option<Duration>, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match limit {
        None => fut.await,
        Some(after) => tokio::time::timeout(after, fut)
            .await
            .map_err(|_| FlowError::Timeout {
                task: task.to_string(),
                after,
            })?,
    }
}
