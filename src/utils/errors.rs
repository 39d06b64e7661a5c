use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    /// A task plan or lookup referenced a PathSet that was never registered.
    #[error("Unknown path set: {0}")]
    UnknownPathSet(String),

    /// A source file of a transform could not be read or written.
    #[error("Transform IO error on {}: {source}", path.display())]
    TransformIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The bundling service rejected the module graph. The diagnostic is kept verbatim.
    #[error("Bundle error in {}:\n{diagnostic}", entry.display())]
    Bundle {
        entry: PathBuf,
        diagnostic: String,
    },

    #[error("Minification of {file} failed:\n{diagnostic}")]
    Minify {
        file: String,
        diagnostic: String,
    },

    #[error("Dev server startup failed: {0}")]
    ProxyStartup(String),

    /// A watch reaction failed; the watcher keeps running.
    #[error("Watch reaction for '{path_set}' failed: {message}")]
    WatchReaction {
        path_set: String,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid source pattern '{pattern}': {message}")]
    Pattern {
        pattern: String,
        message: String,
    },

    #[error("Task '{task}' timed out after {after:?}")]
    Timeout {
        task: String,
        after: Duration,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FlowError {
    pub fn transform_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::TransformIo {
            path: path.into(),
            source,
        }
    }

    pub fn bundle(entry: impl Into<PathBuf>, diagnostic: impl Into<String>) -> Self {
        Self::Bundle {
            entry: entry.into(),
            diagnostic: diagnostic.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Startup failures end `dev` before it serves anything; everything else
    /// only ends the pipeline run that raised it.
    pub fn is_startup_failure(&self) -> bool {
        matches!(
            self,
            FlowError::UnknownPathSet(_) | FlowError::ProxyStartup(_) | FlowError::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_error_keeps_diagnostic_verbatim() {
        let diagnostic = "Expected `;` but found `}`\n  at src/index.js:3:7";
        let err = FlowError::bundle("src/index.js", diagnostic);
        assert!(err.to_string().contains(diagnostic));
    }

    #[test]
    fn transform_io_names_the_file() {
        let err = FlowError::transform_io(
            "src/assets/styles/missing.css",
            std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        );
        assert!(err.to_string().contains("missing.css"));
    }

    #[test]
    fn startup_failures() {
        assert!(FlowError::UnknownPathSet("x".into()).is_startup_failure());
        assert!(FlowError::ProxyStartup("port in use".into()).is_startup_failure());
        assert!(!FlowError::bundle("a.js", "boom").is_startup_failure());
    }
}
