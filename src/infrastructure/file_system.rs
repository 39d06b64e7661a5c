use crate::core::{interfaces::*, models::{OutputFile, PathSet}};
use crate::utils::{FlowError, Result};
use glob::{MatchOptions, Pattern};
use std::path::{Component, Path, PathBuf};
use tokio::fs;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

pub struct TokioFileSystemService;

#[async_trait::async_trait]
impl FileSystemService for TokioFileSystemService {
    async fn expand(&self, root: &Path, path_set: &PathSet) -> Result<Vec<SourceFile>> {
        let root = root.to_path_buf();
        let patterns = path_set.source_patterns.clone();
        tokio::task::spawn_blocking(move || expand_patterns(&root, &patterns))
            .await
            .map_err(|e| FlowError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }

    async fn read_file(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path)
            .await
            .map_err(|e| FlowError::transform_io(path, e))
    }

    async fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| FlowError::transform_io(parent, e))?;
        }

        fs::write(path, content)
            .await
            .map_err(|e| FlowError::transform_io(path, e))
    }

    async fn copy_file(&self, from: &Path, to: &Path) -> Result<()> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| FlowError::transform_io(parent, e))?;
        }

        fs::copy(from, to)
            .await
            .map(|_| ())
            .map_err(|e| FlowError::transform_io(from, e))
    }

    async fn remove_dir_all(&self, path: &Path) -> Result<bool> {
        match fs::remove_dir_all(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FlowError::Io(e)),
        }
    }

    async fn list_files(&self, dir: &Path) -> Result<Vec<OutputFile>> {
        if !fs::try_exists(dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let dir = dir.to_path_buf();
        let files = tokio::task::spawn_blocking(move || expand_patterns(&dir, &["**/*".to_string()]))
            .await
            .map_err(|e| FlowError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        let mut outputs = Vec::with_capacity(files.len());
        for file in files {
            let size = fs::metadata(&file.path).await.map_err(FlowError::Io)?.len();
            outputs.push(OutputFile {
                path: file.path,
                size,
            });
        }
        Ok(outputs)
    }
}

/// Expands ordered patterns. A `!pattern` only removes files collected by
/// the patterns before it.
pub fn expand_patterns(root: &Path, patterns: &[String]) -> Result<Vec<SourceFile>> {
    let mut files: Vec<SourceFile> = Vec::new();

    for raw in patterns {
        if let Some(negated) = raw.strip_prefix('!') {
            let pattern = compile(&normalize(negated))?;
            files.retain(|file| {
                let relative = file.path.strip_prefix(root).unwrap_or(&file.path);
                !pattern.matches_path_with(relative, MATCH_OPTIONS)
            });
            continue;
        }

        let base = glob_base(raw);
        if !has_magic(raw) {
            let path = root.join(raw);
            if !path.is_file() {
                return Err(FlowError::transform_io(
                    path,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "source file not found"),
                ));
            }
            push_unique(&mut files, root, &base, path);
            continue;
        }

        let full = format!(
            "{}/{}",
            Pattern::escape(&root.to_string_lossy()),
            normalize(raw)
        );
        let entries = glob::glob_with(&full, MATCH_OPTIONS).map_err(|e| {
            FlowError::Pattern {
                pattern: raw.clone(),
                message: e.to_string(),
            }
        })?;

        let mut matched = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => matched.push(path),
                Ok(_) => {}
                Err(e) => return Err(FlowError::transform_io(e.path().to_path_buf(), e.into_error())),
            }
        }
        matched.sort();

        for path in matched {
            push_unique(&mut files, root, &base, path);
        }
    }

    Ok(files)
}

fn push_unique(files: &mut Vec<SourceFile>, root: &Path, base: &Path, path: PathBuf) {
    if files.iter().any(|file| file.path == path) {
        return;
    }
    let relative = path
        .strip_prefix(root.join(base))
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| PathBuf::from(path.file_name().unwrap_or_default()));
    files.push(SourceFile { path, relative });
}

/// A trailing `**` only yields directories; files below it are wanted.
fn normalize(pattern: &str) -> String {
    if pattern.ends_with("**") {
        format!("{}/*", pattern)
    } else {
        pattern.to_string()
    }
}

fn compile(pattern: &str) -> Result<Pattern> {
    Pattern::new(pattern).map_err(|e| FlowError::Pattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

pub fn has_magic(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Leading directory components that contain no glob syntax. For a literal
/// file path this is its parent directory.
pub fn glob_base(pattern: &str) -> PathBuf {
    let path = Path::new(pattern);
    let mut base = PathBuf::new();
    let components: Vec<Component> = path.components().collect();

    for (i, component) in components.iter().enumerate() {
        let text = component.as_os_str().to_string_lossy();
        let is_last = i + 1 == components.len();
        if has_magic(&text) || is_last {
            break;
        }
        base.push(component.as_os_str());
    }

    base
}

/// Whether a changed file belongs to a PathSet, honouring pattern order.
pub fn path_set_matches(root: &Path, path_set: &PathSet, path: &Path) -> bool {
    let relative = match path.strip_prefix(root) {
        Ok(relative) => relative,
        Err(_) => return false,
    };

    let mut matched = false;
    for raw in &path_set.source_patterns {
        let (negated, text) = match raw.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, raw.as_str()),
        };
        let Ok(pattern) = Pattern::new(&normalize(text)) else {
            continue;
        };
        if pattern.matches_path_with(relative, MATCH_OPTIONS) {
            matched = !negated;
        }
    }
    matched
}
