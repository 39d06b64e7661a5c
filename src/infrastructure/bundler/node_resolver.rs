use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

/// The package.json fields that take part in entry resolution.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageJson {
    #[serde(default)]
    pub main: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub browser: Option<BrowserField>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BrowserField {
    String(String),
    Object(HashMap<String, serde_json::Value>),
}

const EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "json"];
const INDEX_FILES: &[&str] = &["index.js", "index.mjs", "index.json"];

/// Node-style module resolution: relative and root-absolute paths, then
/// `node_modules` lookups walking up from the importing file.
pub struct NodeResolver {
    root: PathBuf,
    package_cache: HashMap<PathBuf, Option<PackageJson>>,
}

impl NodeResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            package_cache: HashMap::new(),
        }
    }

    pub fn resolve(&mut self, specifier: &str, from_file: &Path) -> Option<PathBuf> {
        if specifier.starts_with("./") || specifier.starts_with("../") || specifier == "." {
            let base = from_file.parent()?.join(specifier);
            return self.resolve_file_or_directory(&normalize_path(&base));
        }

        if let Some(rest) = specifier.strip_prefix('/') {
            return self.resolve_file_or_directory(&self.root.join(rest));
        }

        self.resolve_package(specifier, from_file)
    }

    fn resolve_package(&mut self, specifier: &str, from_file: &Path) -> Option<PathBuf> {
        let (package_name, subpath) = split_package_specifier(specifier);

        let mut dir = from_file.parent();
        while let Some(current) = dir {
            let package_dir = current.join("node_modules").join(package_name);
            if package_dir.is_dir() {
                let resolved = match subpath {
                    Some(subpath) => self.resolve_file_or_directory(&package_dir.join(subpath)),
                    None => self.resolve_package_entry(&package_dir),
                };
                if resolved.is_some() {
                    return resolved;
                }
            }
            dir = current.parent();
        }

        // Packages installed next to the project root, for files outside it.
        let package_dir = self.root.join("node_modules").join(package_name);
        if package_dir.is_dir() {
            return match subpath {
                Some(subpath) => self.resolve_file_or_directory(&package_dir.join(subpath)),
                None => self.resolve_package_entry(&package_dir),
            };
        }

        None
    }

    /// `module`, then a string `browser`, then `main`, then index files.
    fn resolve_package_entry(&mut self, package_dir: &Path) -> Option<PathBuf> {
        if let Some(package) = self.package_json(package_dir) {
            let mut candidates = Vec::new();
            candidates.extend(package.module.clone());
            if let Some(BrowserField::String(browser)) = &package.browser {
                candidates.push(browser.clone());
            }
            candidates.extend(package.main.clone());

            for candidate in candidates {
                let entry = normalize_path(&package_dir.join(candidate));
                if let Some(resolved) = self.resolve_as_file(&entry).or_else(|| resolve_index(&entry)) {
                    return Some(resolved);
                }
            }
        }

        resolve_index(package_dir)
    }

    fn resolve_file_or_directory(&mut self, path: &Path) -> Option<PathBuf> {
        if let Some(file) = self.resolve_as_file(path) {
            return Some(file);
        }
        if !path.is_dir() {
            return None;
        }
        self.resolve_package_entry(path)
    }

    fn resolve_as_file(&self, path: &Path) -> Option<PathBuf> {
        if path.is_file() {
            return Some(path.to_path_buf());
        }

        let file_name = path.file_name()?.to_string_lossy().into_owned();
        EXTENSIONS
            .iter()
            .map(|ext| path.with_file_name(format!("{}.{}", file_name, ext)))
            .find(|candidate| candidate.is_file())
    }

    fn package_json(&mut self, package_dir: &Path) -> Option<PackageJson> {
        if let Some(cached) = self.package_cache.get(package_dir) {
            return cached.clone();
        }

        let parsed = std::fs::read_to_string(package_dir.join("package.json"))
            .ok()
            .and_then(|content| serde_json::from_str::<PackageJson>(&content).ok());
        self.package_cache
            .insert(package_dir.to_path_buf(), parsed.clone());
        parsed
    }
}

fn resolve_index(dir: &Path) -> Option<PathBuf> {
    if !dir.is_dir() {
        return None;
    }
    INDEX_FILES
        .iter()
        .map(|index| dir.join(index))
        .find(|candidate| candidate.is_file())
}

/// `@scope/name/sub/path` → (`@scope/name`, `sub/path`).
pub fn split_package_specifier(specifier: &str) -> (&str, Option<&str>) {
    let name_segments = if specifier.starts_with('@') { 2 } else { 1 };
    let mut split_at = None;
    for (seen, (i, _)) in specifier.match_indices('/').enumerate() {
        if seen + 1 == name_segments {
            split_at = Some(i);
            break;
        }
    }
    match split_at {
        Some(i) => (&specifier[..i], Some(&specifier[i + 1..])),
        None => (specifier, None),
    }
}

pub fn is_bare_specifier(specifier: &str) -> bool {
    !specifier.starts_with("./")
        && !specifier.starts_with("../")
        && !specifier.starts_with('/')
        && specifier != "."
}

/// Lexically folds `.` and `..` so the same file always gets the same key.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn splits_scoped_and_plain_specifiers() {
        assert_eq!(split_package_specifier("jquery"), ("jquery", None));
        assert_eq!(
            split_package_specifier("core-js/modules/es.promise"),
            ("core-js", Some("modules/es.promise"))
        );
        assert_eq!(split_package_specifier("@babel/runtime"), ("@babel/runtime", None));
        assert_eq!(
            split_package_specifier("@babel/runtime/helpers/x"),
            ("@babel/runtime", Some("helpers/x"))
        );
    }

    #[test]
    fn resolves_relative_with_extension_probing() {
        let dir = tempdir().unwrap();
        write(dir.path(), "src/index.js", "");
        write(dir.path(), "src/store/index.js", "");
        write(dir.path(), "src/utils/util.js", "");

        let mut resolver = NodeResolver::new(dir.path());
        let from = dir.path().join("src/index.js");
        assert_eq!(
            resolver.resolve("./utils/util", &from),
            Some(dir.path().join("src/utils/util.js"))
        );
        assert_eq!(
            resolver.resolve("./store", &from),
            Some(dir.path().join("src/store/index.js"))
        );
        assert_eq!(resolver.resolve("./missing", &from), None);
    }

    #[test]
    fn keeps_dotted_file_names() {
        let dir = tempdir().unwrap();
        write(dir.path(), "node_modules/core-js/modules/es.promise.js", "");

        let mut resolver = NodeResolver::new(dir.path());
        let from = dir.path().join("src/index.js");
        assert_eq!(
            resolver.resolve("core-js/modules/es.promise", &from),
            Some(dir.path().join("node_modules/core-js/modules/es.promise.js"))
        );
    }

    #[test]
    fn prefers_module_field() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "node_modules/flatpickr/package.json",
            r#"{"name":"flatpickr","main":"dist/flatpickr.js","module":"dist/esm/index.js"}"#,
        );
        write(dir.path(), "node_modules/flatpickr/dist/flatpickr.js", "");
        write(dir.path(), "node_modules/flatpickr/dist/esm/index.js", "");

        let mut resolver = NodeResolver::new(dir.path());
        let from = dir.path().join("src/index.js");
        assert_eq!(
            resolver.resolve("flatpickr", &from),
            Some(dir.path().join("node_modules/flatpickr/dist/esm/index.js"))
        );
    }

    #[test]
    fn falls_back_to_main_then_index() {
        let dir = tempdir().unwrap();
        write(dir.path(), "node_modules/a/package.json", r#"{"main":"lib/a"}"#);
        write(dir.path(), "node_modules/a/lib/a.js", "");
        write(dir.path(), "node_modules/b/index.js", "");

        let mut resolver = NodeResolver::new(dir.path());
        let from = dir.path().join("src/deep/file.js");
        assert_eq!(resolver.resolve("a", &from), Some(dir.path().join("node_modules/a/lib/a.js")));
        assert_eq!(resolver.resolve("b", &from), Some(dir.path().join("node_modules/b/index.js")));
        assert_eq!(resolver.resolve("c", &from), None);
    }

    #[test]
    fn normalizes_parent_components() {
        assert_eq!(
            normalize_path(Path::new("/p/src/a/../b/./c.js")),
            PathBuf::from("/p/src/b/c.js")
        );
    }
}
