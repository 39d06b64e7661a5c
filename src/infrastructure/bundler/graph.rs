use super::linker::{link_module, LinkedModule, ModuleKind, RequestKind};
use super::lowering::{self, Lowering};
use super::node_resolver::{normalize_path, NodeResolver};
use super::polyfills;
use crate::core::models::{BundleSpec, PolyfillMode};
use crate::utils::{FlowError, Logger, Result};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct GraphModule {
    pub path: PathBuf,
    pub source: String,
    pub linked: LinkedModule,
    /// Specifier → module id, for every request that resolved.
    pub resolved: Vec<(String, usize)>,
}

/// Every module reachable from the entry, plus the polyfills it needs.
#[derive(Debug)]
pub struct ModuleGraph {
    pub modules: Vec<GraphModule>,
    pub entry: usize,
    /// Modules evaluated before the entry, in order.
    pub preludes: Vec<usize>,
}

impl ModuleGraph {
    /// Walks the graph from the spec's entry. With [`Lowering::Es5`] every
    /// module body is lowered to ES5 as it is linked.
    pub fn build(spec: &BundleSpec, lowering: Lowering) -> Result<Self> {
        let entry_path = normalize_path(&spec.root.join(&spec.entry));
        if !entry_path.is_file() {
            return Err(FlowError::bundle(
                &spec.entry,
                format!("entry module {} does not exist", entry_path.display()),
            ));
        }

        let mut builder = GraphBuilder {
            resolver: NodeResolver::new(&spec.root),
            modules: Vec::new(),
            index: HashMap::new(),
            lowering,
        };
        let entry = builder.walk(&entry_path)?;

        let mut preludes = Vec::new();
        if spec.polyfills == PolyfillMode::Usage {
            for specifier in builder.polyfill_specifiers() {
                match builder.resolver.resolve(&specifier, &entry_path) {
                    Some(path) => preludes.push(builder.walk(&path)?),
                    None => Logger::warn(&format!(
                        "Polyfill '{}' is not installed, skipping it",
                        specifier
                    )),
                }
            }
        }

        Logger::debug(&format!(
            "📦 Module graph: {} module(s), {} polyfill(s)",
            builder.modules.len(),
            preludes.len()
        ));

        Ok(Self {
            modules: builder.modules,
            entry,
            preludes,
        })
    }
}

struct GraphBuilder {
    resolver: NodeResolver,
    modules: Vec<GraphModule>,
    index: HashMap<PathBuf, usize>,
    lowering: Lowering,
}

impl GraphBuilder {
    /// Adds `start` and everything it reaches. Returns the id of `start`.
    fn walk(&mut self, start: &Path) -> Result<usize> {
        let start_id = match self.add(start)? {
            (id, false) => return Ok(id),
            (id, true) => id,
        };

        let mut queue = VecDeque::from([start_id]);
        while let Some(id) = queue.pop_front() {
            let importer = self.modules[id].path.clone();
            let requests = self.modules[id].linked.requests.clone();

            for request in requests {
                let Some(path) = self.resolver.resolve(&request.specifier, &importer) else {
                    match request.kind {
                        RequestKind::Static => {
                            return Err(FlowError::bundle(
                                &importer,
                                format!(
                                    "Could not resolve '{}' from {}",
                                    request.specifier,
                                    importer.display()
                                ),
                            ))
                        }
                        RequestKind::Require | RequestKind::Dynamic => Logger::debug(&format!(
                            "'{}' in {} is left to the runtime",
                            request.specifier,
                            importer.display()
                        )),
                    }
                    continue;
                };

                let (dependency, is_new) = self.add(&path)?;
                if is_new {
                    queue.push_back(dependency);
                }
                self.modules[id].resolved.push((request.specifier, dependency));
            }
        }

        Ok(start_id)
    }

    fn add(&mut self, path: &Path) -> Result<(usize, bool)> {
        let path = normalize_path(path);
        if let Some(&id) = self.index.get(&path) {
            return Ok((id, false));
        }

        let source = std::fs::read_to_string(&path)
            .map_err(|e| FlowError::bundle(&path, format!("cannot read {}: {}", path.display(), e)))?;
        let mut linked = link_module(&path, &source).map_err(|diagnostic| FlowError::bundle(&path, diagnostic))?;
        if self.lowering == Lowering::Es5 && linked.kind != ModuleKind::Json {
            linked.body = lowering::lower_module(&path, &linked.body)?;
        }

        let id = self.modules.len();
        self.modules.push(GraphModule {
            path: path.clone(),
            source,
            linked,
            resolved: Vec::new(),
        });
        self.index.insert(path, id);
        Ok((id, true))
    }

    /// Features used by project modules. Installed packages ship code for
    /// their own targets and are not scanned.
    fn polyfill_specifiers(&self) -> Vec<String> {
        let mut found = Vec::new();
        for module in &self.modules {
            let in_packages = module
                .path
                .components()
                .any(|component| component.as_os_str() == "node_modules");
            if !in_packages {
                polyfills::detect_usage(&module.source, &mut found);
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{OutputFormat, SourceMapMode};
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn spec(root: &Path, polyfills: PolyfillMode) -> BundleSpec {
        BundleSpec {
            root: root.to_path_buf(),
            entry: PathBuf::from("src/index.js"),
            library_name: "lib".to_string(),
            formats: vec![OutputFormat::Umd],
            minify: false,
            targets: vec![],
            polyfills,
            source_map: SourceMapMode::None,
        }
    }

    #[test]
    fn walks_every_reachable_module_once() {
        let dir = tempdir().unwrap();
        write(dir.path(), "src/index.js", "import a from './a';\nimport b from './b';\nexport default a + b;\n");
        write(dir.path(), "src/a.js", "import b from './b';\nexport default b;\n");
        write(dir.path(), "src/b.js", "export default 1;\n");
        write(dir.path(), "src/unused.js", "export default 2;\n");

        let graph = ModuleGraph::build(&spec(dir.path(), PolyfillMode::Off), Lowering::None).unwrap();
        assert_eq!(graph.modules.len(), 3);
        assert_eq!(graph.entry, 0);
        assert_eq!(graph.modules[0].resolved.len(), 2);
    }

    #[test]
    fn unresolved_static_import_is_a_bundle_error() {
        let dir = tempdir().unwrap();
        write(dir.path(), "src/index.js", "import x from './missing';\nexport default x;\n");

        let err = ModuleGraph::build(&spec(dir.path(), PolyfillMode::Off), Lowering::None).unwrap_err();
        assert!(matches!(&err, FlowError::Bundle { diagnostic, .. } if diagnostic.contains("./missing")));
    }

    #[test]
    fn unresolved_require_is_left_alone() {
        let dir = tempdir().unwrap();
        write(dir.path(), "src/index.js", "var fs = require('fs');\nmodule.exports = fs;\n");

        let graph = ModuleGraph::build(&spec(dir.path(), PolyfillMode::Off), Lowering::None).unwrap();
        assert_eq!(graph.modules.len(), 1);
        assert!(graph.modules[0].resolved.is_empty());
    }

    #[test]
    fn installed_polyfills_run_first() {
        let dir = tempdir().unwrap();
        write(dir.path(), "src/index.js", "export default Object.assign({}, { a: 1 });\n");
        write(
            dir.path(),
            "node_modules/core-js/modules/es.object.assign.js",
            "require('../internals/export');\n",
        );
        write(dir.path(), "node_modules/core-js/internals/export.js", "module.exports = 1;\n");

        let graph = ModuleGraph::build(&spec(dir.path(), PolyfillMode::Usage), Lowering::None).unwrap();
        assert_eq!(graph.preludes.len(), 1);
        assert_eq!(graph.modules.len(), 3);
    }

    #[test]
    fn missing_polyfills_are_skipped() {
        let dir = tempdir().unwrap();
        write(dir.path(), "src/index.js", "export default new Promise(function () {});\n");

        let graph = ModuleGraph::build(&spec(dir.path(), PolyfillMode::Usage), Lowering::None).unwrap();
        assert!(graph.preludes.is_empty());
    }

    #[test]
    fn es5_graphs_lower_every_script_module() {
        let dir = tempdir().unwrap();
        write(dir.path(), "src/index.js", "import data from './data.json';\nexport const keys = () => Object.keys(data);\n");
        write(dir.path(), "src/data.json", "{ \"a\": 1 }\n");

        let graph = ModuleGraph::build(&spec(dir.path(), PolyfillMode::Off), Lowering::Es5).unwrap();
        let body = &graph.modules[0].linked.body;
        assert!(!body.contains("=>"), "{}", body);
        assert!(body.contains("function ()"), "{}", body);
        assert_eq!(graph.modules[1].linked.body, "module.exports = { \"a\": 1 };");
    }

    #[test]
    fn missing_entry_is_a_bundle_error() {
        let dir = tempdir().unwrap();
        let err = ModuleGraph::build(&spec(dir.path(), PolyfillMode::Off), Lowering::None).unwrap_err();
        assert!(matches!(err, FlowError::Bundle { .. }));
    }
}
