use assetflow::core::models::{BuildConfig, BuildMode, BundleSettings, PathSet, PolyfillMode, SourceMapMode, TaskPlan};
use assetflow::infrastructure::{LightningCssProcessor, OxcBundler, OxcMinifier, TokioFileSystemService};
use assetflow::utils::{CliOverrides, ConfigLoader, ProjectConfig};
use assetflow::Orchestrator;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

pub fn read(root: &Path, rel: &str) -> String {
    std::fs::read_to_string(root.join(rel)).unwrap()
}

/// A small project laid out like the reference sheet application.
pub fn sample_project(root: &Path) {
    write(root, "src/index.html", "<html><body><div id=\"luckysheet\"></div></body></html>");
    write(root, "src/assets/img/logo.svg", "<svg></svg>");
    write(root, "src/assets/styles/a.css", "a{color:red}");
    write(root, "src/assets/styles/b.css", "b {\n  color: blue;\n}");
    write(root, "src/assets/plugins/picker.css", ".picker {\n  margin: 0;\n}");
    write(root, "src/plugins/a.js", "window.order = ['a'];");
    write(root, "src/plugins/b.js", "window.order.push('b');");
    write(root, "src/plugins/c.js", "window.order.push('c');\nconsole.log(window.order);");
    write(root, "src/demoData/sheet.js", "window.sheetData = [];");
    write(
        root,
        "src/utils/math.js",
        "export function add(a, b) {\n  return a + b;\n}\nexport const VERSION = '2.1';\n",
    );
    write(
        root,
        "src/index.js",
        "import { add, VERSION } from './utils/math';\n\nexport function create(options) {\n  return { sum: add(1, 2), version: VERSION, options };\n}\n",
    );
}

pub fn project_config() -> ProjectConfig {
    ProjectConfig {
        path_sets: vec![
            PathSet::new("staticHtml", ["src/*.html"], ""),
            PathSet::new("staticAssets", ["src/assets/**", "!src/assets/**/*.css"], "assets"),
            PathSet::new("staticDemoData", ["src/demoData/*.js"], "demoData"),
            PathSet::new("core", ["src/**/*.js", "!src/demoData/*.js", "!src/plugins/*.js"], ""),
            PathSet::new("mainStyle", ["src/assets/styles/*.css"], "assets/styles"),
            PathSet::new("pluginsStyle", ["src/assets/plugins/*.css"], "assets/plugins"),
            PathSet::new("pluginsJs", ["src/plugins/a.js", "src/plugins/b.js", "src/plugins/c.js"], "plugins"),
        ],
        tasks: TaskPlan::default(),
        bundle: BundleSettings {
            entry: PathBuf::from("src/index.js"),
            name: "luckysheet".to_string(),
            targets: Vec::new(),
            polyfills: PolyfillMode::Off,
            source_map: SourceMapMode::Inline,
        },
        proxy: Vec::new(),
        ..Default::default()
    }
}

pub fn build_config(root: &Path, mode: BuildMode) -> BuildConfig {
    ConfigLoader::merge_with_cli(
        Some(project_config()),
        root.to_path_buf(),
        mode,
        &CliOverrides::default(),
    )
}

pub fn orchestrator(config: BuildConfig) -> Orchestrator {
    Orchestrator::new(
        config,
        Arc::new(TokioFileSystemService),
        Arc::new(LightningCssProcessor::new()),
        Arc::new(OxcMinifier::new()),
        Arc::new(OxcBundler::new()),
    )
    .unwrap()
}

/// Every file below `dir` with its contents, sorted by relative path.
pub fn snapshot(dir: &Path) -> Vec<(String, Vec<u8>)> {
    let mut files = Vec::new();
    collect(dir, dir, &mut files);
    files.sort();
    files
}

fn collect(base: &Path, dir: &Path, files: &mut Vec<(String, Vec<u8>)>) {
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            collect(base, &path, files);
        } else {
            let rel = path.strip_prefix(base).unwrap().to_string_lossy().replace('\\', "/");
            files.push((rel, std::fs::read(&path).unwrap()));
        }
    }
}
