use crate::common::write;
use assetflow::core::interfaces::ModuleBundler;
use assetflow::core::models::{BundleSpec, OutputFormat, PolyfillMode, SourceMapMode};
use assetflow::infrastructure::OxcBundler;
use assetflow::FlowError;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn spec(root: &Path, formats: Vec<OutputFormat>, source_map: SourceMapMode) -> BundleSpec {
    BundleSpec {
        root: root.to_path_buf(),
        entry: PathBuf::from("src/index.js"),
        library_name: "luckysheet".to_string(),
        formats,
        minify: false,
        targets: Vec::new(),
        polyfills: PolyfillMode::Off,
        source_map,
    }
}

fn mixed_project(root: &Path) {
    write(
        root,
        "node_modules/numeral/package.json",
        r#"{"name": "numeral", "main": "numeral.js"}"#,
    );
    write(
        root,
        "node_modules/numeral/numeral.js",
        "function numeral(n) { return { format: function () { return String(n); } }; }\nmodule.exports = numeral;\n",
    );
    write(root, "src/config.json", r#"{"defaultLang": "en"}"#);
    write(
        root,
        "src/index.js",
        "import numeral from 'numeral';\nimport config from './config.json';\n\nexport default function luckysheet() {\n  return numeral(config.defaultLang).format();\n}\n",
    );
}

#[tokio::test]
async fn mixed_modules_bundle_into_both_formats() {
    let dir = tempdir().unwrap();
    mixed_project(dir.path());

    let artifacts = OxcBundler::new()
        .bundle(&spec(
            dir.path(),
            vec![OutputFormat::Umd, OutputFormat::Esm],
            SourceMapMode::None,
        ))
        .await
        .unwrap();

    let names: Vec<&str> = artifacts.iter().map(|a| a.file_name.as_str()).collect();
    assert_eq!(names, vec!["luckysheet.umd.js", "luckysheet.esm.js"]);

    let umd = &artifacts[0].code;
    assert!(umd.contains("module.exports = numeral"));
    assert!(umd.contains("defaultLang"));
    assert!(!umd.contains("sourceMappingURL"));

    let esm = &artifacts[1].code;
    assert!(esm.contains("export default"));
}

#[tokio::test]
async fn file_source_maps_point_at_original_modules() {
    let dir = tempdir().unwrap();
    mixed_project(dir.path());

    let artifacts = OxcBundler::new()
        .bundle(&spec(dir.path(), vec![OutputFormat::Umd], SourceMapMode::File))
        .await
        .unwrap();

    let artifact = &artifacts[0];
    assert!(artifact.code.contains("//# sourceMappingURL=luckysheet.umd.js.map"));

    let map: serde_json::Value =
        serde_json::from_str(artifact.source_map.as_ref().unwrap()).unwrap();
    let sources: Vec<&str> = map["sources"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|s| s.as_str())
        .collect();
    assert!(sources.contains(&"src/index.js"));
    assert!(sources.contains(&"node_modules/numeral/numeral.js"));
}

#[tokio::test]
async fn unresolvable_import_carries_the_specifier() {
    let dir = tempdir().unwrap();
    write(dir.path(), "src/index.js", "import flatpickr from 'flatpickr';\nexport default flatpickr;\n");

    let err = OxcBundler::new()
        .bundle(&spec(dir.path(), vec![OutputFormat::Umd], SourceMapMode::Inline))
        .await
        .unwrap_err();

    match err {
        FlowError::Bundle { diagnostic, .. } => assert!(diagnostic.contains("flatpickr")),
        other => panic!("unexpected error: {}", other),
    }
}

fn parse_errors_and_newer_syntax(code: &str) -> (usize, usize) {
    use assetflow::infrastructure::bundler::lowering::verify;
    use oxc_allocator::Allocator;
    use oxc_parser::Parser;
    use oxc_span::SourceType;

    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, code, SourceType::cjs()).parse();
    let newer = verify::newer_syntax(&parsed.program);
    (parsed.errors.len(), newer.len())
}

#[tokio::test]
async fn cyclic_imports_read_live_bindings() {
    let dir = tempdir().unwrap();
    write(
        dir.path(),
        "src/index.js",
        "import { count, bump } from './counter.js';\nexport const name = 'index';\nexport function read() {\n  bump();\n  return count;\n}\n",
    );
    write(
        dir.path(),
        "src/counter.js",
        "import { name } from './index.js';\nexport let count = 0;\nexport function bump() {\n  count += 1;\n}\nexport function label() {\n  return name + count;\n}\n",
    );

    let artifacts = OxcBundler::new()
        .bundle(&spec(dir.path(), vec![OutputFormat::Umd], SourceMapMode::None))
        .await
        .unwrap();
    let code = &artifacts[0].code;

    assert!(code.contains(r#"return __import0["count"];"#), "{}", code);
    assert!(code.contains(r#"return __import0["name"] + count;"#), "{}", code);
    assert!(code.contains(r#""count": function () { return count; }"#), "{}", code);

    let exported = code.find("__export(exports, {").unwrap();
    let required = code.find("require(\"./").unwrap();
    assert!(exported < required, "{}", code);
    assert_eq!(parse_errors_and_newer_syntax(code).0, 0, "{}", code);
}

fn modern_project(root: &Path) {
    write(
        root,
        "src/shapes.js",
        "export class Shape {\n  constructor(name) { this.name = name; }\n  describe() { return `${this.name} with ${this.sides()} sides`; }\n}\nexport class Square extends Shape {\n  size = 1;\n  static count = 0;\n  constructor(size) { super('square'); this.size = size; Square.count++; }\n  sides() { return 4; }\n  get area() { return this.size ** 2; }\n}\n",
    );
    write(
        root,
        "src/index.js",
        "import { Square } from './shapes.js';\n\nexport function render(sizes, ...extra) {\n  const out = [];\n  for (const size of [...sizes, ...extra]) {\n    let shape = new Square(size);\n    const { name, area } = shape;\n    out.push(() => `${name}: ${area}`);\n  }\n  return out.map((fn, i = 0) => fn() + i);\n}\n",
    );
}

fn es5_spec(root: &Path, minify: bool) -> BundleSpec {
    BundleSpec {
        minify,
        targets: vec!["chrome58".to_string(), "ie11".to_string()],
        ..spec(root, vec![OutputFormat::Umd], SourceMapMode::None)
    }
}

fn assert_es5_bundle(code: &str) {
    for token in ["=>", "class ", "`", "let ", "const ", "..."] {
        assert!(!code.contains(token), "found {:?} in:\n{}", token, code);
    }
    assert_eq!(parse_errors_and_newer_syntax(code), (0, 0), "{}", code);
}

#[tokio::test]
async fn old_targets_get_es5_in_development() {
    let dir = tempdir().unwrap();
    modern_project(dir.path());

    let artifacts = OxcBundler::new().bundle(&es5_spec(dir.path(), false)).await.unwrap();
    let code = &artifacts[0].code;

    assert_es5_bundle(code);
    assert!(code.contains("var babelHelpers"));
    assert!(code.contains("babelHelpers.inherits(Square, _super)"));
    assert!(code.contains("Math.pow("));
}

#[tokio::test]
async fn old_targets_get_es5_in_production() {
    let dir = tempdir().unwrap();
    modern_project(dir.path());

    let artifacts = OxcBundler::new().bundle(&es5_spec(dir.path(), true)).await.unwrap();
    assert_es5_bundle(&artifacts[0].code);
}

#[tokio::test]
async fn es5_source_maps_keep_module_lines() {
    let dir = tempdir().unwrap();
    modern_project(dir.path());

    let artifacts = OxcBundler::new()
        .bundle(&BundleSpec {
            source_map: SourceMapMode::File,
            ..es5_spec(dir.path(), false)
        })
        .await
        .unwrap();

    let map: serde_json::Value =
        serde_json::from_str(artifacts[0].source_map.as_ref().unwrap()).unwrap();
    let sources: Vec<&str> = map["sources"].as_array().unwrap().iter().filter_map(|s| s.as_str()).collect();
    assert!(sources.contains(&"src/index.js"));
    assert!(sources.contains(&"src/shapes.js"));
}

#[tokio::test]
async fn unmeetable_targets_are_config_errors() {
    let dir = tempdir().unwrap();
    modern_project(dir.path());

    let unknown = OxcBundler::new()
        .bundle(&BundleSpec {
            targets: vec!["netscape4".to_string()],
            ..spec(dir.path(), vec![OutputFormat::Umd], SourceMapMode::None)
        })
        .await
        .unwrap_err();
    assert!(matches!(unknown, FlowError::Config(_)), "{}", unknown);

    write(dir.path(), "src/index.js", "export class Vault {\n  #secret = 1;\n}\n");
    let private = OxcBundler::new().bundle(&es5_spec(dir.path(), false)).await.unwrap_err();
    match private {
        FlowError::Config(message) => assert!(message.contains("src/index.js:2"), "{}", message),
        other => panic!("unexpected error: {}", other),
    }
}
