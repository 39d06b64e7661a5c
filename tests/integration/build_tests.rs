use crate::common::*;
use assetflow::core::models::{BuildMode, PipelineState};
use assetflow::FlowError;
use tempfile::tempdir;

#[tokio::test]
async fn development_build_writes_the_output_layout() {
    let dir = tempdir().unwrap();
    sample_project(dir.path());

    let orchestrator = orchestrator(build_config(dir.path(), BuildMode::Development));
    let files = orchestrator.build().await.unwrap();
    let dist = dir.path().join("dist");

    for expected in [
        "index.html",
        "assets/img/logo.svg",
        "assets/styles/index.css",
        "assets/plugins/index.css",
        "demoData/sheet.js",
        "plugins/index.js",
        "luckysheet.umd.js",
    ] {
        assert!(dist.join(expected).is_file(), "missing {}", expected);
    }
    assert!(!dist.join("luckysheet.esm.js").exists());
    assert!(!dist.join("assets/styles/a.css").exists());
    assert_eq!(files.len(), 7);

    assert_eq!(
        read(&dist, "assets/styles/index.css"),
        "a{color:red}\nb {\n  color: blue;\n}"
    );

    let bundle = read(&dist, "luckysheet.umd.js");
    assert!(bundle.contains("luckysheet"));
    assert!(bundle.contains("//# sourceMappingURL=data:application/json;charset=utf-8;base64,"));

    assert_eq!(orchestrator.state(), PipelineState::Ready);
    assert_eq!(
        orchestrator.history(),
        vec![
            PipelineState::Idle,
            PipelineState::Cleaning,
            PipelineState::Building,
            PipelineState::Ready,
        ]
    );
}

#[tokio::test]
async fn production_build_minifies_and_adds_esm() {
    let dir = tempdir().unwrap();
    sample_project(dir.path());

    orchestrator(build_config(dir.path(), BuildMode::Production))
        .build()
        .await
        .unwrap();
    let dist = dir.path().join("dist");

    let css = read(&dist, "assets/styles/index.css");
    assert!(css.contains("a{color:red}"));
    assert!(css.contains("b{color:"));
    assert!(!css.contains('\n'));

    let plugins = read(&dist, "plugins/index.js");
    assert!(!plugins.contains("console"));

    assert!(dist.join("luckysheet.umd.js").is_file());
    let esm = read(&dist, "luckysheet.esm.js");
    assert!(esm.contains("export"));
}

#[tokio::test]
async fn plugin_scripts_keep_declared_order() {
    let dir = tempdir().unwrap();
    sample_project(dir.path());

    orchestrator(build_config(dir.path(), BuildMode::Development))
        .build()
        .await
        .unwrap();

    let plugins = read(&dir.path().join("dist"), "plugins/index.js");
    let a = plugins.find("['a']").unwrap();
    let b = plugins.find("push('b')").unwrap();
    let c = plugins.find("push('c')").unwrap();
    assert!(a < b && b < c);
}

#[tokio::test]
async fn clean_removes_stale_artifacts() {
    let dir = tempdir().unwrap();
    sample_project(dir.path());
    write(dir.path(), "dist/assets/removed.png", "old");

    orchestrator(build_config(dir.path(), BuildMode::Development))
        .build()
        .await
        .unwrap();

    assert!(!dir.path().join("dist/assets/removed.png").exists());
}

#[tokio::test]
async fn broken_entry_fails_without_a_core_bundle() {
    let dir = tempdir().unwrap();
    sample_project(dir.path());
    write(dir.path(), "src/index.js", "export function create( {\n  return 1;\n}\n");

    let orchestrator = orchestrator(build_config(dir.path(), BuildMode::Development));
    let err = orchestrator.build().await.unwrap_err();

    assert!(matches!(err, FlowError::Bundle { .. }), "unexpected error: {}", err);
    assert!(!dir.path().join("dist/luckysheet.umd.js").exists());
    assert_eq!(orchestrator.state(), PipelineState::Terminated { success: false });
}

#[tokio::test]
async fn missing_plugin_source_is_a_transform_error() {
    let dir = tempdir().unwrap();
    sample_project(dir.path());
    std::fs::remove_file(dir.path().join("src/plugins/b.js")).unwrap();

    let err = orchestrator(build_config(dir.path(), BuildMode::Development))
        .build()
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::TransformIo { .. }));
}

#[tokio::test]
async fn repeated_builds_are_identical() {
    let dir = tempdir().unwrap();
    sample_project(dir.path());

    orchestrator(build_config(dir.path(), BuildMode::Production))
        .build()
        .await
        .unwrap();
    let first = snapshot(&dir.path().join("dist"));

    orchestrator(build_config(dir.path(), BuildMode::Production))
        .build()
        .await
        .unwrap();
    let second = snapshot(&dir.path().join("dist"));

    assert_eq!(first, second);
}

#[tokio::test]
async fn watch_reaction_rebuilds_only_its_artifact() {
    let dir = tempdir().unwrap();
    sample_project(dir.path());

    let orchestrator = orchestrator(build_config(dir.path(), BuildMode::Development));
    orchestrator.build().await.unwrap();
    let dist = dir.path().join("dist");
    let bundle_before = read(&dist, "luckysheet.umd.js");

    write(dir.path(), "src/assets/styles/b.css", "b{color:green}");
    write(dir.path(), "src/utils/math.js", "export const add = (a, b) => a - b;\n");
    orchestrator.reaction_for("mainStyle").unwrap().run().await.unwrap();

    assert_eq!(read(&dist, "assets/styles/index.css"), "a{color:red}\nb{color:green}");
    assert_eq!(read(&dist, "luckysheet.umd.js"), bundle_before);
}
