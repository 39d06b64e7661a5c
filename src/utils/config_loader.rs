use crate::core::models::{
    BuildConfig, BuildMode, BundleSettings, PathSet, PolyfillMode, ProxyRule, SourceMapMode,
    TaskPlan,
};
use crate::utils::{FlowError, Logger, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "assetflow.config.json";

/// Configuration file format (assetflow.config.json). Every field is
/// optional; missing ones take the defaults of the reference project layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectConfig {
    pub path_sets: Vec<PathSet>,
    pub tasks: TaskPlan,
    pub bundle: BundleSettings,
    /// Output directory, relative to the project root unless absolute.
    pub outdir: String,
    pub server: ServerConfig,
    pub watch: WatchConfig,
    pub proxy: Vec<ProxyRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatchConfig {
    pub debounce_ms: u64,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            path_sets: default_path_sets(),
            tasks: TaskPlan::default(),
            bundle: BundleSettings::default(),
            outdir: "dist".to_string(),
            server: ServerConfig::default(),
            watch: WatchConfig::default(),
            proxy: vec![ProxyRule {
                match_prefix: "/luckysheet/".to_string(),
                target_origin: "http://luckysheet.lashuju.com/".to_string(),
                rewrite_origin: true,
                forward_web_socket: true,
            }],
            task_timeout_ms: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3000,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 500 }
    }
}

impl Default for TaskPlan {
    fn default() -> Self {
        Self {
            copy: vec![
                "staticHtml".to_string(),
                "staticAssets".to_string(),
                "staticDemoData".to_string(),
            ],
            styles: vec!["mainStyle".to_string(), "pluginsStyle".to_string()],
            scripts: vec!["pluginsJs".to_string()],
            core: "core".to_string(),
        }
    }
}

impl Default for BundleSettings {
    fn default() -> Self {
        Self {
            entry: PathBuf::from("src/index.js"),
            name: "luckysheet".to_string(),
            targets: vec!["chrome58".to_string(), "ie11".to_string()],
            polyfills: PolyfillMode::Usage,
            source_map: SourceMapMode::Inline,
        }
    }
}

/// Destinations are relative to the output directory.
fn default_path_sets() -> Vec<PathSet> {
    vec![
        PathSet::new("staticHtml", ["src/*.html"], ""),
        PathSet::new(
            "staticAssets",
            ["src/assets/**", "!src/assets/**/*.css"],
            "assets",
        ),
        PathSet::new("staticDemoData", ["src/demoData/*.js"], "demoData"),
        PathSet::new(
            "core",
            ["src/**/*.js", "!src/demoData/*.js", "!src/plugins/js/*.js"],
            "",
        ),
        PathSet::new(
            "mainStyle",
            [
                "src/assets/styles/*.css",
                "node_modules/flatpickr/dist/themes/light.css",
            ],
            "assets/styles",
        ),
        PathSet::new("pluginsStyle", ["src/assets/plugins/*.css"], "assets/plugins"),
        PathSet::new(
            "pluginsJs",
            [
                "node_modules/jquery/dist/jquery.min.js",
                "src/plugins/spectrum.min.js",
                "src/plugins/jquery-ui.min.js",
                "src/plugins/jquery.mousewheel.min.js",
                "src/plugins/jstat.min.js",
                "src/plugins/jquery.sPage.min.js",
                "src/plugins/crypto-api.min.js",
            ],
            "plugins",
        ),
    ]
}

/// Values given on the command line. They win over the config file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub outdir: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Config loader that supports config files with CLI override
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file if it exists
    /// Searches for assetflow.config.json in the project root
    pub fn load_from_file(root: &Path) -> Result<Option<ProjectConfig>> {
        let config_path = root.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            Logger::debug(&format!("No {} found, using defaults", CONFIG_FILE_NAME));
            return Ok(None);
        }

        Logger::debug(&format!("Loading config from {}", config_path.display()));

        let content = std::fs::read_to_string(&config_path).map_err(FlowError::Io)?;

        let config: ProjectConfig = serde_json::from_str(&content).map_err(|e| {
            FlowError::config(format!("Failed to parse {}: {}", CONFIG_FILE_NAME, e))
        })?;

        Logger::debug("✅ Config file loaded successfully");
        Ok(Some(config))
    }

    /// Merge file config with CLI arguments (CLI takes precedence)
    pub fn merge_with_cli(
        file_config: Option<ProjectConfig>,
        root: PathBuf,
        mode: BuildMode,
        overrides: &CliOverrides,
    ) -> BuildConfig {
        let base = file_config.unwrap_or_default();

        // CLI > config file > default
        let outdir_str = overrides.outdir.as_deref().unwrap_or(&base.outdir);
        let outdir = if Path::new(outdir_str).is_absolute() {
            PathBuf::from(outdir_str)
        } else {
            root.join(outdir_str)
        };

        BuildConfig {
            root,
            outdir,
            mode,
            path_sets: base.path_sets,
            plan: base.tasks,
            bundle: base.bundle,
            host: overrides.host.clone().unwrap_or(base.server.host),
            port: overrides.port.unwrap_or(base.server.port),
            debounce: Duration::from_millis(base.watch.debounce_ms),
            proxy: base.proxy,
            task_timeout: base.task_timeout_ms.map(Duration::from_millis),
        }
    }

    /// Load the project config and apply the CLI overrides in one step.
    pub fn resolve(root: PathBuf, mode: BuildMode, overrides: &CliOverrides) -> Result<BuildConfig> {
        let file_config = Self::load_from_file(&root)?;
        Ok(Self::merge_with_cli(file_config, root, mode, overrides))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_file_not_exists() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = ConfigLoader::load_from_file(temp_dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            temp_dir.path().join(CONFIG_FILE_NAME),
            r#"{"outdir": "build", "bundle": {"name": "sheet"}, "taskTimeoutMs": 30000}"#,
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(temp_dir.path()).unwrap().unwrap();
        assert_eq!(config.outdir, "build");
        assert_eq!(config.bundle.name, "sheet");
        assert_eq!(config.bundle.entry, PathBuf::from("src/index.js"));
        assert_eq!(config.task_timeout_ms, Some(30000));
        assert_eq!(config.path_sets.len(), 7);
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_invalid_file_is_a_config_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(temp_dir.path().join(CONFIG_FILE_NAME), "{ not json").unwrap();
        let err = ConfigLoader::load_from_file(temp_dir.path()).unwrap_err();
        assert!(matches!(err, FlowError::Config(_)));
    }

    #[test]
    fn test_merge_with_cli_override() {
        let file_config = ProjectConfig {
            outdir: "build".to_string(),
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            ..Default::default()
        };

        let merged = ConfigLoader::merge_with_cli(
            Some(file_config),
            PathBuf::from("/project"),
            BuildMode::Production,
            &CliOverrides {
                outdir: Some("out".to_string()),
                host: None,
                port: Some(9000),
            },
        );

        assert_eq!(merged.outdir, PathBuf::from("/project/out"));
        assert_eq!(merged.host, "0.0.0.0");
        assert_eq!(merged.port, 9000);
        assert_eq!(merged.mode, BuildMode::Production);
        assert_eq!(merged.debounce, Duration::from_millis(500));
        assert!(merged.task_timeout.is_none());
    }

    #[test]
    fn test_defaults_reproduce_reference_layout() {
        let merged = ConfigLoader::merge_with_cli(
            None,
            PathBuf::from("/project"),
            BuildMode::Development,
            &CliOverrides::default(),
        );

        assert_eq!(merged.outdir, PathBuf::from("/project/dist"));
        let plugins = merged.path_sets.iter().find(|s| s.name == "pluginsJs").unwrap();
        assert_eq!(plugins.source_patterns[0], "node_modules/jquery/dist/jquery.min.js");
        assert_eq!(plugins.source_patterns.len(), 7);
        assert_eq!(merged.proxy[0].match_prefix, "/luckysheet/");
        assert!(merged.proxy[0].forward_web_socket);
        assert_eq!(merged.plan.referenced().count(), 7);
    }
}
