use crate::core::models::BuildMode;
use crate::core::services::Orchestrator;
use crate::infrastructure::{LightningCssProcessor, OxcBundler, OxcMinifier, TokioFileSystemService};
use crate::utils::{BuildSummary, CliOverrides, ConfigLoader, Logger, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "assetflow")]
#[command(about = "assetflow - build, watch and serve front-end assets")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build once into the output directory (NODE_ENV=production minifies)
    Build {
        /// Project root directory
        #[arg(short, long, default_value = ".")]
        root: String,
        /// Output directory, overrides the config file
        #[arg(short, long)]
        outdir: Option<String>,
    },
    /// Build, then watch sources and serve the output with live reload
    Dev {
        /// Project root directory
        #[arg(short, long, default_value = ".")]
        root: String,
        /// Output directory, overrides the config file
        #[arg(short, long)]
        outdir: Option<String>,
        /// Host to bind, overrides the config file
        #[arg(long)]
        host: Option<String>,
        /// Port to serve on, overrides the config file
        #[arg(short, long)]
        port: Option<u16>,
    },
}

pub struct CliHandler;

impl CliHandler {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(&self) -> Result<()> {
        // Initialize logging
        Logger::init();

        let cli = Cli::parse();
        let mode = BuildMode::from_env();

        match cli.command {
            Commands::Build { root, outdir } => {
                let overrides = CliOverrides {
                    outdir,
                    ..Default::default()
                };
                self.handle_build_command(&root, mode, &overrides).await
            }
            Commands::Dev {
                root,
                outdir,
                host,
                port,
            } => {
                let overrides = CliOverrides { outdir, host, port };
                self.handle_dev_command(&root, mode, &overrides).await
            }
        }
    }

    fn orchestrator(&self, root: &str, mode: BuildMode, overrides: &CliOverrides) -> Result<Orchestrator> {
        let config = ConfigLoader::resolve(PathBuf::from(root), mode, overrides)?;

        Orchestrator::new(
            config,
            Arc::new(TokioFileSystemService),
            Arc::new(LightningCssProcessor::new()),
            Arc::new(OxcMinifier::new()),
            Arc::new(OxcBundler::new()),
        )
    }

    async fn handle_build_command(&self, root: &str, mode: BuildMode, overrides: &CliOverrides) -> Result<()> {
        let summary = BuildSummary::new();
        summary.show_banner("build", mode);

        let orchestrator = self.orchestrator(root, mode, overrides)?;
        let files = orchestrator.build().await?;

        summary.show_completion(&orchestrator.config().outdir, &files);
        Ok(())
    }

    async fn handle_dev_command(&self, root: &str, mode: BuildMode, overrides: &CliOverrides) -> Result<()> {
        let orchestrator = self.orchestrator(root, mode, overrides)?;

        orchestrator
            .dev(async {
                // Without a signal handler the session runs until killed.
                if tokio::signal::ctrl_c().await.is_err() {
                    std::future::pending::<()>().await;
                }
                Logger::info("👋 Shutting down");
            })
            .await
    }
}

impl Default for CliHandler {
    fn default() -> Self {
        Self::new()
    }
}
