// src/main.rs

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use pkgdeploy::config::{DeployConfig, DeployPolicy, IndexPolicy, PublishConfig};
use pkgdeploy::index::State;
use pkgdeploy::publish::publish;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "pkgdeploy")]
#[command(author, version, about = "Build, reconcile and deploy package indexes", long_about = None)]
struct Cli {
    /// Directories scanned for package definitions
    #[arg(required_unless_present = "completions")]
    roots: Vec<PathBuf>,

    /// Package index file to read and write
    #[arg(long, value_name = "PATH", default_value = pkgdeploy::config::DEFAULT_INDEX_FILE)]
    package_index: PathBuf,

    /// What to do with an existing package index
    #[arg(long, value_enum, required_unless_present = "completions")]
    package_index_policy: Option<IndexPolicy>,

    /// Distribution folder to deploy to
    #[arg(long, value_name = "PATH")]
    deploy: Option<PathBuf>,

    /// How the distribution folder is brought up to date
    #[arg(long, value_enum, default_value_t = DeployPolicy::Update)]
    deploy_policy: DeployPolicy,

    /// Delay between retries of a failed copy, move or delete
    #[arg(long, value_name = "MS", default_value_t = 1000)]
    retry_delay_ms: u64,

    /// Seconds to wait before wiping the distribution folder
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    wipe_delay_secs: u64,

    /// Log per-file detail
    #[arg(short, long)]
    verbose: bool,

    /// Print a shell completion script and exit
    #[arg(long, value_name = "SHELL", value_enum)]
    completions: Option<Shell>,
}

impl Cli {
    /// Run configuration, or `None` when only completions were asked for
    fn publish_config(&self) -> Option<PublishConfig> {
        let policy = self.package_index_policy?;

        let mut config = PublishConfig::new(self.roots.clone(), policy);
        config.index_path = self.package_index.clone();
        config.deploy = self.deploy.as_ref().map(|destination| DeployConfig {
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            wipe_delay: Duration::from_secs(self.wipe_delay_secs),
            ..DeployConfig::new(destination.clone(), self.deploy_policy)
        });
        Some(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        clap_complete::generate(shell, &mut Cli::command(), "pkgdeploy", &mut std::io::stdout());
        return Ok(());
    }

    // Initialize tracing subscriber for logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let config = cli
        .publish_config()
        .context("--package-index-policy is required")?;

    let summary = publish(&config)?;

    let index = &summary.index;
    info!(
        "Published {} package(s): {} added, {} modified, {} removed",
        index.len(),
        index.count_by_state(State::Added),
        index.count_by_state(State::Modified),
        index.count_by_state(State::Removed),
    );
    if let Some(report) = &summary.deployment {
        info!("Deployment finished: {} action(s)", report.actions.len());
    }

    Ok(())
}
