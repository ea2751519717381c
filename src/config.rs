// src/config.rs

//! Run configuration
//!
//! Every policy decision is made from these values, which the CLI collects
//! once and passes down explicitly.

use clap::ValueEnum;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default delay between attempts of a failed destination operation
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Default abort window before the destination is wiped
pub const DEFAULT_WIPE_DELAY: Duration = Duration::from_secs(10);

/// Default file name of the package index
pub const DEFAULT_INDEX_FILE: &str = "package-index.xml";

/// What to do with an existing package index
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IndexPolicy {
    /// Discard the existing index; everything is new
    Overwrite,
    /// Add the new packages to the existing ones without comparing them
    Append,
    /// Reconcile against the existing index; vanished packages are removed
    Update,
    /// Reconcile, but keep vanished packages in the index untouched
    UpdateKeepOldPackages,
}

impl IndexPolicy {
    pub fn as_str(&self) -> &str {
        match self {
            IndexPolicy::Overwrite => "overwrite",
            IndexPolicy::Append => "append",
            IndexPolicy::Update => "update",
            IndexPolicy::UpdateKeepOldPackages => "update-keep-old-packages",
        }
    }
}

impl fmt::Display for IndexPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the destination is brought up to date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DeployPolicy {
    /// Delete the destination and deploy everything
    Wipe,
    /// Only touch what the reconciled index says changed
    #[default]
    Update,
}

impl DeployPolicy {
    pub fn as_str(&self) -> &str {
        match self {
            DeployPolicy::Wipe => "wipe",
            DeployPolicy::Update => "update",
        }
    }
}

impl fmt::Display for DeployPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployConfig {
    /// Distribution folder the packages are published to
    pub destination: PathBuf,
    pub policy: DeployPolicy,
    /// Fixed delay between retries of a failed copy, move or delete
    pub retry_delay: Duration,
    /// Pause before a wipe, giving an operator time to abort
    pub wipe_delay: Duration,
}

impl DeployConfig {
    pub fn new(destination: PathBuf, policy: DeployPolicy) -> Self {
        Self {
            destination,
            policy,
            retry_delay: DEFAULT_RETRY_DELAY,
            wipe_delay: DEFAULT_WIPE_DELAY,
        }
    }
}

/// Settings of one publishing run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishConfig {
    /// Directories scanned for declarations
    pub roots: Vec<PathBuf>,
    /// Package index file read and written by the run
    pub index_path: PathBuf,
    pub index_policy: IndexPolicy,
    /// Deployment, if any
    pub deploy: Option<DeployConfig>,
}

impl PublishConfig {
    pub fn new(roots: Vec<PathBuf>, index_policy: IndexPolicy) -> Self {
        Self {
            roots,
            index_path: PathBuf::from(DEFAULT_INDEX_FILE),
            index_policy,
            deploy: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_names_match_cli_values() {
        for policy in IndexPolicy::value_variants() {
            let value = policy.to_possible_value().unwrap();
            assert_eq!(value.get_name(), policy.as_str());
        }
        for policy in DeployPolicy::value_variants() {
            let value = policy.to_possible_value().unwrap();
            assert_eq!(value.get_name(), policy.as_str());
        }
    }

    #[test]
    fn test_defaults() {
        let config = PublishConfig::new(vec![PathBuf::from("src")], IndexPolicy::Update);
        assert_eq!(config.index_path, PathBuf::from("package-index.xml"));
        assert!(config.deploy.is_none());

        let deploy = DeployConfig::new(PathBuf::from("out"), DeployPolicy::default());
        assert_eq!(deploy.policy, DeployPolicy::Update);
        assert_eq!(deploy.retry_delay, DEFAULT_RETRY_DELAY);
        assert_eq!(deploy.wipe_delay, Duration::from_secs(10));
    }
}
