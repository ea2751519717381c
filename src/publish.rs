// src/publish.rs

//! End-to-end publishing run
//!
//! Build the new generation from the declarations, merge it with the
//! persisted one, persist the result and optionally deploy it. Nothing is
//! persisted when building fails.

use crate::builder::build_index;
use crate::config::{IndexPolicy, PublishConfig};
use crate::deploy::{self, DeployReport};
use crate::error::{Result, io_err};
use crate::index::{PackageIndex, xml};
use crate::reconcile::merge;
use std::fs;
use tracing::info;

/// Outcome of a publishing run
#[derive(Debug)]
pub struct PublishSummary {
    /// Merged, state-tagged index (removed nodes included)
    pub index: PackageIndex,
    /// Deployment actions, when a destination was configured
    pub deployment: Option<DeployReport>,
}

/// Run one publishing pass as described by `config`
pub fn publish(config: &PublishConfig) -> Result<PublishSummary> {
    let built = build_index(&config.roots)?;
    info!("Built {} package(s)", built.len());

    let previous = if config.index_policy == IndexPolicy::Overwrite {
        if config.index_path.exists() {
            info!("Discarding package index {}", config.index_path.display());
            fs::remove_file(&config.index_path).map_err(|e| io_err(&config.index_path, e))?;
        }
        None
    } else {
        xml::load(&config.index_path)?
    };

    let mut index = merge(built, previous, config.index_policy);
    index.sort();
    xml::save(&index, &config.index_path)?;

    let deployment = match &config.deploy {
        Some(deploy_config) => Some(deploy::deploy(&index, &config.index_path, deploy_config)?),
        None => None,
    };

    Ok(PublishSummary { index, deployment })
}
