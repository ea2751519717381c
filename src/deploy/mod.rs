// src/deploy/mod.rs

//! Deployment to the distribution folder
//!
//! Walks a reconciled index and performs the filesystem work its states
//! call for:
//! - `wipe`: the destination is deleted and every live package redeployed;
//!   folders of packages that were retained but not rebuilt are kept
//! - `update`: unchanged nodes are skipped; within a package every deletion
//!   runs before any copy, then added or modified components are rebuilt
//!
//! Destination layout:
//! - `<dest>/<package id>/<component>.zip` for compressed components
//! - `<dest>/<package id>/<file path>` for raw components
//! - `<dest>/<index file name>`, deployed last
//!
//! Every copy, move and delete against the destination is retried until it
//! succeeds; see [`retry`].

pub mod archive;
pub mod retry;

use crate::config::{DeployConfig, DeployPolicy};
use crate::error::{Result, io_err};
use crate::index::{Component, File, Package, PackageIndex, State};
use archive::{ArchiveFormat, archive_name, is_raw};
use retry::retry_forever;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// A filesystem action performed against the destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployAction {
    /// The destination folder was deleted
    Wiped { path: PathBuf },
    /// A component archive was built and moved into place
    Archived { package: String, component: String, path: PathBuf },
    /// A raw file was copied
    Copied { source: PathBuf, target: PathBuf },
    /// A deployed file was deleted
    RemovedFile { path: PathBuf },
    /// A deployed package folder was deleted
    RemovedTree { path: PathBuf },
    /// The package index was copied to the destination root
    IndexDeployed { path: PathBuf },
}

impl DeployAction {
    /// Destination path the action wrote or deleted
    pub fn target(&self) -> &Path {
        match self {
            DeployAction::Wiped { path }
            | DeployAction::Archived { path, .. }
            | DeployAction::RemovedFile { path }
            | DeployAction::RemovedTree { path }
            | DeployAction::IndexDeployed { path } => path,
            DeployAction::Copied { target, .. } => target,
        }
    }
}

/// Everything a deployment did, in order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployReport {
    pub actions: Vec<DeployAction>,
}

impl DeployReport {
    /// Actions whose target lies at or below `path`
    pub fn actions_under<'a>(&'a self, path: &'a Path) -> impl Iterator<Item = &'a DeployAction> {
        self.actions.iter().filter(move |a| a.target().starts_with(path))
    }
}

/// Deploy a reconciled index and then the index file itself
pub fn deploy(index: &PackageIndex, index_file: &Path, config: &DeployConfig) -> Result<DeployReport> {
    let mut deployer = Deployer::new(config);
    deployer.run(index, index_file)?;
    Ok(deployer.report)
}

/// Executes one deployment run
pub struct Deployer<'a> {
    config: &'a DeployConfig,
    report: DeployReport,
    /// Scratch space for archives, created on first use
    staging: Option<TempDir>,
}

impl<'a> Deployer<'a> {
    pub fn new(config: &'a DeployConfig) -> Self {
        Self {
            config,
            report: DeployReport::default(),
            staging: None,
        }
    }

    pub fn run(&mut self, index: &PackageIndex, index_file: &Path) -> Result<()> {
        let config = self.config;
        let destination = &config.destination;
        info!(
            "Deploying to {} (policy: {})",
            destination.display(),
            config.policy
        );

        if config.policy == DeployPolicy::Wipe {
            self.wipe(index)?;
        }
        fs::create_dir_all(destination).map_err(|e| io_err(destination, e))?;

        for package in &index.packages {
            match config.policy {
                DeployPolicy::Wipe => self.deploy_all(package)?,
                DeployPolicy::Update => self.deploy_changes(package)?,
            }
        }

        self.deploy_index(index_file)
    }

    /// Delete the destination, except folders of packages that cannot be redeployed
    fn wipe(&mut self, index: &PackageIndex) -> Result<()> {
        let destination = self.config.destination.clone();
        if !destination.exists() {
            return Ok(());
        }

        let kept: Vec<PathBuf> = index
            .packages
            .iter()
            .filter(|p| p.state != State::Removed && p.source_path.is_none())
            .map(|p| self.package_dir(p))
            .collect();

        warn!(
            "Wiping destination folder {} in {} seconds...",
            destination.display(),
            self.config.wipe_delay.as_secs()
        );
        std::thread::sleep(self.config.wipe_delay);

        if kept.is_empty() {
            self.retry("wipe", || remove_tree(&destination));
        } else {
            for path in &kept {
                info!("Keeping {} (package not rebuilt in this run)", path.display());
            }
            let entries = fs::read_dir(&destination).map_err(|e| io_err(&destination, e))?;
            for entry in entries {
                let path = entry.map_err(|e| io_err(&destination, e))?.path();
                if !kept.contains(&path) {
                    self.retry("wipe", || remove_path(&path));
                }
            }
        }

        self.report.actions.push(DeployAction::Wiped { path: destination });
        Ok(())
    }

    /// `wipe` policy: deploy every live component, ignoring states
    fn deploy_all(&mut self, package: &Package) -> Result<()> {
        if package.state == State::Removed {
            return Ok(());
        }
        let Some(source_dir) = package.source_path.as_deref() else {
            info!(
                "Package {} was not rebuilt in this run, keeping its deployed files",
                package.id
            );
            return Ok(());
        };

        info!("Deploying package {}", package.id);
        for component in package.components.iter().filter(|c| c.state != State::Removed) {
            self.deploy_component(package, component, source_dir)?;
        }
        Ok(())
    }

    /// `update` policy: act on states only
    fn deploy_changes(&mut self, package: &Package) -> Result<()> {
        match package.state {
            State::Unchanged => {
                debug!("Package {} unchanged, skipped", package.id);
                return Ok(());
            }
            State::Removed => {
                info!("Removing package {}", package.id);
                let path = self.package_dir(package);
                self.retry("remove package folder", || remove_tree(&path));
                self.report.actions.push(DeployAction::RemovedTree { path });
                return Ok(());
            }
            _ => {}
        }

        let Some(source_dir) = package.source_path.as_deref() else {
            warn!(
                "Package {} is {} but has no source folder, skipped",
                package.id, package.state
            );
            return Ok(());
        };

        info!("Updating package {} ({})", package.id, package.state);

        // Deletions first: a path that moved to another component must survive.
        let live = live_raw_paths(package);
        for component in &package.components {
            match component.state {
                State::Removed => {
                    info!("  removing component {}", component.name);
                    self.remove_artifact(package, component, &component.compression, &live, |_| true)?;
                }
                State::ModifiedCompression => {
                    let previous = component.previous_compression.as_deref().unwrap_or_default();
                    info!(
                        "  component {} compression changed from '{}' to '{}'",
                        component.name, previous, component.compression
                    );
                    self.remove_artifact(package, component, previous, &live, |f| {
                        f.state != State::Added
                    })?;
                }
                State::Modified if is_raw(&component.compression) => {
                    self.remove_artifact(package, component, &component.compression, &live, |f| {
                        f.state == State::Removed
                    })?;
                }
                _ => {}
            }
        }

        for component in &package.components {
            match component.state {
                State::Unchanged => {
                    debug!("  component {} unchanged, skipped", component.name);
                }
                State::Removed => {}
                State::Added | State::Modified | State::ModifiedCompression => {
                    self.deploy_component(package, component, source_dir)?;
                }
            }
        }
        Ok(())
    }

    /// Publish a component: archive it, or copy its files when raw
    fn deploy_component(&mut self, package: &Package, component: &Component, source_dir: &Path) -> Result<()> {
        match ArchiveFormat::from_compression(&component.name, &component.compression)? {
            Some(format) => self.deploy_archive(package, component, format, source_dir),
            None => {
                self.deploy_raw(package, component, source_dir);
                Ok(())
            }
        }
    }

    fn deploy_archive(
        &mut self,
        package: &Package,
        component: &Component,
        format: ArchiveFormat,
        source_dir: &Path,
    ) -> Result<()> {
        info!(
            "  compressing {} to .zip archive, using method '{}'...",
            component.name,
            format.as_str()
        );

        let name = archive_name(&component.name);
        let staged_dir = self.staging_dir()?.join(&package.id);
        fs::create_dir_all(&staged_dir).map_err(|e| io_err(&staged_dir, e))?;
        let staged = staged_dir.join(&name);

        let paths: Vec<&str> = component.current_files().map(|f| f.path.as_str()).collect();
        format.build(source_dir, &paths, &staged)?;

        let target = self.package_dir(package).join(&name);
        self.retry("move archive", || move_file(&staged, &target));
        self.report.actions.push(DeployAction::Archived {
            package: package.id.clone(),
            component: component.name.clone(),
            path: target,
        });
        Ok(())
    }

    fn deploy_raw(&mut self, package: &Package, component: &Component, source_dir: &Path) {
        let package_dir = self.package_dir(package);

        for file in component.current_files() {
            let target = package_dir.join(&file.path);
            let source = source_dir.join(&file.path);
            debug!("  copying {} to {}", source.display(), target.display());
            self.retry("copy file", || copy_file(&source, &target));
            self.report.actions.push(DeployAction::Copied { source, target });
        }
    }

    /// Delete what a component published under `compression`
    ///
    /// For raw components only the files selected by `deployed` are deleted,
    /// and never a path in `live`.
    fn remove_artifact(
        &mut self,
        package: &Package,
        component: &Component,
        compression: &str,
        live: &HashSet<&str>,
        deployed: impl Fn(&File) -> bool,
    ) -> Result<()> {
        let package_dir = self.package_dir(package);

        let targets: Vec<PathBuf> = match ArchiveFormat::from_compression(&component.name, compression)? {
            Some(_) => vec![package_dir.join(archive_name(&component.name))],
            None => component
                .files
                .iter()
                .filter(|&f| deployed(f))
                .filter(|f| {
                    let shared = live.contains(f.path.as_str());
                    if shared {
                        debug!("  {} still published by another component, kept", f.path);
                    }
                    !shared
                })
                .map(|f| package_dir.join(&f.path))
                .collect(),
        };

        for path in targets {
            self.retry("remove file", || remove_file(&path));
            self.report.actions.push(DeployAction::RemovedFile { path });
        }
        Ok(())
    }

    fn deploy_index(&mut self, index_file: &Path) -> Result<()> {
        let name = index_file.file_name().ok_or_else(|| {
            io_err(
                index_file,
                io::Error::new(io::ErrorKind::InvalidInput, "index path has no file name"),
            )
        })?;
        let target = self.config.destination.join(name);

        info!("Deploying package index to {}", target.display());
        self.retry("copy package index", || copy_file(index_file, &target));
        self.report.actions.push(DeployAction::IndexDeployed { path: target });
        Ok(())
    }

    fn package_dir(&self, package: &Package) -> PathBuf {
        self.config.destination.join(&package.id)
    }

    fn staging_dir(&mut self) -> Result<PathBuf> {
        if let Some(dir) = &self.staging {
            return Ok(dir.path().to_path_buf());
        }

        let dir = tempfile::Builder::new()
            .prefix("pkgdeploy-")
            .tempdir()
            .map_err(|e| io_err(std::env::temp_dir(), e))?;
        let path = dir.path().to_path_buf();
        self.staging = Some(dir);
        Ok(path)
    }

    fn retry<T>(&self, what: &str, op: impl FnMut() -> io::Result<T>) -> T {
        retry_forever(what, self.config.retry_delay, op)
    }
}

/// Paths published as raw files by the live components of `package`
fn live_raw_paths(package: &Package) -> HashSet<&str> {
    package
        .components
        .iter()
        .filter(|c| c.state != State::Removed && is_raw(&c.compression))
        .flat_map(|c| c.current_files())
        .map(|f| f.path.as_str())
        .collect()
}

/// Copy `source` over `target`, creating missing parent folders
fn copy_file(source: &Path, target: &Path) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    if target.exists() {
        warn!("{} already exists. Overwriting.", target.display());
        fs::remove_file(target)?;
    }
    fs::copy(source, target)?;
    Ok(())
}

/// Move `source` over `target`, copying when a rename is not possible
fn move_file(source: &Path, target: &Path) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    if target.exists() {
        debug!("replacing {}", target.display());
        fs::remove_file(target)?;
    }
    if fs::rename(source, target).is_err() {
        fs::copy(source, target)?;
        fs::remove_file(source)?;
    }
    Ok(())
}

/// Delete a file; a missing file counts as deleted
fn remove_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Delete a file or folder; a missing path counts as deleted
fn remove_path(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => remove_tree(path),
        Ok(_) => remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Delete a folder tree; a missing folder counts as deleted
fn remove_tree(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
