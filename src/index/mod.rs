// src/index/mod.rs

//! Package index entity tree
//!
//! One generation of the published index is a three-level tree:
//! - `Package`: top-level deployable unit, identified by its id
//! - `Component`: named, independently compressed bundle of files
//! - `File`: single artifact with a content fingerprint
//!
//! Every node carries a `State` produced by reconciliation and consumed by
//! deployment. Identity is the id for packages, the name for components and
//! the path for files; lookups go through explicit `find_*` / `take_*`
//! functions.

pub mod xml;

use crate::error::Result;
use crate::hash::hash_file;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Change classification of a node relative to the previous index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    Unchanged,
    Added,
    Removed,
    Modified,
    /// Component only: same files, different compression
    ModifiedCompression,
}

impl State {
    pub fn as_str(&self) -> &str {
        match self {
            State::Unchanged => "unchanged",
            State::Added => "added",
            State::Removed => "removed",
            State::Modified => "modified",
            State::ModifiedCompression => "modifiedcompression",
        }
    }

    /// State of a parent whose children carry `states`
    ///
    /// Any child that is not `Unchanged` makes the parent `Modified`.
    pub fn rollup(states: impl IntoIterator<Item = State>) -> State {
        if states.into_iter().any(|s| s != State::Unchanged) {
            State::Modified
        } else {
            State::Unchanged
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "unchanged" => Ok(State::Unchanged),
            "added" => Ok(State::Added),
            "removed" => Ok(State::Removed),
            "modified" => Ok(State::Modified),
            "modifiedcompression" => Ok(State::ModifiedCompression),
            _ => Err(format!("Invalid state: {}", s)),
        }
    }
}

/// A single file of a component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    /// Path relative to the package source directory, `/`-separated
    pub path: String,
    /// Hex content fingerprint
    pub hash: String,
    pub state: State,
}

impl File {
    /// Create a file entry with a trusted fingerprint
    pub fn new(path: String, hash: String) -> Self {
        Self {
            path,
            hash,
            state: State::Unchanged,
        }
    }

    /// Create a newly discovered file, fingerprinting it from disk
    ///
    /// `path` is relative to `source_dir`.
    pub fn from_disk(source_dir: &Path, path: String) -> Result<Self> {
        let hash = hash_file(&source_dir.join(&path))?;
        Ok(Self {
            path,
            hash,
            state: State::Added,
        })
    }
}

/// A named bundle of files within a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub name: String,
    /// Compression mode as declared (empty or `None` means raw files)
    pub compression: String,
    pub files: Vec<File>,
    pub state: State,
    /// Compression of the previous generation, set when the state is
    /// `ModifiedCompression`. Never persisted.
    pub previous_compression: Option<String>,
}

impl Component {
    pub fn new(name: String, compression: String) -> Self {
        Self {
            name,
            compression,
            files: Vec::new(),
            state: State::Unchanged,
            previous_compression: None,
        }
    }

    /// Find a file by path
    pub fn find_file(&self, path: &str) -> Option<&File> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Remove and return the file with the given path
    pub fn take_file(&mut self, path: &str) -> Option<File> {
        let pos = self.files.iter().position(|f| f.path == path)?;
        Some(self.files.remove(pos))
    }

    /// Append a file unless one with the same path is already present
    ///
    /// Returns whether the file was added.
    pub fn push_file(&mut self, file: File) -> bool {
        if self.find_file(&file.path).is_some() {
            return false;
        }
        self.files.push(file);
        true
    }

    /// Files that are part of the current generation
    pub fn current_files(&self) -> impl Iterator<Item = &File> {
        self.files.iter().filter(|f| f.state != State::Removed)
    }

    /// Tag this component and all of its files
    pub fn set_state_deep(&mut self, state: State) {
        self.state = state;
        for file in &mut self.files {
            file.state = state;
        }
    }
}

/// A top-level deployable unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    /// Stable identity across generations
    pub id: String,
    pub name: String,
    pub description: String,
    /// Product tag, persisted as `Type`
    pub package_type: String,
    pub version: String,
    /// Directory the package was discovered in. Not persisted, so packages
    /// loaded from an index have none.
    pub source_path: Option<PathBuf>,
    pub components: Vec<Component>,
    pub state: State,
}

impl Package {
    pub fn new(
        id: String,
        name: String,
        description: String,
        package_type: String,
        version: String,
    ) -> Self {
        Self {
            id,
            name,
            description,
            package_type,
            version,
            source_path: None,
            components: Vec::new(),
            state: State::Unchanged,
        }
    }

    /// Find a component by name
    pub fn find_component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Remove and return the component with the given name
    pub fn take_component(&mut self, name: &str) -> Option<Component> {
        let pos = self.components.iter().position(|c| c.name == name)?;
        Some(self.components.remove(pos))
    }

    /// Drop components that hold no files, returning their names
    pub fn prune_empty_components(&mut self) -> Vec<String> {
        let mut pruned = Vec::new();
        self.components.retain(|c| {
            if c.files.is_empty() {
                pruned.push(c.name.clone());
                false
            } else {
                true
            }
        });
        pruned
    }

    /// Tag this package and its whole subtree
    pub fn set_state_deep(&mut self, state: State) {
        self.state = state;
        for component in &mut self.components {
            component.set_state_deep(state);
        }
    }
}

/// Root collection of one index generation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageIndex {
    pub packages: Vec<Package>,
}

impl PackageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a package by id
    pub fn find_package(&self, id: &str) -> Option<&Package> {
        self.packages.iter().find(|p| p.id == id)
    }

    /// Remove and return the package with the given id
    pub fn take_package(&mut self, id: &str) -> Option<Package> {
        let pos = self.packages.iter().position(|p| p.id == id)?;
        Some(self.packages.remove(pos))
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Sort packages by id, components by name and files by path
    pub fn sort(&mut self) {
        self.packages.sort_by(|a, b| a.id.cmp(&b.id));
        for package in &mut self.packages {
            package.components.sort_by(|a, b| a.name.cmp(&b.name));
            for component in &mut package.components {
                component.files.sort_by(|a, b| a.path.cmp(&b.path));
            }
        }
    }

    /// Count packages per state
    pub fn count_by_state(&self, state: State) -> usize {
        self.packages.iter().filter(|p| p.state == state).count()
    }
}
