// src/reconcile.rs

//! Index reconciliation
//!
//! Compares the freshly built generation against the previously published
//! one and produces a merged tree in which every node carries a `State`:
//!
//! 1. Forward pass: each new package, component and file is matched by
//!    identity (id, name, path) against the old tree.
//! 2. Backward pass: whatever is left of the old tree is re-inserted as
//!    `Removed` (or kept `Unchanged` for vanished packages when old packages
//!    are retained).
//! 3. Sort pass: packages by id, components by name, files by path.
//!
//! Each level is a function that consumes a new and an old node and returns
//! the merged node, whose state is the roll-up of its children.

use crate::config::IndexPolicy;
use crate::index::{Component, File, Package, PackageIndex, State};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Merge the new generation with the old one according to `policy`
pub fn merge(new: PackageIndex, old: Option<PackageIndex>, policy: IndexPolicy) -> PackageIndex {
    let merged = match policy {
        IndexPolicy::Overwrite => reconcile(new, PackageIndex::new(), false),
        IndexPolicy::Append => append(new, old.unwrap_or_default()),
        IndexPolicy::Update => reconcile(new, old.unwrap_or_default(), false),
        IndexPolicy::UpdateKeepOldPackages => reconcile(new, old.unwrap_or_default(), true),
    };

    info!(
        "Index merged ({}): {} added, {} modified, {} removed, {} unchanged",
        policy,
        merged.count_by_state(State::Added),
        merged.count_by_state(State::Modified),
        merged.count_by_state(State::Removed),
        merged.count_by_state(State::Unchanged),
    );
    merged
}

/// Union of both generations without identity matching
///
/// Old packages keep their loaded state, new ones their built state. Ids
/// present in both end up twice; keeping them disjoint is up to the caller.
pub fn append(new: PackageIndex, old: PackageIndex) -> PackageIndex {
    let mut merged = old;
    let known: HashSet<String> = merged.packages.iter().map(|p| p.id.clone()).collect();

    for package in new.packages {
        if known.contains(&package.id) {
            warn!(
                "Package {} already exists in the index; appending a second copy",
                package.id
            );
        }
        merged.packages.push(package);
    }

    merged.sort();
    merged
}

/// Three-pass reconciliation of `new` against `old`
///
/// With `keep_old_packages`, packages missing from `new` stay in the result
/// tagged `Unchanged` instead of `Removed`.
pub fn reconcile(new: PackageIndex, mut old: PackageIndex, keep_old_packages: bool) -> PackageIndex {
    let mut merged = PackageIndex::new();

    for package in new.packages {
        let package = match old.take_package(&package.id) {
            Some(previous) => reconcile_package(package, previous),
            None => mark(package, State::Added),
        };
        debug!("package {}: {}", package.id, package.state);
        merged.packages.push(package);
    }

    let leftover = if keep_old_packages {
        State::Unchanged
    } else {
        State::Removed
    };
    for package in old.packages {
        debug!("package {}: {} (not rebuilt)", package.id, leftover);
        merged.packages.push(mark(package, leftover));
    }

    merged.sort();
    merged
}

/// Merge two generations of the same package
pub fn reconcile_package(mut new: Package, mut old: Package) -> Package {
    let mut components = Vec::with_capacity(new.components.len());

    for component in std::mem::take(&mut new.components) {
        let component = match old.take_component(&component.name) {
            Some(previous) => reconcile_component(component, previous),
            None => {
                let mut component = component;
                component.set_state_deep(State::Added);
                component
            }
        };
        components.push(component);
    }

    for mut component in old.components {
        component.set_state_deep(State::Removed);
        components.push(component);
    }

    new.state = State::rollup(components.iter().map(|c| c.state));
    new.components = components;
    new
}

/// Merge two generations of the same component
///
/// A compression change takes precedence over file changes for the
/// component's own state; files are diffed either way.
pub fn reconcile_component(mut new: Component, mut old: Component) -> Component {
    let mut files = Vec::with_capacity(new.files.len());

    for file in std::mem::take(&mut new.files) {
        let state = match old.take_file(&file.path) {
            Some(previous) if previous.hash == file.hash => State::Unchanged,
            Some(_) => State::Modified,
            None => State::Added,
        };
        files.push(File { state, ..file });
    }

    for file in old.files {
        files.push(File {
            state: State::Removed,
            ..file
        });
    }

    if new.compression != old.compression {
        new.state = State::ModifiedCompression;
        new.previous_compression = Some(old.compression);
    } else {
        new.state = State::rollup(files.iter().map(|f| f.state));
        new.previous_compression = None;
    }
    new.files = files;
    new
}

fn mark(mut package: Package, state: State) -> Package {
    package.set_state_deep(state);
    package
}
