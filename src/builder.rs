// src/builder.rs

//! Index builder
//!
//! Walks the scanned roots for package definitions, attaches to each package
//! the components declared by the listings under its source directory, and
//! fingerprints every matched file. The result is the "new" generation of
//! the index, every node tagged `Added`.

use crate::declarations::{
    ComponentEntry, is_components_listing, is_package_definition, parse_components_listing,
    parse_package_definition,
};
use crate::deploy::archive::ArchiveFormat;
use crate::error::{Error, Result, io_err};
use crate::index::{Component, File, Package, PackageIndex, State};
use std::collections::{BTreeMap, HashMap};
use std::path::{Component as PathComponent, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Wildcards never match hidden files, such as the declarations themselves
const MATCH_OPTIONS: glob::MatchOptions = glob::MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: true,
};

/// Build the index generation described by the declarations under `roots`
pub fn build_index(roots: &[PathBuf]) -> Result<PackageIndex> {
    let mut index = PackageIndex::new();
    let mut origins: HashMap<String, PathBuf> = HashMap::new();

    for root in roots {
        let definitions = find_declarations(root, is_package_definition)?;
        if definitions.is_empty() {
            return Err(Error::NoPackageDefinition(root.clone()));
        }

        info!("Found {} package definition(s) in {}", definitions.len(), root.display());

        for definition in definitions {
            let Some(package) = build_package(&definition)? else {
                continue;
            };

            if let Some(first) = origins.get(&package.id) {
                return Err(Error::DuplicatePackage {
                    id: package.id,
                    first: first.clone(),
                    second: definition,
                });
            }
            origins.insert(package.id.clone(), definition);
            index.packages.push(package);
        }
    }

    index.sort();
    Ok(index)
}

/// Build one package from its definition file
///
/// Returns `None` when none of the package's components matched a file.
pub fn build_package(definition: &Path) -> Result<Option<Package>> {
    let mut package = parse_package_definition(definition)?;
    let source_dir = package.source_path.clone().unwrap_or_default();
    info!("Package {} ({})", package.id, definition.display());

    let listings = find_declarations(&source_dir, is_components_listing)?;
    if listings.is_empty() {
        return Err(Error::NoPackageComponents(source_dir));
    }

    let mut components: BTreeMap<String, Component> = BTreeMap::new();
    for listing in &listings {
        debug!("  components listing {}", listing.display());
        for entry in parse_components_listing(listing)? {
            if !entry.applies_to(&package.id) {
                continue;
            }
            ArchiveFormat::from_compression(&entry.name, &entry.compression)?;
            let component = components.entry(entry.name.clone()).or_insert_with(|| {
                let mut component = Component::new(entry.name.clone(), entry.compression.clone());
                component.state = State::Added;
                component
            });
            add_entry_files(component, &entry, &source_dir)?;
        }
    }

    package.components = components.into_values().collect();
    for name in package.prune_empty_components() {
        info!("  component {} matched no files, pruned", name);
    }

    if package.components.is_empty() {
        warn!("Package {} has no component with files, skipped", package.id);
        return Ok(None);
    }

    Ok(Some(package))
}

/// Resolve an entry's wildcards and append the matched files
///
/// The first entry declaring a component fixes its compression; later
/// entries with the same name only contribute files.
fn add_entry_files(component: &mut Component, entry: &ComponentEntry, source_dir: &Path) -> Result<()> {
    if component.compression != entry.compression {
        warn!(
            "{} line {}: component {} already declared with compression '{}', ignoring '{}'",
            entry.listing.display(),
            entry.line,
            component.name,
            component.compression,
            entry.compression
        );
    }

    for path in resolve_wildcards(entry, source_dir)? {
        let file = File::from_disk(source_dir, path)?;
        debug!("    {} -> {}", component.name, file.path);
        component.push_file(file);
    }
    Ok(())
}

/// Files matched by an entry's wildcards, relative to `source_dir`
///
/// Wildcards that match nothing contribute nothing.
pub fn resolve_wildcards(entry: &ComponentEntry, source_dir: &Path) -> Result<Vec<String>> {
    let base = glob::Pattern::escape(&entry.base_dir().to_string_lossy());
    let mut matched = Vec::new();

    for wildcard in &entry.wildcards {
        let pattern = format!("{}/{}", base.trim_end_matches('/'), wildcard);
        let paths = glob::glob_with(&pattern, MATCH_OPTIONS).map_err(|e| Error::InvalidPattern {
            file: entry.listing.clone(),
            pattern: wildcard.clone(),
            reason: e.to_string(),
        })?;

        for path in paths {
            let path = match path {
                Ok(path) => path,
                Err(e) => {
                    warn!("Skipping unreadable match for '{}': {}", wildcard, e);
                    continue;
                }
            };
            if !path.is_file() {
                continue;
            }
            match relative_path(&path, source_dir) {
                Some(relative) => matched.push(relative),
                None => warn!(
                    "{} line {}: {} is outside of {}, skipped",
                    entry.listing.display(),
                    entry.line,
                    path.display(),
                    source_dir.display()
                ),
            }
        }
    }

    Ok(matched)
}

/// `/`-separated path of `path` below `base`
///
/// Returns `None` when `path` is not below `base`.
fn relative_path(path: &Path, base: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let mut parts: Vec<String> = Vec::new();
    for part in relative.components() {
        match part {
            PathComponent::Normal(p) => parts.push(p.to_string_lossy().to_string()),
            PathComponent::CurDir => {}
            PathComponent::ParentDir => {
                parts.pop()?;
            }
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Declaration files below `dir` (and in `dir` itself), sorted by path
fn find_declarations(dir: &Path, is_match: fn(&str) -> bool) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            io_err(path, e.into())
        })?;
        if entry.file_type().is_file() && is_match(&entry.file_name().to_string_lossy()) {
            found.push(entry.into_path());
        }
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn definition(id: &str) -> String {
        format!("unique-id: {id}\nproduct: App\nversion: 1.0\ndescription: test\nname: {id}\n")
    }

    #[test]
    fn test_build_single_package() {
        let root = TempDir::new().unwrap();
        let app = root.path().join("app");
        write(&app.join(".package-definition"), &definition("app-1"));
        write(
            &app.join(".package-components"),
            "bin;app-*;bin/*.dll\ndoc;*;doc/**/*.txt;None\nempty;*;nothing/*\n",
        );
        write(&app.join("bin/a.dll"), "a");
        write(&app.join("bin/b.dll"), "b");
        write(&app.join("bin/readme.md"), "skip");
        write(&app.join("doc/guide/intro.txt"), "intro");

        let index = build_index(&[root.path().to_path_buf()]).unwrap();
        assert_eq!(index.len(), 1);

        let pkg = &index.packages[0];
        assert_eq!(pkg.id, "app-1");
        assert_eq!(pkg.state, State::Added);
        assert_eq!(pkg.source_path.as_deref(), Some(app.as_path()));

        let names: Vec<_> = pkg.components.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["bin", "doc"]);

        let bin = pkg.find_component("bin").unwrap();
        assert_eq!(bin.compression, "lzma");
        let paths: Vec<_> = bin.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["bin/a.dll", "bin/b.dll"]);
        assert!(bin.files.iter().all(|f| f.state == State::Added && !f.hash.is_empty()));

        let doc = pkg.find_component("doc").unwrap();
        assert_eq!(doc.files[0].path, "doc/guide/intro.txt");
    }

    #[test]
    fn test_listing_in_subdirectory_resolves_from_its_directory() {
        let root = TempDir::new().unwrap();
        write(&root.path().join("p.package-definition"), &definition("p"));
        write(&root.path().join("sub/sub.package-components"), "data;p;*.bin;store\n");
        write(&root.path().join("sub/x.bin"), "x");

        let index = build_index(&[root.path().to_path_buf()]).unwrap();
        let data = index.packages[0].find_component("data").unwrap();
        assert_eq!(data.files[0].path, "sub/x.bin");
    }

    #[test]
    fn test_duplicate_component_first_compression_wins() {
        let root = TempDir::new().unwrap();
        write(&root.path().join(".package-definition"), &definition("p"));
        write(
            &root.path().join(".package-components"),
            "bin;*;a.dll;store\nbin;*;b.dll;bzip2\nbin;*;a.dll\n",
        );
        write(&root.path().join("a.dll"), "a");
        write(&root.path().join("b.dll"), "b");

        let index = build_index(&[root.path().to_path_buf()]).unwrap();
        let bin = index.packages[0].find_component("bin").unwrap();
        assert_eq!(bin.compression, "store");
        assert_eq!(bin.files.len(), 2);
    }

    #[test]
    fn test_wildcards_skip_hidden_files() {
        let root = TempDir::new().unwrap();
        write(&root.path().join(".package-definition"), &definition("p"));
        write(&root.path().join(".package-components"), "all;p;*,conf/*;None\n");
        write(&root.path().join("x.txt"), "x");
        write(&root.path().join(".env"), "secret");
        write(&root.path().join("conf/z.cfg"), "z");
        write(&root.path().join("conf/.z.cfg.swp"), "swap");

        let index = build_index(&[root.path().to_path_buf()]).unwrap();
        let all = index.packages[0].find_component("all").unwrap();
        let paths: Vec<_> = all.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["conf/z.cfg", "x.txt"]);
    }

    #[test]
    fn test_unknown_compression_fails_the_build() {
        let root = TempDir::new().unwrap();
        write(&root.path().join(".package-definition"), &definition("p"));
        write(&root.path().join(".package-components"), "c;p;x.txt;rar\n");
        write(&root.path().join("x.txt"), "x");

        match build_index(&[root.path().to_path_buf()]).unwrap_err() {
            Error::UnknownCompression { component, compression } => {
                assert_eq!(component, "c");
                assert_eq!(compression, "rar");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_entries_for_other_packages_are_ignored() {
        let root = TempDir::new().unwrap();
        write(&root.path().join(".package-definition"), &definition("mine"));
        write(
            &root.path().join(".package-components"),
            "bin;theirs-*;a.dll\nown;mine;a.dll\n",
        );
        write(&root.path().join("a.dll"), "a");

        let index = build_index(&[root.path().to_path_buf()]).unwrap();
        let pkg = &index.packages[0];
        assert!(pkg.find_component("bin").is_none());
        assert!(pkg.find_component("own").is_some());
    }

    #[test]
    fn test_package_without_files_is_dropped() {
        let root = TempDir::new().unwrap();
        write(&root.path().join(".package-definition"), &definition("p"));
        write(&root.path().join(".package-components"), "bin;*;missing/*.dll\n");

        let index = build_index(&[root.path().to_path_buf()]).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_missing_definition_is_fatal() {
        let root = TempDir::new().unwrap();
        write(&root.path().join("readme.txt"), "nothing here");

        let err = build_index(&[root.path().to_path_buf()]).unwrap_err();
        assert!(matches!(err, Error::NoPackageDefinition(_)));
    }

    #[test]
    fn test_missing_components_is_fatal() {
        let root = TempDir::new().unwrap();
        write(&root.path().join(".package-definition"), &definition("p"));

        let err = build_index(&[root.path().to_path_buf()]).unwrap_err();
        assert!(matches!(err, Error::NoPackageComponents(_)));
    }

    #[test]
    fn test_duplicate_package_id_is_fatal() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        for root in [&first, &second] {
            write(&root.path().join(".package-definition"), &definition("same"));
            write(&root.path().join(".package-components"), "bin;*;a.dll\n");
            write(&root.path().join("a.dll"), "a");
        }

        let err = build_index(&[first.path().to_path_buf(), second.path().to_path_buf()]).unwrap_err();
        assert!(matches!(err, Error::DuplicatePackage { .. }));
    }

    #[test]
    fn test_fingerprints_stable_across_builds() {
        let root = TempDir::new().unwrap();
        write(&root.path().join(".package-definition"), &definition("p"));
        write(&root.path().join(".package-components"), "bin;*;*.dll\n");
        write(&root.path().join("a.dll"), "content");

        let roots = [root.path().to_path_buf()];
        let first = build_index(&roots).unwrap();
        let second = build_index(&roots).unwrap();
        assert_eq!(
            first.packages[0].components[0].files[0].hash,
            second.packages[0].components[0].files[0].hash
        );
    }

    #[test]
    fn test_relative_path() {
        let base = Path::new("/src/app");
        assert_eq!(
            relative_path(Path::new("/src/app/bin/a.dll"), base).as_deref(),
            Some("bin/a.dll")
        );
        assert_eq!(
            relative_path(Path::new("/src/app/sub/../a.dll"), base).as_deref(),
            Some("a.dll")
        );
        assert_eq!(relative_path(Path::new("/src/app/../other/a.dll"), base), None);
        assert_eq!(relative_path(Path::new("/elsewhere/a.dll"), base), None);
    }
}
