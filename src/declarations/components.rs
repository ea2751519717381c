// src/declarations/components.rs

//! Components listing parser
//!
//! Each line reads `name;package-id-patterns;file-wildcards[;compression]`.
//! Both list fields are comma-separated. Lines with a field count other than
//! 3 or 4 are skipped with a warning.

use crate::error::{Error, Result, io_err};
use glob::Pattern;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Compression used when a line has no fourth field
pub const DEFAULT_COMPRESSION: &str = "lzma";

/// One line of a components listing
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentEntry {
    /// Component name
    pub name: String,
    /// Package id patterns this entry applies to
    pub package_patterns: Vec<Pattern>,
    /// File wildcards relative to the listing's directory, `/`-separated
    pub wildcards: Vec<String>,
    /// Declared compression mode
    pub compression: String,
    /// Listing file the entry came from
    pub listing: PathBuf,
    /// 1-based line number in the listing
    pub line: usize,
}

impl ComponentEntry {
    /// Whether the entry applies to the package with the given id
    pub fn applies_to(&self, package_id: &str) -> bool {
        self.package_patterns.iter().any(|p| p.matches(package_id))
    }

    /// Directory the wildcards are relative to
    pub fn base_dir(&self) -> &Path {
        self.listing.parent().unwrap_or(Path::new(""))
    }
}

/// Parse a components listing file
pub fn parse_components_listing(path: &Path) -> Result<Vec<ComponentEntry>> {
    let content = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    parse_entries(&content, path)
}

fn parse_entries(content: &str, path: &Path) -> Result<Vec<ComponentEntry>> {
    let mut entries = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let line_no = index + 1;
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split(';').map(str::trim).collect();
        if fields.len() != 3 && fields.len() != 4 {
            warn!(
                "Warning in {} line {}: expected 3 or 4 fields, found {}",
                path.display(),
                line_no,
                fields.len()
            );
            continue;
        }

        let package_patterns = split_list(fields[1])
            .map(|p| {
                Pattern::new(p).map_err(|e| Error::InvalidPattern {
                    file: path.to_path_buf(),
                    pattern: p.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let wildcards = split_list(fields[2])
            .map(|w| w.replace('\\', "/"))
            .collect();

        let compression = fields
            .get(3)
            .map(|c| c.to_string())
            .unwrap_or_else(|| DEFAULT_COMPRESSION.to_string());

        entries.push(ComponentEntry {
            name: fields[0].to_string(),
            package_patterns,
            wildcards,
            compression,
            listing: path.to_path_buf(),
            line: line_no,
        });
    }

    Ok(entries)
}

fn split_list(field: &str) -> impl Iterator<Item = &str> {
    field.split(',').map(str::trim).filter(|item| !item.is_empty())
}
