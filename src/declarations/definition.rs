// src/declarations/definition.rs

//! Package definition parser
//!
//! A definition holds `key: value` lines with the keys `unique-id`,
//! `product`, `version`, `description` and `name`. Any other key is fatal.

use crate::error::{Error, Result, io_err};
use crate::index::{Package, State};
use std::path::Path;
use tracing::warn;

/// Fields of a package definition
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct PackageInfo {
    id: Option<String>,
    product: Option<String>,
    version: Option<String>,
    description: Option<String>,
    name: Option<String>,
}

impl PackageInfo {
    fn is_complete(&self) -> bool {
        [
            &self.id,
            &self.product,
            &self.version,
            &self.description,
            &self.name,
        ]
        .iter()
        .all(|field| field.as_deref().is_some_and(|v| !v.is_empty()))
    }
}

/// Parse a package definition file into an empty `Package`
///
/// The package's source path is the directory holding the definition.
/// Components are attached later by the index builder.
pub fn parse_package_definition(path: &Path) -> Result<Package> {
    let content = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let info = parse_info(&content, path)?;

    if !info.is_complete() {
        warn!("Warning in {}: incomplete package definition", path.display());
    }

    let mut package = Package::new(
        info.id.unwrap_or_default(),
        info.name.unwrap_or_default(),
        info.description.unwrap_or_default(),
        info.product.unwrap_or_default().to_lowercase(),
        info.version.unwrap_or_default(),
    );
    package.source_path = Some(
        path.parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    );
    package.state = State::Added;

    Ok(package)
}

fn parse_info(content: &str, path: &Path) -> Result<PackageInfo> {
    let mut info = PackageInfo::default();

    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let (key, value) = line.split_once(':').unwrap_or((line, ""));
        let value = Some(value.trim().to_string());

        match key.trim() {
            "unique-id" => info.id = value,
            "product" => info.product = value,
            "version" => info.version = value,
            "description" => info.description = value,
            "name" => info.name = value,
            other => {
                return Err(Error::UnknownDirective {
                    file: path.to_path_buf(),
                    line: index + 1,
                    keyword: other.to_string(),
                });
            }
        }
    }

    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_complete_definition() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wynsure.package-definition");
        std::fs::write(
            &path,
            "unique-id: wynsure-5.6\r\nproduct: Wynsure\nversion: 5.6.0\ndescription: Wynsure: core\nname: Wynsure 5.6\n",
        )
        .unwrap();

        let pkg = parse_package_definition(&path).unwrap();
        assert_eq!(pkg.id, "wynsure-5.6");
        assert_eq!(pkg.package_type, "wynsure");
        assert_eq!(pkg.version, "5.6.0");
        assert_eq!(pkg.description, "Wynsure: core");
        assert_eq!(pkg.name, "Wynsure 5.6");
        assert_eq!(pkg.source_path.as_deref(), Some(dir.path()));
        assert_eq!(pkg.state, State::Added);
        assert!(pkg.components.is_empty());
    }

    #[test]
    fn test_incomplete_definition_is_accepted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".package-definition");
        std::fs::write(&path, "unique-id: partial\n\nversion: 1\n").unwrap();

        let pkg = parse_package_definition(&path).unwrap();
        assert_eq!(pkg.id, "partial");
        assert_eq!(pkg.name, "");
        assert_eq!(pkg.package_type, "");
    }

    #[test]
    fn test_unknown_keyword_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".package-definition");
        std::fs::write(&path, "unique-id: p\nauthor: someone\n").unwrap();

        match parse_package_definition(&path).unwrap_err() {
            Error::UnknownDirective { line, keyword, .. } => {
                assert_eq!(line, 2);
                assert_eq!(keyword, "author");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_line_without_colon_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".package-definition");
        std::fs::write(&path, "garbage\n").unwrap();

        assert!(matches!(
            parse_package_definition(&path),
            Err(Error::UnknownDirective { line: 1, .. })
        ));
    }
}
