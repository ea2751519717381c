// src/declarations/mod.rs

//! Declaration file parsers
//!
//! Two kinds of declaration files describe what gets published:
//! - `*.package-definition`: `key: value` lines describing one package
//! - `*.package-components`: `name;package-id-patterns;file-wildcards[;compression]`
//!   lines assigning files to named components of matching packages

pub mod components;
pub mod definition;

pub use components::{ComponentEntry, parse_components_listing};
pub use definition::parse_package_definition;

/// File name suffix of package definitions
pub const DEFINITION_SUFFIX: &str = ".package-definition";

/// File name suffix of components listings
pub const COMPONENTS_SUFFIX: &str = ".package-components";

/// Whether a file name denotes a package definition
///
/// Matches both `.package-definition` and `<anything>.package-definition`.
pub fn is_package_definition(file_name: &str) -> bool {
    file_name.ends_with(DEFINITION_SUFFIX)
}

/// Whether a file name denotes a components listing
pub fn is_components_listing(file_name: &str) -> bool {
    file_name.ends_with(COMPONENTS_SUFFIX)
}
