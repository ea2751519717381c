// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Core error types for pkgdeploy
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors with the path that caused them
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unknown keyword in a declaration file
    #[error("Error in {file} line {line}: unknown keyword '{keyword}'")]
    UnknownDirective {
        file: PathBuf,
        line: usize,
        keyword: String,
    },

    /// Package id or file wildcard that cannot be compiled
    #[error("Invalid wildcard pattern '{pattern}' in {file}: {reason}")]
    InvalidPattern {
        file: PathBuf,
        pattern: String,
        reason: String,
    },

    /// A scanned root holds no package definition
    #[error("No *.package-definition found in '{0}'")]
    NoPackageDefinition(PathBuf),

    /// A package source path holds no components listing
    #[error("No *.package-components found in '{0}'")]
    NoPackageComponents(PathBuf),

    /// Two package definitions declare the same id
    #[error("Package id '{id}' is declared by both {first} and {second}")]
    DuplicatePackage {
        id: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// Compression value no archive codec answers to
    #[error("Unknown compression method for component '{component}': '{compression}'")]
    UnknownCompression {
        component: String,
        compression: String,
    },

    /// Persisted index that cannot be decoded
    #[error("Malformed package index {path}: {reason}")]
    MalformedIndex { path: PathBuf, reason: String },

    /// Archive creation failure
    #[error("Failed to build archive {path}: {reason}")]
    Archive { path: PathBuf, reason: String },
}

/// Result type alias using pkgdeploy's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Wrap an `io::Error` with the path it happened on
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> Error {
    Error::Io {
        path: path.into(),
        source,
    }
}
