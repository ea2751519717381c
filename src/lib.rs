// src/lib.rs

//! pkgdeploy
//!
//! Builds a package index from declaration files, reconciles it with the
//! previously published index and deploys the differences to a
//! distribution folder.
//!
//! # Architecture
//!
//! - Declarations: package definitions and components listings live next to the files they describe
//! - Index tree: Package → Component → File, every file fingerprinted with SHA-256
//! - Reconciliation: identity-keyed diff of two index generations into one state-tagged tree
//! - Deployment: state tags decide what is rebuilt or deleted; destination writes are retried until they succeed
//! - Persistence: the merged index is written as XML and deployed last

pub mod builder;
pub mod config;
pub mod declarations;
pub mod deploy;
mod error;
pub mod hash;
pub mod index;
pub mod publish;
pub mod reconcile;

pub use error::{Error, Result};
