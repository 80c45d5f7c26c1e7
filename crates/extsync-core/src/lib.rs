//! # extsync-core
//!
//! Core library for extsync providing:
//! - Engine configuration and the hierarchical config loader
//! - Domain types shared by the planner, coordinator and reconciler
//! - Editor path resolution
//! - Version ordering for extension versions
//! - The failure taxonomy produced at collaborator boundaries
//! - The escalating retry strategy chain

pub mod config;
pub mod error;
pub mod failure;
pub mod paths;
pub mod retry;
pub mod types;
pub mod version;

pub use config::HierarchicalConfigLoader;
pub use error::{Error, Result};
pub use failure::{ErrorKind, OperationError};
pub use paths::{get_home_dir, EditorPaths};
pub use version::{compare_versions, is_newer, ParsedVersion};
