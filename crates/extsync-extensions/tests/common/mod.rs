//! Common test utilities for extsync-extensions
//!
//! This module provides shared test infrastructure including:
//! - Temporary editor installations and VSIX packages
//! - Mock collaborators (registry, editor CLI, backup, intervention)

#![allow(dead_code)]
#![allow(unused_imports)]

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
