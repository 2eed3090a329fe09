//! kbuild - Linux kernel build helper
//!
//! Builds kernel source trees out of tree, one build directory per source
//! tree, branch, architecture and profile. Before building, a clean tree is
//! fast-forwarded from its remote; when that moves HEAD the build directory
//! is cleaned and reconfigured.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Configuration resolution, build layout and the build pipeline
//! - [`infra`] - Infrastructure layer (git, processes, directories)
//! - [`config`] - Configuration and constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;
