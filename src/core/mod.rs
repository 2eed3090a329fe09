//! Core business logic module
//!
//! Decides what to run; spawning processes and touching git belong in
//! [`crate::infra`].
//!
//! # Submodules
//!
//! - [`profile`] - Profile store (YAML) parsing
//! - [`resolver`] - Layered configuration resolution
//! - [`layout`] - Build directory identity and creation
//! - [`tree`] - Source tree update policy
//! - [`kernel`] - Kernel `make` invocations
//! - [`builder`] - Build orchestration state machine

pub mod builder;
pub mod kernel;
pub mod layout;
pub mod profile;
pub mod resolver;
pub mod tree;
