//! Infrastructure layer
//!
//! Git repositories, external processes and platform directories.

pub mod dirs;
pub mod git;
pub mod process;
