//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Test workspace context
///
/// Creates a temporary directory holding a kernel source stand-in, a build
/// root and a profile store.
pub struct TestProject {
    /// Temporary directory for the test workspace
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new test workspace in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Get the path to the test workspace directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Source tree used by the tests
    pub fn src(&self) -> PathBuf {
        self.dir.path().join("linux")
    }

    /// Build root used by the tests
    pub fn builds(&self) -> PathBuf {
        self.dir.path().join("builds")
    }

    /// Profile store used by the tests
    pub fn store(&self) -> PathBuf {
        self.dir.path().join("kbuild.yaml")
    }

    /// Create a file in the test workspace
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Create a directory in the test workspace
    pub fn create_dir(&self, name: &str) {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(path).expect("Failed to create directory");
    }

    /// Check if a file exists in the test workspace
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Write the profile store
    pub fn write_store(&self, content: &str) {
        std::fs::write(self.store(), content).expect("Failed to write profile store");
    }

    /// Turn the source directory into a git repository with one commit on `master`
    ///
    /// Returns false when git is not installed.
    pub fn init_git_source(&self) -> bool {
        if which::which("git").is_err() {
            return false;
        }
        std::fs::create_dir_all(self.src()).expect("Failed to create source directory");
        git(&self.src(), &["init", "-q", "-b", "master"]);
        set_identity(&self.src());
        std::fs::write(self.src().join("Makefile"), "all:\n").expect("Failed to write file");
        git(&self.src(), &["add", "Makefile"]);
        git(&self.src(), &["commit", "-q", "-m", "initial"]);
        true
    }

    /// Run the kbuild binary in the workspace with a clean `KBUILD_*` environment
    pub fn run_kbuild(&self, args: &[&str]) -> Output {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_kbuild"));
        cmd.current_dir(self.path());
        for (key, _) in std::env::vars() {
            if key.starts_with("KBUILD_") {
                cmd.env_remove(key);
            }
        }
        cmd.env_remove("RUST_LOG");
        cmd.arg("--profile-store").arg(self.store());
        cmd.args(args);
        cmd.output().expect("Failed to execute kbuild")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Run git in `dir` with a fixed identity, panicking on failure
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=kbuild",
            "-c",
            "user.email=kbuild@example.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .expect("Failed to execute git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Record a committer identity in the repository's own config
pub fn set_identity(dir: &Path) {
    git(dir, &["config", "user.name", "kbuild"]);
    git(dir, &["config", "user.email", "kbuild@example.com"]);
}

/// Sample profile store for testing
pub const SAMPLE_STORE: &str = r"
Common:
  jobs: 2
Profiles:
  arm64:
    arch: arm64
    cross_compile: aarch64-linux-gnu-
  x86:
    arch: x86_64
    baseconfig: x86_64_defconfig
";

/// Standard output as text
pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Standard error as text
pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
