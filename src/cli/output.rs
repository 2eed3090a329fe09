//! Output formatting
//!
//! Human-readable and JSON renderings of command results, plus the log
//! level chosen by `-v`/`-q`. Command output from `make` itself is streamed
//! by the process runner and never passes through here; [`command_sink`]
//! only picks the stream it goes to.

use std::io::{self, Write};
use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use tracing::Level;

use crate::core::builder::BuildReport;
use crate::error::KbuildError;

/// Status message prefixes
pub mod status {
    /// Success prefix (green checkmark)
    pub const SUCCESS: &str = "✓";

    /// Error prefix (red X)
    pub const ERROR: &str = "✗";
}

/// Output settings from the global flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputConfig {
    pub quiet: bool,
    pub json: bool,
    pub verbose: u8,
}

impl OutputConfig {
    pub fn new(quiet: bool, json: bool, verbose: u8) -> Self {
        Self {
            quiet,
            json,
            verbose,
        }
    }

    /// Default log level when `RUST_LOG` is unset
    pub fn log_level(&self) -> Level {
        if self.quiet {
            return Level::ERROR;
        }
        match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

/// Stream for command announcements and child output
///
/// With `--json`, stdout carries the JSON document alone, so everything
/// else goes to stderr.
pub fn command_sink(json: bool) -> Box<dyn Write + Send> {
    if json {
        Box::new(io::stderr())
    } else {
        Box::new(io::stdout())
    }
}

/// Print a value as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print the outcome of a build or install run
pub fn print_report(report: &BuildReport, json: bool) -> Result<()> {
    if json {
        return print_json(report);
    }
    println!(
        "{} {} (source {})",
        status::SUCCESS,
        report.build_dir.display(),
        report.pull
    );
    Ok(())
}

/// Print a single path
pub fn print_path(path: &Path, json: bool) -> Result<()> {
    if json {
        return print_json(&serde_json::json!({ "path": path }));
    }
    println!("{}", path.display());
    Ok(())
}

/// Print a list of names, one per line
pub fn print_names(names: &[String], json: bool) -> Result<()> {
    if json {
        return print_json(&names);
    }
    for name in names {
        println!("{name}");
    }
    Ok(())
}

/// Render an error with its cause chain
pub fn format_error(error: &anyhow::Error) -> String {
    let mut message = format!("{} {error}", status::ERROR);
    for cause in error.chain().skip(1) {
        message.push_str(&format!("\n  caused by: {cause}"));
    }
    message
}

/// Print an error to stderr
pub fn display_error(error: &anyhow::Error) {
    eprintln!("{}", format_error(error));
}

/// Process exit code for a failed run
///
/// A failed external command passes its own exit code through; everything
/// else exits with 1.
pub fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .chain()
        .find_map(|e| e.downcast_ref::<KbuildError>())
        .and_then(KbuildError::exit_code)
        .filter(|code| *code != 0)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, ProcessError, Step};

    #[test]
    fn test_log_level_from_flags() {
        assert_eq!(OutputConfig::new(false, false, 0).log_level(), Level::WARN);
        assert_eq!(OutputConfig::new(false, false, 1).log_level(), Level::INFO);
        assert_eq!(OutputConfig::new(false, false, 2).log_level(), Level::DEBUG);
        assert_eq!(OutputConfig::new(true, false, 2).log_level(), Level::ERROR);
    }

    #[test]
    fn test_exit_code_passes_through_step_failure() {
        let err = anyhow::Error::new(KbuildError::Step {
            step: Step::Build,
            source: ProcessError::Exited {
                command: "make".to_string(),
                code: 17,
            },
        });
        assert_eq!(exit_code(&err), 17);
    }

    #[test]
    fn test_exit_code_defaults_to_one() {
        let err = anyhow::Error::new(ConfigError::InvalidEnvOverride("X".to_string()));
        assert_eq!(exit_code(&err), 1);
    }

    #[test]
    fn test_format_error_includes_causes() {
        let err = anyhow::Error::new(ConfigError::ProfileNotFound {
            name: "foo".to_string(),
            available: vec!["arm64".to_string()],
        })
        .context("Failed to resolve build configuration");
        let text = format_error(&err);
        assert!(text.contains("Failed to resolve build configuration"));
        assert!(text.contains("caused by: Profile 'foo' not found. Available profiles: [arm64]"));
    }
}
