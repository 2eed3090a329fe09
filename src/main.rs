//! kbuild CLI - Linux kernel build helper
//!
//! Entry point for the kbuild command-line application.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use kbuild::cli::output::{display_error, exit_code, OutputConfig};
use kbuild::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let output_config = OutputConfig::new(cli.quiet, cli.json, cli.verbose);

    // RUST_LOG wins over -v/-q
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(output_config.log_level().into()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cli.run().await {
        display_error(&e);
        std::process::exit(exit_code(&e));
    }
}
