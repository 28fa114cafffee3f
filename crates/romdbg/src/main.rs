//! romdbg CLI - per-image debug sessions

mod cli;
mod commands;
mod terminal;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;

fn main() {
    let cli = Cli::parse();

    // Initialize metrics recorder if enabled
    let metrics_handle = if cli.metrics {
        romdbg::metrics::CliRecorder::new().install()
    } else {
        None
    };
    romdbg::metrics::init();

    let default_level = if cli.verbose {
        "romdbg=debug"
    } else if cli.silent {
        "romdbg=error"
    } else {
        "romdbg=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let exit_code = commands::run_command(&cli);

    if let Some(handle) = metrics_handle {
        handle.print_summary();
    }

    std::process::exit(exit_code);
}
