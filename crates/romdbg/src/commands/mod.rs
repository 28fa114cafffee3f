//! Command implementations.
//!
//! Each submodule handles a specific CLI command or group of commands.

mod edit;
mod inspect;

use std::path::Path;

use romdbg::{BootOutcome, Session, SessionConfig, SessionOptions, ShadowEngine};

use crate::cli::{Cli, Commands};
use crate::terminal;

/// Dispatch CLI command to the appropriate handler.
pub fn run_command(cli: &Cli) -> i32 {
    match &cli.command {
        Commands::Checksum { image } => inspect::cmd_checksum(image),
        Commands::Resolve { elf, addresses } => inspect::cmd_resolve(cli, elf, addresses),
        Commands::Show { image } => inspect::cmd_show(cli, image),
        Commands::Config {
            image,
            elf,
            source,
            toolchain,
        } => edit::cmd_config(
            cli,
            image,
            elf.as_deref(),
            source.as_deref(),
            toolchain.as_deref(),
        ),
        Commands::Break { image, action } => edit::cmd_break(cli, image, *action),
        Commands::Guard { image, action } => edit::cmd_guard(cli, image, *action),
    }
}

fn session_options(cli: &Cli) -> SessionOptions {
    SessionOptions {
        save_dir: cli.save_dir.clone(),
        load_bias: cli.load_bias,
        ..SessionOptions::default()
    }
}

/// A session with `image` selected and its stored state loaded, as a host
/// would have it right after loading the image.
fn open_session(cli: &Cli, image: &Path) -> (Session<ShadowEngine>, BootOutcome) {
    let mut session = Session::new(ShadowEngine::new(), session_options(cli));
    session.set_config(SessionConfig {
        toolchain_prefix: cli.toolchain_prefix.clone(),
        ..SessionConfig::default()
    });
    session.load_config_defaults(image);
    let outcome = session.load_runtime_state_on_boot(image);
    (session, outcome)
}

/// Report a boot outcome that the user should know about.
fn report_boot(outcome: BootOutcome) {
    match outcome {
        BootOutcome::Stale { .. } | BootOutcome::Malformed => {
            terminal::warning(&outcome.to_string());
        }
        BootOutcome::ChecksumUnavailable | BootOutcome::NoSaveDir => {
            terminal::error(&outcome.to_string());
        }
        BootOutcome::NoRecord | BootOutcome::Applied { .. } => {
            terminal::info(&outcome.to_string());
        }
    }
}
