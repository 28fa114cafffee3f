//! Commands that change a stored session: config, break, guard.

use std::path::Path;

use romdbg::{BootOutcome, MemoryGuard, Session, SessionConfig, ShadowEngine, mask_address};
use tracing::error;

use crate::cli::{BreakAction, Cli, EXIT_FAILURE, EXIT_SUCCESS, GuardAction};
use crate::commands::{inspect::describe_guard, open_session, report_boot, session_options};
use crate::terminal;

/// Handle the `config` command.
pub fn cmd_config(
    cli: &Cli,
    image: &Path,
    elf: Option<&str>,
    source: Option<&str>,
    toolchain: Option<&str>,
) -> i32 {
    let mut session = Session::new(ShadowEngine::new(), session_options(cli));
    let config = SessionConfig {
        elf: elf.filter(|s| !s.is_empty()).map(Into::into),
        source_dir: source.filter(|s| !s.is_empty()).map(Into::into),
        toolchain_prefix: toolchain.filter(|s| !s.is_empty()).map(str::to_string),
    };
    match session.save_settings_for_image(image, &config) {
        Ok(record) => {
            if !cli.silent {
                terminal::success(&format!(
                    "settings saved ({} breakpoint(s), {} guard(s) kept)",
                    record.breakpoints.len(),
                    record.protects.len()
                ));
            }
            EXIT_SUCCESS
        }
        Err(e) => {
            error!(error = %e, path = %image.display(), "failed to save settings");
            EXIT_FAILURE
        }
    }
}

/// Handle the `break` command.
pub fn cmd_break(cli: &Cli, image: &Path, action: BreakAction) -> i32 {
    let Some(mut session) = begin_edit(cli, image) else {
        return EXIT_FAILURE;
    };

    let done = match action {
        BreakAction::Add { addr, disabled } => {
            let id = session.add_breakpoint(addr, !disabled);
            if !cli.silent {
                terminal::info(&format!("breakpoint {id} at {addr:#08x}"));
            }
            true
        }
        BreakAction::Remove { addr } => session.remove_breakpoint_at(addr).is_some(),
        BreakAction::Enable { addr } | BreakAction::Disable { addr } => {
            let enable = matches!(action, BreakAction::Enable { .. });
            match session.store().find_by_address(addr).map(|bp| bp.id) {
                Some(id) => session.set_breakpoint_enabled(id, enable),
                None => false,
            }
        }
        BreakAction::Toggle => {
            session.toggle_breakpoints();
            true
        }
        BreakAction::Clear => {
            session.clear_breakpoints();
            true
        }
    };
    if !done {
        error!("no breakpoint at that address");
        return EXIT_FAILURE;
    }

    finish_edit(cli, &session)
}

/// Handle the `guard` command.
pub fn cmd_guard(cli: &Cli, image: &Path, action: GuardAction) -> i32 {
    let Some(mut session) = begin_edit(cli, image) else {
        return EXIT_FAILURE;
    };

    let result = match action {
        GuardAction::Add {
            addr,
            size,
            mode,
            value,
            disabled,
        } => {
            let guard = MemoryGuard {
                address: mask_address(addr),
                size: size.into(),
                mode: mode.into(),
                value,
                enabled: !disabled,
            };
            session.add_guard(guard).map(|index| {
                if !cli.silent {
                    terminal::info(&format!("guard [{index}] {}", describe_guard(&guard)));
                }
            })
        }
        GuardAction::Enable { index } => session.set_guard_enabled(index, true),
        GuardAction::Disable { index } => session.set_guard_enabled(index, false),
        GuardAction::Remove { index } => session.remove_guard(index).map(|_| ()),
        GuardAction::Clear => {
            session.clear_guards();
            Ok(())
        }
    };
    if let Err(e) = result {
        error!(error = %e, "guard edit failed");
        return EXIT_FAILURE;
    }

    finish_edit(cli, &session)
}

/// Load the stored session, refusing when it could not be saved back.
fn begin_edit(cli: &Cli, image: &Path) -> Option<Session<ShadowEngine>> {
    let (session, outcome) = open_session(cli, image);
    if !cli.silent || !matches!(outcome, BootOutcome::NoRecord | BootOutcome::Applied { .. }) {
        report_boot(outcome);
    }
    match outcome {
        BootOutcome::NoSaveDir | BootOutcome::ChecksumUnavailable => None,
        _ => Some(session),
    }
}

fn finish_edit(cli: &Cli, session: &Session<ShadowEngine>) -> i32 {
    match session.save_on_exit() {
        Ok(path) => {
            if !cli.silent {
                terminal::success("session saved");
                terminal::path_output(&path);
            }
            EXIT_SUCCESS
        }
        Err(e) => {
            error!(error = %e, "failed to save session");
            EXIT_FAILURE
        }
    }
}
