//! Read-only commands: checksum, resolve, show.

use std::path::Path;

use romdbg::{
    GuardMode, MemoryGuard, Resolver, Toolchain, compute_checksum, format_entry,
    resolve_persisted_record_path,
};
use tracing::error;

use crate::cli::{Cli, EXIT_FAILURE, EXIT_SUCCESS};
use crate::commands::{open_session, report_boot};
use crate::terminal;

/// Handle the `checksum` command.
pub fn cmd_checksum(image: &Path) -> i32 {
    match compute_checksum(image) {
        Some(sum) => {
            println!("{sum:#018x}  {}", image.display());
            EXIT_SUCCESS
        }
        None => {
            error!(path = %image.display(), "cannot read image");
            EXIT_FAILURE
        }
    }
}

/// Handle the `resolve` command.
pub fn cmd_resolve(cli: &Cli, elf: &Path, addresses: &[u64]) -> i32 {
    let prefix = cli.toolchain_prefix.clone().unwrap_or_default();
    let mut resolver = Resolver::new(Toolchain::new(prefix));
    resolver.set_load_bias(cli.load_bias);

    if let Err(e) = resolver.start(elf) {
        error!(error = %e, path = %elf.display(), "failed to start location helper");
        return EXIT_FAILURE;
    }

    let mut unresolved = 0usize;
    for &addr in addresses {
        match resolver.resolve(addr) {
            Some(loc) => println!(
                "{addr:#010x}  {}:{}",
                loc.file.as_deref().unwrap_or("??"),
                loc.line.unwrap_or(0)
            ),
            None => {
                unresolved += 1;
                println!("{addr:#010x}  ??");
            }
        }
    }
    resolver.stop();

    if unresolved == addresses.len() {
        EXIT_FAILURE
    } else {
        EXIT_SUCCESS
    }
}

/// Handle the `show` command.
pub fn cmd_show(cli: &Cli, image: &Path) -> i32 {
    let (session, outcome) = open_session(cli, image);
    if !cli.silent {
        report_boot(outcome);
    }

    terminal::field("image", &image.display().to_string());
    let checksum = compute_checksum(image)
        .map_or_else(|| "unavailable".to_string(), |c| format!("{c:#018x}"));
    terminal::field("checksum", &checksum);
    let record = cli
        .save_dir
        .as_deref()
        .and_then(|dir| resolve_persisted_record_path(dir, image))
        .map_or_else(|| "none".to_string(), |p| p.display().to_string());
    terminal::field("record", &record);

    let config = session.config();
    let show = |p: Option<String>| p.unwrap_or_else(|| "-".to_string());
    terminal::field(
        "elf",
        &show(config.elf.as_ref().map(|p| p.display().to_string())),
    );
    terminal::field(
        "source",
        &show(config.source_dir.as_ref().map(|p| p.display().to_string())),
    );
    terminal::field("toolchain", &show(config.toolchain_prefix.clone()));

    println!();
    terminal::header("Breakpoints");
    let root = session.source_root();
    if session.store().is_empty() {
        terminal::item("(none)");
    }
    for bp in session.store().breakpoints() {
        terminal::item(&format_entry(bp, root.as_deref()));
    }

    println!();
    terminal::header("Guards");
    if session.store().guards().is_empty() {
        terminal::item("(none)");
    }
    for (i, guard) in session.store().guards().iter().enumerate() {
        terminal::item(&format!("[{i}] {}", describe_guard(guard)));
    }

    EXIT_SUCCESS
}

pub fn describe_guard(guard: &MemoryGuard) -> String {
    let action = match guard.mode {
        GuardMode::BlockWrite => "block writes".to_string(),
        GuardMode::ForceValue => format!("force {:#x}", guard.value),
    };
    format!(
        "{:#08x} {}-bit {action} ({})",
        guard.address,
        guard.size.bits(),
        if guard.enabled { "enabled" } else { "disabled" }
    )
}
