//! CLI definitions and argument types.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use romdbg::{GuardMode, GuardSize};

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for failure.
pub const EXIT_FAILURE: i32 = 1;

#[derive(Parser)]
#[command(name = "romdbg")]
#[command(about = "Inspect and edit per-image debug sessions")]
#[command(version)]
pub struct Cli {
    /// Show metrics summary after execution
    #[arg(long, global = true)]
    pub metrics: bool,

    /// Enable verbose output (sets RUST_LOG=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output (only show errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub silent: bool,

    /// Directory holding session records
    #[arg(long, global = true, value_name = "DIR")]
    pub save_dir: Option<PathBuf>,

    /// Toolchain prefix used to find addr2line (e.g. m68k-elf-)
    #[arg(long, global = true, value_name = "PREFIX")]
    pub toolchain_prefix: Option<String>,

    /// Runtime base of the debug image's code (hex with 0x, or decimal)
    #[arg(long, global = true, value_name = "ADDR", value_parser = parse_u64, default_value = "0")]
    pub load_bias: u64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the content checksum of an image
    Checksum {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,
    },
    /// Resolve addresses to source lines
    Resolve {
        /// Debug image (ELF with line info)
        #[arg(value_name = "ELF")]
        elf: PathBuf,

        /// Addresses to look up
        #[arg(value_name = "ADDR", required = true, value_parser = parse_u64)]
        addresses: Vec<u64>,
    },
    /// Show the stored session of an image
    Show {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,
    },
    /// Set the stored settings of an image (omitted fields are cleared)
    Config {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Debug image used for source lookup
        #[arg(long)]
        elf: Option<String>,

        /// Source root stripped from displayed file names
        #[arg(long)]
        source: Option<String>,

        /// Toolchain prefix stored with the image
        #[arg(long)]
        toolchain: Option<String>,
    },
    /// Edit the stored breakpoints of an image
    Break {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        #[command(subcommand)]
        action: BreakAction,
    },
    /// Edit the stored memory guards of an image
    Guard {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        #[command(subcommand)]
        action: GuardAction,
    },
}

#[derive(Subcommand, Clone, Copy)]
pub enum BreakAction {
    /// Add a breakpoint
    Add {
        #[arg(value_parser = parse_u32)]
        addr: u32,

        /// Add it disabled
        #[arg(long)]
        disabled: bool,
    },
    /// Remove the breakpoint at an address
    Remove {
        #[arg(value_parser = parse_u32)]
        addr: u32,
    },
    /// Enable the breakpoint at an address
    Enable {
        #[arg(value_parser = parse_u32)]
        addr: u32,
    },
    /// Disable the breakpoint at an address
    Disable {
        #[arg(value_parser = parse_u32)]
        addr: u32,
    },
    /// Disable all if any is enabled, otherwise enable all
    Toggle,
    /// Remove all breakpoints
    Clear,
}

#[derive(Subcommand, Clone, Copy)]
pub enum GuardAction {
    /// Add a guard
    Add {
        #[arg(value_parser = parse_u32)]
        addr: u32,

        /// Access width
        #[arg(long, value_enum, default_value = "8")]
        size: SizeArg,

        /// What the guard does
        #[arg(long, value_enum, default_value = "block")]
        mode: ModeArg,

        /// Value forced by `--mode force`
        #[arg(long, value_parser = parse_u32, default_value = "0")]
        value: u32,

        /// Add it disabled
        #[arg(long)]
        disabled: bool,
    },
    /// Enable a guard by index
    Enable { index: usize },
    /// Disable a guard by index
    Disable { index: usize },
    /// Remove a guard by index
    Remove { index: usize },
    /// Remove all guards
    Clear,
}

/// Guard width argument.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum SizeArg {
    #[value(name = "8")]
    Byte,
    #[value(name = "16")]
    Word,
    #[value(name = "32")]
    Long,
}

impl From<SizeArg> for GuardSize {
    fn from(arg: SizeArg) -> Self {
        match arg {
            SizeArg::Byte => Self::Byte,
            SizeArg::Word => Self::Word,
            SizeArg::Long => Self::Long,
        }
    }
}

/// Guard mode argument.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ModeArg {
    /// Drop writes
    Block,
    /// Keep the location at `--value`
    Force,
}

impl From<ModeArg> for GuardMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Block => Self::BlockWrite,
            ModeArg::Force => Self::ForceValue,
        }
    }
}

/// Parse `0x`-prefixed hex or decimal.
pub fn parse_u64(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{s}': {e}"))
}

pub fn parse_u32(s: &str) -> Result<u32, String> {
    let value = parse_u64(s)?;
    u32::try_from(value).map_err(|_| format!("'{s}' does not fit in 32 bits"))
}
