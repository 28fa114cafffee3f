//! Breakpoint and memory-guard state for a debug session.
//!
//! The [`Store`] is the single source of truth for breakpoints and guards.
//! The execution engine receives a copy through [`ExecutionEngine`] for its
//! own triggering logic, but nothing is ever read back from it.
//!
//! ```ignore
//! use romdbg_state::{Store, ShadowEngine, ExecutionEngine};
//! use romdbg_symbols::{Resolver, Toolchain};
//!
//! let mut store = Store::new(Resolver::new(Toolchain::new("m68k-elf-")));
//! let mut engine = ShadowEngine::new();
//!
//! let id = store.add(0x1000, true);
//! engine.add_breakpoint(0x1000);
//! store.resolve_location(id);
//! ```

mod breakpoint;
mod display;
mod engine;
mod guard;
mod reconcile;
mod store;

pub use breakpoint::{ADDRESS_MASK, Breakpoint, BreakpointId, DisplayFields, mask_address};
pub use display::{format_entry, format_location, format_state, strip_source_root};
pub use engine::{ExecutionEngine, ShadowEngine};
pub use guard::{GuardMode, GuardSize, MAX_GUARDS, MemoryGuard, enabled_mask};
pub use reconcile::Reconciler;
pub use store::Store;

use thiserror::Error;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("guard table full ({} guards)", MAX_GUARDS)]
    GuardTableFull,
    #[error("no guard at index {0}")]
    NoSuchGuard(usize),
    #[error("invalid guard size: {0} bits")]
    InvalidGuardSize(u32),
    #[error("invalid guard mode: {0}")]
    InvalidGuardMode(u32),
}

pub type Result<T> = std::result::Result<T, StoreError>;
