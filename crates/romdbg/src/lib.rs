//! romdbg - debug-session state engine
//!
//! Resolves target addresses to source lines through a long-lived `addr2line`
//! helper, keeps the authoritative breakpoint and memory-guard tables, and
//! saves them per image in checksum-gated JSON records.
//!
//! # Example
//!
//! ```ignore
//! use romdbg::{Session, SessionOptions, ShadowEngine};
//!
//! let options = SessionOptions { save_dir: Some("saves".into()), ..Default::default() };
//! let mut session = Session::new(ShadowEngine::new(), options);
//! session.load_config_defaults("roms/game.bin".as_ref());
//! let outcome = session.load_runtime_state_on_boot("roms/game.bin".as_ref());
//! session.add_breakpoint(0x1000, true);
//! session.save_on_exit()?;
//! ```

pub use romdbg_state::{
    ADDRESS_MASK, Breakpoint, BreakpointId, DisplayFields, ExecutionEngine, GuardMode, GuardSize,
    MAX_GUARDS, MemoryGuard, Reconciler, ShadowEngine, Store, StoreError, format_entry,
    format_location, format_state, mask_address,
};
pub use romdbg_symbols::{
    DEFAULT_HELPER, HelperLocator, ResolvedLocation, Resolver, ResolverError, ResolverState,
    Toolchain, query_address,
};

pub mod checksum;
mod error;
pub mod metrics;
pub mod record;
mod session;

pub use checksum::compute_checksum;
pub use error::{PersistError, Result};
pub use record::{
    LEGACY_SUFFIX, RecordConfig, RecordPaths, SessionRecord, load_settings_for_image,
    resolve_persisted_record_path, save_settings_for_image,
};
pub use session::{BootOutcome, Session, SessionConfig, SessionOptions};
