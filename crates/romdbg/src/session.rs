//! A debug session: breakpoint tables, the engine they are mirrored to, and
//! the per-image record they are saved in.

use std::fmt;
use std::path::{Path, PathBuf};

use metrics::counter;
use romdbg_state::{
    Breakpoint, BreakpointId, ExecutionEngine, GuardMode, GuardSize, MemoryGuard, Store,
};
use romdbg_symbols::{DEFAULT_HELPER, Resolver, Toolchain};
use tracing::{debug, trace};

use crate::checksum::compute_checksum;
use crate::error::{PersistError, Result};
use crate::record::{
    GuardEntry, RecordConfig, RecordPaths, SessionRecord, load_settings_for_image,
    record_file_name, save_settings_for_image,
};

/// Session construction parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Directory holding session records. Without one nothing is loaded or
    /// saved.
    pub save_dir: Option<PathBuf>,
    /// Runtime base of the debug image's code.
    pub load_bias: u64,
    /// Tool name of the location helper, before the toolchain prefix.
    pub helper_name: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            save_dir: None,
            load_bias: 0,
            helper_name: DEFAULT_HELPER.to_string(),
        }
    }
}

/// The path-keyed settings of the active image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionConfig {
    /// Debug image handed to the location helper.
    pub elf: Option<PathBuf>,
    /// Prefix stripped from resolved file names.
    pub source_dir: Option<PathBuf>,
    pub toolchain_prefix: Option<String>,
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

impl SessionConfig {
    /// Override the fields present in a record.
    pub fn merge(&mut self, record: RecordConfig) {
        if let Some(elf) = record.elf {
            self.elf = non_empty(elf).map(PathBuf::from);
        }
        if let Some(source) = record.source {
            self.source_dir = non_empty(source).map(PathBuf::from);
        }
        if let Some(prefix) = record.toolchain_prefix {
            self.toolchain_prefix = non_empty(prefix);
        }
    }

    #[must_use]
    pub fn to_record(&self) -> RecordConfig {
        RecordConfig {
            elf: self.elf.as_ref().map(|p| p.to_string_lossy().into_owned()),
            source: self.source_dir.as_ref().map(|p| p.to_string_lossy().into_owned()),
            toolchain_prefix: self.toolchain_prefix.clone(),
        }
    }
}

impl From<RecordConfig> for SessionConfig {
    fn from(record: RecordConfig) -> Self {
        let mut config = Self::default();
        config.merge(record);
        config
    }
}

/// What a boot load did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    NoSaveDir,
    NoRecord,
    /// The record could not be parsed; nothing was touched.
    Malformed,
    /// The image could not be read; nothing was touched.
    ChecksumUnavailable,
    /// The record belongs to different image contents. All breakpoints and
    /// guards were dropped.
    Stale { stored: u64, actual: u64 },
    Applied { breakpoints: usize, guards: usize },
}

impl BootOutcome {
    /// Metric label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::NoSaveDir => "no_save_dir",
            Self::NoRecord => "no_record",
            Self::Malformed => "malformed",
            Self::ChecksumUnavailable => "checksum_unavailable",
            Self::Stale { .. } => "stale",
            Self::Applied { .. } => "applied",
        }
    }

    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

impl fmt::Display for BootOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSaveDir => write!(f, "no save directory"),
            Self::NoRecord => write!(f, "no session record"),
            Self::Malformed => write!(f, "session record malformed, ignored"),
            Self::ChecksumUnavailable => write!(f, "image unreadable, record not applied"),
            Self::Stale { stored, actual } => write!(
                f,
                "session record is stale (stored {stored:#018x}, image {actual:#018x}), cleared"
            ),
            Self::Applied {
                breakpoints,
                guards,
            } => write!(f, "restored {breakpoints} breakpoint(s), {guards} guard(s)"),
        }
    }
}

/// One debug session.
///
/// The store is authoritative; every mutation made through the session is
/// mirrored to the engine. Single-threaded: hosts sharing a session across
/// threads must serialize access.
pub struct Session<E: ExecutionEngine> {
    options: SessionOptions,
    config: SessionConfig,
    image: Option<PathBuf>,
    store: Store,
    engine: E,
}

impl<E: ExecutionEngine> Session<E> {
    #[must_use]
    pub fn new(engine: E, options: SessionOptions) -> Self {
        let mut resolver =
            Resolver::new(Toolchain::default()).with_helper_name(options.helper_name.clone());
        resolver.set_load_bias(options.load_bias);
        Self {
            options,
            config: SessionConfig::default(),
            image: None,
            store: Store::new(resolver),
            engine,
        }
    }

    #[must_use]
    pub const fn options(&self) -> &SessionOptions {
        &self.options
    }

    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Replace the active config.
    pub fn set_config(&mut self, config: SessionConfig) {
        if config.toolchain_prefix != self.config.toolchain_prefix {
            let prefix = config.toolchain_prefix.clone().unwrap_or_default();
            self.store.resolver_mut().set_locator(Toolchain::new(prefix));
            self.store.resolver_mut().stop();
        }
        self.store.set_image(config.elf.clone());
        self.config = config;
    }

    /// The binary this session was loaded for.
    #[must_use]
    pub fn image(&self) -> Option<&Path> {
        self.image.as_deref()
    }

    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    /// Direct store access. Changes made here are not mirrored to the engine.
    pub const fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    #[must_use]
    pub const fn engine(&self) -> &E {
        &self.engine
    }

    pub const fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Source root as text, for display.
    #[must_use]
    pub fn source_root(&self) -> Option<String> {
        self.config
            .source_dir
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
    }

    fn save_dir(&self) -> Option<&Path> {
        self.options.save_dir.as_deref().filter(|d| d.is_dir())
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Select `image` without loading it: start from the current config and
    /// override whatever its record carries. Breakpoints and guards are left
    /// alone.
    ///
    /// Returns whether a record contributed.
    pub fn load_config_defaults(&mut self, image: &Path) -> bool {
        self.image = Some(image.to_path_buf());
        let mut config = self.config.clone();
        let found = match self.save_dir() {
            Some(dir) => load_settings_for_image(dir, image),
            None => None,
        };
        let applied = found.is_some();
        if let Some(record) = found {
            config.merge(record);
        }
        self.set_config(config);
        applied
    }

    /// Restore breakpoints and guards for a freshly loaded `image`.
    ///
    /// The record is applied only if its checksum is zero or matches the
    /// image contents. A mismatching record clears the session instead.
    pub fn load_runtime_state_on_boot(&mut self, image: &Path) -> BootOutcome {
        self.image = Some(image.to_path_buf());
        let outcome = self.boot(image);
        counter!("romdbg_boot_loads_total", "outcome" => outcome.label()).increment(1);
        debug!(image = %image.display(), outcome = outcome.label(), "boot load");
        outcome
    }

    fn boot(&mut self, image: &Path) -> BootOutcome {
        let Some(save_dir) = self.save_dir() else {
            return BootOutcome::NoSaveDir;
        };
        let Some(path) = RecordPaths::new(save_dir, image)
            .ok()
            .and_then(|p| p.readable().map(Path::to_path_buf))
        else {
            return BootOutcome::NoRecord;
        };
        let record = match SessionRecord::read(&path) {
            Ok(record) => record,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "discarding session record");
                return BootOutcome::Malformed;
            }
        };
        let Some(actual) = compute_checksum(image) else {
            return BootOutcome::ChecksumUnavailable;
        };

        self.clear_all();
        if record.rom_checksum != 0 && record.rom_checksum != actual {
            return BootOutcome::Stale {
                stored: record.rom_checksum,
                actual,
            };
        }

        for entry in &record.breakpoints {
            // A repeated address keeps the first entry; mirror what the store holds.
            let id = self.store.add(entry.addr, entry.enabled);
            self.store.resolve_location(id);
            self.sync_breakpoint(id);
        }

        let mut mask = 0u64;
        for entry in &record.protects {
            let Some(guard) = guard_from_entry(entry) else {
                continue;
            };
            if self.store.add_guard(guard).is_err() {
                debug!(addr = format_args!("{:#08x}", entry.addr), "guard table full");
                continue;
            }
            if let Some(index) = self.engine.add_guard(&guard) {
                if guard.enabled {
                    mask |= guard_bit(index);
                }
            }
        }
        if !record.protects.is_empty() {
            self.engine.set_guard_enabled_mask(mask);
        }

        BootOutcome::Applied {
            breakpoints: self.store.len(),
            guards: self.store.guards().len(),
        }
    }

    /// Write the live tables and config to the active image's record.
    ///
    /// The checksum is always recomputed. Returns the path written.
    ///
    /// # Errors
    ///
    /// Nothing is written if there is no active image, no save directory, the
    /// image cannot be checksummed, or the record cannot be written.
    pub fn save_on_exit(&self) -> Result<PathBuf> {
        let image = self.image.as_deref().ok_or(PersistError::NoActiveImage)?;
        let save_dir = self.save_dir().ok_or(PersistError::NoSaveDir)?;
        let paths = RecordPaths::new(save_dir, image)?;
        let checksum =
            compute_checksum(image).ok_or_else(|| PersistError::ChecksumUnavailable(image.into()))?;

        let mut record = SessionRecord {
            rom_checksum: checksum,
            rom_filename: record_file_name(image),
            config: self.config.to_record(),
            ..SessionRecord::default()
        };
        record.capture(self.store.breakpoints(), self.store.guards());
        record.write(&paths.primary)?;
        Ok(paths.primary)
    }

    /// Store new settings for `image`, keeping its persisted tables.
    ///
    /// If `image` is the active one, the live config follows.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no save directory or the record cannot be
    /// written.
    pub fn save_settings_for_image(
        &mut self,
        image: &Path,
        config: &SessionConfig,
    ) -> Result<SessionRecord> {
        let save_dir = self.save_dir().ok_or(PersistError::NoSaveDir)?;
        let record = save_settings_for_image(save_dir, image, config.to_record())?;
        if self.image.as_deref() == Some(image) {
            self.set_config(SessionConfig::from(record.config.clone()));
        }
        Ok(record)
    }

    // ------------------------------------------------------------------------
    // Breakpoints
    // ------------------------------------------------------------------------

    /// Add a breakpoint and look up its location. An existing breakpoint at
    /// the address is returned as is.
    pub fn add_breakpoint(&mut self, address: u32, enabled: bool) -> BreakpointId {
        let id = self.store.add(address, enabled);
        self.sync_breakpoint(id);
        self.store.resolve_location(id);
        id
    }

    /// Add or enable a breakpoint at the current address.
    pub fn add_current(&mut self, address: u32) -> BreakpointId {
        let id = self.store.ensure_enabled_at(address);
        self.sync_breakpoint(id);
        self.store.resolve_location(id);
        id
    }

    pub fn set_breakpoint_enabled(&mut self, id: BreakpointId, enabled: bool) -> bool {
        if self.store.set_enabled(id, enabled).is_none() {
            return false;
        }
        self.sync_breakpoint(id);
        true
    }

    pub fn remove_breakpoint(&mut self, id: BreakpointId) -> Option<Breakpoint> {
        let bp = self.store.remove(id)?;
        self.engine.remove_breakpoint(bp.address);
        Some(bp)
    }

    pub fn remove_breakpoint_at(&mut self, address: u32) -> Option<Breakpoint> {
        let id = self.store.find_by_address(address)?.id;
        self.remove_breakpoint(id)
    }

    pub fn clear_breakpoints(&mut self) {
        self.store.clear_all();
        self.engine.clear_all_breakpoints();
    }

    /// Disable all breakpoints if any is enabled, otherwise enable all.
    pub fn toggle_breakpoints(&mut self) -> Option<bool> {
        let enabled = self.store.toggle_all()?;
        for bp in self.store.breakpoints() {
            if enabled {
                self.engine.add_breakpoint(bp.address);
            } else {
                self.engine.remove_breakpoint(bp.address);
            }
        }
        Some(enabled)
    }

    fn sync_breakpoint(&mut self, id: BreakpointId) {
        let Some(bp) = self.store.get(id) else {
            return;
        };
        trace!(%id, enabled = bp.enabled, "mirroring breakpoint");
        if bp.enabled {
            self.engine.add_breakpoint(bp.address);
        } else {
            self.engine.remove_breakpoint(bp.address);
        }
    }

    // ------------------------------------------------------------------------
    // Guards
    // ------------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns an error once the guard table is full.
    pub fn add_guard(&mut self, guard: MemoryGuard) -> Result<usize> {
        let index = self.store.add_guard(guard)?;
        self.sync_guards();
        Ok(index)
    }

    /// # Errors
    ///
    /// Returns an error for an out-of-range index.
    pub fn set_guard_enabled(&mut self, index: usize, enabled: bool) -> Result<()> {
        self.store.set_guard_enabled(index, enabled)?;
        self.sync_guards();
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error for an out-of-range index.
    pub fn remove_guard(&mut self, index: usize) -> Result<MemoryGuard> {
        let guard = self.store.remove_guard(index)?;
        self.sync_guards();
        Ok(guard)
    }

    pub fn clear_guards(&mut self) {
        self.store.clear_guards();
        self.engine.clear_guards();
    }

    // Indices shift on removal, so the engine copy is rebuilt wholesale.
    fn sync_guards(&mut self) {
        self.engine.clear_guards();
        let mut mask = 0u64;
        for guard in self.store.guards() {
            if let Some(index) = self.engine.add_guard(guard) {
                if guard.enabled {
                    mask |= guard_bit(index);
                }
            }
        }
        self.engine.set_guard_enabled_mask(mask);
    }

    /// Drop every breakpoint and guard from the store and the engine.
    pub fn clear_all(&mut self) {
        self.clear_breakpoints();
        self.clear_guards();
    }
}

fn guard_from_entry(entry: &GuardEntry) -> Option<MemoryGuard> {
    let size = match GuardSize::try_from(entry.size_bits) {
        Ok(size) => size,
        Err(e) => {
            debug!(error = %e, "skipping persisted guard");
            return None;
        }
    };
    let mode = match GuardMode::try_from(entry.mode) {
        Ok(mode) => mode,
        Err(e) => {
            debug!(error = %e, "skipping persisted guard");
            return None;
        }
    };
    Some(MemoryGuard {
        address: entry.addr,
        size,
        mode,
        value: entry.value,
        enabled: entry.enabled,
    })
}

/// Mask bit for a guard index, or nothing if the index does not fit.
fn guard_bit(index: usize) -> u64 {
    u32::try_from(index)
        .ok()
        .and_then(|shift| 1u64.checked_shl(shift))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use romdbg_state::ShadowEngine;

    use super::*;

    /// Hands out guard indices starting at a fixed offset.
    #[derive(Default)]
    struct OffsetEngine {
        base: usize,
        guards: usize,
        mask: u64,
    }

    impl ExecutionEngine for OffsetEngine {
        fn add_breakpoint(&mut self, _address: u32) {}

        fn remove_breakpoint(&mut self, _address: u32) {}

        fn add_guard(&mut self, _guard: &MemoryGuard) -> Option<usize> {
            self.guards += 1;
            Some(self.base + self.guards - 1)
        }

        fn set_guard_enabled_mask(&mut self, mask: u64) {
            self.mask = mask;
        }

        fn clear_all_breakpoints(&mut self) {}

        fn clear_guards(&mut self) {
            self.guards = 0;
        }
    }

    #[test]
    fn test_guard_bit() {
        assert_eq!(guard_bit(0), 1);
        assert_eq!(guard_bit(63), 1 << 63);
        assert_eq!(guard_bit(64), 0);
        assert_eq!(guard_bit(usize::MAX), 0);
    }

    #[test]
    fn test_out_of_range_engine_index_is_ignored() {
        let engine = OffsetEngine {
            base: 63,
            ..OffsetEngine::default()
        };
        let mut s = Session::new(engine, SessionOptions::default());
        s.add_guard(MemoryGuard::block_write(0x10, GuardSize::Byte)).unwrap();
        s.add_guard(MemoryGuard::block_write(0x20, GuardSize::Byte)).unwrap();
        assert_eq!(s.engine().guards, 2);
        assert_eq!(s.engine().mask, 1 << 63);
    }

    fn session() -> Session<ShadowEngine> {
        Session::new(ShadowEngine::new(), SessionOptions::default())
    }

    #[test]
    fn test_breakpoint_ops_mirror_to_engine() {
        let mut s = session();
        let a = s.add_breakpoint(0x1000, true);
        let b = s.add_breakpoint(0x2000, false);
        assert_eq!(s.engine().breakpoints(), vec![0x1000]);

        assert!(s.set_breakpoint_enabled(b, true));
        assert_eq!(s.engine().breakpoints(), vec![0x1000, 0x2000]);

        assert_eq!(s.toggle_breakpoints(), Some(false));
        assert!(s.engine().breakpoints().is_empty());
        assert_eq!(s.toggle_breakpoints(), Some(true));

        s.remove_breakpoint(a);
        assert_eq!(s.engine().breakpoints(), vec![0x2000]);

        assert_eq!(s.add_current(0x2000), b);
        s.clear_breakpoints();
        assert!(s.store().is_empty());
        assert!(s.engine().breakpoints().is_empty());
    }

    #[test]
    fn test_add_current_enables_existing() {
        let mut s = session();
        let id = s.add_breakpoint(0x40, false);
        assert!(!s.engine().has_breakpoint(0x40));
        assert_eq!(s.add_current(0x40), id);
        assert!(s.engine().has_breakpoint(0x40));
    }

    #[test]
    fn test_guard_ops_rebuild_engine_mask() {
        let mut s = session();
        s.add_guard(MemoryGuard::block_write(0x10, GuardSize::Byte)).unwrap();
        s.add_guard(MemoryGuard::force_value(0x20, GuardSize::Word, 5).with_enabled(false))
            .unwrap();
        s.add_guard(MemoryGuard::block_write(0x30, GuardSize::Long)).unwrap();
        assert_eq!(s.engine().guard_mask(), 0b101);

        s.remove_guard(0).unwrap();
        assert_eq!(s.engine().guards().len(), 2);
        assert_eq!(s.engine().guard_mask(), 0b10);

        s.set_guard_enabled(0, true).unwrap();
        assert_eq!(s.engine().guard_mask(), 0b11);
        assert!(s.set_guard_enabled(7, true).is_err());

        s.clear_guards();
        assert!(s.engine().guards().is_empty());
    }

    #[test]
    fn test_config_merge() {
        let mut config = SessionConfig {
            elf: Some(PathBuf::from("/a.elf")),
            source_dir: Some(PathBuf::from("/src")),
            toolchain_prefix: Some("m68k-elf-".to_string()),
        };
        config.merge(RecordConfig {
            elf: Some("/b.elf".to_string()),
            source: Some(String::new()),
            toolchain_prefix: None,
        });
        assert_eq!(config.elf.as_deref(), Some(Path::new("/b.elf")));
        assert_eq!(config.source_dir, None);
        assert_eq!(config.toolchain_prefix.as_deref(), Some("m68k-elf-"));
    }

    #[test]
    fn test_persistence_without_save_dir() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("game.bin");
        std::fs::write(&image, b"rom").unwrap();

        let mut s = session();
        assert!(!s.load_config_defaults(&image));
        assert_eq!(s.load_runtime_state_on_boot(&image), BootOutcome::NoSaveDir);
        assert!(matches!(s.save_on_exit(), Err(PersistError::NoSaveDir)));
    }

    #[test]
    fn test_save_on_exit_needs_image() {
        let s = session();
        assert!(matches!(s.save_on_exit(), Err(PersistError::NoActiveImage)));
    }

    #[test]
    fn test_boot_outcome_labels() {
        assert_eq!(BootOutcome::NoRecord.label(), "no_record");
        assert!(BootOutcome::Applied { breakpoints: 0, guards: 0 }.is_applied());
        assert!(!BootOutcome::Stale { stored: 1, actual: 2 }.is_applied());
    }
}
