//! On-disk session records.
//!
//! One JSON record per image, named after the image's file name and stored in
//! the save directory. The checksum inside validates a record; it never
//! locates one.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use romdbg_state::{Breakpoint, MemoryGuard, mask_address};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::checksum::compute_checksum;
use crate::error::{PersistError, Result};

/// Suffix of the read-only legacy record name.
pub const LEGACY_SUFFIX: &str = "-romdbg-debug.json";

/// File name component of an image path, accepting either separator.
#[must_use]
pub fn image_basename(image: &Path) -> Option<String> {
    let text = image.to_string_lossy();
    let base = text.rsplit(['/', '\\']).next()?;
    (!base.is_empty()).then(|| base.to_string())
}

/// Where an image's record lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPaths {
    /// `<save_dir>/<basename>.json`; the only path ever written.
    pub primary: PathBuf,
    /// Older name, consulted only when the primary does not exist.
    pub legacy: PathBuf,
}

impl RecordPaths {
    /// # Errors
    ///
    /// Returns [`PersistError::InvalidImagePath`] if the image path has no
    /// file name.
    pub fn new(save_dir: &Path, image: &Path) -> Result<Self> {
        let base =
            image_basename(image).ok_or_else(|| PersistError::InvalidImagePath(image.into()))?;
        Ok(Self {
            primary: save_dir.join(format!("{base}.json")),
            legacy: save_dir.join(format!("{base}{LEGACY_SUFFIX}")),
        })
    }

    /// The existing record to read from, primary first.
    #[must_use]
    pub fn readable(&self) -> Option<&Path> {
        if self.primary.is_file() {
            Some(&self.primary)
        } else if self.legacy.is_file() {
            Some(&self.legacy)
        } else {
            None
        }
    }
}

/// Path of the record to read for `image`, if one exists.
#[must_use]
pub fn resolve_persisted_record_path(save_dir: &Path, image: &Path) -> Option<PathBuf> {
    let paths = RecordPaths::new(save_dir, image).ok()?;
    paths.readable().map(Path::to_path_buf)
}

/// Path-keyed configuration stored with a record.
///
/// A field is `Some` whenever the record carries it, even if empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordConfig {
    #[serde(serialize_with = "string_or_empty")]
    pub elf: Option<String>,
    #[serde(serialize_with = "string_or_empty")]
    pub source: Option<String>,
    #[serde(serialize_with = "string_or_empty")]
    pub toolchain_prefix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakpointEntry {
    pub addr: u32,
    pub enabled: bool,
}

impl From<&Breakpoint> for BreakpointEntry {
    fn from(bp: &Breakpoint) -> Self {
        Self {
            addr: mask_address(bp.address),
            enabled: bp.enabled,
        }
    }
}

/// A guard as stored; size and mode stay raw until applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GuardEntry {
    pub addr: u32,
    pub size_bits: u32,
    pub mode: u32,
    pub value: u32,
    pub enabled: bool,
}

impl From<&MemoryGuard> for GuardEntry {
    fn from(g: &MemoryGuard) -> Self {
        Self {
            addr: mask_address(g.address),
            size_bits: g.size.bits(),
            mode: g.mode.code(),
            value: g.value,
            enabled: g.enabled,
        }
    }
}

/// The persisted unit for one image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionRecord {
    /// Zero means "written before checksums existed" and is trusted.
    pub rom_checksum: u64,
    pub rom_filename: String,
    pub config: RecordConfig,
    #[serde(deserialize_with = "breakpoint_entries")]
    pub breakpoints: Vec<BreakpointEntry>,
    #[serde(deserialize_with = "guard_entries")]
    pub protects: Vec<GuardEntry>,
}

impl SessionRecord {
    /// Read and parse a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid record.
    /// A record is never partially applied, so callers discard it whole.
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Write the record to `path` atomically.
    ///
    /// The JSON goes to a temporary file beside `path` first and is then
    /// renamed over it.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary file cannot be created, written or
    /// renamed.
    pub fn write(&self, path: &Path) -> Result<()> {
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let mut tmp = match dir {
            Some(dir) => tempfile::NamedTempFile::new_in(dir)?,
            None => tempfile::NamedTempFile::new_in(".")?,
        };
        serde_json::to_writer_pretty(&mut tmp, self)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| PersistError::Io(e.error))?;
        debug!(path = %path.display(), "session record written");
        Ok(())
    }

    /// Replace the stored breakpoints and guards with the live tables.
    pub fn capture(&mut self, breakpoints: &[Breakpoint], guards: &[MemoryGuard]) {
        self.breakpoints = breakpoints.iter().map(BreakpointEntry::from).collect();
        self.protects = guards.iter().map(GuardEntry::from).collect();
    }
}

/// Config fields of the record for `image` (primary, else legacy).
///
/// `None` if there is no readable, well-formed record.
#[must_use]
pub fn load_settings_for_image(save_dir: &Path, image: &Path) -> Option<RecordConfig> {
    let path = resolve_persisted_record_path(save_dir, image)?;
    match SessionRecord::read(&path) {
        Ok(record) => Some(record.config),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "ignoring unreadable session record");
            None
        }
    }
}

/// Store new config fields for `image`, keeping any persisted breakpoints
/// and guards. Unsupplied fields are cleared.
///
/// The checksum is recomputed when the image is readable; otherwise the
/// previous value is kept. Returns the record as written.
///
/// # Errors
///
/// Returns an error if `save_dir` is not a directory, the image path has no
/// file name, or the record cannot be written.
pub fn save_settings_for_image(
    save_dir: &Path,
    image: &Path,
    config: RecordConfig,
) -> Result<SessionRecord> {
    if !save_dir.is_dir() {
        return Err(PersistError::NoSaveDir);
    }
    let paths = RecordPaths::new(save_dir, image)?;
    let mut record = [&paths.primary, &paths.legacy]
        .into_iter()
        .find_map(|p| SessionRecord::read(p).ok())
        .unwrap_or_default();

    if let Some(checksum) = compute_checksum(image) {
        record.rom_checksum = checksum;
    }
    record.rom_filename = record_file_name(image);
    record.config = RecordConfig {
        elf: config.elf.filter(|s| !s.is_empty()),
        source: config.source.filter(|s| !s.is_empty()),
        toolchain_prefix: config.toolchain_prefix.filter(|s| !s.is_empty()),
    };
    record.write(&paths.primary)?;
    Ok(record)
}

/// `rom_filename` value for an image.
#[must_use]
pub fn record_file_name(image: &Path) -> String {
    image_basename(image).map_or_else(|| "unknown.json".to_string(), |b| format!("{b}.json"))
}

// ----------------------------------------------------------------------------
// serde helpers
// ----------------------------------------------------------------------------

#[allow(clippy::ref_option)]
fn string_or_empty<S: serde::Serializer>(
    value: &Option<String>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(value.as_deref().unwrap_or(""))
}

/// Enabled flags are booleans, but older writers used integers.
#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(u64),
}

fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(n) => n != 0,
    })
}

#[derive(Deserialize)]
struct StoredBreakpoint {
    addr: Option<u32>,
    #[serde(default, deserialize_with = "flag")]
    enabled: bool,
}

#[derive(Deserialize)]
struct StoredGuard {
    addr: Option<u32>,
    size_bits: Option<u32>,
    mode: Option<u32>,
    #[serde(default)]
    value: u32,
    #[serde(default, deserialize_with = "flag")]
    enabled: bool,
}

// Entries missing a required field are skipped; wrongly typed ones fail the
// whole record.
fn breakpoint_entries<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<BreakpointEntry>, D::Error> {
    let stored = Vec::<StoredBreakpoint>::deserialize(deserializer)?;
    Ok(stored
        .into_iter()
        .filter_map(|s| {
            Some(BreakpointEntry {
                addr: mask_address(s.addr?),
                enabled: s.enabled,
            })
        })
        .collect())
}

fn guard_entries<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<GuardEntry>, D::Error> {
    let stored = Vec::<StoredGuard>::deserialize(deserializer)?;
    Ok(stored
        .into_iter()
        .filter_map(|s| {
            Some(GuardEntry {
                addr: mask_address(s.addr?),
                size_bits: s.size_bits?,
                mode: s.mode?,
                value: s.value,
                enabled: s.enabled,
            })
        })
        .collect())
}
