//! Toolchain binary lookup.

use std::env;
use std::path::{Path, PathBuf};

/// Finds an external toolchain binary by tool name (e.g. `addr2line`).
pub trait HelperLocator {
    /// Path to the named tool, or `None` if it is not available.
    fn locate_helper(&self, name: &str) -> Option<PathBuf>;
}

impl<F> HelperLocator for F
where
    F: Fn(&str) -> Option<PathBuf>,
{
    fn locate_helper(&self, name: &str) -> Option<PathBuf> {
        self(name)
    }
}

/// A cross toolchain identified by its binary prefix.
///
/// `Toolchain::new("m68k-elf-")` locates `m68k-elf-addr2line` on `PATH`;
/// a prefix containing a directory (`/opt/cross/bin/m68k-elf-`) is used as is.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Toolchain {
    prefix: String,
}

impl Toolchain {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// File name of a tool in this toolchain.
    #[must_use]
    pub fn binary_name(&self, tool: &str) -> String {
        format!("{}{tool}", self.prefix)
    }
}

impl HelperLocator for Toolchain {
    fn locate_helper(&self, name: &str) -> Option<PathBuf> {
        let candidate = PathBuf::from(self.binary_name(name));
        if candidate.components().count() > 1 {
            return candidate.is_file().then_some(candidate);
        }
        search_path(&candidate)
    }
}

fn search_path(name: &Path) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|path| path.is_file())
}
