//! Address-to-source resolution for debug images.
//!
//! A [`Resolver`] keeps one `addr2line`-compatible helper process alive per
//! image and resolves runtime addresses to `file:line` locations through it.
//! Every failure is soft: callers see an unknown location, never a panic.

mod location;
mod resolver;
mod toolchain;

pub use location::{ResolvedLocation, parse_echo, parse_location_line};
pub use resolver::{
    DEFAULT_HELPER, MAX_RESPONSE_LINES, Resolver, ResolverState, query_address,
};
pub use toolchain::{HelperLocator, Toolchain};

use std::path::PathBuf;

use thiserror::Error;

/// Helper process errors.
#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("no image path given")]
    EmptyImagePath,
    #[error("helper binary '{0}' not found")]
    HelperNotFound(String),
    #[error("failed to spawn {}: {source}", helper.display())]
    Spawn {
        helper: PathBuf,
        source: std::io::Error,
    },
    #[error("helper started without piped stdio")]
    MissingPipe,
}

pub type Result<T> = std::result::Result<T, ResolverError>;
