//! Long-lived addr2line helper driven over its stdin/stdout.
//!
//! The helper is spawned once per image and queried one address at a time.
//! Responses still buffered from an abandoned query are recognised by their
//! address echo and skipped, so the caller never has to drain the pipe.

use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use metrics::counter;
use tracing::{debug, trace};

use crate::location::{ResolvedLocation, parse_echo, parse_location_line};
use crate::toolchain::HelperLocator;
use crate::{ResolverError, Result};

/// Upper bound on response lines read for a single query.
pub const MAX_RESPONSE_LINES: usize = 128;

/// Tool name passed to the locator.
pub const DEFAULT_HELPER: &str = "addr2line";

/// Lifecycle of the helper process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolverState {
    Stopped,
    Starting,
    Ready,
}

/// Address the helper expects for a runtime address.
///
/// Runtime addresses at or above the load bias are translated back to
/// link-time addresses; anything below is passed through untouched.
#[must_use]
pub const fn query_address(address: u64, load_bias: u64) -> u64 {
    if address >= load_bias {
        address - load_bias
    } else {
        address
    }
}

struct Helper {
    child: Child,
    input: ChildStdin,
    output: BufReader<ChildStdout>,
    image: PathBuf,
    expect_func: bool,
    expect_file: bool,
}

impl Helper {
    /// Send one query and scan the response stream for its answer.
    ///
    /// `Ok(None)` means the helper answered without a usable location (or
    /// did not answer within the line bound). `Err` means a stream failed.
    fn exchange(&mut self, query: u64) -> io::Result<Option<ResolvedLocation>> {
        writeln!(self.input, "{query:#x}")?;
        self.input.flush()?;

        let mut matched = false;
        let mut buf = Vec::new();
        for _ in 0..MAX_RESPONSE_LINES {
            buf.clear();
            if self.output.read_until(b'\n', &mut buf)? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "helper closed its output",
                ));
            }
            // Paths are not guaranteed to be UTF-8.
            let line = String::from_utf8_lossy(&buf);
            let text = line.trim_end_matches(['\r', '\n']);

            if let Some(echo) = parse_echo(text) {
                matched = echo == query;
                if !matched {
                    counter!("romdbg_resolve_desyncs_total").increment(1);
                    trace!(
                        echo = format_args!("{echo:#x}"),
                        query = format_args!("{query:#x}"),
                        "skipping stale response"
                    );
                }
                self.expect_func = matched;
                self.expect_file = false;
                continue;
            }
            if self.expect_func {
                self.expect_func = false;
                self.expect_file = true;
                continue;
            }
            if self.expect_file && matched {
                self.expect_file = false;
                return Ok(parse_location_line(text));
            }
        }
        Ok(None)
    }
}

/// Resolves addresses to source locations through an external helper.
///
/// One resolver owns at most one helper process. Not reentrant: there is a
/// single outstanding-query slot.
pub struct Resolver {
    locator: Box<dyn HelperLocator>,
    helper_name: String,
    load_bias: u64,
    state: ResolverState,
    helper: Option<Helper>,
}

impl Resolver {
    /// Create a stopped resolver using `locator` to find the helper binary.
    pub fn new(locator: impl HelperLocator + 'static) -> Self {
        Self {
            locator: Box::new(locator),
            helper_name: DEFAULT_HELPER.to_string(),
            load_bias: 0,
            state: ResolverState::Stopped,
            helper: None,
        }
    }

    /// Use a different tool name when locating the helper.
    #[must_use]
    pub fn with_helper_name(mut self, name: impl Into<String>) -> Self {
        self.helper_name = name.into();
        self
    }

    /// Replace the locator. Takes effect on the next spawn.
    pub fn set_locator(&mut self, locator: impl HelperLocator + 'static) {
        self.locator = Box::new(locator);
    }

    /// Runtime base of the image's code segment.
    pub const fn set_load_bias(&mut self, bias: u64) {
        self.load_bias = bias;
    }

    #[must_use]
    pub const fn load_bias(&self) -> u64 {
        self.load_bias
    }

    #[must_use]
    pub const fn state(&self) -> ResolverState {
        self.state
    }

    /// Image the running helper was started for.
    #[must_use]
    pub fn image(&self) -> Option<&Path> {
        self.helper.as_ref().map(|h| h.image.as_path())
    }

    /// OS process id of the running helper.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.helper.as_ref().map(|h| h.child.id())
    }

    /// Whether a helper is running for exactly this image.
    #[must_use]
    pub fn is_ready_for(&self, image: &Path) -> bool {
        self.state == ResolverState::Ready && self.image() == Some(image)
    }

    /// Start the helper for `image`.
    ///
    /// Does nothing if a helper is already running for the same image. Any
    /// previous helper is stopped first.
    ///
    /// # Errors
    ///
    /// Returns an error if the image path is empty, the helper cannot be
    /// located, or the process cannot be spawned. The resolver is left
    /// stopped in that case.
    pub fn start(&mut self, image: &Path) -> Result<()> {
        if image.as_os_str().is_empty() {
            return Err(ResolverError::EmptyImagePath);
        }
        if self.is_ready_for(image) {
            return Ok(());
        }
        self.stop();

        self.state = ResolverState::Starting;
        match self.spawn(image) {
            Ok(helper) => {
                debug!(image = %image.display(), pid = helper.child.id(), "helper started");
                self.helper = Some(helper);
                self.state = ResolverState::Ready;
                Ok(())
            }
            Err(err) => {
                debug!(image = %image.display(), error = %err, "helper failed to start");
                self.state = ResolverState::Stopped;
                Err(err)
            }
        }
    }

    fn spawn(&self, image: &Path) -> Result<Helper> {
        let program = self
            .locator
            .locate_helper(&self.helper_name)
            .ok_or_else(|| ResolverError::HelperNotFound(self.helper_name.clone()))?;

        let mut child = Command::new(&program)
            .arg("-e")
            .arg(image)
            .args(["-a", "-f", "-C"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ResolverError::Spawn {
                helper: program,
                source,
            })?;

        let (Some(input), Some(output)) = (child.stdin.take(), child.stdout.take()) else {
            terminate(&mut child);
            return Err(ResolverError::MissingPipe);
        };

        counter!("romdbg_helper_spawns_total").increment(1);
        Ok(Helper {
            child,
            input,
            output: BufReader::new(output),
            image: image.to_path_buf(),
            expect_func: false,
            expect_file: false,
        })
    }

    /// Resolve a runtime address to its source location.
    ///
    /// Blocks until the helper answers or [`MAX_RESPONSE_LINES`] lines have
    /// been consumed. Returns `None` when the location is unknown for any
    /// reason. A stream failure stops the resolver so the next
    /// [`start`](Self::start) spawns a fresh helper.
    pub fn resolve(&mut self, address: u64) -> Option<ResolvedLocation> {
        let query = query_address(address, self.load_bias);
        let helper = self.helper.as_mut()?;

        counter!("romdbg_resolve_queries_total").increment(1);
        match helper.exchange(query) {
            Ok(Some(location)) => {
                counter!("romdbg_resolve_hits_total").increment(1);
                Some(location)
            }
            Ok(None) => None,
            Err(err) => {
                debug!(error = %err, query = format_args!("{query:#x}"), "helper stream failed");
                self.stop();
                None
            }
        }
    }

    /// Terminate the helper and release its streams. Safe when stopped.
    pub fn stop(&mut self) {
        if let Some(helper) = self.helper.take() {
            let Helper {
                mut child,
                input,
                output,
                ..
            } = helper;
            drop(input);
            drop(output);
            terminate(&mut child);
            debug!("helper stopped");
        }
        self.state = ResolverState::Stopped;
    }
}

impl Drop for Resolver {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    match i32::try_from(child.id()) {
        Ok(pid) => {
            let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
        }
        Err(_) => {
            let _ = child.kill();
        }
    }
    let _ = child.wait();
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
