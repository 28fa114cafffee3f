//! Source locations and the addr2line response line grammar.
//!
//! The helper answers every query with three lines:
//!
//! ```text
//! 0x00001000          <- echo of the queried address
//! main                <- function name (ignored)
//! /src/main.c:42      <- location, split at the last colon
//! ```

/// A source location derived for an address.
///
/// Either field may be missing; a location is only considered resolved once
/// both the file and a positive line number are known.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ResolvedLocation {
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl ResolvedLocation {
    /// Location with both file and line known.
    #[must_use]
    pub fn known(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: Some(file.into()),
            line: (line > 0).then_some(line),
        }
    }

    /// Whether both file and line are known.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.file.is_some() && self.line.is_some()
    }

    /// Forget any partially derived location.
    pub fn clear(&mut self) {
        self.file = None;
        self.line = None;
    }
}

/// Parse an address echo line (`0x` followed by hex digits only).
#[must_use]
pub fn parse_echo(line: &str) -> Option<u64> {
    let digits = line
        .strip_prefix("0x")
        .or_else(|| line.strip_prefix("0X"))?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

/// Parse a `path:line` location line.
///
/// Splits at the last colon. Trailing annotations such as
/// `(discriminator 1)` are ignored. A missing, zero or non-numeric line means
/// no location.
#[must_use]
pub fn parse_location_line(line: &str) -> Option<ResolvedLocation> {
    let colon = line.rfind(':')?;
    let file = &line[..colon];
    let line_no = line[colon + 1..]
        .split_whitespace()
        .next()?
        .parse::<u32>()
        .ok()
        .filter(|&n| n > 0)?;
    if file.is_empty() || file == "??" {
        return None;
    }
    Some(ResolvedLocation::known(file, line_no))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_location_valid() {
        let loc = parse_location_line("/path/to/file.c:42").unwrap();
        assert_eq!(loc.file.as_deref(), Some("/path/to/file.c"));
        assert_eq!(loc.line, Some(42));
        assert!(loc.is_resolved());
    }

    #[test]
    fn test_parse_location_with_discriminator() {
        let loc = parse_location_line("/path/file.c:10 (discriminator 1)").unwrap();
        assert_eq!(loc.line, Some(10));
    }

    #[test]
    fn test_parse_location_splits_at_last_colon() {
        let loc = parse_location_line("C:/work/game/main.c:7").unwrap();
        assert_eq!(loc.file.as_deref(), Some("C:/work/game/main.c"));
        assert_eq!(loc.line, Some(7));
    }

    #[test]
    fn test_parse_location_unknown() {
        assert!(parse_location_line("??:0").is_none());
        assert!(parse_location_line("??:?").is_none());
        assert!(parse_location_line("/src/main.c:abc").is_none());
        assert!(parse_location_line("no colon here").is_none());
    }

    #[test]
    fn test_parse_echo() {
        assert_eq!(parse_echo("0x1000"), Some(0x1000));
        assert_eq!(parse_echo("0X00000000000ABC"), Some(0xabc));
        assert_eq!(parse_echo("0x"), None);
        assert_eq!(parse_echo("0x12g4"), None);
        assert_eq!(parse_echo("main"), None);
    }

    #[test]
    fn test_known_rejects_zero_line() {
        let loc = ResolvedLocation::known("a.c", 0);
        assert!(!loc.is_resolved());
    }
}
