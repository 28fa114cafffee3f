//! Text for breakpoint list entries.

use crate::breakpoint::Breakpoint;

/// Strip the configured source root from a resolved path.
///
/// Returns the path unchanged if it does not start with `root` at a path
/// boundary or if nothing would be left.
#[must_use]
pub fn strip_source_root<'a>(path: &'a str, root: Option<&str>) -> &'a str {
    let Some(root) = root.filter(|r| !r.is_empty()) else {
        return path;
    };
    let Some(rest) = path.strip_prefix(root) else {
        return path;
    };
    let rest = match rest.strip_prefix(['/', '\\']) {
        Some(rest) => rest,
        None if root.ends_with(['/', '\\']) => rest,
        None => return path,
    };
    if rest.is_empty() { path } else { rest }
}

/// Best available description of where a breakpoint is.
///
/// Prefers `file:line`, then `function()`, then the engine's textual address.
#[must_use]
pub fn format_location(bp: &Breakpoint, source_root: Option<&str>) -> String {
    if let (Some(file), Some(line)) = (bp.location.file.as_deref(), bp.location.line) {
        if !file.is_empty() {
            return format!("{}:{line}", strip_source_root(file, source_root));
        }
    }
    if !bp.display.function.is_empty() {
        return format!("{}()", bp.display.function);
    }
    if !bp.display.address_text.is_empty() {
        return bp.display.address_text.clone();
    }
    if bp.address != 0 {
        return format!("0x{:X}", bp.address);
    }
    "<unknown>".to_string()
}

/// `enabled`/`disabled` plus any non-default disposition or kind.
#[must_use]
pub fn format_state(bp: &Breakpoint) -> String {
    let mut parts = vec![if bp.enabled { "enabled" } else { "disabled" }];
    if !bp.display.disposition.is_empty() && bp.display.disposition != "keep" {
        parts.push(&bp.display.disposition);
    }
    if !bp.display.kind.is_empty() && bp.display.kind != "breakpoint" {
        parts.push(&bp.display.kind);
    }
    parts.join(", ")
}

/// One-line list entry: `#1 main.c:42 (enabled)`.
#[must_use]
pub fn format_entry(bp: &Breakpoint, source_root: Option<&str>) -> String {
    format!(
        "{} {} ({})",
        bp.id,
        format_location(bp, source_root),
        format_state(bp)
    )
}

#[cfg(test)]
mod tests {
    use romdbg_symbols::ResolvedLocation;

    use super::*;
    use crate::breakpoint::BreakpointId;

    fn bp() -> Breakpoint {
        Breakpoint::new(BreakpointId(1), 0x1000, true)
    }

    #[test]
    fn test_strip_source_root() {
        assert_eq!(strip_source_root("/src/game/main.c", Some("/src/game")), "main.c");
        assert_eq!(strip_source_root("/src/game/main.c", Some("/src/game/")), "main.c");
        assert_eq!(strip_source_root("/other/main.c", Some("/src/game")), "/other/main.c");
        assert_eq!(strip_source_root("/src/game", Some("/src/game")), "/src/game");
        assert_eq!(strip_source_root("/src/main.c", None), "/src/main.c");
        assert_eq!(strip_source_root("C:\\game\\irq.c", Some("C:\\game")), "irq.c");
    }

    #[test]
    fn test_strip_source_root_needs_path_boundary() {
        assert_eq!(
            strip_source_root("/src/gamefoo/main.c", Some("/src/game")),
            "/src/gamefoo/main.c"
        );
        assert_eq!(strip_source_root("/src/gamefoo/main.c", Some("/src/")), "gamefoo/main.c");
    }

    #[test]
    fn test_format_location_preference() {
        let mut b = bp();
        assert_eq!(format_location(&b, None), "0x001000");

        b.display.address_text.clear();
        assert_eq!(format_location(&b, None), "0x1000");

        b.display.function = "vblank".to_string();
        assert_eq!(format_location(&b, None), "vblank()");

        b.location = ResolvedLocation::known("/src/game/irq.c", 12);
        assert_eq!(format_location(&b, Some("/src/game")), "irq.c:12");
    }

    #[test]
    fn test_format_state() {
        let mut b = bp();
        assert_eq!(format_state(&b), "enabled");
        b.enabled = false;
        b.display.disposition = "del".to_string();
        b.display.kind = "hw watchpoint".to_string();
        assert_eq!(format_state(&b), "disabled, del, hw watchpoint");
    }

    #[test]
    fn test_format_entry() {
        assert_eq!(format_entry(&bp(), None), "#1 0x001000 (enabled)");
    }
}
