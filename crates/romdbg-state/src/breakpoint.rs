//! Breakpoint entries.

use std::fmt;

use romdbg_symbols::ResolvedLocation;

/// Addressable range of the target architecture (24-bit).
pub const ADDRESS_MASK: u32 = 0x00ff_ffff;

/// Mask an address to the target's 24-bit range.
#[must_use]
pub const fn mask_address(address: u32) -> u32 {
    address & ADDRESS_MASK
}

/// Breakpoint number, unique within one store and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakpointId(pub u32);

impl fmt::Display for BreakpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Display fields supplied by the execution engine.
///
/// Passed through untouched; only used when formatting entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayFields {
    pub function: String,
    pub kind: String,
    pub disposition: String,
    pub condition: String,
    pub address_text: String,
}

impl DisplayFields {
    /// Fields for a freshly added code breakpoint.
    #[must_use]
    pub fn for_address(address: u32) -> Self {
        Self {
            function: String::new(),
            kind: "breakpoint".to_string(),
            disposition: "keep".to_string(),
            condition: String::new(),
            address_text: format!("0x{address:06X}"),
        }
    }
}

/// A code breakpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: BreakpointId,
    pub enabled: bool,
    /// 24-bit masked address.
    pub address: u32,
    /// Source location, derived lazily and never persisted.
    pub location: ResolvedLocation,
    pub display: DisplayFields,
}

impl Breakpoint {
    pub(crate) fn new(id: BreakpointId, address: u32, enabled: bool) -> Self {
        let address = mask_address(address);
        Self {
            id,
            enabled,
            address,
            location: ResolvedLocation::default(),
            display: DisplayFields::for_address(address),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_address() {
        assert_eq!(mask_address(0xff12_3456), 0x0012_3456);
        assert_eq!(mask_address(0x00ff_ffff), 0x00ff_ffff);
    }

    #[test]
    fn test_new_breakpoint_defaults() {
        let bp = Breakpoint::new(BreakpointId(3), 0x8100_0abc, true);
        assert_eq!(bp.address, 0x0000_0abc);
        assert_eq!(bp.display.address_text, "0x000ABC");
        assert_eq!(bp.display.kind, "breakpoint");
        assert_eq!(bp.display.disposition, "keep");
        assert!(!bp.location.is_resolved());
        assert_eq!(bp.id.to_string(), "#3");
    }
}
