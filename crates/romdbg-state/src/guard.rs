//! Memory guards ("protects").
//!
//! A guard either blocks writes to an address or forces a fixed value there.
//! Guards have no identity beyond their insertion index; the engine tracks
//! their enablement as one bitmask in insertion order.

use crate::breakpoint::mask_address;
use crate::StoreError;

/// Maximum number of guards (one bit each in the enable mask).
pub const MAX_GUARDS: usize = 64;

/// What a guard does to writes at its address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardMode {
    /// Discard writes.
    BlockWrite,
    /// Keep the address pinned to a value.
    ForceValue,
}

impl GuardMode {
    /// Numeric code used on the wire and by the engine.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::BlockWrite => 0,
            Self::ForceValue => 1,
        }
    }
}

impl TryFrom<u32> for GuardMode {
    type Error = StoreError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::BlockWrite),
            1 => Ok(Self::ForceValue),
            other => Err(StoreError::InvalidGuardMode(other)),
        }
    }
}

/// Width of the guarded access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardSize {
    Byte,
    Word,
    Long,
}

impl GuardSize {
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::Byte => 8,
            Self::Word => 16,
            Self::Long => 32,
        }
    }
}

impl TryFrom<u32> for GuardSize {
    type Error = StoreError;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        match bits {
            8 => Ok(Self::Byte),
            16 => Ok(Self::Word),
            32 => Ok(Self::Long),
            other => Err(StoreError::InvalidGuardSize(other)),
        }
    }
}

/// A memory guard rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryGuard {
    /// 24-bit masked address.
    pub address: u32,
    pub size: GuardSize,
    pub mode: GuardMode,
    /// Forced value; carried but unused for [`GuardMode::BlockWrite`].
    pub value: u32,
    pub enabled: bool,
}

impl MemoryGuard {
    #[must_use]
    pub const fn block_write(address: u32, size: GuardSize) -> Self {
        Self {
            address: mask_address(address),
            size,
            mode: GuardMode::BlockWrite,
            value: 0,
            enabled: true,
        }
    }

    #[must_use]
    pub const fn force_value(address: u32, size: GuardSize, value: u32) -> Self {
        Self {
            address: mask_address(address),
            size,
            mode: GuardMode::ForceValue,
            value,
            enabled: true,
        }
    }

    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Enable bitmask over guards in insertion order.
#[must_use]
pub fn enabled_mask(guards: &[MemoryGuard]) -> u64 {
    guards
        .iter()
        .take(MAX_GUARDS)
        .enumerate()
        .filter(|(_, g)| g.enabled)
        .fold(0, |mask, (i, _)| mask | (1u64 << i))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_codes() {
        assert_eq!(GuardMode::try_from(1).unwrap(), GuardMode::ForceValue);
        assert_eq!(GuardMode::BlockWrite.code(), 0);
        assert!(matches!(
            GuardMode::try_from(7),
            Err(StoreError::InvalidGuardMode(7))
        ));
        assert_eq!(GuardSize::try_from(16).unwrap().bits(), 16);
        assert!(GuardSize::try_from(24).is_err());
    }

    #[test]
    fn test_enabled_mask_follows_insertion_order() {
        let guards = [
            MemoryGuard::block_write(0x10_0000, GuardSize::Byte),
            MemoryGuard::block_write(0x10_0002, GuardSize::Word).with_enabled(false),
            MemoryGuard::force_value(0x10_0004, GuardSize::Long, 99),
        ];
        assert_eq!(enabled_mask(&guards), 0b101);
    }

    #[test]
    fn test_guard_address_masked() {
        let g = MemoryGuard::force_value(0xff10_0000, GuardSize::Byte, 1);
        assert_eq!(g.address, 0x10_0000);
    }
}
