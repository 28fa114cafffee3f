//! Interface to the execution engine that actually arms breakpoints/guards.
//!
//! The engine keeps its own address-keyed copy purely for triggering. The
//! store is authoritative and pushes to the engine; it never reads back.

use rustc_hash::FxHashSet;

use crate::guard::{MAX_GUARDS, MemoryGuard};

/// Operations the session pushes to the execution engine.
///
/// All addresses are already masked to 24 bits.
pub trait ExecutionEngine {
    fn add_breakpoint(&mut self, address: u32);

    fn remove_breakpoint(&mut self, address: u32);

    /// Insert a guard, returning its index (the bit it occupies in the
    /// enable mask), or `None` if the engine rejected it.
    fn add_guard(&mut self, guard: &MemoryGuard) -> Option<usize>;

    /// Enable exactly the guards whose index bit is set.
    fn set_guard_enabled_mask(&mut self, mask: u64);

    fn clear_all_breakpoints(&mut self);

    fn clear_guards(&mut self);
}

/// In-memory engine shadow.
///
/// Used where no real engine is attached (the command-line tool) and to
/// observe what a session pushed.
#[derive(Debug, Clone, Default)]
pub struct ShadowEngine {
    breakpoints: FxHashSet<u32>,
    guards: Vec<MemoryGuard>,
    guard_mask: u64,
}

impl ShadowEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Armed breakpoint addresses, ascending.
    #[must_use]
    pub fn breakpoints(&self) -> Vec<u32> {
        let mut addrs: Vec<u32> = self.breakpoints.iter().copied().collect();
        addrs.sort_unstable();
        addrs
    }

    #[must_use]
    pub fn has_breakpoint(&self, address: u32) -> bool {
        self.breakpoints.contains(&address)
    }

    #[must_use]
    pub fn guards(&self) -> &[MemoryGuard] {
        &self.guards
    }

    #[must_use]
    pub const fn guard_mask(&self) -> u64 {
        self.guard_mask
    }
}

impl ExecutionEngine for ShadowEngine {
    fn add_breakpoint(&mut self, address: u32) {
        self.breakpoints.insert(address);
    }

    fn remove_breakpoint(&mut self, address: u32) {
        self.breakpoints.remove(&address);
    }

    fn add_guard(&mut self, guard: &MemoryGuard) -> Option<usize> {
        if self.guards.len() >= MAX_GUARDS {
            return None;
        }
        // Enablement comes only from the mask.
        self.guards.push(guard.with_enabled(false));
        Some(self.guards.len() - 1)
    }

    fn set_guard_enabled_mask(&mut self, mask: u64) {
        self.guard_mask = mask;
        for (i, guard) in self.guards.iter_mut().enumerate() {
            guard.enabled = mask & (1u64 << i) != 0;
        }
    }

    fn clear_all_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    fn clear_guards(&mut self) {
        self.guards.clear();
        self.guard_mask = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::GuardSize;

    #[test]
    fn test_breakpoint_shadow() {
        let mut engine = ShadowEngine::new();
        engine.add_breakpoint(0x2000);
        engine.add_breakpoint(0x1000);
        engine.add_breakpoint(0x1000);
        assert_eq!(engine.breakpoints(), vec![0x1000, 0x2000]);

        engine.remove_breakpoint(0x2000);
        assert!(!engine.has_breakpoint(0x2000));

        engine.clear_all_breakpoints();
        assert!(engine.breakpoints().is_empty());
    }

    #[test]
    fn test_guard_mask_applied_by_index() {
        let mut engine = ShadowEngine::new();
        let a = engine.add_guard(&MemoryGuard::block_write(0x10, GuardSize::Byte));
        let b = engine.add_guard(&MemoryGuard::block_write(0x20, GuardSize::Byte));
        assert_eq!((a, b), (Some(0), Some(1)));
        assert!(engine.guards().iter().all(|g| !g.enabled));

        engine.set_guard_enabled_mask(0b10);
        assert!(!engine.guards()[0].enabled);
        assert!(engine.guards()[1].enabled);

        engine.clear_guards();
        assert!(engine.guards().is_empty());
        assert_eq!(engine.guard_mask(), 0);
    }

    #[test]
    fn test_guard_capacity() {
        let mut engine = ShadowEngine::new();
        for i in 0..MAX_GUARDS {
            let addr = u32::try_from(i).unwrap();
            assert!(engine.add_guard(&MemoryGuard::block_write(addr, GuardSize::Byte)).is_some());
        }
        assert!(engine.add_guard(&MemoryGuard::block_write(0x999, GuardSize::Byte)).is_none());
    }
}
