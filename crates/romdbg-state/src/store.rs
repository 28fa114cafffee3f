//! The authoritative breakpoint and guard tables of a session.
//!
//! The store only mutates its own tables. Mirroring a change to the execution
//! engine is the caller's job.

use std::path::{Path, PathBuf};

use romdbg_symbols::Resolver;
use tracing::{debug, trace};

use crate::breakpoint::{Breakpoint, BreakpointId, DisplayFields, mask_address};
use crate::guard::{MAX_GUARDS, MemoryGuard, enabled_mask};
use crate::reconcile::Reconciler;
use crate::{Result, StoreError};

/// Breakpoint and guard tables plus the resolver used to locate them.
pub struct Store {
    breakpoints: Vec<Breakpoint>,
    next_id: u32,
    guards: Vec<MemoryGuard>,
    resolver: Resolver,
    image: Option<PathBuf>,
    reconciler: Reconciler,
}

impl Store {
    #[must_use]
    pub fn new(resolver: Resolver) -> Self {
        Self {
            breakpoints: Vec::new(),
            next_id: 1,
            guards: Vec::new(),
            resolver,
            image: None,
            reconciler: Reconciler::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Image and resolver
    // ------------------------------------------------------------------------

    /// Set the debug image used for location lookups.
    ///
    /// Switching images stops the running helper.
    pub fn set_image(&mut self, image: Option<PathBuf>) {
        if self.image != image {
            self.resolver.stop();
            self.image = image;
        }
    }

    #[must_use]
    pub fn image(&self) -> Option<&Path> {
        self.image.as_deref()
    }

    #[must_use]
    pub const fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub const fn resolver_mut(&mut self) -> &mut Resolver {
        &mut self.resolver
    }

    // ------------------------------------------------------------------------
    // Breakpoints
    // ------------------------------------------------------------------------

    /// Add a breakpoint at `address` (masked to 24 bits).
    ///
    /// Returns the existing breakpoint untouched if one is already there.
    pub fn add(&mut self, address: u32, enabled: bool) -> BreakpointId {
        let address = mask_address(address);
        if let Some(existing) = self.find_by_address(address) {
            return existing.id;
        }
        let id = BreakpointId(self.next_id);
        self.next_id += 1;
        self.breakpoints.push(Breakpoint::new(id, address, enabled));
        trace!(%id, address = format_args!("{address:#08x}"), enabled, "breakpoint added");
        id
    }

    /// Make sure an enabled breakpoint exists at `address`.
    pub fn ensure_enabled_at(&mut self, address: u32) -> BreakpointId {
        let id = self.add(address, true);
        self.set_enabled(id, true);
        id
    }

    #[must_use]
    pub fn get(&self, id: BreakpointId) -> Option<&Breakpoint> {
        self.breakpoints.iter().find(|bp| bp.id == id)
    }

    fn get_mut(&mut self, id: BreakpointId) -> Option<&mut Breakpoint> {
        self.breakpoints.iter_mut().find(|bp| bp.id == id)
    }

    #[must_use]
    pub fn find_by_address(&self, address: u32) -> Option<&Breakpoint> {
        let address = mask_address(address);
        self.breakpoints.iter().find(|bp| bp.address == address)
    }

    /// Live breakpoints in creation order.
    #[must_use]
    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.breakpoints
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    /// Set a breakpoint's enabled flag, returning its address.
    pub fn set_enabled(&mut self, id: BreakpointId, enabled: bool) -> Option<u32> {
        let bp = self.get_mut(id)?;
        bp.enabled = enabled;
        Some(bp.address)
    }

    /// Replace the engine-supplied display fields.
    pub fn set_display_fields(&mut self, id: BreakpointId, fields: DisplayFields) -> bool {
        let Some(bp) = self.get_mut(id) else {
            return false;
        };
        bp.display = fields;
        true
    }

    pub fn remove(&mut self, id: BreakpointId) -> Option<Breakpoint> {
        let pos = self.breakpoints.iter().position(|bp| bp.id == id)?;
        Some(self.breakpoints.remove(pos))
    }

    pub fn remove_by_address(&mut self, address: u32) -> Option<Breakpoint> {
        let id = self.find_by_address(address)?.id;
        self.remove(id)
    }

    /// Remove every breakpoint, returning them. Numbering continues.
    pub fn clear_all(&mut self) -> Vec<Breakpoint> {
        std::mem::take(&mut self.breakpoints)
    }

    /// Disable everything if anything is enabled, otherwise enable everything.
    ///
    /// Returns the new state, or `None` when there are no breakpoints.
    pub fn toggle_all(&mut self) -> Option<bool> {
        if self.breakpoints.is_empty() {
            return None;
        }
        let target = !self.breakpoints.iter().any(|bp| bp.enabled);
        for bp in &mut self.breakpoints {
            bp.enabled = target;
        }
        Some(target)
    }

    /// Fill in a breakpoint's source location.
    ///
    /// Does nothing if the location is already known or no valid image is
    /// configured. A failed lookup leaves the entry unresolved. Returns
    /// whether the location is known afterwards.
    pub fn resolve_location(&mut self, id: BreakpointId) -> bool {
        let Some(bp) = self.breakpoints.iter_mut().find(|bp| bp.id == id) else {
            return false;
        };
        if bp.location.is_resolved() {
            return true;
        }
        let Some(image) = self.image.as_deref().filter(|p| p.is_file()) else {
            return false;
        };
        if let Err(err) = self.resolver.start(image) {
            debug!(error = %err, "location lookup unavailable");
            return false;
        }
        match self.resolver.resolve(u64::from(bp.address)) {
            Some(location) => {
                bp.location = location;
                true
            }
            None => false,
        }
    }

    /// Resolve every breakpoint that still lacks a location.
    pub fn resolve_all(&mut self) -> usize {
        let ids: Vec<BreakpointId> = self.breakpoints.iter().map(|bp| bp.id).collect();
        ids.into_iter()
            .filter(|&id| self.resolve_location(id))
            .count()
    }

    // ------------------------------------------------------------------------
    // Guards
    // ------------------------------------------------------------------------

    /// Append a guard, returning its index.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::GuardTableFull`] once [`MAX_GUARDS`] are held.
    pub fn add_guard(&mut self, guard: MemoryGuard) -> Result<usize> {
        if self.guards.len() >= MAX_GUARDS {
            return Err(StoreError::GuardTableFull);
        }
        self.guards.push(MemoryGuard {
            address: mask_address(guard.address),
            ..guard
        });
        Ok(self.guards.len() - 1)
    }

    /// Guards in insertion order.
    #[must_use]
    pub fn guards(&self) -> &[MemoryGuard] {
        &self.guards
    }

    #[must_use]
    pub fn guard(&self, index: usize) -> Option<&MemoryGuard> {
        self.guards.get(index)
    }

    /// # Errors
    ///
    /// Returns [`StoreError::NoSuchGuard`] for an out-of-range index.
    pub fn set_guard_enabled(&mut self, index: usize, enabled: bool) -> Result<()> {
        let guard = self
            .guards
            .get_mut(index)
            .ok_or(StoreError::NoSuchGuard(index))?;
        guard.enabled = enabled;
        Ok(())
    }

    /// Remove a guard. Later guards shift down one index.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoSuchGuard`] for an out-of-range index.
    pub fn remove_guard(&mut self, index: usize) -> Result<MemoryGuard> {
        if index >= self.guards.len() {
            return Err(StoreError::NoSuchGuard(index));
        }
        Ok(self.guards.remove(index))
    }

    pub fn clear_guards(&mut self) {
        self.guards.clear();
    }

    /// Enable bitmask in insertion order.
    #[must_use]
    pub fn guard_enabled_mask(&self) -> u64 {
        enabled_mask(&self.guards)
    }

    // ------------------------------------------------------------------------
    // Change detection
    // ------------------------------------------------------------------------

    /// Reconcile the side cache against the live breakpoints.
    ///
    /// Returns `true` if anything changed since the previous call.
    pub fn reconcile(&mut self) -> bool {
        self.reconciler.update(&self.breakpoints)
    }

    /// Breakpoints as of the last [`reconcile`](Self::reconcile).
    pub fn reconciled(&self) -> impl Iterator<Item = &Breakpoint> {
        self.reconciler.present()
    }
}
