//! Change detection between the live breakpoint table and a poller's copy.
//!
//! Pollers (list views, remote mirrors) keep a [`Reconciler`] and call
//! [`Reconciler::update`] each tick; it reports whether anything they render
//! from actually changed, so they can skip rebuilding otherwise.

use rustc_hash::FxHashMap;

use crate::breakpoint::{Breakpoint, BreakpointId};

#[derive(Debug, Clone)]
struct Record {
    snapshot: Breakpoint,
    present: bool,
}

/// Side cache of breakpoint snapshots tagged present/absent.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    records: Vec<Record>,
    index: FxHashMap<BreakpointId, usize>,
}

impl Reconciler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile against the live list. Returns `true` if anything changed
    /// since the previous pass: an entry was added, removed, or differs in
    /// any field.
    pub fn update(&mut self, live: &[Breakpoint]) -> bool {
        let mut changed = false;

        for record in &mut self.records {
            record.present = false;
        }

        for bp in live {
            if let Some(&i) = self.index.get(&bp.id) {
                let record = &mut self.records[i];
                record.present = true;
                if record.snapshot != *bp {
                    record.snapshot.clone_from(bp);
                    changed = true;
                }
            } else {
                self.index.insert(bp.id, self.records.len());
                self.records.push(Record {
                    snapshot: bp.clone(),
                    present: true,
                });
                changed = true;
            }
        }

        // Every surviving record was present last pass, so anything unmarked
        // now is a removal.
        if self.records.iter().any(|r| !r.present) {
            changed = true;
            self.records.retain(|r| r.present);
            self.index = self
                .records
                .iter()
                .enumerate()
                .map(|(i, r)| (r.snapshot.id, i))
                .collect();
        }

        changed
    }

    /// Snapshots present after the last pass, in first-seen order.
    pub fn present(&self) -> impl Iterator<Item = &Breakpoint> {
        self.records
            .iter()
            .filter(|r| r.present)
            .map(|r| &r.snapshot)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Forget all snapshots; the next pass reports a change if anything is live.
    pub fn reset(&mut self) {
        self.records.clear();
        self.index.clear();
    }
}
