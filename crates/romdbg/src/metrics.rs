//! Metrics collection and reporting using metrics-rs.
//!
//! The library crates only emit counters; installing a recorder is up to the
//! host. [`CliRecorder`] keeps them in memory for a terminal summary.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::{
    Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit,
    describe_counter,
};
use parking_lot::RwLock;

// ============================================================================
// Metric descriptions
// ============================================================================

/// Register metric descriptions. Call once at startup.
pub fn init() {
    describe_counter!(
        "romdbg_resolve_queries_total",
        Unit::Count,
        "Addresses sent to the location helper"
    );
    describe_counter!(
        "romdbg_resolve_hits_total",
        Unit::Count,
        "Queries answered with a file and line"
    );
    describe_counter!(
        "romdbg_resolve_desyncs_total",
        Unit::Count,
        "Stale helper echoes discarded"
    );
    describe_counter!(
        "romdbg_helper_spawns_total",
        Unit::Count,
        "Location helper processes started"
    );
    describe_counter!(
        "romdbg_boot_loads_total",
        Unit::Count,
        "Session record boot loads, by outcome"
    );
}

// ============================================================================
// CLI Recorder for terminal output
// ============================================================================

type CounterStorage = RwLock<HashMap<String, Arc<AtomicU64>>>;

/// Counter handle backed by a shared atomic.
struct CliCounter(Arc<AtomicU64>);

impl metrics::CounterFn for CliCounter {
    fn increment(&self, value: u64) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }

    fn absolute(&self, value: u64) {
        self.0.fetch_max(value, Ordering::Relaxed);
    }
}

/// Recorder that keeps counters in memory for a terminal summary.
///
/// Gauges and histograms are accepted and dropped.
#[derive(Default)]
pub struct CliRecorder {
    counters: Arc<CounterStorage>,
}

impl CliRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install this recorder as the global metrics recorder.
    ///
    /// Returns `None` if a recorder is already installed.
    #[must_use]
    pub fn install(self) -> Option<CliRecorderHandle> {
        let counters = Arc::clone(&self.counters);
        metrics::set_global_recorder(self).ok()?;
        Some(CliRecorderHandle { counters })
    }

    fn counter_cell(&self, key: String) -> Arc<AtomicU64> {
        if let Some(cell) = self.counters.read().get(&key) {
            return Arc::clone(cell);
        }
        Arc::clone(self.counters.write().entry(key).or_default())
    }
}

fn key_to_string(key: &Key) -> String {
    let name = key.name();
    let labels: Vec<String> = key
        .labels()
        .map(|l| format!("{}={}", l.key(), l.value()))
        .collect();
    if labels.is_empty() {
        name.to_string()
    } else {
        format!("{name}{{{}}}", labels.join(","))
    }
}

impl Recorder for CliRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        Counter::from_arc(Arc::new(CliCounter(self.counter_cell(key_to_string(key)))))
    }

    fn register_gauge(&self, _key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, _key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}

/// Handle for reading counters after installing the CLI recorder.
pub struct CliRecorderHandle {
    counters: Arc<CounterStorage>,
}

impl CliRecorderHandle {
    /// Counter value by rendered key (`name{label=value}`).
    #[must_use]
    pub fn get_counter(&self, key: &str) -> Option<u64> {
        self.counters
            .read()
            .get(key)
            .map(|c| c.load(Ordering::Relaxed))
    }

    /// All counters, sorted by key.
    #[must_use]
    pub fn all_counters(&self) -> Vec<(String, u64)> {
        let mut all: Vec<(String, u64)> = self
            .counters
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect();
        all.sort();
        all
    }

    /// Print all counters in a human-readable format.
    pub fn print_summary(&self) {
        let counters = self.all_counters();
        if counters.is_empty() {
            println!("No metrics collected.");
            return;
        }

        println!();
        println!("## Metrics Summary");
        println!();
        println!("### Counters");
        for (key, value) in counters {
            println!("  {key}: {value}");
        }
        println!();
    }
}
