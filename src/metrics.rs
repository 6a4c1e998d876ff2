/// Metrics - Prometheus instrumentation
///
/// Global registry with node RPC, cache and classification metrics, plus a
/// small helper API so call sites never touch the metric objects directly.

use std::time::Instant;

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

/// Standard latency buckets for histograms (seconds)
const LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0];

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ========================================================================
    // Node RPC
    // ========================================================================

    /// Labels: method
    pub static ref RPC_CALLS: IntCounterVec = IntCounterVec::new(
        Opts::new("scriptscan_rpc_calls_total", "Node RPC calls by method"),
        &["method"]
    ).unwrap();

    /// Labels: method, kind (transport, rpc, json, ...)
    pub static ref RPC_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("scriptscan_rpc_errors_total", "Failed node RPC calls by method and error kind"),
        &["method", "kind"]
    ).unwrap();

    /// Labels: method
    pub static ref RPC_CALL_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("scriptscan_rpc_call_duration_seconds", "Node RPC call latency")
            .buckets(LATENCY_BUCKETS.to_vec()),
        &["method"]
    ).unwrap();

    // ========================================================================
    // Cache
    // ========================================================================

    /// Labels: cache (block_by_height, block_by_hash, tx)
    pub static ref CACHE_HITS: IntCounterVec = IntCounterVec::new(
        Opts::new("scriptscan_cache_hits_total", "Cache hits by cache"),
        &["cache"]
    ).unwrap();

    /// Labels: cache (block_by_height, block_by_hash, tx)
    pub static ref CACHE_MISSES: IntCounterVec = IntCounterVec::new(
        Opts::new("scriptscan_cache_misses_total", "Cache misses by cache, expired entries included"),
        &["cache"]
    ).unwrap();

    /// Labels: cache
    pub static ref CACHE_ENTRIES: IntGaugeVec = IntGaugeVec::new(
        Opts::new("scriptscan_cache_entries", "Entries currently held by cache"),
        &["cache"]
    ).unwrap();

    // ========================================================================
    // Classification
    // ========================================================================

    /// Labels: spend_type
    pub static ref INPUTS_CLASSIFIED: IntCounterVec = IntCounterVec::new(
        Opts::new("scriptscan_inputs_classified_total", "Inputs classified by spend type"),
        &["spend_type"]
    ).unwrap();

    /// Labels: output_type
    pub static ref OUTPUTS_CLASSIFIED: IntCounterVec = IntCounterVec::new(
        Opts::new("scriptscan_outputs_classified_total", "Outputs classified by output type"),
        &["output_type"]
    ).unwrap();
}

/// Register every metric with the global registry. Call once at startup.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(RPC_CALLS.clone()))?;
    REGISTRY.register(Box::new(RPC_ERRORS.clone()))?;
    REGISTRY.register(Box::new(RPC_CALL_DURATION.clone()))?;

    REGISTRY.register(Box::new(CACHE_HITS.clone()))?;
    REGISTRY.register(Box::new(CACHE_MISSES.clone()))?;
    REGISTRY.register(Box::new(CACHE_ENTRIES.clone()))?;

    REGISTRY.register(Box::new(INPUTS_CLASSIFIED.clone()))?;
    REGISTRY.register(Box::new(OUTPUTS_CLASSIFIED.clone()))?;
    Ok(())
}

/// Gather metrics in Prometheus text format
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

// ============================================================================
// Helpers
// ============================================================================

pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

pub fn observe_rpc_call(method: &str, seconds: f64) {
    RPC_CALLS.with_label_values(&[method]).inc();
    RPC_CALL_DURATION.with_label_values(&[method]).observe(seconds);
}

pub fn increment_rpc_errors(method: &str, kind: &str) {
    RPC_ERRORS.with_label_values(&[method, kind]).inc();
}

pub fn record_cache_lookup(cache: &str, hit: bool) {
    if hit {
        CACHE_HITS.with_label_values(&[cache]).inc();
    } else {
        CACHE_MISSES.with_label_values(&[cache]).inc();
    }
}

pub fn set_cache_entries(cache: &str, entries: usize) {
    CACHE_ENTRIES.with_label_values(&[cache]).set(entries as i64);
}

pub fn record_classified_tx(tx: &crate::tx::Tx) {
    for input in tx.inputs() {
        let label = input.spend_type().map(|t| t.as_str()).unwrap_or("Unknown");
        INPUTS_CLASSIFIED.with_label_values(&[label]).inc();
    }
    for output in tx.outputs() {
        OUTPUTS_CLASSIFIED
            .with_label_values(&[output.output_type().as_str()])
            .inc();
    }
}
