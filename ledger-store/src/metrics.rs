//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `ledger_raw_transactions_total` - Raw transactions recorded
//! - `ledger_pairs_matched_total` - Transaction pairs matched
//! - `ledger_pairs_unmatched_total` - Transaction pairs unmatched
//! - `ledger_rollbacks_total` - Multi-step writes rolled back
//! - `ledger_discrepancies_total` - Reconciliation discrepancies found
//! - `ledger_reconciliation_duration_seconds` - Reconciliation scan latency

use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};
use std::sync::Arc;

/// Metrics collector
///
/// Counters live in their own registry, not the process-global one, so
/// several collectors can coexist (one per test, one per store).
#[derive(Clone)]
pub struct Metrics {
    /// Raw transactions recorded
    pub raw_transactions_total: IntCounter,

    /// Pairs matched
    pub pairs_matched_total: IntCounter,

    /// Pairs unmatched
    pub pairs_unmatched_total: IntCounter,

    /// Multi-step writes rolled back
    pub rollbacks_total: IntCounter,

    /// Discrepancies found
    pub discrepancies_total: IntCounter,

    /// Reconciliation scan latency
    pub reconciliation_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let raw_transactions_total = IntCounter::new(
            "ledger_raw_transactions_total",
            "Raw transactions recorded",
        )?;
        registry.register(Box::new(raw_transactions_total.clone()))?;

        let pairs_matched_total =
            IntCounter::new("ledger_pairs_matched_total", "Transaction pairs matched")?;
        registry.register(Box::new(pairs_matched_total.clone()))?;

        let pairs_unmatched_total =
            IntCounter::new("ledger_pairs_unmatched_total", "Transaction pairs unmatched")?;
        registry.register(Box::new(pairs_unmatched_total.clone()))?;

        let rollbacks_total =
            IntCounter::new("ledger_rollbacks_total", "Multi-step writes rolled back")?;
        registry.register(Box::new(rollbacks_total.clone()))?;

        let discrepancies_total = IntCounter::new(
            "ledger_discrepancies_total",
            "Reconciliation discrepancies found",
        )?;
        registry.register(Box::new(discrepancies_total.clone()))?;

        let reconciliation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_reconciliation_duration_seconds",
                "Reconciliation scan latency",
            )
            .buckets(vec![
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0,
            ]),
        )?;
        registry.register(Box::new(reconciliation_duration.clone()))?;

        Ok(Self {
            raw_transactions_total,
            pairs_matched_total,
            pairs_unmatched_total,
            rollbacks_total,
            discrepancies_total,
            reconciliation_duration,
            registry,
        })
    }

    /// Record a raw transaction insert
    pub fn record_raw_transaction(&self) {
        self.raw_transactions_total.inc();
    }

    /// Record a matched pair
    pub fn record_pair_matched(&self) {
        self.pairs_matched_total.inc();
    }

    /// Record an unmatched pair
    pub fn record_pair_unmatched(&self) {
        self.pairs_unmatched_total.inc();
    }

    /// Record a rollback
    pub fn record_rollback(&self) {
        self.rollbacks_total.inc();
    }

    /// Record discrepancies found by one scan
    pub fn record_discrepancies(&self, count: usize) {
        self.discrepancies_total.inc_by(count as u64);
    }

    /// Record reconciliation scan duration
    pub fn record_reconciliation_duration(&self, duration_seconds: f64) {
        self.reconciliation_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}
