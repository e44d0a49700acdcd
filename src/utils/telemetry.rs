//! Telemetry Module for Ruster Swap
//!
//! Collects anonymous counters about engine activity for:
//! - The `/v1/stats` endpoint
//! - Security monitoring (whitelist violations, rate limiting, risk overrides)
//! - A JSON snapshot written on shutdown
//!
//! Privacy-first: no wallet addresses, amounts or transaction hashes are stored.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::models::types::SimulationErrorCategory;

/// Security-relevant event kinds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SecurityEventKind {
    WhitelistViolation,
    InputRejected,
    RateLimited,
    RiskOverride,
}

impl SecurityEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventKind::WhitelistViolation => "whitelist_violation",
            SecurityEventKind::InputRejected => "input_rejected",
            SecurityEventKind::RateLimited => "rate_limited",
            SecurityEventKind::RiskOverride => "risk_override",
        }
    }
}

/// Aggregated statistics for reporting
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelemetryStats {
    pub quotes_served: u64,
    pub quote_cache_hits: u64,
    pub quote_failures: u64,
    /// Average quote latency (ms), cache hits excluded
    pub avg_quote_latency_ms: f64,
    pub simulations_passed: u64,
    pub simulations_failed: u64,
    pub simulation_failures_by_category: HashMap<String, u64>,
    pub swaps_completed: u64,
    pub swaps_failed: u64,
    pub security_events: HashMap<String, u64>,
    pub period_start: u64,
    pub period_end: u64,
}

/// Main telemetry collector
pub struct TelemetryCollector {
    quotes_served: AtomicU64,
    quote_cache_hits: AtomicU64,
    quote_failures: AtomicU64,
    quote_latency_ms: AtomicU64,
    simulations_passed: AtomicU64,
    simulations_failed: AtomicU64,
    swaps_completed: AtomicU64,
    swaps_failed: AtomicU64,
    simulation_failures: RwLock<HashMap<SimulationErrorCategory, u64>>,
    security_events: RwLock<HashMap<SecurityEventKind, u64>>,
    session_start: u64,
    export_dir: PathBuf,
}

impl TelemetryCollector {
    pub fn new() -> Self {
        Self::with_export_dir(PathBuf::from("./telemetry"))
    }

    pub fn with_export_dir(export_dir: PathBuf) -> Self {
        Self {
            quotes_served: AtomicU64::new(0),
            quote_cache_hits: AtomicU64::new(0),
            quote_failures: AtomicU64::new(0),
            quote_latency_ms: AtomicU64::new(0),
            simulations_passed: AtomicU64::new(0),
            simulations_failed: AtomicU64::new(0),
            swaps_completed: AtomicU64::new(0),
            swaps_failed: AtomicU64::new(0),
            simulation_failures: RwLock::new(HashMap::new()),
            security_events: RwLock::new(HashMap::new()),
            session_start: current_timestamp(),
            export_dir,
        }
    }

    pub fn record_quote(&self, latency_ms: u64, cache_hit: bool) {
        self.quotes_served.fetch_add(1, Ordering::Relaxed);
        if cache_hit {
            self.quote_cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.quote_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        }
    }

    pub fn record_quote_failure(&self) {
        self.quote_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_simulation(&self, failure: Option<SimulationErrorCategory>) {
        match failure {
            None => {
                self.simulations_passed.fetch_add(1, Ordering::Relaxed);
            }
            Some(category) => {
                self.simulations_failed.fetch_add(1, Ordering::Relaxed);
                if let Ok(mut counts) = self.simulation_failures.write() {
                    *counts.entry(category).or_insert(0) += 1;
                }
            }
        }
    }

    pub fn record_swap(&self, success: bool) {
        if success {
            self.swaps_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.swaps_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_security_event(&self, kind: SecurityEventKind) {
        if let Ok(mut counts) = self.security_events.write() {
            *counts.entry(kind).or_insert(0) += 1;
        }
    }

    /// Get current statistics
    pub fn get_stats(&self) -> TelemetryStats {
        let quotes_served = self.quotes_served.load(Ordering::Relaxed);
        let cache_hits = self.quote_cache_hits.load(Ordering::Relaxed);
        let fresh_quotes = quotes_served.saturating_sub(cache_hits);
        let avg_quote_latency_ms = if fresh_quotes > 0 {
            self.quote_latency_ms.load(Ordering::Relaxed) as f64 / fresh_quotes as f64
        } else {
            0.0
        };

        let simulation_failures_by_category = self
            .simulation_failures
            .read()
            .map(|counts| {
                counts
                    .iter()
                    .map(|(k, v)| (k.as_str().to_string(), *v))
                    .collect()
            })
            .unwrap_or_default();

        let security_events = self
            .security_events
            .read()
            .map(|counts| {
                counts
                    .iter()
                    .map(|(k, v)| (k.as_str().to_string(), *v))
                    .collect()
            })
            .unwrap_or_default();

        TelemetryStats {
            quotes_served,
            quote_cache_hits: cache_hits,
            quote_failures: self.quote_failures.load(Ordering::Relaxed),
            avg_quote_latency_ms,
            simulations_passed: self.simulations_passed.load(Ordering::Relaxed),
            simulations_failed: self.simulations_failed.load(Ordering::Relaxed),
            simulation_failures_by_category,
            swaps_completed: self.swaps_completed.load(Ordering::Relaxed),
            swaps_failed: self.swaps_failed.load(Ordering::Relaxed),
            security_events,
            period_start: self.session_start,
            period_end: current_timestamp(),
        }
    }

    /// Export current stats to a JSON file in the export directory
    pub fn export_stats_json(&self) -> Result<PathBuf, std::io::Error> {
        fs::create_dir_all(&self.export_dir)?;
        let stats = self.get_stats();
        let path = self.export_dir.join(format!("stats_{}.json", current_timestamp()));

        let json = serde_json::to_string_pretty(&stats)?;
        fs::write(&path, json)?;

        Ok(path)
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_counters() {
        let telemetry = TelemetryCollector::new();
        telemetry.record_quote(100, false);
        telemetry.record_quote(300, false);
        telemetry.record_quote(0, true);
        telemetry.record_quote_failure();

        let stats = telemetry.get_stats();
        assert_eq!(stats.quotes_served, 3);
        assert_eq!(stats.quote_cache_hits, 1);
        assert_eq!(stats.quote_failures, 1);
        assert!((stats.avg_quote_latency_ms - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_simulation_and_security_counters() {
        let telemetry = TelemetryCollector::new();
        telemetry.record_simulation(None);
        telemetry.record_simulation(Some(SimulationErrorCategory::Slippage));
        telemetry.record_simulation(Some(SimulationErrorCategory::Slippage));
        telemetry.record_security_event(SecurityEventKind::WhitelistViolation);

        let stats = telemetry.get_stats();
        assert_eq!(stats.simulations_passed, 1);
        assert_eq!(stats.simulations_failed, 2);
        assert_eq!(stats.simulation_failures_by_category.get("slippage"), Some(&2));
        assert_eq!(stats.security_events.get("whitelist_violation"), Some(&1));
    }
}
