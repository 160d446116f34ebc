use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunable knobs for the tiered cache and archive verification.
/// Loaded from `.muninn/config.json`; every field has a default so a
/// partial file only overrides what it names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MuninnConfig {
    /// Tier-1 file summary TTL, checked lazily on read.
    pub session_ttl_minutes: u64,
    /// Minimum decision count for a session to be promoted to the ledger.
    pub min_decisions: usize,
    /// Rolling window for active ledger queries, in days.
    pub window_days: u64,
    /// Partitions older than this are eligible for sealing.
    pub retention_days: u64,
    /// Window handed to pattern discovery.
    pub analysis_window_days: u64,
    /// Confidence a pattern needs before promotion to the intelligence store.
    pub promote_threshold: f64,
    /// Resolved evidence records a pattern needs before promotion.
    pub min_evidence: u64,
    /// Fraction of baselined paths examined by a sampled verification.
    pub sample_fraction: f64,
}

impl Default for MuninnConfig {
    fn default() -> Self {
        Self {
            session_ttl_minutes: 60,
            min_decisions: 2,
            window_days: 7,
            retention_days: 30,
            analysis_window_days: 30,
            promote_threshold: 0.75,
            min_evidence: 3,
            sample_fraction: 0.1,
        }
    }
}

impl MuninnConfig {
    /// Load config from a JSON file. A missing file yields defaults; a
    /// corrupt file is logged and also yields defaults (never fatal).
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str(&content) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "unparsable config, falling back to defaults"
                );
                Self::default()
            }
        }
    }
}
