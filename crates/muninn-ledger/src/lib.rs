//! Tier 2: the rolling context ledger.
//!
//! Session summaries live in one append-only JSONL partition per UTC
//! calendar day. Writers serialize through the workspace lock; readers never
//! lock because records are immutable once appended. Pruning seals old
//! partitions into immutable segments instead of deleting anything.

use muninn_core::clock::{now_rfc3339, parse_partition_name, partition_name, today_utc};
use muninn_core::config::MuninnConfig;
use muninn_core::{MuninnError, Result, SessionOutcome, SessionSummary};
use muninn_store::jsonl::{append_jsonl, read_jsonl};
use muninn_store::{MuninnPaths, StoreLock};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Date;

const STORE: &str = "context-ledger";

/// Whether a promotion happened, and why not if it was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromoteOutcome {
    Promoted,
    /// Only successful sessions are promoted.
    SkippedFailureOutcome,
    /// The session logged fewer decisions than the configured minimum.
    SkippedTooFewDecisions { logged: usize, required: usize },
    /// The session id already appears in an active partition. Sealed
    /// segments are not scanned.
    SkippedAlreadyPromoted,
}

impl PromoteOutcome {
    pub fn promoted(&self) -> bool {
        matches!(self, PromoteOutcome::Promoted)
    }
}

/// Result of a `prune` sweep.
#[derive(Debug, Clone)]
pub struct SealReport {
    pub segment_id: Option<String>,
    pub partitions_sealed: usize,
    pub summaries_sealed: usize,
}

/// One line in `sealed/manifest.jsonl`, recording which partitions a
/// segment absorbed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealRecord {
    pub segment_id: String,
    pub partitions: Vec<String>,
    pub sealed_at: String,
}

pub struct ContextLedger {
    pub paths: MuninnPaths,
    config: MuninnConfig,
}

impl ContextLedger {
    /// Open (and lay out, if needed) the ledger under `.muninn/ledger/`.
    pub fn open(paths: MuninnPaths, config: MuninnConfig) -> Result<Self> {
        paths.ensure_layout()?;
        Ok(Self { paths, config })
    }

    /// Copy a concluded session summary into today's partition if it is
    /// eligible: outcome success and at least the configured minimum number
    /// of decisions. The source summary is never mutated.
    pub fn promote(&self, summary: &SessionSummary) -> Result<PromoteOutcome> {
        if summary.outcome != SessionOutcome::Success {
            return Ok(PromoteOutcome::SkippedFailureOutcome);
        }
        if summary.decisions.len() < self.config.min_decisions {
            return Ok(PromoteOutcome::SkippedTooFewDecisions {
                logged: summary.decisions.len(),
                required: self.config.min_decisions,
            });
        }
        // Duplicate scan and append happen under one lock so two concurrent
        // promoters of the same summary cannot both pass the check. The scan
        // covers every active partition, not just the query window.
        let _lock = StoreLock::acquire(&self.paths.lock_file)?;
        for (_, path) in self.all_partitions()? {
            let read = read_jsonl::<SessionSummary>(&path, STORE)?;
            if read
                .records
                .iter()
                .any(|s| s.session_id == summary.session_id)
            {
                return Ok(PromoteOutcome::SkippedAlreadyPromoted);
            }
        }

        let partition = self.paths.partition_file(&partition_name(today_utc()));
        append_jsonl(&partition, STORE, summary, true)?;
        tracing::debug!(
            session_id = %summary.session_id,
            partition = %partition.display(),
            "session promoted to context ledger"
        );
        Ok(PromoteOutcome::Promoted)
    }

    /// All summaries within the trailing window, oldest partition first,
    /// within-partition append order preserved. Sealed segments are ignored.
    pub fn query(&self, window_days: u64) -> Result<Vec<SessionSummary>> {
        let mut out = Vec::new();
        for (_, path) in self.window_partitions(window_days)? {
            let read = read_jsonl::<SessionSummary>(&path, STORE)?;
            out.extend(read.records);
        }
        Ok(out)
    }

    /// Like `query`, but explicitly includes sealed segments (oldest first,
    /// in seal order). Sealed records predate the retention horizon, so the
    /// window filter applies only to the active partitions.
    pub fn query_with_sealed(&self, window_days: u64) -> Result<Vec<SessionSummary>> {
        let mut out = Vec::new();
        let manifest = read_jsonl::<SealRecord>(&self.paths.seal_manifest, STORE)?;
        for seal in &manifest.records {
            let path = self.paths.sealed_segment(&seal.segment_id);
            let read = read_jsonl::<SessionSummary>(&path, STORE)?;
            out.extend(read.records);
        }
        out.extend(self.query(window_days)?);
        Ok(out)
    }

    /// Seal partitions older than `retention_days` into a single immutable
    /// segment and record it in the manifest. Records are preserved in
    /// sealed form; nothing is rewritten in place. Maintenance-only.
    pub fn prune(&self, retention_days: u64) -> Result<SealReport> {
        let _lock = StoreLock::acquire(&self.paths.lock_file)?;

        let today = today_utc();
        let mut expired: Vec<(Date, PathBuf)> = self
            .all_partitions()?
            .into_iter()
            .filter(|(date, _)| (today - *date).whole_days() >= retention_days as i64)
            .collect();
        expired.sort_by_key(|(date, _)| *date);

        if expired.is_empty() {
            return Ok(SealReport {
                segment_id: None,
                partitions_sealed: 0,
                summaries_sealed: 0,
            });
        }

        let segment_id = muninn_core::id::segment();
        let segment_path = self.paths.sealed_segment(&segment_id);

        let mut sealed_bytes = Vec::new();
        let mut summaries_sealed = 0usize;
        for (_, path) in &expired {
            let content =
                std::fs::read(path).map_err(|e| MuninnError::io("read partition", path, e))?;
            summaries_sealed += content
                .split(|b| *b == b'\n')
                .filter(|l| !l.is_empty())
                .count();
            sealed_bytes.extend_from_slice(&content);
            if !sealed_bytes.ends_with(b"\n") {
                sealed_bytes.push(b'\n');
            }
        }
        // Segment is durable before the manifest points at it and before
        // any partition file is removed.
        muninn_store::write_atomic(&segment_path, &sealed_bytes)?;

        let record = SealRecord {
            segment_id: segment_id.clone(),
            partitions: expired
                .iter()
                .map(|(date, _)| partition_name(*date))
                .collect(),
            sealed_at: now_rfc3339(),
        };
        append_jsonl(&self.paths.seal_manifest, STORE, &record, true)?;

        for (_, path) in &expired {
            std::fs::remove_file(path)
                .map_err(|e| MuninnError::io("remove sealed partition", path, e))?;
        }
        tracing::debug!(
            segment_id = %segment_id,
            partitions = expired.len(),
            "sealed expired ledger partitions"
        );
        Ok(SealReport {
            segment_id: Some(segment_id),
            partitions_sealed: expired.len(),
            summaries_sealed,
        })
    }

    // ── Partition listing ──

    fn all_partitions(&self) -> Result<Vec<(Date, PathBuf)>> {
        let dir = &self.paths.ledger_dir;
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        let entries =
            std::fs::read_dir(dir).map_err(|e| MuninnError::io("read dir", dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| MuninnError::io("read dir", dir, e))?;
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let stem = match path.file_stem().and_then(|s| s.to_str()) {
                Some(s) => s,
                None => continue,
            };
            if let Some(date) = parse_partition_name(stem) {
                out.push((date, path));
            }
        }
        Ok(out)
    }

    fn window_partitions(&self, window_days: u64) -> Result<Vec<(Date, PathBuf)>> {
        let today = today_utc();
        let mut parts: Vec<(Date, PathBuf)> = self
            .all_partitions()?
            .into_iter()
            .filter(|(date, _)| {
                let age = (today - *date).whole_days();
                age >= 0 && age < window_days as i64
            })
            .collect();
        parts.sort_by_key(|(date, _)| *date);
        Ok(parts)
    }
}
