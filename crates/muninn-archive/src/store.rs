use crate::baseline::{load_baseline, save_baseline, ArchiveBaselineEntry, BaselineRevision};
use crate::finding::{Acknowledgment, FindingKind, TamperFinding};
use muninn_core::clock::now_rfc3339;
use muninn_core::hash::sha256_file;
use muninn_core::{id, MuninnError, Result};
use muninn_store::jsonl::{append_jsonl, read_jsonl};
use muninn_store::{MuninnPaths, StoreLock};
use rand::Rng;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

const STORE: &str = "archive-integrity";

/// Outcome of a verification pass. Findings are probabilistic under
/// sampling: absence of a finding is not proof of integrity.
#[derive(Debug)]
pub struct VerifyReport {
    pub findings: Vec<TamperFinding>,
    pub examined: usize,
    pub cancelled: bool,
}

/// State of one archived item: tampered while an unacknowledged finding
/// exists, verified otherwise. There is no silent self-heal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Verified,
    Tampered,
}

pub struct ArchiveIntegrityStore {
    pub paths: MuninnPaths,
}

impl ArchiveIntegrityStore {
    /// Open (and lay out, if needed) the store under `.muninn/archive/`.
    pub fn open(paths: MuninnPaths) -> Result<Self> {
        paths.ensure_layout()?;
        Ok(Self { paths })
    }

    // ── Baselines ──

    /// Record the ground-truth digest, size, and mtime for `path`.
    /// Fails with `AlreadyExists` if a baseline is already recorded;
    /// replacing ground truth goes through `rebaseline` only.
    pub fn baseline(&self, path: &Path) -> Result<ArchiveBaselineEntry> {
        let _lock = StoreLock::acquire(&self.paths.lock_file)?;
        let key = key_for(path);
        let mut map = load_baseline(&self.paths.baseline_json)?;
        if map.contains_key(&key) {
            return Err(MuninnError::AlreadyExists(format!("baseline for {key}")));
        }
        let entry = snapshot(path)?;
        map.insert(key.clone(), entry.clone());
        save_baseline(&self.paths.baseline_json, &map)?;
        tracing::debug!(path = %key, digest = %entry.digest, "baseline recorded");
        Ok(entry)
    }

    /// Explicitly replace the ground-truth digest for `path`. The prior
    /// baseline is pushed into the entry's revision history, never discarded.
    pub fn rebaseline(&self, path: &Path, justification: &str) -> Result<ArchiveBaselineEntry> {
        let _lock = StoreLock::acquire(&self.paths.lock_file)?;
        let key = key_for(path);
        let mut map = load_baseline(&self.paths.baseline_json)?;
        let prior = map
            .get(&key)
            .cloned()
            .ok_or_else(|| MuninnError::NotFound(format!("baseline for {key}")))?;

        let mut entry = snapshot(path)?;
        entry.history = prior.history.clone();
        entry.history.push(BaselineRevision {
            digest: prior.digest,
            size: prior.size,
            modified_at: prior.modified_at,
            archived_at: prior.archived_at,
            rebaselined_at: now_rfc3339(),
            justification: justification.to_string(),
        });
        map.insert(key.clone(), entry.clone());
        save_baseline(&self.paths.baseline_json, &map)?;
        tracing::info!(path = %key, justification, "baseline replaced");
        Ok(entry)
    }

    /// The current baseline for `path`, or `None` if never baselined.
    pub fn baseline_entry(&self, path: &Path) -> Result<Option<ArchiveBaselineEntry>> {
        let map = load_baseline(&self.paths.baseline_json)?;
        Ok(map.get(&key_for(path)).cloned())
    }

    // ── Verification ──

    /// Recompute digests for every baselined path. O(n) in archive size;
    /// intended for infrequent full audits. Checks the cancellation flag
    /// between files; partial results up to that point are returned.
    pub fn verify_all(&self, cancel: &AtomicBool) -> Result<VerifyReport> {
        let mut keys: Vec<(String, ArchiveBaselineEntry)> =
            load_baseline(&self.paths.baseline_json)?.into_iter().collect();
        keys.sort_by(|a, b| a.0.cmp(&b.0));
        self.verify_paths(keys, cancel)
    }

    /// Verify a uniformly random subset of baselined paths: each path is
    /// drawn independently with probability `fraction`, so the expected
    /// sample size is `fraction × n`. Sampling is stateless per call, so
    /// findings are probabilistic, not exhaustive. A single unreadable file
    /// does not abort the batch.
    pub fn verify_sample(&self, fraction: f64, cancel: &AtomicBool) -> Result<VerifyReport> {
        if !(0.0..=1.0).contains(&fraction) || fraction.is_nan() {
            return Err(MuninnError::InvalidInput(format!(
                "sample fraction {fraction} outside [0, 1]"
            )));
        }
        let mut rng = rand::thread_rng();
        let mut keys: Vec<(String, ArchiveBaselineEntry)> =
            load_baseline(&self.paths.baseline_json)?
                .into_iter()
                .filter(|_| rng.gen_bool(fraction))
                .collect();
        keys.sort_by(|a, b| a.0.cmp(&b.0));
        self.verify_paths(keys, cancel)
    }

    fn verify_paths(
        &self,
        keys: Vec<(String, ArchiveBaselineEntry)>,
        cancel: &AtomicBool,
    ) -> Result<VerifyReport> {
        let _lock = StoreLock::acquire(&self.paths.lock_file)?;
        let logged = read_jsonl::<TamperFinding>(&self.paths.findings_jsonl, STORE)?.records;
        let acked: HashSet<String> =
            read_jsonl::<Acknowledgment>(&self.paths.acks_jsonl, STORE)?
                .records
                .into_iter()
                .map(|a| a.finding_id)
                .collect();

        let mut findings = Vec::new();
        let mut examined = 0usize;
        let mut cancelled = false;

        for (key, expected) in keys {
            if cancel.load(Ordering::Relaxed) {
                cancelled = true;
                break;
            }
            examined += 1;
            let observed = match observe(Path::new(&key), &expected) {
                None => continue,
                Some(o) => o,
            };
            // The same observation may already be on file: report it again
            // without re-logging, unless it has been acknowledged.
            let prior = logged.iter().rev().find(|f| {
                f.path == key && f.kind == observed.kind && f.observed_digest == observed.digest
            });
            match prior {
                Some(f) if acked.contains(&f.finding_id) => continue,
                Some(f) => findings.push(f.clone()),
                None => {
                    let finding = TamperFinding {
                        finding_id: id::finding(),
                        path: key.clone(),
                        kind: observed.kind,
                        severity: observed.kind.severity(),
                        expected_digest: expected.digest.clone(),
                        observed_digest: observed.digest,
                        expected_size: expected.size,
                        observed_size: observed.size,
                        detected_at: now_rfc3339(),
                        detail: observed.detail,
                    };
                    append_jsonl(&self.paths.findings_jsonl, STORE, &finding, true)?;
                    tracing::warn!(
                        path = %finding.path,
                        kind = ?finding.kind,
                        "integrity finding raised"
                    );
                    findings.push(finding);
                }
            }
        }
        Ok(VerifyReport {
            findings,
            examined,
            cancelled,
        })
    }

    // ── Findings and acknowledgments ──

    /// Record an explicit acknowledgment for a finding. The finding record
    /// itself is never edited. A second acknowledgment is `AlreadyExists`.
    pub fn acknowledge(
        &self,
        finding_id: &str,
        acknowledged_by: &str,
        note: Option<&str>,
    ) -> Result<Acknowledgment> {
        let _lock = StoreLock::acquire(&self.paths.lock_file)?;
        let findings = read_jsonl::<TamperFinding>(&self.paths.findings_jsonl, STORE)?.records;
        let finding = findings
            .iter()
            .find(|f| f.finding_id == finding_id)
            .ok_or_else(|| MuninnError::NotFound(format!("finding {finding_id}")))?;
        let acks = read_jsonl::<Acknowledgment>(&self.paths.acks_jsonl, STORE)?.records;
        if acks.iter().any(|a| a.finding_id == finding_id) {
            return Err(MuninnError::AlreadyExists(format!(
                "acknowledgment for {finding_id}"
            )));
        }
        let ack = Acknowledgment {
            ack_id: id::ack(),
            finding_id: finding_id.to_string(),
            path: finding.path.clone(),
            acknowledged_by: acknowledged_by.to_string(),
            note: note.map(|n| n.to_string()),
            at: now_rfc3339(),
        };
        append_jsonl(&self.paths.acks_jsonl, STORE, &ack, true)?;
        Ok(ack)
    }

    /// Every finding ever raised, oldest first.
    pub fn findings(&self) -> Result<Vec<TamperFinding>> {
        Ok(read_jsonl(&self.paths.findings_jsonl, STORE)?.records)
    }

    /// Every acknowledgment, oldest first.
    pub fn acknowledgments(&self) -> Result<Vec<Acknowledgment>> {
        Ok(read_jsonl(&self.paths.acks_jsonl, STORE)?.records)
    }

    /// State of a baselined item: `Tampered` while any of its findings is
    /// unacknowledged. `NotFound` if the path was never baselined.
    pub fn item_state(&self, path: &Path) -> Result<ItemState> {
        let key = key_for(path);
        let map = load_baseline(&self.paths.baseline_json)?;
        if !map.contains_key(&key) {
            return Err(MuninnError::NotFound(format!("baseline for {key}")));
        }
        let findings = read_jsonl::<TamperFinding>(&self.paths.findings_jsonl, STORE)?.records;
        let acked: HashSet<String> =
            read_jsonl::<Acknowledgment>(&self.paths.acks_jsonl, STORE)?
                .records
                .into_iter()
                .map(|a| a.finding_id)
                .collect();
        let open = findings
            .iter()
            .any(|f| f.path == key && !acked.contains(&f.finding_id));
        Ok(if open {
            ItemState::Tampered
        } else {
            ItemState::Verified
        })
    }
}

// ── Observation ──

struct Observation {
    kind: FindingKind,
    digest: Option<String>,
    size: Option<u64>,
    detail: Option<String>,
}

/// Compare an item against its baseline. `None` means it checks out.
fn observe(path: &Path, expected: &ArchiveBaselineEntry) -> Option<Observation> {
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Some(Observation {
                kind: FindingKind::Missing,
                digest: None,
                size: None,
                detail: None,
            })
        }
        Err(e) => {
            return Some(Observation {
                kind: FindingKind::Unreadable,
                digest: None,
                size: None,
                detail: Some(e.to_string()),
            })
        }
    };
    let digest = match sha256_file(path) {
        Ok(d) => d,
        Err(e) => {
            return Some(Observation {
                kind: FindingKind::Unreadable,
                digest: None,
                size: Some(meta.len()),
                detail: Some(e.to_string()),
            })
        }
    };
    if digest != expected.digest {
        Some(Observation {
            kind: FindingKind::DigestMismatch,
            digest: Some(digest),
            size: Some(meta.len()),
            detail: None,
        })
    } else if meta.len() != expected.size {
        Some(Observation {
            kind: FindingKind::SizeMismatch,
            digest: Some(digest),
            size: Some(meta.len()),
            detail: None,
        })
    } else {
        None
    }
}

fn key_for(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Snapshot digest/size/mtime for a path. I/O failures here are
/// `Unreadable`: the item cannot become ground truth until it can be read.
fn snapshot(path: &Path) -> Result<ArchiveBaselineEntry> {
    let meta = std::fs::metadata(path).map_err(|e| MuninnError::Unreadable {
        path: path.display().to_string(),
        source: e,
    })?;
    let digest = sha256_file(path).map_err(|e| MuninnError::Unreadable {
        path: path.display().to_string(),
        source: e,
    })?;
    let modified_at = meta
        .modified()
        .ok()
        .and_then(|t| OffsetDateTime::from(t).format(&Rfc3339).ok())
        .unwrap_or_default();
    Ok(ArchiveBaselineEntry {
        digest,
        size: meta.len(),
        modified_at,
        archived_at: now_rfc3339(),
        history: Vec::new(),
    })
}
