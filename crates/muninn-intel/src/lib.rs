//! Tier 3: the permanent intelligence store.
//!
//! Promoted patterns are appended to one ordered JSONL sequence and never
//! deleted. A newer version of a pattern carries a `supersedes` pointer to
//! the version it replaces; the old record stays readable for audit.
//! Append order is promotion order, so "latest" is unambiguous.

use muninn_core::{Pattern, Result};
use muninn_store::jsonl::{append_jsonl, read_jsonl};
use muninn_store::{MuninnPaths, StoreLock};

const STORE: &str = "intelligence-store";

pub struct IntelligenceStore {
    pub paths: MuninnPaths,
}

impl IntelligenceStore {
    /// Open (and lay out, if needed) the store under `.muninn/intel/`.
    pub fn open(paths: MuninnPaths) -> Result<Self> {
        paths.ensure_layout()?;
        Ok(Self { paths })
    }

    /// Append a new pattern version. If a prior version exists for the same
    /// trigger signature, the new record points at it via `supersedes`; the
    /// prior record itself is untouched. The previous entry on disk is
    /// validated before the append so a prior partial write can never
    /// corrupt this one.
    pub fn promote(&self, mut pattern: Pattern) -> Result<Pattern> {
        let _lock = StoreLock::acquire(&self.paths.lock_file)?;
        if let Some(prior) = self.lookup(&pattern.trigger_signature)? {
            pattern.supersedes = Some(prior.pattern_id);
        }
        append_jsonl(&self.paths.patterns_jsonl, STORE, &pattern, true)?;
        tracing::debug!(
            pattern_id = %pattern.pattern_id,
            signature = %pattern.trigger_signature,
            confidence = pattern.confidence,
            evidence = pattern.evidence_count,
            "pattern promoted"
        );
        Ok(pattern)
    }

    /// Latest non-superseded pattern for a trigger signature, or `None`.
    /// A miss is a normal negative result.
    pub fn lookup(&self, signature: &str) -> Result<Option<Pattern>> {
        let versions = self.versions(signature)?;
        Ok(versions.into_iter().last())
    }

    /// Full superseded history for a signature, oldest first (everything
    /// except the latest version). Supports audit and regression analysis.
    pub fn superseded_versions(&self, signature: &str) -> Result<Vec<Pattern>> {
        let mut versions = self.versions(signature)?;
        versions.pop();
        Ok(versions)
    }

    /// Every version for a signature in promotion order.
    pub fn versions(&self, signature: &str) -> Result<Vec<Pattern>> {
        let read = read_jsonl::<Pattern>(&self.paths.patterns_jsonl, STORE)?;
        Ok(read
            .records
            .into_iter()
            .filter(|p| p.trigger_signature == signature)
            .collect())
    }

    /// Latest version of every pattern in the store.
    pub fn latest_patterns(&self) -> Result<Vec<Pattern>> {
        let read = read_jsonl::<Pattern>(&self.paths.patterns_jsonl, STORE)?;
        let mut latest: Vec<Pattern> = Vec::new();
        for p in read.records {
            if let Some(existing) = latest
                .iter_mut()
                .find(|e| e.trigger_signature == p.trigger_signature)
            {
                *existing = p;
            } else {
                latest.push(p);
            }
        }
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muninn_core::clock::now_rfc3339;
    use muninn_core::{id, SCHEMA_VERSION};

    fn pattern(signature: &str, confidence: f64, evidence: u64) -> Pattern {
        Pattern {
            pattern_id: id::pattern(),
            trigger_signature: signature.to_string(),
            description: format!("pattern for {signature}"),
            recommended_action: "do the thing".into(),
            confidence,
            evidence_count: evidence,
            success_count: evidence,
            first_seen: now_rfc3339(),
            last_seen: now_rfc3339(),
            promoted_at: now_rfc3339(),
            supersedes: None,
            schema_version: SCHEMA_VERSION,
        }
    }

    fn store(tmp: &tempfile::TempDir) -> IntelligenceStore {
        IntelligenceStore::open(MuninnPaths::discover(tmp.path())).unwrap()
    }

    #[test]
    fn lookup_on_empty_store_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(&tmp);
        assert!(s.lookup("a:b").unwrap().is_none());
    }

    #[test]
    fn promote_then_lookup() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(&tmp);
        let p = s.promote(pattern("archive:archive_item", 0.8, 4)).unwrap();
        let found = s.lookup("archive:archive_item").unwrap().unwrap();
        assert_eq!(found.pattern_id, p.pattern_id);
        assert!(found.supersedes.is_none());
    }

    #[test]
    fn new_version_supersedes_prior_without_deleting_it() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(&tmp);
        let v1 = s.promote(pattern("sig:x", 0.75, 3)).unwrap();
        let v2 = s.promote(pattern("sig:x", 0.8, 4)).unwrap();

        let latest = s.lookup("sig:x").unwrap().unwrap();
        assert_eq!(latest.pattern_id, v2.pattern_id);
        assert_eq!(latest.supersedes.as_deref(), Some(v1.pattern_id.as_str()));

        let history = s.superseded_versions("sig:x").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].pattern_id, v1.pattern_id);
    }

    #[test]
    fn history_is_oldest_first() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(&tmp);
        let v1 = s.promote(pattern("sig:x", 0.75, 3)).unwrap();
        let v2 = s.promote(pattern("sig:x", 0.8, 4)).unwrap();
        s.promote(pattern("sig:x", 0.83, 5)).unwrap();

        let history = s.superseded_versions("sig:x").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].pattern_id, v1.pattern_id);
        assert_eq!(history[1].pattern_id, v2.pattern_id);
        // The chain points backwards one version at a time.
        assert_eq!(history[1].supersedes.as_deref(), Some(v1.pattern_id.as_str()));
    }

    #[test]
    fn signatures_do_not_interfere() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(&tmp);
        s.promote(pattern("sig:a", 0.8, 4)).unwrap();
        s.promote(pattern("sig:b", 0.9, 5)).unwrap();
        assert!(s.lookup("sig:a").unwrap().unwrap().supersedes.is_none());
        assert!(s.lookup("sig:b").unwrap().unwrap().supersedes.is_none());
        assert_eq!(s.latest_patterns().unwrap().len(), 2);
    }

    #[test]
    fn append_after_partial_write_preserves_prior_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(&tmp);
        s.promote(pattern("sig:a", 0.8, 4)).unwrap();
        // Simulate a crash mid-append: a dangling fragment with no newline.
        use std::io::Write;
        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .open(&s.paths.patterns_jsonl)
            .unwrap();
        write!(f, "{{\"pattern_id\":\"pat_trunc").unwrap();
        drop(f);

        s.promote(pattern("sig:b", 0.9, 5)).unwrap();
        assert!(s.lookup("sig:a").unwrap().is_some());
        assert!(s.lookup("sig:b").unwrap().is_some());
    }
}
