use muninn_core::Result;
use std::path::{Path, PathBuf};

/// All well-known paths under `.muninn/`.
#[derive(Debug, Clone)]
pub struct MuninnPaths {
    pub root: PathBuf,
    pub muninn_dir: PathBuf,
    pub config_json: PathBuf,
    pub lock_file: PathBuf,
    pub sessions_dir: PathBuf,
    pub ledger_dir: PathBuf,
    pub sealed_dir: PathBuf,
    pub seal_manifest: PathBuf,
    pub intel_dir: PathBuf,
    pub patterns_jsonl: PathBuf,
    pub archive_dir: PathBuf,
    pub baseline_json: PathBuf,
    pub findings_jsonl: PathBuf,
    pub acks_jsonl: PathBuf,
}

impl MuninnPaths {
    /// Derive all paths from a repo root. Pure computation, no I/O.
    pub fn discover(repo_root: impl Into<PathBuf>) -> Self {
        let root = repo_root.into();
        let muninn_dir = root.join(".muninn");
        let ledger_dir = muninn_dir.join("ledger");
        let sealed_dir = ledger_dir.join("sealed");
        let intel_dir = muninn_dir.join("intel");
        let archive_dir = muninn_dir.join("archive");
        Self {
            config_json: muninn_dir.join("config.json"),
            lock_file: muninn_dir.join("LOCK"),
            sessions_dir: muninn_dir.join("sessions"),
            seal_manifest: sealed_dir.join("manifest.jsonl"),
            patterns_jsonl: intel_dir.join("patterns.jsonl"),
            baseline_json: archive_dir.join("baseline.json"),
            findings_jsonl: archive_dir.join("findings.jsonl"),
            acks_jsonl: archive_dir.join("acks.jsonl"),
            sealed_dir,
            ledger_dir,
            intel_dir,
            archive_dir,
            muninn_dir,
            root,
        }
    }

    /// Create all required directories. Idempotent.
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [
            &self.sessions_dir,
            &self.ledger_dir,
            &self.sealed_dir,
            &self.intel_dir,
            &self.archive_dir,
        ] {
            std::fs::create_dir_all(dir)
                .map_err(|e| muninn_core::MuninnError::io("create dir", dir, e))?;
        }
        Ok(())
    }

    /// Check whether `.muninn/` exists.
    pub fn is_initialized(&self) -> bool {
        self.muninn_dir.is_dir()
    }

    /// Ledger partition file for a `YYYY-MM-DD` name.
    pub fn partition_file(&self, name: &str) -> PathBuf {
        self.ledger_dir.join(format!("{name}.jsonl"))
    }

    /// Persisted Tier-1 snapshot for a session id.
    pub fn session_file(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(format!("{session_id}.json"))
    }

    /// Sealed ledger segment for a segment id.
    pub fn sealed_segment(&self, segment_id: &str) -> PathBuf {
        self.sealed_dir.join(format!("{segment_id}.jsonl"))
    }
}

impl MuninnPaths {
    /// Walk up from `start` looking for a directory containing `.muninn/`.
    /// Returns `None` if not found.
    pub fn find_root(start: &Path) -> Option<PathBuf> {
        let mut cur = start.to_path_buf();
        loop {
            if cur.join(".muninn").is_dir() {
                return Some(cur);
            }
            if !cur.pop() {
                return None;
            }
        }
    }
}
