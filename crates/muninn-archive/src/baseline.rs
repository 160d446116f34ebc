use muninn_core::{MuninnError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// A replaced baseline revision, retained inside the entry that replaced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineRevision {
    pub digest: String,
    pub size: u64,
    pub modified_at: String,
    pub archived_at: String,
    pub rebaselined_at: String,
    pub justification: String,
}

/// Ground-truth digest and metadata for one archived item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveBaselineEntry {
    pub digest: String,
    pub size: u64,
    pub modified_at: String,
    pub archived_at: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<BaselineRevision>,
}

/// In-memory map of archived path → baseline entry.
pub type BaselineMap = HashMap<String, ArchiveBaselineEntry>;

/// Load `baseline.json`. A missing file is an empty map; an unparsable file
/// is a `Corrupt` error (the map is a single document, there is no record
/// to isolate).
pub fn load_baseline(path: &Path) -> Result<BaselineMap> {
    if !path.exists() {
        return Ok(BaselineMap::new());
    }
    let content =
        std::fs::read_to_string(path).map_err(|e| MuninnError::io("read", path, e))?;
    serde_json::from_str(&content).map_err(|e| MuninnError::Corrupt {
        store: "archive-baseline".into(),
        detail: format!("{}: {e}", path.display()),
    })
}

/// Save `baseline.json` atomically (temp file, then rename).
pub fn save_baseline(path: &Path, map: &BaselineMap) -> Result<()> {
    let json = serde_json::to_vec_pretty(map).map_err(|e| MuninnError::Serialize {
        store: "archive-baseline".into(),
        source: e,
    })?;
    muninn_store::write_atomic(path, &json)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(digest: &str) -> ArchiveBaselineEntry {
        ArchiveBaselineEntry {
            digest: digest.to_string(),
            size: 10,
            modified_at: "2026-01-01T00:00:00Z".into(),
            archived_at: "2026-01-01T00:00:00Z".into(),
            history: Vec::new(),
        }
    }

    #[test]
    fn missing_file_is_empty_map() {
        let map = load_baseline(Path::new("/nonexistent/baseline.json")).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("baseline.json");
        let mut map = BaselineMap::new();
        map.insert("a/b.bin".into(), entry("abc"));
        save_baseline(&path, &map).unwrap();
        let loaded = load_baseline(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["a/b.bin"].digest, "abc");
    }

    #[test]
    fn corrupt_file_is_corrupt_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("baseline.json");
        std::fs::write(&path, "{broken").unwrap();
        assert!(matches!(
            load_baseline(&path),
            Err(MuninnError::Corrupt { .. })
        ));
    }

    #[test]
    fn history_survives_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("baseline.json");
        let mut e = entry("new");
        e.history.push(BaselineRevision {
            digest: "old".into(),
            size: 9,
            modified_at: "2025-12-01T00:00:00Z".into(),
            archived_at: "2025-12-01T00:00:00Z".into(),
            rebaselined_at: "2026-01-01T00:00:00Z".into(),
            justification: "intentional rewrite".into(),
        });
        let mut map = BaselineMap::new();
        map.insert("x".into(), e);
        save_baseline(&path, &map).unwrap();
        let loaded = load_baseline(&path).unwrap();
        assert_eq!(loaded["x"].history.len(), 1);
        assert_eq!(loaded["x"].history[0].digest, "old");
    }
}
