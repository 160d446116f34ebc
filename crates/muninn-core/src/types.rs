use serde::{Deserialize, Serialize};

/// Current schema version for new records.
pub const SCHEMA_VERSION: u32 = 1;

/// Cached summary of a file's contents, a closed set of known shapes plus
/// an explicit opaque fallback so downstream matching has defined behavior
/// for anything a classifier does not recognize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileSummary {
    Source {
        language: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        symbols: Vec<String>,
    },
    Document {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        headings: Vec<String>,
    },
    Data {
        format: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        records: Option<u64>,
    },
    Opaque {
        text: String,
    },
}

/// The context half of a trigger signature. The discovery engine treats the
/// tag as an opaque string; only the classifier that produced it assigns
/// meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ContextShape {
    RepoFile { extension: String },
    ArchiveItem,
    BuildArtifact,
    Opaque { tag: String },
}

impl ContextShape {
    /// Stable tag used when composing a trigger signature.
    pub fn tag(&self) -> String {
        match self {
            ContextShape::RepoFile { extension } => format!("repo_file.{}", normalize(extension)),
            ContextShape::ArchiveItem => "archive_item".to_string(),
            ContextShape::BuildArtifact => "build_artifact".to_string(),
            ContextShape::Opaque { tag } => normalize(tag),
        }
    }
}

/// Compose a normalized trigger signature from an action type and a
/// context shape: `<action>:<shape-tag>`, lowercase, whitespace collapsed.
pub fn trigger_signature(action: &str, shape: &ContextShape) -> String {
    format!("{}:{}", normalize(action), shape.tag())
}

fn normalize(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Outcome of a single decision. Set at most once after `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    Pending,
    Success,
    Failure,
}

/// Session-level outcome classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Success,
    Failure,
}

/// One logged decision within a session. Appended in order; the outcome
/// transitions `Pending -> Success|Failure` exactly once and is never
/// rewritten afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub action: String,
    pub context: ContextShape,
    pub decision: String,
    pub rationale: String,
    pub ts: String,
    pub outcome: DecisionOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome_reason: Option<String>,
}

impl DecisionRecord {
    pub fn trigger_signature(&self) -> String {
        trigger_signature(&self.action, &self.context)
    }

    /// Resolved means the outcome has been set; pending records carry no
    /// evidence weight.
    pub fn is_resolved(&self) -> bool {
        self.outcome != DecisionOutcome::Pending
    }
}

/// A file touched during a session, with its content digest for staleness
/// detection. Owned exclusively by the session cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileContextEntry {
    pub path: String,
    pub digest: String,
    pub summary: FileSummary,
    pub captured_at: String,
}

/// Immutable snapshot of a concluded session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub started_at: String,
    pub ended_at: String,
    pub outcome: SessionOutcome,
    pub task: String,
    pub decisions: Vec<DecisionRecord>,
    pub files: Vec<FileContextEntry>,
    #[serde(default)]
    pub schema_version: u32,
}

/// A promoted behavioral pattern. Versions are append-only; a newer version
/// points at the one it supersedes rather than replacing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub pattern_id: String,
    pub trigger_signature: String,
    pub description: String,
    pub recommended_action: String,
    pub confidence: f64,
    pub evidence_count: u64,
    pub success_count: u64,
    pub first_seen: String,
    pub last_seen: String,
    pub promoted_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<String>,
    #[serde(default)]
    pub schema_version: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_normalizes_action() {
        let sig = trigger_signature("  Archive PYC Files ", &ContextShape::ArchiveItem);
        assert_eq!(sig, "archive_pyc_files:archive_item");
    }

    #[test]
    fn repo_file_shape_carries_extension() {
        let shape = ContextShape::RepoFile {
            extension: "rs".into(),
        };
        assert_eq!(trigger_signature("refactor", &shape), "refactor:repo_file.rs");
    }

    #[test]
    fn opaque_shape_tag_is_normalized() {
        let shape = ContextShape::Opaque {
            tag: "  Custom Shape ".into(),
        };
        assert_eq!(shape.tag(), "custom_shape");
    }

    #[test]
    fn pending_record_is_not_resolved() {
        let rec = DecisionRecord {
            action: "a".into(),
            context: ContextShape::ArchiveItem,
            decision: "d".into(),
            rationale: "r".into(),
            ts: "2026-01-01T00:00:00Z".into(),
            outcome: DecisionOutcome::Pending,
            outcome_reason: None,
        };
        assert!(!rec.is_resolved());
    }

    #[test]
    fn file_summary_serde_round_trip() {
        let s = FileSummary::Source {
            language: "rust".into(),
            symbols: vec!["main".into()],
        };
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"kind\":\"source\""));
        let back: FileSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn unknown_summary_kind_fails_to_parse() {
        // Unknown shapes must be classified as Opaque by the caller, not
        // silently accepted here.
        let r: Result<FileSummary, _> =
            serde_json::from_str(r#"{"kind":"hologram","text":"x"}"#);
        assert!(r.is_err());
    }
}
