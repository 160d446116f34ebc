use serde::{Deserialize, Serialize};

/// What a verification pass observed. `Unreadable` is transient I/O, kept
/// strictly apart from tamper categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    DigestMismatch,
    SizeMismatch,
    Missing,
    Unreadable,
}

impl FindingKind {
    pub fn severity(self) -> Severity {
        match self {
            FindingKind::Missing => Severity::Critical,
            FindingKind::DigestMismatch => Severity::High,
            FindingKind::SizeMismatch => Severity::Medium,
            FindingKind::Unreadable => Severity::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// A detected mismatch between an archived item and its baseline.
/// Read-only once created; never auto-resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TamperFinding {
    pub finding_id: String,
    pub path: String,
    pub kind: FindingKind,
    pub severity: Severity,
    pub expected_digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_digest: Option<String>,
    pub expected_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_size: Option<u64>,
    pub detected_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Explicit human/agent acknowledgment of a finding, recorded as its own
/// append-only record (the finding itself is never edited).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgment {
    pub ack_id: String,
    pub finding_id: String,
    pub path: String,
    pub acknowledged_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub at: String,
}
