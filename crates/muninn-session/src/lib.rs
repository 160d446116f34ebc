//! Tier 1: the in-process session cache.
//!
//! Holds file summaries with a lazy TTL and the ordered decision log for one
//! unit of work. All operations are in-memory and sub-millisecond; the
//! optional persistence hooks exist only to survive crashes.

use muninn_core::clock::{now_rfc3339, now_utc, parse_rfc3339};
use muninn_core::config::MuninnConfig;
use muninn_core::{
    id, trigger_signature, ContextShape, DecisionOutcome, DecisionRecord, FileContextEntry,
    FileSummary, MuninnError, Result, SessionOutcome, SessionSummary, SCHEMA_VERSION,
};
use muninn_store::MuninnPaths;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::Duration;

/// One bounded unit of agent work. A single process owns a session; there is
/// no cross-process sharing.
pub struct SessionCache {
    session_id: String,
    started_at: String,
    task: String,
    ttl: Duration,
    files: HashMap<String, FileContextEntry>,
    decisions: Vec<DecisionRecord>,
    outcome: Option<SessionOutcome>,
    concluded: Option<SessionSummary>,
}

/// On-disk form of a live session (one file per session id).
#[derive(Serialize, Deserialize)]
struct SessionState {
    session_id: String,
    started_at: String,
    task: String,
    files: Vec<FileContextEntry>,
    decisions: Vec<DecisionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    outcome: Option<SessionOutcome>,
}

impl SessionCache {
    /// Start a new session for the given task description.
    pub fn new(task: &str, config: &MuninnConfig) -> Self {
        Self {
            session_id: id::session(),
            started_at: now_rfc3339(),
            task: task.to_string(),
            ttl: Duration::minutes(config.session_ttl_minutes as i64),
            files: HashMap::new(),
            decisions: Vec::new(),
            outcome: None,
            concluded: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Store or overwrite the cached summary for a file path.
    pub fn cache(&mut self, path: &str, digest: &str, summary: FileSummary) -> Result<()> {
        if path.is_empty() {
            return Err(MuninnError::InvalidInput("empty file path".into()));
        }
        self.ensure_live("cache")?;
        self.files.insert(
            path.to_string(),
            FileContextEntry {
                path: path.to_string(),
                digest: digest.to_string(),
                summary,
                captured_at: now_rfc3339(),
            },
        );
        Ok(())
    }

    /// Look up a cached summary. Expiry is lazy: an entry past its TTL is a
    /// miss, checked here rather than by a background sweep. A miss is a
    /// normal negative result, not an error.
    pub fn get(&self, path: &str) -> Option<&FileSummary> {
        let entry = self.files.get(path)?;
        let captured = parse_rfc3339(&entry.captured_at)?;
        if now_utc() - captured > self.ttl {
            return None;
        }
        Some(&entry.summary)
    }

    /// Append a decision with outcome `Pending` to the ordered log.
    pub fn log_decision(
        &mut self,
        action: &str,
        context: ContextShape,
        decision: &str,
        rationale: &str,
    ) -> Result<()> {
        self.ensure_live("log_decision")?;
        self.decisions.push(DecisionRecord {
            action: action.to_string(),
            context,
            decision: decision.to_string(),
            rationale: rationale.to_string(),
            ts: now_rfc3339(),
            outcome: DecisionOutcome::Pending,
            outcome_reason: None,
        });
        Ok(())
    }

    /// Resolve the most recent pending decision matching the trigger
    /// signature of (`action`, `context`). Already-resolved records are never
    /// rewritten; if no pending record matches, a new already-resolved record
    /// is appended so the evidence is not dropped.
    pub fn resolve_decision(
        &mut self,
        action: &str,
        context: &ContextShape,
        outcome: DecisionOutcome,
        reason: Option<&str>,
    ) -> Result<()> {
        if outcome == DecisionOutcome::Pending {
            return Err(MuninnError::InvalidInput(
                "cannot resolve a decision to pending".into(),
            ));
        }
        self.ensure_live("resolve_decision")?;
        let sig = trigger_signature(action, context);
        let pending = self
            .decisions
            .iter_mut()
            .rev()
            .find(|d| d.outcome == DecisionOutcome::Pending && d.trigger_signature() == sig);
        match pending {
            Some(rec) => {
                rec.outcome = outcome;
                rec.outcome_reason = reason.map(|r| r.to_string());
            }
            None => {
                self.decisions.push(DecisionRecord {
                    action: action.to_string(),
                    context: context.clone(),
                    decision: action.to_string(),
                    rationale: String::new(),
                    ts: now_rfc3339(),
                    outcome,
                    outcome_reason: reason.map(|r| r.to_string()),
                });
            }
        }
        Ok(())
    }

    /// Set the session-level outcome. Does not touch individual decisions.
    pub fn set_outcome(&mut self, outcome: SessionOutcome) -> Result<()> {
        self.ensure_live("set_outcome")?;
        self.outcome = Some(outcome);
        Ok(())
    }

    /// Decisions logged so far, in insertion order.
    pub fn decisions(&self) -> &[DecisionRecord] {
        &self.decisions
    }

    /// Finalize the session into an immutable snapshot and clear the live
    /// cache. Idempotent: a second call returns the same frozen snapshot
    /// without re-reading live state.
    pub fn conclude(&mut self) -> SessionSummary {
        if let Some(summary) = &self.concluded {
            return summary.clone();
        }
        let mut files: Vec<FileContextEntry> = self.files.drain().map(|(_, v)| v).collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        let summary = SessionSummary {
            session_id: self.session_id.clone(),
            started_at: self.started_at.clone(),
            ended_at: now_rfc3339(),
            // A session never marked successful is classified as a failure.
            outcome: self.outcome.unwrap_or(SessionOutcome::Failure),
            task: self.task.clone(),
            decisions: std::mem::take(&mut self.decisions),
            files,
            schema_version: SCHEMA_VERSION,
        };
        self.concluded = Some(summary.clone());
        summary
    }

    fn ensure_live(&self, op: &str) -> Result<()> {
        if self.concluded.is_some() {
            return Err(MuninnError::InvalidInput(format!(
                "{op} on a concluded session {}",
                self.session_id
            )));
        }
        Ok(())
    }
}

// ── Crash persistence ──

impl SessionCache {
    /// Persist the live session to `sessions/<id>.json` (atomic write).
    pub fn persist(&self, paths: &MuninnPaths) -> Result<()> {
        let mut files: Vec<FileContextEntry> = self.files.values().cloned().collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        let state = SessionState {
            session_id: self.session_id.clone(),
            started_at: self.started_at.clone(),
            task: self.task.clone(),
            files,
            decisions: self.decisions.clone(),
            outcome: self.outcome,
        };
        let json = serde_json::to_vec_pretty(&state).map_err(|e| MuninnError::Serialize {
            store: "session".into(),
            source: e,
        })?;
        muninn_store::write_atomic(&paths.session_file(&self.session_id), &json)
    }

    /// Resume a persisted session. Corrupt or unreadable state is treated as
    /// an empty cache and logged as a warning, never a fatal error.
    pub fn resume(paths: &MuninnPaths, session_id: &str, config: &MuninnConfig) -> Self {
        let path = paths.session_file(session_id);
        let state = std::fs::read_to_string(&path)
            .ok()
            .and_then(|content| match serde_json::from_str::<SessionState>(&content) {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::warn!(
                        session_id,
                        path = %path.display(),
                        error = %e,
                        "corrupt persisted session, starting empty"
                    );
                    None
                }
            });
        match state {
            Some(s) => Self {
                session_id: s.session_id,
                started_at: s.started_at,
                task: s.task,
                ttl: Duration::minutes(config.session_ttl_minutes as i64),
                files: s.files.into_iter().map(|f| (f.path.clone(), f)).collect(),
                decisions: s.decisions,
                outcome: s.outcome,
                concluded: None,
            },
            None => Self {
                session_id: session_id.to_string(),
                started_at: now_rfc3339(),
                task: String::new(),
                ttl: Duration::minutes(config.session_ttl_minutes as i64),
                files: HashMap::new(),
                decisions: Vec::new(),
                outcome: None,
                concluded: None,
            },
        }
    }
}
