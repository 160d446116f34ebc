//! The query surface over the three tiers: current session first, then the
//! ledger window, then promoted patterns. The first tier with a real match
//! answers; "no data" is an explicit result, never a fabricated guess.
//!
//! Outcome feedback flows into the session cache only. Tiers 2 and 3 are
//! reached solely through the conclude/promote/discover pipeline.

use muninn_core::config::MuninnConfig;
use muninn_core::score::confidence;
use muninn_core::{trigger_signature, ContextShape, DecisionOutcome, DecisionRecord, Result};
use muninn_intel::IntelligenceStore;
use muninn_ledger::ContextLedger;
use muninn_session::SessionCache;
use serde::Serialize;
use std::collections::BTreeMap;

// ── Result types ─────────────────────────────────────────────────────

/// Which tier produced the advice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    Session,
    Ledger,
    Intelligence,
}

/// A confidence-scored recommendation from one tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionAdvice {
    pub trigger_signature: String,
    pub source: RecommendationSource,
    pub recommended_action: String,
    pub confidence: f64,
    pub evidence_count: u64,
    pub success_count: u64,
    pub last_seen: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_id: Option<String>,
}

/// Outcome of a context query. Absence of a match is a first-class result
/// and must be presented as such, never dressed up as advice.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Recommendation {
    Advice(DecisionAdvice),
    NoData { trigger_signature: String },
}

impl Recommendation {
    pub fn advice(&self) -> Option<&DecisionAdvice> {
        match self {
            Recommendation::Advice(a) => Some(a),
            Recommendation::NoData { .. } => None,
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, Recommendation::NoData { .. })
    }
}

// ── Tier scoring ─────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ActionStats {
    evidence: u64,
    successes: u64,
    last_seen: String,
}

/// Best action among resolved records matching `signature`, with the same
/// dampened confidence the discovery engine uses. Actions that never
/// succeeded do not qualify: a lone failure is not advice.
fn best_match<'d, I>(records: I, signature: &str) -> Option<(String, ActionStats, f64)>
where
    I: IntoIterator<Item = &'d DecisionRecord>,
{
    let mut actions: BTreeMap<String, ActionStats> = BTreeMap::new();
    for rec in records {
        if !rec.is_resolved() || rec.trigger_signature() != signature {
            continue;
        }
        let stats = actions.entry(rec.decision.clone()).or_default();
        stats.evidence += 1;
        if rec.outcome == DecisionOutcome::Success {
            stats.successes += 1;
            if rec.ts > stats.last_seen {
                stats.last_seen = rec.ts.clone();
            }
        }
    }
    actions
        .into_iter()
        .filter(|(_, s)| s.successes > 0)
        .map(|(action, s)| {
            let score = confidence(s.successes, s.evidence);
            (action, s, score)
        })
        .max_by(|(_, a, sa), (_, b, sb)| {
            sa.partial_cmp(sb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.last_seen.cmp(&b.last_seen))
        })
}

// ── Provider ─────────────────────────────────────────────────────────

pub struct DecisionContextProvider<'a> {
    ledger: &'a ContextLedger,
    intel: &'a IntelligenceStore,
    config: &'a MuninnConfig,
}

impl<'a> DecisionContextProvider<'a> {
    pub fn new(
        ledger: &'a ContextLedger,
        intel: &'a IntelligenceStore,
        config: &'a MuninnConfig,
    ) -> Self {
        Self {
            ledger,
            intel,
            config,
        }
    }

    /// Consult the tiers in order and return the first real match.
    ///
    /// Tier 1 reads the live session's resolved decisions, Tier 2 the
    /// ledger's rolling window, Tier 3 the latest promoted pattern. Tier 1/2
    /// confidence is recomputed from the evidence; Tier 3 returns the
    /// pattern's stored confidence.
    pub fn get_decision_context(
        &self,
        session: &SessionCache,
        action: &str,
        shape: &ContextShape,
    ) -> Result<Recommendation> {
        let signature = trigger_signature(action, shape);

        if let Some((decision, stats, score)) = best_match(session.decisions(), &signature) {
            tracing::debug!(%signature, confidence = score, "tier-1 match");
            return Ok(Recommendation::Advice(DecisionAdvice {
                trigger_signature: signature,
                source: RecommendationSource::Session,
                recommended_action: decision,
                confidence: score,
                evidence_count: stats.evidence,
                success_count: stats.successes,
                last_seen: stats.last_seen,
                pattern_id: None,
            }));
        }

        let summaries = self.ledger.query(self.config.window_days)?;
        let window_decisions = summaries.iter().flat_map(|s| s.decisions.iter());
        if let Some((decision, stats, score)) = best_match(window_decisions, &signature) {
            tracing::debug!(%signature, confidence = score, "tier-2 match");
            return Ok(Recommendation::Advice(DecisionAdvice {
                trigger_signature: signature,
                source: RecommendationSource::Ledger,
                recommended_action: decision,
                confidence: score,
                evidence_count: stats.evidence,
                success_count: stats.successes,
                last_seen: stats.last_seen,
                pattern_id: None,
            }));
        }

        if let Some(pattern) = self.intel.lookup(&signature)? {
            tracing::debug!(%signature, confidence = pattern.confidence, "tier-3 match");
            return Ok(Recommendation::Advice(DecisionAdvice {
                trigger_signature: signature,
                source: RecommendationSource::Intelligence,
                recommended_action: pattern.recommended_action,
                confidence: pattern.confidence,
                evidence_count: pattern.evidence_count,
                success_count: pattern.success_count,
                last_seen: pattern.last_seen,
                pattern_id: Some(pattern.pattern_id),
            }));
        }

        tracing::debug!(%signature, "no data in any tier");
        Ok(Recommendation::NoData {
            trigger_signature: signature,
        })
    }

    /// Feed an outcome back into the live session's decision log. Resolves
    /// the matching pending record, or appends an already-resolved one when
    /// none is pending. Never writes to the ledger or intelligence store;
    /// propagation upward goes through conclude/promote/discover.
    pub fn report_outcome(
        &self,
        session: &mut SessionCache,
        action: &str,
        context: &ContextShape,
        outcome: DecisionOutcome,
        reason: Option<&str>,
    ) -> Result<()> {
        session.resolve_decision(action, context, outcome, reason)
    }
}
