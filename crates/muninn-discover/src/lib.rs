//! Pattern discovery: clusters resolved decisions from the context ledger
//! window by trigger signature and promotes durable patterns to the
//! intelligence store.
//!
//! Runs on an external cadence only; nothing here schedules itself. A
//! candidate group is durable only once promoted — groups under the
//! threshold are discarded, not stored.

use muninn_core::config::MuninnConfig;
use muninn_core::score::confidence;
use muninn_core::{id, DecisionOutcome, Pattern, Result, SCHEMA_VERSION};
use muninn_intel::IntelligenceStore;
use muninn_ledger::ContextLedger;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// What one discovery run did.
#[derive(Debug)]
pub struct DiscoveryReport {
    pub summaries_scanned: usize,
    pub signatures_seen: usize,
    pub promoted: Vec<Pattern>,
    pub discarded: usize,
    pub cancelled: bool,
}

/// Per-action tallies within one signature group.
#[derive(Debug, Default)]
struct ActionStats {
    evidence: u64,
    successes: u64,
    last_seen: String,
}

/// Aggregated evidence for one trigger signature.
#[derive(Debug, Default)]
struct Group {
    evidence: u64,
    successes: u64,
    first_seen: String,
    last_seen: String,
    actions: BTreeMap<String, ActionStats>,
}

pub struct PatternDiscoveryEngine<'a> {
    ledger: &'a ContextLedger,
    intel: &'a IntelligenceStore,
    config: &'a MuninnConfig,
}

impl<'a> PatternDiscoveryEngine<'a> {
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

    /// One discovery pass over the trailing `window_days` of the ledger.
    /// Checks the cancellation flag between summaries; groups gathered up to
    /// that point are still evaluated and the partial report returned.
    ///
    /// Records already absorbed by a prior promoted version (at or before
    /// its `last_seen`) are not counted again, so a re-run over an
    /// unchanged or overlapping window leaves the stored pattern untouched.
    pub fn run(&self, window_days: u64, cancel: &AtomicBool) -> Result<DiscoveryReport> {
        let summaries = self.ledger.query(window_days)?;
        let mut groups: BTreeMap<String, Group> = BTreeMap::new();
        let mut priors: BTreeMap<String, Option<Pattern>> = BTreeMap::new();
        let mut scanned = 0usize;
        let mut cancelled = false;

        for summary in &summaries {
            if cancel.load(Ordering::Relaxed) {
                cancelled = true;
                break;
            }
            scanned += 1;
            for decision in &summary.decisions {
                // Pending decisions carry no evidence weight.
                if !decision.is_resolved() {
                    continue;
                }
                let sig = decision.trigger_signature();
                if !priors.contains_key(&sig) {
                    priors.insert(sig.clone(), self.intel.lookup(&sig)?);
                }
                // Everything up to the prior version's last_seen is already
                // inside its cumulative totals.
                if let Some(Some(prior)) = priors.get(&sig) {
                    if decision.ts <= prior.last_seen {
                        continue;
                    }
                }
                let group = groups.entry(sig).or_default();
                group.evidence += 1;
                if group.first_seen.is_empty() || decision.ts < group.first_seen {
                    group.first_seen = decision.ts.clone();
                }
                if decision.ts > group.last_seen {
                    group.last_seen = decision.ts.clone();
                }
                let stats = group.actions.entry(decision.decision.clone()).or_default();
                stats.evidence += 1;
                if decision.outcome == DecisionOutcome::Success {
                    group.successes += 1;
                    stats.successes += 1;
                    if decision.ts > stats.last_seen {
                        stats.last_seen = decision.ts.clone();
                    }
                }
            }
        }

        let signatures_seen = groups.len();
        let mut promoted = Vec::new();
        let mut discarded = 0usize;

        for (signature, group) in groups {
            let prior = priors.remove(&signature).flatten();
            let (evidence, successes, first_seen) = match &prior {
                Some(p) => (
                    p.evidence_count + group.evidence,
                    p.success_count + group.successes,
                    p.first_seen.clone(),
                ),
                None => (group.evidence, group.successes, group.first_seen.clone()),
            };
            let score = confidence(successes, evidence);
            if score < self.config.promote_threshold || evidence < self.config.min_evidence {
                discarded += 1;
                continue;
            }

            let recommended_action = best_action(&group)
                .or_else(|| prior.as_ref().map(|p| p.recommended_action.clone()));
            let recommended_action = match recommended_action {
                Some(a) => a,
                // A gate-passing group with no successful action anywhere
                // has nothing to recommend.
                None => {
                    discarded += 1;
                    continue;
                }
            };

            let pattern = Pattern {
                pattern_id: id::pattern(),
                trigger_signature: signature.clone(),
                description: format!(
                    "{signature}: \"{recommended_action}\" succeeded {successes} of {evidence} times"
                ),
                recommended_action,
                confidence: score,
                evidence_count: evidence,
                success_count: successes,
                first_seen,
                last_seen: group.last_seen.clone(),
                promoted_at: muninn_core::clock::now_rfc3339(),
                supersedes: None,
                schema_version: SCHEMA_VERSION,
            };
            promoted.push(self.intel.promote(pattern)?);
        }

        tracing::debug!(
            scanned,
            signatures_seen,
            promoted = promoted.len(),
            discarded,
            cancelled,
            "pattern discovery pass complete"
        );
        Ok(DiscoveryReport {
            summaries_scanned: scanned,
            signatures_seen,
            promoted,
            discarded,
            cancelled,
        })
    }
}

/// Pick the recommended action for a group: highest per-action confidence,
/// ties broken by most recent successful use. Actions that never succeeded
/// are never recommended.
fn best_action(group: &Group) -> Option<String> {
    group
        .actions
        .iter()
        .filter(|(_, s)| s.successes > 0)
        .max_by(|(_, a), (_, b)| {
            let ca = confidence(a.successes, a.evidence);
            let cb = confidence(b.successes, b.evidence);
            ca.partial_cmp(&cb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.last_seen.cmp(&b.last_seen))
        })
        .map(|(action, _)| action.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use muninn_core::clock::now_rfc3339;
    use muninn_core::{
        ContextShape, DecisionRecord, SessionOutcome, SessionSummary,
    };
    use muninn_store::MuninnPaths;

    fn decision(action: &str, decision_text: &str, outcome: DecisionOutcome) -> DecisionRecord {
        DecisionRecord {
            action: action.to_string(),
            context: ContextShape::ArchiveItem,
            decision: decision_text.to_string(),
            rationale: "r".into(),
            ts: now_rfc3339(),
            outcome,
            outcome_reason: None,
        }
    }

    fn summary(id: &str, decisions: Vec<DecisionRecord>) -> SessionSummary {
        SessionSummary {
            session_id: id.to_string(),
            started_at: now_rfc3339(),
            ended_at: now_rfc3339(),
            outcome: SessionOutcome::Success,
            task: "t".into(),
            decisions,
            files: Vec::new(),
            schema_version: SCHEMA_VERSION,
        }
    }

    struct Fixture {
        _tmp: tempfile::TempDir,
        ledger: ContextLedger,
        intel: IntelligenceStore,
        config: MuninnConfig,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let paths = MuninnPaths::discover(tmp.path());
        Fixture {
            ledger: ContextLedger::open(paths.clone(), MuninnConfig::default()).unwrap(),
            intel: IntelligenceStore::open(paths).unwrap(),
            config: MuninnConfig::default(),
            _tmp: tmp,
        }
    }

    fn no_cancel() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[test]
    fn two_successes_stay_below_promotion_gate() {
        let fx = fixture();
        for i in 0..2 {
            let s = summary(
                &format!("ses_{i}"),
                vec![
                    decision("archive pyc files", "move to archive", DecisionOutcome::Success),
                    decision("unrelated", "noop", DecisionOutcome::Success),
                ],
            );
            assert!(fx.ledger.promote(&s).unwrap().promoted());
        }
        let engine = PatternDiscoveryEngine::new(&fx.ledger, &fx.intel, &fx.config);
        let report = engine.run(30, &no_cancel()).unwrap();

        assert_eq!(report.summaries_scanned, 2);
        assert!(report.promoted.is_empty());
        // Evidence 2 gives confidence 2/3: above zero, below the gate.
        assert!(fx
            .intel
            .lookup("archive_pyc_files:archive_item")
            .unwrap()
            .is_none());
    }

    #[test]
    fn third_success_promotes_the_pattern() {
        let fx = fixture();
        for i in 0..3 {
            let s = summary(
                &format!("ses_{i}"),
                vec![
                    decision("archive pyc files", "move to archive", DecisionOutcome::Success),
                    decision("pad", "noop", DecisionOutcome::Failure),
                ],
            );
            fx.ledger.promote(&s).unwrap();
        }
        let engine = PatternDiscoveryEngine::new(&fx.ledger, &fx.intel, &fx.config);
        let report = engine.run(30, &no_cancel()).unwrap();

        assert_eq!(report.promoted.len(), 1);
        let p = fx
            .intel
            .lookup("archive_pyc_files:archive_item")
            .unwrap()
            .unwrap();
        assert_eq!(p.evidence_count, 3);
        assert_eq!(p.success_count, 3);
        assert!(p.confidence >= 0.75);
        assert_eq!(p.recommended_action, "move to archive");
    }

    #[test]
    fn lone_failure_yields_nothing() {
        let fx = fixture();
        let s = summary(
            "ses_f",
            vec![
                decision("risky move", "force it", DecisionOutcome::Failure),
                decision("pad", "noop", DecisionOutcome::Success),
            ],
        );
        fx.ledger.promote(&s).unwrap();
        let engine = PatternDiscoveryEngine::new(&fx.ledger, &fx.intel, &fx.config);
        let report = engine.run(30, &no_cancel()).unwrap();
        assert!(report.promoted.is_empty());
        assert!(fx.intel.lookup("risky_move:archive_item").unwrap().is_none());
    }

    #[test]
    fn pending_decisions_carry_no_evidence() {
        let fx = fixture();
        let s = summary(
            "ses_p",
            vec![
                decision("a", "x", DecisionOutcome::Pending),
                decision("b", "y", DecisionOutcome::Pending),
            ],
        );
        fx.ledger.promote(&s).unwrap();
        let engine = PatternDiscoveryEngine::new(&fx.ledger, &fx.intel, &fx.config);
        let report = engine.run(30, &no_cancel()).unwrap();
        assert_eq!(report.signatures_seen, 0);
    }

    #[test]
    fn existing_pattern_gains_cumulative_evidence() {
        let fx = fixture();
        for i in 0..3 {
            let s = summary(
                &format!("ses_{i}"),
                vec![
                    decision("deploy", "roll forward", DecisionOutcome::Success),
                    decision("pad", "noop", DecisionOutcome::Success),
                ],
            );
            fx.ledger.promote(&s).unwrap();
        }
        let engine = PatternDiscoveryEngine::new(&fx.ledger, &fx.intel, &fx.config);
        engine.run(30, &no_cancel()).unwrap();
        let v1 = fx.intel.lookup("deploy:archive_item").unwrap().unwrap();
        assert_eq!(v1.evidence_count, 3);

        // A later window with two more successes supersedes v1 cumulatively.
        for i in 3..5 {
            let s = summary(
                &format!("ses_{i}"),
                vec![
                    decision("deploy", "roll forward", DecisionOutcome::Success),
                    decision("pad", "noop", DecisionOutcome::Success),
                ],
            );
            fx.ledger.promote(&s).unwrap();
        }
        // The window still contains the first three records, but only the
        // two new ones count toward the superseding version.
        engine.run(30, &no_cancel()).unwrap();
        let v2 = fx.intel.lookup("deploy:archive_item").unwrap().unwrap();
        assert_eq!(v2.evidence_count, 5);
        assert_eq!(v2.success_count, 5);
        assert_eq!(v2.supersedes.as_deref(), Some(v1.pattern_id.as_str()));
        assert_eq!(v2.first_seen, v1.first_seen);
        assert!(v2.confidence >= v1.confidence);
        assert_eq!(
            fx.intel
                .superseded_versions("deploy:archive_item")
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn rerun_over_unchanged_window_adds_no_evidence() {
        let fx = fixture();
        for i in 0..3 {
            let s = summary(
                &format!("ses_{i}"),
                vec![
                    decision("archive pyc files", "move to archive", DecisionOutcome::Success),
                    decision("tidy docs", "rewrite index", DecisionOutcome::Success),
                ],
            );
            fx.ledger.promote(&s).unwrap();
        }
        let engine = PatternDiscoveryEngine::new(&fx.ledger, &fx.intel, &fx.config);
        let first = engine.run(30, &no_cancel()).unwrap();
        assert_eq!(first.promoted.len(), 2);
        let v1 = fx
            .intel
            .lookup("archive_pyc_files:archive_item")
            .unwrap()
            .unwrap();
        assert_eq!(v1.evidence_count, 3);

        // Same window, no new sessions: the stored pattern must not move.
        let second = engine.run(30, &no_cancel()).unwrap();
        assert!(second.promoted.is_empty());
        assert_eq!(second.signatures_seen, 0);
        let latest = fx
            .intel
            .lookup("archive_pyc_files:archive_item")
            .unwrap()
            .unwrap();
        assert_eq!(latest.pattern_id, v1.pattern_id);
        assert_eq!(latest.evidence_count, 3);
        assert!((latest.confidence - 0.75).abs() < 1e-9);
        assert_eq!(
            fx.intel
                .versions("archive_pyc_files:archive_item")
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn competing_actions_tie_break_on_confidence() {
        let fx = fixture();
        let s = summary(
            "ses_mix",
            vec![
                decision("fix build", "clean rebuild", DecisionOutcome::Success),
                decision("fix build", "clean rebuild", DecisionOutcome::Success),
                decision("fix build", "clean rebuild", DecisionOutcome::Success),
                decision("fix build", "clean rebuild", DecisionOutcome::Success),
                decision("fix build", "clean rebuild", DecisionOutcome::Success),
                decision("fix build", "patch lockfile", DecisionOutcome::Success),
                decision("fix build", "patch lockfile", DecisionOutcome::Failure),
            ],
        );
        fx.ledger.promote(&s).unwrap();
        let engine = PatternDiscoveryEngine::new(&fx.ledger, &fx.intel, &fx.config);
        let report = engine.run(30, &no_cancel()).unwrap();
        assert_eq!(report.promoted.len(), 1);
        assert_eq!(report.promoted[0].recommended_action, "clean rebuild");
        assert_eq!(report.promoted[0].evidence_count, 7);
        assert_eq!(report.promoted[0].success_count, 6);
    }

    #[test]
    fn cancellation_returns_partial_report() {
        let fx = fixture();
        let s = summary(
            "ses_a",
            vec![
                decision("a", "x", DecisionOutcome::Success),
                decision("b", "y", DecisionOutcome::Success),
            ],
        );
        fx.ledger.promote(&s).unwrap();
        let engine = PatternDiscoveryEngine::new(&fx.ledger, &fx.intel, &fx.config);
        let cancel = AtomicBool::new(true);
        let report = engine.run(30, &cancel).unwrap();
        assert!(report.cancelled);
        assert_eq!(report.summaries_scanned, 0);
    }
}
