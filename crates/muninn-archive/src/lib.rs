//! Archive integrity: ground-truth baselines for archived items, full and
//! sampled re-verification, and an append-only tamper-finding log.
//!
//! A baseline digest is ground truth once written. It changes only through
//! an explicit, logged re-baseline that keeps the prior revision as history.
//! Findings are never auto-resolved; a tampered item returns to verified
//! only through an explicit acknowledgment record.

pub mod baseline;
pub mod finding;
mod store;

pub use baseline::{ArchiveBaselineEntry, BaselineRevision};
pub use finding::{Acknowledgment, FindingKind, Severity, TamperFinding};
pub use store::{ArchiveIntegrityStore, ItemState, VerifyReport};
