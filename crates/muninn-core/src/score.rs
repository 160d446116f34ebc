//! Confidence scoring for patterns and tier recommendations.

/// Dampened confidence for `successes` out of `resolved` evidence records:
/// `successes / (resolved + 1)`.
///
/// Approaches the raw success ratio as evidence grows, strictly rises with
/// each added success and strictly falls with each added failure, and stays
/// below the default 0.75 promotion threshold while evidence is under the
/// default minimum of 3 (at most 2/3 with two records). Three straight
/// successes score 0.75 exactly.
pub fn confidence(successes: u64, resolved: u64) -> f64 {
    if resolved == 0 {
        return 0.0;
    }
    successes as f64 / (resolved as f64 + 1.0)
}
