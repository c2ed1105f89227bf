//! M1 — Batch policy normalizer: align decision arrays to request arrays,
//! synthesizing fail-closed denials on length mismatch or evaluator error
//! (spec §4.4, §8 scenario 4).

use super::{PolicyDecision, PolicyRequest};

/// Normalize the result of a batch policy evaluation against the requests
/// that produced it. If the evaluator itself errored, or it returned a
/// different number of decisions than requests, every request is denied
/// with a descriptive error rather than silently dropped or misaligned.
pub fn normalize_batch(
    requests: &[PolicyRequest],
    result: Result<Vec<PolicyDecision>, String>,
) -> Vec<PolicyDecision> {
    match result {
        Ok(decisions) if decisions.len() == requests.len() => decisions,
        Ok(decisions) => {
            let message = format!(
                "batch policy check returned {} decisions for {} requests",
                decisions.len(),
                requests.len()
            );
            vec![PolicyDecision::error(message); requests.len()]
        }
        Err(e) => {
            let message = format!("batch policy evaluation failed: {e}");
            vec![PolicyDecision::error(message); requests.len()]
        }
    }
}
