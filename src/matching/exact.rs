//! Exact matching: amount and date agree within tolerance

use crate::matching::{amount_diff, passes_base_gate, MatchCandidate, MatcherConfig, MatchStrategy};
use crate::types::*;

/// Pairs transactions with lines whose amount and date agree within the
/// configured tolerances
///
/// Runs first because it is definitionally the least ambiguous strategy;
/// every pair it emits carries confidence 100.
pub struct ExactMatcher;

impl MatchStrategy for ExactMatcher {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn rule(&self) -> MatchRule {
        MatchRule::Exact
    }

    fn propose(
        &self,
        transactions: &[LedgerTransaction],
        lines: &[StatementLine],
        config: &MatcherConfig,
    ) -> ReconResult<Vec<MatchCandidate>> {
        let mut candidates = Vec::new();

        for tx in transactions {
            for line in lines {
                if !passes_base_gate(tx, line, config) {
                    continue;
                }

                candidates.push(MatchCandidate {
                    transaction_id: tx.id.clone(),
                    statement_line_id: Some(line.id.clone()),
                    rule: MatchRule::Exact,
                    confidence: 100,
                    amount_diff: amount_diff(tx, line),
                });
            }
        }

        Ok(candidates)
    }
}
