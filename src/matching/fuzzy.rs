//! Fuzzy matching: descriptions are similar under a string metric

use crate::matching::text::normalize;
use crate::matching::{amount_diff, passes_base_gate, MatchCandidate, MatcherConfig, MatchStrategy};
use crate::types::*;

/// Fuzzy matches never reach exact confidence
const FUZZY_CONFIDENCE_CAP: u8 = 90;

/// Similarity index over normalized statement-line descriptions
///
/// Built once per matching run and searched with each transaction's
/// normalized description; entries whose similarity clears the threshold come
/// back with their score.
struct SimilarityIndex<'a> {
    entries: Vec<(&'a StatementLine, String)>,
}

impl<'a> SimilarityIndex<'a> {
    fn build(lines: &'a [StatementLine]) -> Self {
        Self {
            entries: lines
                .iter()
                .map(|line| (line, normalize(&line.description)))
                .collect(),
        }
    }

    /// Lines whose normalized description is at least `threshold` (0-100)
    /// similar to the query, with their similarity score
    fn search(&self, query: &str, threshold: u8) -> Vec<(&'a StatementLine, u8)> {
        self.entries
            .iter()
            .filter_map(|(line, normalized)| {
                let score = similarity(query, normalized);
                (score >= threshold).then_some((*line, score))
            })
            .collect()
    }
}

/// Normalized Levenshtein similarity as a 0-100 score
fn similarity(a: &str, b: &str) -> u8 {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    (strsim::normalized_levenshtein(a, b) * 100.0).round() as u8
}

/// Pairs transactions with lines whose descriptions are similar under a
/// normalized edit-distance metric, on top of the usual amount/date/sign gate
///
/// Confidence equals the similarity score, capped at 90 so a fuzzy match can
/// never outrank an exact one.
pub struct FuzzyMatcher;

impl MatchStrategy for FuzzyMatcher {
    fn name(&self) -> &'static str {
        "fuzzy"
    }

    fn rule(&self) -> MatchRule {
        MatchRule::Fuzzy
    }

    fn propose(
        &self,
        transactions: &[LedgerTransaction],
        lines: &[StatementLine],
        config: &MatcherConfig,
    ) -> ReconResult<Vec<MatchCandidate>> {
        let index = SimilarityIndex::build(lines);
        let mut candidates = Vec::new();

        for tx in transactions {
            let query = normalize(&tx.description);

            for (line, score) in index.search(&query, config.fuzzy_threshold) {
                if !passes_base_gate(tx, line, config) {
                    continue;
                }

                candidates.push(MatchCandidate {
                    transaction_id: tx.id.clone(),
                    statement_line_id: Some(line.id.clone()),
                    rule: MatchRule::Fuzzy,
                    confidence: score.min(FUZZY_CONFIDENCE_CAP),
                    amount_diff: amount_diff(tx, line),
                });
            }
        }

        Ok(candidates)
    }
}
