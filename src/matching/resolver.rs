//! Conflict resolution: merge strategy outputs into a unique 1:1 assignment

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::matching::MatchCandidate;
use crate::types::MatchRule;

/// Statistics describing one resolution pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchStatistics {
    /// Candidates fed into the resolver
    pub candidates: usize,
    /// Candidates accepted into the final assignment
    pub accepted: usize,
    /// Accepted counts per rule
    pub exact_count: usize,
    pub keyword_count: usize,
    pub fuzzy_count: usize,
    pub manual_count: usize,
    /// Accepted matches with confidence >= 90
    pub high_confidence: usize,
    /// Accepted matches with confidence 75-89
    pub medium_confidence: usize,
    /// Accepted matches with confidence < 75
    pub low_confidence: usize,
    /// Mean confidence over accepted matches, 0 when none
    pub average_confidence: f64,
    /// Candidates dropped because their transaction or line was already taken
    pub conflicts_resolved: usize,
}

/// Resolver output: the surviving assignment plus its statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub accepted: Vec<MatchCandidate>,
    pub stats: MatchStatistics,
}

/// Merges the candidate lists of all strategies and resolves conflicts into a
/// valid 1:1 assignment
///
/// Candidates are ordered by rule priority (exact over keyword over fuzzy),
/// then confidence, then smallest amount difference, and consumed greedily: a
/// pair is accepted only if neither its transaction nor its statement line was
/// taken by an earlier pair. Strategy execution order therefore never affects
/// the outcome, only this ordering does.
pub struct CompositeResolver;

impl CompositeResolver {
    /// Resolve a combined candidate list into a unique assignment
    pub fn resolve(mut candidates: Vec<MatchCandidate>) -> Resolution {
        let total = candidates.len();

        candidates.sort_by(|a, b| {
            b.rule
                .priority()
                .cmp(&a.rule.priority())
                .then(b.confidence.cmp(&a.confidence))
                .then(a.amount_diff.cmp(&b.amount_diff))
                // stable tail so equal candidates resolve deterministically
                .then(a.transaction_id.cmp(&b.transaction_id))
                .then(a.statement_line_id.cmp(&b.statement_line_id))
        });

        let mut taken_transactions: HashSet<String> = HashSet::new();
        let mut taken_lines: HashSet<String> = HashSet::new();
        let mut accepted = Vec::new();
        let mut conflicts_resolved = 0usize;

        for candidate in candidates {
            if taken_transactions.contains(&candidate.transaction_id) {
                conflicts_resolved += 1;
                continue;
            }
            if let Some(line_id) = &candidate.statement_line_id {
                if taken_lines.contains(line_id) {
                    conflicts_resolved += 1;
                    continue;
                }
            }

            taken_transactions.insert(candidate.transaction_id.clone());
            if let Some(line_id) = &candidate.statement_line_id {
                taken_lines.insert(line_id.clone());
            }
            accepted.push(candidate);
        }

        let stats = Self::statistics(total, conflicts_resolved, &accepted);
        Resolution { accepted, stats }
    }

    fn statistics(
        candidates: usize,
        conflicts_resolved: usize,
        accepted: &[MatchCandidate],
    ) -> MatchStatistics {
        let count_rule = |rule: MatchRule| accepted.iter().filter(|c| c.rule == rule).count();

        let high_confidence = accepted.iter().filter(|c| c.confidence >= 90).count();
        let medium_confidence = accepted
            .iter()
            .filter(|c| (75..90).contains(&c.confidence))
            .count();
        let low_confidence = accepted.iter().filter(|c| c.confidence < 75).count();

        let average_confidence = if accepted.is_empty() {
            0.0
        } else {
            accepted.iter().map(|c| c.confidence as f64).sum::<f64>() / accepted.len() as f64
        };

        MatchStatistics {
            candidates,
            accepted: accepted.len(),
            exact_count: count_rule(MatchRule::Exact),
            keyword_count: count_rule(MatchRule::Keyword),
            fuzzy_count: count_rule(MatchRule::Fuzzy),
            manual_count: count_rule(MatchRule::Manual),
            high_confidence,
            medium_confidence,
            low_confidence,
            average_confidence,
            conflicts_resolved,
        }
    }
}
