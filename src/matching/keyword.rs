//! Keyword matching: descriptions share significant tokens

use crate::matching::text::{shared_token_count, tokenize};
use crate::matching::{amount_diff, passes_base_gate, MatchCandidate, MatcherConfig, MatchStrategy};
use crate::types::*;

/// Keyword matches never reach exact confidence
const KEYWORD_CONFIDENCE_CAP: u8 = 95;

/// Pairs transactions with lines whose descriptions share enough significant
/// tokens, on top of the same amount/date/sign gate as exact matching
///
/// Tokens come from [`tokenize`](crate::matching::text::tokenize): lowercase,
/// punctuation stripped, short tokens and stopwords dropped. The bank
/// reference, when present, contributes tokens too.
pub struct KeywordMatcher;

impl KeywordMatcher {
    /// Confidence from token overlap, capped at 95
    ///
    /// A tiered base grows with the overlap count, the overlap ratio adds up
    /// to 15 points, and each shared token adds a small bonus so that pairs
    /// sharing many exact tokens edge out pairs sharing a few generic ones.
    fn confidence(shared: usize, tokens_a: usize, tokens_b: usize) -> u8 {
        let base: u8 = match shared {
            0 | 1 => return 0,
            2 => 55,
            3 => 65,
            4 => 72,
            _ => 78,
        };

        let largest = tokens_a.max(tokens_b).max(1);
        let ratio_bonus = ((shared as f64 / largest as f64) * 15.0).round() as u8;
        let token_bonus = (shared as u8).saturating_mul(2).min(10);

        (base + ratio_bonus + token_bonus).min(KEYWORD_CONFIDENCE_CAP)
    }
}

impl MatchStrategy for KeywordMatcher {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn rule(&self) -> MatchRule {
        MatchRule::Keyword
    }

    fn propose(
        &self,
        transactions: &[LedgerTransaction],
        lines: &[StatementLine],
        config: &MatcherConfig,
    ) -> ReconResult<Vec<MatchCandidate>> {
        let tx_tokens: Vec<_> = transactions
            .iter()
            .map(|tx| tokenize(&tx.description))
            .collect();
        let line_tokens: Vec<_> = lines
            .iter()
            .map(|line| match &line.reference {
                Some(reference) => tokenize(&format!("{} {}", line.description, reference)),
                None => tokenize(&line.description),
            })
            .collect();

        let mut candidates = Vec::new();

        for (tx, tokens_a) in transactions.iter().zip(&tx_tokens) {
            for (line, tokens_b) in lines.iter().zip(&line_tokens) {
                let shared = shared_token_count(tokens_a, tokens_b);
                if shared < config.keyword_min_overlap || shared < 2 {
                    continue;
                }

                if !passes_base_gate(tx, line, config) {
                    continue;
                }

                candidates.push(MatchCandidate {
                    transaction_id: tx.id.clone(),
                    statement_line_id: Some(line.id.clone()),
                    rule: MatchRule::Keyword,
                    confidence: Self::confidence(shared, tokens_a.len(), tokens_b.len()),
                    amount_diff: amount_diff(tx, line),
                });
            }
        }

        Ok(candidates)
    }
}
