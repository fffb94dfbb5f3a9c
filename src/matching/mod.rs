//! Matching strategies for pairing ledger transactions with statement lines
//!
//! Three escalating strategies propose candidate pairs: exact (amount and
//! date agree), keyword (descriptions share significant tokens), and fuzzy
//! (descriptions are similar under a string metric). Strategies are pure and
//! read-only; the [`resolver::CompositeResolver`] turns their combined output
//! into a unique 1:1 assignment.

pub mod exact;
pub mod fuzzy;
pub mod keyword;
pub mod resolver;
pub mod text;

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::types::*;

pub use exact::ExactMatcher;
pub use fuzzy::FuzzyMatcher;
pub use keyword::KeywordMatcher;
pub use resolver::{CompositeResolver, MatchStatistics, Resolution};

/// Tolerances and thresholds for a matching run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Maximum absolute amount difference for a pair to qualify
    pub amount_tolerance: BigDecimal,
    /// Maximum distance in days between transaction and line dates
    pub date_tolerance_days: i64,
    /// Minimum shared significant tokens for a keyword match
    pub keyword_min_overlap: usize,
    /// Minimum similarity score (0-100) for a fuzzy match
    pub fuzzy_threshold: u8,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            amount_tolerance: BigDecimal::from(5) / BigDecimal::from(1000),
            date_tolerance_days: 1,
            keyword_min_overlap: 2,
            fuzzy_threshold: 85,
        }
    }
}

/// Which strategies a matching run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyKind {
    Exact,
    Keyword,
    Fuzzy,
    All,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Keyword => "keyword",
            Self::Fuzzy => "fuzzy",
            Self::All => "all",
        }
    }
}

/// A (transaction, statement line) pair proposed by a strategy, not yet
/// committed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub transaction_id: String,
    /// Absent only for manual statement-only matches
    pub statement_line_id: Option<String>,
    pub rule: MatchRule,
    /// 0-100; each strategy documents its own ceiling
    pub confidence: u8,
    /// Absolute amount difference, used as the final resolver tiebreak
    pub amount_diff: BigDecimal,
}

/// A matching strategy producing candidate pairs
///
/// Implementations are pure: they read the unmatched transactions and lines
/// they are given and propose pairs without touching storage, so they can run
/// in any order (or concurrently) with identical results.
pub trait MatchStrategy: Send + Sync {
    /// Strategy name, used to tag errors and log events
    fn name(&self) -> &'static str;

    /// Rule recorded on matches this strategy produces
    fn rule(&self) -> MatchRule;

    /// Propose candidate pairs from unmatched transactions and lines
    fn propose(
        &self,
        transactions: &[LedgerTransaction],
        lines: &[StatementLine],
        config: &MatcherConfig,
    ) -> ReconResult<Vec<MatchCandidate>>;
}

/// Absolute difference between a transaction amount and a line amount
pub(crate) fn amount_diff(tx: &LedgerTransaction, line: &StatementLine) -> BigDecimal {
    (&tx.signed_amount - &line.signed_amount).abs()
}

/// The gate every strategy applies before scoring a pair
///
/// Posted, non-transfer, sign agreement, amount within tolerance, and date
/// within tolerance. Strategies differ only in what they add on top.
pub(crate) fn passes_base_gate(
    tx: &LedgerTransaction,
    line: &StatementLine,
    config: &MatcherConfig,
) -> bool {
    if !tx.is_matchable() {
        return false;
    }

    let zero = BigDecimal::from(0);
    if (tx.signed_amount >= zero) != (line.signed_amount >= zero) {
        return false;
    }

    if amount_diff(tx, line) > config.amount_tolerance {
        return false;
    }

    let days_apart = (tx.effective_date - line.line_date).num_days().abs();
    days_apart <= config.date_tolerance_days
}
