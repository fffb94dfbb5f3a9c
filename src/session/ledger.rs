//! Session lifecycle orchestration: draft, match, balance, close

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::matching::{
    CompositeResolver, ExactMatcher, FuzzyMatcher, KeywordMatcher, MatchCandidate, MatchStatistics,
    MatchStrategy, MatcherConfig, StrategyKind,
};
use crate::session::candidates::{CandidateSelector, CandidateTransaction};
use crate::session::store::{DeleteMatchOutcome, MatchStore};
use crate::traits::*;
use crate::types::*;

/// Selection mode requested when drafting a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DraftSelection {
    /// The session owns a virtual statement keyed by its own id (default)
    Statement,
    /// Legacy period-bounded selection
    DateRange,
}

/// Inputs for creating a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDraft {
    pub account_id: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub start_balance: BigDecimal,
    pub closing_balance: BigDecimal,
    pub selection: DraftSelection,
}

/// Partial update of an open session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionUpdate {
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub start_balance: Option<BigDecimal>,
    pub closing_balance: Option<BigDecimal>,
}

/// Result of a batch matching run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRun {
    /// Active matches covered by the run, existing idempotent ones included
    pub matches: Vec<ReconciliationMatch>,
    pub statistics: MatchStatistics,
}

/// Result of a manual match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualMatchOutcome {
    pub match_id: String,
    /// Session position after the match, variance included
    pub summary: SessionSummary,
}

/// The session state machine: `draft -> closed` (terminal) or
/// `draft/closed -> deleted`
///
/// Owns session lifecycle, recomputes variance from active matches, gates
/// closing on balance integrity, and orchestrates batch matching runs through
/// the selector, the strategies, the resolver, and the match store.
pub struct SessionLedger<S: ReconStorage + Clone> {
    selector: CandidateSelector<S>,
    store: MatchStore<S>,
    storage: S,
    validator: Box<dyn SessionValidator>,
}

impl<S: ReconStorage + Clone> SessionLedger<S> {
    /// Create a new session ledger over the given storage backend
    pub fn new(storage: S) -> Self {
        Self {
            selector: CandidateSelector::new(storage.clone()),
            store: MatchStore::new(storage.clone()),
            storage,
            validator: Box::new(DefaultSessionValidator),
        }
    }

    /// Create a session ledger with a custom validator and balance hook
    pub fn with_collaborators(
        storage: S,
        validator: Box<dyn SessionValidator>,
        balance_hook: Box<dyn BalanceHook>,
    ) -> Self {
        Self {
            selector: CandidateSelector::new(storage.clone()),
            store: MatchStore::with_balance_hook(storage.clone(), balance_hook),
            storage,
            validator,
        }
    }

    /// Create a new reconciliation session in the draft state
    pub async fn create_session(
        &mut self,
        draft: SessionDraft,
    ) -> ReconResult<ReconciliationSession> {
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().naive_utc();

        let selection = match draft.selection {
            DraftSelection::Statement => SelectionMode::Statement {
                statement_id: id.clone(),
            },
            DraftSelection::DateRange => SelectionMode::DateRange {
                start: draft.period_start,
                end: draft.period_end,
            },
        };

        let session = ReconciliationSession {
            id,
            account_id: draft.account_id,
            period_start: draft.period_start,
            period_end: draft.period_end,
            start_balance: draft.start_balance,
            closing_balance: draft.closing_balance,
            selection,
            closed: false,
            variance: BigDecimal::from(0),
            created_at: now,
            updated_at: now,
        };

        self.validator.validate_session(&session)?;
        self.storage.save_session(&session).await?;

        info!(session_id = %session.id, account_id = %session.account_id, "session created");
        Ok(session)
    }

    /// Get a session by ID
    pub async fn get_session(
        &self,
        session_id: &str,
    ) -> ReconResult<Option<ReconciliationSession>> {
        self.storage.get_session(session_id).await
    }

    /// Recompute the session's balance position from its active matches
    pub async fn get_session_summary(&self, session_id: &str) -> ReconResult<SessionSummary> {
        let session = self.require_session(session_id).await?;
        self.summarize(&session).await
    }

    /// Eligible transactions for a session, in deterministic order
    ///
    /// Unknown sessions yield an empty list rather than an error.
    pub async fn get_candidate_transactions(
        &self,
        session_id: &str,
    ) -> ReconResult<Vec<CandidateTransaction>> {
        match self.storage.get_session(session_id).await? {
            Some(session) => self.selector.candidates_for_session(&session).await,
            None => Ok(Vec::new()),
        }
    }

    /// Run one or all matching strategies for a session and commit the
    /// resolved assignment
    ///
    /// Strategies see only unmatched transactions and unmatched statement
    /// lines. A strategy failure aborts this run tagged with the strategy
    /// name; it never touches the session itself.
    pub async fn run_matching(
        &mut self,
        session_id: &str,
        strategy: StrategyKind,
        config: &MatcherConfig,
    ) -> ReconResult<MatchRun> {
        let session = self.require_session(session_id).await?;
        if session.closed {
            return Err(ReconciliationError::SessionClosed(session.id));
        }

        let candidates = self.selector.candidates_for_session(&session).await?;
        let transactions: Vec<LedgerTransaction> = candidates
            .into_iter()
            .filter(|c| c.matched_in_session.is_none())
            .map(|c| c.transaction)
            .collect();

        let lines = self.unmatched_lines(&session).await?;

        let strategies: Vec<Box<dyn MatchStrategy>> = match strategy {
            StrategyKind::Exact => vec![Box::new(ExactMatcher)],
            StrategyKind::Keyword => vec![Box::new(KeywordMatcher)],
            StrategyKind::Fuzzy => vec![Box::new(FuzzyMatcher)],
            StrategyKind::All => vec![
                Box::new(ExactMatcher),
                Box::new(KeywordMatcher),
                Box::new(FuzzyMatcher),
            ],
        };

        let mut proposals = Vec::new();
        for matcher in &strategies {
            let mut found = matcher
                .propose(&transactions, &lines, config)
                .map_err(|err| ReconciliationError::Strategy {
                    strategy: matcher.name().to_string(),
                    message: err.to_string(),
                })?;
            proposals.append(&mut found);
        }

        let resolution = CompositeResolver::resolve(proposals);
        info!(
            session_id = %session.id,
            strategy = strategy.as_str(),
            candidates = resolution.stats.candidates,
            accepted = resolution.stats.accepted,
            conflicts = resolution.stats.conflicts_resolved,
            "matching run resolved"
        );

        let outcome = self
            .store
            .create_matches(&session, &resolution.accepted, MatchedBy::Auto)
            .await?;

        let mut matches = Vec::with_capacity(outcome.match_ids.len());
        for match_id in &outcome.match_ids {
            if let Some(row) = self.storage.get_match(match_id).await? {
                matches.push(row);
            }
        }

        Ok(MatchRun {
            matches,
            statistics: resolution.stats,
        })
    }

    /// Commit a resolved candidate batch produced outside `run_matching`
    pub async fn create_matches(
        &mut self,
        session_id: &str,
        candidates: &[MatchCandidate],
        matched_by: MatchedBy,
    ) -> ReconResult<crate::session::store::CreateMatchesOutcome> {
        let session = self.require_session(session_id).await?;
        self.store
            .create_matches(&session, candidates, matched_by)
            .await
    }

    /// Manually match one transaction into a session
    ///
    /// The degenerate one-candidate path through the match store: the session
    /// must be open, the transaction must belong to the session's account,
    /// and a transaction bound to a different live statement is rejected with
    /// that statement's id.
    pub async fn create_match(
        &mut self,
        session_id: &str,
        transaction_id: &str,
    ) -> ReconResult<ManualMatchOutcome> {
        let session = self.require_session(session_id).await?;
        if session.closed {
            return Err(ReconciliationError::SessionClosed(session.id));
        }

        let tx = self
            .storage
            .get_transaction(transaction_id)
            .await?
            .ok_or_else(|| ReconciliationError::TransactionNotFound(transaction_id.to_string()))?;
        if tx.account_id != session.account_id {
            return Err(ReconciliationError::TransactionNotFound(
                transaction_id.to_string(),
            ));
        }

        let candidate = MatchCandidate {
            transaction_id: tx.id,
            statement_line_id: None,
            rule: MatchRule::Manual,
            confidence: 100,
            amount_diff: BigDecimal::from(0),
        };

        let outcome = self
            .store
            .create_matches(&session, &[candidate], MatchedBy::Manual)
            .await?;
        let match_id = outcome
            .match_ids
            .first()
            .cloned()
            .ok_or_else(|| ReconciliationError::Storage("match batch returned no id".to_string()))?;

        let summary = self.summarize(&session).await?;
        Ok(ManualMatchOutcome { match_id, summary })
    }

    /// Deactivate a match and free its transaction
    pub async fn delete_match(&mut self, match_id: &str) -> ReconResult<DeleteMatchOutcome> {
        self.store.delete_match(match_id).await
    }

    /// Close a session, freezing its variance
    ///
    /// Fails when the session is already closed, and with an integrity error
    /// carrying the computed variance when the session is not balanced.
    pub async fn close_session(&mut self, session_id: &str) -> ReconResult<SessionSummary> {
        let mut session = self.require_session(session_id).await?;
        if session.closed {
            return Err(ReconciliationError::SessionClosed(session.id));
        }

        let summary = self.summarize(&session).await?;
        if !summary.is_balanced {
            return Err(ReconciliationError::UnbalancedSession {
                session_id: session.id,
                variance: summary.variance,
            });
        }

        session.closed = true;
        session.variance = summary.variance.clone();
        session.updated_at = chrono::Utc::now().naive_utc();

        if !self.storage.update_if_open(&session).await? {
            // A concurrent close won the compare-and-set.
            return Err(ReconciliationError::SessionClosed(session.id));
        }

        info!(session_id = %session.id, variance = %session.variance, "session closed");
        Ok(summary)
    }

    /// Update an open session's period or balances
    pub async fn update_session(
        &mut self,
        session_id: &str,
        update: SessionUpdate,
    ) -> ReconResult<ReconciliationSession> {
        let mut session = self.require_session(session_id).await?;
        if session.closed {
            return Err(ReconciliationError::SessionClosed(session.id));
        }

        if let Some(period_start) = update.period_start {
            session.period_start = period_start;
        }
        if let Some(period_end) = update.period_end {
            session.period_end = period_end;
        }
        if let Some(start_balance) = update.start_balance {
            session.start_balance = start_balance;
        }
        if let Some(closing_balance) = update.closing_balance {
            session.closing_balance = closing_balance;
        }
        if let SelectionMode::DateRange { start, end } = &mut session.selection {
            *start = session.period_start;
            *end = session.period_end;
        }
        session.updated_at = chrono::Utc::now().naive_utc();

        self.validator.validate_session(&session)?;

        if !self.storage.update_if_open(&session).await? {
            return Err(ReconciliationError::SessionClosed(session.id));
        }

        Ok(session)
    }

    /// Delete a session and reverse all of its effects
    ///
    /// Permitted regardless of closed state. Every match is deactivated and
    /// every transaction pointing at the session is released; returns how
    /// many transactions were freed.
    pub async fn delete_session(&mut self, session_id: &str) -> ReconResult<usize> {
        let session = self.require_session(session_id).await?;

        let released = self.store.release_session(&session).await?;
        self.storage.delete_session(&session.id).await?;

        info!(session_id = %session.id, released, "session deleted");
        Ok(released)
    }

    /// Statement lines not yet consumed by an active match in this session
    async fn unmatched_lines(
        &self,
        session: &ReconciliationSession,
    ) -> ReconResult<Vec<StatementLine>> {
        let lines = self
            .storage
            .list_statement_lines(session.statement_id())
            .await?;

        let matched: std::collections::HashSet<String> = self
            .storage
            .list_session_matches(&session.id, true)
            .await?
            .into_iter()
            .filter_map(|m| m.statement_line_id)
            .collect();

        Ok(lines
            .into_iter()
            .filter(|line| !matched.contains(&line.id))
            .collect())
    }

    async fn require_session(&self, session_id: &str) -> ReconResult<ReconciliationSession> {
        self.storage
            .get_session(session_id)
            .await?
            .ok_or_else(|| ReconciliationError::SessionNotFound(session_id.to_string()))
    }

    /// Variance formula: `(start_balance + reconciled) - closing_balance`
    async fn summarize(&self, session: &ReconciliationSession) -> ReconResult<SessionSummary> {
        let matches = self
            .storage
            .list_session_matches(&session.id, true)
            .await?;

        let mut reconciled_amount = BigDecimal::from(0);
        for row in &matches {
            let tx = self
                .storage
                .get_transaction(&row.transaction_id)
                .await?
                .ok_or_else(|| {
                    ReconciliationError::TransactionNotFound(row.transaction_id.clone())
                })?;
            reconciled_amount += &tx.signed_amount;
        }

        let calculated_balance = &session.start_balance + &reconciled_amount;
        let variance = &calculated_balance - &session.closing_balance;
        let is_balanced = variance.abs() < balance_epsilon();

        let candidates = self.selector.candidates_for_session(session).await?;
        let unmatched_count = candidates
            .iter()
            .filter(|c| c.matched_in_session.is_none())
            .count();

        Ok(SessionSummary {
            session_id: session.id.clone(),
            reconciled_amount,
            calculated_balance,
            variance,
            is_balanced,
            matched_count: matches.len(),
            unmatched_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::memory_storage::MemoryStore;

    fn draft(start_balance: &str, closing_balance: &str) -> SessionDraft {
        SessionDraft {
            account_id: "acct1".to_string(),
            period_start: NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2025, 10, 31).unwrap(),
            start_balance: start_balance.parse().unwrap(),
            closing_balance: closing_balance.parse().unwrap(),
            selection: DraftSelection::Statement,
        }
    }

    fn transaction(id: &str, amount: &str, day: u32) -> LedgerTransaction {
        let date = NaiveDate::from_ymd_opt(2025, 10, day).unwrap();
        LedgerTransaction {
            id: id.to_string(),
            account_id: "acct1".to_string(),
            signed_amount: amount.parse().unwrap(),
            effective_date: date,
            description: format!("Transaction {id}"),
            status: PostingStatus::Posted,
            is_transfer: false,
            statement_id: None,
            created_at: date.and_hms_opt(12, 0, 0).unwrap(),
        }
    }

    async fn seeded_ledger(
        transactions: &[LedgerTransaction],
    ) -> SessionLedger<MemoryStore> {
        let mut storage = MemoryStore::new();
        for tx in transactions {
            storage.save_transaction(tx).await.unwrap();
        }
        SessionLedger::new(storage)
    }

    #[tokio::test]
    async fn balanced_session_closes_and_freezes_variance() {
        let mut ledger = seeded_ledger(&[
            transaction("t1", "150.00", 5),
            transaction("t2", "50.00", 9),
        ])
        .await;

        let session = ledger
            .create_session(draft("1000.00", "1200.00"))
            .await
            .unwrap();
        ledger.create_match(&session.id, "t1").await.unwrap();
        let outcome = ledger.create_match(&session.id, "t2").await.unwrap();

        assert_eq!(outcome.summary.variance, BigDecimal::from(0));
        assert!(outcome.summary.is_balanced);

        let frozen = ledger.close_session(&session.id).await.unwrap();
        assert!(frozen.is_balanced);

        let stored = ledger.get_session(&session.id).await.unwrap().unwrap();
        assert!(stored.closed);
        assert_eq!(stored.variance, BigDecimal::from(0));
    }

    #[tokio::test]
    async fn unbalanced_session_fails_to_close_with_variance() {
        let mut ledger = seeded_ledger(&[
            transaction("t1", "150.00", 5),
            transaction("t2", "50.00", 9),
            transaction("t3", "50.00", 12),
        ])
        .await;

        let session = ledger
            .create_session(draft("1000.00", "1200.00"))
            .await
            .unwrap();
        ledger.create_match(&session.id, "t1").await.unwrap();
        ledger.create_match(&session.id, "t2").await.unwrap();
        ledger.create_match(&session.id, "t3").await.unwrap();

        let err = ledger.close_session(&session.id).await.unwrap_err();
        match err {
            ReconciliationError::UnbalancedSession { variance, .. } => {
                assert_eq!(variance, BigDecimal::from(50));
            }
            other => panic!("expected integrity error, got {other:?}"),
        }

        let stored = ledger.get_session(&session.id).await.unwrap().unwrap();
        assert!(!stored.closed);
    }

    #[tokio::test]
    async fn closed_sessions_reject_updates_and_matches() {
        let mut ledger = seeded_ledger(&[transaction("t1", "200.00", 5)]).await;

        let session = ledger
            .create_session(draft("1000.00", "1200.00"))
            .await
            .unwrap();
        ledger.create_match(&session.id, "t1").await.unwrap();
        ledger.close_session(&session.id).await.unwrap();

        let update = ledger
            .update_session(
                &session.id,
                SessionUpdate {
                    closing_balance: Some("1300.00".parse().unwrap()),
                    ..SessionUpdate::default()
                },
            )
            .await;
        assert!(matches!(update, Err(ReconciliationError::SessionClosed(_))));

        let again = ledger.close_session(&session.id).await;
        assert!(matches!(again, Err(ReconciliationError::SessionClosed(_))));
    }

    #[tokio::test]
    async fn manual_match_is_idempotent() {
        let mut ledger = seeded_ledger(&[transaction("t1", "25.00", 5)]).await;

        let session = ledger
            .create_session(draft("0.00", "25.00"))
            .await
            .unwrap();
        let first = ledger.create_match(&session.id, "t1").await.unwrap();
        let second = ledger.create_match(&session.id, "t1").await.unwrap();

        assert_eq!(first.match_id, second.match_id);
        assert_eq!(second.summary.matched_count, 1);
        assert_eq!(second.summary.reconciled_amount, BigDecimal::from(25));
    }

    #[tokio::test]
    async fn invalid_period_is_rejected() {
        let mut ledger = seeded_ledger(&[]).await;
        let mut bad = draft("0.00", "0.00");
        bad.period_end = bad.period_start;

        let err = ledger.create_session(bad).await.unwrap_err();
        assert!(matches!(err, ReconciliationError::Validation(_)));
    }
}
