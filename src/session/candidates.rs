//! Candidate selection: which ledger transactions a session may match

use serde::{Deserialize, Serialize};

use crate::traits::*;
use crate::types::*;

/// A transaction eligible for matching, annotated with the session (if any)
/// currently holding an active match on it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateTransaction {
    pub transaction: LedgerTransaction,
    pub matched_in_session: Option<String>,
}

/// Read-only selector producing the transactions a session may reconcile
///
/// Two modes, chosen by the session's [`SelectionMode`]: statement-centric
/// (ownership-aware, gated by an upper-bound closing date only) and the
/// legacy date-range mode. Selection never writes; an unknown account simply
/// yields an empty list.
pub struct CandidateSelector<S> {
    storage: S,
}

impl<S: TransactionRepo + SessionRepo + MatchRepo> CandidateSelector<S> {
    /// Create a new selector over the given storage backend
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Eligible transactions for a session, deterministically ordered by
    /// effective date, then signed amount, then creation time
    pub async fn candidates_for_session(
        &self,
        session: &ReconciliationSession,
    ) -> ReconResult<Vec<CandidateTransaction>> {
        let transactions = self
            .storage
            .list_account_transactions(&session.account_id)
            .await?;

        let mut eligible = Vec::new();
        for tx in transactions {
            let keep = match &session.selection {
                SelectionMode::Statement { statement_id } => {
                    self.statement_eligible(&tx, session, statement_id).await?
                }
                SelectionMode::DateRange { start, end } => {
                    tx.is_matchable() && tx.effective_date >= *start && tx.effective_date <= *end
                }
            };

            if keep {
                let matched_in_session = self
                    .storage
                    .find_active_by_transaction(&tx.id)
                    .await?
                    .map(|m| m.session_id);
                eligible.push(CandidateTransaction {
                    transaction: tx,
                    matched_in_session,
                });
            }
        }

        eligible.sort_by(|a, b| {
            a.transaction
                .effective_date
                .cmp(&b.transaction.effective_date)
                .then(a.transaction.signed_amount.cmp(&b.transaction.signed_amount))
                .then(a.transaction.created_at.cmp(&b.transaction.created_at))
        });

        Ok(eligible)
    }

    /// Statement-centric eligibility
    ///
    /// Posted, non-transfer, dated on or before the statement closing date
    /// (no lower bound), and either unowned, owned by this statement, or
    /// owned by a statement whose session no longer exists. The last case
    /// self-heals assignments orphaned by writers that bypassed the engine.
    async fn statement_eligible(
        &self,
        tx: &LedgerTransaction,
        session: &ReconciliationSession,
        statement_id: &str,
    ) -> ReconResult<bool> {
        if !tx.is_matchable() || tx.effective_date > session.period_end {
            return Ok(false);
        }

        match &tx.statement_id {
            None => Ok(true),
            Some(owner) if owner == statement_id => Ok(true),
            Some(owner) => Ok(!self.storage.session_exists(owner).await?),
        }
    }
}
