//! Match persistence: the single-active-match and ownership invariants

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::matching::MatchCandidate;
use crate::traits::*;
use crate::types::*;

/// Outcome of a batch match insert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateMatchesOutcome {
    /// IDs of all active matches covered by the batch, existing ones included
    pub match_ids: Vec<String>,
    /// Matches newly inserted by this call
    pub inserted: usize,
    /// Candidates that were already actively matched in this session
    pub already_matched: usize,
}

/// Outcome of a match deletion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteMatchOutcome {
    /// False when the match was already deactivated
    pub deleted: bool,
    /// Transaction the match referenced, released if this session owned it
    pub transaction_id: String,
}

/// Persists matches while enforcing the ownership invariants
///
/// Every insert binds the transaction to the session's statement through the
/// repository's compare-and-set, and a batch either commits whole or not at
/// all: a mid-batch failure is compensated by deactivating the rows already
/// written and releasing their ownership.
pub struct MatchStore<S> {
    storage: S,
    balance_hook: Box<dyn BalanceHook>,
}

impl<S: SessionRepo + MatchRepo + TransactionRepo> MatchStore<S> {
    /// Create a new match store without a balance collaborator
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            balance_hook: Box::new(NullBalanceHook),
        }
    }

    /// Create a new match store that notifies a balance subsystem after
    /// ownership changes
    pub fn with_balance_hook(storage: S, balance_hook: Box<dyn BalanceHook>) -> Self {
        Self {
            storage,
            balance_hook,
        }
    }

    /// Insert a batch of matches and assign ownership, all or nothing
    ///
    /// A candidate whose transaction is already actively matched in this
    /// session (with ownership still pointing here) counts as idempotent
    /// success. A transaction bound to a different live statement fails the
    /// whole batch with an ownership conflict; nothing is left half-applied.
    pub async fn create_matches(
        &mut self,
        session: &ReconciliationSession,
        candidates: &[MatchCandidate],
        matched_by: MatchedBy,
    ) -> ReconResult<CreateMatchesOutcome> {
        if session.closed {
            return Err(ReconciliationError::SessionClosed(session.id.clone()));
        }

        let statement_id = session.statement_id().to_string();

        // Validate the whole batch before writing anything.
        let mut to_insert = Vec::new();
        let mut existing_ids = Vec::new();
        let mut batch_transactions = std::collections::HashSet::new();
        for candidate in candidates {
            if !batch_transactions.insert(candidate.transaction_id.clone()) {
                return Err(ReconciliationError::Validation(format!(
                    "Transaction {} appears more than once in the batch",
                    candidate.transaction_id
                )));
            }

            if candidate.confidence > 100 {
                return Err(ReconciliationError::Validation(format!(
                    "Confidence {} for transaction {} exceeds 100",
                    candidate.confidence, candidate.transaction_id
                )));
            }

            let tx = self
                .storage
                .get_transaction(&candidate.transaction_id)
                .await?
                .ok_or_else(|| {
                    ReconciliationError::TransactionNotFound(candidate.transaction_id.clone())
                })?;

            if tx.account_id != session.account_id {
                return Err(ReconciliationError::Validation(format!(
                    "Transaction {} belongs to account {}, not {}",
                    tx.id, tx.account_id, session.account_id
                )));
            }

            if let Some(active) = self
                .storage
                .find_active_by_transaction(&candidate.transaction_id)
                .await?
            {
                if active.session_id == session.id {
                    existing_ids.push(active.id);
                    continue;
                }
                warn!(
                    transaction_id = %tx.id,
                    owning_session = %active.session_id,
                    "batch rejected: transaction actively matched elsewhere"
                );
                return Err(ReconciliationError::OwnershipConflict {
                    transaction_id: tx.id,
                    owning_statement_id: active.session_id,
                });
            }

            if let Some(owner) = &tx.statement_id {
                if owner != &statement_id {
                    if self.storage.session_exists(owner).await? {
                        return Err(ReconciliationError::OwnershipConflict {
                            transaction_id: tx.id.clone(),
                            owning_statement_id: owner.clone(),
                        });
                    }
                    // Orphaned binding: the owning session is gone, heal it
                    // before the compare-and-set below.
                    debug!(transaction_id = %tx.id, stale_owner = %owner, "releasing orphaned ownership");
                    self.storage.release_statement(&tx.id, owner).await?;
                }
            }

            to_insert.push(candidate.clone());
        }

        // Apply, compensating on any mid-batch failure.
        let mut applied: Vec<ReconciliationMatch> = Vec::new();
        for candidate in &to_insert {
            let row = ReconciliationMatch {
                id: Uuid::new_v4().to_string(),
                session_id: session.id.clone(),
                transaction_id: candidate.transaction_id.clone(),
                statement_line_id: candidate.statement_line_id.clone(),
                confidence: candidate.confidence,
                rule: candidate.rule,
                matched_by,
                state: MatchState::Active,
                created_at: chrono::Utc::now().naive_utc(),
            };

            self.storage.save_match(&row).await?;
            if let Err(err) = self
                .storage
                .assign_statement(&candidate.transaction_id, &statement_id)
                .await
            {
                applied.push(row);
                self.roll_back(session, &statement_id, applied).await?;
                return Err(err);
            }
            applied.push(row);
        }

        let inserted = applied.len();
        let mut match_ids = existing_ids;
        let already_matched = match_ids.len();
        match_ids.extend(applied.into_iter().map(|m| m.id));

        if inserted > 0 {
            self.balance_hook
                .ownership_changed(&session.account_id)
                .await?;
        }

        info!(
            session_id = %session.id,
            inserted,
            already_matched,
            "match batch committed"
        );

        Ok(CreateMatchesOutcome {
            match_ids,
            inserted,
            already_matched,
        })
    }

    /// Deactivate a match and release the transaction if this session owns it
    ///
    /// Deactivation and ownership release happen as one unit: if the release
    /// fails the match is restored to active before the error is surfaced.
    pub async fn delete_match(&mut self, match_id: &str) -> ReconResult<DeleteMatchOutcome> {
        let mut row = self
            .storage
            .get_match(match_id)
            .await?
            .ok_or_else(|| ReconciliationError::MatchNotFound(match_id.to_string()))?;

        if !row.is_active() {
            return Ok(DeleteMatchOutcome {
                deleted: false,
                transaction_id: row.transaction_id,
            });
        }

        row.state = MatchState::Deactivated {
            at: chrono::Utc::now().naive_utc(),
            reason: DeactivationReason::Unmatched,
        };
        self.storage.update_match(&row).await?;

        let released = match self
            .storage
            .release_statement(&row.transaction_id, &row.session_id)
            .await
        {
            Ok(released) => released,
            Err(err) => {
                row.state = MatchState::Active;
                self.storage.update_match(&row).await?;
                return Err(err);
            }
        };

        if released {
            if let Some(tx) = self.storage.get_transaction(&row.transaction_id).await? {
                self.balance_hook.ownership_changed(&tx.account_id).await?;
            }
        }

        debug!(match_id = %row.id, transaction_id = %row.transaction_id, released, "match deactivated");

        Ok(DeleteMatchOutcome {
            deleted: true,
            transaction_id: row.transaction_id,
        })
    }

    /// Reverse every effect a session has on the ledger
    ///
    /// Deactivates all of the session's active matches and clears ownership
    /// on every transaction still pointing at it, returning how many
    /// transactions were released. Used by session deletion, which is
    /// permitted regardless of closed state.
    pub async fn release_session(
        &mut self,
        session: &ReconciliationSession,
    ) -> ReconResult<usize> {
        let now = chrono::Utc::now().naive_utc();

        for mut row in self
            .storage
            .list_session_matches(&session.id, true)
            .await?
        {
            row.state = MatchState::Deactivated {
                at: now,
                reason: DeactivationReason::SessionDeleted,
            };
            self.storage.update_match(&row).await?;
        }

        let statement_id = session.statement_id().to_string();
        let owned = self.storage.find_owned_by(&statement_id).await?;
        let mut released = 0usize;
        for transaction_id in &owned {
            if self
                .storage
                .release_statement(transaction_id, &statement_id)
                .await?
            {
                released += 1;
            }
        }

        if released > 0 {
            self.balance_hook
                .ownership_changed(&session.account_id)
                .await?;
        }

        info!(session_id = %session.id, released, "session effects reversed");
        Ok(released)
    }

    /// Compensate a partially applied batch: deactivate what was written and
    /// release what was assigned
    async fn roll_back(
        &mut self,
        session: &ReconciliationSession,
        statement_id: &str,
        applied: Vec<ReconciliationMatch>,
    ) -> ReconResult<()> {
        warn!(session_id = %session.id, rows = applied.len(), "rolling back partial match batch");
        let now = chrono::Utc::now().naive_utc();

        for mut row in applied {
            row.state = MatchState::Deactivated {
                at: now,
                reason: DeactivationReason::BatchRollback,
            };
            self.storage.update_match(&row).await?;
            self.storage
                .release_statement(&row.transaction_id, statement_id)
                .await?;
        }

        Ok(())
    }
}
