//! Traits for storage abstraction and extensibility

use async_trait::async_trait;

use crate::types::*;

/// Storage abstraction for reconciliation sessions
///
/// These traits let the engine work with any storage backend (PostgreSQL,
/// MySQL, SQLite, in-memory, etc.). Matchers and the resolver never touch
/// storage directly; only the selector, store, and session ledger do.
#[async_trait]
pub trait SessionRepo: Send + Sync {
    /// Save a new session to storage
    async fn save_session(&mut self, session: &ReconciliationSession) -> ReconResult<()>;

    /// Get a session by ID
    async fn get_session(&self, session_id: &str) -> ReconResult<Option<ReconciliationSession>>;

    /// Whether a session with this ID exists
    ///
    /// Used by candidate selection to detect ownership references that point
    /// at sessions which no longer exist.
    async fn session_exists(&self, session_id: &str) -> ReconResult<bool>;

    /// Update a session only while it is still open
    ///
    /// Compare-and-set on `closed = false`: returns `false` without writing
    /// when the stored row is already closed, so a concurrent close cannot be
    /// raced past.
    async fn update_if_open(&mut self, session: &ReconciliationSession) -> ReconResult<bool>;

    /// Remove a session row
    async fn delete_session(&mut self, session_id: &str) -> ReconResult<()>;
}

/// Storage abstraction for reconciliation matches
#[async_trait]
pub trait MatchRepo: Send + Sync {
    /// Save a new match to storage
    async fn save_match(&mut self, m: &ReconciliationMatch) -> ReconResult<()>;

    /// Get a match by ID
    async fn get_match(&self, match_id: &str) -> ReconResult<Option<ReconciliationMatch>>;

    /// Update a match (state transitions only; matches are never removed)
    async fn update_match(&mut self, m: &ReconciliationMatch) -> ReconResult<()>;

    /// Find the active match for a transaction across all sessions
    ///
    /// At most one can exist; this is the probe behind the single-active-match
    /// invariant.
    async fn find_active_by_transaction(
        &self,
        transaction_id: &str,
    ) -> ReconResult<Option<ReconciliationMatch>>;

    /// List a session's matches, optionally restricted to active ones
    async fn list_session_matches(
        &self,
        session_id: &str,
        active_only: bool,
    ) -> ReconResult<Vec<ReconciliationMatch>>;
}

/// Storage abstraction for ledger transactions
///
/// The transaction rows belong to the surrounding CRUD subsystem; the engine
/// reads them and mutates only the `statement_id` ownership field, through
/// the two compare-and-set methods below.
#[async_trait]
pub trait TransactionRepo: Send + Sync {
    /// Save a transaction row (used by collaborators and test seeding)
    async fn save_transaction(&mut self, transaction: &LedgerTransaction) -> ReconResult<()>;

    /// Get a transaction by ID
    async fn get_transaction(
        &self,
        transaction_id: &str,
    ) -> ReconResult<Option<LedgerTransaction>>;

    /// List all transactions for an account
    async fn list_account_transactions(
        &self,
        account_id: &str,
    ) -> ReconResult<Vec<LedgerTransaction>>;

    /// Bind a transaction to a statement, compare-and-set style
    ///
    /// Succeeds when the transaction is unowned or already owned by
    /// `session_id`; fails with [`ReconciliationError::OwnershipConflict`]
    /// naming the current owner otherwise.
    async fn assign_statement(
        &mut self,
        transaction_id: &str,
        session_id: &str,
    ) -> ReconResult<()>;

    /// Clear a transaction's statement binding if `session_id` holds it
    ///
    /// Returns whether the binding was cleared. Never fails on a mismatched
    /// owner; releasing is only valid for the session that owns.
    async fn release_statement(
        &mut self,
        transaction_id: &str,
        session_id: &str,
    ) -> ReconResult<bool>;

    /// IDs of all transactions currently bound to a session
    async fn find_owned_by(&self, session_id: &str) -> ReconResult<Vec<String>>;
}

/// Storage abstraction for imported statement lines
#[async_trait]
pub trait StatementLineRepo: Send + Sync {
    /// Save a statement line (used by the import subsystem and test seeding)
    async fn save_line(&mut self, line: &StatementLine) -> ReconResult<()>;

    /// List the lines of a statement, ordered by line date then amount
    async fn list_statement_lines(&self, statement_id: &str) -> ReconResult<Vec<StatementLine>>;
}

/// Everything the session ledger needs from one storage backend
pub trait ReconStorage: SessionRepo + MatchRepo + TransactionRepo + StatementLineRepo {}

impl<S> ReconStorage for S where S: SessionRepo + MatchRepo + TransactionRepo + StatementLineRepo {}

/// Collaborator hook invoked after ownership changes
///
/// The account subsystem recomputes cleared/uncleared balances when
/// transactions gain or lose a statement binding.
#[async_trait]
pub trait BalanceHook: Send + Sync {
    /// Called once per operation that changed ownership on the account
    async fn ownership_changed(&self, account_id: &str) -> ReconResult<()>;
}

/// No-op hook for callers without a balance subsystem
pub struct NullBalanceHook;

#[async_trait]
impl BalanceHook for NullBalanceHook {
    async fn ownership_changed(&self, _account_id: &str) -> ReconResult<()> {
        Ok(())
    }
}

/// Trait for implementing custom session validation rules
pub trait SessionValidator: Send + Sync {
    /// Validate a session before saving or updating
    fn validate_session(&self, session: &ReconciliationSession) -> ReconResult<()>;
}

/// Default session validator with basic rules
pub struct DefaultSessionValidator;

impl SessionValidator for DefaultSessionValidator {
    fn validate_session(&self, session: &ReconciliationSession) -> ReconResult<()> {
        if session.account_id.trim().is_empty() {
            return Err(ReconciliationError::Validation(
                "Account ID cannot be empty".to_string(),
            ));
        }

        if session.period_start >= session.period_end {
            return Err(ReconciliationError::Validation(format!(
                "Period start {} must be before period end {}",
                session.period_start, session.period_end
            )));
        }

        Ok(())
    }
}
