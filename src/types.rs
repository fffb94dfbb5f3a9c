//! Core types and data structures for the reconciliation engine

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Posting status of a ledger transaction
///
/// Only posted transactions participate in matching; pending ones are still
/// settling and their amounts or dates may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PostingStatus {
    /// Settled and visible on the account
    Posted,
    /// Authorized but not yet settled
    Pending,
}

impl PostingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Posted => "posted",
            Self::Pending => "pending",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "posted" => Self::Posted,
            _ => Self::Pending,
        }
    }
}

/// Ledger transaction row supplied by the surrounding CRUD subsystem
///
/// The engine reads every field and mutates exactly one: `statement_id`, the
/// weak back-reference recording which session/statement currently owns the
/// transaction for reconciliation purposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    /// Unique identifier for the transaction
    pub id: String,
    /// Account the transaction belongs to
    pub account_id: String,
    /// Signed amount: negative for outflows, positive for inflows
    pub signed_amount: BigDecimal,
    /// Date the transaction took effect
    pub effective_date: NaiveDate,
    /// Free-text description as imported or entered
    pub description: String,
    /// Posting status
    pub status: PostingStatus,
    /// Transfers between own accounts are excluded from statement matching
    pub is_transfer: bool,
    /// Session/statement currently owning this transaction, if any
    pub statement_id: Option<String>,
    /// When the transaction row was created
    pub created_at: NaiveDateTime,
}

impl LedgerTransaction {
    /// Whether the transaction is eligible for matching at all
    pub fn is_matchable(&self) -> bool {
        self.status == PostingStatus::Posted && !self.is_transfer
    }
}

/// One line of an imported bank statement
///
/// Present only when a CSV statement was imported; in pure statement-centric
/// sessions the line set may be empty or seeded synthetically by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementLine {
    /// Unique identifier for the line
    pub id: String,
    /// Statement (session) the line belongs to
    pub statement_id: String,
    /// Date printed on the statement
    pub line_date: NaiveDate,
    /// Signed amount as printed on the statement
    pub signed_amount: BigDecimal,
    /// Description as printed on the statement
    pub description: String,
    /// Optional bank reference number
    pub reference: Option<String>,
    /// When the line row was created
    pub created_at: NaiveDateTime,
}

/// How candidate transactions are selected for a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionMode {
    /// The session owns a virtual statement; candidates are gated only by an
    /// upper-bound closing date. `statement_id` equals the session id.
    Statement { statement_id: String },
    /// Legacy mode: all posted, non-transfer transactions inside the period
    DateRange { start: NaiveDate, end: NaiveDate },
}

/// One reconciliation attempt for an account over a statement period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationSession {
    /// Unique identifier for the session
    pub id: String,
    /// Account being reconciled
    pub account_id: String,
    /// First day of the statement period
    pub period_start: NaiveDate,
    /// Last day of the statement period (the statement closing date)
    pub period_end: NaiveDate,
    /// Balance declared by the statement at the start of the period
    pub start_balance: BigDecimal,
    /// Balance declared by the statement at the end of the period
    pub closing_balance: BigDecimal,
    /// Candidate selection mode
    pub selection: SelectionMode,
    /// Whether the session has been closed; closed sessions are immutable
    pub closed: bool,
    /// Variance at the last summary computation; frozen when the session closes
    pub variance: BigDecimal,
    /// When the session was created
    pub created_at: NaiveDateTime,
    /// When the session was last updated
    pub updated_at: NaiveDateTime,
}

impl ReconciliationSession {
    /// The statement id candidates and matches are bound to
    ///
    /// In statement-centric mode this is the session's own id; in date-range
    /// mode ownership still records the session id.
    pub fn statement_id(&self) -> &str {
        match &self.selection {
            SelectionMode::Statement { statement_id } => statement_id,
            SelectionMode::DateRange { .. } => &self.id,
        }
    }
}

/// Matching strategy that produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchRule {
    /// Amount and date agree within tolerance
    Exact,
    /// Descriptions share enough significant tokens
    Keyword,
    /// Descriptions are similar under a string metric
    Fuzzy,
    /// Created by an operator, not a strategy
    Manual,
}

impl MatchRule {
    /// Resolver ordering: less ambiguous strategies win conflicts
    pub fn priority(&self) -> u8 {
        match self {
            Self::Exact => 3,
            Self::Keyword => 2,
            Self::Fuzzy => 1,
            Self::Manual => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Keyword => "keyword",
            Self::Fuzzy => "fuzzy",
            Self::Manual => "manual",
        }
    }
}

/// Whether a match came from a strategy run or an operator action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchedBy {
    Auto,
    Manual,
}

/// Why a match was deactivated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeactivationReason {
    /// An operator unmatched the transaction
    Unmatched,
    /// The owning session was deleted and its effects reversed
    SessionDeleted,
    /// A batch insert failed partway and was compensated
    BatchRollback,
}

/// Lifecycle state of a match
///
/// Matches are never physically deleted; deactivation keeps the audit trail
/// of what was matched, when it was undone, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MatchState {
    Active,
    Deactivated {
        at: NaiveDateTime,
        reason: DeactivationReason,
    },
}

impl MatchState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// A committed pairing of a transaction with a session/statement line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationMatch {
    /// Unique identifier for the match
    pub id: String,
    /// Session the match belongs to
    pub session_id: String,
    /// Matched ledger transaction
    pub transaction_id: String,
    /// Matched statement line, absent for statement-only and manual matches
    pub statement_line_id: Option<String>,
    /// Strategy confidence, 0-100
    pub confidence: u8,
    /// Strategy that produced the match
    pub rule: MatchRule,
    /// Origin of the match
    pub matched_by: MatchedBy,
    /// Lifecycle state; only active matches count toward invariants
    pub state: MatchState,
    /// When the match was created
    pub created_at: NaiveDateTime,
}

impl ReconciliationMatch {
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }
}

/// Computed balance position of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    /// Sum of signed amounts over the session's active matches
    pub reconciled_amount: BigDecimal,
    /// `start_balance + reconciled_amount`
    pub calculated_balance: BigDecimal,
    /// `calculated_balance - closing_balance`
    pub variance: BigDecimal,
    /// Whether `|variance|` is under the closing epsilon
    pub is_balanced: bool,
    /// Number of active matches in the session
    pub matched_count: usize,
    /// Number of candidate transactions not yet matched
    pub unmatched_count: usize,
}

/// The closing gate tolerance: 0.01 currency units
pub fn balance_epsilon() -> BigDecimal {
    BigDecimal::from(1) / BigDecimal::from(100)
}

/// Errors that can occur in the reconciliation engine
#[derive(Debug, thiserror::Error)]
pub enum ReconciliationError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("session {0} is closed")]
    SessionClosed(String),
    #[error("transaction {transaction_id} is already bound to statement {owning_statement_id}")]
    OwnershipConflict {
        transaction_id: String,
        owning_statement_id: String,
    },
    #[error("session {session_id} is not balanced: variance = {variance}")]
    UnbalancedSession {
        session_id: String,
        variance: BigDecimal,
    },
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("match not found: {0}")]
    MatchNotFound(String),
    #[error("transaction not found: {0}")]
    TransactionNotFound(String),
    #[error("matching strategy '{strategy}' failed: {message}")]
    Strategy { strategy: String, message: String },
}

/// Result type for reconciliation operations
pub type ReconResult<T> = Result<T, ReconciliationError>;
