//! # Reconciliation Core
//!
//! A reconciliation and statement-matching engine for personal financial
//! ledgers: it selects candidate transactions for a statement period, matches
//! them against statement data, and refuses to close a reconciliation session
//! until the books agree with the bank.
//!
//! ## Features
//!
//! - **Candidate selection**: statement-centric and legacy date-range modes
//!   with deterministic ordering
//! - **Three matching strategies**: exact (amount + date), keyword (shared
//!   description tokens), and fuzzy (string similarity), each with bounded
//!   confidence
//! - **Conflict resolution**: greedy bipartite assignment guaranteeing a
//!   unique 1:1 match set
//! - **Ownership tracking**: each transaction binds to at most one statement,
//!   enforced through compare-and-set repository methods
//! - **Balance integrity**: sessions only close when the computed variance is
//!   under 0.01 currency units
//! - **Storage abstraction**: database-agnostic design with trait-based
//!   repositories and an in-memory implementation for tests
//!
//! ## Quick Start
//!
//! ```rust
//! use reconciliation_core::{
//!     DraftSelection, MemoryStore, SessionDraft, SessionLedger,
//! };
//! use chrono::NaiveDate;
//!
//! # async fn demo() -> reconciliation_core::ReconResult<()> {
//! let storage = MemoryStore::new();
//! let mut ledger = SessionLedger::new(storage);
//!
//! let session = ledger
//!     .create_session(SessionDraft {
//!         account_id: "checking".to_string(),
//!         period_start: NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
//!         period_end: NaiveDate::from_ymd_opt(2025, 10, 31).unwrap(),
//!         start_balance: "1000.00".parse().unwrap(),
//!         closing_balance: "1200.00".parse().unwrap(),
//!         selection: DraftSelection::Statement,
//!     })
//!     .await?;
//!
//! let candidates = ledger.get_candidate_transactions(&session.id).await?;
//! # let _ = candidates;
//! # Ok(())
//! # }
//! ```

pub mod matching;
pub mod session;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use matching::*;
pub use session::*;
pub use traits::*;
pub use types::*;

// Re-export the in-memory backend for convenience
pub use utils::memory_storage::MemoryStore;
