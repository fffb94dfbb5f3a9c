//! Session module containing candidate selection, match persistence, and the
//! session lifecycle

pub mod candidates;
pub mod ledger;
pub mod store;

pub use candidates::*;
pub use ledger::*;
pub use store::*;
