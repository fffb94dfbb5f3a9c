//! In-memory storage implementation for testing

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::traits::*;
use crate::types::*;

/// In-memory storage implementation for testing and development
///
/// Implements all four repositories over shared hash maps. Clones share the
/// same underlying data, which lets the selector, the store, and the session
/// ledger each hold a handle to one logical backend.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    sessions: Arc<RwLock<HashMap<String, ReconciliationSession>>>,
    matches: Arc<RwLock<HashMap<String, ReconciliationMatch>>>,
    transactions: Arc<RwLock<HashMap<String, LedgerTransaction>>>,
    lines: Arc<RwLock<HashMap<String, StatementLine>>>,
}

impl MemoryStore {
    /// Create a new memory store instance
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            matches: Arc::new(RwLock::new(HashMap::new())),
            transactions: Arc::new(RwLock::new(HashMap::new())),
            lines: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) {
        self.sessions.write().unwrap().clear();
        self.matches.write().unwrap().clear();
        self.transactions.write().unwrap().clear();
        self.lines.write().unwrap().clear();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionRepo for MemoryStore {
    async fn save_session(&mut self, session: &ReconciliationSession) -> ReconResult<()> {
        self.sessions
            .write()
            .unwrap()
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> ReconResult<Option<ReconciliationSession>> {
        Ok(self.sessions.read().unwrap().get(session_id).cloned())
    }

    async fn session_exists(&self, session_id: &str) -> ReconResult<bool> {
        Ok(self.sessions.read().unwrap().contains_key(session_id))
    }

    async fn update_if_open(&mut self, session: &ReconciliationSession) -> ReconResult<bool> {
        let mut sessions = self.sessions.write().unwrap();
        match sessions.get(&session.id) {
            None => Err(ReconciliationError::SessionNotFound(session.id.clone())),
            Some(stored) if stored.closed => Ok(false),
            Some(_) => {
                sessions.insert(session.id.clone(), session.clone());
                Ok(true)
            }
        }
    }

    async fn delete_session(&mut self, session_id: &str) -> ReconResult<()> {
        if self.sessions.write().unwrap().remove(session_id).is_some() {
            Ok(())
        } else {
            Err(ReconciliationError::SessionNotFound(session_id.to_string()))
        }
    }
}

#[async_trait]
impl MatchRepo for MemoryStore {
    async fn save_match(&mut self, m: &ReconciliationMatch) -> ReconResult<()> {
        self.matches
            .write()
            .unwrap()
            .insert(m.id.clone(), m.clone());
        Ok(())
    }

    async fn get_match(&self, match_id: &str) -> ReconResult<Option<ReconciliationMatch>> {
        Ok(self.matches.read().unwrap().get(match_id).cloned())
    }

    async fn update_match(&mut self, m: &ReconciliationMatch) -> ReconResult<()> {
        let mut matches = self.matches.write().unwrap();
        if matches.contains_key(&m.id) {
            matches.insert(m.id.clone(), m.clone());
            Ok(())
        } else {
            Err(ReconciliationError::MatchNotFound(m.id.clone()))
        }
    }

    async fn find_active_by_transaction(
        &self,
        transaction_id: &str,
    ) -> ReconResult<Option<ReconciliationMatch>> {
        Ok(self
            .matches
            .read()
            .unwrap()
            .values()
            .find(|m| m.is_active() && m.transaction_id == transaction_id)
            .cloned())
    }

    async fn list_session_matches(
        &self,
        session_id: &str,
        active_only: bool,
    ) -> ReconResult<Vec<ReconciliationMatch>> {
        let mut found: Vec<ReconciliationMatch> = self
            .matches
            .read()
            .unwrap()
            .values()
            .filter(|m| m.session_id == session_id && (!active_only || m.is_active()))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }
}

#[async_trait]
impl TransactionRepo for MemoryStore {
    async fn save_transaction(&mut self, transaction: &LedgerTransaction) -> ReconResult<()> {
        self.transactions
            .write()
            .unwrap()
            .insert(transaction.id.clone(), transaction.clone());
        Ok(())
    }

    async fn get_transaction(
        &self,
        transaction_id: &str,
    ) -> ReconResult<Option<LedgerTransaction>> {
        Ok(self
            .transactions
            .read()
            .unwrap()
            .get(transaction_id)
            .cloned())
    }

    async fn list_account_transactions(
        &self,
        account_id: &str,
    ) -> ReconResult<Vec<LedgerTransaction>> {
        Ok(self
            .transactions
            .read()
            .unwrap()
            .values()
            .filter(|tx| tx.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn assign_statement(
        &mut self,
        transaction_id: &str,
        session_id: &str,
    ) -> ReconResult<()> {
        let mut transactions = self.transactions.write().unwrap();
        let tx = transactions
            .get_mut(transaction_id)
            .ok_or_else(|| ReconciliationError::TransactionNotFound(transaction_id.to_string()))?;

        match &tx.statement_id {
            Some(owner) if owner != session_id => Err(ReconciliationError::OwnershipConflict {
                transaction_id: transaction_id.to_string(),
                owning_statement_id: owner.clone(),
            }),
            _ => {
                tx.statement_id = Some(session_id.to_string());
                Ok(())
            }
        }
    }

    async fn release_statement(
        &mut self,
        transaction_id: &str,
        session_id: &str,
    ) -> ReconResult<bool> {
        let mut transactions = self.transactions.write().unwrap();
        match transactions.get_mut(transaction_id) {
            Some(tx) if tx.statement_id.as_deref() == Some(session_id) => {
                tx.statement_id = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_owned_by(&self, session_id: &str) -> ReconResult<Vec<String>> {
        let mut owned: Vec<String> = self
            .transactions
            .read()
            .unwrap()
            .values()
            .filter(|tx| tx.statement_id.as_deref() == Some(session_id))
            .map(|tx| tx.id.clone())
            .collect();
        owned.sort();
        Ok(owned)
    }
}

#[async_trait]
impl StatementLineRepo for MemoryStore {
    async fn save_line(&mut self, line: &StatementLine) -> ReconResult<()> {
        self.lines
            .write()
            .unwrap()
            .insert(line.id.clone(), line.clone());
        Ok(())
    }

    async fn list_statement_lines(&self, statement_id: &str) -> ReconResult<Vec<StatementLine>> {
        let mut found: Vec<StatementLine> = self
            .lines
            .read()
            .unwrap()
            .values()
            .filter(|line| line.statement_id == statement_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            a.line_date
                .cmp(&b.line_date)
                .then(a.signed_amount.cmp(&b.signed_amount))
                .then(a.id.cmp(&b.id))
        });
        Ok(found)
    }
}
