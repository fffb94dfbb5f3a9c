//! Integration tests for reconciliation-core

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use reconciliation_core::{
    DraftSelection, LedgerTransaction, MatchRepo, MatchRule, MatcherConfig, MemoryStore,
    PostingStatus, ReconciliationError, SessionDraft, SessionLedger, StatementLine,
    StatementLineRepo, StrategyKind, TransactionRepo,
};

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn transaction(id: &str, account_id: &str, amount: &str, day: u32, desc: &str) -> LedgerTransaction {
    let effective_date = date(2025, 10, day);
    LedgerTransaction {
        id: id.to_string(),
        account_id: account_id.to_string(),
        signed_amount: amount.parse().unwrap(),
        effective_date,
        description: desc.to_string(),
        status: PostingStatus::Posted,
        is_transfer: false,
        statement_id: None,
        created_at: effective_date.and_hms_opt(12, 0, 0).unwrap(),
    }
}

fn line(id: &str, statement_id: &str, amount: &str, day: u32, desc: &str) -> StatementLine {
    let line_date = date(2025, 10, day);
    StatementLine {
        id: id.to_string(),
        statement_id: statement_id.to_string(),
        line_date,
        signed_amount: amount.parse().unwrap(),
        description: desc.to_string(),
        reference: None,
        created_at: line_date.and_hms_opt(0, 0, 0).unwrap(),
    }
}

fn draft(account_id: &str, start_balance: &str, closing_balance: &str) -> SessionDraft {
    SessionDraft {
        account_id: account_id.to_string(),
        period_start: date(2025, 10, 1),
        period_end: date(2025, 10, 31),
        start_balance: start_balance.parse().unwrap(),
        closing_balance: closing_balance.parse().unwrap(),
        selection: DraftSelection::Statement,
    }
}

async fn seed_transactions(storage: &mut MemoryStore, transactions: &[LedgerTransaction]) {
    for tx in transactions {
        storage.save_transaction(tx).await.unwrap();
    }
}

#[tokio::test]
async fn exact_match_pairs_equal_amount_and_date() {
    let mut storage = MemoryStore::new();
    seed_transactions(
        &mut storage,
        &[transaction("t1", "acct1", "-55.23", 3, "Coffee House Oakland")],
    )
    .await;

    let mut ledger = SessionLedger::new(storage.clone());
    let session = ledger
        .create_session(draft("acct1", "1000.00", "944.77"))
        .await
        .unwrap();
    storage
        .save_line(&line("l1", &session.id, "-55.23", 3, "COFFEE HOUSE OAKLAND"))
        .await
        .unwrap();

    let run = ledger
        .run_matching(&session.id, StrategyKind::Exact, &MatcherConfig::default())
        .await
        .unwrap();

    assert_eq!(run.matches.len(), 1);
    assert_eq!(run.matches[0].transaction_id, "t1");
    assert_eq!(run.matches[0].statement_line_id.as_deref(), Some("l1"));
    assert_eq!(run.matches[0].confidence, 100);
    assert_eq!(run.matches[0].rule, MatchRule::Exact);
    assert_eq!(run.statistics.exact_count, 1);
}

#[tokio::test]
async fn full_matching_run_resolves_balances_and_closes() {
    let mut storage = MemoryStore::new();
    seed_transactions(
        &mut storage,
        &[
            transaction("t1", "acct1", "2500.00", 1, "Employer Payroll Deposit"),
            transaction("t2", "acct1", "-120.45", 6, "Acme Utilities monthly bill"),
            transaction("t3", "acct1", "-55.23", 9, "Blue Bottle Coffee Oakland"),
        ],
    )
    .await;

    let mut ledger = SessionLedger::new(storage.clone());
    let session = ledger
        .create_session(draft("acct1", "1000.00", "3324.32"))
        .await
        .unwrap();

    for seed in [
        line("l1", &session.id, "2500.00", 1, "EMPLOYER PAYROLL DEPOSIT"),
        line("l2", &session.id, "-120.45", 7, "ACME UTILITIES AUTOPAY BILL"),
        line("l3", &session.id, "-55.23", 9, "BLUE BOTTLE COFFEE OAKLND"),
    ] {
        storage.save_line(&seed).await.unwrap();
    }

    let run = ledger
        .run_matching(&session.id, StrategyKind::All, &MatcherConfig::default())
        .await
        .unwrap();

    assert_eq!(run.matches.len(), 3);
    for matched in &run.matches {
        assert!(matched.confidence <= 100);
        if matched.rule == MatchRule::Fuzzy {
            assert!(matched.confidence <= 90);
        }
        if matched.rule == MatchRule::Exact {
            assert_eq!(matched.confidence, 100);
        }
    }

    // the resolved assignment is 1:1
    let mut tx_ids = std::collections::HashSet::new();
    let mut line_ids = std::collections::HashSet::new();
    for matched in &run.matches {
        assert!(tx_ids.insert(matched.transaction_id.clone()));
        assert!(line_ids.insert(matched.statement_line_id.clone().unwrap()));
    }

    let summary = ledger.get_session_summary(&session.id).await.unwrap();
    assert_eq!(summary.matched_count, 3);
    assert_eq!(summary.unmatched_count, 0);
    assert!(summary.is_balanced);

    let frozen = ledger.close_session(&session.id).await.unwrap();
    assert!(frozen.is_balanced);
}

#[tokio::test]
async fn matching_runs_are_idempotent() {
    let mut storage = MemoryStore::new();
    seed_transactions(
        &mut storage,
        &[transaction("t1", "acct1", "-10.00", 5, "Corner Store")],
    )
    .await;

    let mut ledger = SessionLedger::new(storage.clone());
    let session = ledger
        .create_session(draft("acct1", "100.00", "90.00"))
        .await
        .unwrap();
    storage
        .save_line(&line("l1", &session.id, "-10.00", 5, "CORNER STORE"))
        .await
        .unwrap();

    let first = ledger
        .run_matching(&session.id, StrategyKind::Exact, &MatcherConfig::default())
        .await
        .unwrap();
    let second = ledger
        .run_matching(&session.id, StrategyKind::Exact, &MatcherConfig::default())
        .await
        .unwrap();

    assert_eq!(first.matches.len(), 1);
    // the second run sees no unmatched work and inserts nothing new
    assert!(second.matches.is_empty());

    let active = storage.find_active_by_transaction("t1").await.unwrap();
    assert_eq!(active.unwrap().id, first.matches[0].id);
}

#[tokio::test]
async fn ownership_conflict_names_the_owning_session() {
    let mut storage = MemoryStore::new();
    seed_transactions(
        &mut storage,
        &[transaction("t1", "acct1", "-40.00", 4, "Hardware Store")],
    )
    .await;

    let mut ledger = SessionLedger::new(storage.clone());
    let session_b = ledger
        .create_session(draft("acct1", "0.00", "-40.00"))
        .await
        .unwrap();
    ledger.create_match(&session_b.id, "t1").await.unwrap();

    let session_a = ledger
        .create_session(draft("acct1", "0.00", "-40.00"))
        .await
        .unwrap();
    let err = ledger.create_match(&session_a.id, "t1").await.unwrap_err();

    match err {
        ReconciliationError::OwnershipConflict {
            transaction_id,
            owning_statement_id,
        } => {
            assert_eq!(transaction_id, "t1");
            assert_eq!(owning_statement_id, session_b.id);
        }
        other => panic!("expected ownership conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn at_most_one_active_match_per_transaction() {
    let mut storage = MemoryStore::new();
    seed_transactions(
        &mut storage,
        &[transaction("t1", "acct1", "-15.00", 2, "Bakery")],
    )
    .await;

    let mut ledger = SessionLedger::new(storage.clone());
    let session = ledger
        .create_session(draft("acct1", "0.00", "-15.00"))
        .await
        .unwrap();

    // create, delete, recreate several times
    for _ in 0..3 {
        let outcome = ledger.create_match(&session.id, "t1").await.unwrap();
        ledger.delete_match(&outcome.match_id).await.unwrap();
    }
    ledger.create_match(&session.id, "t1").await.unwrap();

    let all_matches = storage
        .list_session_matches(&session.id, false)
        .await
        .unwrap();
    let active: Vec<_> = all_matches.iter().filter(|m| m.is_active()).collect();
    assert_eq!(all_matches.len(), 4);
    assert_eq!(active.len(), 1);

    // ownership points at the session holding the unique active match
    let tx = storage.get_transaction("t1").await.unwrap().unwrap();
    assert_eq!(tx.statement_id.as_deref(), Some(session.id.as_str()));
}

#[tokio::test]
async fn deleting_a_match_frees_the_transaction() {
    let mut storage = MemoryStore::new();
    seed_transactions(
        &mut storage,
        &[transaction("t1", "acct1", "-22.00", 8, "Pharmacy")],
    )
    .await;

    let mut ledger = SessionLedger::new(storage.clone());
    let session = ledger
        .create_session(draft("acct1", "0.00", "-22.00"))
        .await
        .unwrap();
    let outcome = ledger.create_match(&session.id, "t1").await.unwrap();

    let deleted = ledger.delete_match(&outcome.match_id).await.unwrap();
    assert!(deleted.deleted);
    assert_eq!(deleted.transaction_id, "t1");

    let tx = storage.get_transaction("t1").await.unwrap().unwrap();
    assert!(tx.statement_id.is_none());

    // deleting again reports nothing to do
    let again = ledger.delete_match(&outcome.match_id).await.unwrap();
    assert!(!again.deleted);

    let summary = ledger.get_session_summary(&session.id).await.unwrap();
    assert_eq!(summary.matched_count, 0);
    assert_eq!(summary.unmatched_count, 1);
}

#[tokio::test]
async fn deleting_a_session_releases_every_owned_transaction() {
    let mut storage = MemoryStore::new();
    seed_transactions(
        &mut storage,
        &[
            transaction("t1", "acct1", "-10.00", 3, "Groceries North"),
            transaction("t2", "acct1", "-20.00", 5, "Groceries South"),
            transaction("t3", "acct1", "-30.00", 7, "Groceries East"),
        ],
    )
    .await;

    let mut ledger = SessionLedger::new(storage.clone());
    let session = ledger
        .create_session(draft("acct1", "0.00", "-60.00"))
        .await
        .unwrap();
    for tx_id in ["t1", "t2", "t3"] {
        ledger.create_match(&session.id, tx_id).await.unwrap();
    }

    let released = ledger.delete_session(&session.id).await.unwrap();
    assert_eq!(released, 3);

    for tx_id in ["t1", "t2", "t3"] {
        let tx = storage.get_transaction(tx_id).await.unwrap().unwrap();
        assert!(tx.statement_id.is_none());
        assert!(storage
            .find_active_by_transaction(tx_id)
            .await
            .unwrap()
            .is_none());
    }

    // a fresh session sees all three transactions again
    let fresh = ledger
        .create_session(draft("acct1", "0.00", "-60.00"))
        .await
        .unwrap();
    let candidates = ledger.get_candidate_transactions(&fresh.id).await.unwrap();
    assert_eq!(candidates.len(), 3);
    assert!(candidates.iter().all(|c| c.matched_in_session.is_none()));
}

#[tokio::test]
async fn candidates_are_scoped_and_deterministically_ordered() {
    let mut storage = MemoryStore::new();
    let mut transfer = transaction("t4", "acct1", "-5.00", 4, "To savings");
    transfer.is_transfer = true;
    let mut pending = transaction("t5", "acct1", "-6.00", 4, "Pending card hold");
    pending.status = PostingStatus::Pending;
    seed_transactions(
        &mut storage,
        &[
            transaction("t1", "acct1", "-10.00", 6, "Later in month"),
            transaction("t2", "acct1", "-30.00", 2, "Early in month"),
            transaction("t3", "acct1", "-20.00", 2, "Early, larger amount"),
            transfer,
            pending,
            transaction("t6", "other", "-7.00", 3, "Different account"),
        ],
    )
    .await;
    // the closing date itself is an inclusive upper bound
    storage
        .save_transaction(&transaction("t7", "acct1", "-8.00", 31, "On closing day"))
        .await
        .unwrap();
    // dated past the closing date, excluded
    let mut after_close = transaction("t8", "acct1", "-9.00", 30, "After closing");
    after_close.effective_date = date(2025, 11, 2);
    storage.save_transaction(&after_close).await.unwrap();

    let mut ledger = SessionLedger::new(storage.clone());
    let session = ledger
        .create_session(draft("acct1", "0.00", "0.00"))
        .await
        .unwrap();

    let candidates = ledger.get_candidate_transactions(&session.id).await.unwrap();
    let ids: Vec<&str> = candidates
        .iter()
        .map(|c| c.transaction.id.as_str())
        .collect();

    // ordered by effective date, then signed amount; t7 is on the closing
    // date (inclusive upper bound), t8 is past it
    assert_eq!(ids, vec!["t2", "t3", "t1", "t7"]);
}

#[tokio::test]
async fn orphaned_ownership_is_self_healing() {
    let mut storage = MemoryStore::new();
    let mut orphaned = transaction("t1", "acct1", "-12.00", 5, "Orphaned binding");
    orphaned.statement_id = Some("session-that-no-longer-exists".to_string());
    seed_transactions(&mut storage, &[orphaned]).await;

    let mut ledger = SessionLedger::new(storage.clone());
    let session = ledger
        .create_session(draft("acct1", "0.00", "-12.00"))
        .await
        .unwrap();

    // still eligible despite the dangling reference
    let candidates = ledger.get_candidate_transactions(&session.id).await.unwrap();
    assert_eq!(candidates.len(), 1);

    // matching heals the binding over to the live session
    ledger.create_match(&session.id, "t1").await.unwrap();
    let tx = storage.get_transaction("t1").await.unwrap().unwrap();
    assert_eq!(tx.statement_id.as_deref(), Some(session.id.as_str()));
}

#[tokio::test]
async fn date_range_sessions_annotate_matches_elsewhere() {
    let mut storage = MemoryStore::new();
    seed_transactions(
        &mut storage,
        &[
            transaction("t1", "acct1", "-10.00", 5, "Shared candidate"),
            transaction("t2", "acct1", "-20.00", 9, "Free candidate"),
        ],
    )
    .await;

    let mut ledger = SessionLedger::new(storage.clone());
    let owning = ledger
        .create_session(draft("acct1", "0.00", "-10.00"))
        .await
        .unwrap();
    ledger.create_match(&owning.id, "t1").await.unwrap();

    let mut range_draft = draft("acct1", "0.00", "-30.00");
    range_draft.selection = DraftSelection::DateRange;
    let range_session = ledger.create_session(range_draft).await.unwrap();

    let candidates = ledger
        .get_candidate_transactions(&range_session.id)
        .await
        .unwrap();
    assert_eq!(candidates.len(), 2);

    let shared = candidates
        .iter()
        .find(|c| c.transaction.id == "t1")
        .unwrap();
    assert_eq!(shared.matched_in_session.as_deref(), Some(owning.id.as_str()));
    let free = candidates
        .iter()
        .find(|c| c.transaction.id == "t2")
        .unwrap();
    assert!(free.matched_in_session.is_none());
}

#[tokio::test]
async fn unknown_session_yields_empty_candidates_not_an_error() {
    let ledger = SessionLedger::new(MemoryStore::new());
    let candidates = ledger.get_candidate_transactions("nope").await.unwrap();
    assert!(candidates.is_empty());
}

#[tokio::test]
async fn summary_for_unknown_session_is_not_found() {
    let ledger = SessionLedger::new(MemoryStore::new());
    let err = ledger.get_session_summary("nope").await.unwrap_err();
    assert!(matches!(err, ReconciliationError::SessionNotFound(_)));
}

#[tokio::test]
async fn single_strategy_runs_record_their_rule_and_cap() {
    // keyword-only run
    let mut storage = MemoryStore::new();
    seed_transactions(
        &mut storage,
        &[transaction("t1", "acct1", "-120.45", 6, "Acme Utilities monthly bill")],
    )
    .await;
    let mut ledger = SessionLedger::new(storage.clone());
    let session = ledger
        .create_session(draft("acct1", "0.00", "-120.45"))
        .await
        .unwrap();
    storage
        .save_line(&line("l1", &session.id, "-120.45", 7, "ACME UTILITIES AUTOPAY BILL"))
        .await
        .unwrap();

    let run = ledger
        .run_matching(&session.id, StrategyKind::Keyword, &MatcherConfig::default())
        .await
        .unwrap();
    assert_eq!(run.matches.len(), 1);
    assert_eq!(run.matches[0].rule, MatchRule::Keyword);
    assert!(run.matches[0].confidence <= 95);
    assert_eq!(run.statistics.keyword_count, 1);

    // fuzzy-only run on a fresh backend
    let mut storage = MemoryStore::new();
    seed_transactions(
        &mut storage,
        &[transaction("t2", "acct1", "-55.23", 9, "Blue Bottle Coffee Oakland")],
    )
    .await;
    let mut ledger = SessionLedger::new(storage.clone());
    let session = ledger
        .create_session(draft("acct1", "0.00", "-55.23"))
        .await
        .unwrap();
    storage
        .save_line(&line("l2", &session.id, "-55.23", 10, "BLUE BOTTLE COFFEE OAKLND"))
        .await
        .unwrap();

    let run = ledger
        .run_matching(&session.id, StrategyKind::Fuzzy, &MatcherConfig::default())
        .await
        .unwrap();
    assert_eq!(run.matches.len(), 1);
    assert_eq!(run.matches[0].rule, MatchRule::Fuzzy);
    assert!(run.matches[0].confidence <= 90);
    assert_eq!(run.statistics.fuzzy_count, 1);
}

#[tokio::test]
async fn variance_moves_with_each_match_and_unmatch() {
    let mut storage = MemoryStore::new();
    seed_transactions(
        &mut storage,
        &[
            transaction("t1", "acct1", "150.00", 5, "Deposit one"),
            transaction("t2", "acct1", "50.00", 9, "Deposit two"),
        ],
    )
    .await;

    let mut ledger = SessionLedger::new(storage.clone());
    let session = ledger
        .create_session(draft("acct1", "1000.00", "1200.00"))
        .await
        .unwrap();

    let summary = ledger.get_session_summary(&session.id).await.unwrap();
    assert_eq!(summary.variance, BigDecimal::from(-200));
    assert!(!summary.is_balanced);

    let first = ledger.create_match(&session.id, "t1").await.unwrap();
    assert_eq!(first.summary.variance, BigDecimal::from(-50));

    let second = ledger.create_match(&session.id, "t2").await.unwrap();
    assert_eq!(second.summary.variance, BigDecimal::from(0));
    assert!(second.summary.is_balanced);

    ledger.delete_match(&second.match_id).await.unwrap();
    let after_delete = ledger.get_session_summary(&session.id).await.unwrap();
    assert_eq!(after_delete.variance, BigDecimal::from(-50));
    assert!(!after_delete.is_balanced);
}
