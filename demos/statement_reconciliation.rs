//! End-to-end statement reconciliation example

use chrono::NaiveDate;
use reconciliation_core::utils::MemoryStore;
use reconciliation_core::{
    DraftSelection, LedgerTransaction, MatcherConfig, PostingStatus, SessionDraft, SessionLedger,
    StatementLine, StatementLineRepo, StrategyKind, TransactionRepo,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🏦 Reconciliation Core - Statement Reconciliation Example\n");

    // Create a session ledger over in-memory storage
    let mut storage = MemoryStore::new();
    let mut ledger = SessionLedger::new(storage.clone());

    // 1. Seed the ledger transactions the CRUD subsystem would supply
    println!("📒 Seeding ledger transactions...");
    let october = |day| NaiveDate::from_ymd_opt(2025, 10, day).unwrap();
    let transactions = [
        ("tx-payroll", "2500.00", 1, "Employer Payroll Deposit"),
        ("tx-utilities", "-120.45", 6, "Acme Utilities monthly bill"),
        ("tx-coffee", "-55.23", 9, "Blue Bottle Coffee Oakland"),
        ("tx-grocer", "-84.10", 14, "Hilltop Grocer Market St"),
    ];
    for (id, amount, day, description) in transactions {
        storage
            .save_transaction(&LedgerTransaction {
                id: id.to_string(),
                account_id: "checking".to_string(),
                signed_amount: amount.parse()?,
                effective_date: october(day),
                description: description.to_string(),
                status: PostingStatus::Posted,
                is_transfer: false,
                statement_id: None,
                created_at: october(day).and_hms_opt(12, 0, 0).unwrap(),
            })
            .await?;
        println!("  ✓ {id}: {amount} on {}", october(day));
    }
    println!();

    // 2. Open a reconciliation session anchored to the bank statement
    println!("🗂️  Opening a reconciliation session...");
    let session = ledger
        .create_session(SessionDraft {
            account_id: "checking".to_string(),
            period_start: october(1),
            period_end: october(31),
            start_balance: "1000.00".parse()?,
            closing_balance: "3240.22".parse()?,
            selection: DraftSelection::Statement,
        })
        .await?;
    println!("  ✓ Session {} (draft)\n", session.id);

    // 3. Import the statement lines for the session
    println!("📄 Importing statement lines...");
    let lines = [
        ("ln-1", "2500.00", 1, "EMPLOYER PAYROLL DEPOSIT"),
        ("ln-2", "-120.45", 7, "ACME UTILITIES AUTOPAY BILL"),
        ("ln-3", "-55.23", 9, "BLUE BOTTLE COFFEE OAKLND"),
        ("ln-4", "-84.10", 14, "HILLTOP GROCER MARKET ST"),
    ];
    for (id, amount, day, description) in lines {
        storage
            .save_line(&StatementLine {
                id: id.to_string(),
                statement_id: session.id.clone(),
                line_date: october(day),
                signed_amount: amount.parse()?,
                description: description.to_string(),
                reference: None,
                created_at: october(day).and_hms_opt(0, 0, 0).unwrap(),
            })
            .await?;
    }
    println!("  ✓ {} lines imported\n", lines.len());

    // 4. Run all three matching strategies
    println!("🔍 Running batch matching (exact, keyword, fuzzy)...");
    let run = ledger
        .run_matching(&session.id, StrategyKind::All, &MatcherConfig::default())
        .await?;

    for matched in &run.matches {
        println!(
            "  ✓ {} -> {} via {:?} (confidence {})",
            matched.transaction_id,
            matched.statement_line_id.as_deref().unwrap_or("-"),
            matched.rule,
            matched.confidence
        );
    }
    let stats = &run.statistics;
    println!(
        "  stats: {} candidates, {} accepted, {} conflicts resolved, avg confidence {:.1}\n",
        stats.candidates, stats.accepted, stats.conflicts_resolved, stats.average_confidence
    );

    // 5. Check the balance position and close
    println!("⚖️  Checking balance integrity...");
    let summary = ledger.get_session_summary(&session.id).await?;
    println!(
        "  reconciled {} | calculated {} | declared {} | variance {}",
        summary.reconciled_amount, summary.calculated_balance, session.closing_balance, summary.variance
    );

    if summary.is_balanced {
        let frozen = ledger.close_session(&session.id).await?;
        println!("  ✓ Session closed with variance {}\n", frozen.variance);
    } else {
        println!("  ✗ Session is not balanced; investigate before closing\n");
    }

    println!("Done.");
    Ok(())
}
