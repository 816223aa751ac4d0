mod common;

use aeroledger::application::LedgerService;
use aeroledger::domain::{CreditPolicy, ReservePolicy};
use aeroledger::io::{DatabaseSnapshot, Exporter};
use anyhow::Result;
use chrono::Utc;
use common::{FlightSchool, test_service};

async fn school_with_activity(service: &LedgerService) -> Result<()> {
    FlightSchool::setup(service).await?;
    service
        .record_top_up("alice", 50_000, 175, Utc::now(), None, None)
        .await?;
    service
        .record_flight_charge(
            "alice",
            "bob",
            12_000,
            6_000,
            Utc::now(),
            None,
            Some("flight-42".to_string()),
            &CreditPolicy::default(),
            false,
        )
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_journals_csv_has_one_row_per_entry() -> Result<()> {
    let (service, _temp) = test_service().await?;
    school_with_activity(&service).await?;

    let exporter = Exporter::new(&service);
    let mut buf = Vec::new();
    let count = exporter.export_journals_csv(&mut buf).await?;

    // Top-up with fee has 3 legs, the charge another 3
    assert_eq!(count, 6);

    let text = String::from_utf8(buf)?;
    let mut lines = text.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with("journal_id,sequence,effective_at,kind,wallet"));
    assert_eq!(lines.count(), 6);

    assert!(text.contains("top_up"));
    assert!(text.contains("flight_charge"));
    assert!(text.contains("alice"));
    assert!(text.contains("fees"));
    assert!(text.contains("flight-42"));

    Ok(())
}

#[tokio::test]
async fn test_balances_csv_lists_every_wallet() -> Result<()> {
    let (service, _temp) = test_service().await?;
    school_with_activity(&service).await?;

    let exporter = Exporter::new(&service);
    let mut buf = Vec::new();
    let count = exporter.export_balances_csv(&mut buf).await?;

    // Four platform wallets plus alice and bob
    assert_eq!(count, 6);

    let text = String::from_utf8(buf)?;
    assert!(text.starts_with("wallet,type,currency,credit_limit_cents,balance_cents"));
    assert!(text.contains("alice,liability,USD,50000,32000"));
    assert!(text.contains("bob,liability,USD,,12000"));

    Ok(())
}

#[tokio::test]
async fn test_adjustments_csv_keeps_signed_deltas() -> Result<()> {
    let (service, _temp) = test_service().await?;
    school_with_activity(&service).await?;
    service
        .adjust_flight(
            "flight-42",
            8_000,
            4_000,
            Some("Hobbs meter misread".to_string()),
            &CreditPolicy::default(),
            false,
        )
        .await?;

    let exporter = Exporter::new(&service);
    let mut buf = Vec::new();
    let count = exporter.export_adjustments_csv(&mut buf).await?;
    assert_eq!(count, 1);

    let text = String::from_utf8(buf)?;
    assert!(text.contains("-6000,-4000,-2000"));
    assert!(text.contains("Hobbs meter misread"));

    Ok(())
}

#[tokio::test]
async fn test_snapshots_csv_keeps_the_reconciliation_trail() -> Result<()> {
    let (service, _temp) = test_service().await?;
    school_with_activity(&service).await?;

    let policy = ReservePolicy::default();
    let processor = aeroledger::domain::ProcessorBalance {
        available_cents: 49_825,
        pending_cents: 0,
        as_of: Utc::now(),
    };
    service.reconcile_reserve(&processor, &policy).await?;

    let exporter = Exporter::new(&service);
    let mut buf = Vec::new();
    let count = exporter.export_snapshots_csv(&mut buf).await?;
    assert_eq!(count, 1);

    let text = String::from_utf8(buf)?;
    assert!(text.contains("in_balance"));
    assert!(text.contains("49825"));

    Ok(())
}

#[tokio::test]
async fn test_full_json_round_trips() -> Result<()> {
    let (service, _temp) = test_service().await?;
    school_with_activity(&service).await?;
    service
        .adjust_flight(
            "flight-42",
            8_000,
            4_000,
            None,
            &CreditPolicy::default(),
            false,
        )
        .await?;

    let exporter = Exporter::new(&service);
    let mut buf = Vec::new();
    let snapshot = exporter.export_full_json(&mut buf).await?;

    assert_eq!(snapshot.wallets.len(), 6);
    assert_eq!(snapshot.journals.len(), 3);
    assert_eq!(snapshot.adjustments.len(), 1);
    assert_eq!(snapshot.version, env!("CARGO_PKG_VERSION"));

    // The written JSON parses back into the same shape
    let parsed: DatabaseSnapshot = serde_json::from_slice(&buf)?;
    assert_eq!(parsed.journals.len(), snapshot.journals.len());
    assert_eq!(
        parsed.journals.iter().map(|j| j.sequence).max(),
        Some(3)
    );

    Ok(())
}
