mod common;

use aeroledger::application::AppError;
use aeroledger::domain::{ProcessorBalance, ReservePolicy, ReserveStatus};
use aeroledger::processor::{PaymentProcessor, StatementFileProcessor};
use anyhow::Result;
use chrono::Utc;
use common::{FlightSchool, test_service};

fn processor(available_cents: i64, pending_cents: i64) -> ProcessorBalance {
    ProcessorBalance {
        available_cents,
        pending_cents,
        as_of: Utc::now(),
    }
}

#[tokio::test]
async fn test_reserve_in_balance_when_processor_matches() -> Result<()> {
    let (service, _temp) = test_service().await?;
    FlightSchool::setup(&service).await?;
    FlightSchool::top_up_now(&service, "alice", 50_000).await?;

    let snapshot = service
        .reconcile_reserve(&processor(50_000, 0), &ReservePolicy::default())
        .await?;

    assert_eq!(snapshot.ledger_cents, 50_000);
    assert_eq!(snapshot.drift_cents, 0);
    assert_eq!(snapshot.status, ReserveStatus::InBalance);
    assert_eq!(service.reserve_history(None).await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_drift_within_tolerance_stays_in_balance() -> Result<()> {
    let (service, _temp) = test_service().await?;
    FlightSchool::setup(&service).await?;
    FlightSchool::top_up_now(&service, "alice", 50_000).await?;
    let policy = ReservePolicy::default();

    // 0.80 over and exactly 1.00 under are both inside the default tolerance
    let over = service
        .reconcile_reserve(&processor(50_080, 0), &policy)
        .await?;
    assert_eq!(over.status, ReserveStatus::InBalance);

    let under = service
        .reconcile_reserve(&processor(49_900, 0), &policy)
        .await?;
    assert_eq!(under.drift_cents, -100);
    assert_eq!(under.status, ReserveStatus::InBalance);

    Ok(())
}

#[tokio::test]
async fn test_surplus_when_processor_holds_more() -> Result<()> {
    let (service, _temp) = test_service().await?;
    FlightSchool::setup(&service).await?;
    FlightSchool::top_up_now(&service, "alice", 50_000).await?;

    let snapshot = service
        .reconcile_reserve(&processor(51_000, 0), &ReservePolicy::default())
        .await?;

    assert_eq!(snapshot.drift_cents, 1_000);
    assert_eq!(snapshot.status, ReserveStatus::Surplus);

    Ok(())
}

#[tokio::test]
async fn test_shortfall_when_processor_holds_less() -> Result<()> {
    let (service, _temp) = test_service().await?;
    FlightSchool::setup(&service).await?;
    FlightSchool::top_up_now(&service, "alice", 50_000).await?;

    let snapshot = service
        .reconcile_reserve(&processor(49_000, 0), &ReservePolicy::default())
        .await?;

    assert_eq!(snapshot.drift_cents, -1_000);
    assert_eq!(snapshot.status, ReserveStatus::Shortfall);

    Ok(())
}

#[tokio::test]
async fn test_critical_when_shortfall_passes_threshold() -> Result<()> {
    let (service, _temp) = test_service().await?;
    FlightSchool::setup(&service).await?;
    FlightSchool::top_up_now(&service, "alice", 50_000).await?;

    // 100.00 of student money unaccounted for
    let snapshot = service
        .reconcile_reserve(&processor(40_000, 0), &ReservePolicy::default())
        .await?;

    assert_eq!(snapshot.drift_cents, -10_000);
    assert_eq!(snapshot.status, ReserveStatus::Critical);

    Ok(())
}

#[tokio::test]
async fn test_pending_funds_count_toward_the_processor_total() -> Result<()> {
    let (service, _temp) = test_service().await?;
    FlightSchool::setup(&service).await?;
    FlightSchool::top_up_now(&service, "alice", 50_000).await?;

    // Settled but not yet available money is still the school's
    let snapshot = service
        .reconcile_reserve(&processor(30_000, 20_000), &ReservePolicy::default())
        .await?;

    assert_eq!(snapshot.processor_pending_cents, 20_000);
    assert_eq!(snapshot.drift_cents, 0);
    assert_eq!(snapshot.status, ReserveStatus::InBalance);

    Ok(())
}

#[tokio::test]
async fn test_custom_policy_thresholds() -> Result<()> {
    let (service, _temp) = test_service().await?;
    FlightSchool::setup(&service).await?;
    FlightSchool::top_up_now(&service, "alice", 50_000).await?;

    let policy = ReservePolicy {
        tolerance_cents: 1_000,
        critical_shortfall_cents: 5_000,
    };

    let inside = service
        .reconcile_reserve(&processor(49_100, 0), &policy)
        .await?;
    assert_eq!(inside.status, ReserveStatus::InBalance);

    let critical = service
        .reconcile_reserve(&processor(45_000, 0), &policy)
        .await?;
    assert_eq!(critical.status, ReserveStatus::Critical);

    Ok(())
}

#[tokio::test]
async fn test_fees_reduce_the_expected_reserve() -> Result<()> {
    let (service, _temp) = test_service().await?;
    FlightSchool::setup(&service).await?;

    // The processor only ever holds the post-fee amount
    service
        .record_top_up("alice", 50_000, 175, Utc::now(), None, None)
        .await?;

    let snapshot = service
        .reconcile_reserve(&processor(49_825, 0), &ReservePolicy::default())
        .await?;

    assert_eq!(snapshot.ledger_cents, 49_825);
    assert_eq!(snapshot.drift_cents, 0);
    assert_eq!(snapshot.status, ReserveStatus::InBalance);

    Ok(())
}

#[tokio::test]
async fn test_snapshot_history_and_latest() -> Result<()> {
    let (service, _temp) = test_service().await?;
    FlightSchool::setup(&service).await?;
    FlightSchool::top_up_now(&service, "alice", 50_000).await?;
    let policy = ReservePolicy::default();

    service
        .reconcile_reserve(&processor(50_000, 0), &policy)
        .await?;
    service
        .reconcile_reserve(&processor(48_000, 0), &policy)
        .await?;

    let history = service.reserve_history(None).await?;
    assert_eq!(history.len(), 2);
    // Newest first
    assert_eq!(history[0].drift_cents, -2_000);

    let latest = service.latest_snapshot().await?;
    assert_eq!(latest.drift_cents, -2_000);
    assert_eq!(latest.status, ReserveStatus::Shortfall);

    assert_eq!(service.reserve_history(Some(1)).await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_latest_snapshot_errors_before_first_check() -> Result<()> {
    let (service, _temp) = test_service().await?;
    FlightSchool::setup(&service).await?;

    let err = service.latest_snapshot().await.unwrap_err();
    assert!(matches!(err, AppError::NoSnapshots));

    Ok(())
}

#[tokio::test]
async fn test_statement_file_feeds_reconciliation() -> Result<()> {
    let (service, temp) = test_service().await?;
    FlightSchool::setup(&service).await?;
    service
        .record_top_up("alice", 50_000, 175, Utc::now(), None, None)
        .await?;

    let statement_path = temp.path().join("statement.json");
    std::fs::write(
        &statement_path,
        r#"{"available_cents": 49825, "pending_cents": 0}"#,
    )?;

    let balance = StatementFileProcessor::new(&statement_path)
        .fetch_balance()
        .await?;
    let snapshot = service
        .reconcile_reserve(&balance, &ReservePolicy::default())
        .await?;

    assert_eq!(snapshot.status, ReserveStatus::InBalance);

    Ok(())
}

#[tokio::test]
async fn test_coverage_counts_credit_and_unpaid_earnings() -> Result<()> {
    let (service, _temp) = test_service().await?;
    FlightSchool::setup(&service).await?;
    FlightSchool::top_up_now(&service, "alice", 50_000).await?;
    FlightSchool::charge(&service, "alice", "bob", 12_000, 6_000).await?;

    let report = service.coverage_report().await?;

    // Owed: alice's remaining credit plus bob's unpaid earnings
    assert_eq!(report.reserve_cents, 50_000);
    assert_eq!(report.obligations_cents, 44_000);
    assert_eq!(report.surplus_cents, 6_000);
    assert!(report.is_covered());

    Ok(())
}

#[tokio::test]
async fn test_coverage_ignores_students_flying_on_credit() -> Result<()> {
    let (service, _temp) = test_service().await?;
    FlightSchool::setup(&service).await?;
    service
        .enroll_student("casey".into(), "USD".into(), Some(50_000), None)
        .await?;

    FlightSchool::top_up_now(&service, "alice", 20_000).await?;
    // casey owes the school, which is a receivable, not an obligation
    FlightSchool::charge(&service, "casey", "bob", 12_000, 6_000).await?;

    let report = service.coverage_report().await?;

    assert_eq!(report.reserve_cents, 20_000);
    assert_eq!(report.obligations_cents, 32_000);
    assert_eq!(report.surplus_cents, -12_000);
    assert!(!report.is_covered());

    Ok(())
}
