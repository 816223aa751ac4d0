mod common;

use aeroledger::application::AppError;
use aeroledger::domain::{CreditDecision, CreditPolicy, CreditTier};
use anyhow::Result;
use chrono::Utc;
use common::{FlightSchool, test_service};

#[tokio::test]
async fn test_charge_on_credit_within_limit() -> Result<()> {
    let (service, _temp) = test_service().await?;
    FlightSchool::setup(&service).await?;

    // No prepaid credit: the 180.00 lesson goes on alice's 500.00 line
    let result = FlightSchool::charge(&service, "alice", "bob", 12_000, 6_000).await?;

    assert_eq!(service.get_balance("alice").await?.balance, -18_000);
    let check = result.check.expect("limited wallets are always checked");
    assert_eq!(check.projected_cents, -18_000);
    assert_eq!(
        check.decision,
        CreditDecision::Approved {
            tier: CreditTier::Clear
        }
    );

    Ok(())
}

#[tokio::test]
async fn test_warning_tier_when_approaching_limit() -> Result<()> {
    let (service, _temp) = test_service().await?;
    FlightSchool::setup(&service).await?;

    // Projected balance -400.00 on a 500.00 line: 80% utilization
    let result = FlightSchool::charge(&service, "alice", "bob", 26_000, 14_000).await?;

    let check = result.check.unwrap();
    assert_eq!(
        check.decision,
        CreditDecision::Approved {
            tier: CreditTier::Approaching
        }
    );

    Ok(())
}

#[tokio::test]
async fn test_critical_tier_near_limit() -> Result<()> {
    let (service, _temp) = test_service().await?;
    FlightSchool::setup(&service).await?;

    // Projected balance -460.00 on a 500.00 line: 92% utilization
    let result = FlightSchool::charge(&service, "alice", "bob", 31_000, 15_000).await?;

    let check = result.check.unwrap();
    assert_eq!(
        check.decision,
        CreditDecision::Approved {
            tier: CreditTier::Critical
        }
    );

    Ok(())
}

#[tokio::test]
async fn test_charge_exceeding_limit_declined() -> Result<()> {
    let (service, _temp) = test_service().await?;
    FlightSchool::setup(&service).await?;

    // 550.00 against a 500.00 line
    let err = FlightSchool::charge(&service, "alice", "bob", 40_000, 15_000)
        .await
        .unwrap_err();

    match err.downcast::<AppError>()? {
        AppError::CreditLimitExceeded {
            shortfall_cents, ..
        } => assert_eq!(shortfall_cents, 5_000),
        other => panic!("expected CreditLimitExceeded, got {other}"),
    }

    // Nothing posted
    assert_eq!(service.get_balance("alice").await?.balance, 0);
    assert_eq!(service.get_balance("bob").await?.balance, 0);
    assert!(service.list_all_journals().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_forced_charge_posts_past_the_decline() -> Result<()> {
    let (service, _temp) = test_service().await?;
    FlightSchool::setup(&service).await?;

    let result = service
        .record_flight_charge(
            "alice",
            "bob",
            40_000,
            15_000,
            Utc::now(),
            None,
            None,
            &CreditPolicy::default(),
            true,
        )
        .await?;

    assert_eq!(service.get_balance("alice").await?.balance, -55_000);
    // The check is still recorded so the caller can see what was overridden
    let check = result.check.unwrap();
    assert!(matches!(check.decision, CreditDecision::Declined { .. }));

    // The ledger stays consistent, with the breach reported as a warning
    let report = service.check_integrity().await?;
    assert!(report.is_healthy());
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].wallet_name, "alice");

    Ok(())
}

#[tokio::test]
async fn test_new_students_cannot_fly_on_credit() -> Result<()> {
    let (service, _temp) = test_service().await?;
    FlightSchool::setup(&service).await?;
    service
        .enroll_student("casey".into(), "USD".into(), None, None)
        .await?;

    // Enrollment without a line leaves a zero floor
    assert_eq!(
        service.get_wallet("casey").await?.credit_limit_cents,
        Some(0)
    );

    let err = FlightSchool::charge(&service, "casey", "bob", 100, 0)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast::<AppError>()?,
        AppError::CreditLimitExceeded { .. }
    ));

    // Prepaid credit can be spent down to exactly zero
    FlightSchool::top_up_now(&service, "casey", 18_000).await?;
    FlightSchool::charge(&service, "casey", "bob", 12_000, 6_000).await?;
    assert_eq!(service.get_balance("casey").await?.balance, 0);

    Ok(())
}

#[tokio::test]
async fn test_unlimited_wallet_skips_the_gate() -> Result<()> {
    let (service, _temp) = test_service().await?;
    FlightSchool::setup(&service).await?;

    service.set_credit_limit("alice", None).await?;

    let result = FlightSchool::charge(&service, "alice", "bob", 70_000, 30_000).await?;
    assert!(result.check.is_none());
    assert_eq!(service.get_balance("alice").await?.balance, -100_000);

    // Without a limit there is no standing to report
    let err = service
        .check_credit("alice", 1_000, &CreditPolicy::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NoCreditLimit(_)));

    Ok(())
}

#[tokio::test]
async fn test_credit_check_is_a_dry_run() -> Result<()> {
    let (service, _temp) = test_service().await?;
    FlightSchool::setup(&service).await?;

    let result = service
        .check_credit("alice", 18_000, &CreditPolicy::default())
        .await?;

    assert!(result.check.decision.is_approved());
    assert_eq!(result.check.projected_cents, -18_000);
    // Nothing was posted
    assert!(service.list_all_journals().await?.is_empty());
    assert_eq!(service.get_balance("alice").await?.balance, 0);

    Ok(())
}

#[tokio::test]
async fn test_credit_standing_tracks_exposure() -> Result<()> {
    let (service, _temp) = test_service().await?;
    FlightSchool::setup(&service).await?;
    let policy = CreditPolicy::default();

    FlightSchool::top_up_now(&service, "alice", 10_000).await?;

    // Prepaid credit means no exposure
    let standing = service.credit_standing("alice", &policy).await?;
    assert_eq!(standing.balance_cents, 10_000);
    assert_eq!(standing.exposure_cents, 0);
    assert_eq!(standing.utilization, 0.0);
    assert_eq!(standing.tier, CreditTier::Clear);

    // An 180.00 lesson overdraws into the line by 80.00
    FlightSchool::charge(&service, "alice", "bob", 12_000, 6_000).await?;
    let standing = service.credit_standing("alice", &policy).await?;
    assert_eq!(standing.balance_cents, -8_000);
    assert_eq!(standing.exposure_cents, 8_000);
    assert_eq!(standing.available_cents, 42_000);
    assert_eq!(standing.utilization, 0.16);

    Ok(())
}

#[tokio::test]
async fn test_standings_cover_students_with_limits_only() -> Result<()> {
    let (service, _temp) = test_service().await?;
    FlightSchool::setup(&service).await?;
    service
        .enroll_student("casey".into(), "USD".into(), Some(20_000), None)
        .await?;
    let policy = CreditPolicy::default();

    // casey deeper into their line than alice
    FlightSchool::charge(&service, "alice", "bob", 8_000, 4_000).await?;
    FlightSchool::charge(&service, "casey", "bob", 12_000, 6_000).await?;

    let standings = service.credit_standings(&policy).await?;
    let names: Vec<&str> = standings.iter().map(|s| s.wallet_name.as_str()).collect();

    // Instructors and platform wallets never show up
    assert_eq!(names, vec!["casey", "alice"]);
    assert!(standings[0].utilization > standings[1].utilization);

    Ok(())
}
