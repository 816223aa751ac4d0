// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use aeroledger::application::{FlightChargeResult, LedgerService};
use aeroledger::domain::CreditPolicy;
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LedgerService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Helper to parse a date string into DateTime<Utc>
pub fn parse_date(date_str: &str) -> DateTime<Utc> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
}

/// Test fixture: a small flight school
pub struct FlightSchool;

impl FlightSchool {
    /// Platform wallets plus one student (alice, 500.00 credit line)
    /// and one instructor (bob)
    pub async fn setup(service: &LedgerService) -> Result<()> {
        service.setup_chart("USD").await?;
        service
            .enroll_student("alice".into(), "USD".into(), Some(50_000), None)
            .await?;
        service
            .hire_instructor("bob".into(), "USD".into(), None)
            .await?;
        Ok(())
    }

    /// Top up a student with no processor fee
    pub async fn top_up(
        service: &LedgerService,
        student: &str,
        amount: i64,
        date: DateTime<Utc>,
    ) -> Result<()> {
        service
            .record_top_up(student, amount, 0, date, None, None)
            .await?;
        Ok(())
    }

    /// Top up a student with the current timestamp
    pub async fn top_up_now(service: &LedgerService, student: &str, amount: i64) -> Result<()> {
        Self::top_up(service, student, amount, Utc::now()).await
    }

    /// Charge a lesson under the default credit policy
    pub async fn charge(
        service: &LedgerService,
        student: &str,
        instructor: &str,
        instructor_cents: i64,
        revenue_cents: i64,
    ) -> Result<FlightChargeResult> {
        Ok(service
            .record_flight_charge(
                student,
                instructor,
                instructor_cents,
                revenue_cents,
                Utc::now(),
                None,
                None,
                &CreditPolicy::default(),
                false,
            )
            .await?)
    }
}
