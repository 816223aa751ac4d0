use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::money::Cents;

pub type SnapshotId = Uuid;

/// Balance the external payment processor reports for the school's
/// merchant account. Pending funds are settled but not yet available.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessorBalance {
    pub available_cents: Cents,
    pub pending_cents: Cents,
    pub as_of: DateTime<Utc>,
}

impl ProcessorBalance {
    pub fn total_cents(&self) -> Cents {
        self.available_cents + self.pending_cents
    }
}

/// Drift thresholds. Tolerance absorbs rounding and settlement timing;
/// anything past it raises an alert, and a shortfall past the critical
/// threshold means student money may be missing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReservePolicy {
    pub tolerance_cents: Cents,
    pub critical_shortfall_cents: Cents,
}

impl Default for ReservePolicy {
    fn default() -> Self {
        Self {
            tolerance_cents: 100,
            critical_shortfall_cents: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReserveStatus {
    InBalance,
    Surplus,
    Shortfall,
    Critical,
}

impl ReserveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReserveStatus::InBalance => "in_balance",
            ReserveStatus::Surplus => "surplus",
            ReserveStatus::Shortfall => "shortfall",
            ReserveStatus::Critical => "critical",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "in_balance" => Some(ReserveStatus::InBalance),
            "surplus" => Some(ReserveStatus::Surplus),
            "shortfall" => Some(ReserveStatus::Shortfall),
            "critical" => Some(ReserveStatus::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReserveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One reconciliation run: what the ledger said, what the processor
/// said, and how far apart they were.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReserveSnapshot {
    pub id: SnapshotId,
    /// Reserve balance according to the ledger
    pub ledger_cents: Cents,
    pub processor_available_cents: Cents,
    pub processor_pending_cents: Cents,
    /// Processor total minus ledger reserve. Positive means the
    /// processor holds more than the ledger accounts for.
    pub drift_cents: Cents,
    pub status: ReserveStatus,
    pub checked_at: DateTime<Utc>,
}

/// Classify drift against the policy. Drift within tolerance on either
/// side is in balance; beyond it, extra money is a surplus and missing
/// money a shortfall, critical once the shortfall passes the threshold.
pub fn classify_drift(drift_cents: Cents, policy: &ReservePolicy) -> ReserveStatus {
    if drift_cents.abs() <= policy.tolerance_cents {
        ReserveStatus::InBalance
    } else if drift_cents > 0 {
        ReserveStatus::Surplus
    } else if -drift_cents >= policy.critical_shortfall_cents {
        ReserveStatus::Critical
    } else {
        ReserveStatus::Shortfall
    }
}

/// Compare the ledger's reserve against the processor report.
pub fn reconcile(
    ledger_cents: Cents,
    processor: &ProcessorBalance,
    policy: &ReservePolicy,
    checked_at: DateTime<Utc>,
) -> ReserveSnapshot {
    let drift_cents = processor.total_cents() - ledger_cents;
    ReserveSnapshot {
        id: Uuid::new_v4(),
        ledger_cents,
        processor_available_cents: processor.available_cents,
        processor_pending_cents: processor.pending_cents,
        drift_cents,
        status: classify_drift(drift_cents, policy),
        checked_at,
    }
}

/// Whether the reserve covers what the school owes: student credit plus
/// unpaid instructor earnings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageReport {
    pub reserve_cents: Cents,
    pub obligations_cents: Cents,
    pub surplus_cents: Cents,
}

impl CoverageReport {
    pub fn new(reserve_cents: Cents, obligations_cents: Cents) -> Self {
        Self {
            reserve_cents,
            obligations_cents,
            surplus_cents: reserve_cents - obligations_cents,
        }
    }

    pub fn is_covered(&self) -> bool {
        self.surplus_cents >= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor(available: Cents, pending: Cents) -> ProcessorBalance {
        ProcessorBalance {
            available_cents: available,
            pending_cents: pending,
            as_of: Utc::now(),
        }
    }

    #[test]
    fn test_drift_within_tolerance_is_in_balance() {
        let policy = ReservePolicy::default();
        assert_eq!(classify_drift(0, &policy), ReserveStatus::InBalance);
        assert_eq!(classify_drift(100, &policy), ReserveStatus::InBalance);
        assert_eq!(classify_drift(-100, &policy), ReserveStatus::InBalance);
    }

    #[test]
    fn test_positive_drift_is_surplus() {
        let policy = ReservePolicy::default();
        assert_eq!(classify_drift(101, &policy), ReserveStatus::Surplus);
        assert_eq!(classify_drift(1_000_000, &policy), ReserveStatus::Surplus);
    }

    #[test]
    fn test_negative_drift_is_shortfall_then_critical() {
        let policy = ReservePolicy::default();
        assert_eq!(classify_drift(-101, &policy), ReserveStatus::Shortfall);
        assert_eq!(classify_drift(-9_999, &policy), ReserveStatus::Shortfall);
        assert_eq!(classify_drift(-10_000, &policy), ReserveStatus::Critical);
        assert_eq!(classify_drift(-50_000, &policy), ReserveStatus::Critical);
    }

    #[test]
    fn test_reconcile_includes_pending_funds() {
        // Ledger says 1000.00, processor has 980.00 available + 20.00 pending
        let snapshot = reconcile(
            100_000,
            &processor(98_000, 2_000),
            &ReservePolicy::default(),
            Utc::now(),
        );
        assert_eq!(snapshot.drift_cents, 0);
        assert_eq!(snapshot.status, ReserveStatus::InBalance);
    }

    #[test]
    fn test_reconcile_detects_shortfall() {
        let snapshot = reconcile(
            100_000,
            &processor(95_000, 0),
            &ReservePolicy::default(),
            Utc::now(),
        );
        assert_eq!(snapshot.drift_cents, -5_000);
        assert_eq!(snapshot.status, ReserveStatus::Shortfall);
    }

    #[test]
    fn test_zero_tolerance_policy() {
        let policy = ReservePolicy {
            tolerance_cents: 0,
            critical_shortfall_cents: 1,
        };
        assert_eq!(classify_drift(0, &policy), ReserveStatus::InBalance);
        assert_eq!(classify_drift(-1, &policy), ReserveStatus::Critical);
        assert_eq!(classify_drift(1, &policy), ReserveStatus::Surplus);
    }

    #[test]
    fn test_coverage_report() {
        let covered = CoverageReport::new(120_000, 100_000);
        assert!(covered.is_covered());
        assert_eq!(covered.surplus_cents, 20_000);

        let short = CoverageReport::new(80_000, 100_000);
        assert!(!short.is_covered());
        assert_eq!(short.surplus_cents, -20_000);
    }
}
