use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::journal::{JournalEntry, JournalId};
use super::money::{Cents, format_cents};
use super::wallet::WalletId;

pub type AdjustmentId = Uuid;

/// The money legs of a flight charge: what the student paid and how it
/// split between the instructor and the school.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeBreakdown {
    pub student_cents: Cents,
    pub instructor_cents: Cents,
    pub revenue_cents: Cents,
}

impl ChargeBreakdown {
    pub fn new(instructor_cents: Cents, revenue_cents: Cents) -> Self {
        Self {
            student_cents: instructor_cents + revenue_cents,
            instructor_cents,
            revenue_cents,
        }
    }

    /// The student leg must fund the other two exactly.
    pub fn is_consistent(&self) -> bool {
        self.student_cents == self.instructor_cents + self.revenue_cents
    }

    pub fn apply(&self, delta: &AdjustmentDelta) -> ChargeBreakdown {
        ChargeBreakdown {
            student_cents: self.student_cents + delta.student_delta_cents,
            instructor_cents: self.instructor_cents + delta.instructor_delta_cents,
            revenue_cents: self.revenue_cents + delta.revenue_delta_cents,
        }
    }
}

/// Signed correction to each leg. Negative deltas claw money back,
/// positive deltas charge more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentDelta {
    pub student_delta_cents: Cents,
    pub instructor_delta_cents: Cents,
    pub revenue_delta_cents: Cents,
}

impl AdjustmentDelta {
    pub fn is_noop(&self) -> bool {
        self.student_delta_cents == 0
            && self.instructor_delta_cents == 0
            && self.revenue_delta_cents == 0
    }
}

/// Delta that moves `effective` to the corrected instructor and revenue
/// amounts. The student delta follows from the other two, so a corrected
/// charge stays internally balanced.
pub fn compute_adjustment(
    effective: &ChargeBreakdown,
    corrected_instructor_cents: Cents,
    corrected_revenue_cents: Cents,
) -> AdjustmentDelta {
    let instructor_delta_cents = corrected_instructor_cents - effective.instructor_cents;
    let revenue_delta_cents = corrected_revenue_cents - effective.revenue_cents;
    AdjustmentDelta {
        student_delta_cents: instructor_delta_cents + revenue_delta_cents,
        instructor_delta_cents,
        revenue_delta_cents,
    }
}

/// Cumulative clawbacks may never exceed what was originally posted:
/// every corrected leg has to stay non-negative.
pub fn validate_adjustment(
    effective: &ChargeBreakdown,
    delta: &AdjustmentDelta,
) -> Result<(), AdjustmentError> {
    let corrected = effective.apply(delta);
    let legs = [
        ("student", corrected.student_cents),
        ("instructor", corrected.instructor_cents),
        ("revenue", corrected.revenue_cents),
    ];
    for (leg, corrected_cents) in legs {
        if corrected_cents < 0 {
            return Err(AdjustmentError::OverReversed {
                leg,
                corrected_cents,
            });
        }
    }
    Ok(())
}

/// Entries realizing `delta`. Decreases reverse the original posting
/// direction, increases repeat it, zero legs post nothing. The result is
/// balanced because the student delta is the sum of the other two.
pub fn adjustment_entries(
    student: WalletId,
    instructor: Option<WalletId>,
    revenue: Option<WalletId>,
    delta: &AdjustmentDelta,
) -> Result<Vec<JournalEntry>, AdjustmentError> {
    let mut entries = Vec::new();

    // Original charge debited the student
    match delta.student_delta_cents {
        d if d > 0 => entries.push(JournalEntry::debit(student, d)),
        d if d < 0 => entries.push(JournalEntry::credit(student, -d)),
        _ => {}
    }

    if delta.instructor_delta_cents != 0 {
        let wallet = instructor.ok_or(AdjustmentError::MissingLeg { leg: "instructor" })?;
        match delta.instructor_delta_cents {
            d if d > 0 => entries.push(JournalEntry::credit(wallet, d)),
            d => entries.push(JournalEntry::debit(wallet, -d)),
        }
    }

    if delta.revenue_delta_cents != 0 {
        let wallet = revenue.ok_or(AdjustmentError::MissingLeg { leg: "revenue" })?;
        match delta.revenue_delta_cents {
            d if d > 0 => entries.push(JournalEntry::credit(wallet, d)),
            d => entries.push(JournalEntry::debit(wallet, -d)),
        }
    }

    Ok(entries)
}

/// Persistent record tying a correction journal back to the flight
/// charge it fixes, with the leg deltas it applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightAdjustment {
    pub id: AdjustmentId,
    pub original_journal: JournalId,
    pub adjustment_journal: JournalId,
    pub delta: AdjustmentDelta,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FlightAdjustment {
    pub fn new(
        original_journal: JournalId,
        adjustment_journal: JournalId,
        delta: AdjustmentDelta,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            original_journal,
            adjustment_journal,
            delta,
            reason: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdjustmentError {
    OverReversed {
        leg: &'static str,
        corrected_cents: Cents,
    },
    MissingLeg {
        leg: &'static str,
    },
}

impl std::fmt::Display for AdjustmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdjustmentError::OverReversed {
                leg,
                corrected_cents,
            } => write!(
                f,
                "correction would take the {} leg to {}, below zero",
                leg,
                format_cents(*corrected_cents)
            ),
            AdjustmentError::MissingLeg { leg } => write!(
                f,
                "original charge has no {} leg to adjust",
                leg
            ),
        }
    }
}

impl std::error::Error for AdjustmentError {}

#[cfg(test)]
mod tests {
    use super::super::journal::EntryDirection;
    use super::*;

    fn lesson() -> ChargeBreakdown {
        // 180.00 lesson: 120.00 instructor, 60.00 school
        ChargeBreakdown::new(12_000, 6_000)
    }

    #[test]
    fn test_breakdown_consistency() {
        let b = lesson();
        assert_eq!(b.student_cents, 18_000);
        assert!(b.is_consistent());
    }

    #[test]
    fn test_compute_downward_adjustment() {
        // Logged 1.5h, actually flew 1.0h: both legs shrink by a third
        let delta = compute_adjustment(&lesson(), 8_000, 4_000);
        assert_eq!(delta.instructor_delta_cents, -4_000);
        assert_eq!(delta.revenue_delta_cents, -2_000);
        assert_eq!(delta.student_delta_cents, -6_000);
    }

    #[test]
    fn test_compute_upward_adjustment() {
        let delta = compute_adjustment(&lesson(), 14_000, 7_000);
        assert_eq!(delta.student_delta_cents, 3_000);
    }

    #[test]
    fn test_noop_delta() {
        let delta = compute_adjustment(&lesson(), 12_000, 6_000);
        assert!(delta.is_noop());
    }

    #[test]
    fn test_validate_rejects_over_reversal() {
        let delta = compute_adjustment(&lesson(), -1_000, 6_000);
        let err = validate_adjustment(&lesson(), &delta).unwrap_err();
        assert_eq!(
            err,
            AdjustmentError::OverReversed {
                leg: "instructor",
                corrected_cents: -1_000
            }
        );
    }

    #[test]
    fn test_validate_allows_full_reversal() {
        let delta = compute_adjustment(&lesson(), 0, 0);
        assert!(validate_adjustment(&lesson(), &delta).is_ok());
        assert_eq!(delta.student_delta_cents, -18_000);
    }

    #[test]
    fn test_entries_for_downward_delta_are_balanced() {
        let student = Uuid::new_v4();
        let instructor = Uuid::new_v4();
        let revenue = Uuid::new_v4();
        let delta = compute_adjustment(&lesson(), 8_000, 4_000);

        let entries =
            adjustment_entries(student, Some(instructor), Some(revenue), &delta).unwrap();

        assert_eq!(entries.len(), 3);
        // Student gets credit back, payees are debited
        assert_eq!(entries[0].direction, EntryDirection::Credit);
        assert_eq!(entries[0].amount_cents, 6_000);
        assert_eq!(entries[1].direction, EntryDirection::Debit);
        assert_eq!(entries[1].amount_cents, 4_000);
        assert_eq!(entries[2].amount_cents, 2_000);

        let debits: Cents = entries
            .iter()
            .filter(|e| e.direction == EntryDirection::Debit)
            .map(|e| e.amount_cents)
            .sum();
        let credits: Cents = entries
            .iter()
            .filter(|e| e.direction == EntryDirection::Credit)
            .map(|e| e.amount_cents)
            .sum();
        assert_eq!(debits, credits);
    }

    #[test]
    fn test_entries_for_split_shift_skip_student() {
        // Reclassify 20.00 from instructor to school: student unaffected
        let delta = compute_adjustment(&lesson(), 10_000, 8_000);
        assert_eq!(delta.student_delta_cents, 0);

        let entries = adjustment_entries(
            Uuid::new_v4(),
            Some(Uuid::new_v4()),
            Some(Uuid::new_v4()),
            &delta,
        )
        .unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].direction, EntryDirection::Debit);
        assert_eq!(entries[0].amount_cents, 2_000);
        assert_eq!(entries[1].direction, EntryDirection::Credit);
        assert_eq!(entries[1].amount_cents, 2_000);
    }

    #[test]
    fn test_entries_require_wallet_for_touched_leg() {
        let delta = compute_adjustment(&lesson(), 8_000, 6_000);
        let err = adjustment_entries(Uuid::new_v4(), None, None, &delta).unwrap_err();
        assert_eq!(err, AdjustmentError::MissingLeg { leg: "instructor" });
    }

    #[test]
    fn test_apply_chains_cumulative_corrections() {
        let first = compute_adjustment(&lesson(), 10_000, 5_000);
        let effective = lesson().apply(&first);
        assert_eq!(effective.instructor_cents, 10_000);
        assert_eq!(effective.student_cents, 15_000);

        let second = compute_adjustment(&effective, 9_000, 5_000);
        assert_eq!(second.student_delta_cents, -1_000);
        assert!(effective.apply(&second).is_consistent());
    }
}
