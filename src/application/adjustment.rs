use chrono::Utc;

use crate::domain::{
    Cents, ChargeBreakdown, CreditCheck, CreditDecision, CreditPolicy, EntryDirection,
    FlightAdjustment, Journal, JournalKind, REVENUE_WALLET, Wallet, WalletId, WalletType,
    adjustment_entries, compute_adjustment, evaluate_charge, validate_adjustment,
};

use super::service::JournalResult;
use super::{AppError, LedgerService};

/// Result of adjusting a flight charge
#[derive(Debug)]
pub struct AdjustmentResult {
    pub adjustment: FlightAdjustment,
    /// The correction journal that was posted
    pub journal: Journal,
    pub original: Journal,
    pub student_name: String,
    /// Effective legs before and after this correction
    pub before: ChargeBreakdown,
    pub after: ChargeBreakdown,
    /// Present when the correction charged the student more and the
    /// student has a credit limit
    pub check: Option<CreditCheck>,
}

/// The wallets behind each leg of a posted flight charge.
struct ChargeLegs {
    student: WalletId,
    instructor: Option<WalletId>,
    revenue: Option<WalletId>,
}

impl LedgerService {
    /// Correct a posted flight charge to new instructor and revenue
    /// amounts. Decreases claw money back through reversing entries;
    /// increases post extra charge, gated by the student's credit limit
    /// unless forced. Corrections accumulate: each one starts from the
    /// charge as already corrected.
    pub async fn adjust_flight(
        &self,
        selector: &str,
        corrected_instructor_cents: Cents,
        corrected_revenue_cents: Cents,
        reason: Option<String>,
        policy: &CreditPolicy,
        force: bool,
    ) -> Result<AdjustmentResult, AppError> {
        if corrected_instructor_cents < 0 || corrected_revenue_cents < 0 {
            return Err(AppError::InvalidAmount(
                "Corrected amounts cannot be negative".to_string(),
            ));
        }

        let original = self.find_journal(selector).await?;
        if original.kind != JournalKind::FlightCharge {
            return Err(AppError::NotAFlightCharge(original.id.to_string()));
        }

        let (posted, legs) = self.charge_breakdown(&original).await?;

        // Start from the charge as already corrected
        let prior = self.repo().adjustments_for_journal(original.id).await?;
        let before = prior
            .iter()
            .fold(posted, |acc, adj| acc.apply(&adj.delta));

        let delta = compute_adjustment(&before, corrected_instructor_cents, corrected_revenue_cents);
        if delta.is_noop() {
            return Err(AppError::NothingToAdjust);
        }
        validate_adjustment(&before, &delta)?;

        let student = self.get_wallet_by_id(legs.student).await?;

        // An upward correction is extra charge and goes through the gate
        let mut check = None;
        if delta.student_delta_cents > 0 {
            if let Some(limit) = student.credit_limit_cents {
                let balance = self.reported_balance_of(&student).await?;
                let evaluated =
                    evaluate_charge(balance, limit, delta.student_delta_cents, policy);
                if let CreditDecision::Declined { shortfall_cents } = evaluated.decision {
                    if !force {
                        return Err(AppError::CreditLimitExceeded {
                            wallet_name: student.name.clone(),
                            balance_cents: balance,
                            limit_cents: limit,
                            requested_cents: delta.student_delta_cents,
                            shortfall_cents,
                        });
                    }
                }
                check = Some(evaluated);
            }
        }

        // A revenue leg can appear in a correction even if the original
        // charge had none; an instructor leg cannot, since we wouldn't
        // know whose wallet to hit.
        let revenue_fallback = match legs.revenue {
            Some(id) => Some(id),
            None if delta.revenue_delta_cents != 0 => {
                Some(self.get_wallet(REVENUE_WALLET).await?.id)
            }
            None => None,
        };

        let entries = adjustment_entries(legs.student, legs.instructor, revenue_fallback, &delta)?;

        let mut wallets = std::collections::HashMap::new();
        for entry in &entries {
            let wallet = self.get_wallet_by_id(entry.wallet_id).await?;
            wallets.insert(wallet.id, wallet);
        }

        let description = reason.clone().unwrap_or_else(|| {
            format!(
                "Adjustment of flight {}",
                original
                    .reference
                    .as_deref()
                    .unwrap_or(&original.id.to_string())
            )
        });
        let journal = Journal::new(JournalKind::Adjustment, entries, Utc::now())
            .with_reverses(original.id)
            .with_description(description);

        let journal = self.post_validated(journal, &wallets, force).await?;

        let mut adjustment = FlightAdjustment::new(original.id, journal.id, delta);
        if let Some(r) = reason {
            adjustment = adjustment.with_reason(r);
        }
        self.repo().save_adjustment(&adjustment).await?;

        Ok(AdjustmentResult {
            adjustment,
            journal,
            student_name: student.name,
            original,
            before,
            after: before.apply(&delta),
            check,
        })
    }

    /// Fully reverse a journal that hasn't been corrected yet. Posts an
    /// adjustment with every entry direction flipped.
    pub async fn void_journal(
        &self,
        selector: &str,
        reason: Option<String>,
    ) -> Result<JournalResult, AppError> {
        let original = self.find_journal(selector).await?;

        let corrections = self.repo().corrections_for_journal(original.id).await?;
        if !corrections.is_empty() {
            return Err(AppError::AlreadyCorrected(original.id.to_string()));
        }

        let mut reversal = original.create_reversal();
        if let Some(r) = reason {
            reversal = reversal.with_description(r);
        }

        let mut wallets = std::collections::HashMap::new();
        for entry in &reversal.entries {
            let wallet = self.get_wallet_by_id(entry.wallet_id).await?;
            wallets.insert(wallet.id, wallet);
        }

        let journal = self.post_validated(reversal, &wallets, false).await?;
        let lines = Self::entry_lines(&journal, &wallets);
        Ok(JournalResult { journal, lines })
    }

    /// List all flight adjustments, or only those for one journal.
    pub async fn list_adjustments(
        &self,
        selector: Option<&str>,
    ) -> Result<Vec<FlightAdjustment>, AppError> {
        match selector {
            Some(sel) => {
                let journal = self.find_journal(sel).await?;
                Ok(self.repo().adjustments_for_journal(journal.id).await?)
            }
            None => Ok(self.repo().list_adjustments().await?),
        }
    }

    /// The charge as originally posted, with the wallets behind each leg.
    async fn charge_breakdown(
        &self,
        journal: &Journal,
    ) -> Result<(ChargeBreakdown, ChargeLegs), AppError> {
        let mut student: Option<(WalletId, i64)> = None;
        let mut instructor: Option<WalletId> = None;
        let mut instructor_cents = 0;
        let mut revenue: Option<WalletId> = None;
        let mut revenue_cents = 0;

        for entry in &journal.entries {
            let wallet: Wallet = self.get_wallet_by_id(entry.wallet_id).await?;
            match entry.direction {
                EntryDirection::Debit => {
                    student = Some((entry.wallet_id, entry.amount_cents));
                }
                EntryDirection::Credit => match wallet.wallet_type {
                    WalletType::Liability => {
                        instructor.get_or_insert(entry.wallet_id);
                        instructor_cents += entry.amount_cents;
                    }
                    _ => {
                        revenue.get_or_insert(entry.wallet_id);
                        revenue_cents += entry.amount_cents;
                    }
                },
            }
        }

        let (student_id, student_cents) = student.ok_or_else(|| {
            AppError::NotAFlightCharge(journal.id.to_string())
        })?;

        Ok((
            ChargeBreakdown {
                student_cents,
                instructor_cents,
                revenue_cents,
            },
            ChargeLegs {
                student: student_id,
                instructor,
                revenue,
            },
        ))
    }
}
