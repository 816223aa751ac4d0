use crate::domain::{
    Cents, CreditCheck, CreditPolicy, CreditTier, WalletType, evaluate_charge, exposure, tier_for,
    utilization,
};

use super::{AppError, LedgerService};

/// Where one wallet stands against its credit line right now.
pub struct CreditStanding {
    pub wallet_name: String,
    pub limit_cents: Cents,
    pub balance_cents: Cents,
    /// How much of the balance the school is currently fronting
    pub exposure_cents: Cents,
    /// Headroom left before charges start declining
    pub available_cents: Cents,
    pub utilization: f64,
    pub tier: CreditTier,
}

/// Result of a dry-run credit check.
#[derive(Debug)]
pub struct CreditCheckResult {
    pub wallet_name: String,
    pub check: CreditCheck,
}

impl LedgerService {
    /// Dry-run the credit gate for a proposed charge, without posting.
    pub async fn check_credit(
        &self,
        wallet_name: &str,
        amount_cents: Cents,
        policy: &CreditPolicy,
    ) -> Result<CreditCheckResult, AppError> {
        if amount_cents <= 0 {
            return Err(AppError::InvalidAmount(
                "Charge amount must be positive".to_string(),
            ));
        }

        let wallet = self.get_wallet(wallet_name).await?;
        let limit = wallet
            .credit_limit_cents
            .ok_or_else(|| AppError::NoCreditLimit(wallet.name.clone()))?;
        let balance = self.reported_balance_of(&wallet).await?;

        Ok(CreditCheckResult {
            wallet_name: wallet.name,
            check: evaluate_charge(balance, limit, amount_cents, policy),
        })
    }

    /// Credit standing for one wallet.
    pub async fn credit_standing(
        &self,
        wallet_name: &str,
        policy: &CreditPolicy,
    ) -> Result<CreditStanding, AppError> {
        let wallet = self.get_wallet(wallet_name).await?;
        let limit = wallet
            .credit_limit_cents
            .ok_or_else(|| AppError::NoCreditLimit(wallet.name.clone()))?;
        let balance = self.reported_balance_of(&wallet).await?;
        Ok(Self::standing_for(wallet.name, limit, balance, policy))
    }

    /// Credit standings for every active student wallet that has a
    /// limit, most utilized first. Asset floors are not credit lines
    /// and stay out of this view.
    pub async fn credit_standings(
        &self,
        policy: &CreditPolicy,
    ) -> Result<Vec<CreditStanding>, AppError> {
        let mut standings = Vec::new();
        for entry in self.get_all_balances().await? {
            if entry.wallet.wallet_type != WalletType::Liability {
                continue;
            }
            let Some(limit) = entry.wallet.credit_limit_cents else {
                continue;
            };
            standings.push(Self::standing_for(
                entry.wallet.name,
                limit,
                entry.balance,
                policy,
            ));
        }
        standings.sort_by(|a, b| {
            b.utilization
                .partial_cmp(&a.utilization)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(standings)
    }

    fn standing_for(
        wallet_name: String,
        limit_cents: Cents,
        balance_cents: Cents,
        policy: &CreditPolicy,
    ) -> CreditStanding {
        let exposure_cents = exposure(balance_cents);
        let utilization = utilization(exposure_cents, limit_cents);
        CreditStanding {
            wallet_name,
            limit_cents,
            balance_cents,
            exposure_cents,
            available_cents: balance_cents + limit_cents,
            utilization,
            tier: tier_for(utilization, policy),
        }
    }
}
