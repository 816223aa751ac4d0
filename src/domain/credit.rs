use serde::{Deserialize, Serialize};

use super::money::Cents;

/// Utilization thresholds for the warning tiers. Ratios are fractions of
/// the credit limit consumed after the proposed charge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CreditPolicy {
    pub warn_ratio: f64,
    pub critical_ratio: f64,
}

impl Default for CreditPolicy {
    fn default() -> Self {
        Self {
            warn_ratio: 0.75,
            critical_ratio: 0.90,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditTier {
    Clear,
    Approaching,
    Critical,
}

impl CreditTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditTier::Clear => "clear",
            CreditTier::Approaching => "approaching",
            CreditTier::Critical => "critical",
        }
    }
}

impl std::fmt::Display for CreditTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum CreditDecision {
    Approved { tier: CreditTier },
    Declined { shortfall_cents: Cents },
}

impl CreditDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, CreditDecision::Approved { .. })
    }
}

/// Everything the guard looked at for one proposed charge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CreditCheck {
    pub limit_cents: Cents,
    pub balance_cents: Cents,
    pub requested_cents: Cents,
    /// Balance after the charge would post
    pub projected_cents: Cents,
    /// Fraction of the limit consumed after the charge
    pub utilization: f64,
    pub decision: CreditDecision,
}

/// The part of a balance the school is fronting: zero while the wallet
/// holds prepaid credit, the overdraft once it goes negative.
pub fn exposure(balance_cents: Cents) -> Cents {
    (-balance_cents).max(0)
}

/// Exposure as a fraction of the limit. A zero limit with any exposure
/// is treated as fully consumed.
pub fn utilization(exposure_cents: Cents, limit_cents: Cents) -> f64 {
    if limit_cents <= 0 {
        if exposure_cents > 0 { f64::INFINITY } else { 0.0 }
    } else {
        exposure_cents as f64 / limit_cents as f64
    }
}

pub fn tier_for(utilization: f64, policy: &CreditPolicy) -> CreditTier {
    if utilization >= policy.critical_ratio {
        CreditTier::Critical
    } else if utilization >= policy.warn_ratio {
        CreditTier::Approaching
    } else {
        CreditTier::Clear
    }
}

/// Gate a proposed charge against the wallet's balance and credit limit.
/// Declines exactly when the projected balance would sink below `-limit`;
/// landing on the limit itself is approved at the critical tier.
pub fn evaluate_charge(
    balance_cents: Cents,
    limit_cents: Cents,
    requested_cents: Cents,
    policy: &CreditPolicy,
) -> CreditCheck {
    let projected_cents = balance_cents - requested_cents;
    let projected_exposure = exposure(projected_cents);
    let utilization = utilization(projected_exposure, limit_cents);

    let decision = if projected_exposure > limit_cents {
        CreditDecision::Declined {
            shortfall_cents: projected_exposure - limit_cents,
        }
    } else {
        CreditDecision::Approved {
            tier: tier_for(utilization, policy),
        }
    };

    CreditCheck {
        limit_cents,
        balance_cents,
        requested_cents,
        projected_cents,
        utilization,
        decision,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exposure() {
        assert_eq!(exposure(25_000), 0);
        assert_eq!(exposure(0), 0);
        assert_eq!(exposure(-18_000), 18_000);
    }

    #[test]
    fn test_utilization_with_zero_limit() {
        assert_eq!(utilization(0, 0), 0.0);
        assert_eq!(utilization(500, 0), f64::INFINITY);
    }

    #[test]
    fn test_prepaid_charge_stays_clear() {
        // 400.00 of credit, 180.00 lesson: never touches the line
        let check = evaluate_charge(40_000, 50_000, 18_000, &CreditPolicy::default());
        assert_eq!(check.projected_cents, 22_000);
        assert_eq!(check.utilization, 0.0);
        assert_eq!(
            check.decision,
            CreditDecision::Approved {
                tier: CreditTier::Clear
            }
        );
    }

    #[test]
    fn test_charge_crossing_warn_ratio() {
        // Limit 500.00, projected balance -400.00 -> 80% utilization
        let check = evaluate_charge(0, 50_000, 40_000, &CreditPolicy::default());
        assert_eq!(
            check.decision,
            CreditDecision::Approved {
                tier: CreditTier::Approaching
            }
        );
    }

    #[test]
    fn test_charge_crossing_critical_ratio() {
        // Projected balance -460.00 on a 500.00 limit -> 92%
        let check = evaluate_charge(-28_000, 50_000, 18_000, &CreditPolicy::default());
        assert_eq!(
            check.decision,
            CreditDecision::Approved {
                tier: CreditTier::Critical
            }
        );
    }

    #[test]
    fn test_charge_landing_exactly_on_limit_is_approved() {
        let check = evaluate_charge(-32_000, 50_000, 18_000, &CreditPolicy::default());
        assert_eq!(check.projected_cents, -50_000);
        assert_eq!(check.utilization, 1.0);
        assert_eq!(
            check.decision,
            CreditDecision::Approved {
                tier: CreditTier::Critical
            }
        );
    }

    #[test]
    fn test_charge_over_limit_declined_with_shortfall() {
        let check = evaluate_charge(-40_000, 50_000, 18_000, &CreditPolicy::default());
        assert_eq!(check.projected_cents, -58_000);
        assert_eq!(
            check.decision,
            CreditDecision::Declined {
                shortfall_cents: 8_000
            }
        );
    }

    #[test]
    fn test_zero_limit_blocks_any_overdraft() {
        let check = evaluate_charge(10_000, 0, 10_001, &CreditPolicy::default());
        assert_eq!(
            check.decision,
            CreditDecision::Declined { shortfall_cents: 1 }
        );

        let exact = evaluate_charge(10_000, 0, 10_000, &CreditPolicy::default());
        assert!(exact.decision.is_approved());
    }

    #[test]
    fn test_custom_policy_ratios() {
        let policy = CreditPolicy {
            warn_ratio: 0.50,
            critical_ratio: 0.80,
        };
        let check = evaluate_charge(0, 50_000, 30_000, &policy);
        assert_eq!(
            check.decision,
            CreditDecision::Approved {
                tier: CreditTier::Approaching
            }
        );
    }
}
