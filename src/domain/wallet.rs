use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::journal::EntryDirection;
use super::money::Cents;

pub type WalletId = Uuid;

/// Canonical names for the platform's own wallets. The billing flows
/// resolve these by name, so `init` creates them up front.
pub const RESERVE_WALLET: &str = "reserve";
pub const REVENUE_WALLET: &str = "revenue";
pub const FEES_WALLET: &str = "fees";
pub const EQUITY_WALLET: &str = "equity";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletType {
    /// Cash the platform holds: the payment processor reserve
    Asset,
    /// Balances the school owes: student flight credit, instructor payables
    Liability,
    /// Earned platform revenue (the school's cut of each flight)
    Revenue,
    /// Costs the platform eats, like processor fees
    Expense,
    /// Opening balances and owner capital
    Equity,
}

impl WalletType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletType::Asset => "asset",
            WalletType::Liability => "liability",
            WalletType::Revenue => "revenue",
            WalletType::Expense => "expense",
            WalletType::Equity => "equity",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "asset" => Some(WalletType::Asset),
            "liability" => Some(WalletType::Liability),
            "revenue" => Some(WalletType::Revenue),
            "expense" => Some(WalletType::Expense),
            "equity" => Some(WalletType::Equity),
            _ => None,
        }
    }

    /// The side on which balances of this type grow. Assets and expenses
    /// accumulate debits; liabilities, revenue and equity accumulate credits.
    pub fn normal_side(&self) -> EntryDirection {
        match self {
            WalletType::Asset | WalletType::Expense => EntryDirection::Debit,
            WalletType::Liability | WalletType::Revenue | WalletType::Equity => {
                EntryDirection::Credit
            }
        }
    }

    /// Sign applied to the raw debit-minus-credit total to get the
    /// balance as reported to users.
    pub fn balance_sign(&self) -> Cents {
        match self.normal_side() {
            EntryDirection::Debit => 1,
            EntryDirection::Credit => -1,
        }
    }
}

impl std::fmt::Display for WalletType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub name: String,
    pub wallet_type: WalletType,
    pub currency: String,
    /// Floor policy for the reported balance. `None` means no floor,
    /// `Some(0)` means the balance may not go negative, `Some(limit)`
    /// grants a credit line down to `-limit`.
    pub credit_limit_cents: Option<Cents>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl Wallet {
    pub fn new(name: String, wallet_type: WalletType, currency: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            wallet_type,
            currency,
            // Cash cannot be overdrawn; everything else starts unconstrained.
            credit_limit_cents: match wallet_type {
                WalletType::Asset => Some(0),
                _ => None,
            },
            description: None,
            created_at: Utc::now(),
            archived_at: None,
        }
    }

    /// A student's prepaid flight-credit wallet. Starts with a zero
    /// floor: no flying on credit until a line is granted.
    pub fn student(name: impl Into<String>, currency: impl Into<String>) -> Self {
        let mut wallet = Self::new(name.into(), WalletType::Liability, currency.into());
        wallet.credit_limit_cents = Some(0);
        wallet
    }

    /// An instructor's payable wallet. No floor, since retroactive
    /// clawbacks may briefly push it negative.
    pub fn instructor(name: impl Into<String>, currency: impl Into<String>) -> Self {
        Self::new(name.into(), WalletType::Liability, currency.into())
    }

    pub fn reserve(currency: impl Into<String>) -> Self {
        Self::new(RESERVE_WALLET.into(), WalletType::Asset, currency.into())
            .with_description("Cash held at the payment processor")
    }

    pub fn revenue(currency: impl Into<String>) -> Self {
        Self::new(REVENUE_WALLET.into(), WalletType::Revenue, currency.into())
            .with_description("Platform share of flight charges")
    }

    pub fn processor_fees(currency: impl Into<String>) -> Self {
        Self::new(FEES_WALLET.into(), WalletType::Expense, currency.into())
            .with_description("Payment processor fees")
    }

    pub fn equity(currency: impl Into<String>) -> Self {
        Self::new(EQUITY_WALLET.into(), WalletType::Equity, currency.into())
            .with_description("Opening balances and owner capital")
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_credit_limit(mut self, limit: impl Into<Option<Cents>>) -> Self {
        self.credit_limit_cents = limit.into();
        self
    }

    /// Lowest reported balance this wallet may reach, if any.
    pub fn floor_cents(&self) -> Option<Cents> {
        self.credit_limit_cents.map(|limit| -limit)
    }

    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}
