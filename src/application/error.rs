use thiserror::Error;

use crate::domain::{AdjustmentError, Cents, JournalError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    #[error("Wallet already exists: {0}")]
    WalletAlreadyExists(String),

    #[error("Wallet is archived: {0}")]
    WalletArchived(String),

    #[error("Journal not found: {0}")]
    JournalNotFound(String),

    #[error("Reference '{reference}' already posted as journal {journal_id}")]
    DuplicateReference {
        reference: String,
        journal_id: String,
    },

    #[error("Invalid journal: {0}")]
    InvalidJournal(#[from] JournalError),

    #[error("Currency mismatch between wallets: {expected} vs {found}")]
    CurrencyMismatch { expected: String, found: String },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error(
        "Would take {wallet_name} below its floor: balance {balance_cents}, floor {floor_cents}"
    )]
    FloorViolated {
        wallet_name: String,
        balance_cents: Cents,
        floor_cents: Cents,
    },

    #[error(
        "Credit limit exceeded for {wallet_name}: balance {balance_cents}, limit {limit_cents}, requested {requested_cents} (short by {shortfall_cents})"
    )]
    CreditLimitExceeded {
        wallet_name: String,
        balance_cents: Cents,
        limit_cents: Cents,
        requested_cents: Cents,
        shortfall_cents: Cents,
    },

    #[error("Wallet has no credit limit: {0}")]
    NoCreditLimit(String),

    #[error(
        "Payout exceeds payable balance for {wallet_name}: balance {balance_cents}, requested {requested_cents}"
    )]
    PayoutExceedsBalance {
        wallet_name: String,
        balance_cents: Cents,
        requested_cents: Cents,
    },

    #[error(
        "Refund exceeds remaining credit for {wallet_name}: balance {balance_cents}, requested {requested_cents}"
    )]
    RefundExceedsCredit {
        wallet_name: String,
        balance_cents: Cents,
        requested_cents: Cents,
    },

    #[error("Journal {0} is not a flight charge")]
    NotAFlightCharge(String),

    #[error("Nothing to adjust: corrected amounts match the effective charge")]
    NothingToAdjust,

    #[error("Journal {0} already has corrections; adjust it instead")]
    AlreadyCorrected(String),

    #[error("Invalid adjustment: {0}")]
    InvalidAdjustment(#[from] AdjustmentError),

    #[error("No reserve snapshots recorded yet")]
    NoSnapshots,

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}
