use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::money::Cents;
use super::wallet::{WalletId, WalletType};

pub type JournalId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryDirection {
    Debit,
    Credit,
}

impl EntryDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryDirection::Debit => "debit",
            EntryDirection::Credit => "credit",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "debit" => Some(EntryDirection::Debit),
            "credit" => Some(EntryDirection::Credit),
            _ => None,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            EntryDirection::Debit => EntryDirection::Credit,
            EntryDirection::Credit => EntryDirection::Debit,
        }
    }
}

impl std::fmt::Display for EntryDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What kind of business event a journal records. Kinds carry shape
/// rules so a payout can never be dressed up as a top-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalKind {
    /// Student buys flight credit through the payment processor
    TopUp,
    /// A flown lesson: student credit consumed, instructor and school paid
    FlightCharge,
    /// Instructor earnings paid out of the reserve
    Payout,
    /// Student credit returned to the student's card
    Refund,
    /// Retroactive correction of an earlier journal
    Adjustment,
    /// Opening balances when onboarding existing accounts
    Opening,
    /// Free-form posting for anything the other kinds don't cover
    Manual,
}

impl JournalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalKind::TopUp => "top_up",
            JournalKind::FlightCharge => "flight_charge",
            JournalKind::Payout => "payout",
            JournalKind::Refund => "refund",
            JournalKind::Adjustment => "adjustment",
            JournalKind::Opening => "opening",
            JournalKind::Manual => "manual",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "top_up" | "topup" => Some(JournalKind::TopUp),
            "flight_charge" | "charge" => Some(JournalKind::FlightCharge),
            "payout" => Some(JournalKind::Payout),
            "refund" => Some(JournalKind::Refund),
            "adjustment" => Some(JournalKind::Adjustment),
            "opening" => Some(JournalKind::Opening),
            "manual" => Some(JournalKind::Manual),
            _ => None,
        }
    }

    /// Adjustments may take balances below their floor: a clawback has to
    /// post even when the instructor already spent the money.
    pub fn bypasses_floor(&self) -> bool {
        matches!(self, JournalKind::Adjustment)
    }
}

impl std::fmt::Display for JournalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One leg of a journal: a positive amount hitting one wallet on one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub wallet_id: WalletId,
    pub direction: EntryDirection,
    pub amount_cents: Cents,
}

impl JournalEntry {
    pub fn debit(wallet_id: WalletId, amount_cents: Cents) -> Self {
        assert!(amount_cents > 0, "Entry amount must be positive");
        Self {
            wallet_id,
            direction: EntryDirection::Debit,
            amount_cents,
        }
    }

    pub fn credit(wallet_id: WalletId, amount_cents: Cents) -> Self {
        assert!(amount_cents > 0, "Entry amount must be positive");
        Self {
            wallet_id,
            direction: EntryDirection::Credit,
            amount_cents,
        }
    }

    /// Effect on the raw debit-minus-credit total of the wallet.
    pub fn signed_cents(&self) -> Cents {
        match self.direction {
            EntryDirection::Debit => self.amount_cents,
            EntryDirection::Credit => -self.amount_cents,
        }
    }
}

/// A journal is an atomic set of entries whose debits and credits cancel
/// out exactly. Journals are immutable once posted - corrections happen
/// through new journals that link back via `reverses`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journal {
    pub id: JournalId,
    /// Monotonically increasing posting order, assigned by the repository
    pub sequence: i64,
    pub kind: JournalKind,
    pub entries: Vec<JournalEntry>,
    /// When the underlying event happened (the flight, the card payment)
    pub effective_at: DateTime<Utc>,
    /// When the ledger recorded it
    pub posted_at: DateTime<Utc>,
    pub description: Option<String>,
    /// External idempotency key (payment intent id, flight log id, ...)
    pub reference: Option<String>,
    /// Set when this journal corrects an earlier one
    pub reverses: Option<JournalId>,
}

impl Journal {
    /// Create a new journal. Sequence number must be assigned by the repository.
    pub fn new(kind: JournalKind, entries: Vec<JournalEntry>, effective_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0, // Will be set by repository
            kind,
            entries,
            effective_at,
            posted_at: Utc::now(),
            description: None,
            reference: None,
            reverses: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_reverses(mut self, original_id: JournalId) -> Self {
        self.reverses = Some(original_id);
        self
    }

    /// Returns true if this journal corrects another journal
    pub fn is_correction(&self) -> bool {
        self.reverses.is_some()
    }

    pub fn debit_total(&self) -> Cents {
        self.entries
            .iter()
            .filter(|e| e.direction == EntryDirection::Debit)
            .map(|e| e.amount_cents)
            .sum()
    }

    pub fn credit_total(&self) -> Cents {
        self.entries
            .iter()
            .filter(|e| e.direction == EntryDirection::Credit)
            .map(|e| e.amount_cents)
            .sum()
    }

    pub fn is_balanced(&self) -> bool {
        self.debit_total() == self.credit_total()
    }

    /// Net raw effect of this journal on one wallet.
    pub fn raw_effect_on(&self, wallet_id: WalletId) -> Cents {
        self.entries
            .iter()
            .filter(|e| e.wallet_id == wallet_id)
            .map(|e| e.signed_cents())
            .sum()
    }

    pub fn touches(&self, wallet_id: WalletId) -> bool {
        self.entries.iter().any(|e| e.wallet_id == wallet_id)
    }

    /// The entry set that exactly undoes this journal.
    pub fn reversing_entries(&self) -> Vec<JournalEntry> {
        self.entries
            .iter()
            .map(|e| JournalEntry {
                wallet_id: e.wallet_id,
                direction: e.direction.opposite(),
                amount_cents: e.amount_cents,
            })
            .collect()
    }

    /// Create a full reversal of this journal (all entry directions flipped)
    pub fn create_reversal(&self) -> Self {
        Journal::new(JournalKind::Adjustment, self.reversing_entries(), Utc::now())
            .with_reverses(self.id)
            .with_description(format!(
                "Reversal of: {}",
                self.description.as_deref().unwrap_or("(no description)")
            ))
    }
}

/// Structural checks applied to every journal before it is persisted.
/// Does not look at balances or floors, only at the posting itself.
pub fn validate_journal(journal: &Journal) -> Result<(), JournalError> {
    if journal.entries.len() < 2 {
        return Err(JournalError::TooFewEntries {
            count: journal.entries.len(),
        });
    }
    for entry in &journal.entries {
        if entry.amount_cents <= 0 {
            return Err(JournalError::NonPositiveAmount {
                amount_cents: entry.amount_cents,
            });
        }
    }
    let debit_cents = journal.debit_total();
    let credit_cents = journal.credit_total();
    if debit_cents != credit_cents {
        return Err(JournalError::Unbalanced {
            debit_cents,
            credit_cents,
        });
    }
    Ok(())
}

/// Check that the entries fit the journal's kind. `wallet_type` resolves
/// each wallet; returning `None` marks the wallet unknown.
pub fn validate_kind_shape(
    journal: &Journal,
    wallet_type: impl Fn(WalletId) -> Option<WalletType>,
) -> Result<(), JournalError> {
    let mut typed = Vec::with_capacity(journal.entries.len());
    for entry in &journal.entries {
        let wt = wallet_type(entry.wallet_id).ok_or(JournalError::UnknownWallet {
            wallet_id: entry.wallet_id,
        })?;
        typed.push((entry, wt));
    }

    let debits = |t: WalletType| {
        typed
            .iter()
            .filter(|(e, wt)| e.direction == EntryDirection::Debit && *wt == t)
            .count()
    };
    let credits = |t: WalletType| {
        typed
            .iter()
            .filter(|(e, wt)| e.direction == EntryDirection::Credit && *wt == t)
            .count()
    };
    let debit_count = typed
        .iter()
        .filter(|(e, _)| e.direction == EntryDirection::Debit)
        .count();
    let credit_count = typed.len() - debit_count;

    let fail = |reason: &'static str| {
        Err(JournalError::WrongShape {
            kind: journal.kind,
            reason,
        })
    };

    match journal.kind {
        JournalKind::TopUp => {
            if credits(WalletType::Liability) != credit_count {
                return fail("top-ups may only credit liability wallets");
            }
            if debits(WalletType::Asset) + debits(WalletType::Expense) != debit_count {
                return fail("top-ups may only debit asset or expense wallets");
            }
            if debits(WalletType::Asset) == 0 {
                return fail("top-ups must debit the reserve");
            }
            if credit_count == 0 {
                return fail("top-ups must credit a student wallet");
            }
        }
        JournalKind::FlightCharge => {
            if debit_count != 1 || debits(WalletType::Liability) != 1 {
                return fail("flight charges must debit exactly one student wallet");
            }
            if credits(WalletType::Liability) + credits(WalletType::Revenue) != credit_count {
                return fail("flight charges may only credit instructor or revenue wallets");
            }
        }
        JournalKind::Payout => {
            if credit_count != 1 || credits(WalletType::Asset) != 1 {
                return fail("payouts must credit exactly one asset wallet");
            }
            if debits(WalletType::Liability) != debit_count {
                return fail("payouts may only debit liability wallets");
            }
        }
        JournalKind::Refund => {
            if debit_count != 1 || debits(WalletType::Liability) != 1 {
                return fail("refunds must debit exactly one student wallet");
            }
            if credit_count != 1 || credits(WalletType::Asset) != 1 {
                return fail("refunds must credit exactly one asset wallet");
            }
        }
        JournalKind::Opening => {
            if debits(WalletType::Equity) + credits(WalletType::Equity) == 0 {
                return fail("opening journals must touch an equity wallet");
            }
        }
        // Corrections and manual postings mirror whatever they fix.
        JournalKind::Adjustment | JournalKind::Manual => {}
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalError {
    TooFewEntries {
        count: usize,
    },
    NonPositiveAmount {
        amount_cents: Cents,
    },
    Unbalanced {
        debit_cents: Cents,
        credit_cents: Cents,
    },
    UnknownWallet {
        wallet_id: WalletId,
    },
    WrongShape {
        kind: JournalKind,
        reason: &'static str,
    },
}

impl std::fmt::Display for JournalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JournalError::TooFewEntries { count } => {
                write!(f, "journal needs at least 2 entries, got {}", count)
            }
            JournalError::NonPositiveAmount { amount_cents } => {
                write!(f, "entry amounts must be positive, got {}", amount_cents)
            }
            JournalError::Unbalanced {
                debit_cents,
                credit_cents,
            } => write!(
                f,
                "debits ({}) do not equal credits ({})",
                debit_cents, credit_cents
            ),
            JournalError::UnknownWallet { wallet_id } => {
                write!(f, "entry references unknown wallet {}", wallet_id)
            }
            JournalError::WrongShape { kind, reason } => {
                write!(f, "invalid {} journal: {}", kind, reason)
            }
        }
    }
}

impl std::error::Error for JournalError {}
