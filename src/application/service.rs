use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::{
    Cents, ChargeBreakdown, CreditCheck, CreditDecision, CreditPolicy, EntryDirection,
    FEES_WALLET, IntegrityReport, Journal, JournalEntry, JournalError, JournalKind,
    RESERVE_WALLET, REVENUE_WALLET, Wallet, WalletId, WalletType, build_integrity_report,
    evaluate_charge, reported_balance, validate_journal, validate_kind_shape,
};
use crate::storage::Repository;

use super::AppError;

/// Application service providing high-level operations for the ledger.
/// This is the primary interface for any client (CLI, API, TUI, etc.).
pub struct LedgerService {
    repo: Repository,
}

/// One journal entry resolved to its wallet name, for display.
#[derive(Debug)]
pub struct EntryLine {
    pub wallet_name: String,
    pub direction: EntryDirection,
    pub amount_cents: Cents,
}

/// Result of posting a journal
#[derive(Debug)]
pub struct JournalResult {
    pub journal: Journal,
    pub lines: Vec<EntryLine>,
}

/// Result of recording a flight charge
#[derive(Debug)]
pub struct FlightChargeResult {
    pub journal: Journal,
    pub student_name: String,
    pub instructor_name: String,
    pub breakdown: ChargeBreakdown,
    /// Present when the student has a credit limit; carries the tier
    /// even when the charge was forced through a declined check.
    pub check: Option<CreditCheck>,
}

/// Detailed wallet information
pub struct WalletInfo {
    pub wallet: Wallet,
    pub balance: Cents,
    pub debit_count: i64,
    pub credit_count: i64,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Detailed journal information
pub struct JournalInfo {
    pub journal: Journal,
    pub lines: Vec<EntryLine>,
    pub corrections: Vec<Journal>,
}

/// Balance entry for a wallet
pub struct BalanceEntry {
    pub wallet: Wallet,
    pub balance: Cents,
}

/// Filter for querying journals
#[derive(Default)]
pub struct JournalFilter {
    pub wallet: Option<String>,
    pub kind: Option<JournalKind>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// One leg of a journal as named by the caller.
pub struct EntrySpec {
    pub wallet: String,
    pub direction: EntryDirection,
    pub amount_cents: Cents,
}

impl LedgerService {
    /// Create a new ledger service with the given repository.
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    pub(crate) fn repo(&self) -> &Repository {
        &self.repo
    }

    // ========================
    // Wallet operations
    // ========================

    /// Create the platform's own wallets (reserve, revenue, fees,
    /// equity) if they don't exist yet. Returns the ones created.
    pub async fn setup_chart(&self, currency: &str) -> Result<Vec<Wallet>, AppError> {
        let mut created = Vec::new();
        for wallet in [
            Wallet::reserve(currency),
            Wallet::revenue(currency),
            Wallet::processor_fees(currency),
            Wallet::equity(currency),
        ] {
            if self.repo.get_wallet_by_name(&wallet.name).await?.is_none() {
                self.repo.save_wallet(&wallet).await?;
                created.push(wallet);
            }
        }
        Ok(created)
    }

    /// Create a new wallet. `credit_limit` of `None` keeps the default
    /// floor for the wallet type.
    pub async fn create_wallet(
        &self,
        name: String,
        wallet_type: WalletType,
        currency: String,
        credit_limit: Option<Cents>,
        description: Option<String>,
    ) -> Result<Wallet, AppError> {
        // Check if wallet already exists
        if self.repo.get_wallet_by_name(&name).await?.is_some() {
            return Err(AppError::WalletAlreadyExists(name));
        }

        let mut wallet = Wallet::new(name, wallet_type, currency);
        if let Some(limit) = credit_limit {
            if limit < 0 {
                return Err(AppError::InvalidAmount(
                    "Credit limit cannot be negative".to_string(),
                ));
            }
            wallet = wallet.with_credit_limit(limit);
        }
        if let Some(desc) = description {
            wallet = wallet.with_description(desc);
        }

        self.repo.save_wallet(&wallet).await?;
        Ok(wallet)
    }

    /// Enroll a student: a liability wallet with an optional credit line.
    pub async fn enroll_student(
        &self,
        name: String,
        currency: String,
        credit_limit: Option<Cents>,
        description: Option<String>,
    ) -> Result<Wallet, AppError> {
        if self.repo.get_wallet_by_name(&name).await?.is_some() {
            return Err(AppError::WalletAlreadyExists(name));
        }
        if credit_limit.is_some_and(|limit| limit < 0) {
            return Err(AppError::InvalidAmount(
                "Credit limit cannot be negative".to_string(),
            ));
        }

        let mut wallet = Wallet::student(name, currency);
        if let Some(limit) = credit_limit {
            wallet = wallet.with_credit_limit(limit);
        }
        if let Some(desc) = description {
            wallet = wallet.with_description(desc);
        }

        self.repo.save_wallet(&wallet).await?;
        Ok(wallet)
    }

    /// Hire an instructor: a liability wallet with no floor.
    pub async fn hire_instructor(
        &self,
        name: String,
        currency: String,
        description: Option<String>,
    ) -> Result<Wallet, AppError> {
        if self.repo.get_wallet_by_name(&name).await?.is_some() {
            return Err(AppError::WalletAlreadyExists(name));
        }

        let mut wallet = Wallet::instructor(name, currency);
        if let Some(desc) = description {
            wallet = wallet.with_description(desc);
        }

        self.repo.save_wallet(&wallet).await?;
        Ok(wallet)
    }

    /// Get a wallet by name.
    pub async fn get_wallet(&self, name: &str) -> Result<Wallet, AppError> {
        self.repo
            .get_wallet_by_name(name)
            .await?
            .ok_or_else(|| AppError::WalletNotFound(name.to_string()))
    }

    /// Get a wallet by ID.
    pub async fn get_wallet_by_id(&self, id: WalletId) -> Result<Wallet, AppError> {
        self.repo
            .get_wallet(id)
            .await?
            .ok_or_else(|| AppError::WalletNotFound(id.to_string()))
    }

    /// Get detailed wallet information.
    pub async fn get_wallet_info(&self, name: &str) -> Result<WalletInfo, AppError> {
        let wallet = self.get_wallet(name).await?;
        let balance = self.reported_balance_of(&wallet).await?;
        let (debit_count, credit_count) = self.repo.count_entries_for_wallet(wallet.id).await?;
        let last_activity = self.repo.get_last_activity(wallet.id).await?;

        Ok(WalletInfo {
            wallet,
            balance,
            debit_count,
            credit_count,
            last_activity,
        })
    }

    /// List all wallets.
    pub async fn list_wallets(&self, include_archived: bool) -> Result<Vec<Wallet>, AppError> {
        Ok(self.repo.list_wallets(include_archived).await?)
    }

    /// Archive a wallet. Archived wallets refuse new postings but keep
    /// their history and any remaining balance.
    pub async fn archive_wallet(&self, name: &str) -> Result<Wallet, AppError> {
        let mut wallet = self.get_wallet(name).await?;
        self.repo.archive_wallet(wallet.id).await?;
        wallet.archived_at = Some(Utc::now());
        Ok(wallet)
    }

    /// Change a wallet's credit limit. `None` removes the floor.
    pub async fn set_credit_limit(
        &self,
        name: &str,
        limit: Option<Cents>,
    ) -> Result<Wallet, AppError> {
        if limit.is_some_and(|l| l < 0) {
            return Err(AppError::InvalidAmount(
                "Credit limit cannot be negative".to_string(),
            ));
        }
        let mut wallet = self.get_wallet(name).await?;
        self.repo.update_credit_limit(wallet.id, limit).await?;
        wallet.credit_limit_cents = limit;
        Ok(wallet)
    }

    /// Get balance for a single wallet, on its normal side.
    pub async fn get_balance(&self, name: &str) -> Result<BalanceEntry, AppError> {
        let wallet = self.get_wallet(name).await?;
        let balance = self.reported_balance_of(&wallet).await?;
        Ok(BalanceEntry { wallet, balance })
    }

    /// Get balances for all wallets.
    pub async fn get_all_balances(&self) -> Result<Vec<BalanceEntry>, AppError> {
        let wallets = self.repo.list_wallets(false).await?;
        let raw_balances = self.repo.compute_all_raw_balances().await?;

        Ok(wallets
            .into_iter()
            .map(|wallet| {
                let raw = raw_balances.get(&wallet.id).copied().unwrap_or(0);
                let balance = reported_balance(wallet.wallet_type, raw);
                BalanceEntry { wallet, balance }
            })
            .collect())
    }

    pub(crate) async fn reported_balance_of(&self, wallet: &Wallet) -> Result<Cents, AppError> {
        let raw = self.repo.compute_raw_balance(wallet.id).await?;
        Ok(reported_balance(wallet.wallet_type, raw))
    }

    // ========================
    // Journal posting
    // ========================

    /// Post a journal from caller-named entries. This is the generic
    /// path behind the typed flows; it enforces every posting rule but
    /// knows nothing about lessons or payouts.
    pub async fn post_journal(
        &self,
        kind: JournalKind,
        specs: Vec<EntrySpec>,
        effective_at: DateTime<Utc>,
        description: Option<String>,
        reference: Option<String>,
        force: bool,
    ) -> Result<JournalResult, AppError> {
        let mut entries = Vec::with_capacity(specs.len());
        let mut wallets = HashMap::new();
        for spec in &specs {
            if spec.amount_cents <= 0 {
                return Err(AppError::InvalidAmount(
                    "Entry amounts must be positive".to_string(),
                ));
            }
            let wallet = self.get_wallet(&spec.wallet).await?;
            entries.push(JournalEntry {
                wallet_id: wallet.id,
                direction: spec.direction,
                amount_cents: spec.amount_cents,
            });
            wallets.insert(wallet.id, wallet);
        }

        let mut journal = Journal::new(kind, entries, effective_at);
        if let Some(desc) = description {
            journal = journal.with_description(desc);
        }
        if let Some(r) = reference {
            journal = journal.with_reference(r);
        }

        let journal = self.post_validated(journal, &wallets, force).await?;
        let lines = Self::entry_lines(&journal, &wallets);
        Ok(JournalResult { journal, lines })
    }

    /// Record a student top-up: the card payment lands in the reserve,
    /// minus the processor's cut, and the student gains flight credit
    /// for the full amount.
    pub async fn record_top_up(
        &self,
        student_name: &str,
        amount_cents: Cents,
        fee_cents: Cents,
        effective_at: DateTime<Utc>,
        description: Option<String>,
        reference: Option<String>,
    ) -> Result<JournalResult, AppError> {
        if amount_cents <= 0 {
            return Err(AppError::InvalidAmount(
                "Top-up amount must be positive".to_string(),
            ));
        }
        if fee_cents < 0 || fee_cents >= amount_cents {
            return Err(AppError::InvalidAmount(
                "Fee must be non-negative and smaller than the amount".to_string(),
            ));
        }

        let student = self.get_wallet(student_name).await?;
        let reserve = self.get_wallet(RESERVE_WALLET).await?;
        let student_id = student.id;
        let reserve_id = reserve.id;

        let mut entries = vec![JournalEntry::debit(reserve_id, amount_cents - fee_cents)];
        let mut wallets = HashMap::from([(student_id, student), (reserve_id, reserve)]);
        if fee_cents > 0 {
            let fees = self.get_wallet(FEES_WALLET).await?;
            entries.push(JournalEntry::debit(fees.id, fee_cents));
            wallets.insert(fees.id, fees);
        }
        entries.push(JournalEntry::credit(student_id, amount_cents));

        let mut journal = Journal::new(JournalKind::TopUp, entries, effective_at);
        if let Some(desc) = description {
            journal = journal.with_description(desc);
        }
        if let Some(r) = reference {
            journal = journal.with_reference(r);
        }

        let journal = self.post_validated(journal, &wallets, false).await?;
        let lines = Self::entry_lines(&journal, &wallets);
        Ok(JournalResult { journal, lines })
    }

    /// Record a flown lesson. The student pays the whole charge, split
    /// between the instructor's share and the school's cut. The charge
    /// is gated by the student's credit limit unless forced.
    pub async fn record_flight_charge(
        &self,
        student_name: &str,
        instructor_name: &str,
        instructor_cents: Cents,
        revenue_cents: Cents,
        effective_at: DateTime<Utc>,
        description: Option<String>,
        reference: Option<String>,
        policy: &CreditPolicy,
        force: bool,
    ) -> Result<FlightChargeResult, AppError> {
        if instructor_cents < 0 || revenue_cents < 0 {
            return Err(AppError::InvalidAmount(
                "Leg amounts cannot be negative".to_string(),
            ));
        }
        let total_cents = instructor_cents + revenue_cents;
        if total_cents <= 0 {
            return Err(AppError::InvalidAmount(
                "Charge must be positive".to_string(),
            ));
        }

        let student = self.get_wallet(student_name).await?;
        let instructor = self.get_wallet(instructor_name).await?;
        let revenue_wallet = self.get_wallet(REVENUE_WALLET).await?;

        // Credit gate, skipped for students without a limit
        let mut check = None;
        if let Some(limit) = student.credit_limit_cents {
            let balance = self.reported_balance_of(&student).await?;
            let evaluated = evaluate_charge(balance, limit, total_cents, policy);
            if let CreditDecision::Declined { shortfall_cents } = evaluated.decision {
                if !force {
                    return Err(AppError::CreditLimitExceeded {
                        wallet_name: student.name.clone(),
                        balance_cents: balance,
                        limit_cents: limit,
                        requested_cents: total_cents,
                        shortfall_cents,
                    });
                }
            }
            check = Some(evaluated);
        }

        let mut entries = vec![JournalEntry::debit(student.id, total_cents)];
        if instructor_cents > 0 {
            entries.push(JournalEntry::credit(instructor.id, instructor_cents));
        }
        if revenue_cents > 0 {
            entries.push(JournalEntry::credit(revenue_wallet.id, revenue_cents));
        }

        let mut journal = Journal::new(JournalKind::FlightCharge, entries, effective_at);
        if let Some(desc) = description {
            journal = journal.with_description(desc);
        }
        if let Some(r) = reference {
            journal = journal.with_reference(r);
        }

        let student_name = student.name.clone();
        let instructor_name = instructor.name.clone();
        let wallets = HashMap::from([
            (student.id, student),
            (instructor.id, instructor),
            (revenue_wallet.id, revenue_wallet),
        ]);
        let journal = self.post_validated(journal, &wallets, force).await?;

        Ok(FlightChargeResult {
            journal,
            student_name,
            instructor_name,
            breakdown: ChargeBreakdown::new(instructor_cents, revenue_cents),
            check,
        })
    }

    /// Pay an instructor their accrued earnings out of the reserve.
    /// Capped at the payable balance unless forced.
    pub async fn record_instructor_payout(
        &self,
        instructor_name: &str,
        amount_cents: Cents,
        effective_at: DateTime<Utc>,
        description: Option<String>,
        reference: Option<String>,
        force: bool,
    ) -> Result<JournalResult, AppError> {
        if amount_cents <= 0 {
            return Err(AppError::InvalidAmount(
                "Payout amount must be positive".to_string(),
            ));
        }

        let instructor = self.get_wallet(instructor_name).await?;
        let reserve = self.get_wallet(RESERVE_WALLET).await?;

        let balance = self.reported_balance_of(&instructor).await?;
        if amount_cents > balance && !force {
            return Err(AppError::PayoutExceedsBalance {
                wallet_name: instructor.name.clone(),
                balance_cents: balance,
                requested_cents: amount_cents,
            });
        }

        let entries = vec![
            JournalEntry::debit(instructor.id, amount_cents),
            JournalEntry::credit(reserve.id, amount_cents),
        ];
        let mut journal = Journal::new(JournalKind::Payout, entries, effective_at);
        if let Some(desc) = description {
            journal = journal.with_description(desc);
        }
        if let Some(r) = reference {
            journal = journal.with_reference(r);
        }

        let wallets = HashMap::from([(instructor.id, instructor), (reserve.id, reserve)]);
        let journal = self.post_validated(journal, &wallets, force).await?;
        let lines = Self::entry_lines(&journal, &wallets);
        Ok(JournalResult { journal, lines })
    }

    /// Refund unused flight credit back to the student's card. Capped
    /// at the credit actually held, never at the credit line.
    pub async fn record_refund(
        &self,
        student_name: &str,
        amount_cents: Cents,
        effective_at: DateTime<Utc>,
        description: Option<String>,
        reference: Option<String>,
        force: bool,
    ) -> Result<JournalResult, AppError> {
        if amount_cents <= 0 {
            return Err(AppError::InvalidAmount(
                "Refund amount must be positive".to_string(),
            ));
        }

        let student = self.get_wallet(student_name).await?;
        let reserve = self.get_wallet(RESERVE_WALLET).await?;

        let balance = self.reported_balance_of(&student).await?;
        if amount_cents > balance.max(0) && !force {
            return Err(AppError::RefundExceedsCredit {
                wallet_name: student.name.clone(),
                balance_cents: balance,
                requested_cents: amount_cents,
            });
        }

        let entries = vec![
            JournalEntry::debit(student.id, amount_cents),
            JournalEntry::credit(reserve.id, amount_cents),
        ];
        let mut journal = Journal::new(JournalKind::Refund, entries, effective_at);
        if let Some(desc) = description {
            journal = journal.with_description(desc);
        }
        if let Some(r) = reference {
            journal = journal.with_reference(r);
        }

        let wallets = HashMap::from([(student.id, student), (reserve.id, reserve)]);
        let journal = self.post_validated(journal, &wallets, force).await?;
        let lines = Self::entry_lines(&journal, &wallets);
        Ok(JournalResult { journal, lines })
    }

    /// Validate a journal against every posting rule, then persist it.
    /// Floors are skipped when forced or when the kind bypasses them.
    pub(crate) async fn post_validated(
        &self,
        mut journal: Journal,
        wallets: &HashMap<WalletId, Wallet>,
        force: bool,
    ) -> Result<Journal, AppError> {
        validate_journal(&journal)?;

        // Resolve every entry's wallet up front
        let mut resolved = Vec::with_capacity(journal.entries.len());
        for entry in &journal.entries {
            let wallet =
                wallets
                    .get(&entry.wallet_id)
                    .ok_or(JournalError::UnknownWallet {
                        wallet_id: entry.wallet_id,
                    })?;
            resolved.push(wallet);
        }

        for wallet in &resolved {
            if wallet.is_archived() {
                return Err(AppError::WalletArchived(wallet.name.clone()));
            }
        }

        // All legs must share one currency
        if let Some(first) = resolved.first() {
            for wallet in &resolved {
                if wallet.currency != first.currency {
                    return Err(AppError::CurrencyMismatch {
                        expected: first.currency.clone(),
                        found: wallet.currency.clone(),
                    });
                }
            }
        }

        validate_kind_shape(&journal, |id| wallets.get(&id).map(|w| w.wallet_type))?;

        // Idempotency: one reference, one posting
        if let Some(ref reference) = journal.reference {
            if let Some(existing) = self.repo.get_journal_by_reference(reference).await? {
                return Err(AppError::DuplicateReference {
                    reference: reference.clone(),
                    journal_id: existing.id.to_string(),
                });
            }
        }

        if !force && !journal.kind.bypasses_floor() {
            for wallet in wallets.values() {
                if !journal.touches(wallet.id) {
                    continue;
                }
                let Some(floor) = wallet.floor_cents() else {
                    continue;
                };
                let delta =
                    journal.raw_effect_on(wallet.id) * wallet.wallet_type.balance_sign();
                if delta >= 0 {
                    continue;
                }
                let balance = self.reported_balance_of(wallet).await?;
                if balance + delta < floor {
                    return Err(AppError::FloorViolated {
                        wallet_name: wallet.name.clone(),
                        balance_cents: balance,
                        floor_cents: floor,
                    });
                }
            }
        }

        self.repo.save_journal(&mut journal).await?;
        Ok(journal)
    }

    pub(crate) fn entry_lines(
        journal: &Journal,
        wallets: &HashMap<WalletId, Wallet>,
    ) -> Vec<EntryLine> {
        journal
            .entries
            .iter()
            .map(|entry| EntryLine {
                wallet_name: wallets
                    .get(&entry.wallet_id)
                    .map(|w| w.name.clone())
                    .unwrap_or_else(|| entry.wallet_id.to_string()),
                direction: entry.direction,
                amount_cents: entry.amount_cents,
            })
            .collect()
    }

    // ========================
    // Journal queries
    // ========================

    /// Find a journal by UUID or by external reference.
    pub async fn find_journal(&self, selector: &str) -> Result<Journal, AppError> {
        if let Ok(id) = Uuid::parse_str(selector) {
            if let Some(journal) = self.repo.get_journal(id).await? {
                return Ok(journal);
            }
        }
        self.repo
            .get_journal_by_reference(selector)
            .await?
            .ok_or_else(|| AppError::JournalNotFound(selector.to_string()))
    }

    /// Get detailed journal information, entry names resolved.
    pub async fn get_journal_info(&self, selector: &str) -> Result<JournalInfo, AppError> {
        let journal = self.find_journal(selector).await?;
        let names = self.get_wallet_names().await?;
        let lines = journal
            .entries
            .iter()
            .map(|entry| EntryLine {
                wallet_name: names
                    .get(&entry.wallet_id)
                    .cloned()
                    .unwrap_or_else(|| entry.wallet_id.to_string()),
                direction: entry.direction,
                amount_cents: entry.amount_cents,
            })
            .collect();
        let corrections = self.repo.corrections_for_journal(journal.id).await?;

        Ok(JournalInfo {
            journal,
            lines,
            corrections,
        })
    }

    /// Every journal in posting order, for exports and audits.
    pub async fn list_all_journals(&self) -> Result<Vec<Journal>, AppError> {
        Ok(self.repo.list_journals().await?)
    }

    /// List journals with filters, newest first.
    pub async fn list_journals(&self, filter: JournalFilter) -> Result<Vec<Journal>, AppError> {
        // Resolve wallet name to ID if provided
        let wallet_id = if let Some(name) = &filter.wallet {
            Some(self.get_wallet(name).await?.id)
        } else {
            None
        };

        Ok(self
            .repo
            .list_journals_filtered(
                wallet_id,
                filter.kind,
                filter.from_date,
                filter.to_date,
                filter.limit,
            )
            .await?)
    }

    // ========================
    // Integrity operations
    // ========================

    /// Check ledger integrity and return a report.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let counts = self.repo.get_integrity_counts().await?;
        let wallets = self.repo.list_wallets(true).await?;
        let raw_balances = self.repo.compute_all_raw_balances().await?;

        let balances = wallets
            .iter()
            .map(|w| {
                let raw = raw_balances.get(&w.id).copied().unwrap_or(0);
                (w.id, reported_balance(w.wallet_type, raw))
            })
            .collect();

        Ok(build_integrity_report(counts, &wallets, &balances))
    }

    /// Get a map of wallet IDs to names (useful for display).
    pub async fn get_wallet_names(&self) -> Result<HashMap<WalletId, String>, AppError> {
        let wallets = self.repo.list_wallets(true).await?;
        Ok(wallets.into_iter().map(|w| (w.id, w.name)).collect())
    }
}
