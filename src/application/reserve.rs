use chrono::Utc;

use crate::domain::{
    Cents, CoverageReport, ProcessorBalance, RESERVE_WALLET, ReservePolicy, ReserveSnapshot,
    ReserveStatus, WalletType, format_cents, format_cents_signed, reconcile, reported_balance,
};

use super::AppError;
use super::service::LedgerService;

// ========================
// Reserve reconciliation
// ========================

impl LedgerService {
    /// Reserve balance according to the books, i.e. the cash the ledger
    /// claims the school holds at the payment processor.
    pub async fn reserve_balance(&self) -> Result<Cents, AppError> {
        let reserve = self.get_wallet(RESERVE_WALLET).await?;
        self.reported_balance_of(&reserve).await
    }

    /// Compare the ledger reserve against a processor report, persist
    /// the outcome as a snapshot and return it.
    pub async fn reconcile_reserve(
        &self,
        processor: &ProcessorBalance,
        policy: &ReservePolicy,
    ) -> Result<ReserveSnapshot, AppError> {
        let ledger_cents = self.reserve_balance().await?;
        let snapshot = reconcile(ledger_cents, processor, policy, Utc::now());
        self.repo().save_snapshot(&snapshot).await?;
        Ok(snapshot)
    }

    /// Past reconciliation runs, newest first.
    pub async fn reserve_history(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<ReserveSnapshot>, AppError> {
        Ok(self.repo().list_snapshots(limit).await?)
    }

    pub async fn latest_snapshot(&self) -> Result<ReserveSnapshot, AppError> {
        self.repo()
            .latest_snapshot()
            .await?
            .ok_or(AppError::NoSnapshots)
    }

    /// Reserve measured against what the school owes: student credit
    /// plus unpaid instructor earnings. A student flying on a credit
    /// line owes the school, and that receivable is not cash, so only
    /// positive liability balances count as obligations. Archived
    /// wallets are included; money owed does not vanish on archive.
    pub async fn coverage_report(&self) -> Result<CoverageReport, AppError> {
        let reserve_cents = self.reserve_balance().await?;
        let wallets = self.repo().list_wallets(true).await?;
        let raw_balances = self.repo().compute_all_raw_balances().await?;

        let mut obligations_cents = 0;
        for wallet in &wallets {
            if wallet.wallet_type != WalletType::Liability {
                continue;
            }
            let raw = raw_balances.get(&wallet.id).copied().unwrap_or(0);
            let balance = reported_balance(wallet.wallet_type, raw);
            if balance > 0 {
                obligations_cents += balance;
            }
        }

        Ok(CoverageReport::new(reserve_cents, obligations_cents))
    }
}

/// Log one reconciliation outcome. The watch loop calls this on every
/// poll so drift shows up in the monitor's output as it develops.
pub fn emit_snapshot_alert(snapshot: &ReserveSnapshot) {
    match snapshot.status {
        ReserveStatus::InBalance => {
            tracing::info!(
                ledger = %format_cents(snapshot.ledger_cents),
                drift = %format_cents_signed(snapshot.drift_cents),
                "Reserve in balance"
            );
        }
        ReserveStatus::Surplus => {
            tracing::warn!(
                ledger = %format_cents(snapshot.ledger_cents),
                drift = %format_cents_signed(snapshot.drift_cents),
                "Processor holds more than the ledger accounts for"
            );
        }
        ReserveStatus::Shortfall => {
            tracing::warn!(
                ledger = %format_cents(snapshot.ledger_cents),
                drift = %format_cents_signed(snapshot.drift_cents),
                "Reserve shortfall"
            );
        }
        ReserveStatus::Critical => {
            tracing::error!(
                ledger = %format_cents(snapshot.ledger_cents),
                drift = %format_cents_signed(snapshot.drift_cents),
                "Critical reserve shortfall, student funds may be at risk"
            );
        }
    }
}
