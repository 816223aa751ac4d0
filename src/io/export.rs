use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::application::LedgerService;
use crate::domain::{FlightAdjustment, Journal, ReserveSnapshot, Wallet};

/// Database snapshot for full export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub wallets: Vec<Wallet>,
    pub journals: Vec<Journal>,
    pub adjustments: Vec<FlightAdjustment>,
    pub reserve_snapshots: Vec<ReserveSnapshot>,
}

/// Exporter for converting ledger data to various formats
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Export journals to CSV format, one row per entry so the file
    /// stays flat while keeping every leg of every journal.
    pub async fn export_journals_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let journals = self.service.list_all_journals().await?;
        let wallet_names = self.service.get_wallet_names().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        // Write header
        csv_writer.write_record([
            "journal_id",
            "sequence",
            "effective_at",
            "kind",
            "wallet",
            "direction",
            "amount_cents",
            "description",
            "reference",
            "reverses",
        ])?;

        let mut count = 0;
        for journal in &journals {
            for entry in &journal.entries {
                let wallet = wallet_names
                    .get(&entry.wallet_id)
                    .cloned()
                    .unwrap_or_else(|| entry.wallet_id.to_string());

                csv_writer.write_record([
                    journal.id.to_string(),
                    journal.sequence.to_string(),
                    journal.effective_at.to_rfc3339(),
                    journal.kind.as_str().to_string(),
                    wallet,
                    entry.direction.as_str().to_string(),
                    entry.amount_cents.to_string(),
                    journal.description.clone().unwrap_or_default(),
                    journal.reference.clone().unwrap_or_default(),
                    journal.reverses.map(|id| id.to_string()).unwrap_or_default(),
                ])?;
                count += 1;
            }
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export balances to CSV format
    pub async fn export_balances_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let balances = self.service.get_all_balances().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        // Write header
        csv_writer.write_record([
            "wallet",
            "type",
            "currency",
            "credit_limit_cents",
            "balance_cents",
        ])?;

        let mut count = 0;
        for entry in &balances {
            csv_writer.write_record([
                entry.wallet.name.clone(),
                entry.wallet.wallet_type.as_str().to_string(),
                entry.wallet.currency.clone(),
                entry
                    .wallet
                    .credit_limit_cents
                    .map(|l| l.to_string())
                    .unwrap_or_default(),
                entry.balance.to_string(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export flight adjustments to CSV format
    pub async fn export_adjustments_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let adjustments = self.service.list_adjustments(None).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        // Write header
        csv_writer.write_record([
            "id",
            "original_journal",
            "adjustment_journal",
            "student_delta_cents",
            "instructor_delta_cents",
            "revenue_delta_cents",
            "reason",
            "created_at",
        ])?;

        let mut count = 0;
        for adj in &adjustments {
            csv_writer.write_record([
                adj.id.to_string(),
                adj.original_journal.to_string(),
                adj.adjustment_journal.to_string(),
                adj.delta.student_delta_cents.to_string(),
                adj.delta.instructor_delta_cents.to_string(),
                adj.delta.revenue_delta_cents.to_string(),
                adj.reason.clone().unwrap_or_default(),
                adj.created_at.to_rfc3339(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export reserve snapshots to CSV format
    pub async fn export_snapshots_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let snapshots = self.service.reserve_history(None).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        // Write header
        csv_writer.write_record([
            "id",
            "checked_at",
            "ledger_cents",
            "processor_available_cents",
            "processor_pending_cents",
            "drift_cents",
            "status",
        ])?;

        let mut count = 0;
        for snapshot in &snapshots {
            csv_writer.write_record([
                snapshot.id.to_string(),
                snapshot.checked_at.to_rfc3339(),
                snapshot.ledger_cents.to_string(),
                snapshot.processor_available_cents.to_string(),
                snapshot.processor_pending_cents.to_string(),
                snapshot.drift_cents.to_string(),
                snapshot.status.as_str().to_string(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export full database as JSON snapshot
    pub async fn export_full_json<W: Write>(&self, mut writer: W) -> Result<DatabaseSnapshot> {
        let wallets = self.service.list_wallets(true).await?;
        let journals = self.service.list_all_journals().await?;
        let adjustments = self.service.list_adjustments(None).await?;
        let reserve_snapshots = self.service.reserve_history(None).await?;

        let snapshot = DatabaseSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            wallets,
            journals,
            adjustments,
            reserve_snapshots,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }
}
