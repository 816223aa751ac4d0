use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    AdjustmentDelta, Cents, FlightAdjustment, IntegrityCounts, Journal, JournalEntry, JournalId,
    JournalKind, ReserveSnapshot, ReserveStatus, UnbalancedJournal, Wallet, WalletId, WalletType,
};

use super::{MIGRATION_001_INITIAL, MIGRATION_002_ADJUSTMENTS, MIGRATION_003_RESERVE};

/// Repository for persisting and querying the ledger.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given path.
    /// Creates the database file if it doesn't exist.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;

        sqlx::query(MIGRATION_002_ADJUSTMENTS)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 002")?;

        sqlx::query(MIGRATION_003_RESERVE)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 003")?;

        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // Wallet operations
    // ========================

    /// Save a new wallet to the database.
    pub async fn save_wallet(&self, wallet: &Wallet) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO wallets (id, name, wallet_type, currency, credit_limit_cents, description, created_at, archived_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(wallet.id.to_string())
        .bind(&wallet.name)
        .bind(wallet.wallet_type.as_str())
        .bind(&wallet.currency)
        .bind(wallet.credit_limit_cents)
        .bind(&wallet.description)
        .bind(wallet.created_at.to_rfc3339())
        .bind(wallet.archived_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await
        .context("Failed to save wallet")?;
        Ok(())
    }

    /// Get a wallet by ID.
    pub async fn get_wallet(&self, id: WalletId) -> Result<Option<Wallet>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, wallet_type, currency, credit_limit_cents, description, created_at, archived_at
            FROM wallets
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch wallet")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_wallet(&row)?)),
            None => Ok(None),
        }
    }

    /// Get a wallet by name.
    pub async fn get_wallet_by_name(&self, name: &str) -> Result<Option<Wallet>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, wallet_type, currency, credit_limit_cents, description, created_at, archived_at
            FROM wallets
            WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch wallet by name")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_wallet(&row)?)),
            None => Ok(None),
        }
    }

    /// List all wallets (optionally including archived).
    pub async fn list_wallets(&self, include_archived: bool) -> Result<Vec<Wallet>> {
        let query = if include_archived {
            "SELECT id, name, wallet_type, currency, credit_limit_cents, description, created_at, archived_at FROM wallets ORDER BY name"
        } else {
            "SELECT id, name, wallet_type, currency, credit_limit_cents, description, created_at, archived_at FROM wallets WHERE archived_at IS NULL ORDER BY name"
        };

        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list wallets")?;

        rows.iter().map(Self::row_to_wallet).collect()
    }

    /// Archive a wallet (soft delete).
    pub async fn archive_wallet(&self, id: WalletId) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE wallets SET archived_at = ? WHERE id = ?")
            .bind(&now)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to archive wallet")?;
        Ok(())
    }

    /// Change a wallet's credit limit. `None` removes the floor entirely.
    pub async fn update_credit_limit(&self, id: WalletId, limit: Option<Cents>) -> Result<()> {
        sqlx::query("UPDATE wallets SET credit_limit_cents = ? WHERE id = ?")
            .bind(limit)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to update credit limit")?;
        Ok(())
    }

    fn row_to_wallet(row: &sqlx::sqlite::SqliteRow) -> Result<Wallet> {
        let id_str: String = row.get("id");
        let wallet_type_str: String = row.get("wallet_type");
        let created_at_str: String = row.get("created_at");
        let archived_at_str: Option<String> = row.get("archived_at");

        Ok(Wallet {
            id: Uuid::parse_str(&id_str).context("Invalid wallet ID")?,
            name: row.get("name"),
            wallet_type: WalletType::from_str(&wallet_type_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid wallet type: {}", wallet_type_str))?,
            currency: row.get("currency"),
            credit_limit_cents: row.get("credit_limit_cents"),
            description: row.get("description"),
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .context("Invalid created_at timestamp")?
                .with_timezone(&Utc),
            archived_at: archived_at_str
                .map(|s| DateTime::parse_from_rfc3339(&s))
                .transpose()
                .context("Invalid archived_at timestamp")?
                .map(|dt| dt.with_timezone(&Utc)),
        })
    }

    // ========================
    // Journal operations
    // ========================

    /// Save a journal and its entries atomically.
    /// Assigns the next sequence number inside the same transaction, so
    /// committed journals never leave gaps.
    pub async fn save_journal(&self, journal: &mut Journal) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let row = sqlx::query(
            r#"
            UPDATE sequence_counter
            SET value = value + 1
            WHERE name = 'journal_sequence'
            RETURNING value
            "#,
        )
        .fetch_one(&mut *tx)
        .await
        .context("Failed to get next sequence number")?;
        journal.sequence = row.get("value");

        sqlx::query(
            r#"
            INSERT INTO journals (id, sequence, kind, effective_at, posted_at, description, reference, reverses)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(journal.id.to_string())
        .bind(journal.sequence)
        .bind(journal.kind.as_str())
        .bind(journal.effective_at.to_rfc3339())
        .bind(journal.posted_at.to_rfc3339())
        .bind(&journal.description)
        .bind(&journal.reference)
        .bind(journal.reverses.map(|id| id.to_string()))
        .execute(&mut *tx)
        .await
        .context("Failed to save journal")?;

        for (position, entry) in journal.entries.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO journal_entries (journal_id, position, wallet_id, direction, amount_cents)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(journal.id.to_string())
            .bind(position as i64)
            .bind(entry.wallet_id.to_string())
            .bind(entry.direction.as_str())
            .bind(entry.amount_cents)
            .execute(&mut *tx)
            .await
            .context("Failed to save journal entry")?;
        }

        tx.commit().await.context("Failed to commit journal")?;
        Ok(())
    }

    /// Get a journal by ID, with its entries.
    pub async fn get_journal(&self, id: JournalId) -> Result<Option<Journal>> {
        let row = sqlx::query(
            r#"
            SELECT id, sequence, kind, effective_at, posted_at, description, reference, reverses
            FROM journals
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch journal")?;

        match row {
            Some(row) => {
                let mut journal = Self::row_to_journal(&row)?;
                journal.entries = self.entries_for_journal(journal.id).await?;
                Ok(Some(journal))
            }
            None => Ok(None),
        }
    }

    /// Get a journal by its external reference.
    pub async fn get_journal_by_reference(&self, reference: &str) -> Result<Option<Journal>> {
        let row = sqlx::query(
            r#"
            SELECT id, sequence, kind, effective_at, posted_at, description, reference, reverses
            FROM journals
            WHERE reference = ?
            "#,
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch journal by reference")?;

        match row {
            Some(row) => {
                let mut journal = Self::row_to_journal(&row)?;
                journal.entries = self.entries_for_journal(journal.id).await?;
                Ok(Some(journal))
            }
            None => Ok(None),
        }
    }

    /// List all journals ordered by sequence, entries included.
    /// Entries are fetched in one query and grouped in memory.
    pub async fn list_journals(&self) -> Result<Vec<Journal>> {
        let rows = sqlx::query(
            r#"
            SELECT id, sequence, kind, effective_at, posted_at, description, reference, reverses
            FROM journals
            ORDER BY sequence
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list journals")?;

        let entry_rows = sqlx::query(
            r#"
            SELECT journal_id, wallet_id, direction, amount_cents
            FROM journal_entries
            ORDER BY journal_id, position
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list journal entries")?;

        let mut entries_by_journal: HashMap<String, Vec<JournalEntry>> = HashMap::new();
        for row in &entry_rows {
            let journal_id: String = row.get("journal_id");
            entries_by_journal
                .entry(journal_id)
                .or_default()
                .push(Self::row_to_entry(row)?);
        }

        let mut journals = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut journal = Self::row_to_journal(row)?;
            journal.entries = entries_by_journal
                .remove(&journal.id.to_string())
                .unwrap_or_default();
            journals.push(journal);
        }
        Ok(journals)
    }

    /// List journals with optional filters.
    pub async fn list_journals_filtered(
        &self,
        wallet_id: Option<WalletId>,
        kind: Option<JournalKind>,
        from_date: Option<DateTime<Utc>>,
        to_date: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<Journal>> {
        // Build query dynamically based on filters
        let mut query = String::from(
            "SELECT id, sequence, kind, effective_at, posted_at, description, reference, reverses FROM journals WHERE 1=1",
        );

        // Collect all string bindings first so they live long enough
        let wallet_id_str = wallet_id.map(|id| id.to_string());
        let from_date_str = from_date.map(|dt| dt.to_rfc3339());
        let to_date_str = to_date.map(|dt| dt.to_rfc3339());

        if wallet_id.is_some() {
            query.push_str(
                " AND EXISTS (SELECT 1 FROM journal_entries e WHERE e.journal_id = journals.id AND e.wallet_id = ?)",
            );
        }
        if kind.is_some() {
            query.push_str(" AND kind = ?");
        }
        if from_date.is_some() {
            query.push_str(" AND effective_at >= ?");
        }
        if to_date.is_some() {
            query.push_str(" AND effective_at <= ?");
        }

        // Newest first so a limit keeps the most recent journals
        query.push_str(" ORDER BY sequence DESC");

        if let Some(lim) = limit {
            query.push_str(&format!(" LIMIT {}", lim));
        }

        let mut sql_query = sqlx::query(&query);

        if let Some(ref wid_str) = wallet_id_str {
            sql_query = sql_query.bind(wid_str);
        }
        if let Some(k) = kind {
            sql_query = sql_query.bind(k.as_str());
        }
        if let Some(ref fd_str) = from_date_str {
            sql_query = sql_query.bind(fd_str);
        }
        if let Some(ref td_str) = to_date_str {
            sql_query = sql_query.bind(td_str);
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list filtered journals")?;

        let mut journals = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut journal = Self::row_to_journal(row)?;
            journal.entries = self.entries_for_journal(journal.id).await?;
            journals.push(journal);
        }
        Ok(journals)
    }

    /// All journals that correct a given journal.
    pub async fn corrections_for_journal(&self, journal_id: JournalId) -> Result<Vec<Journal>> {
        let rows = sqlx::query(
            r#"
            SELECT id, sequence, kind, effective_at, posted_at, description, reference, reverses
            FROM journals
            WHERE reverses = ?
            ORDER BY sequence
            "#,
        )
        .bind(journal_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch corrections")?;

        let mut journals = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut journal = Self::row_to_journal(row)?;
            journal.entries = self.entries_for_journal(journal.id).await?;
            journals.push(journal);
        }
        Ok(journals)
    }

    async fn entries_for_journal(&self, journal_id: JournalId) -> Result<Vec<JournalEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT journal_id, wallet_id, direction, amount_cents
            FROM journal_entries
            WHERE journal_id = ?
            ORDER BY position
            "#,
        )
        .bind(journal_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch journal entries")?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    // ========================
    // Balance queries
    // ========================

    /// Raw balance (debits minus credits) via SQL aggregation, cheaper
    /// than loading every journal into memory.
    pub async fn compute_raw_balance(&self, wallet_id: WalletId) -> Result<Cents> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(CASE WHEN direction = 'debit' THEN amount_cents ELSE -amount_cents END), 0) as balance
            FROM journal_entries
            WHERE wallet_id = ?
            "#,
        )
        .bind(wallet_id.to_string())
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute balance")?;

        Ok(row.get("balance"))
    }

    /// Raw balances for all wallets in a single query.
    /// Wallets with no entries won't be in the map (balance = 0).
    pub async fn compute_all_raw_balances(&self) -> Result<HashMap<WalletId, Cents>> {
        let rows = sqlx::query(
            r#"
            SELECT
                wallet_id,
                SUM(CASE WHEN direction = 'debit' THEN amount_cents ELSE -amount_cents END) as balance
            FROM journal_entries
            GROUP BY wallet_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to compute all balances")?;

        let mut balances = HashMap::new();
        for row in rows {
            let wallet_id_str: String = row.get("wallet_id");
            let balance: Cents = row.get("balance");
            let wallet_id = Uuid::parse_str(&wallet_id_str).context("Invalid wallet ID")?;
            balances.insert(wallet_id, balance);
        }
        Ok(balances)
    }

    /// Count entries for a wallet (debits and credits separately).
    pub async fn count_entries_for_wallet(&self, wallet_id: WalletId) -> Result<(i64, i64)> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN direction = 'debit' THEN 1 ELSE 0 END), 0) as debits,
                COALESCE(SUM(CASE WHEN direction = 'credit' THEN 1 ELSE 0 END), 0) as credits
            FROM journal_entries
            WHERE wallet_id = ?
            "#,
        )
        .bind(wallet_id.to_string())
        .fetch_one(&self.pool)
        .await
        .context("Failed to count entries")?;

        Ok((row.get("debits"), row.get("credits")))
    }

    /// Most recent effective timestamp among journals touching a wallet.
    pub async fn get_last_activity(&self, wallet_id: WalletId) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            r#"
            SELECT MAX(j.effective_at) as last_activity
            FROM journals j
            JOIN journal_entries e ON e.journal_id = j.id
            WHERE e.wallet_id = ?
            "#,
        )
        .bind(wallet_id.to_string())
        .fetch_one(&self.pool)
        .await
        .context("Failed to get last activity")?;

        let last_activity_str: Option<String> = row.get("last_activity");
        match last_activity_str {
            Some(s) => Ok(Some(
                DateTime::parse_from_rfc3339(&s)
                    .context("Invalid timestamp")?
                    .with_timezone(&Utc),
            )),
            None => Ok(None),
        }
    }

    // ========================
    // Integrity queries
    // ========================

    /// Gather the raw counts the integrity audit works from.
    pub async fn get_integrity_counts(&self) -> Result<IntegrityCounts> {
        let wallet_count: i64 = sqlx::query("SELECT COUNT(*) as count FROM wallets")
            .fetch_one(&self.pool)
            .await?
            .get("count");

        let journal_count: i64 = sqlx::query("SELECT COUNT(*) as count FROM journals")
            .fetch_one(&self.pool)
            .await?
            .get("count");

        let entry_count: i64 = sqlx::query("SELECT COUNT(*) as count FROM journal_entries")
            .fetch_one(&self.pool)
            .await?
            .get("count");

        let sequence_check = sqlx::query(
            r#"
            SELECT
                MIN(sequence) as min_seq,
                MAX(sequence) as max_seq,
                COUNT(*) as count
            FROM journals
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let sequence_min: Option<i64> = sequence_check.get("min_seq");
        let sequence_max: Option<i64> = sequence_check.get("max_seq");
        let sequence_count: i64 = sequence_check.get("count");

        let dangling_entries: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) as count
            FROM journal_entries e
            WHERE NOT EXISTS (SELECT 1 FROM wallets w WHERE w.id = e.wallet_id)
            "#,
        )
        .fetch_one(&self.pool)
        .await?
        .get("count");

        let non_positive_entries: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) as count
            FROM journal_entries
            WHERE amount_cents <= 0
            "#,
        )
        .fetch_one(&self.pool)
        .await?
        .get("count");

        let undersized_journals: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) as count
            FROM journals j
            WHERE (SELECT COUNT(*) FROM journal_entries e WHERE e.journal_id = j.id) < 2
            "#,
        )
        .fetch_one(&self.pool)
        .await?
        .get("count");

        let unbalanced_rows = sqlx::query(
            r#"
            SELECT
                journal_id,
                COALESCE(SUM(CASE WHEN direction = 'debit' THEN amount_cents ELSE 0 END), 0) as debit_cents,
                COALESCE(SUM(CASE WHEN direction = 'credit' THEN amount_cents ELSE 0 END), 0) as credit_cents
            FROM journal_entries
            GROUP BY journal_id
            HAVING debit_cents != credit_cents
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut unbalanced = Vec::with_capacity(unbalanced_rows.len());
        for row in &unbalanced_rows {
            let journal_id_str: String = row.get("journal_id");
            unbalanced.push(UnbalancedJournal {
                journal_id: Uuid::parse_str(&journal_id_str).context("Invalid journal ID")?,
                debit_cents: row.get("debit_cents"),
                credit_cents: row.get("credit_cents"),
            });
        }

        let trial_net_cents: Cents = sqlx::query(
            r#"
            SELECT COALESCE(SUM(CASE WHEN direction = 'debit' THEN amount_cents ELSE -amount_cents END), 0) as net
            FROM journal_entries
            "#,
        )
        .fetch_one(&self.pool)
        .await?
        .get("net");

        Ok(IntegrityCounts {
            wallet_count,
            journal_count,
            entry_count,
            sequence_count,
            sequence_min: sequence_min.unwrap_or(0),
            sequence_max: sequence_max.unwrap_or(0),
            dangling_entries,
            non_positive_entries,
            undersized_journals,
            unbalanced,
            trial_net_cents,
        })
    }

    // ========================
    // Adjustment operations
    // ========================

    /// Save a flight adjustment record.
    pub async fn save_adjustment(&self, adjustment: &FlightAdjustment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO flight_adjustments (id, original_journal_id, adjustment_journal_id, student_delta_cents, instructor_delta_cents, revenue_delta_cents, reason, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(adjustment.id.to_string())
        .bind(adjustment.original_journal.to_string())
        .bind(adjustment.adjustment_journal.to_string())
        .bind(adjustment.delta.student_delta_cents)
        .bind(adjustment.delta.instructor_delta_cents)
        .bind(adjustment.delta.revenue_delta_cents)
        .bind(&adjustment.reason)
        .bind(adjustment.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save adjustment")?;
        Ok(())
    }

    /// List all adjustments, oldest first.
    pub async fn list_adjustments(&self) -> Result<Vec<FlightAdjustment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, original_journal_id, adjustment_journal_id, student_delta_cents, instructor_delta_cents, revenue_delta_cents, reason, created_at
            FROM flight_adjustments
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list adjustments")?;

        rows.iter().map(Self::row_to_adjustment).collect()
    }

    /// All adjustments applied to one journal, oldest first.
    pub async fn adjustments_for_journal(
        &self,
        original_id: JournalId,
    ) -> Result<Vec<FlightAdjustment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, original_journal_id, adjustment_journal_id, student_delta_cents, instructor_delta_cents, revenue_delta_cents, reason, created_at
            FROM flight_adjustments
            WHERE original_journal_id = ?
            ORDER BY created_at
            "#,
        )
        .bind(original_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list adjustments for journal")?;

        rows.iter().map(Self::row_to_adjustment).collect()
    }

    // ========================
    // Reserve snapshot operations
    // ========================

    /// Save a reconciliation snapshot.
    pub async fn save_snapshot(&self, snapshot: &ReserveSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reserve_snapshots (id, ledger_cents, processor_available_cents, processor_pending_cents, drift_cents, status, checked_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(snapshot.id.to_string())
        .bind(snapshot.ledger_cents)
        .bind(snapshot.processor_available_cents)
        .bind(snapshot.processor_pending_cents)
        .bind(snapshot.drift_cents)
        .bind(snapshot.status.as_str())
        .bind(snapshot.checked_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save snapshot")?;
        Ok(())
    }

    /// List snapshots, most recent first.
    pub async fn list_snapshots(&self, limit: Option<usize>) -> Result<Vec<ReserveSnapshot>> {
        let mut query = String::from(
            "SELECT id, ledger_cents, processor_available_cents, processor_pending_cents, drift_cents, status, checked_at FROM reserve_snapshots ORDER BY checked_at DESC",
        );
        if let Some(lim) = limit {
            query.push_str(&format!(" LIMIT {}", lim));
        }

        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list snapshots")?;

        rows.iter().map(Self::row_to_snapshot).collect()
    }

    /// Most recent snapshot, if any.
    pub async fn latest_snapshot(&self) -> Result<Option<ReserveSnapshot>> {
        let row = sqlx::query(
            r#"
            SELECT id, ledger_cents, processor_available_cents, processor_pending_cents, drift_cents, status, checked_at
            FROM reserve_snapshots
            ORDER BY checked_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch latest snapshot")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_snapshot(&row)?)),
            None => Ok(None),
        }
    }

    // ========================
    // Row mappers
    // ========================

    fn row_to_journal(row: &sqlx::sqlite::SqliteRow) -> Result<Journal> {
        let id_str: String = row.get("id");
        let kind_str: String = row.get("kind");
        let effective_at_str: String = row.get("effective_at");
        let posted_at_str: String = row.get("posted_at");
        let reverses_str: Option<String> = row.get("reverses");

        Ok(Journal {
            id: Uuid::parse_str(&id_str).context("Invalid journal ID")?,
            sequence: row.get("sequence"),
            kind: JournalKind::from_str(&kind_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid journal kind: {}", kind_str))?,
            entries: Vec::new(), // Filled in by the caller
            effective_at: DateTime::parse_from_rfc3339(&effective_at_str)
                .context("Invalid effective_at timestamp")?
                .with_timezone(&Utc),
            posted_at: DateTime::parse_from_rfc3339(&posted_at_str)
                .context("Invalid posted_at timestamp")?
                .with_timezone(&Utc),
            description: row.get("description"),
            reference: row.get("reference"),
            reverses: reverses_str
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .context("Invalid reverses ID")?,
        })
    }

    fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<JournalEntry> {
        use crate::domain::EntryDirection;

        let wallet_id_str: String = row.get("wallet_id");
        let direction_str: String = row.get("direction");

        Ok(JournalEntry {
            wallet_id: Uuid::parse_str(&wallet_id_str).context("Invalid wallet ID")?,
            direction: EntryDirection::from_str(&direction_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid entry direction: {}", direction_str))?,
            amount_cents: row.get("amount_cents"),
        })
    }

    fn row_to_adjustment(row: &sqlx::sqlite::SqliteRow) -> Result<FlightAdjustment> {
        let id_str: String = row.get("id");
        let original_str: String = row.get("original_journal_id");
        let adjustment_str: String = row.get("adjustment_journal_id");
        let created_at_str: String = row.get("created_at");

        Ok(FlightAdjustment {
            id: Uuid::parse_str(&id_str).context("Invalid adjustment ID")?,
            original_journal: Uuid::parse_str(&original_str).context("Invalid journal ID")?,
            adjustment_journal: Uuid::parse_str(&adjustment_str).context("Invalid journal ID")?,
            delta: AdjustmentDelta {
                student_delta_cents: row.get("student_delta_cents"),
                instructor_delta_cents: row.get("instructor_delta_cents"),
                revenue_delta_cents: row.get("revenue_delta_cents"),
            },
            reason: row.get("reason"),
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .context("Invalid created_at timestamp")?
                .with_timezone(&Utc),
        })
    }

    fn row_to_snapshot(row: &sqlx::sqlite::SqliteRow) -> Result<ReserveSnapshot> {
        let id_str: String = row.get("id");
        let status_str: String = row.get("status");
        let checked_at_str: String = row.get("checked_at");

        Ok(ReserveSnapshot {
            id: Uuid::parse_str(&id_str).context("Invalid snapshot ID")?,
            ledger_cents: row.get("ledger_cents"),
            processor_available_cents: row.get("processor_available_cents"),
            processor_pending_cents: row.get("processor_pending_cents"),
            drift_cents: row.get("drift_cents"),
            status: ReserveStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid reserve status: {}", status_str))?,
            checked_at: DateTime::parse_from_rfc3339(&checked_at_str)
                .context("Invalid checked_at timestamp")?
                .with_timezone(&Utc),
        })
    }
}
