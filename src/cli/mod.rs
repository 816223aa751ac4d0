use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use crate::application::{EntryLine, EntrySpec, JournalFilter, LedgerService, emit_snapshot_alert};
use crate::domain::{
    CreditDecision, CreditPolicy, CreditTier, EntryDirection, Journal, JournalKind, ReservePolicy,
    ReserveStatus, WalletType, format_cents, format_cents_signed, parse_cents,
};
use crate::processor::{PaymentProcessor, StatementFileProcessor, StaticProcessor};

/// Aeroledger - Flight School Billing Ledger
#[derive(Parser)]
#[command(name = "aeroledger")]
#[command(about = "A double-entry billing ledger for flight school operations")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "aeroledger.db")]
    pub database: String,

    /// Print the full entry breakdown after posting
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database with the school's own wallets
    Init {
        /// Currency for the platform wallets
        #[arg(short, long, default_value = "USD")]
        currency: String,
    },

    /// Wallet management commands
    #[command(subcommand)]
    Wallet(WalletCommands),

    /// Record a student payment through the payment processor
    Topup {
        /// Student wallet name
        student: String,

        /// Amount paid (e.g., "500.00" or "500")
        amount: String,

        /// Processor fee withheld from the payment
        #[arg(short, long)]
        fee: Option<String>,

        /// Description of the payment
        #[arg(short, long)]
        description: Option<String>,

        /// External reference, e.g. the processor's payment id
        #[arg(short, long)]
        reference: Option<String>,

        /// Date of the payment (YYYY-MM-DD, defaults to now)
        #[arg(long)]
        date: Option<String>,
    },

    /// Charge a student for a flown lesson
    Charge {
        /// Student wallet name
        student: String,

        /// Instructor wallet name
        instructor: String,

        /// Total charge (e.g., "180.00")
        amount: String,

        /// Instructor's share of the charge; the rest is the school's cut
        #[arg(short, long)]
        instructor_share: String,

        /// Description of the lesson
        #[arg(short, long)]
        description: Option<String>,

        /// External reference, e.g. a lesson id
        #[arg(short, long)]
        reference: Option<String>,

        /// Date of the lesson (YYYY-MM-DD, defaults to now)
        #[arg(long)]
        date: Option<String>,

        /// Post even if the student's credit limit declines the charge
        #[arg(long)]
        force: bool,
    },

    /// Pay an instructor their accrued earnings out of the reserve
    Payout {
        /// Instructor wallet name
        instructor: String,

        /// Amount to pay out (e.g., "250.00")
        amount: String,

        /// Description of the payout
        #[arg(short, long)]
        description: Option<String>,

        /// External reference, e.g. the bank transfer id
        #[arg(short, long)]
        reference: Option<String>,

        /// Date of the payout (YYYY-MM-DD, defaults to now)
        #[arg(long)]
        date: Option<String>,

        /// Pay out more than the accrued balance
        #[arg(long)]
        force: bool,
    },

    /// Refund unused flight credit back to a student
    Refund {
        /// Student wallet name
        student: String,

        /// Amount to refund (e.g., "100.00")
        amount: String,

        /// Description of the refund
        #[arg(short, long)]
        description: Option<String>,

        /// External reference, e.g. the processor's refund id
        #[arg(short, long)]
        reference: Option<String>,

        /// Date of the refund (YYYY-MM-DD, defaults to now)
        #[arg(long)]
        date: Option<String>,

        /// Refund more credit than the student holds
        #[arg(long)]
        force: bool,
    },

    /// Post a raw journal from explicit debit and credit entries
    Post {
        /// Debit entries (repeatable)
        #[arg(long = "debit", value_name = "WALLET=AMOUNT")]
        debits: Vec<String>,

        /// Credit entries (repeatable)
        #[arg(long = "credit", value_name = "WALLET=AMOUNT")]
        credits: Vec<String>,

        /// Journal kind: manual, opening, adjustment
        #[arg(short, long, default_value = "manual")]
        kind: String,

        /// Description of the posting
        #[arg(short, long)]
        description: Option<String>,

        /// External reference (must be unique)
        #[arg(short, long)]
        reference: Option<String>,

        /// Effective date (YYYY-MM-DD, defaults to now)
        #[arg(long)]
        date: Option<String>,

        /// Skip floor checks on the touched wallets
        #[arg(long)]
        force: bool,
    },

    /// Show balance for a wallet or all wallets
    Balance {
        /// Wallet name (omit for all wallets)
        wallet: Option<String>,
    },

    /// List recent journals
    Journals {
        /// Filter by wallet name
        #[arg(long)]
        wallet: Option<String>,

        /// Filter by kind: top_up, flight_charge, payout, refund, adjustment, opening, manual
        #[arg(long)]
        kind: Option<String>,

        /// Filter from date (YYYY-MM-DD)
        #[arg(long)]
        from_date: Option<String>,

        /// Filter to date (YYYY-MM-DD)
        #[arg(long)]
        to_date: Option<String>,

        /// Maximum number of journals to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show detailed journal information
    Show {
        /// Journal ID or reference
        journal: String,
    },

    /// Verify ledger integrity
    Check,

    /// Credit limit commands
    #[command(subcommand)]
    Credit(CreditCommands),

    /// Correct a posted flight charge to its actual amounts
    Adjust {
        /// Journal ID or reference of the flight charge
        journal: String,

        /// Corrected instructor share (e.g., "90.00")
        #[arg(short, long)]
        instructor_share: String,

        /// Corrected school share (e.g., "45.00")
        #[arg(short, long)]
        school_share: String,

        /// Why the charge is being corrected
        #[arg(long)]
        reason: Option<String>,

        /// Post even if the student's credit limit declines the extra charge
        #[arg(long)]
        force: bool,
    },

    /// List flight adjustments
    Adjustments {
        /// Only adjustments of this journal (ID or reference)
        #[arg(long)]
        journal: Option<String>,
    },

    /// Fully reverse a journal that has no corrections yet
    Void {
        /// Journal ID or reference
        journal: String,

        /// Why the journal is being voided
        #[arg(long)]
        reason: Option<String>,
    },

    /// Reserve reconciliation commands
    #[command(subcommand)]
    Reserve(ReserveCommands),

    /// Export data to CSV or JSON
    Export {
        /// What to export: journals, balances, adjustments, snapshots, full
        export_type: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum WalletCommands {
    /// Create a new wallet
    Create {
        /// Wallet name (must be unique)
        name: String,

        /// Wallet type: student, instructor, asset, liability, revenue, expense, equity
        #[arg(short = 't', long = "type")]
        wallet_type: String,

        /// Currency code (e.g., USD)
        #[arg(short, long, default_value = "USD")]
        currency: String,

        /// Credit line (e.g., "500.00"); only meaningful for students
        #[arg(long)]
        credit_limit: Option<String>,

        /// Description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// List all wallets
    List {
        /// Include archived wallets
        #[arg(long)]
        all: bool,
    },

    /// Show detailed wallet information
    Show {
        /// Wallet name
        name: String,
    },

    /// Archive a wallet (soft delete)
    Archive {
        /// Wallet name
        name: String,
    },

    /// Change or clear a wallet's credit limit
    SetLimit {
        /// Wallet name
        name: String,

        /// New credit limit (e.g., "500.00"); zero forbids any overdraft
        limit: Option<String>,

        /// Remove the limit entirely
        #[arg(long)]
        clear: bool,
    },
}

#[derive(Subcommand)]
pub enum CreditCommands {
    /// Dry-run the credit gate for a proposed charge
    Check {
        /// Student wallet name
        student: String,

        /// Proposed charge amount (e.g., "180.00")
        amount: String,
    },

    /// Show credit standing for one student or all students with limits
    Status {
        /// Student wallet name (omit for all)
        student: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ReserveCommands {
    /// Reconcile the ledger reserve against the processor balance
    Check {
        /// Processor statement file (JSON)
        #[arg(short, long)]
        statement: Option<String>,

        /// Processor available balance, typed directly (e.g., "980.00")
        #[arg(long)]
        available: Option<String>,

        /// Processor pending balance, typed directly
        #[arg(long)]
        pending: Option<String>,

        /// Drift tolerated before alerting (default "1.00")
        #[arg(long)]
        tolerance: Option<String>,

        /// Shortfall treated as critical (default "100.00")
        #[arg(long)]
        critical: Option<String>,
    },

    /// Show past reconciliation snapshots
    History {
        /// Maximum number of snapshots to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Compare the reserve against everything the school owes
    Coverage,

    /// Poll the processor statement on an interval and log drift
    Watch {
        /// Processor statement file (JSON), re-read on every poll
        #[arg(short, long)]
        statement: String,

        /// Seconds between polls
        #[arg(short, long, default_value = "300")]
        interval: u64,

        /// Drift tolerated before alerting (default "1.00")
        #[arg(long)]
        tolerance: Option<String>,

        /// Shortfall treated as critical (default "100.00")
        #[arg(long)]
        critical: Option<String>,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Init { currency } => {
                let service = LedgerService::init(&self.database).await?;
                let created = service.setup_chart(&currency).await?;
                println!("Database initialized: {}", self.database);
                for wallet in created {
                    println!("  Created wallet: {} ({})", wallet.name, wallet.wallet_type);
                }
            }

            Commands::Wallet(wallet_cmd) => {
                let service = LedgerService::connect(&self.database).await?;
                run_wallet_command(&service, wallet_cmd).await?;
            }

            Commands::Topup {
                student,
                amount,
                fee,
                description,
                reference,
                date,
            } => {
                let service = LedgerService::connect(&self.database).await?;
                let amount_cents =
                    parse_cents(&amount).context("Invalid amount format. Use '500.00' or '500'")?;
                let fee_cents = fee
                    .map(|f| parse_cents(&f))
                    .transpose()
                    .context("Invalid fee format")?
                    .unwrap_or(0);
                let timestamp = parse_timestamp(date)?;

                let result = service
                    .record_top_up(
                        &student,
                        amount_cents,
                        fee_cents,
                        timestamp,
                        description,
                        reference,
                    )
                    .await?;

                if fee_cents > 0 {
                    println!(
                        "Recorded top-up: {} for {} (fee {}) ({})",
                        format_cents(amount_cents),
                        student,
                        format_cents(fee_cents),
                        result.journal.id
                    );
                } else {
                    println!(
                        "Recorded top-up: {} for {} ({})",
                        format_cents(amount_cents),
                        student,
                        result.journal.id
                    );
                }
                if self.verbose {
                    print_entry_lines(&result.lines);
                }
            }

            Commands::Charge {
                student,
                instructor,
                amount,
                instructor_share,
                description,
                reference,
                date,
                force,
            } => {
                let service = LedgerService::connect(&self.database).await?;
                let amount_cents =
                    parse_cents(&amount).context("Invalid amount format. Use '180.00' or '180'")?;
                let instructor_cents =
                    parse_cents(&instructor_share).context("Invalid instructor share format")?;
                if instructor_cents > amount_cents {
                    anyhow::bail!(
                        "Instructor share {} exceeds the total charge {}",
                        format_cents(instructor_cents),
                        format_cents(amount_cents)
                    );
                }
                let revenue_cents = amount_cents - instructor_cents;
                let timestamp = parse_timestamp(date)?;

                let result = service
                    .record_flight_charge(
                        &student,
                        &instructor,
                        instructor_cents,
                        revenue_cents,
                        timestamp,
                        description,
                        reference,
                        &CreditPolicy::default(),
                        force,
                    )
                    .await?;

                println!(
                    "Recorded flight charge: {} {} -> {} ({} instructor, {} school) ({})",
                    format_cents(result.breakdown.student_cents),
                    result.student_name,
                    result.instructor_name,
                    format_cents(result.breakdown.instructor_cents),
                    format_cents(result.breakdown.revenue_cents),
                    result.journal.id
                );
                if let Some(check) = result.check {
                    print_credit_warning(&result.student_name, &check.decision, check.utilization);
                }
                if self.verbose {
                    print_journal_entries(&service, &result.journal).await?;
                }
            }

            Commands::Payout {
                instructor,
                amount,
                description,
                reference,
                date,
                force,
            } => {
                let service = LedgerService::connect(&self.database).await?;
                let amount_cents =
                    parse_cents(&amount).context("Invalid amount format. Use '250.00' or '250'")?;
                let timestamp = parse_timestamp(date)?;

                let result = service
                    .record_instructor_payout(
                        &instructor,
                        amount_cents,
                        timestamp,
                        description,
                        reference,
                        force,
                    )
                    .await?;

                println!(
                    "Recorded payout: {} to {} ({})",
                    format_cents(amount_cents),
                    instructor,
                    result.journal.id
                );
                if self.verbose {
                    print_entry_lines(&result.lines);
                }
            }

            Commands::Refund {
                student,
                amount,
                description,
                reference,
                date,
                force,
            } => {
                let service = LedgerService::connect(&self.database).await?;
                let amount_cents =
                    parse_cents(&amount).context("Invalid amount format. Use '100.00' or '100'")?;
                let timestamp = parse_timestamp(date)?;

                let result = service
                    .record_refund(
                        &student,
                        amount_cents,
                        timestamp,
                        description,
                        reference,
                        force,
                    )
                    .await?;

                println!(
                    "Recorded refund: {} to {} ({})",
                    format_cents(amount_cents),
                    student,
                    result.journal.id
                );
                if self.verbose {
                    print_entry_lines(&result.lines);
                }
            }

            Commands::Post {
                debits,
                credits,
                kind,
                description,
                reference,
                date,
                force,
            } => {
                let service = LedgerService::connect(&self.database).await?;
                let kind = JournalKind::from_str(&kind).ok_or_else(|| {
                    anyhow::anyhow!(
                        "Invalid journal kind '{}'. Valid kinds: top_up, flight_charge, payout, refund, adjustment, opening, manual",
                        kind
                    )
                })?;
                let timestamp = parse_timestamp(date)?;

                let mut specs = Vec::new();
                for debit in &debits {
                    specs.push(parse_entry_spec(debit, EntryDirection::Debit)?);
                }
                for credit in &credits {
                    specs.push(parse_entry_spec(credit, EntryDirection::Credit)?);
                }

                let result = service
                    .post_journal(kind, specs, timestamp, description, reference, force)
                    .await?;

                println!(
                    "Posted journal #{}: {} {} ({})",
                    result.journal.sequence,
                    result.journal.kind,
                    format_cents(result.journal.debit_total()),
                    result.journal.id
                );
                if self.verbose {
                    print_entry_lines(&result.lines);
                }
            }

            Commands::Balance { wallet } => {
                let service = LedgerService::connect(&self.database).await?;
                run_balance_command(&service, wallet).await?;
            }

            Commands::Journals {
                wallet,
                kind,
                from_date,
                to_date,
                limit,
            } => {
                let service = LedgerService::connect(&self.database).await?;
                run_journals_command(&service, wallet, kind, from_date, to_date, limit).await?;
            }

            Commands::Show { journal } => {
                let service = LedgerService::connect(&self.database).await?;
                run_show_command(&service, &journal).await?;
            }

            Commands::Check => {
                let service = LedgerService::connect(&self.database).await?;
                run_check_command(&service).await?;
            }

            Commands::Credit(credit_cmd) => {
                let service = LedgerService::connect(&self.database).await?;
                run_credit_command(&service, credit_cmd).await?;
            }

            Commands::Adjust {
                journal,
                instructor_share,
                school_share,
                reason,
                force,
            } => {
                let service = LedgerService::connect(&self.database).await?;
                let instructor_cents =
                    parse_cents(&instructor_share).context("Invalid instructor share format")?;
                let school_cents =
                    parse_cents(&school_share).context("Invalid school share format")?;

                let result = service
                    .adjust_flight(
                        &journal,
                        instructor_cents,
                        school_cents,
                        reason,
                        &CreditPolicy::default(),
                        force,
                    )
                    .await?;

                println!("Adjusted flight charge #{}: ", result.original.sequence);
                println!(
                    "  student:    {} -> {} ({})",
                    format_cents(result.before.student_cents),
                    format_cents(result.after.student_cents),
                    format_cents_signed(result.adjustment.delta.student_delta_cents)
                );
                println!(
                    "  instructor: {} -> {} ({})",
                    format_cents(result.before.instructor_cents),
                    format_cents(result.after.instructor_cents),
                    format_cents_signed(result.adjustment.delta.instructor_delta_cents)
                );
                println!(
                    "  school:     {} -> {} ({})",
                    format_cents(result.before.revenue_cents),
                    format_cents(result.after.revenue_cents),
                    format_cents_signed(result.adjustment.delta.revenue_delta_cents)
                );
                println!("Posted adjustment journal {}", result.journal.id);
                if let Some(check) = result.check {
                    print_credit_warning(&result.student_name, &check.decision, check.utilization);
                }
            }

            Commands::Adjustments { journal } => {
                let service = LedgerService::connect(&self.database).await?;
                run_adjustments_command(&service, journal.as_deref()).await?;
            }

            Commands::Void { journal, reason } => {
                let service = LedgerService::connect(&self.database).await?;
                let result = service.void_journal(&journal, reason).await?;
                println!(
                    "Voided journal: reversal posted as #{} ({})",
                    result.journal.sequence, result.journal.id
                );
                if self.verbose {
                    print_entry_lines(&result.lines);
                }
            }

            Commands::Reserve(reserve_cmd) => {
                run_reserve_command(&self.database, reserve_cmd).await?;
            }

            Commands::Export {
                export_type,
                output,
            } => {
                let service = LedgerService::connect(&self.database).await?;
                run_export_command(&service, &export_type, output.as_deref()).await?;
            }
        }

        Ok(())
    }
}

async fn run_wallet_command(service: &LedgerService, cmd: WalletCommands) -> Result<()> {
    match cmd {
        WalletCommands::Create {
            name,
            wallet_type,
            currency,
            credit_limit,
            description,
        } => {
            let limit = credit_limit
                .map(|l| parse_cents(&l))
                .transpose()
                .context("Invalid credit limit format. Use '500.00' or '500'")?;

            let wallet = match wallet_type.to_lowercase().as_str() {
                "student" => {
                    service
                        .enroll_student(name, currency, limit, description)
                        .await?
                }
                "instructor" => {
                    if limit.is_some() {
                        anyhow::bail!("Instructor wallets have no credit limit");
                    }
                    service.hire_instructor(name, currency, description).await?
                }
                other => {
                    let wt = WalletType::from_str(other).ok_or_else(|| {
                        anyhow::anyhow!(
                            "Invalid wallet type '{}'. Valid types: student, instructor, asset, liability, revenue, expense, equity",
                            wallet_type
                        )
                    })?;
                    service
                        .create_wallet(name, wt, currency, limit, description)
                        .await?
                }
            };
            println!("Created wallet: {} ({})", wallet.name, wallet.wallet_type);
        }

        WalletCommands::List { all } => {
            let wallets = service.list_wallets(all).await?;
            if wallets.is_empty() {
                println!("No wallets found.");
            } else {
                println!(
                    "{:<20} {:<12} {:<8} {:>12}",
                    "NAME", "TYPE", "CURRENCY", "CREDIT LIMIT"
                );
                println!("{}", "-".repeat(56));
                for wallet in wallets {
                    let limit = wallet
                        .credit_limit_cents
                        .map(format_cents)
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{:<20} {:<12} {:<8} {:>12}",
                        wallet.name, wallet.wallet_type, wallet.currency, limit
                    );
                }
            }
        }

        WalletCommands::Show { name } => {
            let info = service.get_wallet_info(&name).await?;
            let wallet = &info.wallet;

            println!("Wallet: {}", wallet.name);
            println!("  ID:           {}", wallet.id);
            println!("  Type:         {}", wallet.wallet_type);
            println!("  Currency:     {}", wallet.currency);
            match wallet.credit_limit_cents {
                Some(0) => println!("  Credit limit: none (no overdraft)"),
                Some(limit) => println!("  Credit limit: {}", format_cents(limit)),
                None => println!("  Credit limit: unlimited"),
            }
            if let Some(desc) = &wallet.description {
                println!("  Description:  {}", desc);
            }
            println!(
                "  Created:      {}",
                wallet.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            if let Some(archived) = wallet.archived_at {
                println!("  Archived:     {}", archived.format("%Y-%m-%d %H:%M:%S"));
            }
            println!();
            println!(
                "  Balance:      {} {}",
                format_cents(info.balance),
                wallet.currency
            );
            println!(
                "  Entries:      {} ({} debits, {} credits)",
                info.debit_count + info.credit_count,
                info.debit_count,
                info.credit_count
            );
            if let Some(last) = info.last_activity {
                println!("  Last activity: {}", last.format("%Y-%m-%d %H:%M:%S"));
            }
        }

        WalletCommands::Archive { name } => {
            service.archive_wallet(&name).await?;
            println!("Archived wallet: {}", name);
        }

        WalletCommands::SetLimit { name, limit, clear } => {
            let new_limit = match (limit, clear) {
                (Some(l), false) => Some(
                    parse_cents(&l).context("Invalid credit limit format. Use '500.00' or '500'")?,
                ),
                (None, true) => None,
                _ => anyhow::bail!("Provide either a limit amount or --clear"),
            };

            let wallet = service.set_credit_limit(&name, new_limit).await?;
            match wallet.credit_limit_cents {
                Some(limit) => println!(
                    "Set credit limit for {}: {}",
                    wallet.name,
                    format_cents(limit)
                ),
                None => println!("Cleared credit limit for {}", wallet.name),
            }
        }
    }
    Ok(())
}

async fn run_balance_command(service: &LedgerService, wallet: Option<String>) -> Result<()> {
    match wallet {
        Some(name) => {
            let entry = service.get_balance(&name).await?;
            println!(
                "{}: {} {}",
                entry.wallet.name,
                format_cents(entry.balance),
                entry.wallet.currency
            );
        }
        None => {
            let entries = service.get_all_balances().await?;
            if entries.is_empty() {
                println!("No wallets found.");
            } else {
                println!("{:<20} {:<12} {:>12} {:<8}", "WALLET", "TYPE", "BALANCE", "CURRENCY");
                println!("{}", "-".repeat(56));
                for entry in entries {
                    println!(
                        "{:<20} {:<12} {:>12} {:<8}",
                        entry.wallet.name,
                        entry.wallet.wallet_type,
                        format_cents(entry.balance),
                        entry.wallet.currency
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_journals_command(
    service: &LedgerService,
    wallet: Option<String>,
    kind: Option<String>,
    from_date: Option<String>,
    to_date: Option<String>,
    limit: Option<usize>,
) -> Result<()> {
    let kind_parsed = kind
        .map(|k| {
            JournalKind::from_str(&k)
                .ok_or_else(|| anyhow::anyhow!("Invalid journal kind '{}'", k))
        })
        .transpose()?;
    let from_date_parsed = from_date
        .map(|s| parse_date(&s))
        .transpose()
        .context("Invalid from-date")?;
    let to_date_parsed = to_date
        .map(|s| parse_date(&s))
        .transpose()
        .context("Invalid to-date")?;

    let filter = JournalFilter {
        wallet,
        kind: kind_parsed,
        from_date: from_date_parsed,
        to_date: to_date_parsed,
        limit,
    };

    let journals = service.list_journals(filter).await?;

    if journals.is_empty() {
        println!("No journals found.");
    } else {
        println!(
            "{:<12} {:>5} {:<14} {:>10} DESCRIPTION",
            "DATE", "SEQ", "KIND", "AMOUNT"
        );
        println!("{}", "-".repeat(70));

        // Query returns newest first; print in posting order
        for journal in journals.iter().rev() {
            let date = journal.effective_at.format("%Y-%m-%d");
            let desc = journal.description.as_deref().unwrap_or("");

            println!(
                "{:<12} {:>5} {:<14} {:>10} {}",
                date,
                journal.sequence,
                journal.kind,
                format_cents(journal.debit_total()),
                truncate(desc, 30)
            );
        }
    }
    Ok(())
}

async fn run_show_command(service: &LedgerService, selector: &str) -> Result<()> {
    let info = service.get_journal_info(selector).await?;
    let journal = &info.journal;

    println!("Journal: {}", journal.id);
    println!("  Sequence:    {}", journal.sequence);
    println!("  Kind:        {}", journal.kind);
    println!(
        "  Date:        {}",
        journal.effective_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(reference) = &journal.reference {
        println!("  Reference:   {}", reference);
    }
    if let Some(desc) = &journal.description {
        println!("  Description: {}", desc);
    }
    println!(
        "  Posted at:   {}",
        journal.posted_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(reverses) = journal.reverses {
        println!();
        println!("  Corrects journal: {}", reverses);
    }

    println!();
    println!("  Entries:");
    print_entry_lines(&info.lines);

    if !info.corrections.is_empty() {
        println!();
        println!("  Corrected by:");
        for correction in &info.corrections {
            println!(
                "    - #{} on {} ({})",
                correction.sequence,
                correction.effective_at.format("%Y-%m-%d"),
                correction.id
            );
        }
    }

    Ok(())
}

async fn run_check_command(service: &LedgerService) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = service.check_integrity().await?;

    println!("Wallets:  {}", report.wallet_count);
    println!("Journals: {}", report.journal_count);
    println!("Entries:  {}", report.entry_count);
    println!();

    if !report.warnings.is_empty() {
        println!("Warnings:");
        for warning in &report.warnings {
            println!("  - {}", warning);
        }
        println!();
    }

    if report.is_healthy() {
        println!("Ledger is consistent.");
    } else {
        println!("Issues found:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Ledger integrity check failed");
    }

    Ok(())
}

async fn run_credit_command(service: &LedgerService, cmd: CreditCommands) -> Result<()> {
    let policy = CreditPolicy::default();

    match cmd {
        CreditCommands::Check { student, amount } => {
            let amount_cents =
                parse_cents(&amount).context("Invalid amount format. Use '180.00' or '180'")?;
            let result = service.check_credit(&student, amount_cents, &policy).await?;
            let check = result.check;

            println!("Credit check for {}", result.wallet_name);
            println!("  Balance:   {}", format_cents(check.balance_cents));
            println!("  Limit:     {}", format_cents(check.limit_cents));
            println!("  Requested: {}", format_cents(check.requested_cents));
            println!("  Projected: {}", format_cents(check.projected_cents));
            match check.decision {
                CreditDecision::Approved { tier } => {
                    println!(
                        "  Decision:  approved ({}, {} of limit used)",
                        tier,
                        format_utilization(check.utilization)
                    );
                }
                CreditDecision::Declined { shortfall_cents } => {
                    println!(
                        "  Decision:  declined (short by {})",
                        format_cents(shortfall_cents)
                    );
                }
            }
        }

        CreditCommands::Status { student } => match student {
            Some(name) => {
                let standing = service.credit_standing(&name, &policy).await?;
                println!("Credit standing for {}", standing.wallet_name);
                println!("  Limit:       {}", format_cents(standing.limit_cents));
                println!("  Balance:     {}", format_cents(standing.balance_cents));
                println!("  Exposure:    {}", format_cents(standing.exposure_cents));
                println!("  Available:   {}", format_cents(standing.available_cents));
                println!("  Utilization: {}", format_utilization(standing.utilization));
                println!("  Tier:        {}", standing.tier);
            }
            None => {
                let standings = service.credit_standings(&policy).await?;
                if standings.is_empty() {
                    println!("No wallets with credit limits found.");
                } else {
                    println!(
                        "{:<20} {:>10} {:>10} {:>10} {:>6} {:<12}",
                        "WALLET", "LIMIT", "BALANCE", "AVAILABLE", "USED", "TIER"
                    );
                    println!("{}", "-".repeat(74));
                    for standing in standings {
                        println!(
                            "{:<20} {:>10} {:>10} {:>10} {:>6} {:<12}",
                            standing.wallet_name,
                            format_cents(standing.limit_cents),
                            format_cents(standing.balance_cents),
                            format_cents(standing.available_cents),
                            format_utilization(standing.utilization),
                            standing.tier
                        );
                    }
                }
            }
        },
    }
    Ok(())
}

async fn run_adjustments_command(service: &LedgerService, selector: Option<&str>) -> Result<()> {
    let adjustments = service.list_adjustments(selector).await?;

    if adjustments.is_empty() {
        println!("No adjustments found.");
    } else {
        println!(
            "{:<12} {:<10} {:>10} {:>11} {:>9} REASON",
            "DATE", "ORIGINAL", "STUDENT", "INSTRUCTOR", "SCHOOL"
        );
        println!("{}", "-".repeat(80));
        for adj in adjustments {
            let reason = adj.reason.as_deref().unwrap_or("");
            println!(
                "{:<12} {:<10} {:>10} {:>11} {:>9} {}",
                adj.created_at.format("%Y-%m-%d"),
                short_id(&adj.original_journal.to_string()),
                format_cents_signed(adj.delta.student_delta_cents),
                format_cents_signed(adj.delta.instructor_delta_cents),
                format_cents_signed(adj.delta.revenue_delta_cents),
                truncate(reason, 24)
            );
        }
    }
    Ok(())
}

async fn run_reserve_command(database: &str, cmd: ReserveCommands) -> Result<()> {
    match cmd {
        ReserveCommands::Check {
            statement,
            available,
            pending,
            tolerance,
            critical,
        } => {
            let service = LedgerService::connect(database).await?;
            let policy = reserve_policy(tolerance, critical)?;

            let balance = match (statement, available) {
                (Some(path), None) => {
                    StatementFileProcessor::new(path.as_str())
                        .fetch_balance()
                        .await?
                }
                (None, Some(avail)) => {
                    let available_cents =
                        parse_cents(&avail).context("Invalid available amount")?;
                    let pending_cents = pending
                        .map(|p| parse_cents(&p))
                        .transpose()
                        .context("Invalid pending amount")?
                        .unwrap_or(0);
                    StaticProcessor::new(available_cents, pending_cents)
                        .fetch_balance()
                        .await?
                }
                _ => anyhow::bail!(
                    "Provide either --statement or --available (with optional --pending)"
                ),
            };

            let snapshot = service.reconcile_reserve(&balance, &policy).await?;

            println!("Reserve reconciliation");
            println!(
                "  Ledger reserve:      {:>12}",
                format_cents(snapshot.ledger_cents)
            );
            println!(
                "  Processor available: {:>12}",
                format_cents(snapshot.processor_available_cents)
            );
            println!(
                "  Processor pending:   {:>12}",
                format_cents(snapshot.processor_pending_cents)
            );
            println!(
                "  Drift:               {:>12}",
                format_cents_signed(snapshot.drift_cents)
            );
            println!("  Status:              {:>12}", snapshot.status);

            if snapshot.status == ReserveStatus::Critical {
                anyhow::bail!(
                    "Critical reserve shortfall: {}",
                    format_cents(-snapshot.drift_cents)
                );
            }
        }

        ReserveCommands::History { limit } => {
            let service = LedgerService::connect(database).await?;
            let snapshots = service.reserve_history(limit).await?;

            if snapshots.is_empty() {
                println!("No reserve snapshots recorded yet.");
            } else {
                println!(
                    "{:<12} {:>12} {:>12} {:>10} {:<12}",
                    "CHECKED", "LEDGER", "PROCESSOR", "DRIFT", "STATUS"
                );
                println!("{}", "-".repeat(62));
                for snapshot in snapshots {
                    let processor_total =
                        snapshot.processor_available_cents + snapshot.processor_pending_cents;
                    println!(
                        "{:<12} {:>12} {:>12} {:>10} {:<12}",
                        snapshot.checked_at.format("%Y-%m-%d"),
                        format_cents(snapshot.ledger_cents),
                        format_cents(processor_total),
                        format_cents_signed(snapshot.drift_cents),
                        snapshot.status
                    );
                }
            }
        }

        ReserveCommands::Coverage => {
            let service = LedgerService::connect(database).await?;
            let report = service.coverage_report().await?;

            println!("Reserve coverage");
            println!(
                "  Reserve:     {:>12}",
                format_cents(report.reserve_cents)
            );
            println!(
                "  Obligations: {:>12}",
                format_cents(report.obligations_cents)
            );
            println!(
                "  Surplus:     {:>12}",
                format_cents_signed(report.surplus_cents)
            );
            println!();
            if report.is_covered() {
                println!("Reserve covers all obligations.");
            } else {
                println!(
                    "Reserve is short by {}.",
                    format_cents(-report.surplus_cents)
                );
            }
        }

        ReserveCommands::Watch {
            statement,
            interval,
            tolerance,
            critical,
        } => {
            let service = LedgerService::connect(database).await?;
            let policy = reserve_policy(tolerance, critical)?;
            let processor = StatementFileProcessor::new(statement.as_str());
            let period = std::time::Duration::from_secs(interval);

            tracing_subscriber::fmt::init();
            tracing::info!(
                statement = %statement,
                interval_secs = interval,
                "Reserve monitor started"
            );

            loop {
                match processor.fetch_balance().await {
                    Ok(balance) => match service.reconcile_reserve(&balance, &policy).await {
                        Ok(snapshot) => emit_snapshot_alert(&snapshot),
                        Err(e) => tracing::error!(error = %e, "Reconciliation failed"),
                    },
                    Err(e) => tracing::error!(error = %e, "Could not read processor statement"),
                }
                tokio::time::sleep(period).await;
            }
        }
    }
    Ok(())
}

async fn run_export_command(
    service: &LedgerService,
    export_type: &str,
    output: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{Write, stdout};

    let exporter = Exporter::new(service);

    // Determine output writer
    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match export_type {
        "journals" => {
            let count = exporter.export_journals_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} journal entries", count);
            }
        }
        "balances" => {
            let count = exporter.export_balances_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} balances", count);
            }
        }
        "adjustments" => {
            let count = exporter.export_adjustments_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} adjustments", count);
            }
        }
        "snapshots" => {
            let count = exporter.export_snapshots_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} reserve snapshots", count);
            }
        }
        "full" => {
            let snapshot = exporter.export_full_json(writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported full database: {} wallets, {} journals, {} adjustments, {} reserve snapshots",
                    snapshot.wallets.len(),
                    snapshot.journals.len(),
                    snapshot.adjustments.len(),
                    snapshot.reserve_snapshots.len()
                );
            }
        }
        _ => {
            anyhow::bail!(
                "Invalid export type '{}'. Valid types: journals, balances, adjustments, snapshots, full",
                export_type
            );
        }
    }

    Ok(())
}

fn print_entry_lines(lines: &[EntryLine]) {
    for line in lines {
        println!(
            "    {:<7} {:<20} {:>10}",
            line.direction,
            line.wallet_name,
            format_cents(line.amount_cents)
        );
    }
}

async fn print_journal_entries(service: &LedgerService, journal: &Journal) -> Result<()> {
    let names = service.get_wallet_names().await?;
    for entry in &journal.entries {
        let name = names
            .get(&entry.wallet_id)
            .map(|s| s.as_str())
            .unwrap_or("?");
        println!(
            "    {:<7} {:<20} {:>10}",
            entry.direction,
            name,
            format_cents(entry.amount_cents)
        );
    }
    Ok(())
}

fn print_credit_warning(student: &str, decision: &CreditDecision, utilization: f64) {
    match decision {
        CreditDecision::Approved { tier } => match tier {
            CreditTier::Clear => {}
            CreditTier::Approaching => println!(
                "Warning: {} has used {} of their credit line",
                student,
                format_utilization(utilization)
            ),
            CreditTier::Critical => println!(
                "Warning: {} is at {} of their credit line",
                student,
                format_utilization(utilization)
            ),
        },
        CreditDecision::Declined { shortfall_cents } => println!(
            "Warning: forced past a declined credit check (short by {})",
            format_cents(*shortfall_cents)
        ),
    }
}

fn format_utilization(utilization: f64) -> String {
    if utilization.is_finite() {
        format!("{:.0}%", utilization * 100.0)
    } else {
        "over".to_string()
    }
}

fn parse_entry_spec(spec: &str, direction: EntryDirection) -> Result<EntrySpec> {
    let (wallet, amount) = spec
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("Entry '{}' must look like WALLET=AMOUNT", spec))?;
    let amount_cents =
        parse_cents(amount).with_context(|| format!("Invalid amount in entry '{}'", spec))?;
    Ok(EntrySpec {
        wallet: wallet.to_string(),
        direction,
        amount_cents,
    })
}

fn reserve_policy(tolerance: Option<String>, critical: Option<String>) -> Result<ReservePolicy> {
    let mut policy = ReservePolicy::default();
    if let Some(t) = tolerance {
        policy.tolerance_cents = parse_cents(&t).context("Invalid tolerance amount")?;
    }
    if let Some(c) = critical {
        policy.critical_shortfall_cents = parse_cents(&c).context("Invalid critical threshold")?;
    }
    Ok(policy)
}

fn parse_timestamp(date: Option<String>) -> Result<DateTime<Utc>> {
    match date {
        Some(date_str) => parse_date(&date_str)
            .with_context(|| format!("Invalid date format '{}'. Use YYYY-MM-DD", date_str)),
        None => Ok(Utc::now()),
    }
}

fn parse_date(date_str: &str) -> Result<DateTime<Utc>> {
    use chrono::NaiveDate;

    let naive_date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .context("Date must be in YYYY-MM-DD format")?;

    let naive_datetime = naive_date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow::anyhow!("Invalid date"))?;

    Ok(DateTime::from_naive_utc_and_offset(naive_datetime, Utc))
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len - 3])
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}
