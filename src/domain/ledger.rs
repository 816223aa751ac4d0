use std::collections::HashMap;

use super::money::format_cents;
use super::{Cents, Journal, JournalId, Wallet, WalletId, WalletType};

/// Raw balance of a wallet: total debits minus total credits across all
/// journals. Positive means the wallet sits on the debit side.
pub fn compute_raw_balance(wallet_id: WalletId, journals: &[Journal]) -> Cents {
    journals
        .iter()
        .fold(0, |total, journal| total + journal.raw_effect_on(wallet_id))
}

/// Raw balances for every wallet touched by the given journals.
pub fn compute_all_raw_balances(journals: &[Journal]) -> HashMap<WalletId, Cents> {
    let mut balances: HashMap<WalletId, Cents> = HashMap::new();
    for journal in journals {
        for entry in &journal.entries {
            *balances.entry(entry.wallet_id).or_insert(0) += entry.signed_cents();
        }
    }
    balances
}

/// Flip a raw balance onto the wallet's normal side. A student wallet
/// credited 500.00 has raw balance -50000 but reports as 50000.
pub fn reported_balance(wallet_type: WalletType, raw_cents: Cents) -> Cents {
    raw_cents * wallet_type.balance_sign()
}

/// Balance as shown to users: raw balance adjusted for the normal side.
pub fn compute_balance(wallet: &Wallet, journals: &[Journal]) -> Cents {
    reported_balance(
        wallet.wallet_type,
        compute_raw_balance(wallet.id, journals),
    )
}

/// Net of all signed entries. Zero when every journal balances, which is
/// the trial-balance identity for a closed ledger.
pub fn trial_net(journals: &[Journal]) -> Cents {
    journals
        .iter()
        .map(|j| j.debit_total() - j.credit_total())
        .sum()
}

/// Raw counts gathered by the repository for the integrity audit.
#[derive(Debug, Clone, Default)]
pub struct IntegrityCounts {
    pub wallet_count: i64,
    pub journal_count: i64,
    pub entry_count: i64,
    pub sequence_count: i64,
    pub sequence_min: i64,
    pub sequence_max: i64,
    /// Entries pointing at wallets that do not exist
    pub dangling_entries: i64,
    /// Entries with amounts <= 0
    pub non_positive_entries: i64,
    /// Journals with fewer than 2 entries
    pub undersized_journals: i64,
    pub unbalanced: Vec<UnbalancedJournal>,
    pub trial_net_cents: Cents,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnbalancedJournal {
    pub journal_id: JournalId,
    pub debit_cents: Cents,
    pub credit_cents: Cents,
}

/// Hard defects. Any of these means the ledger data is corrupt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityIssue {
    UnbalancedJournal {
        journal_id: JournalId,
        debit_cents: Cents,
        credit_cents: Cents,
    },
    TrialBalanceOff {
        net_cents: Cents,
    },
    SequenceGaps {
        expected: i64,
        actual: i64,
    },
    DanglingWalletRefs {
        count: i64,
    },
    NonPositiveAmounts {
        count: i64,
    },
    UndersizedJournals {
        count: i64,
    },
}

impl std::fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityIssue::UnbalancedJournal {
                journal_id,
                debit_cents,
                credit_cents,
            } => write!(
                f,
                "journal {} is unbalanced: debits {} vs credits {}",
                journal_id,
                format_cents(*debit_cents),
                format_cents(*credit_cents)
            ),
            IntegrityIssue::TrialBalanceOff { net_cents } => write!(
                f,
                "trial balance is off by {}",
                format_cents(*net_cents)
            ),
            IntegrityIssue::SequenceGaps { expected, actual } => write!(
                f,
                "sequence has gaps: expected {} journals, found {}",
                expected, actual
            ),
            IntegrityIssue::DanglingWalletRefs { count } => {
                write!(f, "{} entries reference missing wallets", count)
            }
            IntegrityIssue::NonPositiveAmounts { count } => {
                write!(f, "{} entries have non-positive amounts", count)
            }
            IntegrityIssue::UndersizedJournals { count } => {
                write!(f, "{} journals have fewer than 2 entries", count)
            }
        }
    }
}

/// A wallet sitting below its floor. Not corruption - forced postings
/// and adjustments can legitimately cause this - but ops wants to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloorBreach {
    pub wallet_name: String,
    pub balance_cents: Cents,
    pub floor_cents: Cents,
}

impl std::fmt::Display for FloorBreach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} is below its floor: balance {}, floor {}",
            self.wallet_name,
            format_cents(self.balance_cents),
            format_cents(self.floor_cents)
        )
    }
}

#[derive(Debug, Clone)]
pub struct IntegrityReport {
    pub wallet_count: i64,
    pub journal_count: i64,
    pub entry_count: i64,
    pub issues: Vec<IntegrityIssue>,
    pub warnings: Vec<FloorBreach>,
}

impl IntegrityReport {
    /// Healthy means no structural defects. Floor breaches are warnings
    /// and do not fail the audit.
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Turn raw repository counts plus reported balances into an audit report.
pub fn build_integrity_report(
    counts: IntegrityCounts,
    wallets: &[Wallet],
    balances: &HashMap<WalletId, Cents>,
) -> IntegrityReport {
    let mut issues = Vec::new();

    for ub in &counts.unbalanced {
        issues.push(IntegrityIssue::UnbalancedJournal {
            journal_id: ub.journal_id,
            debit_cents: ub.debit_cents,
            credit_cents: ub.credit_cents,
        });
    }
    if counts.trial_net_cents != 0 {
        issues.push(IntegrityIssue::TrialBalanceOff {
            net_cents: counts.trial_net_cents,
        });
    }
    if counts.journal_count > 0 {
        let expected = counts.sequence_max - counts.sequence_min + 1;
        if expected != counts.sequence_count {
            issues.push(IntegrityIssue::SequenceGaps {
                expected,
                actual: counts.sequence_count,
            });
        }
    }
    if counts.dangling_entries > 0 {
        issues.push(IntegrityIssue::DanglingWalletRefs {
            count: counts.dangling_entries,
        });
    }
    if counts.non_positive_entries > 0 {
        issues.push(IntegrityIssue::NonPositiveAmounts {
            count: counts.non_positive_entries,
        });
    }
    if counts.undersized_journals > 0 {
        issues.push(IntegrityIssue::UndersizedJournals {
            count: counts.undersized_journals,
        });
    }

    let mut warnings = Vec::new();
    for wallet in wallets {
        if let Some(floor) = wallet.floor_cents() {
            let balance = balances.get(&wallet.id).copied().unwrap_or(0);
            if balance < floor {
                warnings.push(FloorBreach {
                    wallet_name: wallet.name.clone(),
                    balance_cents: balance,
                    floor_cents: floor,
                });
            }
        }
    }

    IntegrityReport {
        wallet_count: counts.wallet_count,
        journal_count: counts.journal_count,
        entry_count: counts.entry_count,
        issues,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::super::journal::{JournalEntry, JournalKind};
    use super::*;

    fn post(entries: Vec<JournalEntry>) -> Journal {
        Journal::new(JournalKind::Manual, entries, Utc::now())
    }

    #[test]
    fn test_compute_raw_balance_empty() {
        let wallet = Uuid::new_v4();
        assert_eq!(compute_raw_balance(wallet, &[]), 0);
    }

    #[test]
    fn test_lesson_flow_balances() {
        let reserve = Uuid::new_v4();
        let student = Uuid::new_v4();
        let instructor = Uuid::new_v4();
        let revenue = Uuid::new_v4();

        let journals = vec![
            // Student tops up 500.00
            post(vec![
                JournalEntry::debit(reserve, 50_000),
                JournalEntry::credit(student, 50_000),
            ]),
            // Flies a 180.00 lesson: 120.00 instructor, 60.00 school
            post(vec![
                JournalEntry::debit(student, 18_000),
                JournalEntry::credit(instructor, 12_000),
                JournalEntry::credit(revenue, 6_000),
            ]),
        ];

        assert_eq!(compute_raw_balance(reserve, &journals), 50_000);
        assert_eq!(compute_raw_balance(student, &journals), -32_000);
        assert_eq!(compute_raw_balance(instructor, &journals), -12_000);

        // Reported balances flip onto the normal side
        assert_eq!(reported_balance(WalletType::Asset, 50_000), 50_000);
        assert_eq!(reported_balance(WalletType::Liability, -32_000), 32_000);
        assert_eq!(reported_balance(WalletType::Liability, -12_000), 12_000);
        assert_eq!(reported_balance(WalletType::Revenue, -6_000), 6_000);
    }

    #[test]
    fn test_raw_balances_sum_to_zero() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        let journals = vec![
            post(vec![
                JournalEntry::debit(a, 1_000),
                JournalEntry::credit(b, 1_000),
            ]),
            post(vec![
                JournalEntry::debit(b, 500),
                JournalEntry::credit(c, 300),
                JournalEntry::credit(a, 200),
            ]),
        ];

        let balances = compute_all_raw_balances(&journals);
        let total: Cents = balances.values().sum();
        assert_eq!(total, 0, "Raw balances must sum to zero (closed system)");
        assert_eq!(trial_net(&journals), 0);
    }

    #[test]
    fn test_compute_balance_uses_normal_side() {
        let wallet = Wallet::student("amelia", "USD");
        let journals = vec![post(vec![
            JournalEntry::debit(Uuid::new_v4(), 7_500),
            JournalEntry::credit(wallet.id, 7_500),
        ])];
        assert_eq!(compute_balance(&wallet, &journals), 7_500);
    }

    #[test]
    fn test_integrity_report_healthy() {
        let counts = IntegrityCounts {
            wallet_count: 4,
            journal_count: 2,
            entry_count: 5,
            sequence_count: 2,
            sequence_min: 1,
            sequence_max: 2,
            ..Default::default()
        };
        let report = build_integrity_report(counts, &[], &HashMap::new());
        assert!(report.is_healthy());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_integrity_report_flags_sequence_gap() {
        let counts = IntegrityCounts {
            journal_count: 3,
            sequence_count: 3,
            sequence_min: 1,
            sequence_max: 5,
            ..Default::default()
        };
        let report = build_integrity_report(counts, &[], &HashMap::new());
        assert!(!report.is_healthy());
        assert!(matches!(
            report.issues[0],
            IntegrityIssue::SequenceGaps {
                expected: 5,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_integrity_report_flags_trial_imbalance() {
        let counts = IntegrityCounts {
            trial_net_cents: 250,
            ..Default::default()
        };
        let report = build_integrity_report(counts, &[], &HashMap::new());
        assert!(matches!(
            report.issues[0],
            IntegrityIssue::TrialBalanceOff { net_cents: 250 }
        ));
    }

    #[test]
    fn test_floor_breach_is_warning_not_issue() {
        let wallet = Wallet::student("amelia", "USD").with_credit_limit(10_000);
        let mut balances = HashMap::new();
        balances.insert(wallet.id, -12_000);

        let report = build_integrity_report(
            IntegrityCounts::default(),
            std::slice::from_ref(&wallet),
            &balances,
        );
        assert!(report.is_healthy());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].wallet_name, "amelia");
        assert_eq!(report.warnings[0].floor_cents, -10_000);
    }
}
