use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::{Cents, ProcessorBalance};

/// Boundary to the hosted payment processor. The production integration
/// is an HTTP API; this crate ships a statement-file reader for the
/// exports operators already pull from the processor dashboard, plus a
/// fixed-value implementation for tests and ad-hoc checks.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn fetch_balance(&self) -> Result<ProcessorBalance>;
}

/// JSON balance statement as exported from the processor dashboard.
#[derive(Debug, Deserialize)]
struct BalanceStatement {
    available_cents: Cents,
    pending_cents: Cents,
    as_of: Option<DateTime<Utc>>,
}

/// Reads the processor balance from a JSON statement file. The file is
/// re-read on every fetch so a monitor loop picks up fresh exports.
pub struct StatementFileProcessor {
    path: PathBuf,
}

impl StatementFileProcessor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PaymentProcessor for StatementFileProcessor {
    async fn fetch_balance(&self) -> Result<ProcessorBalance> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read statement file {}", self.path.display()))?;
        let statement: BalanceStatement = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid statement file {}", self.path.display()))?;
        Ok(ProcessorBalance {
            available_cents: statement.available_cents,
            pending_cents: statement.pending_cents,
            as_of: statement.as_of.unwrap_or_else(Utc::now),
        })
    }
}

/// Fixed balance, for tests and for CLI checks where the operator types
/// the processor figures directly.
pub struct StaticProcessor {
    balance: ProcessorBalance,
}

impl StaticProcessor {
    pub fn new(available_cents: Cents, pending_cents: Cents) -> Self {
        Self {
            balance: ProcessorBalance {
                available_cents,
                pending_cents,
                as_of: Utc::now(),
            },
        }
    }
}

#[async_trait]
impl PaymentProcessor for StaticProcessor {
    async fn fetch_balance(&self) -> Result<ProcessorBalance> {
        Ok(self.balance)
    }
}
