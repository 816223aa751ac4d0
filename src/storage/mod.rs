mod repository;

pub use repository::*;

/// SQL migration for initial ledger schema
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");

/// SQL migration for flight adjustments
pub const MIGRATION_002_ADJUSTMENTS: &str = include_str!("migrations/002_adjustments.sql");

/// SQL migration for reserve snapshots
pub const MIGRATION_003_RESERVE: &str = include_str!("migrations/003_reserve.sql");
