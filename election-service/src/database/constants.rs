//! Database migration constants and metadata

/// Current database schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Migration descriptions
pub const MIGRATION_DESCRIPTIONS: &[&str] = &[
    "Election locks, vote receipts and result snapshots",
    "Candidate profiles",
];

/// Default database file name
pub const DEFAULT_DB_PATH: &str = "elections.db";
