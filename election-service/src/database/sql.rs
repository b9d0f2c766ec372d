//! SQL statement constants for database operations

pub const CREATE_MIGRATIONS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL,
    description TEXT NOT NULL
)
"#;

pub const CREATE_ELECTION_LOCKS_TABLE_SQL: &str = r#"
CREATE TABLE election_locks (
    election_id INTEGER PRIMARY KEY,
    opened_once INTEGER NOT NULL DEFAULT 0,
    opened_at TEXT
)
"#;

pub const CREATE_VOTE_RECEIPTS_TABLE_SQL: &str = r#"
CREATE TABLE vote_receipts (
    voter_id TEXT NOT NULL,
    election_id INTEGER NOT NULL,
    candidate_id INTEGER NOT NULL,
    tx_hash TEXT NOT NULL,
    mode TEXT NOT NULL, -- signed_relay | server_relay
    created_at TEXT NOT NULL,
    PRIMARY KEY (voter_id, election_id)
)
"#;

pub const CREATE_RESULT_SNAPSHOTS_TABLE_SQL: &str = r#"
CREATE TABLE result_snapshots (
    election_id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    total_votes INTEGER NOT NULL,
    results TEXT NOT NULL, -- json
    snapshot_at TEXT NOT NULL,
    published INTEGER NOT NULL DEFAULT 0,
    published_at TEXT,
    start_time TEXT,
    end_time TEXT
)
"#;

pub const CREATE_CANDIDATE_PROFILES_TABLE_SQL: &str = r#"
CREATE TABLE candidate_profiles (
    election_id INTEGER NOT NULL,
    candidate_id INTEGER NOT NULL,
    tagline TEXT,
    about TEXT,
    vision TEXT,
    mission TEXT,
    programme TEXT,
    photo_url TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (election_id, candidate_id)
)
"#;

pub const CREATE_DB_INDEXES_V1: &[&str] = &[
    "CREATE INDEX idx_receipts_election ON vote_receipts(election_id, created_at)",
    "CREATE INDEX idx_receipts_voter ON vote_receipts(voter_id, created_at)",
    "CREATE INDEX idx_snapshots_published ON result_snapshots(published, published_at)",
];
