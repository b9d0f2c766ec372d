//! Database migration implementation (SQLx)

use anyhow::Result;
use sqlx::sqlite::SqlitePool;
use tracing::info;

use super::constants::{CURRENT_SCHEMA_VERSION, MIGRATION_DESCRIPTIONS};
use super::sql::{
    CREATE_CANDIDATE_PROFILES_TABLE_SQL, CREATE_DB_INDEXES_V1, CREATE_ELECTION_LOCKS_TABLE_SQL,
    CREATE_MIGRATIONS_TABLE_SQL, CREATE_RESULT_SNAPSHOTS_TABLE_SQL, CREATE_VOTE_RECEIPTS_TABLE_SQL,
};

/// Run all pending database migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations");

    // Create migrations table if it doesn't exist
    create_migrations_table(pool).await?;

    // Get current version
    let current_version = get_current_version(pool).await?;
    info!(
        "Current database version: {} (target {})",
        current_version, CURRENT_SCHEMA_VERSION
    );

    // Apply migrations in order
    if current_version < 1 {
        apply_migration_v1(pool).await?;
    }
    if current_version < 2 {
        apply_migration_v2(pool).await?;
    }

    info!("All migrations completed");
    Ok(())
}

/// Create the schema_migrations table
async fn create_migrations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(CREATE_MIGRATIONS_TABLE_SQL)
        .execute(pool)
        .await?;
    Ok(())
}

/// Get the current schema version
pub async fn get_current_version(pool: &SqlitePool) -> Result<i32> {
    let version: Option<i32> = sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
        .fetch_one(pool)
        .await
        .unwrap_or(None);
    Ok(version.unwrap_or(0))
}

/// Apply migration version 1: local lifecycle tables and indexes.
async fn apply_migration_v1(pool: &SqlitePool) -> Result<()> {
    info!("Applying migration v1: {}", MIGRATION_DESCRIPTIONS[0]);

    let mut tx = pool.begin().await?;

    sqlx::query(CREATE_ELECTION_LOCKS_TABLE_SQL)
        .execute(&mut *tx)
        .await?;
    sqlx::query(CREATE_VOTE_RECEIPTS_TABLE_SQL)
        .execute(&mut *tx)
        .await?;
    sqlx::query(CREATE_RESULT_SNAPSHOTS_TABLE_SQL)
        .execute(&mut *tx)
        .await?;

    for index_sql in CREATE_DB_INDEXES_V1 {
        sqlx::query(index_sql).execute(&mut *tx).await?;
    }

    record_migration(&mut tx, 1, MIGRATION_DESCRIPTIONS[0]).await?;
    tx.commit().await?;

    info!("Migration v1 completed successfully");
    Ok(())
}

/// Apply migration version 2: candidate profile metadata.
async fn apply_migration_v2(pool: &SqlitePool) -> Result<()> {
    info!("Applying migration v2: {}", MIGRATION_DESCRIPTIONS[1]);

    let mut tx = pool.begin().await?;
    sqlx::query(CREATE_CANDIDATE_PROFILES_TABLE_SQL)
        .execute(&mut *tx)
        .await?;
    record_migration(&mut tx, 2, MIGRATION_DESCRIPTIONS[1]).await?;
    tx.commit().await?;

    info!("Migration v2 completed successfully");
    Ok(())
}

async fn record_migration(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    version: i32,
    description: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
    )
    .bind(version)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(description)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    #[tokio::test]
    async fn migrations_reach_current_version() {
        let db = Database::in_memory().await.unwrap();
        let version = get_current_version(db.pool()).await.unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let db = Database::in_memory().await.unwrap();
        run_migrations(db.pool()).await.unwrap();
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_migrations")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(rows, CURRENT_SCHEMA_VERSION as i64);
    }
}
