//! Database initialization
//!
//! Creates the connection pool and the schema on first run. Schema creation
//! is idempotent (`CREATE TABLE IF NOT EXISTS`), so startup is safe against
//! an existing database.
//!
//! The `codes.code_value` UNIQUE constraint is the sole arbiter of code
//! uniqueness; application code never pre-checks, it inserts and reacts to
//! the constraint violation.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL allows concurrent readers while the fan-out tasks write status rows
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;
    Ok(pool)
}

/// In-memory database for tests
///
/// Capped at one connection: with `sqlite::memory:`, every pool connection
/// would otherwise get its own private database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    create_schema(&pool).await?;
    Ok(pool)
}

async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_users_table(pool).await?;
    create_sessions_table(pool).await?;
    create_distributions_table(pool).await?;
    create_codes_table(pool).await?;
    create_payment_events_table(pool).await?;
    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT UNIQUE NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_sessions_table(pool: &SqlitePool) -> Result<()> {
    // Tokens are minted by the upstream auth flow; this service only resolves
    // them to a user id.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            token TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users(id),
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_distributions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS distributions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id),
            title TEXT NOT NULL,
            artist TEXT NOT NULL,
            file_url TEXT NOT NULL,
            cover_art_url TEXT,
            youtube_status TEXT NOT NULL DEFAULT 'pending',
            youtube_url TEXT,
            spotify_status TEXT NOT NULL DEFAULT 'pending',
            spotify_url TEXT,
            soundcloud_status TEXT NOT NULL DEFAULT 'pending',
            soundcloud_url TEXT,
            isrc_code TEXT,
            upc_code TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_codes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS codes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id),
            code_type TEXT NOT NULL CHECK (code_type IN ('UPC', 'ISRC')),
            code_value TEXT UNIQUE NOT NULL,
            is_used INTEGER NOT NULL DEFAULT 0,
            distribution_id INTEGER REFERENCES distributions(id),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_payment_events_table(pool: &SqlitePool) -> Result<()> {
    // Idempotency ledger for webhook fulfillment: the primary key on the
    // provider's event id arbitrates duplicate deliveries.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS payment_events (
            event_id TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            code_type TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            processed_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_database_has_schema() {
        let pool = init_memory_database().await.expect("init");

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .expect("list tables");

        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        for expected in ["users", "sessions", "distributions", "codes", "payment_events"] {
            assert!(names.contains(&expected), "missing table {}", expected);
        }
    }

    #[tokio::test]
    async fn code_value_unique_constraint_enforced() {
        let pool = init_memory_database().await.expect("init");

        sqlx::query("INSERT INTO users (email, created_at) VALUES ('a@b.c', '2026-01-01')")
            .execute(&pool)
            .await
            .expect("seed user");

        let insert = "INSERT INTO codes (user_id, code_type, code_value, created_at, updated_at)
                      VALUES (1, 'UPC', '004815162342', '2026-01-01', '2026-01-01')";
        sqlx::query(insert).execute(&pool).await.expect("first insert");

        let err = sqlx::query(insert).execute(&pool).await.expect_err("duplicate");
        let db_err = err.as_database_error().expect("database error");
        assert!(db_err.is_unique_violation());
    }

    #[tokio::test]
    async fn file_database_initializes_and_reopens() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("trackwire.db");

        let pool = init_database(&path).await.expect("create");
        drop(pool);

        // Second open must not fail on existing tables
        let pool = init_database(&path).await.expect("reopen");
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM codes")
            .fetch_one(&pool)
            .await
            .expect("query");
        assert_eq!(count.0, 0);
    }
}
