use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// `vix init`: create the database file and schema.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes. Safe to run repeatedly.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('learning', 'experiment', 'idea', 'action')),
            text TEXT NOT NULL,
            source_path TEXT NOT NULL,
            block_id TEXT NOT NULL,
            ref_source_path TEXT,
            ref_block_id TEXT,
            effort_minutes INTEGER,
            status TEXT CHECK (status IS NULL OR status IN ('inbox', 'doing', 'done', 'dropped')),
            content_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            retired_at INTEGER,
            UNIQUE(source_path, block_id)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create items table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            approved INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create tags table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS item_tags (
            item_id INTEGER NOT NULL,
            tag_id INTEGER NOT NULL,
            PRIMARY KEY (item_id, tag_id),
            FOREIGN KEY (item_id) REFERENCES items(id) ON DELETE CASCADE,
            FOREIGN KEY (tag_id) REFERENCES tags(id)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create item_tags table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS etl_runs (
            id TEXT PRIMARY KEY,
            mode TEXT NOT NULL,
            started_at INTEGER NOT NULL,
            completed_at INTEGER,
            files_scanned INTEGER NOT NULL DEFAULT 0,
            index_lines_total INTEGER NOT NULL DEFAULT 0,
            items_inserted INTEGER NOT NULL DEFAULT 0,
            items_updated INTEGER NOT NULL DEFAULT 0,
            items_unchanged INTEGER NOT NULL DEFAULT 0,
            items_retired INTEGER NOT NULL DEFAULT 0,
            lines_failed INTEGER NOT NULL DEFAULT 0,
            files_failed INTEGER NOT NULL DEFAULT 0,
            errors_json TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create etl_runs table")?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_kind_date ON items(kind, date)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_source_path ON items(source_path)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_item_tags_tag_id ON item_tags(tag_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_etl_runs_started_at ON etl_runs(started_at DESC)")
        .execute(pool)
        .await?;

    Ok(())
}
