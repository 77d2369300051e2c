//! Reconciliation run bookkeeping.
//!
//! Tracks per-run counters and recoverable errors, persists one row in
//! `etl_runs` per non-dry run, and appends errors to the vault's structured
//! error log (one JSON object per line).

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::io::Write;
use std::path::Path;

/// Outcome of reconciling a single entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// A recoverable failure recorded during a run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RunError {
    pub file: String,
    /// 1-based line number, `0` when the whole file is affected.
    pub line_no: usize,
    pub line: String,
    pub reason: String,
}

/// Counters for one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub files_scanned: u64,
    pub files_failed: u64,
    pub index_lines_total: u64,
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub retired: u64,
    pub lines_failed: u64,
    pub tags_unapproved: u64,
    pub errors: Vec<RunError>,
}

impl RunStats {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    /// Record a failed INDEX line.
    pub fn line_error(&mut self, file: &str, line_no: usize, line: &str, reason: String) {
        self.lines_failed += 1;
        self.errors.push(RunError {
            file: file.to_string(),
            line_no,
            line: line.to_string(),
            reason,
        });
    }

    /// Record a file that could not be processed at all.
    pub fn file_error(&mut self, file: &str, reason: String) {
        self.files_failed += 1;
        self.errors.push(RunError {
            file: file.to_string(),
            line_no: 0,
            line: String::new(),
            reason,
        });
    }

    pub fn summary(&self) -> String {
        format!(
            "  files scanned: {}\n  files failed: {}\n  index lines: {}\n  inserted: {}\n  updated: {}\n  unchanged: {}\n  retired: {}\n  lines failed: {}\n  unapproved tags: {}",
            self.files_scanned,
            self.files_failed,
            self.index_lines_total,
            self.inserted,
            self.updated,
            self.unchanged,
            self.retired,
            self.lines_failed,
            self.tags_unapproved
        )
    }
}

/// Insert the run row at the start of a run.
pub async fn begin_run(pool: &SqlitePool, run_id: &str, mode: &str, started_at: i64) -> Result<()> {
    sqlx::query("INSERT INTO etl_runs (id, mode, started_at) VALUES (?, ?, ?)")
        .bind(run_id)
        .bind(mode)
        .bind(started_at)
        .execute(pool)
        .await
        .context("Failed to record ETL run start")?;
    Ok(())
}

/// Write the final counters. Only touches rows that are not yet completed.
pub async fn finish_run(
    pool: &SqlitePool,
    run_id: &str,
    stats: &RunStats,
    completed_at: i64,
) -> Result<()> {
    let errors_json = serde_json::to_string(&stats.errors)?;
    sqlx::query(
        r#"
        UPDATE etl_runs SET
            completed_at = ?,
            files_scanned = ?,
            index_lines_total = ?,
            items_inserted = ?,
            items_updated = ?,
            items_unchanged = ?,
            items_retired = ?,
            lines_failed = ?,
            files_failed = ?,
            errors_json = ?
        WHERE id = ? AND completed_at IS NULL
        "#,
    )
    .bind(completed_at)
    .bind(stats.files_scanned as i64)
    .bind(stats.index_lines_total as i64)
    .bind(stats.inserted as i64)
    .bind(stats.updated as i64)
    .bind(stats.unchanged as i64)
    .bind(stats.retired as i64)
    .bind(stats.lines_failed as i64)
    .bind(stats.files_failed as i64)
    .bind(&errors_json)
    .bind(run_id)
    .execute(pool)
    .await
    .context("Failed to finalize ETL run record")?;
    Ok(())
}

#[derive(Serialize)]
struct ErrorLogRecord<'a> {
    run_id: &'a str,
    timestamp: String,
    #[serde(flatten)]
    error: &'a RunError,
}

/// Append errors to the structured error log, one JSON object per line.
pub fn append_error_log(path: &Path, run_id: &str, errors: &[RunError]) -> Result<()> {
    if errors.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open error log: {}", path.display()))?;

    let timestamp = chrono::Utc::now().to_rfc3339();
    for error in errors {
        let record = ErrorLogRecord {
            run_id,
            timestamp: timestamp.clone(),
            error,
        };
        writeln!(file, "{}", serde_json::to_string(&record)?)?;
    }
    Ok(())
}

/// A completed or in-progress run as stored in `etl_runs`.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: String,
    pub mode: String,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub files_scanned: i64,
    pub items_inserted: i64,
    pub items_updated: i64,
    pub items_unchanged: i64,
    pub items_retired: i64,
    pub lines_failed: i64,
}

/// Most recent runs first.
pub async fn recent_runs(pool: &SqlitePool, limit: i64) -> Result<Vec<RunRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, mode, started_at, completed_at, files_scanned, items_inserted,
               items_updated, items_unchanged, items_retired, lines_failed
        FROM etl_runs
        ORDER BY started_at DESC, rowid DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| RunRecord {
            id: row.get("id"),
            mode: row.get("mode"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
            files_scanned: row.get("files_scanned"),
            items_inserted: row.get("items_inserted"),
            items_updated: row.get("items_updated"),
            items_unchanged: row.get("items_unchanged"),
            items_retired: row.get("items_retired"),
            lines_failed: row.get("lines_failed"),
        })
        .collect())
}
