//! Note-to-database reconciliation.
//!
//! Coordinates the sync flow: discover notes → parse INDEX sections →
//! normalize tags → fingerprint → upsert by `(source_path, block_id)`.
//! Each entry is committed in its own transaction, so an interrupted run
//! leaves finished entries durable and is safe to re-run.
//!
//! Blocks that disappear from a note are retired (or deleted, depending on
//! `reconcile.stale_items`). Retirement only happens for notes that were
//! read and had an INDEX section, so a read failure never wipes rows.

use anyhow::Result;
use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::collections::HashSet;
use uuid::Uuid;

use crate::config::{Config, StalePolicy};
use crate::db;
use crate::models::{Entry, Window};
use crate::notes::discover_notes;
use crate::parser::parse_note;
use crate::progress::{ProgressEvent, ProgressMode, ProgressReporter};
use crate::run_log::{self, RunStats, UpsertOutcome};
use crate::taxonomy::{NormalizedTag, Taxonomy};

#[derive(Debug, Clone, Copy)]
pub struct ReconcileOptions {
    pub window: Window,
    pub dry_run: bool,
    /// Reference date for `Window::Since`.
    pub today: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct ReconcileReport {
    /// `None` for dry runs, which persist nothing.
    pub run_id: Option<String>,
    pub stats: RunStats,
}

/// CLI entry point for `vix reconcile`.
pub async fn run_reconcile(
    config: &Config,
    window: Window,
    dry_run: bool,
    progress: ProgressMode,
) -> Result<()> {
    let taxonomy = Taxonomy::load(&config.taxonomy_path())?;
    let pool = db::open(config).await?;

    let options = ReconcileOptions {
        window,
        dry_run,
        today: chrono::Local::now().date_naive(),
    };
    let reporter = progress.reporter();
    let report = reconcile(config, &pool, &taxonomy, options, reporter.as_ref()).await;
    pool.close().await;
    let report = report?;

    if dry_run {
        println!("reconcile {} (dry-run)", window.label());
    } else {
        println!("reconcile {}", window.label());
    }
    println!("{}", report.stats.summary());

    if !report.stats.errors.is_empty() {
        println!();
        println!("errors:");
        for error in &report.stats.errors {
            if error.line_no == 0 {
                println!("  {}: {}", error.file, error.reason);
            } else {
                println!("  {}:{}: {}", error.file, error.line_no, error.reason);
            }
        }
        if !dry_run {
            println!("  (logged to {})", config.error_log_path().display());
        }
    }
    println!("ok");

    Ok(())
}

/// Reconcile the notes selected by `options.window` into the database.
pub async fn reconcile(
    config: &Config,
    pool: &SqlitePool,
    taxonomy: &Taxonomy,
    options: ReconcileOptions,
    reporter: &dyn ProgressReporter,
) -> Result<ReconcileReport> {
    let now = chrono::Utc::now().timestamp();
    let mut stats = RunStats::default();

    reporter.report(ProgressEvent::Discovering);
    let discovery = discover_notes(config, options.window, options.today)?;
    for path in &discovery.misnamed {
        tracing::warn!(path = %path.display(), "skipping file with non-date name");
    }

    let run_id = if options.dry_run {
        tracing::info!("dry run, no database writes");
        None
    } else {
        let id = Uuid::new_v4().to_string();
        run_log::begin_run(pool, &id, &options.window.label(), now).await?;
        Some(id)
    };

    tracing::info!(notes = discovery.notes.len(), "reconciling daily notes");
    let total = discovery.notes.len() as u64;

    for (i, note) in discovery.notes.iter().enumerate() {
        stats.files_scanned += 1;

        let content = match std::fs::read_to_string(&note.path) {
            Ok(content) => content,
            Err(e) => {
                tracing::error!(file = %note.source_path, error = %e, "failed to read note");
                stats.file_error(&note.source_path, format!("file read error: {}", e));
                continue;
            }
        };

        let parsed = parse_note(&content, note.date, &note.source_path);
        stats.index_lines_total += parsed.index_lines as u64;

        for error in &parsed.errors {
            tracing::debug!(file = %note.source_path, "{}", error);
            if error.line_no == 0 {
                stats.file_error(&note.source_path, error.kind.to_string());
            } else {
                stats.line_error(
                    &note.source_path,
                    error.line_no,
                    &error.line,
                    error.kind.to_string(),
                );
            }
        }

        let mut seen: HashSet<String> = HashSet::new();
        for entry in &parsed.entries {
            let tags = taxonomy.normalize_all(&entry.tags);
            for tag in tags.iter().filter(|t| !t.is_approved()) {
                tracing::warn!(
                    file = %note.source_path,
                    block = %entry.block_id,
                    tag = %tag.name,
                    "unapproved tag"
                );
                stats.tags_unapproved += 1;
            }

            let hash = content_hash(entry, &tags);
            let outcome = upsert_entry(pool, entry, &tags, &hash, now, options.dry_run).await?;
            stats.record(outcome);
            seen.insert(entry.block_id.clone());
        }

        if parsed.has_index() {
            stats.retired += retire_missing(
                pool,
                &note.source_path,
                &seen,
                config.reconcile.stale_items,
                now,
                options.dry_run,
            )
            .await?;
        }

        reporter.report(ProgressEvent::Reconciling {
            n: i as u64 + 1,
            total,
        });
    }

    // Notes deleted from the vault can only be detected on a full scan.
    if options.window == Window::Full {
        let scanned: HashSet<&str> = discovery
            .notes
            .iter()
            .map(|n| n.source_path.as_str())
            .collect();
        let active: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT source_path FROM items WHERE retired_at IS NULL")
                .fetch_all(pool)
                .await?;
        for source_path in active.iter().filter(|p| !scanned.contains(p.as_str())) {
            tracing::info!(file = %source_path, "note no longer present");
            stats.retired += retire_missing(
                pool,
                source_path,
                &HashSet::new(),
                config.reconcile.stale_items,
                now,
                options.dry_run,
            )
            .await?;
        }
    }

    if let Some(ref id) = run_id {
        run_log::finish_run(pool, id, &stats, chrono::Utc::now().timestamp()).await?;
        if let Err(e) = run_log::append_error_log(&config.error_log_path(), id, &stats.errors) {
            tracing::error!(error = %e, "failed to write error log");
        }
    }

    if stats.lines_failed + stats.files_failed > 0 {
        tracing::warn!(
            lines_failed = stats.lines_failed,
            files_failed = stats.files_failed,
            "reconcile finished with errors"
        );
    }

    Ok(ReconcileReport { run_id, stats })
}

/// Fingerprint of everything that an upsert would write for an entry.
///
/// Tags are sorted, so reordering them in the note is not a change.
pub fn content_hash(entry: &Entry, tags: &[NormalizedTag]) -> String {
    let mut names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
    names.sort_unstable();

    let effort = entry
        .kind
        .effort_minutes()
        .map(|e| e.to_string())
        .unwrap_or_default();
    let status = entry.kind.status().map(|s| s.as_str()).unwrap_or("");
    let (ref_path, ref_block) = entry
        .reference
        .as_ref()
        .map(|r| (r.source_path.as_str(), r.block_id.as_str()))
        .unwrap_or(("", ""));

    let mut hasher = Sha256::new();
    for field in [
        entry.kind.kind().as_str(),
        entry.text.as_str(),
        effort.as_str(),
        status,
        ref_path,
        ref_block,
    ] {
        hasher.update(field.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(names.join("\u{1f}").as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Refresh the `approved` flag of tags linked to an unchanged item.
/// Approval is not part of the fingerprint.
async fn sync_tag_approval(pool: &SqlitePool, tags: &[NormalizedTag]) -> Result<()> {
    for tag in tags {
        sqlx::query("UPDATE tags SET approved = ? WHERE name = ? AND approved != ?")
            .bind(tag.is_approved())
            .bind(&tag.name)
            .bind(tag.is_approved())
            .execute(pool)
            .await?;
    }
    Ok(())
}

async fn upsert_entry(
    pool: &SqlitePool,
    entry: &Entry,
    tags: &[NormalizedTag],
    hash: &str,
    now: i64,
    dry_run: bool,
) -> Result<UpsertOutcome> {
    let existing: Option<(i64, String, Option<i64>)> = sqlx::query_as(
        "SELECT id, content_hash, retired_at FROM items WHERE source_path = ? AND block_id = ?",
    )
    .bind(&entry.source_path)
    .bind(&entry.block_id)
    .fetch_optional(pool)
    .await?;

    let outcome = match &existing {
        None => UpsertOutcome::Inserted,
        Some((_, old_hash, None)) if old_hash == hash => {
            if !dry_run {
                sync_tag_approval(pool, tags).await?;
            }
            return Ok(UpsertOutcome::Unchanged);
        }
        Some(_) => UpsertOutcome::Updated,
    };
    if dry_run {
        return Ok(outcome);
    }

    let date = entry.date.format("%Y-%m-%d").to_string();
    let effort = entry.kind.effort_minutes().map(i64::from);
    let status = entry.kind.status().map(|s| s.as_str());
    let ref_path = entry.reference.as_ref().map(|r| r.source_path.as_str());
    let ref_block = entry.reference.as_ref().map(|r| r.block_id.as_str());

    let mut tx = pool.begin().await?;

    let item_id = match existing {
        Some((id, _, _)) => {
            sqlx::query(
                r#"
                UPDATE items SET
                    date = ?,
                    kind = ?,
                    text = ?,
                    ref_source_path = ?,
                    ref_block_id = ?,
                    effort_minutes = ?,
                    status = ?,
                    content_hash = ?,
                    updated_at = ?,
                    retired_at = NULL
                WHERE id = ?
                "#,
            )
            .bind(&date)
            .bind(entry.kind.kind().as_str())
            .bind(&entry.text)
            .bind(ref_path)
            .bind(ref_block)
            .bind(effort)
            .bind(status)
            .bind(hash)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
            id
        }
        None => sqlx::query(
            r#"
            INSERT INTO items (date, kind, text, source_path, block_id, ref_source_path, ref_block_id,
                               effort_minutes, status, content_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&date)
        .bind(entry.kind.kind().as_str())
        .bind(&entry.text)
        .bind(&entry.source_path)
        .bind(&entry.block_id)
        .bind(ref_path)
        .bind(ref_block)
        .bind(effort)
        .bind(status)
        .bind(hash)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid(),
    };

    sqlx::query("DELETE FROM item_tags WHERE item_id = ?")
        .bind(item_id)
        .execute(&mut *tx)
        .await?;

    for tag in tags {
        sqlx::query(
            r#"
            INSERT INTO tags (name, approved) VALUES (?, ?)
            ON CONFLICT(name) DO UPDATE SET approved = excluded.approved
            "#,
        )
        .bind(&tag.name)
        .bind(tag.is_approved())
        .execute(&mut *tx)
        .await?;

        let tag_id: i64 = sqlx::query_scalar("SELECT id FROM tags WHERE name = ?")
            .bind(&tag.name)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("INSERT OR IGNORE INTO item_tags (item_id, tag_id) VALUES (?, ?)")
            .bind(item_id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(outcome)
}

/// Retire (or delete) active rows of `source_path` whose block id is not in `seen`.
async fn retire_missing(
    pool: &SqlitePool,
    source_path: &str,
    seen: &HashSet<String>,
    policy: StalePolicy,
    now: i64,
    dry_run: bool,
) -> Result<u64> {
    let rows: Vec<(i64, String)> = sqlx::query_as(
        "SELECT id, block_id FROM items WHERE source_path = ? AND retired_at IS NULL",
    )
    .bind(source_path)
    .fetch_all(pool)
    .await?;

    let stale: Vec<(i64, String)> = rows
        .into_iter()
        .filter(|(_, block_id)| !seen.contains(block_id))
        .collect();
    if dry_run || stale.is_empty() {
        return Ok(stale.len() as u64);
    }

    for (id, block_id) in &stale {
        tracing::info!(file = %source_path, block = %block_id, ?policy, "stale item");
        let mut tx = pool.begin().await?;
        match policy {
            StalePolicy::Retire => {
                sqlx::query("UPDATE items SET retired_at = ?, updated_at = ? WHERE id = ?")
                    .bind(now)
                    .bind(now)
                    .bind(*id)
                    .execute(&mut *tx)
                    .await?;
            }
            StalePolicy::Delete => {
                sqlx::query("DELETE FROM item_tags WHERE item_id = ?")
                    .bind(*id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("DELETE FROM items WHERE id = ?")
                    .bind(*id)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;
    }

    Ok(stale.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_index_line;

    fn entry(line: &str) -> Entry {
        let date = NaiveDate::from_ymd_opt(2025, 12, 14).unwrap();
        parse_index_line(line, date, "00.daily/2025-12-14.md", 1).unwrap()
    }

    fn hash_of(line: &str) -> String {
        let e = entry(line);
        let tags = Taxonomy::default().normalize_all(&e.tags);
        content_hash(&e, &tags)
    }

    #[test]
    fn test_tag_order_does_not_matter() {
        assert_eq!(
            hash_of("- [learning] Test content #topic:test #tech:python ^20251214-l1"),
            hash_of("- [learning] Test content #tech:python #topic:test ^20251214-l1")
        );
    }

    #[test]
    fn test_text_and_meta_changes_change_hash() {
        let base = hash_of("- [action] Ship effort=30 status=inbox ^20251214-a1");
        assert_ne!(base, hash_of("- [action] Ship it effort=30 status=inbox ^20251214-a1"));
        assert_ne!(base, hash_of("- [action] Ship effort=30 status=done ^20251214-a1"));
        assert_ne!(base, hash_of("- [action] Ship effort=45 status=inbox ^20251214-a1"));
        assert_ne!(base, hash_of("- [action] Ship status=inbox ^20251214-a1"));
    }

    #[test]
    fn test_block_id_not_part_of_hash() {
        assert_eq!(
            hash_of("- [idea] Same #topic:x ^20251214-i1"),
            hash_of("- [idea] Same #topic:x ^20251214-i2")
        );
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let h = hash_of("- [idea] Automate daily ETL #topic:workflow ^20251214-i1");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
