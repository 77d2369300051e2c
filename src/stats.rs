//! Database statistics and health overview.
//!
//! Summarizes what the reconciler has stored: item counts per kind, action
//! statuses, the most used tags, and the latest ETL runs. Used by
//! `vix stats` to confirm that reconciles are doing what you expect.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;
use crate::run_log::recent_runs;
use crate::store::retired_count;

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::open(config).await?;
    let db_path = config.db_path();

    let total_items: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE retired_at IS NULL")
            .fetch_one(&pool)
            .await?;
    let retired = retired_count(&pool).await?;

    let db_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    println!("Vault Index — Database Stats");
    println!("============================");
    println!();
    println!("  Database:    {}", db_path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Items:       {}", total_items);
    println!("  Retired:     {}", retired);

    let kind_rows = sqlx::query(
        r#"
        SELECT kind, COUNT(*) AS n
        FROM items
        WHERE retired_at IS NULL
        GROUP BY kind
        ORDER BY kind
        "#,
    )
    .fetch_all(&pool)
    .await?;

    if !kind_rows.is_empty() {
        println!();
        println!("  By kind:");
        for row in &kind_rows {
            let kind: String = row.get("kind");
            let n: i64 = row.get("n");
            println!("    {:<12} {:>6}", kind, n);
        }
    }

    let status_rows = sqlx::query(
        r#"
        SELECT COALESCE(status, '-') AS status, COUNT(*) AS n
        FROM items
        WHERE retired_at IS NULL AND kind = 'action'
        GROUP BY status
        ORDER BY status
        "#,
    )
    .fetch_all(&pool)
    .await?;

    if !status_rows.is_empty() {
        println!();
        println!("  Actions by status:");
        for row in &status_rows {
            let status: String = row.get("status");
            let n: i64 = row.get("n");
            println!("    {:<12} {:>6}", status, n);
        }
    }

    let tag_rows = sqlx::query(
        r#"
        SELECT t.name, t.approved, COUNT(*) AS n
        FROM item_tags it
        JOIN tags t ON t.id = it.tag_id
        JOIN items i ON i.id = it.item_id
        WHERE i.retired_at IS NULL
        GROUP BY t.id
        ORDER BY n DESC, t.name ASC
        LIMIT 10
        "#,
    )
    .fetch_all(&pool)
    .await?;

    if !tag_rows.is_empty() {
        println!();
        println!("  Top tags:");
        for row in &tag_rows {
            let name: String = row.get("name");
            let approved: bool = row.get("approved");
            let n: i64 = row.get("n");
            println!(
                "    #{:<28} {:>6}{}",
                name,
                n,
                if approved { "" } else { "  (unapproved)" }
            );
        }
    }

    let runs = recent_runs(&pool, 5).await?;
    if !runs.is_empty() {
        println!();
        println!("  Recent runs:");
        println!(
            "    {:<10} {:>6} {:>6} {:>6} {:>6} {:>6}   {}",
            "MODE", "FILES", "NEW", "UPD", "RET", "FAIL", "STARTED"
        );
        println!("    {}", "-".repeat(66));
        for run in &runs {
            let started = if run.completed_at.is_some() {
                format_ts_relative(run.started_at)
            } else {
                format!("{} (incomplete)", format_ts_relative(run.started_at))
            };
            println!(
                "    {:<10} {:>6} {:>6} {:>6} {:>6} {:>6}   {}",
                run.mode,
                run.files_scanned,
                run.items_inserted,
                run.items_updated,
                run.items_retired,
                run.lines_failed,
                started
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_format_ts_relative() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 2 * 3600 - 5), "2 hours ago");
        assert_eq!(format_ts_relative(0), "1970-01-01 00:00");
    }
}
