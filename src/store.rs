//! Read access to reconciled items.
//!
//! Index pages and export packs both read active (non-retired) items with
//! their tags through [`fetch_items`].

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::models::{ItemKind, StoredItem};

/// Selection of items. Empty fields do not filter.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub kinds: Vec<ItemKind>,
    /// Exact tag name, e.g. `book:DeepWork`.
    pub tag: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub descending: bool,
}

const TAG_SEP: char = '\u{1f}';

/// Active items matching `filter`, ordered by date, block id and source path.
pub async fn fetch_items(pool: &SqlitePool, filter: &ItemFilter) -> Result<Vec<StoredItem>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        r#"
        SELECT i.id, i.date, i.kind, i.text, i.source_path, i.block_id,
               i.ref_source_path, i.ref_block_id, i.effort_minutes, i.status,
               (SELECT GROUP_CONCAT(t.name, char(31))
                  FROM item_tags it JOIN tags t ON t.id = it.tag_id
                 WHERE it.item_id = i.id) AS tag_names
        FROM items i
        WHERE i.retired_at IS NULL
        "#,
    );

    if !filter.kinds.is_empty() {
        qb.push(" AND i.kind IN (");
        let mut kinds = qb.separated(", ");
        for kind in &filter.kinds {
            kinds.push_bind(kind.as_str());
        }
        kinds.push_unseparated(")");
    }
    if let Some(ref tag) = filter.tag {
        qb.push(
            " AND EXISTS (SELECT 1 FROM item_tags it JOIN tags t ON t.id = it.tag_id \
             WHERE it.item_id = i.id AND t.name = ",
        );
        qb.push_bind(tag.clone());
        qb.push(")");
    }
    if let Some(from) = filter.from {
        qb.push(" AND i.date >= ");
        qb.push_bind(from.format("%Y-%m-%d").to_string());
    }
    if let Some(to) = filter.to {
        qb.push(" AND i.date <= ");
        qb.push_bind(to.format("%Y-%m-%d").to_string());
    }

    if filter.descending {
        qb.push(" ORDER BY i.date DESC, i.block_id DESC, i.source_path DESC");
    } else {
        qb.push(" ORDER BY i.date ASC, i.block_id ASC, i.source_path ASC");
    }

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to query items")?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        let kind_str: String = row.get("kind");
        let kind = kind_str
            .parse::<ItemKind>()
            .map_err(|e| anyhow::anyhow!("corrupt item row {}: {}", row.get::<i64, _>("id"), e))?;

        let tag_names: Option<String> = row.get("tag_names");
        let mut tags: Vec<String> = tag_names
            .map(|s| s.split(TAG_SEP).map(str::to_string).collect())
            .unwrap_or_default();
        tags.sort();

        items.push(StoredItem {
            id: row.get("id"),
            date: row.get("date"),
            kind,
            text: row.get("text"),
            source_path: row.get("source_path"),
            block_id: row.get("block_id"),
            ref_source_path: row.get("ref_source_path"),
            ref_block_id: row.get("ref_block_id"),
            effort_minutes: row.get("effort_minutes"),
            status: row.get("status"),
            tags,
        });
    }

    Ok(items)
}

/// Number of retired items still kept in the database.
pub async fn retired_count(pool: &SqlitePool) -> Result<i64> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE retired_at IS NOT NULL")
        .fetch_one(pool)
        .await?;
    Ok(n)
}
