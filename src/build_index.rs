//! Index page generation.
//!
//! Renders one Markdown page per item kind into the index directory, plus
//! one page per group tag value (`book:X` → `books/X.md`) for learnings.
//! Pages contain only data from the database and no timestamps, so an
//! unchanged database renders byte-identical pages. Pages whose content did
//! not change are left untouched on disk. Group pages left over from tag
//! values with no active learnings are removed.

use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::db;
use crate::models::{ItemKind, StoredItem};
use crate::store::{fetch_items, ItemFilter};

/// A rendered page, relative to the index directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPage {
    pub rel_path: PathBuf,
    pub content: String,
}

#[derive(Debug, Default)]
pub struct BuildSummary {
    pub written: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

/// CLI entry point for `vix build-index`.
pub async fn run_build_index(config: &Config, only: &[ItemKind]) -> Result<()> {
    let pool = db::open(config).await?;
    let result = build_indexes(config, &pool, only).await;
    pool.close().await;
    let summary = result?;

    println!("build-index");
    for path in &summary.written {
        println!("  wrote {}", config.vault_relative(path));
    }
    for path in &summary.removed {
        println!("  removed {}", config.vault_relative(path));
    }
    println!("  written: {}", summary.written.len());
    println!("  unchanged: {}", summary.unchanged.len());
    println!("  removed: {}", summary.removed.len());
    println!("ok");
    Ok(())
}

/// Render and write index pages. An empty `only` selects every kind.
pub async fn build_indexes(
    config: &Config,
    pool: &sqlx::SqlitePool,
    only: &[ItemKind],
) -> Result<BuildSummary> {
    let kinds: Vec<ItemKind> = if only.is_empty() {
        ItemKind::ALL.to_vec()
    } else {
        ItemKind::ALL
            .into_iter()
            .filter(|k| only.contains(k))
            .collect()
    };

    let items = fetch_items(
        pool,
        &ItemFilter {
            kinds: kinds.clone(),
            ..Default::default()
        },
    )
    .await?;
    tracing::debug!(items = items.len(), "rendering index pages");

    let pages = plan_pages(&items, &kinds, &config.index.group_prefixes);
    let index_dir = config.index_dir();

    let mut summary = BuildSummary::default();
    let mut planned = HashSet::new();
    for page in pages {
        let path = index_dir.join(&page.rel_path);
        if write_atomic(&path, &page.content)? {
            tracing::info!(path = %path.display(), "index page written");
            summary.written.push(path.clone());
        } else {
            summary.unchanged.push(path.clone());
        }
        planned.insert(path);
    }

    if kinds.contains(&ItemKind::Learning) {
        for prefix in &config.index.group_prefixes {
            let group_dir = index_dir.join(format!("{}s", prefix));
            summary
                .removed
                .extend(remove_stale_pages(&group_dir, &planned)?);
        }
    }
    Ok(summary)
}

/// Delete `.md` pages directly under `dir` that are not in `planned`.
fn remove_stale_pages(dir: &Path, planned: &HashSet<PathBuf>) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut stale: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "md"))
        .filter(|p| !planned.contains(p))
        .collect();
    stale.sort();

    for path in &stale {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove stale page: {}", path.display()))?;
        tracing::info!(path = %path.display(), "stale index page removed");
    }
    Ok(stale)
}

/// All pages for `items`. `items` must already be in index order.
pub fn plan_pages(items: &[StoredItem], kinds: &[ItemKind], group_prefixes: &[String]) -> Vec<IndexPage> {
    let mut pages = Vec::new();

    for kind in kinds {
        let of_kind: Vec<&StoredItem> = items.iter().filter(|i| i.kind == *kind).collect();
        pages.push(IndexPage {
            rel_path: PathBuf::from(format!("{}.md", kind.plural())),
            content: render_kind_page(*kind, &of_kind),
        });
    }

    if kinds.contains(&ItemKind::Learning) {
        for prefix in group_prefixes {
            let tag_prefix = format!("{}:", prefix);
            let mut groups: BTreeMap<&str, Vec<&StoredItem>> = BTreeMap::new();
            for item in items.iter().filter(|i| i.kind == ItemKind::Learning) {
                for tag in &item.tags {
                    if let Some(value) = tag.strip_prefix(&tag_prefix) {
                        groups.entry(value).or_default().push(item);
                    }
                }
            }

            for (value, group) in groups {
                pages.push(IndexPage {
                    rel_path: PathBuf::from(format!("{}s", prefix))
                        .join(format!("{}.md", sanitize_name(value))),
                    content: render_group_page(prefix, value, &group),
                });
            }
        }
    }

    pages
}

pub fn render_kind_page(kind: ItemKind, items: &[&StoredItem]) -> String {
    let mut out = format!("# {}\n\nTotal: {}\n\n", title_case(kind.plural()), items.len());
    if items.is_empty() {
        out.push_str("_No entries._\n");
        return out;
    }
    for item in items {
        out.push_str(&render_line(item, None));
        out.push('\n');
    }
    out
}

pub fn render_group_page(prefix: &str, value: &str, items: &[&StoredItem]) -> String {
    let group_tag = format!("{}:{}", prefix, value);
    let mut out = format!(
        "# {}: {}\n\nTotal: {}\n\n",
        title_case(prefix),
        value,
        items.len()
    );
    for item in items {
        out.push_str(&render_line(item, Some(&group_tag)));
        out.push('\n');
    }
    out
}

fn render_line(item: &StoredItem, skip_tag: Option<&str>) -> String {
    let mut line = String::from("- ");
    if item.kind == ItemKind::Action {
        let status = item.status.as_deref().unwrap_or("-");
        let effort = item
            .effort_minutes
            .map(|m| format!("{}m", m))
            .unwrap_or_else(|| "?m".to_string());
        line.push_str(&format!("[{}|{}] ", status, effort));
    }
    line.push_str(&format!("{}: {}", item.date, item.embed()));
    for tag in &item.tags {
        if Some(tag.as_str()) == skip_tag {
            continue;
        }
        line.push_str(" #");
        line.push_str(tag);
    }
    line
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Make a tag value safe to use as a file name.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Write `content` to `path` via a temp file and rename.
///
/// Returns `false` without touching the file when it already has `content`.
pub fn write_atomic(path: &Path, content: &str) -> Result<bool> {
    if let Ok(existing) = std::fs::read_to_string(path) {
        if existing == content {
            return Ok(false);
        }
    }

    let parent = path
        .parent()
        .with_context(|| format!("Invalid output path: {}", path.display()))?;
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{}.tmp", file_name));
    std::fs::write(&tmp, content)
        .with_context(|| format!("Failed to write temp file: {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(true)
}
