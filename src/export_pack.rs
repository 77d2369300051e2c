//! Export packs: one Markdown document gathering every item with a tag.
//!
//! Each selected item's block is resolved from its note (and the block it
//! embeds, when there is one) so the pack can be read without the vault.
//! The document starts with YAML front matter describing the selection.

use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::PathBuf;

use crate::block::NoteCache;
use crate::build_index::{sanitize_name, write_atomic};
use crate::config::Config;
use crate::db;
use crate::models::{ItemKind, StoredItem};
use crate::store::{fetch_items, ItemFilter};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, clap::ValueEnum)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportRequest {
    /// Tag name without `#`, e.g. `book:DeepWork`.
    pub tag: String,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub kind: Option<ItemKind>,
    pub order: SortOrder,
    /// File name inside the export directory.
    pub output: Option<String>,
}

#[derive(Debug)]
pub struct ExportOutcome {
    pub path: PathBuf,
    pub items: usize,
    pub unresolved: usize,
}

/// An item together with its resolved block text.
#[derive(Debug, Clone)]
pub struct PackEntry {
    pub item: StoredItem,
    pub block: Option<String>,
    pub referenced: Option<String>,
}

#[derive(Serialize)]
struct FrontMatter<'a> {
    title: String,
    generated_at: String,
    source_count: usize,
    filters: Filters<'a>,
}

#[derive(Serialize)]
struct Filters<'a> {
    tag: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
    order: &'static str,
}

/// CLI entry point for `vix export-pack`.
pub async fn run_export_pack(config: &Config, request: &ExportRequest) -> Result<()> {
    if let (Some(from), Some(to)) = (request.from, request.to) {
        if from > to {
            anyhow::bail!("--from {} is after --to {}", from, to);
        }
    }

    let pool = db::open(config).await?;
    let result = export_pack(config, &pool, request, Local::now()).await;
    pool.close().await;

    match result? {
        Some(outcome) => {
            println!("export-pack #{}", request.tag);
            println!("  items: {}", outcome.items);
            println!("  unresolved blocks: {}", outcome.unresolved);
            println!("  wrote {}", config.vault_relative(&outcome.path));
            println!("ok");
        }
        None => {
            println!("export-pack #{}", request.tag);
            println!("  no matching items, nothing written");
        }
    }
    Ok(())
}

/// Build and write the pack. Returns `None` when no item matches.
pub async fn export_pack(
    config: &Config,
    pool: &SqlitePool,
    request: &ExportRequest,
    now: DateTime<Local>,
) -> Result<Option<ExportOutcome>> {
    let tag = request.tag.trim_start_matches('#').to_string();
    let filter = ItemFilter {
        kinds: request.kind.into_iter().collect(),
        tag: Some(tag.clone()),
        from: request.from,
        to: request.to,
        descending: request.order == SortOrder::Desc,
    };
    let items = fetch_items(pool, &filter).await?;
    if items.is_empty() {
        tracing::warn!(tag = %tag, "no items match export filters");
        return Ok(None);
    }

    let mut cache = NoteCache::new(config);
    let mut unresolved = 0;
    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        let block = cache.resolve(&item.source_path, &item.block_id);
        if block.is_none() {
            tracing::warn!(file = %item.source_path, block = %item.block_id, "block not found");
            unresolved += 1;
        }
        let referenced = match (&item.ref_source_path, &item.ref_block_id) {
            (Some(path), Some(id)) => {
                let found = cache.resolve(path, id);
                if found.is_none() {
                    tracing::warn!(file = %path, block = %id, "embedded block not found");
                    unresolved += 1;
                }
                found
            }
            _ => None,
        };
        entries.push(PackEntry {
            item,
            block,
            referenced,
        });
    }

    let request = ExportRequest {
        tag,
        ..request.clone()
    };
    let content = render_pack(&request, &entries, now)?;

    let file_name = pack_file_name(request.output.as_deref(), &request.tag, now);
    let path = config.export_dir().join(file_name);
    write_atomic(&path, &content)?;
    tracing::info!(path = %path.display(), items = entries.len(), "export pack written");

    Ok(Some(ExportOutcome {
        path,
        items: entries.len(),
        unresolved,
    }))
}

/// File name of a pack inside the export directory.
///
/// `--output` is a bare name: separators are replaced, so it never leaves
/// the export directory.
pub fn pack_file_name(output: Option<&str>, tag: &str, now: DateTime<Local>) -> String {
    match output {
        Some(name) => {
            let name = sanitize_name(name);
            if name.ends_with(".md") {
                name
            } else {
                format!("{}.md", name)
            }
        }
        None => format!("{}_{}.md", now.format("%Y%m%d_%H%M%S"), sanitize_name(tag)),
    }
}

/// Render the pack document.
pub fn render_pack(
    request: &ExportRequest,
    entries: &[PackEntry],
    generated_at: DateTime<Local>,
) -> Result<String> {
    let front = FrontMatter {
        title: format!("#{}", request.tag),
        generated_at: generated_at.to_rfc3339(),
        source_count: entries.len(),
        filters: Filters {
            tag: &request.tag,
            from: request.from.map(|d| d.to_string()),
            to: request.to.map(|d| d.to_string()),
            kind: request.kind.map(|k| k.as_str()),
            order: request.order.as_str(),
        },
    };

    let mut out = String::from("---\n");
    out.push_str(&serde_yaml::to_string(&front)?);
    out.push_str("---\n\n");
    out.push_str(&format!("# #{}\n\n", request.tag));
    out.push_str(&format!("Total source blocks: {}\n", entries.len()));

    for entry in entries {
        let item = &entry.item;
        out.push_str(&format!(
            "\n## {} · {} · ^{}\n\n",
            item.date, item.kind, item.block_id
        ));
        out.push_str(&format!("Source: {}\n", item.embed()));
        if !item.tags.is_empty() {
            let tags: Vec<String> = item.tags.iter().map(|t| format!("#{}", t)).collect();
            out.push_str(&format!("Tags: {}\n", tags.join(" ")));
        }
        out.push('\n');
        out.push_str(&quote(entry.block.as_deref(), &item.source_path, &item.block_id));

        if let (Some(path), Some(id)) = (&item.ref_source_path, &item.ref_block_id) {
            out.push_str(&format!("\nEmbeds: ![[{}#^{}]]\n\n", path, id));
            out.push_str(&quote(entry.referenced.as_deref(), path, id));
        }
    }

    Ok(out)
}

fn quote(block: Option<&str>, source_path: &str, block_id: &str) -> String {
    match block {
        Some(text) => text.lines().map(|l| format!("> {}\n", l)).collect(),
        None => format!("> _(block ^{} not found in {})_\n", block_id, source_path),
    }
}
