//! # Vault Index
//!
//! A local index over Obsidian daily notes.
//!
//! Every daily note (`00.daily/YYYY-MM-DD.md`) ends with an `## INDEX`
//! section listing the learnings, experiments, ideas and actions worth
//! keeping, one per line, each carrying a stable block id:
//!
//! ```text
//! ## INDEX
//! - [idea] Automate daily ETL #topic:workflow ^20251214-i1
//! - [action] Write the parser effort=30 status=inbox #proj:vix ^20251214-a1
//! - [learning] ![[00.daily/2025-12-13.md#^20251213-t1]] #book:DeepWork ^20251214-l1
//! ```
//!
//! `vix reconcile` mirrors those entries into SQLite, keyed by
//! `(source_path, block_id)`, so re-running is idempotent and edits become
//! updates rather than duplicates. Index pages and export packs are then
//! rendered from the database.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────┐
//! │ Daily notes │──▶│  Reconcile  │──▶│  SQLite  │
//! │  ## INDEX   │   │ parse+tags  │   │  items   │
//! └─────────────┘   └─────────────┘   └────┬─────┘
//!                                          │
//!                      ┌───────────────────┤
//!                      ▼                   ▼
//!                 ┌──────────┐       ┌────────────┐
//!                 │  Index   │       │   Export   │
//!                 │  pages   │       │   packs    │
//!                 └──────────┘       └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and vault paths |
//! | [`models`] | Core data types |
//! | [`parser`] | INDEX section grammar |
//! | [`taxonomy`] | Tag approval and aliasing |
//! | [`notes`] | Daily note discovery |
//! | [`block`] | `^id` block lookup |
//! | [`reconcile`] | Notes → database sync |
//! | [`run_log`] | Run records and error log |
//! | [`progress`] | Reconcile progress reporting |
//! | [`store`] | Item queries |
//! | [`build_index`] | Index page rendering |
//! | [`export_pack`] | Export pack rendering |
//! | [`validate`] | Note validation |
//! | [`stats`] | Database statistics |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod block;
pub mod build_index;
pub mod config;
pub mod db;
pub mod export_pack;
pub mod migrate;
pub mod models;
pub mod notes;
pub mod parser;
pub mod progress;
pub mod reconcile;
pub mod run_log;
pub mod stats;
pub mod store;
pub mod taxonomy;
pub mod validate;
