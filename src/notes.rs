//! Daily note discovery.
//!
//! Walks the daily directory, applies the include/exclude globs and the
//! date window, and returns the notes in date order.

use anyhow::{bail, Result};
use chrono::NaiveDate;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::PathBuf;
use walkdir::WalkDir;

use crate::config::Config;
use crate::models::Window;
use crate::parser::date_from_filename;

/// A daily note selected for processing.
#[derive(Debug, Clone)]
pub struct NoteFile {
    pub path: PathBuf,
    /// Vault-relative path, e.g. `00.daily/2025-12-14.md`.
    pub source_path: String,
    pub date: NaiveDate,
}

#[derive(Debug, Default)]
pub struct Discovery {
    pub notes: Vec<NoteFile>,
    /// Files matching the globs whose names are not `YYYY-MM-DD.md`.
    pub misnamed: Vec<PathBuf>,
}

/// Find daily notes inside `window`, relative to `today`.
pub fn discover_notes(config: &Config, window: Window, today: NaiveDate) -> Result<Discovery> {
    let daily_dir = config.daily_dir();
    if !daily_dir.is_dir() {
        bail!("Daily directory not found: {}", daily_dir.display());
    }

    let include_set = build_globset(&config.daily.include_globs)?;
    let exclude_set = build_globset(&config.daily.exclude_globs)?;
    let cutoff = window.cutoff(today);

    let mut discovery = Discovery::default();

    for entry in WalkDir::new(&daily_dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        if exclude_set.is_match(&name) || !include_set.is_match(&name) {
            continue;
        }

        let path = entry.path().to_path_buf();
        let Some(date) = date_from_filename(&name) else {
            discovery.misnamed.push(path);
            continue;
        };

        if cutoff.is_some_and(|c| date < c) {
            continue;
        }

        discovery.notes.push(NoteFile {
            source_path: config.vault_relative(&path),
            path,
            date,
        });
    }

    // Sort for deterministic ordering
    discovery
        .notes
        .sort_by(|a, b| a.date.cmp(&b.date).then(a.source_path.cmp(&b.source_path)));
    discovery.misnamed.sort();

    Ok(discovery)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn vault_with(files: &[&str]) -> (TempDir, Config) {
        let tmp = TempDir::new().unwrap();
        let daily = tmp.path().join("00.daily");
        fs::create_dir_all(&daily).unwrap();
        for f in files {
            fs::write(daily.join(f), "## INDEX\n").unwrap();
        }
        let cfg = Config::for_vault(tmp.path());
        (tmp, cfg)
    }

    #[test]
    fn test_full_window_sorted() {
        let (_tmp, cfg) = vault_with(&["2025-12-14.md", "2025-12-01.md", "notes.txt"]);
        let today = NaiveDate::from_ymd_opt(2025, 12, 20).unwrap();
        let found = discover_notes(&cfg, Window::Full, today).unwrap();
        let paths: Vec<_> = found.notes.iter().map(|n| n.source_path.as_str()).collect();
        assert_eq!(paths, vec!["00.daily/2025-12-01.md", "00.daily/2025-12-14.md"]);
        assert!(found.misnamed.is_empty());
    }

    #[test]
    fn test_since_window_is_inclusive() {
        let (_tmp, cfg) = vault_with(&["2025-12-10.md", "2025-12-13.md", "2025-12-14.md"]);
        let today = NaiveDate::from_ymd_opt(2025, 12, 14).unwrap();
        let found = discover_notes(&cfg, Window::Since(1), today).unwrap();
        assert_eq!(found.notes.len(), 2);
        assert_eq!(found.notes[0].date, NaiveDate::from_ymd_opt(2025, 12, 13).unwrap());
    }

    #[test]
    fn test_misnamed_and_excluded() {
        let (_tmp, mut cfg) = vault_with(&["2025-12-14.md", "scratch.md", "2025-12-15.md"]);
        cfg.daily.exclude_globs = vec!["2025-12-15.md".to_string()];
        let today = NaiveDate::from_ymd_opt(2025, 12, 20).unwrap();
        let found = discover_notes(&cfg, Window::Full, today).unwrap();
        assert_eq!(found.notes.len(), 1);
        assert_eq!(found.misnamed.len(), 1);
        assert!(found.misnamed[0].ends_with("scratch.md"));
    }

    #[test]
    fn test_missing_daily_dir() {
        let tmp = TempDir::new().unwrap();
        let cfg = Config::for_vault(tmp.path());
        let today = NaiveDate::from_ymd_opt(2025, 12, 20).unwrap();
        assert!(discover_notes(&cfg, Window::Full, today).is_err());
    }
}
