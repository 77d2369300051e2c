//! Configuration for a vault.
//!
//! Every setting has a default that matches the standard vault layout, so a
//! config file is optional. When present it is TOML, read from `--config` or
//! from `<vault>/99.system/vix.toml`. Relative paths resolve against the
//! vault root.

use anyhow::{Context, Result};
use globset::Glob;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file looked up inside the vault when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "99.system/vix.toml";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Vault root. Filled in from the CLI, never read from the file.
    #[serde(skip)]
    pub vault: PathBuf,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub daily: DailyConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub index: IndexConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_daily_dir")]
    pub daily_dir: PathBuf,
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
    #[serde(default = "default_db")]
    pub db: PathBuf,
    #[serde(default = "default_taxonomy")]
    pub taxonomy: PathBuf,
    #[serde(default = "default_error_log")]
    pub error_log: PathBuf,
}

fn default_daily_dir() -> PathBuf {
    PathBuf::from("00.daily")
}
fn default_index_dir() -> PathBuf {
    PathBuf::from("01.index")
}
fn default_export_dir() -> PathBuf {
    PathBuf::from("02.blog/drafts")
}
fn default_db() -> PathBuf {
    PathBuf::from("99.system/db/notes.sqlite")
}
fn default_taxonomy() -> PathBuf {
    PathBuf::from("99.system/taxonomy/tags.yml")
}
fn default_error_log() -> PathBuf {
    PathBuf::from("99.system/logs/etl_errors.log")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            daily_dir: default_daily_dir(),
            index_dir: default_index_dir(),
            export_dir: default_export_dir(),
            db: default_db(),
            taxonomy: default_taxonomy(),
            error_log: default_error_log(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DailyConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_include_globs() -> Vec<String> {
    vec!["*.md".to_string()]
}

impl Default for DailyConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

/// What happens to rows whose block no longer exists in its note.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StalePolicy {
    /// Keep the row, set `retired_at`, hide it from outputs.
    #[default]
    Retire,
    /// Delete the row and its tag links.
    Delete,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReconcileConfig {
    #[serde(default = "default_window_days")]
    pub default_window_days: u32,
    #[serde(default)]
    pub stale_items: StalePolicy,
}

fn default_window_days() -> u32 {
    7
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            default_window_days: default_window_days(),
            stale_items: StalePolicy::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Tag prefixes that get one learnings page per value.
    #[serde(default = "default_group_prefixes")]
    pub group_prefixes: Vec<String>,
}

fn default_group_prefixes() -> Vec<String> {
    vec!["book".to_string(), "course".to_string()]
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            group_prefixes: default_group_prefixes(),
        }
    }
}

impl Config {
    /// Defaults for a vault at `vault`.
    pub fn for_vault(vault: &Path) -> Self {
        Self {
            vault: vault.to_path_buf(),
            paths: PathsConfig::default(),
            daily: DailyConfig::default(),
            reconcile: ReconcileConfig::default(),
            index: IndexConfig::default(),
        }
    }

    /// Resolve a configured path against the vault root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.vault.join(path)
        }
    }

    pub fn daily_dir(&self) -> PathBuf {
        self.resolve(&self.paths.daily_dir)
    }
    pub fn index_dir(&self) -> PathBuf {
        self.resolve(&self.paths.index_dir)
    }
    pub fn export_dir(&self) -> PathBuf {
        self.resolve(&self.paths.export_dir)
    }
    pub fn db_path(&self) -> PathBuf {
        self.resolve(&self.paths.db)
    }
    pub fn taxonomy_path(&self) -> PathBuf {
        self.resolve(&self.paths.taxonomy)
    }
    pub fn error_log_path(&self) -> PathBuf {
        self.resolve(&self.paths.error_log)
    }

    /// Vault-relative path with `/` separators, as stored in `source_path`.
    pub fn vault_relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.vault)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

/// Load the config for `vault`.
///
/// An explicit `config_path` must exist. Without one, the in-vault default
/// location is used if present, and built-in defaults otherwise.
pub fn load_config(vault: &Path, config_path: Option<&Path>) -> Result<Config> {
    let path = match config_path {
        Some(p) => Some(p.to_path_buf()),
        None => {
            let candidate = vault.join(DEFAULT_CONFIG_PATH);
            candidate.exists().then_some(candidate)
        }
    };

    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        }
        None => Config::for_vault(vault),
    };
    config.vault = vault.to_path_buf();

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.reconcile.default_window_days == 0 {
        anyhow::bail!("reconcile.default_window_days must be >= 1");
    }

    if config.daily.include_globs.is_empty() {
        anyhow::bail!("daily.include_globs must not be empty");
    }
    for pattern in config
        .daily
        .include_globs
        .iter()
        .chain(config.daily.exclude_globs.iter())
    {
        Glob::new(pattern).with_context(|| format!("Invalid glob pattern: '{}'", pattern))?;
    }

    if config
        .index
        .group_prefixes
        .iter()
        .any(|p| p.trim().is_empty() || p.contains(':'))
    {
        anyhow::bail!("index.group_prefixes entries must be non-empty and contain no ':'");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let tmp = TempDir::new().unwrap();
        let cfg = load_config(tmp.path(), None).unwrap();
        assert_eq!(cfg.daily_dir(), tmp.path().join("00.daily"));
        assert_eq!(cfg.db_path(), tmp.path().join("99.system/db/notes.sqlite"));
        assert_eq!(cfg.reconcile.default_window_days, 7);
        assert_eq!(cfg.reconcile.stale_items, StalePolicy::Retire);
    }

    #[test]
    fn test_in_vault_config_is_picked_up() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("99.system")).unwrap();
        std::fs::write(
            tmp.path().join(DEFAULT_CONFIG_PATH),
            "[paths]\ndaily_dir = \"journal\"\n\n[reconcile]\nstale_items = \"delete\"\n",
        )
        .unwrap();

        let cfg = load_config(tmp.path(), None).unwrap();
        assert_eq!(cfg.daily_dir(), tmp.path().join("journal"));
        assert_eq!(cfg.index_dir(), tmp.path().join("01.index"));
        assert_eq!(cfg.reconcile.stale_items, StalePolicy::Delete);
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let tmp = TempDir::new().unwrap();
        let err = load_config(tmp.path(), Some(&tmp.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_validation() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("vix.toml");

        std::fs::write(&path, "[reconcile]\ndefault_window_days = 0\n").unwrap();
        assert!(load_config(tmp.path(), Some(&path)).is_err());

        std::fs::write(&path, "[daily]\ninclude_globs = [\"[\"]\n").unwrap();
        assert!(load_config(tmp.path(), Some(&path)).is_err());

        std::fs::write(&path, "[reconcile]\nstale_items = \"archive\"\n").unwrap();
        assert!(load_config(tmp.path(), Some(&path)).is_err());
    }

    #[test]
    fn test_vault_relative() {
        let cfg = Config::for_vault(Path::new("/vault"));
        assert_eq!(
            cfg.vault_relative(Path::new("/vault/00.daily/2025-12-14.md")),
            "00.daily/2025-12-14.md"
        );
    }
}
