//! Tag taxonomy loading and normalization.
//!
//! The taxonomy is a small YAML file listing approved values per prefix,
//! aliases for frequently mistyped tags, and the prefixes under which new
//! tags may be introduced freely:
//!
//! ```yaml
//! approved:
//!   tech: [python, playwright]
//!   topic: [workflow]
//! aliases:
//!   py: tech:python
//! rules:
//!   allow_new_prefix: [new, tmp]
//! ```
//!
//! Normalization never rejects a tag. Unknown tags pass through unchanged and
//! are marked [`TagStatus::Unapproved`] so callers can warn about them.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

fn default_allow_new_prefix() -> Vec<String> {
    vec!["new".to_string(), "tmp".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct Rules {
    #[serde(default = "default_allow_new_prefix")]
    pub allow_new_prefix: Vec<String>,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            allow_new_prefix: default_allow_new_prefix(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
struct TaxonomyFile {
    #[serde(default)]
    approved: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    aliases: BTreeMap<String, String>,
    #[serde(default)]
    rules: Rules,
}

/// How a raw tag was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagStatus {
    /// Listed under `approved`.
    Approved,
    /// Rewritten through `aliases` from the raw tag `from`. `approved` is
    /// whether the alias target is itself approved or provisional.
    Aliased { from: String, approved: bool },
    /// Prefix is listed in `rules.allow_new_prefix`.
    Provisional,
    /// No mapping; kept as written.
    Unapproved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTag {
    pub name: String,
    pub status: TagStatus,
}

impl NormalizedTag {
    /// Whether the tag is stored with the `approved` flag set.
    pub fn is_approved(&self) -> bool {
        match &self.status {
            TagStatus::Approved | TagStatus::Provisional => true,
            TagStatus::Aliased { approved, .. } => *approved,
            TagStatus::Unapproved => false,
        }
    }
}

/// Approved tags, aliases and rules, loaded once and passed to callers.
#[derive(Debug, Clone, Default)]
pub struct Taxonomy {
    approved: BTreeMap<String, BTreeSet<String>>,
    aliases: BTreeMap<String, String>,
    rules: Rules,
}

impl Taxonomy {
    /// Load the taxonomy file. A missing file yields an empty taxonomy.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "taxonomy file not found, every tag outside new/tmp will be flagged"
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read taxonomy file: {}", path.display()))?;
        let taxonomy = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse taxonomy file: {}", path.display()))?;

        tracing::info!(
            aliases = taxonomy.aliases.len(),
            approved = taxonomy.approved_count(),
            "loaded taxonomy"
        );
        Ok(taxonomy)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty document deserializes as unit, not as a map.
        let file: TaxonomyFile = if content.trim().is_empty() {
            TaxonomyFile::default()
        } else {
            serde_yaml::from_str(content)?
        };

        Ok(Self {
            approved: file
                .approved
                .into_iter()
                .map(|(prefix, values)| (prefix, values.into_iter().collect()))
                .collect(),
            aliases: file.aliases,
            rules: file.rules,
        })
    }

    pub fn approved_count(&self) -> usize {
        self.approved.values().map(|v| v.len()).sum()
    }

    /// Resolve a raw `prefix:value` tag to its canonical form.
    pub fn normalize(&self, raw: &str) -> NormalizedTag {
        if let Some(target) = self.aliases.get(raw) {
            let approved = self.status_of(target) != TagStatus::Unapproved;
            return NormalizedTag {
                name: target.clone(),
                status: TagStatus::Aliased {
                    from: raw.to_string(),
                    approved,
                },
            };
        }

        NormalizedTag {
            name: raw.to_string(),
            status: self.status_of(raw),
        }
    }

    /// Status of a tag that is not looked up in `aliases`.
    fn status_of(&self, tag: &str) -> TagStatus {
        match tag.split_once(':') {
            Some((prefix, value))
                if self
                    .approved
                    .get(prefix)
                    .is_some_and(|values| values.contains(value)) =>
            {
                TagStatus::Approved
            }
            Some((prefix, _)) if self.rules.allow_new_prefix.iter().any(|p| p == prefix) => {
                TagStatus::Provisional
            }
            _ => TagStatus::Unapproved,
        }
    }

    /// Normalize a list of raw tags, dropping duplicates created by aliases.
    pub fn normalize_all(&self, raw: &[String]) -> Vec<NormalizedTag> {
        let mut out: Vec<NormalizedTag> = Vec::with_capacity(raw.len());
        for tag in raw {
            let normalized = self.normalize(tag);
            if !out.iter().any(|t| t.name == normalized.name) {
                out.push(normalized);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
approved:
  tech:
    - playwright
    - python
  topic:
    - workflow
aliases:
  pw: tech:playwright
  "tech:py": tech:python
rules:
  allow_new_prefix: ["new", "tmp"]
"#;

    #[test]
    fn test_alias_resolution() {
        let tax = Taxonomy::from_yaml(SAMPLE).unwrap();
        let t = tax.normalize("tech:py");
        assert_eq!(t.name, "tech:python");
        assert_eq!(
            t.status,
            TagStatus::Aliased {
                from: "tech:py".to_string(),
                approved: true
            }
        );
        assert!(t.is_approved());
        assert_eq!(tax.normalize("pw").name, "tech:playwright");
    }

    #[test]
    fn test_alias_to_unlisted_target_is_unapproved() {
        let tax = Taxonomy::from_yaml(
            "approved:\n  tech: [python]\naliases:\n  pyy: tech:pyhton\n  scratch: tmp:idea\n",
        )
        .unwrap();

        let typo = tax.normalize("pyy");
        assert_eq!(typo.name, "tech:pyhton");
        assert_eq!(
            typo.status,
            TagStatus::Aliased {
                from: "pyy".to_string(),
                approved: false
            }
        );
        assert!(!typo.is_approved());

        // Aliases into an allowed new prefix stay provisional-approved.
        assert!(tax.normalize("scratch").is_approved());
    }

    #[test]
    fn test_approved_passes_through() {
        let tax = Taxonomy::from_yaml(SAMPLE).unwrap();
        assert_eq!(tax.normalize("topic:workflow").status, TagStatus::Approved);
        assert_eq!(tax.approved_count(), 3);
    }

    #[test]
    fn test_new_prefix_is_provisional() {
        let tax = Taxonomy::from_yaml(SAMPLE).unwrap();
        let t = tax.normalize("new:automation");
        assert_eq!(t.name, "new:automation");
        assert_eq!(t.status, TagStatus::Provisional);
        assert!(t.is_approved());
    }

    #[test]
    fn test_unknown_is_flagged_not_rejected() {
        let tax = Taxonomy::from_yaml(SAMPLE).unwrap();
        let t = tax.normalize("unknown:tag");
        assert_eq!(t.name, "unknown:tag");
        assert_eq!(t.status, TagStatus::Unapproved);
        // Known prefix, unlisted value.
        assert_eq!(tax.normalize("tech:rust").status, TagStatus::Unapproved);
    }

    #[test]
    fn test_normalize_all_dedups_aliases() {
        let tax = Taxonomy::from_yaml(SAMPLE).unwrap();
        let tags = tax.normalize_all(&["tech:py".to_string(), "tech:python".to_string()]);
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "tech:python");
    }

    #[test]
    fn test_empty_and_missing_taxonomy() {
        let tax = Taxonomy::from_yaml("").unwrap();
        assert_eq!(tax.normalize("tmp:x").status, TagStatus::Provisional);
        assert_eq!(tax.normalize("topic:x").status, TagStatus::Unapproved);

        let missing = Taxonomy::load(Path::new("/definitely/not/here/tags.yml")).unwrap();
        assert_eq!(missing.approved_count(), 0);
    }

    #[test]
    fn test_malformed_yaml_is_an_error() {
        assert!(Taxonomy::from_yaml("approved: [not, a, map]").is_err());
    }
}
