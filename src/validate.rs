//! Vault validation.
//!
//! Checks daily notes without touching the database. Errors come straight
//! from [`parse_note`], the same parser the reconciler uses, so every line
//! reported as an error here is a line the reconciler skips. Warnings point
//! at things that parse but are probably mistakes.

use anyhow::Result;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::block::{anchors, NoteCache};
use crate::config::Config;
use crate::models::{ItemKind, Window};
use crate::notes::{discover_notes, NoteFile};
use crate::parser::parse_note;
use crate::taxonomy::Taxonomy;

static ANCHOR_SHAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{8}-[a-z]\d+$").expect("valid anchor shape regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// One problem found in a note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub severity: Severity,
    pub file: String,
    /// 1-based, `0` for the whole file.
    pub line_no: usize,
    pub line: String,
    pub code: &'static str,
    pub message: String,
}

impl Finding {
    fn error(file: &str, line_no: usize, line: &str, code: &'static str, message: String) -> Self {
        Self {
            severity: Severity::Error,
            file: file.to_string(),
            line_no,
            line: line.to_string(),
            code,
            message,
        }
    }

    fn warning(file: &str, line_no: usize, line: &str, code: &'static str, message: String) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(file, line_no, line, code, message)
        }
    }

    fn location(&self) -> String {
        if self.line_no == 0 {
            self.file.clone()
        } else {
            format!("{}:{}", self.file, self.line_no)
        }
    }
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub files_scanned: usize,
    pub files_invalid: usize,
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.severity == Severity::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }
}

/// CLI entry point for `vix validate`. Returns `true` when the vault is valid.
pub fn run_validate(config: &Config, since: Option<u32>, verbose: bool) -> Result<bool> {
    let taxonomy = Taxonomy::load(&config.taxonomy_path())?;
    let window = since.map(Window::Since).unwrap_or(Window::Full);
    let report = validate_vault(config, &taxonomy, window, chrono::Local::now().date_naive())?;

    let error_count = report.errors().count();
    let warning_count = report.warnings().count();

    println!("validate {}", window.label());
    println!("  files scanned: {}", report.files_scanned);
    println!(
        "  files valid: {}",
        report.files_scanned.saturating_sub(report.files_invalid)
    );
    println!("  files invalid: {}", report.files_invalid);
    println!("  errors: {}", error_count);
    println!("  warnings: {}", warning_count);

    if error_count > 0 {
        println!();
        println!("errors:");
        for f in report.errors() {
            print_finding(f);
        }
    }
    if verbose && warning_count > 0 {
        println!();
        println!("warnings:");
        for f in report.warnings() {
            print_finding(f);
        }
    } else if warning_count > 0 {
        println!("  (use --verbose to list warnings)");
    }

    if report.has_errors() {
        println!("invalid");
        Ok(false)
    } else {
        println!("ok");
        Ok(true)
    }
}

fn print_finding(f: &Finding) {
    println!("  {} [{}] {}", f.location(), f.code, f.message);
    if !f.line.is_empty() {
        println!("      {}", f.line);
    }
}

/// Validate every note in `window`.
pub fn validate_vault(
    config: &Config,
    taxonomy: &Taxonomy,
    window: Window,
    today: NaiveDate,
) -> Result<ValidationReport> {
    let discovery = discover_notes(config, window, today)?;
    let mut report = ValidationReport::default();
    let mut cache = NoteCache::new(config);

    for path in &discovery.misnamed {
        report.findings.push(Finding::error(
            &config.vault_relative(path),
            0,
            "",
            "FILENAME_FORMAT",
            "daily note name is not YYYY-MM-DD.md".to_string(),
        ));
    }

    for note in &discovery.notes {
        report.files_scanned += 1;
        let findings = match std::fs::read_to_string(&note.path) {
            Ok(content) => validate_note(&content, note, taxonomy, &mut cache),
            Err(e) => vec![Finding::error(
                &note.source_path,
                0,
                "",
                "FILE_READ",
                format!("file read error: {}", e),
            )],
        };
        if findings.iter().any(|f| f.severity == Severity::Error) {
            report.files_invalid += 1;
        }
        report.findings.extend(findings);
    }

    tracing::debug!(
        files = report.files_scanned,
        findings = report.findings.len(),
        "validation finished"
    );
    Ok(report)
}

/// Findings for one note.
pub fn validate_note(
    content: &str,
    note: &NoteFile,
    taxonomy: &Taxonomy,
    cache: &mut NoteCache<'_>,
) -> Vec<Finding> {
    let file = note.source_path.as_str();
    let parsed = parse_note(content, note.date, file);
    let mut findings: Vec<Finding> = parsed
        .errors
        .iter()
        .map(|e| Finding::error(file, e.line_no, &e.line, e.kind.code(), e.kind.to_string()))
        .collect();

    let lines: Vec<&str> = content.lines().collect();
    let line_text = |n: usize| lines.get(n.wrapping_sub(1)).map_or("", |l| l.trim());

    for entry in &parsed.entries {
        let line = line_text(entry.line_no);
        let kind = entry.kind.kind();

        let letter = entry.block_id.chars().nth(9);
        if letter != Some(kind.block_letter()) {
            findings.push(Finding::warning(
                file,
                entry.line_no,
                line,
                "BLOCK_ID_KIND",
                format!(
                    "block id ^{} does not use '{}' for a {} entry",
                    entry.block_id,
                    kind.block_letter(),
                    kind
                ),
            ));
        }

        for tag in taxonomy.normalize_all(&entry.tags) {
            if !tag.is_approved() {
                findings.push(Finding::warning(
                    file,
                    entry.line_no,
                    line,
                    "TAG_UNAPPROVED",
                    format!("tag #{} is not in the taxonomy", tag.name),
                ));
            }
        }

        if kind == ItemKind::Action {
            if entry.kind.effort_minutes().is_none() {
                findings.push(Finding::warning(
                    file,
                    entry.line_no,
                    line,
                    "ACTION_EFFORT",
                    "action has no effort=".to_string(),
                ));
            }
            if entry.kind.status().is_none() {
                findings.push(Finding::warning(
                    file,
                    entry.line_no,
                    line,
                    "ACTION_STATUS",
                    "action has no status=".to_string(),
                ));
            }
        }

        if let Some(ref r) = entry.reference {
            if cache.resolve(&r.source_path, &r.block_id).is_none() {
                findings.push(Finding::warning(
                    file,
                    entry.line_no,
                    line,
                    "REF_DANGLING",
                    format!("embedded block {}#^{} not found", r.source_path, r.block_id),
                ));
            }
        }
    }

    let in_index = |n: usize| parsed.index_range.as_ref().is_some_and(|r| r.contains(&n));
    let all_anchors = anchors(content);
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for anchor in &all_anchors {
        *counts.entry(anchor.id.as_str()).or_default() += 1;
    }

    for anchor in all_anchors.iter().filter(|a| !in_index(a.line_no)) {
        let line = line_text(anchor.line_no);
        if !ANCHOR_SHAPE_RE.is_match(&anchor.id) {
            findings.push(Finding::warning(
                file,
                anchor.line_no,
                line,
                "ANCHOR_FORMAT",
                format!("anchor ^{} is not YYYYMMDD-<letter><n>", anchor.id),
            ));
        }
        if counts.get(anchor.id.as_str()).copied().unwrap_or(0) > 1 {
            findings.push(Finding::warning(
                file,
                anchor.line_no,
                line,
                "ANCHOR_DUPLICATE",
                format!("anchor ^{} appears more than once in the note", anchor.id),
            ));
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn note() -> NoteFile {
        NoteFile {
            path: PathBuf::from("00.daily/2025-12-14.md"),
            source_path: "00.daily/2025-12-14.md".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 12, 14).unwrap(),
        }
    }

    fn check(content: &str) -> Vec<Finding> {
        let tmp = TempDir::new().unwrap();
        let config = Config::for_vault(tmp.path());
        let taxonomy = Taxonomy::from_yaml("approved:\n  topic: [workflow]\n").unwrap();
        let mut cache = NoteCache::new(&config);
        validate_note(content, &note(), &taxonomy, &mut cache)
    }

    fn codes(findings: &[Finding], severity: Severity) -> Vec<&'static str> {
        findings
            .iter()
            .filter(|f| f.severity == severity)
            .map(|f| f.code)
            .collect()
    }

    #[test]
    fn test_clean_note() {
        let findings = check(
            "# 2025-12-14\n\n## INDEX\n\n- [idea] Automate daily ETL #topic:workflow ^20251214-i1\n",
        );
        assert!(findings.is_empty(), "{:?}", findings);
    }

    #[test]
    fn test_parse_errors_are_errors() {
        let findings = check(
            "## INDEX\n\n- [bogus] Something ^20251214-i1\n- [idea] No id here\n",
        );
        assert_eq!(
            codes(&findings, Severity::Error),
            vec!["KIND_UNKNOWN", "BLOCK_ID_MISSING"]
        );
        assert_eq!(findings[0].line_no, 3);
    }

    #[test]
    fn test_missing_index_is_error() {
        let findings = check("# 2025-12-14\n\nJust notes.\n");
        assert_eq!(codes(&findings, Severity::Error), vec!["INDEX_MISSING"]);
    }

    #[test]
    fn test_warnings() {
        let findings = check(
            "Takeaway ^bad_anchor\n\n## INDEX\n\n- [idea] Wrong letter #topic:workflow ^20251214-a1\n- [action] Ship it #proj:new ^20251214-a2\n- [learning] Ref ![[00.daily/gone.md#^20251201-t1]] ^20251214-l1\n",
        );
        assert!(codes(&findings, Severity::Error).is_empty());
        let warnings = codes(&findings, Severity::Warning);
        assert!(warnings.contains(&"BLOCK_ID_KIND"));
        assert!(warnings.contains(&"TAG_UNAPPROVED"));
        assert!(warnings.contains(&"ACTION_EFFORT"));
        assert!(warnings.contains(&"ACTION_STATUS"));
        assert!(warnings.contains(&"REF_DANGLING"));
    }

    #[test]
    fn test_anchor_outside_index_shape() {
        let findings = check(
            "- point one ^20251214-t1\n- point two ^takeaway\n- again ^20251214-t1\n\n## INDEX\n\n- [idea] x #topic:workflow ^20251214-i1\n",
        );
        let warnings = codes(&findings, Severity::Warning);
        assert_eq!(
            warnings,
            vec!["ANCHOR_DUPLICATE", "ANCHOR_FORMAT", "ANCHOR_DUPLICATE"]
        );
    }
}
