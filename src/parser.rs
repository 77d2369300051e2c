//! INDEX section parser for daily notes.
//!
//! A daily note carries a `## INDEX` section whose list items follow a
//! fixed grammar:
//!
//! ```text
//! - [kind] <body> <#prefix:value ...> ^YYYYMMDD-<letter><n>
//! ```
//!
//! `kind` is one of `learning`, `experiment`, `idea`, `action`. The body is
//! either plain text or an embed of another block
//! (`![[00.daily/2025-12-13.md#^20251213-t1]]`, optionally with a `|label`).
//! Actions may carry `effort=<minutes>` and `status=<inbox|doing|done|dropped>`.
//!
//! Parsing is pure: [`parse_note`] never touches the filesystem or the
//! database, and a malformed line becomes a [`ParseError`] while the rest of
//! the note keeps parsing.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::ops::RangeInclusive;

use crate::models::{ActionMeta, ActionStatus, BlockRef, Entry, EntryKind, ItemKind};

static BLOCK_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\^(\d{8})-([tleia])(\d+)$").expect("valid block id regex"));

static KIND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[(\w+)\](?:\s+|$)").expect("valid kind regex"));

static EMBED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"!\[\[([^#\]|]+)#\^([^\]|]+)(?:\|([^\]]*))?\]\]").expect("valid embed regex")
});

static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#([A-Za-z0-9_]+):([^\s#]+)$").expect("valid tag regex"));

static DAILY_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})\.md$").expect("valid daily name regex"));

/// Heading that opens the INDEX section.
pub const INDEX_HEADING: &str = "## INDEX";

/// Why an INDEX line (or a whole note) was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("no '## INDEX' section found")]
    MissingIndexSection,
    #[error("missing block id (expected ^YYYYMMDD-<kind><n> at end of line)")]
    MissingBlockId,
    #[error("invalid block id '{0}' (expected ^YYYYMMDD-<kind><n>)")]
    InvalidBlockId(String),
    #[error("block id date {found} does not match note date {expected}")]
    BlockIdDateMismatch { found: String, expected: String },
    #[error("missing kind (expected [learning|experiment|idea|action])")]
    MissingKind,
    #[error("unknown kind '{0}' (expected learning, experiment, idea or action)")]
    UnknownKind(String),
    #[error("invalid tag '{0}' (tags must be #prefix:value)")]
    MalformedTag(String),
    #[error("invalid action metadata '{0}'")]
    InvalidMetadata(String),
    #[error("entry has no body")]
    EmptyBody,
    #[error("duplicate block id ^{0}")]
    DuplicateBlockId(String),
}

impl ParseErrorKind {
    /// Short stable code used in validation reports.
    pub fn code(&self) -> &'static str {
        match self {
            ParseErrorKind::MissingIndexSection => "INDEX_MISSING",
            ParseErrorKind::MissingBlockId => "BLOCK_ID_MISSING",
            ParseErrorKind::InvalidBlockId(_) => "BLOCK_ID_INVALID",
            ParseErrorKind::BlockIdDateMismatch { .. } => "BLOCK_ID_DATE",
            ParseErrorKind::MissingKind => "KIND_MISSING",
            ParseErrorKind::UnknownKind(_) => "KIND_UNKNOWN",
            ParseErrorKind::MalformedTag(_) => "TAG_FORMAT",
            ParseErrorKind::InvalidMetadata(_) => "ACTION_META",
            ParseErrorKind::EmptyBody => "BODY_EMPTY",
            ParseErrorKind::DuplicateBlockId(_) => "BLOCK_ID_DUPLICATE",
        }
    }
}

/// A rejected line with its position in the note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// 1-based line number, `0` for errors about the whole note.
    pub line_no: usize,
    pub line: String,
    pub kind: ParseErrorKind,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line_no == 0 {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "line {}: {}", self.line_no, self.kind)
        }
    }
}

/// Everything extracted from one daily note.
#[derive(Debug, Clone)]
pub struct ParsedNote {
    pub source_path: String,
    pub date: NaiveDate,
    pub entries: Vec<Entry>,
    pub errors: Vec<ParseError>,
    /// Number of candidate `- ` lines inside the INDEX section.
    pub index_lines: usize,
    /// 1-based lines covered by the INDEX section, heading included.
    pub index_range: Option<RangeInclusive<usize>>,
}

impl ParsedNote {
    pub fn has_index(&self) -> bool {
        self.index_range.is_some()
    }
}

/// Extract the note date from a daily file name (`2025-12-14.md`).
pub fn date_from_filename(name: &str) -> Option<NaiveDate> {
    let caps = DAILY_NAME_RE.captures(name)?;
    NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok()
}

/// Parse all INDEX entries of a note.
pub fn parse_note(content: &str, date: NaiveDate, source_path: &str) -> ParsedNote {
    let mut entries = Vec::new();
    let mut errors = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut index_lines = 0;
    let mut section_start: Option<usize> = None;
    let mut section_end = 0;

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = line.trim();

        if section_start.is_none() {
            if trimmed == INDEX_HEADING {
                section_start = Some(line_no);
                section_end = line_no;
            }
            continue;
        }

        if trimmed.starts_with("# ") || trimmed.starts_with("## ") {
            break;
        }
        section_end = line_no;

        if !trimmed.starts_with("- ") {
            continue;
        }
        index_lines += 1;

        match parse_index_line(line, date, source_path, line_no) {
            Ok(entry) => {
                if seen.insert(entry.block_id.clone()) {
                    entries.push(entry);
                } else {
                    errors.push(ParseError {
                        line_no,
                        line: trimmed.to_string(),
                        kind: ParseErrorKind::DuplicateBlockId(entry.block_id),
                    });
                }
            }
            Err(kind) => errors.push(ParseError {
                line_no,
                line: trimmed.to_string(),
                kind,
            }),
        }
    }

    if section_start.is_none() {
        errors.push(ParseError {
            line_no: 0,
            line: String::new(),
            kind: ParseErrorKind::MissingIndexSection,
        });
    }

    ParsedNote {
        source_path: source_path.to_string(),
        date,
        entries,
        errors,
        index_lines,
        index_range: section_start.map(|start| start..=section_end),
    }
}

/// Parse a single INDEX line.
pub fn parse_index_line(
    line: &str,
    date: NaiveDate,
    source_path: &str,
    line_no: usize,
) -> Result<Entry, ParseErrorKind> {
    let trimmed = line.trim();
    let rest = trimmed
        .strip_prefix("- ")
        .ok_or(ParseErrorKind::MissingKind)?
        .trim();

    // Block id is the last token.
    let (content, last) = match rest.rsplit_once(char::is_whitespace) {
        Some((content, last)) => (content.trim_end(), last),
        None => ("", rest),
    };
    if !last.starts_with('^') {
        return Err(ParseErrorKind::MissingBlockId);
    }
    let caps = BLOCK_ID_RE
        .captures(last)
        .ok_or_else(|| ParseErrorKind::InvalidBlockId(last.to_string()))?;
    let block_date = NaiveDate::parse_from_str(&caps[1], "%Y%m%d")
        .map_err(|_| ParseErrorKind::InvalidBlockId(last.to_string()))?;
    if block_date != date {
        return Err(ParseErrorKind::BlockIdDateMismatch {
            found: caps[1].to_string(),
            expected: date.format("%Y%m%d").to_string(),
        });
    }
    let block_id = last[1..].to_string();

    let kind_caps = KIND_RE.captures(content).ok_or(ParseErrorKind::MissingKind)?;
    let kind = ItemKind::from_keyword(&kind_caps[1])
        .ok_or_else(|| ParseErrorKind::UnknownKind(kind_caps[1].to_string()))?;
    let body = &content[kind_caps.get(0).map_or(0, |m| m.end())..];

    let mut fields = BodyFields::default();
    let is_action = kind == ItemKind::Action;
    let mut reference = None;
    let mut label = None;

    match EMBED_RE.captures(body) {
        Some(embed) => {
            let whole = embed.get(0).map_or("", |m| m.as_str());
            let start = embed.get(0).map_or(0, |m| m.start());
            let end = start + whole.len();

            fields.scan(&body[..start], is_action)?;
            let before = std::mem::take(&mut fields.words);
            fields.scan(&body[end..], is_action)?;
            let after = std::mem::take(&mut fields.words);

            reference = Some(BlockRef {
                source_path: embed[1].trim().to_string(),
                block_id: embed[2].trim().to_string(),
            });
            let alias = embed.get(3).map(|m| m.as_str().trim()).unwrap_or("");
            label = Some(if alias.is_empty() {
                whole.to_string()
            } else {
                alias.to_string()
            });
            fields.words = before;
            fields.words.extend(label.iter().cloned());
            fields.words.extend(after);
        }
        None => fields.scan(body, is_action)?,
    }

    let text = fields.words.join(" ");
    if text.is_empty() && label.is_none() {
        return Err(ParseErrorKind::EmptyBody);
    }

    let entry_kind = match kind {
        ItemKind::Learning => EntryKind::Learning,
        ItemKind::Experiment => EntryKind::Experiment,
        ItemKind::Idea => EntryKind::Idea,
        ItemKind::Action => EntryKind::Action(fields.meta),
    };

    Ok(Entry {
        kind: entry_kind,
        date,
        text,
        source_path: source_path.to_string(),
        block_id,
        reference,
        tags: fields.tags,
        line_no,
    })
}

#[derive(Default)]
struct BodyFields {
    words: Vec<String>,
    tags: Vec<String>,
    meta: ActionMeta,
}

impl BodyFields {
    fn scan(&mut self, segment: &str, is_action: bool) -> Result<(), ParseErrorKind> {
        for token in segment.split_whitespace() {
            if token.starts_with('#') {
                let caps = TAG_RE
                    .captures(token)
                    .ok_or_else(|| ParseErrorKind::MalformedTag(token.to_string()))?;
                let tag = format!("{}:{}", &caps[1], &caps[2]);
                if !self.tags.contains(&tag) {
                    self.tags.push(tag);
                }
            } else if let (true, Some(value)) = (is_action, token.strip_prefix("effort=")) {
                let minutes = value
                    .parse::<u32>()
                    .map_err(|_| ParseErrorKind::InvalidMetadata(token.to_string()))?;
                self.meta.effort_minutes = Some(minutes);
            } else if let (true, Some(value)) = (is_action, token.strip_prefix("status=")) {
                let status = value
                    .parse::<ActionStatus>()
                    .map_err(|_| ParseErrorKind::InvalidMetadata(token.to_string()))?;
                self.meta.status = Some(status);
            } else {
                self.words.push(token.to_string());
            }
        }
        Ok(())
    }
}
