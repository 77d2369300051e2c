//! Block lookup inside Markdown notes.
//!
//! A block is addressed by a trailing `^id` anchor. The anchored line is the
//! block, together with any following lines indented deeper than it (nested
//! list items). An anchor alone on its line refers to the paragraph directly
//! above it.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::Config;

static ANCHOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)\^([A-Za-z0-9-]+)\s*$").expect("valid anchor regex"));

/// A `^id` anchor found in a note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    /// 1-based line number.
    pub line_no: usize,
    pub id: String,
}

/// All anchors in a note, in order.
pub fn anchors(content: &str) -> Vec<Anchor> {
    content
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            ANCHOR_RE.captures(line).map(|caps| Anchor {
                line_no: idx + 1,
                id: caps[1].to_string(),
            })
        })
        .collect()
}

/// Text of the block anchored with `^block_id`, anchor removed.
pub fn find_block(content: &str, block_id: &str) -> Option<String> {
    let lines: Vec<&str> = content.lines().collect();

    for (i, line) in lines.iter().enumerate() {
        let Some(caps) = ANCHOR_RE.captures(line) else {
            continue;
        };
        if &caps[1] != block_id {
            continue;
        }

        let start = caps.get(0).map_or(0, |m| m.start());
        let head = line[..start].trim_end();

        if head.trim().is_empty() {
            let mut first = i;
            while first > 0 && !lines[first - 1].trim().is_empty() {
                first -= 1;
            }
            if first == i {
                return None;
            }
            return Some(lines[first..i].join("\n"));
        }

        let indent = indent_of(line);
        let mut block = vec![head.to_string()];
        for next in &lines[i + 1..] {
            if next.trim().is_empty() || indent_of(next) <= indent {
                break;
            }
            block.push(next.trim_end().to_string());
        }
        return Some(block.join("\n"));
    }

    None
}

fn indent_of(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

/// Reads notes referenced by vault links, caching each file once.
///
/// Links are vault-relative (`00.daily/2025-12-13.md`); a missing `.md`
/// extension or a bare file name inside the daily directory also resolve.
pub struct NoteCache<'a> {
    config: &'a Config,
    files: HashMap<String, Option<String>>,
}

impl<'a> NoteCache<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            files: HashMap::new(),
        }
    }

    fn candidates(&self, link: &str) -> Vec<PathBuf> {
        let mut names = vec![link.to_string()];
        if !link.ends_with(".md") {
            names.push(format!("{}.md", link));
        }

        let mut out = Vec::new();
        for name in &names {
            out.push(self.config.vault.join(name));
            out.push(self.config.daily_dir().join(name));
        }
        out
    }

    /// Content of the linked note, if it can be read.
    pub fn content(&mut self, link: &str) -> Option<&str> {
        if !self.files.contains_key(link) {
            let content = self
                .candidates(link)
                .into_iter()
                .find(|p| p.is_file())
                .and_then(|p| match std::fs::read_to_string(&p) {
                    Ok(c) => Some(c),
                    Err(e) => {
                        tracing::warn!(path = %p.display(), error = %e, "failed to read linked note");
                        None
                    }
                });
            self.files.insert(link.to_string(), content);
        }
        self.files.get(link).and_then(|c| c.as_deref())
    }

    /// Resolve `link#^block_id` to the block's text.
    pub fn resolve(&mut self, link: &str, block_id: &str) -> Option<String> {
        self.content(link).and_then(|c| find_block(c, block_id))
    }
}
