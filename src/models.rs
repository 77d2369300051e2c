//! Core data models used throughout vault-index.
//!
//! These types represent the entries parsed out of daily notes and the
//! rows read back from SQLite when rendering index pages and export packs.

use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;

/// The four kinds of index entry a daily note can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ItemKind {
    Learning,
    Experiment,
    Idea,
    Action,
}

impl ItemKind {
    pub const ALL: [ItemKind; 4] = [
        ItemKind::Learning,
        ItemKind::Experiment,
        ItemKind::Idea,
        ItemKind::Action,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Learning => "learning",
            ItemKind::Experiment => "experiment",
            ItemKind::Idea => "idea",
            ItemKind::Action => "action",
        }
    }

    /// Exact keyword as written between brackets in a note (`[idea]`).
    pub fn from_keyword(word: &str) -> Option<ItemKind> {
        ItemKind::ALL.into_iter().find(|k| k.as_str() == word)
    }

    /// Letter used in block ids for this kind (`^20251214-i1` for ideas).
    pub fn block_letter(&self) -> char {
        match self {
            ItemKind::Learning => 'l',
            ItemKind::Experiment => 'e',
            ItemKind::Idea => 'i',
            ItemKind::Action => 'a',
        }
    }

    /// Plural used for page titles and file names.
    pub fn plural(&self) -> &'static str {
        match self {
            ItemKind::Learning => "learnings",
            ItemKind::Experiment => "experiments",
            ItemKind::Idea => "ideas",
            ItemKind::Action => "actions",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = String;

    /// Accepts both the singular and plural spelling (`idea`, `ideas`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "learning" | "learnings" => Ok(ItemKind::Learning),
            "experiment" | "experiments" => Ok(ItemKind::Experiment),
            "idea" | "ideas" => Ok(ItemKind::Idea),
            "action" | "actions" => Ok(ItemKind::Action),
            other => Err(format!(
                "unknown kind '{}' (expected learning, experiment, idea or action)",
                other
            )),
        }
    }
}

/// Workflow state of an action entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionStatus {
    Inbox,
    Doing,
    Done,
    Dropped,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Inbox => "inbox",
            ActionStatus::Doing => "doing",
            ActionStatus::Done => "done",
            ActionStatus::Dropped => "dropped",
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inbox" => Ok(ActionStatus::Inbox),
            "doing" => Ok(ActionStatus::Doing),
            "done" => Ok(ActionStatus::Done),
            "dropped" => Ok(ActionStatus::Dropped),
            other => Err(format!(
                "unknown status '{}' (expected inbox, doing, done or dropped)",
                other
            )),
        }
    }
}

/// Optional `effort=` / `status=` metadata carried by action entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionMeta {
    pub effort_minutes: Option<u32>,
    pub status: Option<ActionStatus>,
}

/// Kind of a parsed entry. Only actions carry metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Learning,
    Experiment,
    Idea,
    Action(ActionMeta),
}

impl EntryKind {
    pub fn kind(&self) -> ItemKind {
        match self {
            EntryKind::Learning => ItemKind::Learning,
            EntryKind::Experiment => ItemKind::Experiment,
            EntryKind::Idea => ItemKind::Idea,
            EntryKind::Action(_) => ItemKind::Action,
        }
    }

    pub fn action_meta(&self) -> Option<&ActionMeta> {
        match self {
            EntryKind::Action(meta) => Some(meta),
            _ => None,
        }
    }

    pub fn effort_minutes(&self) -> Option<u32> {
        self.action_meta().and_then(|m| m.effort_minutes)
    }

    pub fn status(&self) -> Option<ActionStatus> {
        self.action_meta().and_then(|m| m.status)
    }
}

/// Pointer to a block in another note (an embedded takeaway).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRef {
    pub source_path: String,
    pub block_id: String,
}

/// One index entry parsed from the INDEX section of a daily note.
///
/// `tags` are raw `prefix:value` strings as written in the note; they are
/// normalized against the taxonomy by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub kind: EntryKind,
    pub date: NaiveDate,
    pub text: String,
    pub source_path: String,
    pub block_id: String,
    pub reference: Option<BlockRef>,
    pub tags: Vec<String>,
    /// 1-based line number in the note.
    pub line_no: usize,
}

/// An item row read back from SQLite together with its tag names.
#[derive(Debug, Clone)]
pub struct StoredItem {
    pub id: i64,
    pub date: String,
    pub kind: ItemKind,
    pub text: String,
    pub source_path: String,
    pub block_id: String,
    pub ref_source_path: Option<String>,
    pub ref_block_id: Option<String>,
    pub effort_minutes: Option<i64>,
    pub status: Option<String>,
    /// Sorted tag names.
    pub tags: Vec<String>,
}

impl StoredItem {
    /// Obsidian embed pointing back at the item's source block.
    pub fn embed(&self) -> String {
        format!("![[{}#^{}]]", self.source_path, self.block_id)
    }
}

/// Which daily notes an operation looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// Every note in the daily directory.
    Full,
    /// Notes dated within the last `n` days (inclusive of the cutoff day).
    Since(u32),
}

impl Window {
    /// Earliest note date included relative to `today`, if any.
    pub fn cutoff(&self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            Window::Full => None,
            Window::Since(days) => today.checked_sub_days(chrono::Days::new(u64::from(*days))),
        }
    }

    /// Label stored in the run record.
    pub fn label(&self) -> String {
        match self {
            Window::Full => "full".to_string(),
            Window::Since(days) => format!("since:{}", days),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_singular_and_plural() {
        assert_eq!("idea".parse::<ItemKind>().unwrap(), ItemKind::Idea);
        assert_eq!("Actions".parse::<ItemKind>().unwrap(), ItemKind::Action);
        assert!("note".parse::<ItemKind>().is_err());
    }

    #[test]
    fn status_is_strict() {
        assert_eq!("done".parse::<ActionStatus>().unwrap(), ActionStatus::Done);
        assert!("Done".parse::<ActionStatus>().is_err());
    }

    #[test]
    fn window_cutoff() {
        let today = NaiveDate::from_ymd_opt(2025, 12, 14).unwrap();
        assert_eq!(Window::Full.cutoff(today), None);
        assert_eq!(
            Window::Since(7).cutoff(today),
            NaiveDate::from_ymd_opt(2025, 12, 7)
        );
        assert_eq!(Window::Since(3).label(), "since:3");
    }
}
