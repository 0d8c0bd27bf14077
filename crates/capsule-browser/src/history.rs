//! Per-tab navigation history.
//!
//! Classic browser semantics: adding a URL while the cursor sits in the
//! middle of the list discards everything after the cursor. Back and
//! forward only move the cursor.

use serde::{Deserialize, Serialize};

/// A visited URL and where the reader had scrolled to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "ScrollPos", default)]
    pub scroll_pos: usize,
}

/// Ordered visits with a cursor at the page being shown.
///
/// Serializes as `{"URLs": [{"URL": .., "ScrollPos": ..}], "Pos": ..}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "HistoryRecord", into = "HistoryRecord")]
pub struct History {
    entries: Vec<HistoryEntry>,
    pos: usize,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `url` after the cursor, discarding any forward entries.
    pub fn add(&mut self, url: &str) {
        if !self.entries.is_empty() {
            self.entries.truncate(self.pos + 1);
        }
        self.entries.push(HistoryEntry {
            url: url.to_string(),
            scroll_pos: 0,
        });
        self.pos = self.entries.len() - 1;
    }

    /// Move the cursor back one entry.
    pub fn back(&mut self) -> Option<&HistoryEntry> {
        if self.pos == 0 || self.entries.is_empty() {
            return None;
        }
        self.pos -= 1;
        self.entries.get(self.pos)
    }

    /// Move the cursor forward one entry.
    pub fn forward(&mut self) -> Option<&HistoryEntry> {
        if self.pos + 1 >= self.entries.len() {
            return None;
        }
        self.pos += 1;
        self.entries.get(self.pos)
    }

    pub fn current(&self) -> Option<&HistoryEntry> {
        self.entries.get(self.pos)
    }

    /// Remember the scroll position of the current entry.
    pub fn update_scroll(&mut self, scroll_pos: usize) {
        if let Some(entry) = self.entries.get_mut(self.pos) {
            entry.scroll_pos = scroll_pos;
        }
    }

    pub fn can_go_back(&self) -> bool {
        self.pos > 0 && !self.entries.is_empty()
    }

    pub fn can_go_forward(&self) -> bool {
        self.pos + 1 < self.entries.len()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Short debugging summary, e.g. `Count=3, Pos=1`.
    pub fn status(&self) -> String {
        format!("Count={}, Pos={}", self.entries.len(), self.pos)
    }
}

/// Wire form. `URLs` may be `null` and `Pos` out of range in files
/// written by other clients; both are normalized on the way in.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct HistoryRecord {
    #[serde(rename = "URLs", default)]
    urls: Option<Vec<HistoryEntry>>,
    #[serde(rename = "Pos", default)]
    pos: i64,
}

impl From<HistoryRecord> for History {
    fn from(record: HistoryRecord) -> Self {
        let entries = record.urls.unwrap_or_default();
        let last = entries.len().saturating_sub(1);
        let pos = usize::try_from(record.pos).unwrap_or(0).min(last);
        Self { entries, pos }
    }
}

impl From<History> for HistoryRecord {
    fn from(history: History) -> Self {
        Self {
            pos: i64::try_from(history.pos).unwrap_or(i64::MAX),
            urls: Some(history.entries),
        }
    }
}
