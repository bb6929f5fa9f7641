//! Per-project audit trail. Local only, newest entry first.

use std::collections::BTreeMap;

use pr_core::{ChangeAction, ChangeLogEntry, Timestamp};

pub const DEFAULT_CAP: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeLog {
    entries: BTreeMap<String, Vec<ChangeLogEntry>>,
    cap: usize
}

impl Default for ChangeLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAP)
    }
}

impl ChangeLog {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            cap: cap.max(1)
        }
    }

    pub fn from_entries(entries: BTreeMap<String, Vec<ChangeLogEntry>>, cap: usize) -> Self {
        let mut log = Self::new(cap);
        for (key, mut list) in entries {
            list.truncate(log.cap);
            log.entries.insert(key, list);
        }
        log
    }

    pub fn record(
        &mut self,
        key: &str,
        timestamp: Timestamp,
        author: &str,
        action_type: ChangeAction,
        description: impl Into<String>,
    ) -> &ChangeLogEntry {
        let list = self.entries.entry(key.to_string()).or_default();
        list.insert(
            0,
            ChangeLogEntry {
                timestamp,
                author: author.to_string(),
                action_type,
                description: description.into()
            }
        );
        list.truncate(self.cap);
        &list[0]
    }

    pub fn entries(&self, key: &str) -> &[ChangeLogEntry] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn as_map(&self) -> &BTreeMap<String, Vec<ChangeLogEntry>> {
        &self.entries
    }

    pub fn cap(&self) -> usize {
        self.cap
    }
}
