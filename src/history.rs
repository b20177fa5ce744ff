//! Bounded history of sealed and opened messages.
//!
//! Only metadata and the opaque bundle record are kept; plaintext never is.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::crypto::{CipherAlgorithm, RandomSource};
use crate::error::{HistoryError, PipelineResult};

pub const DEFAULT_HISTORY_LIMIT: usize = 100;
pub const DEFAULT_MAX_AGE_DAYS: i64 = 30;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Encrypted,
    Decrypted,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    id: String,
    kind: EntryKind,
    algorithm: String,
    timestamp: DateTime<Utc>,
    original_length: usize,
    encrypted_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    record: Option<String>,
}

impl HistoryEntry {
    pub fn new(
        kind: EntryKind,
        algorithm: CipherAlgorithm,
        original_length: usize,
        encrypted_length: usize,
        record: Option<String>,
    ) -> Self {
        Self {
            id: String::new(),
            kind,
            algorithm: algorithm.name().to_string(),
            timestamp: Utc::now(),
            original_length,
            encrypted_length,
            record,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn original_length(&self) -> usize {
        self.original_length
    }

    pub fn encrypted_length(&self) -> usize {
        self.encrypted_length
    }

    /// The bundle record, exactly as produced.
    pub fn record(&self) -> Option<&str> {
        self.record.as_deref()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct History {
    messages: Vec<HistoryEntry>,
    total_count: u64,
    last_cleanup: DateTime<Utc>,
    #[serde(skip, default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl History {
    pub fn new(limit: usize) -> Self {
        History {
            messages: Vec::new(),
            total_count: 0,
            last_cleanup: Utc::now(),
            limit,
        }
    }

    /// Parses persisted or exported history, keeping at most `limit` entries.
    pub fn from_json(data: &[u8], limit: usize) -> Result<Self, HistoryError> {
        let mut history: History =
            serde_json::from_slice(data).map_err(|e| HistoryError::InvalidData(e.to_string()))?;
        history.limit = limit;
        let keep = limit.min(history.messages.len());
        for mut dropped in history.messages.drain(keep..) {
            wipe(&mut dropped);
        }
        Ok(history)
    }

    pub fn to_json(&self) -> Vec<u8> {
        // Plain data with string keys: serialization cannot fail.
        serde_json::to_vec_pretty(self).unwrap_or_default()
    }

    /// Newest first; assigns a fresh id and returns it.
    pub fn add(
        &mut self,
        mut entry: HistoryEntry,
        random: &dyn RandomSource,
    ) -> PipelineResult<String> {
        let mut suffix = [0u8; 6];
        random.fill(&mut suffix)?;
        entry.id = format!(
            "msg_{}_{}",
            entry.timestamp.timestamp_millis(),
            hex::encode(suffix)
        );
        let id = entry.id.clone();

        self.messages.insert(0, entry);
        for mut dropped in self.messages.drain(self.limit.min(self.messages.len())..) {
            wipe(&mut dropped);
        }
        self.total_count += 1;
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<&HistoryEntry> {
        self.messages.iter().find(|e| e.id == id)
    }

    pub fn remove(&mut self, id: &str) -> Result<(), HistoryError> {
        match self.messages.iter().position(|e| e.id == id) {
            Some(pos) => {
                let mut entry = self.messages.remove(pos);
                wipe(&mut entry);
                Ok(())
            }
            None => Err(HistoryError::EntryNotFound(id.to_string())),
        }
    }

    /// Removes every entry, overwriting stored records first.
    pub fn clear(&mut self) {
        for entry in self.messages.iter_mut() {
            wipe(entry);
        }
        self.messages.clear();
        self.total_count = 0;
        self.last_cleanup = Utc::now();
    }

    /// Drops entries older than `max_age` relative to `now`.
    /// Returns how many were removed.
    pub fn prune(&mut self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let before = self.messages.len();
        self.messages.retain_mut(|e| {
            let keep = now - e.timestamp < max_age;
            if !keep {
                wipe(e);
            }
            keep
        });
        self.last_cleanup = now;
        before - self.messages.len()
    }

    /// Serializes for export.
    pub fn export(&self) -> String {
        String::from_utf8(self.to_json()).unwrap_or_default()
    }

    /// Replaces the contents with exported data. On error nothing changes.
    pub fn import(&mut self, data: &str) -> Result<(), HistoryError> {
        let imported = History::from_json(data.as_bytes(), self.limit)?;
        if imported.messages.iter().any(|e| e.id.is_empty()) {
            return Err(HistoryError::InvalidData("entry without id".into()));
        }
        *self = imported;
        Ok(())
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn last_cleanup(&self) -> DateTime<Utc> {
        self.last_cleanup
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

fn wipe(entry: &mut HistoryEntry) {
    if let Some(record) = entry.record.as_mut() {
        record.zeroize();
    }
}
