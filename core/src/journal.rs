//! Append-only audit journal.
//!
//! Every notification a committed command emits is appended here exactly
//! once, inside the same transaction, with a gap-free sequence number
//! starting at 1. Entries are never removed or rewritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A sequenced journal record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry<N> {
    /// Position in the journal (first entry is 1)
    pub sequence: u64,
    /// When the emitting transaction committed
    pub recorded_at: DateTime<Utc>,
    /// The notification itself
    pub notification: N,
}

/// Append-only sequence of notifications
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journal<N> {
    entries: Vec<JournalEntry<N>>,
}

impl<N> Default for Journal<N> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<N> Journal<N> {
    /// Creates an empty journal
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a notification and returns the stored entry
    pub fn append(&mut self, recorded_at: DateTime<Utc>, notification: N) -> &JournalEntry<N> {
        let sequence = self.next_sequence();
        self.entries.push(JournalEntry {
            sequence,
            recorded_at,
            notification,
        });
        &self.entries[self.entries.len() - 1]
    }

    /// Sequence number the next appended entry will get
    #[must_use]
    pub fn next_sequence(&self) -> u64 {
        self.entries.last().map_or(1, |entry| entry.sequence + 1)
    }

    /// All entries, oldest first
    #[must_use]
    pub fn entries(&self) -> &[JournalEntry<N>] {
        &self.entries
    }

    /// Entries with a sequence number strictly greater than `sequence`
    #[must_use]
    pub fn since(&self, sequence: u64) -> &[JournalEntry<N>] {
        let start = self.entries.partition_point(|entry| entry.sequence <= sequence);
        &self.entries[start..]
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: Serialize> Journal<N> {
    /// Renders the journal as newline-delimited JSON, one entry per line.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if a notification cannot be encoded.
    pub fn to_json_lines(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&serde_json::to_string(entry)?);
            out.push('\n');
        }
        Ok(out)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn sequences_start_at_one_and_have_no_gaps() {
        let mut journal = Journal::new();
        assert!(journal.is_empty());
        assert_eq!(journal.next_sequence(), 1);

        journal.append(at(1), "a");
        journal.append(at(2), "b");
        let last = journal.append(at(3), "c");
        assert_eq!(last.sequence, 3);

        let sequences: Vec<u64> = journal.entries().iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[test]
    fn since_skips_seen_entries() {
        let mut journal = Journal::new();
        for n in 0..5 {
            journal.append(at(n), n);
        }
        let tail: Vec<i64> = journal.since(3).iter().map(|e| e.notification).collect();
        assert_eq!(tail, vec![3, 4]);
        assert!(journal.since(5).is_empty());
        assert_eq!(journal.since(0).len(), 5);
    }

    #[test]
    fn json_lines_has_one_line_per_entry() {
        let mut journal = Journal::new();
        journal.append(at(10), "created");
        journal.append(at(11), "minted");
        let rendered = journal.to_json_lines().unwrap();
        assert_eq!(rendered.lines().count(), 2);
        assert!(rendered.lines().next().unwrap().contains("\"sequence\":1"));
    }
}
