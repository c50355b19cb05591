// SPDX-License-Identifier: MIT OR Apache-2.0

//! Destinations for recorded occurrences.

use super::occurrence::{HistoryTree, Occurrence};
use std::collections::VecDeque;
use std::fmt::Debug;

/// Receives every occurrence as it is recorded.
pub trait HistorySink: Debug {
    /// Prepares the sink's backing store. Calling it more than once has no further effect.
    fn init(&mut self);

    /// Stores `item`, which has just been appended to `tree`.
    fn append(&mut self, tree: &HistoryTree, item: &Occurrence);

    /// Number of entries currently held.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A textual rendering of the held entries, one per line, oldest first.
    fn dump(&self) -> String;
}

/// Default number of entries a [`RingBuffer`] keeps.
pub const DEFAULT_CAPACITY: usize = 1000;

/// A bounded sink that keeps the serialized form of the most recent occurrences.
///
/// Each entry is keyed by a counter that increases with every append and is
/// never reused. Once `capacity` entries are held, each append evicts the
/// oldest one.
///
/// ```rust
/// use zonewise::history::{HistorySink, HistoryTree, OccurrenceSpec, RingBuffer};
///
/// let mut buffer = RingBuffer::new(2);
/// buffer.init();
/// let tree = HistoryTree::default();
/// for title in ["a", "b", "c"] {
///     let item = zonewise::history::Occurrence {
///         title: title.to_string(),
///         subtitle: None,
///         class: None,
///         source_link: None,
///         args: Vec::new(),
///         index: 0,
///         parent: None,
///         tree: 0,
///         leaf: true,
///     };
///     buffer.append(&tree, &item);
/// }
/// let keys: Vec<u64> = buffer.entries().map(|(key, _)| key).collect();
/// assert_eq!(keys, vec![1, 2]);
/// ```
#[derive(Debug)]
pub struct RingBuffer {
    capacity: usize,
    counter: u64,
    entries: VecDeque<(u64, String)>,
    initialized: bool,
}

// ============================================================================
// BOILERPLATE TRAIT IMPLEMENTATIONS
// ============================================================================
//
// - Default: a buffer of DEFAULT_CAPACITY
// - Clone/PartialEq: not implemented, a sink is owned by exactly one recorder

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        RingBuffer {
            capacity,
            counter: 0,
            entries: VecDeque::with_capacity(capacity),
            initialized: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total number of entries ever appended, including evicted ones.
    pub fn appended(&self) -> u64 {
        self.counter
    }

    /// The held entries as `(key, json)`, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = (u64, &str)> {
        self.entries.iter().map(|(key, text)| (*key, text.as_str()))
    }

    pub fn get(&self, key: u64) -> Option<&str> {
        // keys are contiguous, so the position is an offset from the oldest
        let (oldest, _) = self.entries.front()?;
        let offset = usize::try_from(key.checked_sub(*oldest)?).ok()?;
        self.entries.get(offset).map(|(_, text)| text.as_str())
    }
}

impl HistorySink for RingBuffer {
    fn init(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;
        let capacity = self.capacity as u64;
        logwise::debuginternal_sync!("history ring buffer ready, capacity {capacity}", capacity = capacity);
    }

    fn append(&mut self, _tree: &HistoryTree, item: &Occurrence) {
        if self.capacity == 0 {
            return;
        }
        let text = match serde_json::to_string(item) {
            Ok(text) => text,
            Err(e) => {
                let error = e.to_string();
                logwise::warn_sync!("cannot serialize occurrence: {error}", error = error);
                return;
            }
        };
        if self.entries.len() >= self.capacity {
            if let Some((evicted, _)) = self.entries.pop_front() {
                logwise::debuginternal_sync!("evict history entry {key}", key = evicted);
            }
        }
        self.entries.push_back((self.counter, text));
        self.counter += 1;
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn dump(&self) -> String {
        self.entries
            .iter()
            .map(|(_, text)| text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
