//! Bounded event log.
//!
//! Fixed-capacity ring of recently received events, oldest evicted first.
//! Entries are appended in arrival order before handler dispatch, so the log
//! reflects what came off the wire even when a handler fails.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;

use super::LiveEvent;

/// One entry in the bounded event log.
#[derive(Debug, Clone)]
pub struct EventLogEntry {
    pub event: LiveEvent,
    pub received_at: DateTime<Utc>,
    /// Whether a handler processed the event
    pub consumed: bool,
}

/// Fixed-capacity FIFO event log.
#[derive(Debug)]
pub struct EventLog {
    entries: VecDeque<EventLogEntry>,
    capacity: usize,
}

impl EventLog {
    /// Create a log holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an event, evicting the oldest entry at capacity.
    pub fn append(&mut self, event: LiveEvent) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(EventLogEntry {
            event,
            received_at: Utc::now(),
            consumed: false,
        });
    }

    /// Mark the most recently appended entry as consumed.
    pub fn mark_last_consumed(&mut self) {
        if let Some(entry) = self.entries.back_mut() {
            entry.consumed = true;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries in arrival order, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &EventLogEntry> {
        self.entries.iter()
    }
}
