//! Fixed-capacity window of recently published events

use chrono::{DateTime, Duration, Utc};
use minimind_types::{ActorId, EventKind, Location};
use std::collections::VecDeque;

/// Minimal identity of a published event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub actor: ActorId,
    pub description: String,
    pub location: Location,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
}

impl Fingerprint {
    fn same_event(&self, other: &Fingerprint) -> bool {
        self.kind == other.kind
            && self.actor == other.actor
            && self.location == other.location
            && self.description == other.description
    }
}

/// Ring buffer of fingerprints; the oldest entry is evicted once full
#[derive(Debug)]
pub struct RecentEventWindow {
    entries: VecDeque<Fingerprint>,
    capacity: usize,
}

impl RecentEventWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// True if an equivalent event was recorded less than `threshold` before
    /// (or after) this one
    pub fn is_duplicate(&self, fingerprint: &Fingerprint, threshold: Duration) -> bool {
        self.entries.iter().any(|seen| {
            seen.same_event(fingerprint)
                && (fingerprint.timestamp - seen.timestamp).abs() < threshold
        })
    }

    pub fn record(&mut self, fingerprint: Fingerprint) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(fingerprint);
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
}
