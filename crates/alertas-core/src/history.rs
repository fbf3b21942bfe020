use crate::types::Incident;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Closed entries beyond this count fall off the back.
pub const CLOSED_HISTORY_CAP: usize = 100;

/// Bounded record of incidents that left the active feed, most-recent-first.
///
/// Two independent bounds apply: this buffer caps memory at
/// [`CLOSED_HISTORY_CAP`] entries, while rendering additionally windows on
/// `closed_at` (see [`crate::reconcile::CLOSED_VISIBILITY_MINS`]).
#[derive(Debug, Clone, Default)]
pub struct ClosedHistory {
    entries: VecDeque<Incident>,
}

impl ClosedHistory {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Prepend a newly-closed incident and enforce the capacity bound.
    pub fn record(&mut self, incident: Incident) {
        self.entries.push_front(incident);
        self.entries.truncate(CLOSED_HISTORY_CAP);
    }

    /// Entries closed at or after `cutoff`.
    pub fn recent(&self, cutoff: DateTime<Utc>) -> impl Iterator<Item = &Incident> {
        self.entries
            .iter()
            .filter(move |i| i.closed_at.map_or(false, |ts| ts >= cutoff))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Incident> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
