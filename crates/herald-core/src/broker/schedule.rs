use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, FixedOffset, Utc};
use uuid::Uuid;

/// A pending one-shot timer for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledEntry {
    pub fire_at: DateTime<FixedOffset>,
    /// Cancellation handle: the revision of the message this timer fires.
    pub handle: Uuid,
}

/// In-memory one-shot timer index: message id -> (fire time, handle),
/// ordered by fire time.
///
/// Derived state only. The scheduler thread owns it exclusively and
/// rebuilds it from storage on startup. No internal synchronization.
#[derive(Debug, Default)]
pub struct ScheduleIndex {
    entries: HashMap<String, ScheduledEntry>,
    /// Deadline queue keyed by instant then id, so messages sharing a fire
    /// time (and possibly a handle) never collide.
    deadlines: BTreeSet<(DateTime<Utc>, String)>,
}

impl ScheduleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `id`, replacing any existing timer for it. Returns the
    /// replaced entry.
    pub fn insert(
        &mut self,
        id: &str,
        fire_at: DateTime<FixedOffset>,
        handle: Uuid,
    ) -> Option<ScheduledEntry> {
        let previous = self.remove(id);
        self.deadlines.insert((fire_at.with_timezone(&Utc), id.to_string()));
        self.entries
            .insert(id.to_string(), ScheduledEntry { fire_at, handle });
        previous
    }

    /// Cancel the timer for `id`, if any.
    pub fn remove(&mut self, id: &str) -> Option<ScheduledEntry> {
        let entry = self.entries.remove(id)?;
        self.deadlines.remove(&(entry.fire_at.with_timezone(&Utc), id.to_string()));
        Some(entry)
    }

    /// Cancel the timer for `id` only if it still carries `handle`.
    /// A newer timer for the same id is left alone.
    pub fn remove_if_handle(&mut self, id: &str, handle: Uuid) -> bool {
        match self.entries.get(id) {
            Some(entry) if entry.handle == handle => {
                self.remove(id);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&ScheduledEntry> {
        self.entries.get(id)
    }

    /// Remove and return every entry due at or before `now`, earliest first.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Vec<(String, ScheduledEntry)> {
        let mut due = Vec::new();
        while self.deadlines.first().is_some_and(|(at, _)| *at <= now) {
            let Some((_, id)) = self.deadlines.pop_first() else {
                break;
            };
            if let Some(scheduled) = self.entries.remove(&id) {
                due.push((id, scheduled));
            }
        }
        due
    }

    /// Fire time of the earliest pending entry.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.deadlines.first().map(|(at, _)| *at)
    }

    /// All pending entries, earliest first.
    pub fn entries(&self) -> Vec<(String, ScheduledEntry)> {
        self.deadlines
            .iter()
            .filter_map(|(_, id)| self.entries.get(id).map(|e| (id.clone(), *e)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.deadlines.clear();
    }
}
