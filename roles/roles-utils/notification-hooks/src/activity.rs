//! Capped, append-only activity log.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::event::ActivityEvent;

pub const DEFAULT_MAX_EVENTS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLog {
    /// Oldest first
    events: VecDeque<ActivityEvent>,
    max_events: usize,
    next_id: u64,
}

impl ActivityLog {
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::new(),
            max_events: max_events.max(1),
            next_id: 1,
        }
    }

    /// Append an event, assigning it the next id. Returns the id.
    pub fn push(&mut self, mut event: ActivityEvent) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        event.id = id;
        self.events.push_back(event);
        self.trim();
        id
    }

    pub fn set_max_events(&mut self, max_events: usize) {
        self.max_events = max_events.max(1);
        self.trim();
    }

    fn trim(&mut self) {
        while self.events.len() > self.max_events {
            self.events.pop_front();
        }
    }

    /// Returns false when no event has this id.
    pub fn mark_read(&mut self, id: u64) -> bool {
        match self.events.iter_mut().find(|e| e.id == id) {
            Some(event) => {
                event.read = true;
                true
            }
            None => false,
        }
    }

    /// Marks everything read and returns how many were unread.
    pub fn mark_all_read(&mut self) -> usize {
        let mut changed = 0;
        for event in self.events.iter_mut().filter(|e| !e.read) {
            event.read = true;
            changed += 1;
        }
        changed
    }

    pub fn unread_count(&self) -> usize {
        self.events.iter().filter(|e| !e.read).count()
    }

    /// The newest `n` events, newest first.
    pub fn recent(&self, n: usize) -> Vec<&ActivityEvent> {
        self.events.iter().rev().take(n).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActivityEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn max_events(&self) -> usize {
        self.max_events
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EVENTS)
    }
}
