//! The Event Store: an append-only, id-keyed ring buffer with bounded
//! retention. Owns its own synchronization (a single `parking_lot::Mutex`)
//! so it is safe to share across the Observer, Reasoner, Decider, Actor,
//! and Restore Scheduler tasks without any other shared mutable state.

use super::types::{Event, EventPayload};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;

struct Inner {
    events: VecDeque<Event>,
    next_id: u64,
    /// Total appends across the process lifetime — stays monotone even as
    /// the ring evicts, matching the `total_events` counter in `GET
    /// /api/stats`.
    total_appended: u64,
    capacity: usize,
}

pub struct EventStore {
    inner: Mutex<Inner>,
}

impl EventStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                events: VecDeque::with_capacity(capacity.min(1024)),
                next_id: 0,
                total_appended: 0,
                capacity,
            }),
        }
    }

    /// Appends `payload`, assigning it the next monotone id. Returns the
    /// fully-materialized `Event` so the caller can hand it to the bus.
    pub fn append(&self, cycle: u64, payload: EventPayload) -> Event {
        let mut guard = self.inner.lock();
        let id = guard.next_id;
        guard.next_id += 1;
        guard.total_appended += 1;

        let event = Event {
            id,
            timestamp: Utc::now(),
            cycle,
            payload,
        };
        guard.events.push_back(event.clone());
        while guard.events.len() > guard.capacity {
            guard.events.pop_front();
        }
        event
    }

    pub fn total_events(&self) -> u64 {
        self.inner.lock().total_appended
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most recent `limit` events, newest last (matches the dashboard's
    /// append-order rendering expectation).
    pub fn recent(&self, limit: usize) -> Vec<Event> {
        let guard = self.inner.lock();
        let len = guard.events.len();
        let skip = len.saturating_sub(limit);
        guard.events.iter().skip(skip).cloned().collect()
    }

    /// Events with id in `[from_id, from_id + limit)`, via binary search
    /// against the strictly-increasing id sequence.
    pub fn range_from_id(&self, from_id: u64, limit: usize) -> Vec<Event> {
        let guard = self.inner.lock();
        let idx = guard
            .events
            .binary_search_by(|e| e.id.cmp(&from_id))
            .unwrap_or_else(|insert_at| insert_at);
        guard.events.iter().skip(idx).take(limit).cloned().collect()
    }

    pub fn range_since(&self, since: DateTime<Utc>, limit: usize) -> Vec<Event> {
        let guard = self.inner.lock();
        guard
            .events
            .iter()
            .filter(|e| e.timestamp >= since)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Recent events whose payload kind name matches any of `kinds`.
    pub fn recent_of_kind(&self, kinds: &[&str], limit: usize) -> Vec<Event> {
        let guard = self.inner.lock();
        guard
            .events
            .iter()
            .rev()
            .filter(|e| kinds.contains(&e.payload.kind_name()))
            .take(limit)
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect()
    }

    /// `ReasoningEvent`s whose classification kind is not `NATURAL`.
    pub fn recent_threats(&self, limit: usize) -> Vec<Event> {
        let guard = self.inner.lock();
        guard
            .events
            .iter()
            .rev()
            .filter(|e| matches!(
                &e.payload,
                EventPayload::ReasoningEvent { classification }
                    if classification.kind != crate::models::ClassificationKind::Natural
            ))
            .take(limit)
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::LifecycleLevel;

    fn lifecycle(msg: &str) -> EventPayload {
        EventPayload::AgentLifecycleEvent {
            level: LifecycleLevel::Info,
            message: msg.to_string(),
        }
    }

    #[test]
    fn ids_are_strictly_increasing() {
        let store = EventStore::new(100);
        let e1 = store.append(0, lifecycle("a"));
        let e2 = store.append(0, lifecycle("b"));
        assert!(e2.id > e1.id);
    }

    #[test]
    fn capacity_plus_one_evicts_oldest_but_total_stays_monotone() {
        let store = EventStore::new(3);
        for i in 0..4 {
            store.append(i, lifecycle(&format!("event-{i}")));
        }
        assert_eq!(store.len(), 3);
        assert_eq!(store.total_events(), 4);

        let recent = store.recent(10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].id, 1); // event 0 was evicted
    }

    #[test]
    fn range_from_id_returns_requested_window() {
        let store = EventStore::new(100);
        for i in 0..10 {
            store.append(i, lifecycle(&format!("e{i}")));
        }
        let window = store.range_from_id(5, 3);
        assert_eq!(window.len(), 3);
        assert_eq!(window[0].id, 5);
        assert_eq!(window[2].id, 7);
    }
}
