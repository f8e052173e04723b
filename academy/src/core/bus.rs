//! Mission-scoped mistake and scripted-event bus.
//!
//! Both channels keep only their latest record. Records are stamped with a
//! bus-wide sequence number that survives resets.

use std::sync::Arc;

use serde::Serialize;

use crate::core::types::{Millis, MistakeKind, ScriptedEvent, Stamped};

/// Immutable bus snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BusState {
    pub mistake_count: u32,
    pub last_error: Option<Stamped<MistakeKind>>,
    pub last_event: Option<Stamped<ScriptedEvent>>,
}

#[derive(Debug, Clone, Default)]
pub struct EventBus {
    state: Arc<BusState>,
    next_seq: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<BusState> {
        Arc::clone(&self.state)
    }

    /// Count a mistake and make it the latest error. Every call counts.
    pub fn record_mistake(&mut self, kind: MistakeKind, at: Millis) -> u64 {
        let seq = self.stamp();
        let mut next = (*self.state).clone();
        next.mistake_count += 1;
        next.last_error = Some(Stamped {
            seq,
            at,
            value: kind,
        });
        self.state = Arc::new(next);
        seq
    }

    pub fn trigger_event(&mut self, event: ScriptedEvent, at: Millis) -> u64 {
        let seq = self.stamp();
        let mut next = (*self.state).clone();
        next.last_event = Some(Stamped {
            seq,
            at,
            value: event,
        });
        self.state = Arc::new(next);
        seq
    }

    /// Clean slate for a new current mission.
    pub fn reset(&mut self) {
        self.state = Arc::new(BusState::default());
    }

    fn stamp(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_mistakes_all_count() {
        let mut bus = EventBus::new();
        let first = bus.record_mistake(MistakeKind::WrongLetter, 10);
        let second = bus.record_mistake(MistakeKind::WrongLetter, 10);
        let state = bus.snapshot();
        assert_eq!(state.mistake_count, 2);
        assert!(second > first);
        assert_eq!(state.last_error.as_ref().map(|e| e.seq), Some(second));
    }

    #[test]
    fn reset_clears_records_but_keeps_sequence_moving() {
        let mut bus = EventBus::new();
        let before = bus.trigger_event(ScriptedEvent::MitmFirstBreach, 5);
        bus.record_mistake(MistakeKind::Breach, 5);
        bus.reset();

        let cleared = bus.snapshot();
        assert_eq!(cleared.mistake_count, 0);
        assert!(cleared.last_error.is_none());
        assert!(cleared.last_event.is_none());

        let after = bus.trigger_event(ScriptedEvent::MitmFirstBreach, 6);
        assert!(after > before);
    }

    #[test]
    fn held_snapshot_is_unchanged_by_later_records() {
        let mut bus = EventBus::new();
        let held = bus.snapshot();
        bus.record_mistake(MistakeKind::RailPlacement, 1);
        assert_eq!(held.mistake_count, 0);
        assert_eq!(bus.snapshot().mistake_count, 1);
    }
}
