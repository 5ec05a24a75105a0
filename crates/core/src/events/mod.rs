//! Ordered record of every latch the engine fires.
//!
//! Each event carries the cycle it belongs to and the loop time at which the
//! engine applied it. When a frame catches up on skipped phases, several
//! events share one loop time but keep their choreographic order.
//!
//! The log is bounded. Once it holds `capacity` events the oldest are
//! dropped, so a cell left running indefinitely keeps a fixed footprint.
//! Consumers that need every event drain the log each frame.

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{storage::Slot, ActorId, ItemId, Side, StationId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CellEvent {
    CycleStarted {
        cycle: u64,
        at: Duration,
    },
    Spawned {
        cycle: u64,
        at: Duration,
        actor: ActorId,
        item: ItemId,
    },
    /// Item moved from a station into an actor's gripper.
    Attached {
        cycle: u64,
        at: Duration,
        actor: ActorId,
        item: ItemId,
        from: StationId,
    },
    /// Item handed from an actor to a station.
    Released {
        cycle: u64,
        at: Duration,
        actor: ActorId,
        item: ItemId,
        to: StationId,
    },
    Transformed {
        cycle: u64,
        at: Duration,
        item: ItemId,
        station: StationId,
    },
    Placed {
        cycle: u64,
        at: Duration,
        item: ItemId,
        side: Side,
        /// Slot the item was inserted at. When the placement overflows the
        /// tray this is one row past the grid, and the `Evicted` event that
        /// follows shifts every stored item one slot forward. Snapshots
        /// report the shifted slot.
        slot: Slot,
    },
    Evicted {
        cycle: u64,
        at: Duration,
        item: ItemId,
        side: Side,
    },
}

impl CellEvent {
    pub fn cycle(&self) -> u64 {
        match self {
            CellEvent::CycleStarted { cycle, .. }
            | CellEvent::Spawned { cycle, .. }
            | CellEvent::Attached { cycle, .. }
            | CellEvent::Released { cycle, .. }
            | CellEvent::Transformed { cycle, .. }
            | CellEvent::Placed { cycle, .. }
            | CellEvent::Evicted { cycle, .. } => *cycle,
        }
    }

    pub fn item(&self) -> Option<ItemId> {
        match self {
            CellEvent::CycleStarted { .. } => None,
            CellEvent::Spawned { item, .. }
            | CellEvent::Attached { item, .. }
            | CellEvent::Released { item, .. }
            | CellEvent::Transformed { item, .. }
            | CellEvent::Placed { item, .. }
            | CellEvent::Evicted { item, .. } => Some(*item),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            CellEvent::CycleStarted { .. } => "cycle_started",
            CellEvent::Spawned { .. } => "spawned",
            CellEvent::Attached { .. } => "attached",
            CellEvent::Released { .. } => "released",
            CellEvent::Transformed { .. } => "transformed",
            CellEvent::Placed { .. } => "placed",
            CellEvent::Evicted { .. } => "evicted",
        }
    }
}

/// Events retained when no capacity is configured.
pub const DEFAULT_EVENT_CAPACITY: usize = 4096;

#[derive(Debug, Clone)]
pub struct EventLog {
    events: VecDeque<CellEvent>,
    capacity: usize,
    dropped: u64,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log that keeps at most `capacity` events (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity.min(DEFAULT_EVENT_CAPACITY)),
            capacity,
            dropped: 0,
        }
    }

    pub fn log(&mut self, event: CellEvent) {
        tracing::debug!(
            kind = event.event_type(),
            cycle = event.cycle(),
            item = ?event.item(),
            "latch fired"
        );
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.dropped += 1;
        }
        self.events.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events discarded because the log was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn events(&self) -> impl Iterator<Item = &CellEvent> {
        self.events.iter()
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<&CellEvent> {
        self.events
            .iter()
            .filter(|event| event.event_type() == event_type)
            .collect()
    }

    pub fn events_for_item(&self, item: ItemId) -> Vec<&CellEvent> {
        self.events
            .iter()
            .filter(|event| event.item() == Some(item))
            .collect()
    }

    /// Removes and returns everything retained so far, oldest first.
    pub fn drain(&mut self) -> Vec<CellEvent> {
        self.events.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.dropped = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_by_type_and_item() {
        let mut log = EventLog::new();
        log.log(CellEvent::CycleStarted {
            cycle: 0,
            at: Duration::ZERO,
        });
        log.log(CellEvent::Spawned {
            cycle: 0,
            at: Duration::ZERO,
            actor: ActorId(0),
            item: ItemId(1),
        });
        log.log(CellEvent::Transformed {
            cycle: 0,
            at: Duration::from_secs(5),
            item: ItemId(1),
            station: StationId::Processing(Side::Left),
        });

        assert_eq!(log.events_of_type("spawned").len(), 1);
        assert_eq!(log.events_for_item(ItemId(1)).len(), 2);

        let drained = log.drain();
        assert_eq!(drained.len(), 3);
        assert!(log.is_empty());
    }

    #[test]
    fn full_log_drops_oldest_events() {
        let mut log = EventLog::with_capacity(2);
        for cycle in 0..5 {
            log.log(CellEvent::CycleStarted {
                cycle,
                at: Duration::ZERO,
            });
        }

        assert_eq!(log.len(), 2);
        assert_eq!(log.dropped(), 3);
        let cycles: Vec<u64> = log.events().map(CellEvent::cycle).collect();
        assert_eq!(cycles, vec![3, 4]);

        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.dropped(), 0);
    }

    #[test]
    fn serializes_with_type_tag() {
        let event = CellEvent::Evicted {
            cycle: 3,
            at: Duration::from_millis(7250),
            item: ItemId(2),
            side: Side::Right,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "evicted");
        assert_eq!(json["side"], "right");
    }
}
