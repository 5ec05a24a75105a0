//! Bounded storage trays.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::{ItemId, ItemRegistry, Result, Side, WorkcellError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub row: usize,
    pub col: usize,
}

/// Outcome of a single [`SlotAllocator::place`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub slot: Slot,
    pub evicted: Option<ItemId>,
}

/// FIFO tray for one storage station.
///
/// Eviction triggers only once the tray holds *more* than `rows * cols`
/// items, so a full tray briefly tolerates one extra occupant.
#[derive(Debug, Clone)]
pub struct SlotAllocator {
    side: Side,
    rows: usize,
    cols: usize,
    occupants: VecDeque<ItemId>,
    placed: u64,
    evicted: u64,
}

impl SlotAllocator {
    pub fn new(side: Side, rows: usize, cols: usize) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(WorkcellError::config(format!(
                "tray must have at least one row and column, got {rows}x{cols}"
            )));
        }
        Ok(Self {
            side,
            rows,
            cols,
            occupants: VecDeque::new(),
            placed: 0,
            evicted: 0,
        })
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn capacity(&self) -> usize {
        self.rows * self.cols
    }

    pub fn len(&self) -> usize {
        self.occupants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occupants.is_empty()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.occupants.contains(&id)
    }

    pub fn placed(&self) -> u64 {
        self.placed
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Slot of the `index`-th occupant in placement order.
    pub fn slot_for(&self, index: usize) -> Slot {
        Slot {
            row: index / self.cols,
            col: index % self.cols,
        }
    }

    /// Appends `id` and returns the slot it was assigned on insertion. If the
    /// tray then exceeds capacity, the oldest occupant is removed and
    /// destroyed in `registry`.
    pub fn place(&mut self, id: ItemId, registry: &mut ItemRegistry) -> Result<Placement> {
        if self.contains(id) {
            return Err(WorkcellError::invariant(format!(
                "{id} is already stored in the {:?} tray",
                self.side
            )));
        }

        let slot = self.slot_for(self.occupants.len());
        self.occupants.push_back(id);
        self.placed += 1;

        let mut evicted = None;
        if self.occupants.len() > self.capacity() {
            if let Some(oldest) = self.occupants.pop_front() {
                registry.destroy(oldest)?;
                self.evicted += 1;
                evicted = Some(oldest);
            }
        }

        Ok(Placement { slot, evicted })
    }

    /// Current occupants with the slot their queue position maps to.
    pub fn placements(&self) -> impl Iterator<Item = (ItemId, Slot)> + '_ {
        self.occupants
            .iter()
            .enumerate()
            .map(|(index, id)| (*id, self.slot_for(index)))
    }

    pub fn slot_of(&self, id: ItemId) -> Option<Slot> {
        self.occupants
            .iter()
            .position(|occupant| *occupant == id)
            .map(|index| self.slot_for(index))
    }

    /// Forgets all occupants and counters. Items are not destroyed here; the
    /// registry is cleared alongside on reset.
    pub fn clear(&mut self) {
        self.occupants.clear();
        self.placed = 0;
        self.evicted = 0;
    }
}

/// The left and right storage trays, addressed by side.
#[derive(Debug, Clone)]
pub struct Trays {
    pub left: SlotAllocator,
    pub right: SlotAllocator,
}

impl Trays {
    pub fn new(rows: usize, cols: usize) -> Result<Self> {
        Ok(Self {
            left: SlotAllocator::new(Side::Left, rows, cols)?,
            right: SlotAllocator::new(Side::Right, rows, cols)?,
        })
    }

    pub fn get(&self, side: Side) -> &SlotAllocator {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn get_mut(&mut self, side: Side) -> &mut SlotAllocator {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &SlotAllocator> {
        [&self.left, &self.right].into_iter()
    }

    pub fn placed(&self) -> u64 {
        self.left.placed() + self.right.placed()
    }

    pub fn evicted(&self) -> u64 {
        self.left.evicted() + self.right.evicted()
    }

    pub fn clear(&mut self) {
        self.left.clear();
        self.right.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StationId;

    fn stored(registry: &mut ItemRegistry) -> ItemId {
        registry.spawn(StationId::Storage(Side::Left))
    }

    #[test]
    fn assigns_row_major_slots() {
        let mut registry = ItemRegistry::new();
        let mut tray = SlotAllocator::new(Side::Left, 2, 3).unwrap();

        let slots: Vec<Slot> = (0..4)
            .map(|_| {
                let id = stored(&mut registry);
                tray.place(id, &mut registry).unwrap().slot
            })
            .collect();

        assert_eq!(slots[0], Slot { row: 0, col: 0 });
        assert_eq!(slots[2], Slot { row: 0, col: 2 });
        assert_eq!(slots[3], Slot { row: 1, col: 0 });
    }

    #[test]
    fn evicts_oldest_only_past_capacity() {
        let mut registry = ItemRegistry::new();
        let mut tray = SlotAllocator::new(Side::Left, 2, 2).unwrap();
        let capacity = tray.capacity();
        let mut ids = Vec::new();
        let mut peak = 0;

        for _ in 0..capacity + 2 {
            let id = stored(&mut registry);
            ids.push(id);
            let placement = tray.place(id, &mut registry).unwrap();
            peak = peak.max(tray.len());
            assert_eq!(placement.evicted.is_some(), ids.len() > capacity);
        }

        assert_eq!(tray.evicted(), 2);
        assert!(!tray.contains(ids[0]));
        assert!(!tray.contains(ids[1]));
        assert!(registry.get(ids[0]).is_none());
        assert!(registry.get(ids[1]).is_none());
        assert!(peak <= capacity + 1);
        assert_eq!(tray.len(), capacity);
    }

    #[test]
    fn grace_slot_sits_past_the_grid() {
        let mut registry = ItemRegistry::new();
        let mut tray = SlotAllocator::new(Side::Right, 1, 2).unwrap();
        for _ in 0..2 {
            let id = stored(&mut registry);
            tray.place(id, &mut registry).unwrap();
        }

        let id = stored(&mut registry);
        let placement = tray.place(id, &mut registry).unwrap();

        assert_eq!(placement.slot, Slot { row: 1, col: 0 });
        assert!(placement.evicted.is_some());
        assert_eq!(tray.slot_of(id), Some(Slot { row: 0, col: 1 }));
    }

    #[test]
    fn rejects_double_placement() {
        let mut registry = ItemRegistry::new();
        let mut tray = SlotAllocator::new(Side::Left, 2, 2).unwrap();
        let id = stored(&mut registry);
        tray.place(id, &mut registry).unwrap();

        assert!(tray.place(id, &mut registry).is_err());
    }

    #[test]
    fn rejects_empty_grid() {
        assert!(SlotAllocator::new(Side::Left, 0, 3).is_err());
    }
}
