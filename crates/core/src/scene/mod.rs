//! Plain-data frame handed to the renderer.
//!
//! Carried items are reported by owner only. The renderer resolves world
//! transforms from the owner (an actor's gripper, a station, a tray slot).

use serde::{Deserialize, Serialize};

use crate::{
    rig::Pose, selector::SelectionMode, storage::Slot, ActorId, ItemId, ItemKind, Owner, Side,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorPose {
    pub actor: ActorId,
    pub side: Side,
    #[serde(flatten)]
    pub pose: Pose,
    pub carrying: Option<ItemId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemPlacement {
    pub item: ItemId,
    pub kind: ItemKind,
    pub owner: Owner,
    /// Tray slot for stored items.
    pub slot: Option<Slot>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageOccupancy {
    pub left: usize,
    pub right: usize,
}

impl StorageOccupancy {
    pub fn get(&self, side: Side) -> usize {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }
}

/// Running totals since construction or the last reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub cycles_completed: u64,
    pub spawned: u64,
    pub transformed: u64,
    pub placed: u64,
    pub evicted: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellSnapshot {
    /// Simulated seconds since start or reset.
    pub elapsed: f64,
    /// Seconds into the current cycle.
    pub loop_time: f64,
    pub cycle_index: u64,
    pub phase_name: String,
    pub phase_label: String,
    pub progress: f64,
    pub paused: bool,
    pub speed: f64,
    pub mode: SelectionMode,
    pub actors: Vec<ActorPose>,
    pub items: Vec<ItemPlacement>,
    pub storage_occupancy: StorageOccupancy,
    /// Angle of the processing indicators, radians in `[0, 2π)`.
    pub indicator_angle: f64,
    pub counters: Counters,
}

impl CellSnapshot {
    pub fn actor(&self, actor: ActorId) -> Option<&ActorPose> {
        self.actors.iter().find(|pose| pose.actor == actor)
    }

    pub fn item(&self, item: ItemId) -> Option<&ItemPlacement> {
        self.items.iter().find(|placement| placement.item == item)
    }

    pub fn items_owned_by(&self, owner: Owner) -> impl Iterator<Item = &ItemPlacement> {
        self.items.iter().filter(move |placement| placement.owner == owner)
    }
}
