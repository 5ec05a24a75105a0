//! Core library for the Workcell choreography engine.
//!
//! A work cell repeats one fixed cycle forever: a raw item spawns at the
//! source, an actor carries it to a processing station, the station
//! transforms it, and the actor carries it on to a storage tray. Everything
//! the renderer needs (poses, custody, tray slots) is derived from simulated
//! time by [`Choreographer::tick`].
//!
//! Each module owns one piece of that pass: the clock and phase timeline,
//! easing curves, the item registry, actor rigs with their latch plans, the
//! per-cycle target selector, storage trays, the event log and the snapshot
//! types handed to a [`FrameSink`].

pub mod config;
pub mod easing;
pub mod engine;
pub mod error;
pub mod events;
pub mod registry;
pub mod render;
pub mod rig;
pub mod scene;
pub mod selector;
pub mod storage;
pub mod timeline;

pub use config::{
    ActorConfig, CellConfig, JawConfig, LatchConfig, PhaseConfig, StationConfig, TrayConfig,
};
pub use easing::Easing;
pub use engine::Choreographer;
pub use error::{Result, WorkcellError};
pub use events::{CellEvent, EventLog, DEFAULT_EVENT_CAPACITY};
pub use registry::{ActorId, Item, ItemId, ItemKind, ItemRegistry, Owner, Side, StationId};
pub use render::{FrameSink, JsonLinesSink, TraceSink};
pub use rig::{ActorRig, MotionRule, MotionTable, Pose};
pub use scene::{ActorPose, CellSnapshot, Counters, ItemPlacement, StorageOccupancy};
pub use selector::{Assignment, SelectionMode, TargetSelector};
pub use storage::{Slot, SlotAllocator, Trays};
pub use timeline::{CycleClock, Phase, PhaseKind, PhaseTimeline};
