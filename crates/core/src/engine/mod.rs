//! The per-frame choreography pass.
//!
//! [`Choreographer`] owns the whole simulation state. Each [`tick`] advances
//! the clock, finishes any cycles the frame crossed, fires the latches now
//! due, recomputes poses and verifies custody before returning a snapshot.
//! Actors are always processed in ascending id order, so when two actors
//! share a tray the first actor's item takes the earlier slot.
//!
//! [`tick`]: Choreographer::tick

use std::f64::consts::TAU;
use std::time::Duration;

use crate::{
    events::{CellEvent, EventLog},
    rig::{ActorRig, Cursor, LatchContext, LatchPlan, MotionTable, RigGeometry},
    scene::{ActorPose, CellSnapshot, Counters, ItemPlacement, StorageOccupancy},
    selector::{SelectionMode, TargetSelector},
    storage::Trays,
    timeline::{CycleClock, PhaseTimeline},
    ActorId, CellConfig, ItemId, ItemRegistry, Owner, Result, StationId, WorkcellError,
};

#[derive(Debug)]
pub struct Choreographer {
    config: CellConfig,
    clock: CycleClock,
    timeline: PhaseTimeline,
    plan: LatchPlan,
    table: MotionTable,
    geometry: RigGeometry,
    selector: TargetSelector,
    registry: ItemRegistry,
    trays: Trays,
    rigs: Vec<ActorRig>,
    events: EventLog,
    /// Cycle whose latches the rigs are currently walking. Trails the clock's
    /// cycle index only inside [`Choreographer::tick`].
    active_cycle: u64,
    cycles_completed: u64,
}

impl Choreographer {
    /// Validates `config` and builds an engine at `elapsed = 0`.
    ///
    /// # Errors
    ///
    /// Any [`WorkcellError::Configuration`] stops the engine from starting.
    pub fn new(config: CellConfig) -> Result<Self> {
        config.validate()?;

        let timeline = PhaseTimeline::from_config(&config)?;
        let clock = CycleClock::new(timeline.cycle_duration())?;
        let table = MotionTable::from_rules(&config.motion)?;
        table.covers(&timeline)?;
        let plan = LatchPlan::build(&timeline, &config.latches);
        let geometry = config.geometry();
        let selector = TargetSelector::new(config.actors.mode, config.actors.count);
        let rigs = selector
            .assignments()
            .iter()
            .enumerate()
            .map(|(index, assignment)| ActorRig::new(ActorId(index), *assignment, &geometry))
            .collect();
        let trays = Trays::new(config.tray.rows, config.tray.cols)?;
        let events = EventLog::with_capacity(config.event_capacity);

        tracing::info!(
            cycle = ?timeline.cycle_duration(),
            phases = timeline.phases().len(),
            actors = config.actors.count,
            mode = %config.actors.mode,
            "choreographer ready"
        );

        let mut engine = Self {
            config,
            clock,
            timeline,
            plan,
            table,
            geometry,
            selector,
            registry: ItemRegistry::new(),
            trays,
            rigs,
            events,
            active_cycle: 0,
            cycles_completed: 0,
        };
        engine.log_cycle_start();
        Ok(engine)
    }

    /// Advances by `frame_delta` real seconds (scaled by the speed) and
    /// returns the resulting frame.
    ///
    /// # Errors
    ///
    /// Returns [`WorkcellError::InvariantViolation`] or
    /// [`WorkcellError::NoActivePhase`] if custody bookkeeping breaks. The
    /// engine should not be ticked further after an error.
    pub fn tick(&mut self, frame_delta: f64) -> Result<CellSnapshot> {
        let crossed = self.clock.advance(frame_delta);
        if crossed > 1 {
            tracing::debug!(crossed, "frame spans several cycles, catching up");
        }
        self.sync()?;
        self.snapshot()
    }

    pub fn set_speed(&mut self, speed: f64) {
        self.clock.set_speed(speed);
    }

    pub fn toggle_pause(&mut self) {
        self.clock.toggle_pause();
        tracing::info!(paused = self.clock.is_paused(), "pause toggled");
    }

    /// Requests a selection mode. It takes effect at the next cycle boundary
    /// or reset, never mid-cycle.
    pub fn set_configuration(&mut self, mode: SelectionMode) {
        self.selector.request(mode);
    }

    /// Returns to `elapsed = 0` with no items, empty trays and zeroed
    /// counters. Speed and pause state are kept.
    pub fn reset(&mut self) {
        self.clock.reset();
        self.registry.clear();
        self.trays.clear();
        self.events.clear();
        self.selector.reset();
        for (rig, assignment) in self.rigs.iter_mut().zip(self.selector.assignments()) {
            rig.reset(*assignment, &self.geometry);
        }
        self.active_cycle = 0;
        self.cycles_completed = 0;
        tracing::info!(mode = %self.selector.mode(), "choreographer reset");
        self.log_cycle_start();
    }

    /// Builds the frame for the current state without advancing time.
    pub fn snapshot(&self) -> Result<CellSnapshot> {
        let sample = self.timeline.resolve(self.clock.loop_time())?;

        let actors = self
            .rigs
            .iter()
            .map(|rig| ActorPose {
                actor: rig.id(),
                side: rig.assignment().side,
                pose: rig.pose(),
                carrying: rig.carrying(),
            })
            .collect();

        let items = self
            .registry
            .items()
            .map(|item| ItemPlacement {
                item: item.id,
                kind: item.kind,
                owner: item.owner,
                slot: match item.owner {
                    Owner::Station(StationId::Storage(side)) => {
                        self.trays.get(side).slot_of(item.id)
                    }
                    _ => None,
                },
            })
            .collect();

        let elapsed = self.clock.elapsed().as_secs_f64();
        Ok(CellSnapshot {
            elapsed,
            loop_time: self.clock.loop_time().as_secs_f64(),
            cycle_index: self.clock.cycle_index(),
            phase_name: sample.phase.name.clone(),
            phase_label: sample.phase.label.clone(),
            progress: sample.progress,
            paused: self.clock.is_paused(),
            speed: self.clock.speed(),
            mode: self.selector.mode(),
            actors,
            items,
            storage_occupancy: StorageOccupancy {
                left: self.trays.left.len(),
                right: self.trays.right.len(),
            },
            indicator_angle: (elapsed * self.config.stations.indicator_speed).rem_euclid(TAU),
            counters: self.counters(),
        })
    }

    pub fn counters(&self) -> Counters {
        Counters {
            cycles_completed: self.cycles_completed,
            spawned: self.registry.spawned(),
            transformed: self.registry.transforms(),
            placed: self.trays.placed(),
            evicted: self.trays.evicted(),
        }
    }

    pub fn config(&self) -> &CellConfig {
        &self.config
    }

    pub fn clock(&self) -> &CycleClock {
        &self.clock
    }

    pub fn timeline(&self) -> &PhaseTimeline {
        &self.timeline
    }

    pub fn registry(&self) -> &ItemRegistry {
        &self.registry
    }

    pub fn trays(&self) -> &Trays {
        &self.trays
    }

    pub fn rigs(&self) -> &[ActorRig] {
        &self.rigs
    }

    pub fn mode(&self) -> SelectionMode {
        self.selector.mode()
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Hands over the events logged since the last call.
    pub fn take_events(&mut self) -> Vec<CellEvent> {
        self.events.drain()
    }

    fn sync(&mut self) -> Result<()> {
        let target = self.clock.cycle_index();
        while self.active_cycle < target {
            self.fire_latches(Cursor::EndOfCycle, self.timeline.cycle_duration())?;
            self.begin_cycle(self.active_cycle + 1)?;
        }

        let loop_time = self.clock.loop_time();
        let sample = self.timeline.resolve(loop_time)?;
        let (phase_index, kind, progress) = (sample.index, sample.phase.kind, sample.progress);

        self.fire_latches(
            Cursor::At {
                phase_index,
                progress,
            },
            loop_time,
        )?;
        for rig in &mut self.rigs {
            rig.update_pose(kind, progress, &self.table, &self.geometry)?;
        }
        self.verify()
    }

    fn fire_latches(&mut self, cursor: Cursor, at: Duration) -> Result<()> {
        let mut ctx = LatchContext {
            registry: &mut self.registry,
            trays: &mut self.trays,
            events: &mut self.events,
            cycle: self.active_cycle,
            at,
        };
        for rig in &mut self.rigs {
            rig.fire_due(&self.plan, cursor, &mut ctx)?;
        }
        Ok(())
    }

    fn begin_cycle(&mut self, cycle: u64) -> Result<()> {
        self.active_cycle = cycle;
        self.cycles_completed += 1;
        self.selector.begin_cycle(cycle);
        for rig in &mut self.rigs {
            let assignment = self.selector.assignment(rig.id()).ok_or_else(|| {
                WorkcellError::invariant(format!("no assignment for {}", rig.id()))
            })?;
            rig.begin_cycle(assignment)?;
        }
        tracing::info!(
            cycle,
            left = self.trays.left.len(),
            right = self.trays.right.len(),
            "cycle started"
        );
        self.log_cycle_start();
        Ok(())
    }

    fn log_cycle_start(&mut self) {
        self.events.log(CellEvent::CycleStarted {
            cycle: self.active_cycle,
            at: Duration::ZERO,
        });
    }

    /// Custody must agree between the registry, every rig and both trays.
    fn verify(&self) -> Result<()> {
        let carrying: Vec<(ActorId, Option<ItemId>)> = self
            .rigs
            .iter()
            .map(|rig| (rig.id(), rig.carrying()))
            .collect();
        self.registry.verify(&carrying)?;

        for tray in self.trays.iter() {
            let expected = Owner::Station(StationId::Storage(tray.side()));
            for (item, _) in tray.placements() {
                if self.registry.owner_of(item) != Some(expected) {
                    return Err(WorkcellError::invariant(format!(
                        "{item} sits in the {:?} tray but is owned by {:?}",
                        tray.side(),
                        self.registry.owner_of(item)
                    )));
                }
            }
            let stored = self.registry.items_owned_by(expected).count();
            if stored != tray.len() {
                return Err(WorkcellError::invariant(format!(
                    "{} items are owned by the {:?} tray which holds {}",
                    stored,
                    tray.side(),
                    tray.len()
                )));
            }
        }
        Ok(())
    }
}
