//! Actor kinematics and ownership latches.
//!
//! A rig turns `(phase kind, eased progress, assignment)` into a [`Pose`]
//! through the configurable [`MotionTable`], and walks a [`LatchPlan`] to hand
//! items between stations and itself. The plan cursor guarantees each latch
//! fires once per cycle and in order, including when a long frame skips over
//! whole phases.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    config::{JawConfig, LatchConfig},
    easing::{lerp, Easing},
    events::{CellEvent, EventLog},
    selector::Assignment,
    storage::Trays,
    timeline::{PhaseKind, PhaseTimeline},
    ActorId, ItemId, ItemRegistry, Owner, Result, Side, StationId, WorkcellError,
};

/// Angular reference points for the pivot joint. Target and storage angles
/// are mirrored by the side sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Waypoint {
    Neutral,
    Target,
    Storage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PivotLaw {
    Hold(Waypoint),
    Sweep { from: Waypoint, to: Waypoint },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JawWidth {
    Open,
    Grip,
    Release,
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JawLaw {
    Hold(JawWidth),
    Move { from: JawWidth, to: JawWidth },
}

/// Vertical wrist motion. `Dip` lowers to full reach at mid-phase and back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReachLaw {
    #[default]
    Raised,
    Dip,
}

/// Motion law for one phase kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionRule {
    pub phase: PhaseKind,
    pub pivot: PivotLaw,
    pub jaw: JawLaw,
    #[serde(default)]
    pub reach: ReachLaw,
    #[serde(default)]
    pub easing: Easing,
}

impl MotionRule {
    pub fn new(phase: PhaseKind, pivot: PivotLaw, jaw: JawLaw) -> Self {
        Self {
            phase,
            pivot,
            jaw,
            reach: ReachLaw::Raised,
            easing: Easing::Linear,
        }
    }

    pub fn dip(mut self) -> Self {
        self.reach = ReachLaw::Dip;
        self
    }

    pub fn eased(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }
}

/// The pick-process-place motion laws shared by every actor.
pub fn default_rules() -> Vec<MotionRule> {
    use JawWidth::*;
    use PhaseKind as P;
    use Waypoint::*;

    vec![
        MotionRule::new(P::Spawn, PivotLaw::Hold(Neutral), JawLaw::Hold(Open)),
        MotionRule::new(
            P::Pick,
            PivotLaw::Hold(Neutral),
            JawLaw::Move { from: Open, to: Grip },
        )
        .dip(),
        MotionRule::new(
            P::TransportToTarget,
            PivotLaw::Sweep {
                from: Neutral,
                to: Target,
            },
            JawLaw::Hold(Grip),
        )
        .eased(Easing::CubicInOut),
        MotionRule::new(
            P::Insert,
            PivotLaw::Hold(Target),
            JawLaw::Move {
                from: Grip,
                to: Release,
            },
        )
        .dip(),
        MotionRule::new(P::Hold, PivotLaw::Hold(Target), JawLaw::Hold(Release)),
        MotionRule::new(
            P::Exit,
            PivotLaw::Hold(Target),
            JawLaw::Move {
                from: Release,
                to: Grip,
            },
        )
        .dip(),
        MotionRule::new(
            P::TransportToStorage,
            PivotLaw::Sweep {
                from: Target,
                to: Storage,
            },
            JawLaw::Hold(Grip),
        )
        .eased(Easing::CubicInOut),
        MotionRule::new(
            P::Place,
            PivotLaw::Hold(Storage),
            JawLaw::Move { from: Grip, to: Drop },
        )
        .dip(),
        MotionRule::new(
            P::Reset,
            PivotLaw::Sweep {
                from: Storage,
                to: Neutral,
            },
            JawLaw::Move { from: Drop, to: Open },
        )
        .eased(Easing::QuadInOut),
    ]
}

/// Lookup table from phase kind to motion rule.
#[derive(Debug, Clone)]
pub struct MotionTable {
    rules: HashMap<PhaseKind, MotionRule>,
}

impl MotionTable {
    /// # Errors
    ///
    /// Rejects tables that list a phase kind twice.
    pub fn from_rules(rules: &[MotionRule]) -> Result<Self> {
        let mut table = HashMap::with_capacity(rules.len());
        for rule in rules {
            if table.insert(rule.phase, *rule).is_some() {
                return Err(WorkcellError::config(format!(
                    "motion table lists {:?} more than once",
                    rule.phase
                )));
            }
        }
        Ok(Self { rules: table })
    }

    pub fn rule(&self, kind: PhaseKind) -> Option<&MotionRule> {
        self.rules.get(&kind)
    }

    /// Checks that every phase of `timeline` has a rule.
    pub fn covers(&self, timeline: &PhaseTimeline) -> Result<()> {
        for phase in timeline.phases() {
            if !self.rules.contains_key(&phase.kind) {
                return Err(WorkcellError::config(format!(
                    "no motion rule for phase `{}` ({:?})",
                    phase.name, phase.kind
                )));
            }
        }
        Ok(())
    }
}

/// Physical dimensions the motion laws resolve against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigGeometry {
    /// Pivot angle of the left processing station, radians.
    pub processing_angle: f64,
    /// Pivot angle of the left storage station, radians.
    pub storage_angle: f64,
    pub jaw: JawConfig,
}

impl RigGeometry {
    pub fn angle(&self, waypoint: Waypoint, side: Side) -> f64 {
        match waypoint {
            Waypoint::Neutral => 0.0,
            Waypoint::Target => side.sign() * self.processing_angle,
            Waypoint::Storage => side.sign() * self.storage_angle,
        }
    }

    pub fn width(&self, width: JawWidth) -> f64 {
        match width {
            JawWidth::Open => self.jaw.open,
            JawWidth::Grip => self.jaw.grip,
            JawWidth::Release => self.jaw.release,
            JawWidth::Drop => self.jaw.drop,
        }
    }
}

/// Joint state of one actor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Rotation about the vertical axis, radians. Positive turns left.
    pub pivot_angle: f64,
    pub jaw_opening: f64,
    /// Wrist lowering in `[0, 1]`, `0` fully raised.
    pub reach: f64,
}

impl Pose {
    pub fn neutral(geometry: &RigGeometry) -> Self {
        Self {
            pivot_angle: 0.0,
            jaw_opening: geometry.jaw.open,
            reach: 0.0,
        }
    }

    /// Evaluates `rule` at `progress` (raw, easing is applied here).
    pub fn evaluate(rule: &MotionRule, progress: f64, side: Side, geometry: &RigGeometry) -> Self {
        let eased = rule.easing.apply(progress);
        let pivot_angle = match rule.pivot {
            PivotLaw::Hold(waypoint) => geometry.angle(waypoint, side),
            PivotLaw::Sweep { from, to } => lerp(
                geometry.angle(from, side),
                geometry.angle(to, side),
                eased,
            ),
        };
        let jaw_opening = match rule.jaw {
            JawLaw::Hold(width) => geometry.width(width),
            JawLaw::Move { from, to } => lerp(geometry.width(from), geometry.width(to), eased),
        };
        let reach = match rule.reach {
            ReachLaw::Raised => 0.0,
            ReachLaw::Dip => (std::f64::consts::PI * eased).sin().max(0.0),
        };
        Self {
            pivot_angle,
            jaw_opening,
            reach,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchAction {
    Spawn,
    Pick,
    Insert,
    Transform,
    Retrieve,
    Place,
}

/// A one-shot effect bound to a phase and a raw-progress threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Latch {
    pub phase_index: usize,
    pub threshold: f64,
    pub action: LatchAction,
}

/// Position within the cycle latches are evaluated against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cursor {
    At { phase_index: usize, progress: f64 },
    /// Every latch of the cycle is due.
    EndOfCycle,
}

impl Latch {
    pub fn is_due(&self, cursor: Cursor) -> bool {
        match cursor {
            Cursor::EndOfCycle => true,
            Cursor::At {
                phase_index,
                progress,
            } => {
                self.phase_index < phase_index
                    || (self.phase_index == phase_index && progress >= self.threshold)
            }
        }
    }
}

/// Latches of one cycle in firing order.
#[derive(Debug, Clone)]
pub struct LatchPlan {
    latches: Vec<Latch>,
}

impl LatchPlan {
    pub fn build(timeline: &PhaseTimeline, thresholds: &LatchConfig) -> Self {
        let latches = timeline
            .phases()
            .iter()
            .enumerate()
            .filter_map(|(phase_index, phase)| {
                let (action, threshold) = match phase.kind {
                    PhaseKind::Spawn => (LatchAction::Spawn, 0.0),
                    PhaseKind::Pick => (LatchAction::Pick, thresholds.grab_threshold),
                    PhaseKind::Insert => (LatchAction::Insert, thresholds.grab_threshold),
                    PhaseKind::Hold => (LatchAction::Transform, thresholds.transform_threshold),
                    PhaseKind::Exit => (LatchAction::Retrieve, thresholds.grab_threshold),
                    PhaseKind::Place => (LatchAction::Place, thresholds.grab_threshold),
                    PhaseKind::TransportToTarget
                    | PhaseKind::TransportToStorage
                    | PhaseKind::Reset => return None,
                };
                Some(Latch {
                    phase_index,
                    threshold,
                    action,
                })
            })
            .collect();
        Self { latches }
    }

    pub fn latches(&self) -> &[Latch] {
        &self.latches
    }

    pub fn len(&self) -> usize {
        self.latches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latches.is_empty()
    }
}

/// Mutable cell state a latch acts on.
pub struct LatchContext<'a> {
    pub registry: &'a mut ItemRegistry,
    pub trays: &'a mut Trays,
    pub events: &'a mut EventLog,
    pub cycle: u64,
    pub at: Duration,
}

/// One robotic actor.
#[derive(Debug, Clone)]
pub struct ActorRig {
    id: ActorId,
    assignment: Assignment,
    pose: Pose,
    carrying: Option<ItemId>,
    /// Item this actor works on during the current cycle.
    cycle_item: Option<ItemId>,
    next_latch: usize,
    transformed_this_hold: bool,
}

impl ActorRig {
    pub fn new(id: ActorId, assignment: Assignment, geometry: &RigGeometry) -> Self {
        Self {
            id,
            assignment,
            pose: Pose::neutral(geometry),
            carrying: None,
            cycle_item: None,
            next_latch: 0,
            transformed_this_hold: false,
        }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn assignment(&self) -> Assignment {
        self.assignment
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn carrying(&self) -> Option<ItemId> {
        self.carrying
    }

    pub fn cycle_item(&self) -> Option<ItemId> {
        self.cycle_item
    }

    /// Number of latches already fired this cycle.
    pub fn latches_fired(&self) -> usize {
        self.next_latch
    }

    /// Rearms the latch plan for a new cycle with a fresh assignment.
    ///
    /// # Errors
    ///
    /// The previous cycle must have finished: an actor still holding an item
    /// at the boundary is an invariant violation.
    pub fn begin_cycle(&mut self, assignment: Assignment) -> Result<()> {
        if let Some(item) = self.carrying {
            return Err(WorkcellError::invariant(format!(
                "{} enters a new cycle still carrying {item}",
                self.id
            )));
        }
        self.assignment = assignment;
        self.cycle_item = None;
        self.next_latch = 0;
        self.transformed_this_hold = false;
        Ok(())
    }

    /// Drops all custody and returns to neutral. Items are destroyed by the
    /// registry reset that accompanies this call.
    pub fn reset(&mut self, assignment: Assignment, geometry: &RigGeometry) {
        self.assignment = assignment;
        self.pose = Pose::neutral(geometry);
        self.carrying = None;
        self.cycle_item = None;
        self.next_latch = 0;
        self.transformed_this_hold = false;
    }

    pub fn update_pose(
        &mut self,
        kind: PhaseKind,
        progress: f64,
        table: &MotionTable,
        geometry: &RigGeometry,
    ) -> Result<Pose> {
        let rule = table
            .rule(kind)
            .ok_or_else(|| WorkcellError::invariant(format!("no motion rule for {kind:?}")))?;
        self.pose = Pose::evaluate(rule, progress, self.assignment.side, geometry);
        Ok(self.pose)
    }

    /// Fires every latch of `plan` that is due at `cursor` and has not fired
    /// yet this cycle. Returns how many fired.
    pub fn fire_due(
        &mut self,
        plan: &LatchPlan,
        cursor: Cursor,
        ctx: &mut LatchContext<'_>,
    ) -> Result<usize> {
        let mut fired = 0;
        while let Some(latch) = plan.latches().get(self.next_latch) {
            if !latch.is_due(cursor) {
                break;
            }
            self.apply(latch.action, ctx)?;
            self.next_latch += 1;
            fired += 1;
        }
        Ok(fired)
    }

    fn apply(&mut self, action: LatchAction, ctx: &mut LatchContext<'_>) -> Result<()> {
        match action {
            LatchAction::Spawn => {
                if self.cycle_item.is_none() {
                    let item = ctx.registry.spawn(StationId::Source);
                    self.cycle_item = Some(item);
                    ctx.events.log(CellEvent::Spawned {
                        cycle: ctx.cycle,
                        at: ctx.at,
                        actor: self.id,
                        item,
                    });
                }
                Ok(())
            }
            LatchAction::Pick | LatchAction::Retrieve => {
                let item = self.require_item(action)?;
                self.attach(item, ctx)
            }
            LatchAction::Insert => {
                let item = self.require_item(action)?;
                self.release(item, self.assignment.processing, ctx)
            }
            LatchAction::Transform => {
                let item = self.require_item(action)?;
                if !self.transformed_this_hold {
                    ctx.registry.transform(item)?;
                    self.transformed_this_hold = true;
                    ctx.events.log(CellEvent::Transformed {
                        cycle: ctx.cycle,
                        at: ctx.at,
                        item,
                        station: self.assignment.processing,
                    });
                }
                Ok(())
            }
            LatchAction::Place => {
                let item = self.require_item(action)?;
                let storage = self.assignment.storage;
                if ctx.registry.owner_of(item) == Some(Owner::Station(storage)) {
                    return Ok(());
                }
                self.release(item, storage, ctx)?;

                let side = self.assignment.side;
                let placement = ctx.trays.get_mut(side).place(item, ctx.registry)?;
                ctx.events.log(CellEvent::Placed {
                    cycle: ctx.cycle,
                    at: ctx.at,
                    item,
                    side,
                    slot: placement.slot,
                });
                if let Some(evicted) = placement.evicted {
                    ctx.events.log(CellEvent::Evicted {
                        cycle: ctx.cycle,
                        at: ctx.at,
                        item: evicted,
                        side,
                    });
                }
                self.cycle_item = None;
                Ok(())
            }
        }
    }

    fn require_item(&self, action: LatchAction) -> Result<ItemId> {
        self.cycle_item.ok_or_else(|| {
            WorkcellError::invariant(format!("{} reached {action:?} with no item", self.id))
        })
    }

    fn attach(&mut self, item: ItemId, ctx: &mut LatchContext<'_>) -> Result<()> {
        let owner = Owner::Actor(self.id);
        let from = match ctx.registry.owner_of(item) {
            Some(current) if current == owner => return Ok(()),
            Some(Owner::Station(station)) => station,
            Some(Owner::Actor(other)) => {
                return Err(WorkcellError::invariant(format!(
                    "{} cannot take {item} held by {other}",
                    self.id
                )))
            }
            None => {
                return Err(WorkcellError::invariant(format!(
                    "{} cannot take missing {item}",
                    self.id
                )))
            }
        };
        if let Some(held) = self.carrying {
            return Err(WorkcellError::invariant(format!(
                "{} cannot take {item} while carrying {held}",
                self.id
            )));
        }

        ctx.registry.transfer(item, owner)?;
        self.carrying = Some(item);
        ctx.events.log(CellEvent::Attached {
            cycle: ctx.cycle,
            at: ctx.at,
            actor: self.id,
            item,
            from,
        });
        Ok(())
    }

    fn release(&mut self, item: ItemId, to: StationId, ctx: &mut LatchContext<'_>) -> Result<()> {
        let owner = Owner::Station(to);
        if ctx.registry.owner_of(item) == Some(owner) {
            return Ok(());
        }
        if self.carrying != Some(item) {
            return Err(WorkcellError::invariant(format!(
                "{} cannot release {item} it does not carry",
                self.id
            )));
        }

        ctx.registry.transfer(item, owner)?;
        self.carrying = None;
        ctx.events.log(CellEvent::Released {
            cycle: ctx.cycle,
            at: ctx.at,
            actor: self.id,
            item,
            to,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CellConfig;

    struct Fixture {
        timeline: PhaseTimeline,
        plan: LatchPlan,
        table: MotionTable,
        geometry: RigGeometry,
        registry: ItemRegistry,
        trays: Trays,
        events: EventLog,
    }

    impl Fixture {
        fn new() -> Self {
            let config = CellConfig::default();
            let timeline = PhaseTimeline::from_config(&config).unwrap();
            let plan = LatchPlan::build(&timeline, &config.latches);
            Self {
                plan,
                table: MotionTable::from_rules(&config.motion).unwrap(),
                geometry: config.geometry(),
                registry: ItemRegistry::new(),
                trays: Trays::new(config.tray.rows, config.tray.cols).unwrap(),
                events: EventLog::new(),
                timeline,
            }
        }

        fn fire(&mut self, rig: &mut ActorRig, cursor: Cursor) -> usize {
            let mut ctx = LatchContext {
                registry: &mut self.registry,
                trays: &mut self.trays,
                events: &mut self.events,
                cycle: 0,
                at: Duration::ZERO,
            };
            rig.fire_due(&self.plan, cursor, &mut ctx).unwrap()
        }
    }

    fn left_rig(fixture: &Fixture) -> ActorRig {
        ActorRig::new(ActorId(0), Assignment::for_side(Side::Left), &fixture.geometry)
    }

    #[test]
    fn plan_follows_timeline_order() {
        let fixture = Fixture::new();
        let actions: Vec<LatchAction> = fixture.plan.latches().iter().map(|l| l.action).collect();
        assert_eq!(
            actions,
            vec![
                LatchAction::Spawn,
                LatchAction::Pick,
                LatchAction::Insert,
                LatchAction::Transform,
                LatchAction::Retrieve,
                LatchAction::Place,
            ]
        );
        assert_eq!(fixture.plan.latches()[3].threshold, 0.9);
    }

    #[test]
    fn pick_latches_once_while_progress_sweeps() {
        let mut fixture = Fixture::new();
        let mut rig = left_rig(&fixture);
        let pick = fixture.timeline.position(PhaseKind::Pick).unwrap();

        let mut fired = 0;
        let mut progress = 0.0;
        while progress < 1.0 {
            fired += fixture.fire(
                &mut rig,
                Cursor::At {
                    phase_index: pick,
                    progress,
                },
            );
            progress += 0.01;
        }

        // spawn + pick
        assert_eq!(fired, 2);
        assert_eq!(fixture.registry.transfers(), 1);
        let item = rig.carrying().unwrap();
        assert_eq!(fixture.registry.owner_of(item), Some(Owner::Actor(ActorId(0))));
    }

    #[test]
    fn transform_fires_once_per_hold() {
        let mut fixture = Fixture::new();
        let mut rig = left_rig(&fixture);
        let hold = fixture.timeline.position(PhaseKind::Hold).unwrap();

        for step in 0..100 {
            fixture.fire(
                &mut rig,
                Cursor::At {
                    phase_index: hold,
                    progress: f64::from(step) / 100.0,
                },
            );
        }

        assert_eq!(fixture.registry.transforms(), 1);
        let item = rig.cycle_item().unwrap();
        assert!(fixture.registry.get(item).unwrap().is_transformed());
        assert_eq!(
            fixture.registry.owner_of(item),
            Some(Owner::Station(StationId::Processing(Side::Left)))
        );
    }

    #[test]
    fn end_of_cycle_catches_up_every_latch() {
        let mut fixture = Fixture::new();
        let mut rig = left_rig(&fixture);

        assert_eq!(fixture.fire(&mut rig, Cursor::EndOfCycle), 6);
        assert_eq!(fixture.trays.left.len(), 1);
        assert!(rig.carrying().is_none());
        assert_eq!(fixture.fire(&mut rig, Cursor::EndOfCycle), 0);

        rig.begin_cycle(Assignment::for_side(Side::Right)).unwrap();
        assert_eq!(fixture.fire(&mut rig, Cursor::EndOfCycle), 6);
        assert_eq!(fixture.trays.right.len(), 1);
    }

    #[test]
    fn begin_cycle_rejects_carried_item() {
        let mut fixture = Fixture::new();
        let mut rig = left_rig(&fixture);
        let pick = fixture.timeline.position(PhaseKind::Pick).unwrap();
        fixture.fire(
            &mut rig,
            Cursor::At {
                phase_index: pick,
                progress: 0.75,
            },
        );

        assert!(rig.begin_cycle(Assignment::for_side(Side::Left)).is_err());
    }

    #[test]
    fn transport_sweeps_to_mirrored_target() {
        let fixture = Fixture::new();
        let rule = fixture.table.rule(PhaseKind::TransportToTarget).unwrap();

        let start = Pose::evaluate(rule, 0.0, Side::Left, &fixture.geometry);
        let left = Pose::evaluate(rule, 1.0 - 1e-12, Side::Left, &fixture.geometry);
        let right = Pose::evaluate(rule, 1.0 - 1e-12, Side::Right, &fixture.geometry);

        assert_eq!(start.pivot_angle, 0.0);
        assert!((left.pivot_angle - fixture.geometry.processing_angle).abs() < 1e-6);
        assert!((right.pivot_angle + fixture.geometry.processing_angle).abs() < 1e-6);
        assert_eq!(left.jaw_opening, fixture.geometry.jaw.grip);
    }

    #[test]
    fn pick_closes_jaw_and_dips() {
        let fixture = Fixture::new();
        let rule = fixture.table.rule(PhaseKind::Pick).unwrap();
        let mid = Pose::evaluate(rule, 0.5, Side::Left, &fixture.geometry);

        assert!((mid.reach - 1.0).abs() < 1e-12);
        assert!(mid.jaw_opening < fixture.geometry.jaw.open);
        assert!(mid.jaw_opening > fixture.geometry.jaw.grip);
    }

    #[test]
    fn duplicate_rules_are_rejected() {
        let mut rules = default_rules();
        rules.push(rules[0]);
        assert!(MotionTable::from_rules(&rules).is_err());
    }

    #[test]
    fn table_must_cover_timeline() {
        let fixture = Fixture::new();
        let rules: Vec<MotionRule> = default_rules()
            .into_iter()
            .filter(|rule| rule.phase != PhaseKind::Reset)
            .collect();
        let table = MotionTable::from_rules(&rules).unwrap();
        assert!(table.covers(&fixture.timeline).is_err());
    }
}
