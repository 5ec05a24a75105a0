//! Per-cycle station assignment.
//!
//! The selection for a cycle is frozen when the cycle starts. Mode changes
//! requested mid-cycle wait for the next cycle boundary so an actor never
//! swaps targets while moving.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{ActorId, Side, StationId, WorkcellError};

/// How actors are spread over the left and right station pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionMode {
    FixedLeft,
    FixedRight,
    #[default]
    Alternate,
    Dual,
}

impl SelectionMode {
    /// Side serviced by `actor` during `cycle`.
    ///
    /// In `alternate` mode the first actor starts on the left and flips every
    /// cycle, a second actor always takes the other side. `dual` pins the
    /// first actor left and the second right.
    pub fn side_for(self, cycle: u64, actor: ActorId) -> Side {
        match self {
            SelectionMode::FixedLeft => Side::Left,
            SelectionMode::FixedRight => Side::Right,
            SelectionMode::Alternate => {
                let lead = if cycle % 2 == 0 { Side::Left } else { Side::Right };
                if actor.0 % 2 == 0 {
                    lead
                } else {
                    lead.opposite()
                }
            }
            SelectionMode::Dual => {
                if actor.0 % 2 == 0 {
                    Side::Left
                } else {
                    Side::Right
                }
            }
        }
    }
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SelectionMode::FixedLeft => "fixed-left",
            SelectionMode::FixedRight => "fixed-right",
            SelectionMode::Alternate => "alternate",
            SelectionMode::Dual => "dual",
        };
        f.write_str(name)
    }
}

impl FromStr for SelectionMode {
    type Err = WorkcellError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "fixed-left" | "left" => Ok(SelectionMode::FixedLeft),
            "fixed-right" | "right" => Ok(SelectionMode::FixedRight),
            "alternate" => Ok(SelectionMode::Alternate),
            "dual" => Ok(SelectionMode::Dual),
            other => Err(WorkcellError::config(format!(
                "unknown selection mode `{other}`"
            ))),
        }
    }
}

/// Stations one actor services for the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub side: Side,
    pub processing: StationId,
    pub storage: StationId,
}

impl Assignment {
    pub fn for_side(side: Side) -> Self {
        Self {
            side,
            processing: StationId::Processing(side),
            storage: StationId::Storage(side),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TargetSelector {
    mode: SelectionMode,
    pending: Option<SelectionMode>,
    cycle: u64,
    assignments: Vec<Assignment>,
}

impl TargetSelector {
    pub fn new(mode: SelectionMode, actors: usize) -> Self {
        let mut selector = Self {
            mode,
            pending: None,
            cycle: 0,
            assignments: vec![Assignment::for_side(Side::Left); actors],
        };
        selector.recompute();
        selector
    }

    /// Mode in force for the current cycle.
    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    /// Mode that will be in force from the next cycle on.
    pub fn requested_mode(&self) -> SelectionMode {
        self.pending.unwrap_or(self.mode)
    }

    /// Queues a mode change for the next cycle boundary.
    pub fn request(&mut self, mode: SelectionMode) {
        self.pending = (mode != self.mode).then_some(mode);
    }

    /// Freezes the selection for `cycle`, applying any queued mode.
    pub fn begin_cycle(&mut self, cycle: u64) {
        if let Some(mode) = self.pending.take() {
            tracing::info!(from = %self.mode, to = %mode, cycle, "selection mode changed");
            self.mode = mode;
        }
        self.cycle = cycle;
        self.recompute();
    }

    pub fn reset(&mut self) {
        self.begin_cycle(0);
    }

    pub fn assignment(&self, actor: ActorId) -> Option<Assignment> {
        self.assignments.get(actor.0).copied()
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    fn recompute(&mut self) {
        let (mode, cycle) = (self.mode, self.cycle);
        for (index, assignment) in self.assignments.iter_mut().enumerate() {
            *assignment = Assignment::for_side(mode.side_for(cycle, ActorId(index)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alternate_flips_each_cycle() {
        let mut selector = TargetSelector::new(SelectionMode::Alternate, 1);
        assert_eq!(selector.assignments()[0].side, Side::Left);
        selector.begin_cycle(1);
        assert_eq!(selector.assignments()[0].side, Side::Right);
        selector.begin_cycle(2);
        assert_eq!(selector.assignments()[0].side, Side::Left);
    }

    #[test]
    fn dual_splits_actors() {
        let selector = TargetSelector::new(SelectionMode::Dual, 2);
        assert_eq!(selector.assignment(ActorId(0)).unwrap().side, Side::Left);
        assert_eq!(
            selector.assignment(ActorId(1)).unwrap().storage,
            StationId::Storage(Side::Right)
        );
    }

    #[test]
    fn alternate_with_two_actors_never_shares_a_side() {
        for cycle in 0..4 {
            let a = SelectionMode::Alternate.side_for(cycle, ActorId(0));
            let b = SelectionMode::Alternate.side_for(cycle, ActorId(1));
            assert_ne!(a, b);
        }
    }

    #[test]
    fn mode_change_waits_for_cycle_boundary() {
        let mut selector = TargetSelector::new(SelectionMode::FixedLeft, 1);
        selector.request(SelectionMode::FixedRight);

        assert_eq!(selector.mode(), SelectionMode::FixedLeft);
        assert_eq!(selector.requested_mode(), SelectionMode::FixedRight);
        assert_eq!(selector.assignments()[0].side, Side::Left);

        selector.begin_cycle(1);
        assert_eq!(selector.mode(), SelectionMode::FixedRight);
        assert_eq!(selector.assignments()[0].side, Side::Right);
    }

    #[test]
    fn parses_mode_names() {
        assert_eq!("dual".parse::<SelectionMode>().unwrap(), SelectionMode::Dual);
        assert_eq!(SelectionMode::FixedLeft.to_string(), "fixed-left");
        assert!("sideways".parse::<SelectionMode>().is_err());
    }
}
