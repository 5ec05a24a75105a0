//! Cycle clock and phase timeline.
//!
//! Simulated time is kept as a [`Duration`] so that repeated frame steps add
//! up exactly (ten 0.1 s frames land on 1.0 s, not 0.9999...). Everything the
//! engine derives per frame starts from [`CycleClock::loop_time`] and
//! [`PhaseTimeline::resolve`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{CellConfig, Result, WorkcellError};

/// Largest progress value ever reported for a phase.
const PROGRESS_CEILING: f64 = 1.0 - f64::EPSILON;

/// Motion law a phase follows. Also decides which latch, if any, the phase
/// carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseKind {
    #[serde(alias = "idle")]
    Spawn,
    Pick,
    #[serde(alias = "transport")]
    TransportToTarget,
    Insert,
    #[serde(alias = "processing")]
    Hold,
    #[serde(alias = "retrieve")]
    Exit,
    #[serde(alias = "transport2")]
    TransportToStorage,
    Place,
    Reset,
}

impl PhaseKind {
    /// Infers a kind from a conventional phase name.
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name.trim().to_ascii_lowercase().as_str() {
            "spawn" | "idle" => PhaseKind::Spawn,
            "pick" => PhaseKind::Pick,
            "transport" | "transport-to-target" => PhaseKind::TransportToTarget,
            "insert" => PhaseKind::Insert,
            "hold" | "processing" => PhaseKind::Hold,
            "exit" | "retrieve" => PhaseKind::Exit,
            "transport2" | "transport-to-storage" => PhaseKind::TransportToStorage,
            "place" => PhaseKind::Place,
            "reset" => PhaseKind::Reset,
            _ => return None,
        };
        Some(kind)
    }

    /// Position of the phase among the latch-bearing kinds, `None` for
    /// motion-only phases.
    pub fn latch_rank(self) -> Option<u8> {
        match self {
            PhaseKind::Spawn => Some(0),
            PhaseKind::Pick => Some(1),
            PhaseKind::Insert => Some(2),
            PhaseKind::Hold => Some(3),
            PhaseKind::Exit => Some(4),
            PhaseKind::Place => Some(5),
            PhaseKind::TransportToTarget | PhaseKind::TransportToStorage | PhaseKind::Reset => {
                None
            }
        }
    }
}

/// Kinds every timeline must contain for an item to complete its round trip.
const REQUIRED_KINDS: [PhaseKind; 5] = [
    PhaseKind::Spawn,
    PhaseKind::Pick,
    PhaseKind::Insert,
    PhaseKind::Exit,
    PhaseKind::Place,
];

/// Named, right-open interval `[start, end)` of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    pub name: String,
    pub label: String,
    pub kind: PhaseKind,
    pub start: Duration,
    pub end: Duration,
}

impl Phase {
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        kind: PhaseKind,
        start: Duration,
        end: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind,
            start,
            end,
        }
    }

    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }

    pub fn contains(&self, loop_time: Duration) -> bool {
        self.start <= loop_time && loop_time < self.end
    }
}

/// Result of resolving a loop time against the timeline.
#[derive(Debug, Clone, Copy)]
pub struct PhaseSample<'a> {
    pub index: usize,
    pub phase: &'a Phase,
    /// Normalised position inside the phase, in `[0, 1)`.
    pub progress: f64,
}

/// Ordered list of phases that exactly tiles one cycle.
#[derive(Debug, Clone)]
pub struct PhaseTimeline {
    cycle: Duration,
    phases: Vec<Phase>,
}

impl PhaseTimeline {
    /// Validates and builds a timeline.
    ///
    /// # Errors
    ///
    /// Returns [`WorkcellError::Configuration`] when the phases leave a gap,
    /// overlap, run backwards, fail to end at `cycle`, repeat a name, or list
    /// the latch-bearing kinds out of order.
    pub fn new(cycle: Duration, phases: Vec<Phase>) -> Result<Self> {
        if cycle.is_zero() {
            return Err(WorkcellError::config("cycle duration must be positive"));
        }
        if phases.is_empty() {
            return Err(WorkcellError::config("phase list is empty"));
        }

        let mut cursor = Duration::ZERO;
        for phase in &phases {
            if phase.start != cursor {
                return Err(WorkcellError::config(format!(
                    "phase `{}` starts at {:?} but the previous phase ends at {cursor:?}",
                    phase.name, phase.start
                )));
            }
            if phase.end <= phase.start {
                return Err(WorkcellError::config(format!(
                    "phase `{}` has non-increasing bounds {:?}..{:?}",
                    phase.name, phase.start, phase.end
                )));
            }
            cursor = phase.end;
        }
        if cursor != cycle {
            return Err(WorkcellError::config(format!(
                "phases end at {cursor:?} but the cycle lasts {cycle:?}"
            )));
        }

        for (index, phase) in phases.iter().enumerate() {
            if phases[..index].iter().any(|other| other.name == phase.name) {
                return Err(WorkcellError::config(format!(
                    "phase name `{}` is used more than once",
                    phase.name
                )));
            }
        }

        validate_latch_order(&phases)?;

        Ok(Self { cycle, phases })
    }

    /// Builds the timeline described by `config.cycle_duration` and
    /// `config.phases`.
    pub fn from_config(config: &CellConfig) -> Result<Self> {
        let cycle = seconds("cycle_duration", config.cycle_duration)?;
        let phases = config
            .phases
            .iter()
            .map(|entry| -> Result<Phase> {
                let kind = match entry.kind {
                    Some(kind) => kind,
                    None => PhaseKind::from_name(&entry.name).ok_or_else(|| {
                        WorkcellError::config(format!(
                            "phase `{}` has no kind and its name is not a known phase",
                            entry.name
                        ))
                    })?,
                };
                let label = if entry.label.is_empty() {
                    entry.name.clone()
                } else {
                    entry.label.clone()
                };
                Ok(Phase::new(
                    entry.name.clone(),
                    label,
                    kind,
                    seconds(&entry.name, entry.start)?,
                    seconds(&entry.name, entry.end)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(cycle, phases)
    }

    pub fn cycle_duration(&self) -> Duration {
        self.cycle
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn phase(&self, index: usize) -> Option<&Phase> {
        self.phases.get(index)
    }

    /// Index of the first phase of the given kind.
    pub fn position(&self, kind: PhaseKind) -> Option<usize> {
        self.phases.iter().position(|phase| phase.kind == kind)
    }

    /// Finds the unique phase containing `loop_time` and the progress within
    /// it. Progress is `0` exactly at a phase start and never reaches `1`.
    pub fn resolve(&self, loop_time: Duration) -> Result<PhaseSample<'_>> {
        let index = self.phases.partition_point(|phase| phase.end <= loop_time);
        let phase = self
            .phases
            .get(index)
            .filter(|phase| phase.contains(loop_time))
            .ok_or(WorkcellError::NoActivePhase { loop_time })?;

        let offset = (loop_time - phase.start).as_secs_f64();
        let progress = (offset / phase.duration().as_secs_f64()).min(PROGRESS_CEILING);

        Ok(PhaseSample {
            index,
            phase,
            progress,
        })
    }
}

fn validate_latch_order(phases: &[Phase]) -> Result<()> {
    let mut last_rank = None;
    for phase in phases {
        let Some(rank) = phase.kind.latch_rank() else {
            continue;
        };
        if last_rank.is_some_and(|last| rank <= last) {
            return Err(WorkcellError::config(format!(
                "phase `{}` ({:?}) is repeated or out of order",
                phase.name, phase.kind
            )));
        }
        last_rank = Some(rank);
    }

    for kind in REQUIRED_KINDS {
        if !phases.iter().any(|phase| phase.kind == kind) {
            return Err(WorkcellError::config(format!(
                "timeline has no {kind:?} phase"
            )));
        }
    }
    Ok(())
}

fn seconds(what: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        WorkcellError::config(format!("`{what}`: {value} is not a valid number of seconds"))
    })
}

/// Simulated clock for the repeating cycle.
#[derive(Debug, Clone)]
pub struct CycleClock {
    elapsed: Duration,
    speed: f64,
    paused: bool,
    cycle: Duration,
}

impl CycleClock {
    pub fn new(cycle: Duration) -> Result<Self> {
        if cycle.is_zero() {
            return Err(WorkcellError::config("cycle duration must be positive"));
        }
        Ok(Self {
            elapsed: Duration::ZERO,
            speed: 1.0,
            paused: false,
            cycle,
        })
    }

    /// Adds `delta * speed` seconds of simulated time and returns how many
    /// cycle boundaries were crossed. Paused clocks, negative and non-finite
    /// steps leave the clock untouched.
    pub fn advance(&mut self, delta: f64) -> u64 {
        if self.paused {
            return 0;
        }
        let scaled = delta * self.speed;
        if !scaled.is_finite() || scaled <= 0.0 {
            return 0;
        }
        let Ok(step) = Duration::try_from_secs_f64(scaled) else {
            return 0;
        };

        let before = self.cycle_index();
        self.elapsed = self.elapsed.saturating_add(step);
        self.cycle_index() - before
    }

    /// Negative and NaN speeds clamp to zero.
    pub fn set_speed(&mut self, speed: f64) {
        self.speed = if speed.is_nan() { 0.0 } else { speed.max(0.0) };
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn reset(&mut self) {
        self.elapsed = Duration::ZERO;
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn cycle_duration(&self) -> Duration {
        self.cycle
    }

    pub fn cycle_index(&self) -> u64 {
        (self.elapsed.as_nanos() / self.cycle.as_nanos()) as u64
    }

    pub fn loop_time(&self) -> Duration {
        Duration::from_nanos((self.elapsed.as_nanos() % self.cycle.as_nanos()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn secs(value: f64) -> Duration {
        Duration::from_secs_f64(value)
    }

    fn timeline() -> PhaseTimeline {
        PhaseTimeline::from_config(&CellConfig::default()).unwrap()
    }

    #[test]
    fn default_timeline_tiles_eight_seconds() {
        let timeline = timeline();
        assert_eq!(timeline.cycle_duration(), secs(8.0));
        assert_eq!(timeline.phases().len(), 9);
        assert_eq!(timeline.phases()[0].start, Duration::ZERO);
    }

    #[test]
    fn resolve_reports_zero_at_phase_start() {
        let timeline = timeline();
        let sample = timeline.resolve(secs(0.5)).unwrap();
        assert_eq!(sample.phase.kind, PhaseKind::Pick);
        assert_eq!(sample.progress, 0.0);
    }

    #[test]
    fn resolve_is_right_open() {
        let timeline = timeline();
        let just_before = timeline.resolve(secs(1.5) - Duration::from_nanos(1)).unwrap();
        assert_eq!(just_before.phase.kind, PhaseKind::Pick);
        assert!(just_before.progress < 1.0);

        let at_end = timeline.resolve(secs(1.5)).unwrap();
        assert_eq!(at_end.phase.kind, PhaseKind::TransportToTarget);
        assert_eq!(at_end.progress, 0.0);
    }

    #[test]
    fn resolve_midpoint_of_pick() {
        let timeline = timeline();
        let sample = timeline.resolve(secs(1.0)).unwrap();
        assert_eq!(sample.index, 1);
        assert_eq!(sample.progress, 0.5);
    }

    #[test]
    fn resolve_outside_cycle_has_no_phase() {
        let err = timeline().resolve(secs(8.0)).unwrap_err();
        assert!(matches!(err, WorkcellError::NoActivePhase { .. }));
    }

    #[test]
    fn rejects_gap_between_phases() {
        let mut config = CellConfig::default();
        config.phases[2].start += 0.1;
        let err = PhaseTimeline::from_config(&config).unwrap_err();
        assert!(err.is_configuration());
        assert!(format!("{err}").contains("transport"));
    }

    #[test]
    fn rejects_short_tiling() {
        let mut config = CellConfig::default();
        config.cycle_duration = 9.0;
        assert!(PhaseTimeline::from_config(&config).is_err());
    }

    #[test]
    fn rejects_backwards_phase() {
        let cycle = secs(2.0);
        let phases = vec![
            Phase::new("spawn", "", PhaseKind::Spawn, Duration::ZERO, secs(1.0)),
            Phase::new("pick", "", PhaseKind::Pick, secs(1.0), secs(1.0)),
        ];
        assert!(PhaseTimeline::new(cycle, phases).is_err());
    }

    #[test]
    fn rejects_latches_out_of_order() {
        let mut config = CellConfig::default();
        config.phases[1].kind = Some(PhaseKind::Place);
        config.phases[7].kind = Some(PhaseKind::Pick);
        let err = PhaseTimeline::from_config(&config).unwrap_err();
        assert!(format!("{err}").contains("out of order"));
    }

    #[test]
    fn rejects_unknown_phase_name_without_kind() {
        let mut config = CellConfig::default();
        config.phases[8].name = "cooldown".to_string();
        config.phases[8].kind = None;
        assert!(PhaseTimeline::from_config(&config).is_err());
    }

    #[test]
    fn rejects_missing_required_phase() {
        let mut config = CellConfig::default();
        config.phases[5].name = "pause".to_string();
        config.phases[5].kind = Some(PhaseKind::Reset);
        let err = PhaseTimeline::from_config(&config).unwrap_err();
        assert!(format!("{err}").contains("Exit"));
    }

    #[test]
    fn clock_counts_cycles_exactly_on_boundary() {
        let mut clock = CycleClock::new(secs(8.0)).unwrap();
        let mut crossed = 0;
        for _ in 0..79 {
            crossed += clock.advance(0.1);
        }
        assert_eq!(crossed, 0);
        assert_eq!(clock.cycle_index(), 0);

        assert_eq!(clock.advance(0.1), 1);
        assert_eq!(clock.elapsed(), secs(8.0));
        assert_eq!(clock.cycle_index(), 1);
        assert_eq!(clock.loop_time(), Duration::ZERO);
    }

    #[test]
    fn paused_clock_does_not_move() {
        let mut clock = CycleClock::new(secs(8.0)).unwrap();
        clock.toggle_pause();
        clock.advance(3.0);
        assert_eq!(clock.elapsed(), Duration::ZERO);
        clock.toggle_pause();
        clock.advance(3.0);
        assert_eq!(clock.elapsed(), secs(3.0));
    }

    #[test]
    fn speed_scales_and_clamps() {
        let mut clock = CycleClock::new(secs(8.0)).unwrap();
        clock.set_speed(2.0);
        clock.advance(0.5);
        assert_eq!(clock.elapsed(), secs(1.0));

        clock.set_speed(-4.0);
        assert_eq!(clock.speed(), 0.0);
        clock.advance(1.0);
        assert_eq!(clock.elapsed(), secs(1.0));
    }

    #[test]
    fn large_step_reports_every_crossed_cycle() {
        let mut clock = CycleClock::new(secs(8.0)).unwrap();
        assert_eq!(clock.advance(25.0), 3);
        assert_eq!(clock.loop_time(), secs(1.0));
        clock.reset();
        assert_eq!(clock.cycle_index(), 0);
    }

    proptest! {
        #[test]
        fn exactly_one_phase_is_active(nanos in 0u64..1_000_000_000_000) {
            let timeline = timeline();
            let mut clock = CycleClock::new(timeline.cycle_duration()).unwrap();
            clock.advance(Duration::from_nanos(nanos).as_secs_f64());
            let loop_time = clock.loop_time();
            prop_assert!(loop_time < timeline.cycle_duration());

            let sample = timeline.resolve(loop_time).unwrap();
            prop_assert!(sample.progress >= 0.0 && sample.progress < 1.0);
            let active = timeline
                .phases()
                .iter()
                .filter(|phase| phase.contains(loop_time))
                .count();
            prop_assert_eq!(active, 1);
        }
    }
}
