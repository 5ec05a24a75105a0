use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    events::DEFAULT_EVENT_CAPACITY,
    rig::{default_rules, MotionRule, MotionTable, RigGeometry},
    selector::SelectionMode,
    timeline::{PhaseKind, PhaseTimeline},
    Result, WorkcellError,
};

/// Top-level configuration for a work cell. Every field has a default, so a
/// JSON file only needs to list what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellConfig {
    /// Length of one cycle in seconds.
    pub cycle_duration: f64,
    pub phases: Vec<PhaseConfig>,
    pub tray: TrayConfig,
    pub actors: ActorConfig,
    pub stations: StationConfig,
    pub jaw: JawConfig,
    pub latches: LatchConfig,
    pub motion: Vec<MotionRule>,
    /// Most recent events the engine retains between drains.
    pub event_capacity: usize,
}

impl Default for CellConfig {
    fn default() -> Self {
        Self {
            cycle_duration: 8.0,
            phases: default_phases(),
            tray: TrayConfig::default(),
            actors: ActorConfig::default(),
            stations: StationConfig::default(),
            jaw: JawConfig::default(),
            latches: LatchConfig::default(),
            motion: default_rules(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl CellConfig {
    /// Two actors, one per side.
    pub fn dual_defaults() -> Self {
        Self {
            actors: ActorConfig {
                count: 2,
                mode: SelectionMode::Dual,
            },
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks everything the engine relies on before it starts.
    ///
    /// # Errors
    ///
    /// Returns [`WorkcellError::Configuration`] describing the first problem
    /// found.
    pub fn validate(&self) -> Result<()> {
        if !(1..=2).contains(&self.actors.count) {
            return Err(WorkcellError::config(format!(
                "actor count must be 1 or 2, got {}",
                self.actors.count
            )));
        }
        if self.tray.rows == 0 || self.tray.cols == 0 {
            return Err(WorkcellError::config("tray rows and cols must be positive"));
        }
        if self.event_capacity == 0 {
            return Err(WorkcellError::config("event capacity must be positive"));
        }
        self.latches.validate()?;
        self.jaw.validate()?;
        if !self.stations.indicator_speed.is_finite() {
            return Err(WorkcellError::config("indicator speed must be finite"));
        }

        let timeline = PhaseTimeline::from_config(self)?;
        MotionTable::from_rules(&self.motion)?.covers(&timeline)
    }

    pub fn geometry(&self) -> RigGeometry {
        RigGeometry {
            processing_angle: self.stations.processing_angle_deg.to_radians(),
            storage_angle: self.stations.storage_angle_deg.to_radians(),
            jaw: self.jaw,
        }
    }
}

/// One entry of the ordered phase list, offsets in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseConfig {
    pub name: String,
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub label: String,
    /// Inferred from `name` when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<PhaseKind>,
}

impl PhaseConfig {
    pub fn new(name: &str, start: f64, end: f64, label: &str) -> Self {
        Self {
            name: name.to_string(),
            start,
            end,
            label: label.to_string(),
            kind: PhaseKind::from_name(name),
        }
    }
}

fn default_phases() -> Vec<PhaseConfig> {
    vec![
        PhaseConfig::new("spawn", 0.0, 0.5, "Raw part arrives"),
        PhaseConfig::new("pick", 0.5, 1.5, "Picking raw part"),
        PhaseConfig::new("transport", 1.5, 3.0, "Moving to processor"),
        PhaseConfig::new("insert", 3.0, 3.5, "Loading processor"),
        PhaseConfig::new("hold", 3.5, 5.5, "Processing"),
        PhaseConfig::new("exit", 5.5, 6.0, "Unloading processor"),
        PhaseConfig::new("transport2", 6.0, 7.0, "Moving to storage"),
        PhaseConfig::new("place", 7.0, 7.5, "Placing in tray"),
        PhaseConfig::new("reset", 7.5, 8.0, "Returning home"),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrayConfig {
    pub rows: usize,
    pub cols: usize,
}

impl Default for TrayConfig {
    fn default() -> Self {
        Self { rows: 3, cols: 3 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorConfig {
    pub count: usize,
    pub mode: SelectionMode,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            count: 1,
            mode: SelectionMode::Alternate,
        }
    }
}

/// Station placement around the actor pivot. Angles are for the left side
/// and mirrored for the right.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StationConfig {
    pub processing_angle_deg: f64,
    pub storage_angle_deg: f64,
    /// Angular speed of the processing indicator, radians per simulated
    /// second.
    pub indicator_speed: f64,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            processing_angle_deg: 90.0,
            storage_angle_deg: 150.0,
            indicator_speed: 2.0,
        }
    }
}

/// Gripper jaw openings in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JawConfig {
    pub open: f64,
    pub grip: f64,
    pub release: f64,
    pub drop: f64,
}

impl Default for JawConfig {
    fn default() -> Self {
        Self {
            open: 0.08,
            grip: 0.035,
            release: 0.06,
            drop: 0.07,
        }
    }
}

impl JawConfig {
    fn validate(&self) -> Result<()> {
        let widths = [self.open, self.grip, self.release, self.drop];
        if widths.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(WorkcellError::config(
                "jaw widths must be finite and non-negative",
            ));
        }
        Ok(())
    }
}

/// Raw-progress thresholds at which latches fire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatchConfig {
    pub grab_threshold: f64,
    pub transform_threshold: f64,
}

impl Default for LatchConfig {
    fn default() -> Self {
        Self {
            grab_threshold: 0.5,
            transform_threshold: 0.9,
        }
    }
}

impl LatchConfig {
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("grab_threshold", self.grab_threshold),
            ("transform_threshold", self.transform_threshold),
        ] {
            if !(0.0..1.0).contains(&value) {
                return Err(WorkcellError::config(format!(
                    "{name} must lie in [0, 1), got {value}"
                )));
            }
        }
        Ok(())
    }
}
