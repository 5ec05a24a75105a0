use std::io::Write;

use crate::{scene::CellSnapshot, Result};

/// Consumer of engine frames. Rendering backends implement this to draw the
/// cell; the engine itself never depends on a concrete sink.
pub trait FrameSink {
    fn present(&mut self, snapshot: &CellSnapshot) -> Result<()>;

    /// Called once after the last frame.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Headless sink that reports phase transitions through `tracing`.
#[derive(Debug, Default)]
pub struct TraceSink {
    frames: u64,
    transitions: u64,
    last_phase: Option<(u64, String)>,
}

impl TraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Number of times a new `(cycle, phase)` pair was observed.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }
}

impl FrameSink for TraceSink {
    fn present(&mut self, snapshot: &CellSnapshot) -> Result<()> {
        self.frames += 1;
        let key = (snapshot.cycle_index, snapshot.phase_name.clone());
        if self.last_phase.as_ref() != Some(&key) {
            self.transitions += 1;
            tracing::info!(
                cycle = snapshot.cycle_index,
                phase = %snapshot.phase_name,
                label = %snapshot.phase_label,
                left = snapshot.storage_occupancy.left,
                right = snapshot.storage_occupancy.right,
                "phase entered"
            );
            self.last_phase = Some(key);
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        tracing::info!(frames = self.frames, transitions = self.transitions, "trace finished");
        Ok(())
    }
}

/// Writes one JSON object per frame, suitable for piping into an external
/// renderer or for diffing replays.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: W,
    frames: u64,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, frames: 0 }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> FrameSink for JsonLinesSink<W> {
    fn present(&mut self, snapshot: &CellSnapshot) -> Result<()> {
        serde_json::to_writer(&mut self.writer, snapshot)?;
        self.writer.write_all(b"\n")?;
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
