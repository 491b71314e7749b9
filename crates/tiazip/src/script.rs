//! Scripted playback of a prerecorded register-write log.
//!
//! [`ScriptedEngine`] implements [`ChipEngine`] over a fixed, time-ordered
//! list of writes. Every distinct timestamp in the script becomes one
//! engine tick, so replaying a log through [`crate::capture::collect`]
//! reproduces the original capture batch-for-batch. Build one with
//! [`ScriptBuilder`].

use crate::engine::{ChipEngine, PlaybackPosition, TICKS_PER_SECOND};
use crate::error::ExportError;

/// One prerecorded register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptedWrite {
    pub seconds: u32,
    pub ticks: u32,
    pub subsong: u16,
    pub order: u16,
    pub row: u16,
    pub system: usize,
    pub addr: u32,
    pub val: u32,
}

impl ScriptedWrite {
    fn time(&self) -> u64 {
        self.seconds as u64 * TICKS_PER_SECOND as u64 + self.ticks as u64
    }
}

/// Builder for a [`ScriptedEngine`].
///
/// Writes may be added in any order; the builder sorts them by timestamp
/// (stable, so same-tick writes keep their issue order).
#[derive(Debug, Clone)]
pub struct ScriptBuilder {
    hz: f32,
    systems: usize,
    subsong: u16,
    writes: Vec<ScriptedWrite>,
}

impl ScriptBuilder {
    pub fn new(hz: f32, systems: usize) -> Self {
        ScriptBuilder {
            hz,
            systems,
            subsong: 0,
            writes: Vec::new(),
        }
    }

    /// Set the subsong number stamped on subsequently added writes.
    pub fn subsong(&mut self, subsong: u16) -> &mut Self {
        self.subsong = subsong;
        self
    }

    /// Add a write at an absolute tick offset from the start of playback.
    pub fn write(
        &mut self,
        at_ticks: u64,
        order: u16,
        row: u16,
        system: usize,
        addr: u32,
        val: u32,
    ) -> &mut Self {
        self.writes.push(ScriptedWrite {
            seconds: (at_ticks / TICKS_PER_SECOND as u64) as u32,
            ticks: (at_ticks % TICKS_PER_SECOND as u64) as u32,
            subsong: self.subsong,
            order,
            row,
            system,
            addr,
            val,
        });
        self
    }

    /// Add an already-assembled write record.
    pub fn push(&mut self, write: ScriptedWrite) -> &mut Self {
        self.writes.push(write);
        self
    }

    /// Finish the script. `end_ticks` is the absolute tick at which the
    /// song ends; it must not precede the last write.
    pub fn finish(mut self, end_ticks: u64) -> ScriptedEngine {
        self.writes.sort_by_key(|w| w.time());
        let end = end_ticks.max(self.writes.last().map(|w| w.time()).unwrap_or(0));
        ScriptedEngine {
            hz: self.hz,
            systems: self.systems,
            writes: self.writes,
            end,
            cursor: 0,
            now: 0,
            pending: Vec::new(),
            position: PlaybackPosition {
                subsong: 0,
                order: 0,
                row: 0,
            },
            playing: false,
            capture: false,
        }
    }
}

/// A [`ChipEngine`] that replays a prerecorded script.
#[derive(Debug, Clone)]
pub struct ScriptedEngine {
    hz: f32,
    systems: usize,
    writes: Vec<ScriptedWrite>,
    /// Absolute tick at which playback ends.
    end: u64,
    cursor: usize,
    now: u64,
    pending: Vec<Vec<(u32, u32)>>,
    position: PlaybackPosition,
    playing: bool,
    capture: bool,
}

impl ScriptedEngine {
    /// Total number of scripted writes.
    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    /// Absolute tick at which playback ends.
    pub fn end_ticks(&self) -> u64 {
        self.end
    }
}

impl ChipEngine for ScriptedEngine {
    fn set_register_capture(&mut self, enabled: bool) {
        self.capture = enabled;
    }

    fn begin(&mut self, subsong: u16) -> Result<(), ExportError> {
        self.cursor = 0;
        self.now = 0;
        self.pending = vec![Vec::new(); self.systems];
        self.position = self
            .writes
            .first()
            .map(|w| PlaybackPosition {
                subsong: w.subsong,
                order: w.order,
                row: w.row,
            })
            .unwrap_or(PlaybackPosition {
                subsong,
                order: 0,
                row: 0,
            });
        self.playing = true;
        Ok(())
    }

    fn tick(&mut self) -> Result<bool, ExportError> {
        if !self.playing {
            return Ok(true);
        }
        if self.cursor >= self.writes.len() {
            // no more writes; run out the clock
            self.now = self.end;
            self.playing = false;
            return Ok(true);
        }
        // advance to the next distinct timestamp and stage its batch
        let batch_time = self.writes[self.cursor].time();
        self.now = batch_time;
        while self.cursor < self.writes.len() && self.writes[self.cursor].time() == batch_time {
            let w = self.writes[self.cursor];
            self.position = PlaybackPosition {
                subsong: w.subsong,
                order: w.order,
                row: w.row,
            };
            if self.capture {
                self.pending[w.system].push((w.addr, w.val));
            }
            self.cursor += 1;
        }
        Ok(false)
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn position(&self) -> PlaybackPosition {
        self.position
    }

    fn elapsed(&self) -> (u32, u32) {
        (
            (self.now / TICKS_PER_SECOND as u64) as u32,
            (self.now % TICKS_PER_SECOND as u64) as u32,
        )
    }

    fn playback_hz(&self) -> f32 {
        self.hz
    }

    fn system_count(&self) -> usize {
        self.systems
    }

    fn drain_writes(&mut self, system: usize) -> Vec<(u32, u32)> {
        match self.pending.get_mut(system) {
            Some(p) => std::mem::take(p),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_orders_writes_by_time() {
        let mut b = ScriptBuilder::new(60.0, 1);
        b.write(500, 0, 0, 0, 0x17, 2);
        b.write(0, 0, 0, 0, 0x17, 1);
        let mut engine = b.finish(1000);
        engine.set_register_capture(true);
        engine.begin(0).unwrap();

        assert!(!engine.tick().unwrap());
        assert_eq!(engine.drain_writes(0), vec![(0x17, 1)]);
        assert!(!engine.tick().unwrap());
        assert_eq!(engine.drain_writes(0), vec![(0x17, 2)]);
        assert!(engine.tick().unwrap());
        assert_eq!(engine.elapsed(), (0, 1000));
    }

    #[test]
    fn test_script_same_tick_batch() {
        let mut b = ScriptBuilder::new(60.0, 1);
        b.write(0, 0, 0, 0, 0x15, 4);
        b.write(0, 0, 0, 0, 0x17, 7);
        let mut engine = b.finish(16_667);
        engine.set_register_capture(true);
        engine.begin(0).unwrap();

        assert!(!engine.tick().unwrap());
        assert_eq!(engine.drain_writes(0), vec![(0x15, 4), (0x17, 7)]);
        assert!(engine.tick().unwrap());
    }

    #[test]
    fn test_capture_flag_gates_recording() {
        let mut b = ScriptBuilder::new(60.0, 1);
        b.write(0, 0, 0, 0, 0x19, 15);
        let mut engine = b.finish(100);
        engine.begin(0).unwrap();
        engine.tick().unwrap();
        assert!(engine.drain_writes(0).is_empty());
    }
}
