//! Register-write capture.
//!
//! Drives a [`ChipEngine`] tick-by-tick and collects every register write
//! into a flat, time-ordered list. One capture covers one subsong.

use log::debug;

use crate::engine::ChipEngine;
use crate::error::ExportError;

/// Position of a write inside the song structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowIndex {
    pub subsong: u16,
    pub order: u16,
    pub row: u16,
}

impl RowIndex {
    pub fn new(subsong: u16, order: u16, row: u16) -> Self {
        RowIndex {
            subsong,
            order,
            row,
        }
    }

    /// Move to a new position. Returns `true` when anything changed.
    pub fn advance(&mut self, subsong: u16, order: u16, row: u16) -> bool {
        let changed = self.subsong != subsong || self.order != order || self.row != row;
        self.subsong = subsong;
        self.order = order;
        self.row = row;
        changed
    }
}

/// Key labelling the row-aligned slice of one channel.
pub fn sequence_key(subsong: u16, order: u16, row: u16, channel: usize) -> String {
    format!(
        "SEQ_S{:02x}_O{:02x}_R{:02x}_C{:02x}",
        subsong, order, row, channel
    )
}

/// Key labelling one pattern of one channel.
pub fn pattern_key(subsong: u16, channel: usize, pattern: u16) -> String {
    format!("PAT_S{:02x}_C{:02x}_P{:02x}", subsong, channel, pattern)
}

/// One captured register write.
///
/// The end-of-song sentinel has `system_index == -1` and carries the
/// `write_index` of the last real write (it is not incremented).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegisterWrite {
    pub write_index: i64,
    pub row: RowIndex,
    pub system_index: i32,
    pub seconds: u32,
    pub ticks: u32,
    pub hz: f32,
    pub addr: u32,
    pub val: u32,
}

impl RegisterWrite {
    pub fn is_sentinel(&self) -> bool {
        self.system_index < 0
    }
}

/// Capture all register writes of one subsong.
///
/// Turns register capture on for every system, resets playback to order 0
/// with pattern repeat off, and advances one tick at a time until the
/// engine reports completion. After each tick every system's pending
/// writes are drained and stamped with the current position and time. An
/// end-of-song sentinel closes the list. The capture flag is restored on
/// every exit path; a tick failure aborts the subsong (the partial capture
/// is dropped).
pub fn collect(
    engine: &mut dyn ChipEngine,
    subsong: u16,
) -> Result<Vec<RegisterWrite>, ExportError> {
    engine.set_register_capture(true);
    let result = collect_inner(engine, subsong);
    engine.set_register_capture(false);
    result
}

fn collect_inner(
    engine: &mut dyn ChipEngine,
    subsong: u16,
) -> Result<Vec<RegisterWrite>, ExportError> {
    engine.begin(subsong)?;

    let mut writes: Vec<RegisterWrite> = Vec::new();
    let mut write_index: i64 = 0;
    let hz = engine.playback_hz();

    while engine.is_playing() {
        let done = engine.tick()?;
        if done {
            break;
        }
        let (seconds, ticks) = engine.elapsed();
        let pos = engine.position();
        for system in 0..engine.system_count() {
            for (addr, val) in engine.drain_writes(system) {
                writes.push(RegisterWrite {
                    write_index,
                    row: RowIndex::new(pos.subsong, pos.order, pos.row),
                    system_index: system as i32,
                    seconds,
                    ticks,
                    hz,
                    addr,
                    val,
                });
                write_index += 1;
            }
        }
    }

    let (seconds, ticks) = engine.elapsed();
    let pos = engine.position();
    writes.push(RegisterWrite {
        write_index: write_index - 1,
        row: RowIndex::new(pos.subsong, pos.order, pos.row),
        system_index: -1,
        seconds,
        ticks,
        hz,
        addr: 0,
        val: 0,
    });

    debug!(
        "captured {} writes for subsong {} ({}s {}t)",
        write_index, subsong, seconds, ticks
    );
    Ok(writes)
}
