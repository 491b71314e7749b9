//! Folding register writes into channel state sequences.
//!
//! The folder replays a captured write stream through a channel's address
//! map, tracks the current register state and emits `(state, duration)`
//! intervals quantized to whole frames. Same-tick writes collapse into one
//! state change; time that passes without a state change extends the tail
//! interval.

use std::collections::BTreeMap;

use log::debug;

use crate::capture::{sequence_key, RegisterWrite};
use crate::engine::TICKS_PER_SECOND;
use crate::error::ExportError;
use crate::state::{ChannelLayout, ChannelState, ChannelStateSequence};

/// Folding behavior switches.
#[derive(Debug, Clone, Default)]
pub struct FoldOptions {
    /// Zero the whole snapshot when the volume slot reads zero, so every
    /// silent stretch folds to the same all-zero state.
    pub suppress_quiet: bool,
    /// Split intervals longer than this many frames.
    pub max_interval_duration: Option<u32>,
    /// Fail on intervals that round to zero frames instead of clamping
    /// them to one.
    pub strict_durations: bool,
}

/// Whole engine ticks per playback frame at the given rate.
pub fn ticks_per_frame(hz: f32) -> u32 {
    (TICKS_PER_SECOND as f64 / hz as f64).round() as u32
}

fn write_time(w: &RegisterWrite) -> u64 {
    w.seconds as u64 * TICKS_PER_SECOND as u64 + w.ticks as u64
}

fn snapshot_state(current: &ChannelState, layout: &ChannelLayout, opts: &FoldOptions) -> ChannelState {
    if opts.suppress_quiet {
        if let Some(slot) = layout.volume_slot {
            if current.registers[slot] == 0 {
                return ChannelState::filled(0);
            }
        }
    }
    *current
}

/// Close the tail interval of a sequence: a tail that accumulated zero
/// whole frames is clamped to one frame, or rejected in strict mode.
fn close_tail(
    seq: &mut ChannelStateSequence,
    write_index: i64,
    opts: &FoldOptions,
) -> Result<(), ExportError> {
    if let Some(last) = seq.intervals.last_mut() {
        if last.duration == 0 {
            if opts.strict_durations {
                return Err(ExportError::ZeroDurationInterval(write_index));
            }
            debug!("zero duration interval at write {}, clamping to 1", write_index);
            last.duration = 1;
        }
    }
    Ok(())
}

struct Folder<'a> {
    layout: &'a ChannelLayout,
    opts: &'a FoldOptions,
    ticks_per_frame: u32,
    current: ChannelState,
    /// Registers were written since the last state was pushed.
    pending: bool,
    last_time: u64,
    remainder: u32,
}

impl<'a> Folder<'a> {
    fn new(layout: &'a ChannelLayout, opts: &'a FoldOptions, ticks_per_frame: u32) -> Self {
        Folder {
            layout,
            opts,
            ticks_per_frame,
            current: ChannelState::filled(0),
            pending: false,
            last_time: 0,
            remainder: 0,
        }
    }

    /// Push the pending state (if any) and account the time elapsed up to
    /// `now` to the tail interval.
    fn flush(
        &mut self,
        seq: &mut ChannelStateSequence,
        now: u64,
        write_index: i64,
    ) -> Result<(), ExportError> {
        if self.pending {
            let snapshot = snapshot_state(&self.current, self.layout, self.opts);
            let differs = seq
                .intervals
                .last()
                .map(|last| last.state != snapshot)
                .unwrap_or(false);
            if differs {
                close_tail(seq, write_index, self.opts)?;
            }
            seq.update_state(snapshot);
            self.pending = false;
        }
        let delta = (now - self.last_time) as u32;
        if delta > 0 {
            self.remainder = seq.add_duration(delta, self.remainder, self.ticks_per_frame);
            if let Some(cap) = self.opts.max_interval_duration {
                seq.enforce_max_duration(cap);
            }
        }
        self.last_time = now;
        Ok(())
    }

    /// Apply one write to the running state.
    fn apply(&mut self, w: &RegisterWrite) {
        if let Some(&slot) = self.layout.address_map.get(&w.addr) {
            if self.current.write(slot, w.val) {
                self.pending = true;
            }
        }
        // unmapped addresses are ignored
    }
}

/// Fold one channel's writes into a single state sequence.
///
/// Only writes from `system_index` are considered; addresses missing from
/// the layout's map are skipped. The walk ends at the sentinel, which
/// accounts the final stretch of time.
pub fn fold(
    writes: &[RegisterWrite],
    system_index: i32,
    layout: &ChannelLayout,
    opts: &FoldOptions,
) -> Result<ChannelStateSequence, ExportError> {
    let tpf = writes
        .first()
        .map(|w| ticks_per_frame(w.hz))
        .unwrap_or_else(|| ticks_per_frame(60.0));
    let mut seq = ChannelStateSequence::new();
    let mut folder = Folder::new(layout, opts, tpf);

    for w in writes {
        if w.is_sentinel() {
            folder.flush(&mut seq, write_time(w), w.write_index)?;
            close_tail(&mut seq, w.write_index, opts)?;
            break;
        }
        if w.system_index != system_index {
            continue;
        }
        let now = write_time(w);
        if now != folder.last_time {
            folder.flush(&mut seq, now, w.write_index)?;
        }
        folder.apply(w);
    }

    Ok(seq)
}

/// Fold one channel's writes into row-aligned state sequences.
///
/// Returns the row keys in playback order and a map from row key to its
/// sequence. A sequence is opened eagerly for the first record's row (so a
/// silent song still yields one empty sequence) and closed whenever the
/// `(subsong, order, row)` position changes; the duration remainder is
/// carried across the boundary.
#[allow(clippy::type_complexity)]
pub fn fold_by_row(
    writes: &[RegisterWrite],
    channel: usize,
    system_index: i32,
    layout: &ChannelLayout,
    opts: &FoldOptions,
) -> Result<(Vec<String>, BTreeMap<String, ChannelStateSequence>), ExportError> {
    let mut keys: Vec<String> = Vec::new();
    let mut sequences: BTreeMap<String, ChannelStateSequence> = BTreeMap::new();

    let first = match writes.first() {
        Some(w) => w,
        None => return Ok((keys, sequences)),
    };
    let tpf = ticks_per_frame(first.hz);
    let mut folder = Folder::new(layout, opts, tpf);

    let mut row = first.row;
    let mut key = sequence_key(row.subsong, row.order, row.row, channel);
    keys.push(key.clone());
    sequences.entry(key.clone()).or_default();

    for w in writes {
        if w.is_sentinel() {
            let seq = sequences.get_mut(&key).unwrap();
            folder.flush(seq, write_time(w), w.write_index)?;
            close_tail(seq, w.write_index, opts)?;
            break;
        }
        if w.system_index != system_index {
            continue;
        }
        let now = write_time(w);
        if w.row != row {
            // close the current row at this boundary, then open the next
            let seq = sequences.get_mut(&key).unwrap();
            folder.flush(seq, now, w.write_index)?;
            close_tail(seq, w.write_index, opts)?;
            row = w.row;
            key = sequence_key(row.subsong, row.order, row.row, channel);
            keys.push(key.clone());
            sequences.entry(key.clone()).or_default();
            // the carried register state opens the new row
            folder.pending = true;
        } else if now != folder.last_time {
            let seq = sequences.get_mut(&key).unwrap();
            folder.flush(seq, now, w.write_index)?;
        }
        folder.apply(w);
    }

    Ok((keys, sequences))
}
