//! The driven sound-chip engine seam.
//!
//! The exporter never emulates a chip itself. It drives an engine that
//! implements [`ChipEngine`] one tick at a time and drains the register
//! writes the engine captured during that tick. Anything that can produce a
//! time-ordered register-write stream can stand behind this trait; the
//! [`crate::script::ScriptedEngine`] replays a prerecorded log and is what
//! the command line tools and the tests use.

use crate::error::ExportError;

/// Native engine clock resolution. Tick counters wrap into seconds at this
/// rate, and frame durations are derived from it.
pub const TICKS_PER_SECOND: u32 = 1_000_000;

/// Playback position reported by an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackPosition {
    pub subsong: u16,
    pub order: u16,
    pub row: u16,
}

/// A sound-chip engine that can be driven tick-by-tick while capturing
/// register writes.
///
/// The capture contract mirrors the tick loop in [`crate::capture::collect`]:
/// the exporter toggles capture on, calls `begin`, then alternates `tick`
/// and `drain_writes` until the engine reports completion. Writes drained
/// after one tick all share that tick's timestamp.
pub trait ChipEngine {
    /// Enable or disable register-write capture on every system.
    fn set_register_capture(&mut self, enabled: bool);

    /// Stop playback, disable pattern repeat, seek to order 0 of the given
    /// subsong and start playing.
    fn begin(&mut self, subsong: u16) -> Result<(), ExportError>;

    /// Advance playback by one engine tick. Returns `true` once the song
    /// has ended.
    fn tick(&mut self) -> Result<bool, ExportError>;

    /// Whether the engine is still playing.
    fn is_playing(&self) -> bool;

    /// Current playback position.
    fn position(&self) -> PlaybackPosition;

    /// Whole seconds and residual ticks elapsed since `begin`.
    fn elapsed(&self) -> (u32, u32);

    /// Replay rate in Hz (60.0 for NTSC timing).
    fn playback_hz(&self) -> f32;

    /// Number of emulated systems attached to the engine.
    fn system_count(&self) -> usize;

    /// Take all register writes the given system captured since the last
    /// drain, in issue order.
    fn drain_writes(&mut self, system: usize) -> Vec<(u32, u32)>;
}

/// Song-level metadata the export driver needs.
///
/// This is deliberately minimal: the exporter only reads titles for the
/// meta listing and the order/pattern structure for the lookup tables. The
/// full song data model stays with the caller.
#[derive(Debug, Clone, Default)]
pub struct SongMeta {
    pub name: String,
    pub author: String,
    pub album: String,
    pub system_name: String,
    pub tuning: f64,
    pub instruments: usize,
    pub wavetables: usize,
    pub samples: usize,
    pub subsongs: Vec<SubsongMeta>,
}

/// Per-subsong order list.
#[derive(Debug, Clone, Default)]
pub struct SubsongMeta {
    /// `orders[order][channel]` is the pattern number played there.
    pub orders: Vec<Vec<u16>>,
    /// Number of rows in every pattern of this subsong.
    pub pattern_len: u16,
}

impl SongMeta {
    /// A one-subsong song with no orders, used when exporting bare captures.
    pub fn untitled() -> Self {
        SongMeta {
            subsongs: vec![SubsongMeta::default()],
            ..SongMeta::default()
        }
    }
}
