//! tiazip converts multi-channel chiptune songs, captured as streams of
//! hardware register writes, into compact assembly listings and binary
//! blobs a playback routine on a retro CPU can execute one frame at a
//! time.
//!
//! The pipeline captures writes from a driven sound-chip engine, folds
//! them into per-channel state sequences with frame-quantized durations,
//! deduplicates row-aligned fragments by hash, delta-encodes the result
//! into a byte-code stream and finally compresses repeats discovered with
//! a suffix tree into a program of literal runs and macro calls.
//!
//! # Example
//!
//! ```
//! use tiazip::{ExportMode, ExportOptions, Exporter, ScriptBuilder, SongMeta};
//!
//! // one beep on TIA channel 0, captured as three same-tick writes
//! let mut script = ScriptBuilder::new(60.0, 1);
//! script.write(0, 0, 0, 0, 0x15, 4); // control
//! script.write(0, 0, 0, 0, 0x17, 7); // frequency
//! script.write(0, 0, 0, 0, 0x19, 15); // volume
//! let mut engine = script.finish(tiazip::fold::ticks_per_frame(60.0) as u64);
//!
//! let options = ExportOptions {
//!     mode: ExportMode::Delta,
//!     ..ExportOptions::default()
//! };
//! let outputs = Exporter::tia(options)
//!     .export(&mut engine, &SongMeta::untitled())
//!     .unwrap();
//! assert!(outputs.iter().any(|o| o.name == "Track_data.asm"));
//! ```

pub mod asm;
pub mod capture;
pub mod delta;
pub mod engine;
mod error;
pub mod export;
pub mod fold;
pub mod index;
pub mod program;
pub mod repeats;
pub mod script;
pub mod state;
pub mod title;
pub mod tree;

pub use asm::{AsmWriter, ExportOutput, OutputData};
pub use capture::{collect, pattern_key, sequence_key, RegisterWrite, RowIndex};
pub use engine::{ChipEngine, PlaybackPosition, SongMeta, SubsongMeta, TICKS_PER_SECOND};
pub use error::ExportError;
pub use export::{ExportMode, ExportOptions, Exporter};
pub use fold::{fold, fold_by_row, FoldOptions};
pub use index::{Alphabet, AlphaChar, AlphaCode};
pub use repeats::{DuplicateSpans, Span};
pub use script::{ScriptBuilder, ScriptedEngine, ScriptedWrite};
pub use state::{
    tia_channel_layout, AddressMap, ChannelLayout, ChannelState, ChannelStateInterval,
    ChannelStateSequence, CHANNEL_REGISTERS,
};
pub use tree::{NodeId, SuffixTree};
