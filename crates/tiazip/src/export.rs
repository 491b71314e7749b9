//! Export driver: mode selection, table layout and artifact assembly.
//!
//! Each export mode threads the capture, folding, indexing and
//! compression stages differently and lays its own tables out in
//! `Track_data.asm`. The driver owns the per-channel register layouts and
//! the configuration, drives one capture per subsong and hands back the
//! finished artifacts without touching the filesystem.

use std::collections::BTreeMap;

use log::debug;

use crate::asm::{AsmWriter, ExportOutput};
use crate::capture::{collect, pattern_key, sequence_key, RegisterWrite};
use crate::delta::{code_tag, encode_sequence, TAG_LABEL};
use crate::engine::{ChipEngine, SongMeta};
use crate::error::ExportError;
use crate::fold::{fold, fold_by_row, FoldOptions};
use crate::index::{code_stats, find_common_sequences, Alphabet, AlphaCode};
use crate::program::{encode_copy_sequence, write_codes, CodeDictionary};
use crate::repeats::{select_repeats, Span};
use crate::state::{tia_channel_layout, ChannelLayout, ChannelStateSequence};
use crate::title::write_track_meta;
use crate::tree::SuffixTree;

/// Output selection for one export run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportMode {
    /// Raw folded intervals, one row per state.
    Raw,
    /// Split frequency and control/volume tables, lockstep channels.
    Basic,
    /// Split tables with independent channel playback.
    BasicX,
    /// Per-channel delta code stream, no macros.
    Delta,
    /// Row-deduplicated waveforms with song and pattern tables.
    #[default]
    Compact,
    /// Full repeat compression with macros and a short-form dictionary.
    Crushed,
}

impl ExportMode {
    pub fn name(&self) -> &'static str {
        match self {
            ExportMode::Raw => "RAW",
            ExportMode::Basic => "BASIC",
            ExportMode::BasicX => "BASICX",
            ExportMode::Delta => "DELTA",
            ExportMode::Compact => "COMPACT",
            ExportMode::Crushed => "CRUSHED",
        }
    }

    pub fn parse(value: &str) -> Option<ExportMode> {
        match value.to_ascii_uppercase().as_str() {
            "RAW" => Some(ExportMode::Raw),
            "BASIC" => Some(ExportMode::Basic),
            "BASICX" => Some(ExportMode::BasicX),
            "DELTA" => Some(ExportMode::Delta),
            "COMPACT" => Some(ExportMode::Compact),
            "CRUSHED" => Some(ExportMode::Crushed),
            _ => None,
        }
    }
}

/// Export configuration.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub mode: ExportMode,
    /// Also emit the raw register dump listing.
    pub debug_output: bool,
    /// Maximum macro call nesting the target player supports.
    pub stack_depth: usize,
    /// Short-form dictionary capacity.
    pub literal_dict_size: usize,
    /// Reserved for a future macro dictionary.
    pub sequence_dict_size: usize,
    /// Fail on zero-duration intervals instead of clamping.
    pub strict_durations: bool,
    /// RAW mode: append a duration byte per interval instead of repeating
    /// the state row once per frame.
    pub raw_encode_duration: bool,
    /// Shortest repeat the selector will consider.
    pub min_repeat_depth: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportOptions {
            mode: ExportMode::default(),
            debug_output: false,
            stack_depth: 2,
            literal_dict_size: 128,
            sequence_dict_size: 64,
            strict_durations: false,
            raw_encode_duration: true,
            min_repeat_depth: 3,
        }
    }
}

impl ExportOptions {
    /// Apply one configuration key. Recognized keys: `tiaExportType`,
    /// `debugOutput`, `stackDepth`, `literalDictSize`, `sequenceDictSize`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ExportError> {
        let bad_value = || ExportError::Config {
            key: key.to_string(),
            value: Some(value.to_string()),
        };
        match key {
            "tiaExportType" => {
                self.mode = ExportMode::parse(value).ok_or_else(bad_value)?;
            }
            "debugOutput" => {
                self.debug_output = parse_bool(value).ok_or_else(bad_value)?;
            }
            "stackDepth" => {
                self.stack_depth = value.parse().map_err(|_| bad_value())?;
            }
            "literalDictSize" => {
                self.literal_dict_size = value.parse().map_err(|_| bad_value())?;
            }
            "sequenceDictSize" => {
                self.sequence_dict_size = value.parse().map_err(|_| bad_value())?;
            }
            _ => {
                return Err(ExportError::Config {
                    key: key.to_string(),
                    value: None,
                })
            }
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// One pattern referenced by an order list.
#[derive(Debug, Clone)]
pub struct PatternIndex {
    pub key: String,
    pub subsong: u16,
    pub order: u16,
    pub channel: usize,
    pub pattern: u16,
}

/// Largest per-channel table the BASIC driver can index.
const BASIC_TABLE_LIMIT: usize = 256;
/// BASIC durations are stored in three bits, so intervals cap at 8 frames.
const BASIC_MAX_INTERVAL: u32 = 8;

/// The export driver.
pub struct Exporter {
    options: ExportOptions,
    layouts: Vec<ChannelLayout>,
}

impl Exporter {
    pub fn new(options: ExportOptions, layouts: Vec<ChannelLayout>) -> Self {
        Exporter { options, layouts }
    }

    /// An exporter for the two TIA audio channels.
    pub fn tia(options: ExportOptions) -> Self {
        Exporter::new(options, vec![tia_channel_layout(0), tia_channel_layout(1)])
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    pub fn channels(&self) -> usize {
        self.layouts.len()
    }

    /// Run the configured pipeline over every subsong of `song`.
    ///
    /// Fatal errors (capacity overflows, playback failures) abort the run
    /// before any artifact is produced.
    pub fn export(
        &self,
        engine: &mut dyn ChipEngine,
        song: &SongMeta,
    ) -> Result<Vec<ExportOutput>, ExportError> {
        let subsongs = song.subsongs.len().max(1);
        let mut writes: Vec<Vec<RegisterWrite>> = Vec::with_capacity(subsongs);
        for subsong in 0..subsongs {
            writes.push(collect(engine, subsong as u16)?);
        }

        let mut outputs = Vec::new();
        match self.options.mode {
            ExportMode::Raw => self.export_raw(song, &writes, &mut outputs)?,
            ExportMode::Basic => self.export_basic(song, &writes, false, &mut outputs)?,
            ExportMode::BasicX => self.export_basic(song, &writes, true, &mut outputs)?,
            ExportMode::Delta => self.export_delta(song, &writes, &mut outputs)?,
            ExportMode::Compact => self.export_compact(song, &writes, &mut outputs)?,
            ExportMode::Crushed => self.export_crushed(song, &writes, &mut outputs)?,
        }

        if self.options.debug_output {
            outputs.push(register_dump_output(&writes));
        }
        outputs.push(ExportOutput::text("Track_meta.asm", write_track_meta(song)));
        Ok(outputs)
    }

    fn fold_options(&self, suppress_quiet: bool, max_interval: Option<u32>) -> FoldOptions {
        FoldOptions {
            suppress_quiet,
            max_interval_duration: max_interval,
            strict_durations: self.options.strict_durations,
        }
    }

    fn export_raw(
        &self,
        song: &SongMeta,
        writes: &[Vec<RegisterWrite>],
        outputs: &mut Vec<ExportOutput>,
    ) -> Result<(), ExportError> {
        let opts = self.fold_options(false, None);
        let mut w = AsmWriter::new();
        write_song_header(&mut w, song);
        let mut total = 0usize;

        for (subsong, subsong_writes) in writes.iter().enumerate() {
            for (channel, layout) in self.layouts.iter().enumerate() {
                let seq = fold(subsong_writes, layout.system_index, layout, &opts)?;
                w.line("");
                w.label(&format!("SONG_{}_CHANNEL_{}", subsong, channel));
                let mut bytes = 0usize;
                let mut frames = 0u64;
                for n in &seq.intervals {
                    let row = [
                        n.state.registers[0],
                        n.state.registers[1],
                        n.state.registers[2],
                    ];
                    if self.options.raw_encode_duration {
                        w.byte_row(&[row[0], row[1], row[2], n.duration.min(255) as u8]);
                        bytes += 4;
                    } else {
                        for _ in 0..n.duration {
                            w.byte_row(&row);
                            bytes += 3;
                        }
                    }
                    frames += n.duration as u64;
                }
                w.byte_row(&[0]);
                bytes += 1;
                w.comment(&format!("{} bytes {} frames", bytes, frames));
                total += bytes;
            }
        }

        write_total_trailer(&mut w, &[("Channel Data", total)]);
        outputs.push(ExportOutput::text("Track_data.asm", w));
        Ok(())
    }

    fn export_basic(
        &self,
        song: &SongMeta,
        writes: &[Vec<RegisterWrite>],
        independent: bool,
        outputs: &mut Vec<ExportOutput>,
    ) -> Result<(), ExportError> {
        let mode = if independent { "BASICX" } else { "BASIC" };
        let opts = self.fold_options(false, Some(BASIC_MAX_INTERVAL));

        // fold everything first so capacity errors precede any output
        let mut folded: Vec<Vec<ChannelStateSequence>> = Vec::new();
        for subsong_writes in writes {
            let mut channels = Vec::new();
            for layout in &self.layouts {
                let seq = fold(subsong_writes, layout.system_index, layout, &opts)?;
                if seq.len() > BASIC_TABLE_LIMIT {
                    return Err(ExportError::CapacityExceeded {
                        mode,
                        what: format!("channel {} sequence", channels.len()),
                        limit: BASIC_TABLE_LIMIT,
                        actual: seq.len(),
                    });
                }
                channels.push(seq);
            }
            if !independent {
                if let Some(first) = channels.first() {
                    for (channel, seq) in channels.iter().enumerate() {
                        if seq.len() != first.len() {
                            return Err(ExportError::Other(format!(
                                "{} export requires lockstep channels: channel 0 has {} entries, channel {} has {}",
                                mode,
                                first.len(),
                                channel,
                                seq.len()
                            )));
                        }
                    }
                }
            }
            folded.push(channels);
        }

        let mut w = AsmWriter::new();
        write_song_header(&mut w, song);
        let mut total = 0usize;
        for (subsong, channels) in folded.iter().enumerate() {
            for (channel, seq) in channels.iter().enumerate() {
                w.line("");
                w.line(&format!(
                    "SONG_{}_CHANNEL_{}_LENGTH = {}",
                    subsong,
                    channel,
                    seq.len()
                ));
                w.label(&format!("SONG_{}_CHANNEL_{}_FREQ", subsong, channel));
                let freq_bytes: Vec<u8> = seq
                    .intervals
                    .iter()
                    .map(|n| (((n.duration.max(1) - 1) as u8) << 5) | (n.state.registers[1] & 0x1F))
                    .collect();
                for chunk in freq_bytes.chunks(8) {
                    w.byte_row(chunk);
                }
                w.label(&format!("SONG_{}_CHANNEL_{}_CTRLVOL", subsong, channel));
                let cv_bytes: Vec<u8> = seq
                    .intervals
                    .iter()
                    .map(|n| {
                        let vol = n.state.registers[2] & 0x0F;
                        if vol == 0 {
                            0xF0 | vol
                        } else {
                            (n.state.registers[0] << 4) | vol
                        }
                    })
                    .collect();
                for chunk in cv_bytes.chunks(8) {
                    w.byte_row(chunk);
                }
                total += freq_bytes.len() + cv_bytes.len();
            }
        }

        write_total_trailer(&mut w, &[("Table", total)]);
        outputs.push(ExportOutput::text("Track_data.asm", w));
        Ok(())
    }

    fn export_delta(
        &self,
        song: &SongMeta,
        writes: &[Vec<RegisterWrite>],
        outputs: &mut Vec<ExportOutput>,
    ) -> Result<(), ExportError> {
        let opts = self.fold_options(true, None);
        let dictionary = CodeDictionary::empty();
        let mut w = AsmWriter::new();
        write_song_header(&mut w, song);
        let mut bin = Vec::new();
        let mut total = 0usize;

        for (subsong, subsong_writes) in writes.iter().enumerate() {
            for (channel, layout) in self.layouts.iter().enumerate() {
                let seq = fold(subsong_writes, layout.system_index, layout, &opts)?;
                let codes = encode_sequence(&seq, layout)?;
                w.line("");
                w.label(&format!("SONG_{}_CHANNEL_{}", subsong, channel));
                total += write_codes(&mut w, &mut bin, &codes, &dictionary);
            }
        }

        write_total_trailer(&mut w, &[("Stream", total)]);
        outputs.push(ExportOutput::text("Track_data.asm", w));
        outputs.push(ExportOutput::binary("Track_data.bin", bin));
        Ok(())
    }

    fn export_compact(
        &self,
        song: &SongMeta,
        writes: &[Vec<RegisterWrite>],
        outputs: &mut Vec<ExportOutput>,
    ) -> Result<(), ExportError> {
        let opts = self.fold_options(true, None);

        // row-aligned sequences over every subsong and channel
        let mut sequences: BTreeMap<String, ChannelStateSequence> = BTreeMap::new();
        for subsong_writes in writes {
            for (channel, layout) in self.layouts.iter().enumerate() {
                let (_keys, rows) = fold_by_row(subsong_writes, channel, layout.system_index, layout, &opts)?;
                sequences.extend(rows);
            }
        }

        debug!("performing sequence compression over {} rows", sequences.len());
        let (canonical, frequency, representative) = find_common_sequences(&sequences);

        let mut w = AsmWriter::new();
        write_song_header(&mut w, song);

        // song lookup table
        let mut song_table_size = 0usize;
        w.line("");
        w.comment("Song Lookup Table");
        w.line(&format!("NUM_SONGS = {}", song.subsongs.len()));
        w.label("SONG_TABLE_START_LO");
        for i in 0..song.subsongs.len() {
            w.line(&format!("SONG_{} = . - SONG_TABLE_START_LO", i));
            w.line(&format!("    byte <SONG_{}_ADDR", i));
            song_table_size += 1;
        }
        w.label("SONG_TABLE_START_HI");
        for i in 0..song.subsongs.len() {
            w.line(&format!("    byte >SONG_{}_ADDR", i));
            song_table_size += 1;
        }

        // song bodies and the set of referenced patterns
        let mut song_data_size = 0usize;
        let mut patterns: Vec<PatternIndex> = Vec::new();
        w.comment("songs");
        for (i, subsong) in song.subsongs.iter().enumerate() {
            let mut already_added: BTreeMap<(usize, u16), bool> = BTreeMap::new();
            w.label(&format!("SONG_{}_ADDR", i));
            for (j, order) in subsong.orders.iter().enumerate() {
                let mut row = String::from("    byte ");
                for (k, &p) in order.iter().enumerate() {
                    if k > 0 {
                        row.push_str(", ");
                    }
                    let key = pattern_key(i as u16, k, p);
                    row.push_str(&key);
                    song_data_size += 1;
                    if !already_added.contains_key(&(k, p)) {
                        already_added.insert((k, p), true);
                        patterns.push(PatternIndex {
                            key,
                            subsong: i as u16,
                            order: j as u16,
                            channel: k,
                            pattern: p,
                        });
                    }
                }
                w.line(&row);
            }
            w.byte_row(&[255]);
            song_data_size += 1;
        }

        // pattern lookup table
        let mut pattern_table_size = 0usize;
        w.line("");
        w.comment("Pattern Lookup Table");
        w.line(&format!("NUM_PATTERNS = {}", patterns.len()));
        w.label("PAT_TABLE_START_LO");
        for p in &patterns {
            w.line(&format!("{} = . - PAT_TABLE_START_LO", p.key));
            w.line(&format!("   byte <{}_ADDR", p.key));
            pattern_table_size += 1;
        }
        w.label("PAT_TABLE_START_HI");
        for p in &patterns {
            w.line(&format!("   byte >{}_ADDR", p.key));
            pattern_table_size += 1;
        }

        // pattern bodies referencing waveform representatives
        let mut pattern_data_size = 0usize;
        for p in &patterns {
            let pattern_len = song.subsongs[p.subsong as usize].pattern_len;
            w.comment(&format!(
                "Subsong: {} Channel: {} Pattern: {}",
                p.subsong, p.channel, p.pattern
            ));
            w.text(&format!("{}_ADDR", p.key));
            let mut in_row = 0usize;
            for j in 0..pattern_len {
                let key = sequence_key(p.subsong, p.order, j, p.channel);
                let representative_key = match representative.get(&key) {
                    Some(r) => r,
                    None => {
                        // row never produced writes, skip it
                        debug!("row {} has no captured sequence", key);
                        continue;
                    }
                };
                if in_row % 8 == 0 {
                    w.text("\n    byte ");
                } else {
                    w.text(",");
                }
                w.text(representative_key);
                in_row += 1;
                pattern_data_size += 1;
            }
            w.text("\n");
            w.byte_row(&[255]);
            pattern_data_size += 1;
        }

        // waveform lookup table
        let mut waveform_table_size = 0usize;
        w.line("");
        w.comment("Waveform Lookup Table");
        w.line(&format!("NUM_WAVEFORMS = {}", canonical.len()));
        w.label("WF_TABLE_START_LO");
        for key in canonical.values() {
            w.line(&format!("{} = . - WF_TABLE_START_LO", key));
            w.line(&format!("   byte <{}_ADDR", key));
            waveform_table_size += 1;
        }
        w.label("WF_TABLE_START_HI");
        for key in canonical.values() {
            w.line(&format!("   byte >{}_ADDR", key));
            waveform_table_size += 1;
        }

        // waveform bodies
        let mut waveform_data_size = 0usize;
        let dictionary = CodeDictionary::empty();
        w.line("");
        w.comment("Waveforms");
        for (hash, key) in &canonical {
            w.label(&format!("{}_ADDR", key));
            w.comment(&format!("Hash {}, Freq {}", hash, frequency[hash]));
            let seq = &sequences[key];
            let layout = &self.layouts[0];
            let codes = encode_sequence(seq, layout)?;
            let mut bin = Vec::new();
            waveform_data_size += write_codes(&mut w, &mut bin, &codes, &dictionary);
        }

        write_total_trailer(
            &mut w,
            &[
                ("Song Table", song_table_size),
                ("Song Data", song_data_size),
                ("Pattern Lookup Table", pattern_table_size),
                ("Pattern Data", pattern_data_size),
                ("Waveform Lookup Table", waveform_table_size),
                ("Waveform Data", waveform_data_size),
            ],
        );
        outputs.push(ExportOutput::text("Track_data.asm", w));
        Ok(())
    }

    fn export_crushed(
        &self,
        song: &SongMeta,
        writes: &[Vec<RegisterWrite>],
        outputs: &mut Vec<ExportOutput>,
    ) -> Result<(), ExportError> {
        let opts = self.fold_options(true, None);

        // per-channel code streams and the global code frequency map
        let mut streams: Vec<(u16, usize, Vec<AlphaCode>)> = Vec::new();
        let mut frequency: BTreeMap<AlphaCode, usize> = BTreeMap::new();
        for (subsong, subsong_writes) in writes.iter().enumerate() {
            for (channel, layout) in self.layouts.iter().enumerate() {
                let seq = fold(subsong_writes, layout.system_index, layout, &opts)?;
                let codes = encode_sequence(&seq, layout)?;
                for &code in &codes {
                    *frequency.entry(code).or_insert(0) += 1;
                }
                streams.push((subsong as u16, channel, codes));
            }
        }

        let alphabet = Alphabet::from_frequencies(&frequency);
        let stats = code_stats(&frequency);
        debug!(
            "{} symbols over {} distinct codes, entropy {:.3} bits ({:.1} ideal bytes)",
            stats.symbols, stats.distinct, stats.entropy, stats.expected_bytes
        );

        // compress each stream and collect program code frequencies
        let mut encoded_streams: Vec<(u16, usize, Vec<AlphaCode>)> = Vec::new();
        let mut command_frequency: BTreeMap<AlphaCode, usize> = BTreeMap::new();
        for (subsong, channel, codes) in &streams {
            let ranks = alphabet.translate(codes);
            let tree = SuffixTree::build(alphabet.len(), &ranks);
            let plan = select_repeats(
                &tree,
                &ranks,
                *subsong,
                *channel,
                self.options.min_repeat_depth,
            );
            let bounds = Span::new(*subsong, *channel, 0, codes.len());
            let encoded = encode_copy_sequence(codes, &bounds, &plan);
            for &code in &encoded {
                *command_frequency.entry(code).or_insert(0) += 1;
            }
            encoded_streams.push((*subsong, *channel, encoded));
        }

        // macro bodies are flat, so one level of nesting suffices; still
        // refuse to emit a program the configured player could not run
        let has_macros = encoded_streams
            .iter()
            .any(|(_, _, codes)| codes.iter().any(|&c| code_tag(c) == TAG_LABEL));
        if has_macros && self.options.stack_depth < 1 {
            return Err(ExportError::StackDepthExceeded {
                limit: self.options.stack_depth,
                needed: 1,
            });
        }

        let dictionary = CodeDictionary::build(&command_frequency, self.options.literal_dict_size);
        debug!("dictionary holds {} short forms", dictionary.len());

        let mut w = AsmWriter::new();
        write_song_header(&mut w, song);

        let mut song_table_size = 0usize;
        w.line("");
        w.comment("Song Lookup Table");
        w.line(&format!("NUM_SONGS = {}", song.subsongs.len()));
        w.label("SONG_TABLE_START_LO");
        for i in 0..song.subsongs.len() {
            w.line(&format!("    byte <SONG_{}_ADDR", i));
            song_table_size += 1;
        }
        w.label("SONG_TABLE_START_HI");
        for i in 0..song.subsongs.len() {
            w.line(&format!("    byte >SONG_{}_ADDR", i));
            song_table_size += 1;
        }

        let mut bin = Vec::new();
        let mut stream_size = 0usize;
        let mut last_subsong = None;
        for (subsong, channel, codes) in &encoded_streams {
            if last_subsong != Some(*subsong) {
                w.label(&format!("SONG_{}_ADDR", subsong));
                last_subsong = Some(*subsong);
            }
            w.label(&format!("SONG_{}_CHANNEL_{}", subsong, channel));
            stream_size += write_codes(&mut w, &mut bin, codes, &dictionary);
        }

        write_total_trailer(
            &mut w,
            &[("Song Table", song_table_size), ("Stream", stream_size)],
        );
        outputs.push(ExportOutput::text("Track_data.asm", w));
        outputs.push(ExportOutput::binary("Track_data.bin", bin));
        Ok(())
    }
}

fn write_song_header(w: &mut AsmWriter, song: &SongMeta) {
    w.comment(&format!("Song: {}", song.name));
    w.comment(&format!("Author: {}", song.author));
}

fn write_total_trailer(w: &mut AsmWriter, sections: &[(&str, usize)]) {
    w.line("");
    let mut total = 0usize;
    for (name, size) in sections {
        w.comment(&format!("{} Size {}", name, size));
        total += size;
    }
    w.comment(&format!("Total Data Size {}", total));
}

fn register_dump_output(writes: &[Vec<RegisterWrite>]) -> ExportOutput {
    let mut w = AsmWriter::new();
    for subsong_writes in writes {
        for write in subsong_writes {
            w.line(&format!(
                "; IDX{} {}.{}: SS{} ORD{} ROW{} SYS{}> {} = {}",
                write.write_index,
                write.seconds,
                write.ticks,
                write.row.subsong,
                write.row.order,
                write.row.row,
                write.system_index,
                write.addr,
                write.val
            ));
        }
    }
    ExportOutput::text("RegisterDump.txt", w)
}
