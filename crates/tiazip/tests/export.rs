use tiazip::fold::ticks_per_frame;
use tiazip::state::{AUDC0, AUDF0, AUDV0};
use tiazip::{
    ExportError, ExportMode, ExportOptions, Exporter, ScriptBuilder, ScriptedEngine, SongMeta,
    SubsongMeta,
};

fn frames(n: u64) -> u64 {
    n * ticks_per_frame(60.0) as u64
}

fn options(mode: ExportMode) -> ExportOptions {
    ExportOptions {
        mode,
        ..ExportOptions::default()
    }
}

fn one_subsong_meta() -> SongMeta {
    SongMeta {
        name: "test".to_string(),
        author: "nobody".to_string(),
        subsongs: vec![SubsongMeta::default()],
        ..SongMeta::default()
    }
}

fn beep_engine() -> ScriptedEngine {
    let mut b = ScriptBuilder::new(60.0, 1);
    b.write(0, 0, 0, 0, AUDC0, 4);
    b.write(0, 0, 0, 0, AUDF0, 7);
    b.write(0, 0, 0, 0, AUDV0, 15);
    b.finish(frames(1))
}

fn text_of<'a>(outputs: &'a [tiazip::ExportOutput], name: &str) -> &'a str {
    outputs
        .iter()
        .find(|o| o.name == name)
        .unwrap_or_else(|| panic!("missing output {}", name))
        .as_text()
        .expect("text output")
}

fn bytes_of<'a>(outputs: &'a [tiazip::ExportOutput], name: &str) -> &'a [u8] {
    outputs
        .iter()
        .find(|o| o.name == name)
        .unwrap_or_else(|| panic!("missing output {}", name))
        .as_bytes()
        .expect("binary output")
}

#[test]
fn test_silent_song_compact() {
    let mut engine = ScriptBuilder::new(60.0, 1).finish(0);
    let outputs = Exporter::tia(options(ExportMode::Compact))
        .export(&mut engine, &one_subsong_meta())
        .unwrap();

    let data = text_of(&outputs, "Track_data.asm");
    assert!(data.contains("NUM_SONGS = 1"));
    assert!(data.contains("NUM_PATTERNS = 0"));
    // both silent channels fold to the same empty waveform
    assert!(data.contains("NUM_WAVEFORMS = 1"));
    assert!(data.contains("    byte 0\n"));
}

#[test]
fn test_single_frame_beep_compact_waveform() {
    let mut engine = beep_engine();
    let outputs = Exporter::tia(options(ExportMode::Compact))
        .export(&mut engine, &one_subsong_meta())
        .unwrap();

    let data = text_of(&outputs, "Track_data.asm");
    // FULL register write 0xA7 0x4F followed by the stop byte
    assert!(data.contains("    byte 167,79\n"));
    assert!(data.contains("    byte 0\n"));
}

#[test]
fn test_single_frame_beep_delta_binary() {
    let mut engine = beep_engine();
    let outputs = Exporter::tia(options(ExportMode::Delta))
        .export(&mut engine, &one_subsong_meta())
        .unwrap();

    // channel 0 carries the beep; channel 1 folds to one silent frame
    assert_eq!(
        bytes_of(&outputs, "Track_data.bin"),
        &[0xA7, 0x4F, 0x00, 0x08, 0x00]
    );
}

#[test]
fn test_pure_pause_delta_binary() {
    let mut b = ScriptBuilder::new(60.0, 1);
    b.write(0, 0, 0, 0, AUDV0, 0);
    let mut engine = b.finish(frames(100));
    let outputs = Exporter::tia(options(ExportMode::Delta))
        .export(&mut engine, &one_subsong_meta())
        .unwrap();

    // 31 + 31 + 31 + 7 frames of pause then stop, on both channels
    assert_eq!(
        bytes_of(&outputs, "Track_data.bin"),
        &[0xF8, 0xF8, 0xF8, 0x38, 0x00, 0xF8, 0xF8, 0xF8, 0x38, 0x00]
    );
}

#[test]
fn test_basic_size_guard() {
    // 257 one-frame intervals overflow the BASIC table
    let mut b = ScriptBuilder::new(60.0, 1);
    for i in 0..257u64 {
        b.write(frames(i), 0, 0, 0, AUDF0, if i % 2 == 0 { 1 } else { 2 });
    }
    let mut engine = b.finish(frames(257));

    let err = Exporter::tia(options(ExportMode::Basic))
        .export(&mut engine, &one_subsong_meta())
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("257"), "message: {}", message);
    assert!(message.contains("256"), "message: {}", message);
}

#[test]
fn test_basicx_tables() {
    let mut b = ScriptBuilder::new(60.0, 1);
    b.write(0, 0, 0, 0, AUDC0, 4);
    b.write(0, 0, 0, 0, AUDF0, 7);
    b.write(0, 0, 0, 0, AUDV0, 15);
    let mut engine = b.finish(frames(2));
    let outputs = Exporter::tia(options(ExportMode::BasicX))
        .export(&mut engine, &one_subsong_meta())
        .unwrap();

    let data = text_of(&outputs, "Track_data.asm");
    assert!(data.contains("SONG_0_CHANNEL_0_FREQ"));
    assert!(data.contains("SONG_0_CHANNEL_0_CTRLVOL"));
    // duration 2, frequency 7: (2 - 1) << 5 | 7
    assert!(data.contains("    byte 39\n"));
    // control 4, volume 15
    assert!(data.contains("    byte 79\n"));
}

#[test]
fn test_raw_mode_rows() {
    let mut engine = beep_engine();
    let outputs = Exporter::tia(options(ExportMode::Raw))
        .export(&mut engine, &one_subsong_meta())
        .unwrap();

    let data = text_of(&outputs, "Track_data.asm");
    assert!(data.contains("SONG_0_CHANNEL_0"));
    assert!(data.contains("    byte 4,7,15,1\n"));
}

#[test]
fn test_crushed_emits_macros() {
    // forty frames alternating between two frequencies makes a strongly
    // repetitive code stream
    let mut b = ScriptBuilder::new(60.0, 1);
    b.write(0, 0, 0, 0, AUDC0, 4);
    b.write(0, 0, 0, 0, AUDV0, 15);
    for i in 0..40u64 {
        b.write(frames(i), 0, 0, 0, AUDF0, if i % 2 == 0 { 1 } else { 2 });
    }
    let mut engine = b.finish(frames(40));
    let outputs = Exporter::tia(options(ExportMode::Crushed))
        .export(&mut engine, &one_subsong_meta())
        .unwrap();

    let data = text_of(&outputs, "Track_data.asm");
    assert!(data.contains("SPAN_START_"));
    assert!(data.contains("SPAN_REF("));
    assert!(data.contains("NUM_SONGS = 1"));

    let bin = bytes_of(&outputs, "Track_data.bin");
    assert!(!bin.is_empty());
    assert_eq!(bin.last(), Some(&0u8));
}

#[test]
fn test_crushed_respects_stack_depth() {
    let mut b = ScriptBuilder::new(60.0, 1);
    b.write(0, 0, 0, 0, AUDC0, 4);
    b.write(0, 0, 0, 0, AUDV0, 15);
    for i in 0..40u64 {
        b.write(frames(i), 0, 0, 0, AUDF0, if i % 2 == 0 { 1 } else { 2 });
    }
    let mut engine = b.finish(frames(40));

    let mut opts = options(ExportMode::Crushed);
    opts.stack_depth = 0;
    let err = Exporter::tia(opts)
        .export(&mut engine, &one_subsong_meta())
        .unwrap_err();
    assert!(matches!(err, ExportError::StackDepthExceeded { .. }));
}

#[test]
fn test_register_dump_output() {
    let mut engine = beep_engine();
    let mut opts = options(ExportMode::Delta);
    opts.debug_output = true;
    let outputs = Exporter::tia(opts)
        .export(&mut engine, &one_subsong_meta())
        .unwrap();

    let dump = text_of(&outputs, "RegisterDump.txt");
    assert!(dump.contains("SS0 ORD0 ROW0 SYS0>"));
    assert!(dump.contains("= 15"));
}

#[test]
fn test_track_meta_listing() {
    let mut engine = beep_engine();
    let outputs = Exporter::tia(options(ExportMode::Compact))
        .export(&mut engine, &one_subsong_meta())
        .unwrap();

    let meta = text_of(&outputs, "Track_meta.asm");
    assert!(meta.contains("; Name: test"));
    assert!(meta.contains("; Author: nobody"));
    assert!(meta.contains("TITLE_GRAPHICS_0"));
    assert!(meta.contains("TITLE_LENGTH ="));
}

#[test]
fn test_options_from_keys() {
    let mut opts = ExportOptions::default();
    opts.set("tiaExportType", "CRUSHED").unwrap();
    assert_eq!(opts.mode, ExportMode::Crushed);
    opts.set("debugOutput", "true").unwrap();
    assert!(opts.debug_output);
    opts.set("stackDepth", "4").unwrap();
    assert_eq!(opts.stack_depth, 4);
    opts.set("literalDictSize", "64").unwrap();
    assert_eq!(opts.literal_dict_size, 64);
    opts.set("sequenceDictSize", "32").unwrap();
    assert_eq!(opts.sequence_dict_size, 32);

    assert!(opts.set("unknownKey", "1").is_err());
    assert!(opts.set("tiaExportType", "WAT").is_err());
}

#[test]
fn test_compact_pattern_tables() {
    let mut b = ScriptBuilder::new(60.0, 1);
    b.write(0, 0, 0, 0, AUDV0, 9);
    b.write(frames(2), 0, 1, 0, AUDF0, 3);
    let mut engine = b.finish(frames(4));

    let song = SongMeta {
        name: "pat".to_string(),
        subsongs: vec![SubsongMeta {
            orders: vec![vec![0, 0]],
            pattern_len: 2,
        }],
        ..SongMeta::default()
    };
    let outputs = Exporter::tia(options(ExportMode::Compact))
        .export(&mut engine, &song)
        .unwrap();

    let data = text_of(&outputs, "Track_data.asm");
    assert!(data.contains("NUM_PATTERNS = 2"));
    assert!(data.contains("PAT_S00_C00_P00"));
    assert!(data.contains("PAT_S00_C01_P00"));
    assert!(data.contains("PAT_TABLE_START_LO"));
    assert!(data.contains("WF_TABLE_START_LO"));
    assert!(data.contains("; Total Data Size"));
}
