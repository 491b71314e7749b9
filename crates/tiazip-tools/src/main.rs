use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::NOTHING, Cell, ContentArrangement, Table};
use log::info;

use tiazip::{
    fold, tia_channel_layout, ExportOptions, Exporter, FoldOptions, OutputData, SongMeta,
    SubsongMeta,
};

mod dump;
use dump::{load_bytes, parse_dump};

/// tiazip command line tools
#[derive(Parser)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION"),
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a register-dump log as assembly and binary artifacts
    Export {
        /// Input dump log (plain text or gzipped)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Export mode: RAW, BASIC, BASICX, DELTA, COMPACT or CRUSHED
        #[arg(long, default_value = "COMPACT")]
        mode: String,

        /// Output directory for the generated artifacts
        #[arg(long, default_value = ".")]
        out: PathBuf,

        /// Replay rate in Hz
        #[arg(long, default_value_t = 60.0)]
        hz: f32,

        /// Song name for the meta listing
        #[arg(long, default_value = "")]
        name: String,

        /// Song author for the meta listing
        #[arg(long, default_value = "")]
        author: String,

        /// Also write the raw register dump listing
        #[arg(long)]
        debug: bool,

        /// Extra options as key=value pairs (stackDepth, literalDictSize, ...)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },
    /// Show summary info for a register-dump log
    Info {
        /// Input dump log (plain text or gzipped)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Replay rate in Hz
        #[arg(long, default_value_t = 60.0)]
        hz: f32,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Export {
            file,
            mode,
            out,
            hz,
            name,
            author,
            debug,
            set,
        } => export_log(file, mode, out, hz, name, author, debug, set),
        Commands::Info { file, hz } => info_log(file, hz),
    }
}

#[allow(clippy::too_many_arguments)]
fn export_log(
    file: PathBuf,
    mode: String,
    out: PathBuf,
    hz: f32,
    name: String,
    author: String,
    debug: bool,
    set: Vec<String>,
) -> Result<()> {
    let bytes = load_bytes(&file)?;
    let text = String::from_utf8(bytes).context("dump log is not valid UTF-8")?;
    let log = parse_dump(&text)?;
    let systems = log.system_count();
    let mut engine = log.into_engine(hz, systems);

    let mut options = ExportOptions::default();
    options
        .set("tiaExportType", &mode)
        .with_context(|| format!("unknown export mode: {}", mode))?;
    options.debug_output = debug;
    for pair in &set {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("expected KEY=VALUE, found {}", pair))?;
        options.set(key, value)?;
    }

    let song = SongMeta {
        name,
        author,
        system_name: "Atari TIA".to_string(),
        subsongs: vec![SubsongMeta::default()],
        ..SongMeta::default()
    };

    let outputs = Exporter::tia(options)
        .export(&mut engine, &song)
        .context("export failed")?;

    fs::create_dir_all(&out)
        .with_context(|| format!("failed to create output directory: {}", out.display()))?;
    for output in &outputs {
        let path = out.join(&output.name);
        match &output.data {
            OutputData::Text(text) => fs::write(&path, text),
            OutputData::Binary(bytes) => fs::write(&path, bytes),
        }
        .with_context(|| format!("failed to write {}", path.display()))?;
        info!("wrote {}", path.display());
    }

    Ok(())
}

fn info_log(file: PathBuf, hz: f32) -> Result<()> {
    let bytes = load_bytes(&file)?;
    let text = String::from_utf8(bytes).context("dump log is not valid UTF-8")?;
    let log = parse_dump(&text)?;
    let systems = log.system_count();
    let write_count = log.writes.len();
    let mut engine = log.into_engine(hz, systems);

    let captured = tiazip::collect(&mut engine, 0)?;
    let fold_opts = FoldOptions::default();
    let tpf = fold::ticks_per_frame(hz);

    let mut rows: Vec<(String, String)> = vec![
        ("file".into(), file.display().to_string()),
        ("writes".into(), write_count.to_string()),
        ("systems".into(), systems.to_string()),
        (
            "duration".into(),
            format!(
                "{} frames ({:.2} s @ {} Hz)",
                engine.end_ticks() / tpf as u64,
                engine.end_ticks() as f64 / tiazip::TICKS_PER_SECOND as f64,
                hz
            ),
        ),
    ];

    for channel in 0..2 {
        let layout = tia_channel_layout(channel);
        let seq = fold::fold(&captured, layout.system_index, &layout, &fold_opts)?;
        rows.push((
            format!("channel {}", channel),
            format!("{} intervals, {} frames", seq.len(), seq.total_frames()),
        ));
    }

    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic);
    for (key, value) in rows {
        table.add_row(vec![Cell::new(key), Cell::new(value)]);
    }
    println!("{table}");

    Ok(())
}
