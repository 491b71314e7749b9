//! Register-dump log loading and parsing.
//!
//! A dump log is plain text, one write per line:
//!
//! ```text
//! ; IDX0 0.1666: SS0 ORD0 ROW0 SYS0> 25 = 4
//! ```
//!
//! The leading `; ` is optional, blank lines are skipped and a `SYS-1`
//! line marks the end of the song. Logs may be gzip-compressed.

use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;

use tiazip::engine::TICKS_PER_SECOND;
use tiazip::{ScriptBuilder, ScriptedEngine, ScriptedWrite};

/// Read a dump log from disk, transparently decompressing gzip input
/// (detected by extension or by the magic bytes).
pub fn load_bytes(path: &Path) -> Result<Vec<u8>> {
    let data =
        fs::read(path).with_context(|| format!("failed to read file: {}", path.display()))?;

    let is_gzip = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
        || (data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b);

    if is_gzip {
        let mut decoder = GzDecoder::new(Cursor::new(data));
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .context("gzip decompression failed")?;
        Ok(out)
    } else {
        Ok(data)
    }
}

/// A parsed dump log.
pub struct DumpLog {
    pub writes: Vec<ScriptedWrite>,
    /// Absolute tick of the end-of-song marker, when present.
    pub end_ticks: Option<u64>,
}

impl DumpLog {
    /// Build a scripted engine replaying this log.
    pub fn into_engine(self, hz: f32, systems: usize) -> ScriptedEngine {
        let end = self.end_ticks.unwrap_or_else(|| {
            self.writes
                .last()
                .map(|w| w.seconds as u64 * TICKS_PER_SECOND as u64 + w.ticks as u64)
                .unwrap_or(0)
        });
        let mut builder = ScriptBuilder::new(hz, systems);
        for w in self.writes {
            builder.push(w);
        }
        builder.finish(end)
    }

    /// Highest system index seen, plus one.
    pub fn system_count(&self) -> usize {
        self.writes
            .iter()
            .map(|w| w.system + 1)
            .max()
            .unwrap_or(1)
    }
}

/// Parse a dump log.
pub fn parse_dump(text: &str) -> Result<DumpLog> {
    let mut writes = Vec::new();
    let mut end_ticks = None;

    for (line_no, raw) in text.lines().enumerate() {
        let line = raw.trim().trim_start_matches(';').trim();
        if line.is_empty() || !line.starts_with("IDX") {
            continue;
        }
        match parse_line(line) {
            Ok(Record::Write(w)) => writes.push(w),
            Ok(Record::End(ticks)) => end_ticks = Some(ticks),
            Err(e) => bail!("line {}: {}", line_no + 1, e),
        }
    }

    Ok(DumpLog { writes, end_ticks })
}

enum Record {
    Write(ScriptedWrite),
    End(u64),
}

fn parse_line(line: &str) -> Result<Record> {
    // IDX{w} {s}.{t}: SS{ss} ORD{o} ROW{r} SYS{i}> {addr} = {val}
    let mut fields = line.split_whitespace();

    let _idx = fields.next().context("missing IDX field")?;
    let time = fields.next().context("missing time field")?;
    let time = time.strip_suffix(':').unwrap_or(time);
    let (seconds, ticks) = time
        .split_once('.')
        .context("time field is not seconds.ticks")?;
    let seconds: u32 = seconds.parse().context("bad seconds")?;
    let ticks: u32 = ticks.parse().context("bad ticks")?;

    let subsong: u16 = numeric_field(fields.next(), "SS")?;
    let order: u16 = numeric_field(fields.next(), "ORD")?;
    let row: u16 = numeric_field(fields.next(), "ROW")?;
    let system: i64 = numeric_field(fields.next().map(|f| f.trim_end_matches('>')), "SYS")?;

    if system < 0 {
        return Ok(Record::End(
            seconds as u64 * TICKS_PER_SECOND as u64 + ticks as u64,
        ));
    }

    let addr: u32 = fields.next().context("missing addr")?.parse()?;
    let eq = fields.next().context("missing '='")?;
    if eq != "=" {
        bail!("expected '=', found {}", eq);
    }
    let val: u32 = fields.next().context("missing value")?.parse()?;

    Ok(Record::Write(ScriptedWrite {
        seconds,
        ticks,
        subsong,
        order,
        row,
        system: system as usize,
        addr,
        val,
    }))
}

fn numeric_field<T: std::str::FromStr>(field: Option<&str>, prefix: &str) -> Result<T> {
    let field = field.with_context(|| format!("missing {} field", prefix))?;
    let digits = field
        .strip_prefix(prefix)
        .with_context(|| format!("field {} does not start with {}", field, prefix))?;
    digits
        .parse()
        .map_err(|_| anyhow::anyhow!("bad {} value: {}", prefix, digits))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_write_line() {
        let log = parse_dump("; IDX0 0.1666: SS0 ORD0 ROW0 SYS0> 25 = 4\n").unwrap();
        assert_eq!(log.writes.len(), 1);
        let w = log.writes[0];
        assert_eq!(w.ticks, 1666);
        assert_eq!(w.addr, 25);
        assert_eq!(w.val, 4);
    }

    #[test]
    fn test_parse_end_marker() {
        let text = "; IDX0 0.100: SS0 ORD0 ROW0 SYS0> 25 = 4\n; IDX0 1.0: SS0 ORD0 ROW0 SYS-1> 0 = 0\n";
        let log = parse_dump(text).unwrap();
        assert_eq!(log.writes.len(), 1);
        assert_eq!(log.end_ticks, Some(1_000_000));
    }

    #[test]
    fn test_parse_skips_unrelated_lines() {
        let log = parse_dump("# a comment\n\n; not a record\n").unwrap();
        assert!(log.writes.is_empty());
    }
}
