//! Title graphics for the meta listing.
//!
//! Song titles are rendered into a 4x6 pixel font, two glyphs per byte
//! column, and emitted as `TITLE_GRAPHICS_{i}` rows the player can blit
//! directly.

use std::fmt::Write as _;

use crate::asm::AsmWriter;
use crate::engine::SongMeta;

/// Longest title the graphics table can hold.
pub const MAX_TITLE_LEN: usize = 26;

const SYMBOL_SPACE: usize = 10;
const SYMBOL_UNDERSCORE: usize = 11;

/// 4x6 font data used to encode the title, one nibble row per byte.
#[rustfmt::skip]
const FONT_DATA: [[u8; 6]; 41] = [
    [0x00, 0x04, 0x0a, 0x0a, 0x0a, 0x04], // 0
    [0x00, 0x0e, 0x04, 0x04, 0x04, 0x0c], // 1
    [0x00, 0x0e, 0x08, 0x06, 0x02, 0x0c], // 2
    [0x00, 0x0c, 0x02, 0x06, 0x02, 0x0c], // 3
    [0x00, 0x02, 0x02, 0x0e, 0x0a, 0x0a], // 4
    [0x00, 0x0c, 0x02, 0x0c, 0x08, 0x06], // 5
    [0x00, 0x06, 0x0a, 0x0c, 0x08, 0x06], // 6
    [0x00, 0x08, 0x08, 0x04, 0x02, 0x0e], // 7
    [0x00, 0x06, 0x0a, 0x0e, 0x0a, 0x0c], // 8
    [0x00, 0x02, 0x02, 0x0e, 0x0a, 0x0c], // 9
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00], // space
    [0x00, 0x0e, 0x00, 0x00, 0x00, 0x00], // underscore
    [0x00, 0x04, 0x00, 0x00, 0x00, 0x00], // dot
    [0x00, 0x02, 0x04, 0x08, 0x04, 0x02], // <
    [0x00, 0x08, 0x04, 0x02, 0x04, 0x08], // >
    [0x00, 0x0a, 0x0a, 0x0e, 0x0a, 0x0e], // A
    [0x00, 0x0e, 0x0a, 0x0c, 0x0a, 0x0e], // B
    [0x00, 0x0e, 0x08, 0x08, 0x08, 0x0e], // C
    [0x00, 0x0c, 0x0a, 0x0a, 0x0a, 0x0c], // D
    [0x00, 0x0e, 0x08, 0x0c, 0x08, 0x0e], // E
    [0x00, 0x08, 0x08, 0x0c, 0x08, 0x0e], // F
    [0x00, 0x0e, 0x0a, 0x08, 0x08, 0x0e], // G
    [0x00, 0x0a, 0x0a, 0x0e, 0x0a, 0x0a], // H
    [0x00, 0x04, 0x04, 0x04, 0x04, 0x04], // I
    [0x00, 0x0e, 0x0a, 0x02, 0x02, 0x02], // J
    [0x00, 0x0a, 0x0a, 0x0c, 0x0a, 0x0a], // K
    [0x00, 0x0e, 0x08, 0x08, 0x08, 0x08], // L
    [0x00, 0x0a, 0x0a, 0x0e, 0x0e, 0x0e], // M
    [0x00, 0x0a, 0x0a, 0x0a, 0x0a, 0x0e], // N
    [0x00, 0x0e, 0x0a, 0x0a, 0x0a, 0x0e], // O
    [0x00, 0x08, 0x08, 0x0e, 0x0a, 0x0e], // P
    [0x00, 0x06, 0x08, 0x0a, 0x0a, 0x0e], // Q
    [0x00, 0x0a, 0x0a, 0x0c, 0x0a, 0x0e], // R
    [0x00, 0x0e, 0x02, 0x0e, 0x08, 0x0e], // S
    [0x00, 0x04, 0x04, 0x04, 0x04, 0x0e], // T
    [0x00, 0x0e, 0x0a, 0x0a, 0x0a, 0x0a], // U
    [0x00, 0x04, 0x04, 0x0e, 0x0a, 0x0a], // V
    [0x00, 0x0e, 0x0e, 0x0e, 0x0a, 0x0a], // W
    [0x00, 0x0a, 0x0e, 0x04, 0x0e, 0x0a], // X
    [0x00, 0x04, 0x04, 0x0e, 0x0a, 0x0a], // Y
    [0x00, 0x0e, 0x08, 0x04, 0x02, 0x0e], // Z
];

/// Glyph index for a character. Unmapped characters render as an
/// underscore; NUL renders as a space so padding stays blank.
pub fn font_index(c: u8) -> usize {
    match c {
        b'0'..=b'9' => (c - b'0') as usize,
        b' ' | 0 => SYMBOL_SPACE,
        b'.' => 12,
        b'<' => 13,
        b'>' => 14,
        b'a'..=b'z' => 15 + (c - b'a') as usize,
        b'A'..=b'Z' => 15 + (c - b'A') as usize,
        _ => SYMBOL_UNDERSCORE,
    }
}

/// Emit the glyph table for `value`, two glyphs per 6-byte column.
///
/// At least three glyph pairs are emitted even for shorter titles, so the
/// player always has a minimum-width banner. Ends with `TITLE_LENGTH`.
/// Returns the number of data bytes written.
pub fn write_title_graphics(w: &mut AsmWriter, value: &str) -> usize {
    let mut bytes_written = 0usize;
    let mut chars = value.bytes();
    let mut end = false;
    let mut len = 0usize;

    while len < 6 || !end {
        w.label(&format!("TITLE_GRAPHICS_{}", len));
        len += 1;
        let mut next = || -> u8 {
            if end {
                return 0;
            }
            match chars.next() {
                Some(c) => c,
                None => {
                    end = true;
                    0
                }
            }
        };
        let a = next();
        let b = next();
        let ai = font_index(a);
        let bi = font_index(b);
        let mut row = String::from("    byte ");
        for i in 0..6 {
            if i > 0 {
                row.push(',');
            }
            let packed = (FONT_DATA[ai][i] << 4) | FONT_DATA[bi][i];
            let _ = write!(row, "{}", packed);
            bytes_written += 1;
        }
        w.line(&row);
    }
    w.line(&format!("TITLE_LENGTH = {}", len));
    bytes_written
}

/// The banner title for a song: its name and author, clipped to
/// [`MAX_TITLE_LEN`] characters.
pub fn banner_title(song: &SongMeta) -> String {
    let mut title = if song.name.is_empty() {
        "untitled".to_string()
    } else if song.author.is_empty() {
        song.name.clone()
    } else {
        format!("{} by {}", song.name, song.author)
    };
    if title.len() > MAX_TITLE_LEN {
        title.truncate(MAX_TITLE_LEN - 3);
        title.push_str("...");
    }
    title
}

/// Write the full meta listing: commented song header plus title tiles.
pub fn write_track_meta(song: &SongMeta) -> AsmWriter {
    let mut w = AsmWriter::new();
    w.comment(&format!("Name: {}", song.name));
    w.comment(&format!("Author: {}", song.author));
    w.comment(&format!("Album: {}", song.album));
    w.comment(&format!("System: {}", song.system_name));
    w.comment(&format!("Tuning: {}", song.tuning));
    w.comment(&format!("Instruments: {}", song.instruments));
    w.comment(&format!("Wavetables: {}", song.wavetables));
    w.comment(&format!("Samples: {}", song.samples));
    w.line("");
    write_title_graphics(&mut w, &banner_title(song));
    w
}
