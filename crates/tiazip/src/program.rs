//! Macro program emission.
//!
//! Rewrites a coded stream plus its copy plan as a program of literal
//! runs, macro definitions (`LABEL` body `POP`) and macro calls (`REF`),
//! then lowers the program codes to assembly text and raw bytes. A small
//! dictionary gives the most frequent two-byte codes one-byte short forms.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::asm::AsmWriter;
use crate::delta::{
    code_ctrl, code_freq, code_sustain, code_tag, code_vol, is_skip, with_sustain, skip_code,
    MAX_EMBEDDED_SUSTAIN, MAX_SKIP_FRAMES, STOP_CODE, TAG_CTRL, TAG_FREQ, TAG_FULL, TAG_LABEL,
    TAG_PAUSE, TAG_REF, TAG_VOL,
};
use crate::index::AlphaCode;
use crate::repeats::Span;

/// Macro definition marker for a committed span.
pub fn label_code(span: &Span) -> AlphaCode {
    (TAG_LABEL << 32)
        | ((span.subsong as u64) << 24)
        | ((span.channel as u64) << 16)
        | span.start as u64
}

/// Macro call to the copy starting at `span.start`.
pub fn ref_code(span: &Span) -> AlphaCode {
    (TAG_REF << 32)
        | ((span.subsong as u64) << 24)
        | ((span.channel as u64) << 16)
        | span.start as u64
}

/// Decompose a label or ref code into `(subsong, channel, start)`.
pub fn span_code_parts(code: AlphaCode) -> (u16, usize, usize) {
    (
        ((code >> 24) & 0xFF) as u16,
        ((code >> 16) & 0xFF) as usize,
        (code & 0xFFFF) as usize,
    )
}

/// Rewrite `codes[bounds]` according to the copy plan.
///
/// Maximal literal runs become delta subsequences; a plan position opening
/// a macro emits `LABEL`, the inner subsequence and `POP`; a position
/// calling one emits `REF`.
pub fn encode_copy_sequence(codes: &[AlphaCode], bounds: &Span, plan: &[Span]) -> Vec<AlphaCode> {
    let mut encoded = Vec::new();
    let mut i = bounds.start;
    let end = bounds.start + bounds.length;

    while i < end {
        let span = plan[i];
        if span.start == i && span.length == 1 {
            let mut j = i + 1;
            while j < end && plan[j].start == j && plan[j].length == 1 {
                j += 1;
            }
            encode_delta_sequence(
                codes,
                &Span::new(bounds.subsong, bounds.channel, i, j - i),
                &mut encoded,
            );
            i = j;
            continue;
        }

        if span.start == i {
            encoded.push(label_code(&span));
            encode_delta_sequence(codes, &span, &mut encoded);
            encoded.push(STOP_CODE);
        } else {
            encoded.push(ref_code(&span));
        }
        i += span.length;
    }

    encoded
}

/// Append the literal codes of `bounds`, folding trailing skip codes into
/// the sustain field of the register code they follow. Embedded sustain is
/// capped so its byte form stays one sustain byte; the spill stays as
/// standalone skips.
pub fn encode_delta_sequence(codes: &[AlphaCode], bounds: &Span, out: &mut Vec<AlphaCode>) {
    let mut i = bounds.start;
    let end = bounds.start + bounds.length;

    while i < end {
        let cx = codes[i];
        i += 1;
        let mut skip: u32 = 0;
        while i < end && is_skip(codes[i]) {
            skip += code_sustain(codes[i]);
            i += 1;
        }
        if skip == 0 {
            out.push(cx);
            continue;
        }
        match code_tag(cx) {
            TAG_VOL | TAG_FREQ | TAG_CTRL | TAG_FULL => {
                let total = code_sustain(cx) + skip;
                let embedded = total.min(MAX_EMBEDDED_SUSTAIN);
                out.push(with_sustain(cx, embedded));
                push_skips(out, total - embedded);
            }
            0 if cx != STOP_CODE => {
                push_skips(out, code_sustain(cx) + skip);
            }
            _ => {
                // pauses and terminators keep their own identity
                out.push(cx);
                push_skips(out, skip);
            }
        }
    }
}

fn push_skips(out: &mut Vec<AlphaCode>, mut frames: u32) {
    while frames > 0 {
        let d = frames.min(MAX_SKIP_FRAMES);
        out.push(skip_code(d));
        frames -= d;
    }
}

/// Re-linearize an encoded plan back into the source code stream. The
/// inverse of [`encode_copy_sequence`] at the plan level, used to check
/// that compression is lossless.
pub fn expand_copy_sequence(codes: &[AlphaCode], bounds: &Span, plan: &[Span]) -> Vec<AlphaCode> {
    let mut expanded = Vec::new();
    let mut i = bounds.start;
    let end = bounds.start + bounds.length;
    while i < end {
        let span = plan[i];
        if span.start == i {
            expanded.extend_from_slice(&codes[i..i + span.length]);
        } else {
            expanded.extend_from_slice(&codes[span.start..span.start + span.length]);
        }
        i += span.length;
    }
    expanded
}

/// One-byte short forms for the most frequent two-byte codes.
///
/// Only full register writes and macro calls are eligible; everything else
/// is already a single byte.
#[derive(Debug, Clone, Default)]
pub struct CodeDictionary {
    ranks: BTreeMap<AlphaCode, usize>,
}

impl CodeDictionary {
    pub fn empty() -> Self {
        CodeDictionary::default()
    }

    /// Keep the `capacity` most frequent eligible codes, most frequent
    /// first, ascending code value as tie-break.
    pub fn build(freq: &BTreeMap<AlphaCode, usize>, capacity: usize) -> Self {
        let mut eligible: Vec<(AlphaCode, usize)> = freq
            .iter()
            .filter(|(&code, _)| {
                let tag = code_tag(code);
                tag == TAG_FULL || tag == TAG_REF
            })
            .map(|(&code, &count)| (code, count))
            .collect();
        eligible.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        eligible.truncate(capacity);

        let mut ranks = BTreeMap::new();
        for (rank, (code, _)) in eligible.into_iter().enumerate() {
            ranks.insert(code, rank);
        }
        CodeDictionary { ranks }
    }

    pub fn rank_of(&self, code: AlphaCode) -> Option<usize> {
        self.ranks.get(&code).copied()
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }
}

/// Lower one program code to assembly text and raw bytes. Returns the
/// number of bytes the code occupies in the binary stream.
pub fn write_code(
    w: &mut AsmWriter,
    bin: &mut Vec<u8>,
    code: AlphaCode,
    dictionary: &CodeDictionary,
) -> usize {
    match code_tag(code) {
        TAG_REF => {
            let (subsong, channel, start) = span_code_parts(code);
            w.comment(&format!("SPAN_REF({}, {}, {})", subsong, channel, start));
            if let Some(rank) = dictionary.rank_of(code) {
                w.byte_row(&[rank as u8]);
                bin.push(rank as u8);
                1
            } else {
                w.line(&format!(
                    "    word SPAN_START_{}_{}_{}",
                    subsong, channel, start
                ));
                let target = 0xF000u16 | (start as u16 & 0x0FFF);
                bin.extend_from_slice(&target.to_le_bytes());
                2
            }
        }
        TAG_LABEL => {
            let (subsong, channel, start) = span_code_parts(code);
            w.comment(&format!("SPAN_START({}, {}, {})", subsong, channel, start));
            w.label(&format!("SPAN_START_{}_{}_{}", subsong, channel, start));
            0
        }
        TAG_FULL => {
            let cx = code_ctrl(code);
            let fx = code_freq(code);
            let vx = code_vol(code);
            let sx = code_sustain(code);
            w.comment(&format!("C{} F{} V{} S{}", cx, fx, vx, sx));
            if let Some(rank) = dictionary.rank_of(code) {
                w.byte_row(&[rank as u8]);
                bin.push(rank as u8);
                1
            } else {
                w.byte_row(&[0xA0 + fx, (cx << 4) | vx]);
                bin.push(0xA0 + fx);
                bin.push((cx << 4) | vx);
                if sx > 1 {
                    let sustain = 0x80 + (sx as u8 - 1);
                    w.byte_row(&[sustain]);
                    bin.push(sustain);
                    3
                } else {
                    2
                }
            }
        }
        TAG_CTRL => {
            let cx = code_ctrl(code);
            let sx = code_sustain(code);
            w.comment(&format!("C{} S{}", cx, sx));
            w.byte_row(&[0x90 + cx]);
            bin.push(0x90 + cx);
            write_sustain(w, bin, sx) + 1
        }
        TAG_FREQ => {
            let fx = code_freq(code);
            let sx = code_sustain(code);
            w.comment(&format!("F{} S{}", fx, sx));
            w.byte_row(&[0xC0 + fx]);
            bin.push(0xC0 + fx);
            write_sustain(w, bin, sx) + 1
        }
        TAG_VOL => {
            let vx = code_vol(code);
            let sx = code_sustain(code);
            w.comment(&format!("V{} S{}", vx, sx));
            w.byte_row(&[0xE0 + vx]);
            bin.push(0xE0 + vx);
            write_sustain(w, bin, sx) + 1
        }
        TAG_PAUSE => {
            let d = code_sustain(code);
            w.comment(&format!("PAUSE {}", d));
            let byte = (d as u8) << 3;
            w.byte_row(&[byte]);
            bin.push(byte);
            1
        }
        _ if code == STOP_CODE => {
            w.comment("POP");
            w.byte_row(&[0]);
            bin.push(0);
            1
        }
        _ => {
            let d = code_sustain(code);
            w.comment(&format!("SKIP {}", d));
            w.byte_row(&[0x80 + d as u8]);
            bin.push(0x80 + d as u8);
            1
        }
    }
}

fn write_sustain(w: &mut AsmWriter, bin: &mut Vec<u8>, sustain: u32) -> usize {
    if sustain > 1 {
        let byte = 0x80 + (sustain as u8 - 1);
        w.byte_row(&[byte]);
        bin.push(byte);
        1
    } else {
        0
    }
}

/// Write a whole code stream. Returns the binary size.
pub fn write_codes(
    w: &mut AsmWriter,
    bin: &mut Vec<u8>,
    codes: &[AlphaCode],
    dictionary: &CodeDictionary,
) -> usize {
    let mut bytes = 0usize;
    for &code in codes {
        bytes += write_code(w, bin, code, dictionary);
    }
    bytes
}

/// Human-readable form of a code, used in listings and diagnostics.
pub fn describe_code(code: AlphaCode) -> String {
    match code_tag(code) {
        TAG_REF => {
            let (ss, ch, start) = span_code_parts(code);
            format!("REF({},{},{})", ss, ch, start)
        }
        TAG_LABEL => {
            let (ss, ch, start) = span_code_parts(code);
            format!("LABEL({},{},{})", ss, ch, start)
        }
        TAG_FULL => {
            let mut s = String::new();
            let _ = write!(
                s,
                "FULL(c{},f{},v{},s{})",
                code_ctrl(code),
                code_freq(code),
                code_vol(code),
                code_sustain(code)
            );
            s
        }
        TAG_CTRL => format!("CTRL(c{},s{})", code_ctrl(code), code_sustain(code)),
        TAG_FREQ => format!("FREQ(f{},s{})", code_freq(code), code_sustain(code)),
        TAG_VOL => format!("VOL(v{},s{})", code_vol(code), code_sustain(code)),
        TAG_PAUSE => format!("PAUSE({})", code_sustain(code)),
        _ if code == STOP_CODE => "POP".to_string(),
        _ => format!("SKIP({})", code_sustain(code)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{freq_code, full_code};

    #[test]
    fn test_delta_sequence_folds_skips() {
        let codes = vec![full_code(1, 2, 3, 2), skip_code(5), skip_code(3)];
        let mut out = Vec::new();
        encode_delta_sequence(&codes, &Span::new(0, 0, 0, 3), &mut out);
        assert_eq!(out, vec![full_code(1, 2, 3, 10)]);
    }

    #[test]
    fn test_delta_sequence_caps_embedded_sustain() {
        let codes = vec![freq_code(4, 2), skip_code(31), skip_code(31)];
        let mut out = Vec::new();
        encode_delta_sequence(&codes, &Span::new(0, 0, 0, 3), &mut out);
        assert_eq!(out[0], freq_code(4, MAX_EMBEDDED_SUSTAIN));
        let spilled: u32 = out[1..].iter().map(|&c| code_sustain(c)).sum();
        assert_eq!(spilled, 2 + 31 + 31 - MAX_EMBEDDED_SUSTAIN);
    }

    #[test]
    fn test_dictionary_keeps_most_frequent() {
        let mut freq = BTreeMap::new();
        freq.insert(full_code(1, 1, 1, 1), 10usize);
        freq.insert(full_code(2, 2, 2, 1), 3);
        freq.insert(freq_code(5, 1), 100); // ineligible single-byte code
        let dict = CodeDictionary::build(&freq, 1);
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.rank_of(full_code(1, 1, 1, 1)), Some(0));
        assert_eq!(dict.rank_of(full_code(2, 2, 2, 1)), None);
        assert_eq!(dict.rank_of(freq_code(5, 1)), None);
    }

    #[test]
    fn test_write_code_full_bytes() {
        let mut w = AsmWriter::new();
        let mut bin = Vec::new();
        let n = write_code(&mut w, &mut bin, full_code(4, 7, 15, 1), &CodeDictionary::empty());
        assert_eq!(n, 2);
        assert_eq!(bin, vec![0xA7, 0x4F]);
    }

    #[test]
    fn test_write_code_ref_absolute() {
        let mut w = AsmWriter::new();
        let mut bin = Vec::new();
        let span = Span::new(0, 1, 0x123, 5);
        let n = write_code(&mut w, &mut bin, ref_code(&span), &CodeDictionary::empty());
        assert_eq!(n, 2);
        assert_eq!(bin, vec![0x23, 0xF1]);
        assert!(w.as_str().contains("SPAN_START_0_1_291"));
    }
}
