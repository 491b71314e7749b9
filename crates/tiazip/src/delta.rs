//! Delta encoding of state sequences into abstract stream codes.
//!
//! Every interval of a [`ChannelStateSequence`] becomes one register
//! update code (full or single-register, with up to two frames of embedded
//! sustain) followed by skip codes for the remaining frames. Silent
//! intervals become pause codes. The abstract codes are 64-bit values
//! tagged in the high word; their byte-level shapes live in
//! [`crate::program`].

use log::debug;

use crate::error::ExportError;
use crate::index::AlphaCode;
use crate::state::{ChannelLayout, ChannelState, ChannelStateInterval, ChannelStateSequence};

/// Code tags (bits 32 and up).
pub const TAG_VOL: u64 = 1;
pub const TAG_FREQ: u64 = 2;
pub const TAG_PAUSE: u64 = 3;
pub const TAG_CTRL: u64 = 4;
pub const TAG_FULL: u64 = 7;
pub const TAG_LABEL: u64 = 8;
pub const TAG_REF: u64 = 9;

/// Stream terminator and macro return.
pub const STOP_CODE: AlphaCode = 0;

/// Largest frame count a single skip or pause code can carry.
pub const MAX_SKIP_FRAMES: u32 = 31;

/// Largest sustain a register code can embed (one byte `0x80 + (s - 1)`).
pub const MAX_EMBEDDED_SUSTAIN: u32 = 32;

pub fn full_code(ctrl: u8, freq: u8, vol: u8, sustain: u32) -> AlphaCode {
    (TAG_FULL << 32)
        | ((ctrl as u64) << 24)
        | ((freq as u64) << 16)
        | ((vol as u64) << 8)
        | sustain as u64
}

pub fn ctrl_code(ctrl: u8, sustain: u32) -> AlphaCode {
    (TAG_CTRL << 32) | ((ctrl as u64) << 24) | sustain as u64
}

pub fn freq_code(freq: u8, sustain: u32) -> AlphaCode {
    (TAG_FREQ << 32) | ((freq as u64) << 16) | sustain as u64
}

pub fn vol_code(vol: u8, sustain: u32) -> AlphaCode {
    (TAG_VOL << 32) | ((vol as u64) << 8) | sustain as u64
}

pub fn pause_code(frames: u32) -> AlphaCode {
    (TAG_PAUSE << 32) | frames as u64
}

pub fn skip_code(frames: u32) -> AlphaCode {
    frames as u64
}

/// The tag of a code (0 for skips and the terminator).
pub fn code_tag(code: AlphaCode) -> u64 {
    code >> 32
}

pub fn code_ctrl(code: AlphaCode) -> u8 {
    (code >> 24) as u8
}

pub fn code_freq(code: AlphaCode) -> u8 {
    (code >> 16) as u8
}

pub fn code_vol(code: AlphaCode) -> u8 {
    (code >> 8) as u8
}

/// Embedded sustain of a register code, or the frame count of a skip or
/// pause code.
pub fn code_sustain(code: AlphaCode) -> u32 {
    (code & 0xFF) as u32
}

/// Whether a code is a bare skip (not the terminator).
pub fn is_skip(code: AlphaCode) -> bool {
    code_tag(code) == 0 && code != STOP_CODE
}

/// Rewrite the sustain field of a register code.
pub fn with_sustain(code: AlphaCode, sustain: u32) -> AlphaCode {
    (code & !0xFFu64) | sustain as u64
}

/// Encode a folded sequence into abstract stream codes, terminated by
/// [`STOP_CODE`].
///
/// Selection per interval against the running previous state:
/// 1. an all-silent state pauses for the whole frame count;
/// 2. exactly one changed slot uses the matching single-register code;
/// 3. anything else (several changes, or the first interval) writes all
///    registers.
/// Register codes embed at most two frames; the rest spills into skip
/// codes of up to [`MAX_SKIP_FRAMES`] frames each.
pub fn encode_sequence(
    seq: &ChannelStateSequence,
    layout: &ChannelLayout,
) -> Result<Vec<AlphaCode>, ExportError> {
    if layout.arity > 3 {
        return Err(ExportError::Other(format!(
            "delta encoding covers control, frequency and volume slots; arity {} is not encodable",
            layout.arity
        )));
    }
    let mut codes: Vec<AlphaCode> = Vec::new();
    let mut last = seq.initial_state;

    for n in &seq.intervals {
        if n.duration == 0 {
            debug!("zero duration interval in delta encoder, treating as one frame");
        }
        let mut framecount = n.duration.max(1);

        let silent = layout
            .volume_slot
            .map(|slot| n.state.registers[slot] == 0)
            .unwrap_or(false)
            && n.state.is_silent();
        if silent {
            while framecount > 0 {
                let d = framecount.min(MAX_SKIP_FRAMES);
                codes.push(pause_code(d));
                framecount -= d;
            }
            last = n.state;
            continue;
        }

        let ctrl = n.state.registers[0];
        let freq = n.state.registers[1];
        let vol = n.state.registers[2];
        let cc = ctrl != last.registers[0];
        let fc = freq != last.registers[1];
        let vc = vol != last.registers[2];

        let sustain = framecount.min(2);
        framecount -= sustain;

        let changed = cc as u32 + fc as u32 + vc as u32;
        if changed == 1 {
            if fc {
                codes.push(freq_code(freq, sustain));
            } else if cc {
                codes.push(ctrl_code(ctrl, sustain));
            } else {
                codes.push(vol_code(vol, sustain));
            }
        } else {
            codes.push(full_code(ctrl, freq, vol, sustain));
        }

        while framecount > 0 {
            let d = framecount.min(MAX_SKIP_FRAMES);
            codes.push(skip_code(d));
            framecount -= d;
        }
        last = n.state;
    }

    codes.push(STOP_CODE);
    Ok(codes)
}

/// Decode an abstract code stream back into a state sequence.
///
/// The inverse of [`encode_sequence`] for streams it produced: skip codes
/// extend the interval they follow, consecutive pauses merge into one
/// silent interval, register codes open new intervals.
pub fn decode_codes(codes: &[AlphaCode], initial_state: ChannelState) -> ChannelStateSequence {
    let mut seq = ChannelStateSequence::with_initial_state(initial_state);
    let mut state = initial_state;

    for &code in codes {
        if code == STOP_CODE {
            break;
        }
        match code_tag(code) {
            0 => {
                // bare skip extends whatever is playing
                let d = code_sustain(code);
                match seq.intervals.last_mut() {
                    Some(last) => last.duration += d,
                    None => seq
                        .intervals
                        .push(ChannelStateInterval::new(ChannelState::filled(0), d)),
                }
            }
            TAG_PAUSE => {
                let d = code_sustain(code);
                state = ChannelState::filled(0);
                match seq.intervals.last_mut() {
                    Some(last) if last.state.is_silent() => last.duration += d,
                    _ => seq.intervals.push(ChannelStateInterval::new(state, d)),
                }
            }
            tag => {
                match tag {
                    TAG_FULL => {
                        state.registers[0] = code_ctrl(code);
                        state.registers[1] = code_freq(code);
                        state.registers[2] = code_vol(code);
                    }
                    TAG_CTRL => state.registers[0] = code_ctrl(code),
                    TAG_FREQ => state.registers[1] = code_freq(code),
                    TAG_VOL => state.registers[2] = code_vol(code),
                    _ => continue,
                }
                seq.intervals
                    .push(ChannelStateInterval::new(state, code_sustain(code)));
            }
        }
    }
    seq
}
