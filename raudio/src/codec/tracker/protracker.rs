//! Protracker MOD loading
//!
//! Only 31-sample modules with a format tag at offset 1080 are recognised.

use super::module::{read_name, Cell, Instrument, LoopKind, Module, Pattern, TrackerSample};
use crate::error::{Error, Result};
use tracing::debug;

const SAMPLE_COUNT: usize = 31;
const SAMPLE_HEADER_SIZE: usize = 30;
const ORDER_OFFSET: usize = 952;
const TAG_OFFSET: usize = 1080;
const PATTERN_OFFSET: usize = 1084;
const ROWS_PER_PATTERN: usize = 64;

/// Protracker periods for C-1 .. B-3, finetune 0
const PERIOD_TABLE: [u16; 36] = [
    856, 808, 762, 720, 678, 640, 604, 570, 538, 508, 480, 453, // octave 1
    428, 404, 381, 360, 339, 320, 302, 285, 269, 254, 240, 226, // octave 2
    214, 202, 190, 180, 170, 160, 151, 143, 135, 127, 120, 113, // octave 3
];

/// XM note number of the first table entry
const FIRST_NOTE: u8 = 37;

/// Channel count from the format tag, `None` when unrecognised
fn channels_for_tag(tag: &[u8]) -> Option<usize> {
    match tag {
        b"M.K." | b"M!K!" | b"FLT4" | b"4CHN" => Some(4),
        b"6CHN" => Some(6),
        b"8CHN" | b"FLT8" | b"CD81" | b"OKTA" => Some(8),
        [a, b, b'C', b'H'] | [a, b, b'C', b'N'] if a.is_ascii_digit() && b.is_ascii_digit() => {
            Some(((a - b'0') * 10 + (b - b'0')) as usize)
        }
        [a, b'C', b'H', b'N'] if a.is_ascii_digit() => Some((a - b'0') as usize),
        _ => None,
    }
}

/// Map an Amiga period to the nearest note (0 = no note)
pub fn period_to_note(period: u16) -> u8 {
    if period == 0 {
        return 0;
    }
    let index = PERIOD_TABLE
        .iter()
        .enumerate()
        .min_by_key(|&(_, &p)| (p as i32 - period as i32).abs())
        .map(|(i, _)| i)
        .unwrap_or(0);
    FIRST_NOTE + index as u8
}

fn read_u16_be(bytes: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([bytes[offset], bytes[offset + 1]])
}

/// Parse a MOD file
pub fn parse_mod(bytes: &[u8]) -> Result<Module> {
    if bytes.len() < PATTERN_OFFSET {
        return Err(Error::Decode("MOD file too small".to_string()));
    }
    let channels = channels_for_tag(&bytes[TAG_OFFSET..PATTERN_OFFSET])
        .filter(|&c| c > 0 && c <= 32)
        .ok_or_else(|| Error::UnsupportedFormat("unrecognised MOD format tag".to_string()))?;

    let name = read_name(&bytes[0..20]);

    let song_length = (bytes[950] as usize).clamp(1, 128);
    let restart = bytes[951] as usize;
    let orders: Vec<u8> = bytes[ORDER_OFFSET..ORDER_OFFSET + song_length].to_vec();
    let pattern_count = bytes[ORDER_OFFSET..ORDER_OFFSET + 128]
        .iter()
        .copied()
        .max()
        .unwrap_or(0) as usize
        + 1;

    let pattern_size = ROWS_PER_PATTERN * channels * 4;
    let mut patterns = Vec::with_capacity(pattern_count);
    for p in 0..pattern_count {
        let start = PATTERN_OFFSET + p * pattern_size;
        let Some(data) = bytes.get(start..start + pattern_size) else {
            return Err(Error::Decode(format!("MOD pattern {} is truncated", p)));
        };
        let cells = data
            .chunks_exact(4)
            .map(|c| Cell {
                note: period_to_note((((c[0] & 0x0f) as u16) << 8) | c[1] as u16),
                instrument: (c[0] & 0xf0) | (c[2] >> 4),
                volume: 0,
                effect: c[2] & 0x0f,
                param: c[3],
            })
            .collect();
        patterns.push(Pattern {
            rows: ROWS_PER_PATTERN,
            cells,
        });
    }

    let mut data_offset = PATTERN_OFFSET + pattern_count * pattern_size;
    let mut instruments = Vec::with_capacity(SAMPLE_COUNT);
    for i in 0..SAMPLE_COUNT {
        let header = 20 + i * SAMPLE_HEADER_SIZE;
        let length = read_u16_be(bytes, header + 22) as usize * 2;
        let finetune_nibble = (bytes[header + 24] & 0x0f) as i8;
        let finetune = if finetune_nibble > 7 {
            finetune_nibble - 16
        } else {
            finetune_nibble
        };
        let volume = bytes[header + 25].min(64);
        let loop_start = read_u16_be(bytes, header + 26) as usize * 2;
        let loop_len = read_u16_be(bytes, header + 28) as usize * 2;

        let end = (data_offset + length).min(bytes.len());
        let data: Vec<f32> = bytes
            .get(data_offset..end)
            .unwrap_or(&[])
            .iter()
            .map(|&b| b as i8 as f32 / 128.0)
            .collect();
        data_offset += length;

        let has_loop = loop_len > 2 && loop_start + loop_len <= data.len();
        instruments.push(Instrument::single(TrackerSample {
            data,
            loop_start: if has_loop { loop_start } else { 0 },
            loop_len: if has_loop { loop_len } else { 0 },
            loop_kind: if has_loop {
                LoopKind::Forward
            } else {
                LoopKind::None
            },
            volume,
            finetune: finetune * 16,
            relative_note: 0,
            panning: None,
        }));
    }

    // Amiga channel layout: L R R L
    let channel_panning = (0..channels)
        .map(|c| if c % 4 == 0 || c % 4 == 3 { 64 } else { 192 })
        .collect();

    debug!(
        "Parsed MOD \"{}\": {} channels, {} orders, {} patterns",
        name,
        channels,
        orders.len(),
        pattern_count
    );

    Ok(Module {
        name,
        channels,
        restart: if restart < orders.len() { restart } else { 0 },
        orders,
        patterns,
        instruments,
        initial_speed: 6,
        initial_bpm: 125,
        linear: false,
        channel_panning,
    })
}
