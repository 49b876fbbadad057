//! FastTracker 2 XM loading

use super::module::{
    read_name, Cell, Envelope, Instrument, LoopKind, Module, Pattern, TrackerSample, NOTE_OFF,
};
use crate::error::{Error, Result};
use std::io::{Cursor, Read, Seek, SeekFrom};
use tracing::debug;

const XM_MAGIC: &[u8; 17] = b"Extended Module: ";
const XM_VERSION: u16 = 0x0104;
const MAX_CHANNELS: usize = 32;
const MAX_PATTERN_ROWS: usize = 256;
const ENVELOPE_POINTS: usize = 12;

type XmCursor<'a> = Cursor<&'a [u8]>;

fn truncated() -> Error {
    Error::Decode("unexpected end of XM data".to_string())
}

fn read_u8(cursor: &mut XmCursor) -> Result<u8> {
    let mut buf = [0u8; 1];
    cursor.read_exact(&mut buf).map_err(|_| truncated())?;
    Ok(buf[0])
}

fn read_u16(cursor: &mut XmCursor) -> Result<u16> {
    let mut buf = [0u8; 2];
    cursor.read_exact(&mut buf).map_err(|_| truncated())?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32(cursor: &mut XmCursor) -> Result<u32> {
    let mut buf = [0u8; 4];
    cursor.read_exact(&mut buf).map_err(|_| truncated())?;
    Ok(u32::from_le_bytes(buf))
}

fn seek_to(cursor: &mut XmCursor, position: u64) -> Result<()> {
    if position > cursor.get_ref().len() as u64 {
        return Err(truncated());
    }
    cursor.seek(SeekFrom::Start(position))?;
    Ok(())
}

fn skip(cursor: &mut XmCursor, bytes: u64) -> Result<()> {
    let position = cursor.position() + bytes;
    seek_to(cursor, position)
}

/// Parse an XM file
pub fn parse_xm(data: &[u8]) -> Result<Module> {
    if data.len() < 80 || &data[0..17] != XM_MAGIC {
        return Err(Error::Decode("not an XM file".to_string()));
    }
    let name = read_name(&data[17..37]);

    let mut cursor = Cursor::new(data);
    seek_to(&mut cursor, 58)?;
    let version = read_u16(&mut cursor)?;
    if version != XM_VERSION {
        return Err(Error::UnsupportedFormat(format!(
            "XM version {:#06x} is not supported",
            version
        )));
    }

    // Header size is counted from its own offset (60).
    let header_start = cursor.position();
    let header_size = read_u32(&mut cursor)? as u64;
    let song_length = read_u16(&mut cursor)? as usize;
    let restart = read_u16(&mut cursor)? as usize;
    let channels = read_u16(&mut cursor)? as usize;
    let num_patterns = read_u16(&mut cursor)? as usize;
    let num_instruments = read_u16(&mut cursor)? as usize;
    let flags = read_u16(&mut cursor)?;
    let initial_speed = read_u16(&mut cursor)? as u32;
    let initial_bpm = read_u16(&mut cursor)? as u32;

    if channels == 0 || channels > MAX_CHANNELS {
        return Err(Error::Decode(format!("invalid XM channel count {}", channels)));
    }
    let mut order_table = [0u8; 256];
    cursor.read_exact(&mut order_table).map_err(|_| truncated())?;
    let orders = order_table[..song_length.clamp(1, 256)].to_vec();

    seek_to(&mut cursor, header_start + header_size)?;

    let mut patterns = Vec::with_capacity(num_patterns);
    for _ in 0..num_patterns {
        patterns.push(parse_pattern(&mut cursor, channels)?);
    }

    let mut instruments = Vec::with_capacity(num_instruments);
    for _ in 0..num_instruments {
        instruments.push(parse_instrument(&mut cursor)?);
    }

    debug!(
        "Parsed XM \"{}\": {} channels, {} orders, {} patterns, {} instruments",
        name,
        channels,
        orders.len(),
        patterns.len(),
        instruments.len()
    );

    Ok(Module {
        name,
        channels,
        restart: if restart < orders.len() { restart } else { 0 },
        orders,
        patterns,
        instruments,
        initial_speed: if initial_speed == 0 { 6 } else { initial_speed },
        initial_bpm: if initial_bpm == 0 { 125 } else { initial_bpm },
        linear: flags & 1 != 0,
        channel_panning: vec![128; channels],
    })
}

fn parse_pattern(cursor: &mut XmCursor, channels: usize) -> Result<Pattern> {
    // Header length includes its own 4 bytes.
    let header_start = cursor.position();
    let header_length = read_u32(cursor)? as u64;
    let _packing = read_u8(cursor)?;
    let rows = (read_u16(cursor)? as usize).clamp(1, MAX_PATTERN_ROWS);
    let packed_size = read_u16(cursor)? as u64;
    seek_to(cursor, header_start + header_length)?;

    if packed_size == 0 {
        return Ok(Pattern::empty(rows, channels));
    }

    let data_start = cursor.position();
    let mut cells = Vec::with_capacity(rows * channels);
    for _ in 0..rows * channels {
        cells.push(unpack_cell(cursor)?);
    }
    seek_to(cursor, data_start + packed_size)?;
    Ok(Pattern { rows, cells })
}

fn unpack_cell(cursor: &mut XmCursor) -> Result<Cell> {
    let first = read_u8(cursor)?;
    let mut cell = Cell::default();
    if first & 0x80 != 0 {
        if first & 0x01 != 0 {
            cell.note = read_u8(cursor)?;
        }
        if first & 0x02 != 0 {
            cell.instrument = read_u8(cursor)?;
        }
        if first & 0x04 != 0 {
            cell.volume = read_u8(cursor)?;
        }
        if first & 0x08 != 0 {
            cell.effect = read_u8(cursor)?;
        }
        if first & 0x10 != 0 {
            cell.param = read_u8(cursor)?;
        }
    } else {
        cell.note = first;
        cell.instrument = read_u8(cursor)?;
        cell.volume = read_u8(cursor)?;
        cell.effect = read_u8(cursor)?;
        cell.param = read_u8(cursor)?;
    }
    if cell.note > NOTE_OFF {
        cell.note = 0;
    }
    Ok(cell)
}

struct SampleHeader {
    length: usize,
    loop_start: usize,
    loop_len: usize,
    volume: u8,
    finetune: i8,
    kind: u8,
    panning: u8,
    relative_note: i8,
}

fn parse_instrument(cursor: &mut XmCursor) -> Result<Instrument> {
    let start = cursor.position();
    let header_size = (read_u32(cursor)? as u64).max(4);
    skip(cursor, 22)?;
    let _kind = read_u8(cursor)?;
    let num_samples = read_u16(cursor)? as usize;

    let mut instrument = Instrument {
        sample_map: [0; 96],
        samples: Vec::new(),
        volume_envelope: None,
        fadeout: 0,
    };
    if num_samples == 0 {
        seek_to(cursor, start + header_size)?;
        return Ok(instrument);
    }

    let sample_header_size = read_u32(cursor)? as u64;
    cursor
        .read_exact(&mut instrument.sample_map)
        .map_err(|_| truncated())?;

    let mut volume_points = Vec::with_capacity(ENVELOPE_POINTS);
    for _ in 0..ENVELOPE_POINTS {
        let x = read_u16(cursor)?;
        let y = read_u16(cursor)?;
        volume_points.push((x, y.min(64)));
    }
    skip(cursor, (ENVELOPE_POINTS * 4) as u64)?;
    let num_volume_points = read_u8(cursor)? as usize;
    let _num_pan_points = read_u8(cursor)?;
    let volume_sustain = read_u8(cursor)? as usize;
    let volume_loop_start = read_u8(cursor)? as usize;
    let volume_loop_end = read_u8(cursor)? as usize;
    skip(cursor, 3)?;
    let volume_type = read_u8(cursor)?;
    let _pan_type = read_u8(cursor)?;
    skip(cursor, 4)?;
    instrument.fadeout = read_u16(cursor)?;

    if volume_type & 1 != 0 && num_volume_points > 0 {
        volume_points.truncate(num_volume_points.min(ENVELOPE_POINTS));
        let count = volume_points.len();
        instrument.volume_envelope = Some(Envelope {
            points: volume_points,
            sustain: (volume_type & 2 != 0 && volume_sustain < count).then_some(volume_sustain),
            loop_range: (volume_type & 4 != 0
                && volume_loop_start <= volume_loop_end
                && volume_loop_end < count)
                .then_some((volume_loop_start, volume_loop_end)),
        });
    }

    seek_to(cursor, start + header_size)?;

    let mut headers = Vec::with_capacity(num_samples);
    for _ in 0..num_samples {
        let header_start = cursor.position();
        headers.push(SampleHeader {
            length: read_u32(cursor)? as usize,
            loop_start: read_u32(cursor)? as usize,
            loop_len: read_u32(cursor)? as usize,
            volume: read_u8(cursor)?.min(64),
            finetune: read_u8(cursor)? as i8,
            kind: read_u8(cursor)?,
            panning: read_u8(cursor)?,
            relative_note: read_u8(cursor)? as i8,
        });
        seek_to(cursor, header_start + sample_header_size.max(40))?;
    }

    for header in headers {
        instrument.samples.push(read_sample_data(cursor, &header)?);
    }
    Ok(instrument)
}

/// Read delta-coded 8 or 16 bit sample data following the headers
fn read_sample_data(cursor: &mut XmCursor, header: &SampleHeader) -> Result<TrackerSample> {
    let sixteen_bit = header.kind & 0x10 != 0;
    let start = cursor.position() as usize;
    let bytes: &[u8] = *cursor.get_ref();
    let end = (start + header.length).min(bytes.len());
    let raw = &bytes[start.min(end)..end];

    let data: Vec<f32> = if sixteen_bit {
        let mut acc = 0i16;
        raw.chunks_exact(2)
            .map(|pair| {
                acc = acc.wrapping_add(i16::from_le_bytes([pair[0], pair[1]]));
                acc as f32 / 32768.0
            })
            .collect()
    } else {
        let mut acc = 0i8;
        raw.iter()
            .map(|&b| {
                acc = acc.wrapping_add(b as i8);
                acc as f32 / 128.0
            })
            .collect()
    };
    cursor.seek(SeekFrom::Start(end as u64))?;

    let scale = if sixteen_bit { 2 } else { 1 };
    let loop_start = header.loop_start / scale;
    let loop_len = header.loop_len / scale;
    let loop_kind = match header.kind & 0x03 {
        1 => LoopKind::Forward,
        2 => LoopKind::PingPong,
        _ => LoopKind::None,
    };
    let valid_loop = loop_kind != LoopKind::None && loop_len > 0 && loop_start + loop_len <= data.len();

    Ok(TrackerSample {
        data,
        loop_start: if valid_loop { loop_start } else { 0 },
        loop_len: if valid_loop { loop_len } else { 0 },
        loop_kind: if valid_loop { loop_kind } else { LoopKind::None },
        volume: header.volume,
        finetune: header.finetune,
        relative_note: header.relative_note,
        panning: Some(header.panning),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal XM: 2 channels, one 4 row pattern with a note on row 0 and
    /// one instrument with an 8-bit looping sample
    pub(crate) fn tiny_xm() -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(XM_MAGIC);
        let mut name = [0u8; 20];
        name[..4].copy_from_slice(b"tiny");
        b.extend_from_slice(&name);
        b.push(0x1a);
        b.extend_from_slice(&[0u8; 20]);
        b.extend_from_slice(&XM_VERSION.to_le_bytes());
        b.extend_from_slice(&276u32.to_le_bytes());
        b.extend_from_slice(&1u16.to_le_bytes()); // song length
        b.extend_from_slice(&0u16.to_le_bytes()); // restart
        b.extend_from_slice(&2u16.to_le_bytes()); // channels
        b.extend_from_slice(&1u16.to_le_bytes()); // patterns
        b.extend_from_slice(&1u16.to_le_bytes()); // instruments
        b.extend_from_slice(&1u16.to_le_bytes()); // linear
        b.extend_from_slice(&3u16.to_le_bytes()); // speed
        b.extend_from_slice(&150u16.to_le_bytes()); // bpm
        b.extend_from_slice(&[0u8; 256]);

        // Pattern: 4 rows x 2 channels, row 0 ch 0 = C-4 inst 1, rest empty
        let mut packed = vec![0x80 | 0x03, 49, 1];
        packed.extend(std::iter::repeat(0x80u8).take(7));
        b.extend_from_slice(&9u32.to_le_bytes());
        b.push(0);
        b.extend_from_slice(&4u16.to_le_bytes());
        b.extend_from_slice(&(packed.len() as u16).to_le_bytes());
        b.extend_from_slice(&packed);

        // Instrument header (263 bytes)
        let inst_start = b.len();
        b.extend_from_slice(&263u32.to_le_bytes());
        b.extend_from_slice(&[0u8; 22]);
        b.push(0);
        b.extend_from_slice(&1u16.to_le_bytes());
        b.extend_from_slice(&40u32.to_le_bytes());
        b.extend_from_slice(&[0u8; 96]);
        b.extend_from_slice(&[0u8; 96]); // envelopes
        b.extend_from_slice(&[0u8; 8]);
        b.push(0); // volume type
        b.push(0);
        b.extend_from_slice(&[0u8; 4]);
        b.extend_from_slice(&0u16.to_le_bytes());
        b.resize(inst_start + 263, 0);

        // Sample header
        b.extend_from_slice(&16u32.to_le_bytes());
        b.extend_from_slice(&0u32.to_le_bytes());
        b.extend_from_slice(&16u32.to_le_bytes());
        b.push(48); // volume
        b.push(0); // finetune
        b.push(1); // forward loop, 8-bit
        b.push(128);
        b.push(0);
        b.push(0);
        b.extend_from_slice(&[0u8; 22]);

        // Delta data: 8 x +15 then 8 x -15 gives a triangle
        b.extend(std::iter::repeat(15u8).take(8));
        b.extend(std::iter::repeat((-15i8) as u8).take(8));
        b
    }

    #[test]
    fn test_parse_tiny_xm() {
        let module = parse_xm(&tiny_xm()).unwrap();
        assert_eq!(module.name, "tiny");
        assert_eq!(module.channels, 2);
        assert!(module.linear);
        assert_eq!(module.initial_speed, 3);
        assert_eq!(module.initial_bpm, 150);
        assert_eq!(module.patterns[0].rows, 4);
        assert_eq!(module.patterns[0].cell(0, 0, 2).note, 49);
        assert_eq!(module.patterns[0].cell(0, 0, 2).instrument, 1);
        assert_eq!(module.patterns[0].cell(1, 0, 2), Cell::default());

        let sample = &module.instruments[0].samples[0];
        assert_eq!(sample.data.len(), 16);
        assert_eq!(sample.loop_kind, LoopKind::Forward);
        assert_eq!(sample.volume, 48);
        assert_eq!(sample.data[0], 15.0 / 128.0);
        assert_eq!(sample.data[7], 120.0 / 128.0);
        assert_eq!(sample.data[15], 0.0);
    }

    #[test]
    fn test_rejects_wrong_version() {
        let mut bytes = tiny_xm();
        bytes[58] = 0x03;
        assert!(matches!(parse_xm(&bytes), Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn test_truncated_file() {
        let bytes = tiny_xm();
        assert!(parse_xm(&bytes[..200]).is_err());
    }
}
