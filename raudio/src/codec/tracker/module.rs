//! In-memory representation of a parsed tracker module
//!
//! MOD and XM both load into this model. Notes use the XM numbering
//! (1 = C-0 .. 96 = B-7, 97 = key off) and periods use FastTracker 2 units.

/// Note value meaning "release the current note"
pub const NOTE_OFF: u8 = 97;

/// Highest playable note
pub const NOTE_MAX: u8 = 96;

/// One channel of one row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cell {
    /// 0 = none, 1..=96 note, 97 = key off
    pub note: u8,
    /// 0 = none, otherwise 1-based instrument number
    pub instrument: u8,
    /// XM volume column byte (0 = empty)
    pub volume: u8,
    pub effect: u8,
    pub param: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub rows: usize,
    /// Row-major, `rows * channels` cells
    pub cells: Vec<Cell>,
}

impl Pattern {
    pub fn empty(rows: usize, channels: usize) -> Self {
        Self {
            rows,
            cells: vec![Cell::default(); rows * channels],
        }
    }

    pub fn cell(&self, row: usize, channel: usize, channels: usize) -> Cell {
        self.cells
            .get(row * channels + channel)
            .copied()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoopKind {
    #[default]
    None,
    Forward,
    PingPong,
}

/// A sample waveform with its playback defaults
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerSample {
    /// Normalised mono PCM
    pub data: Vec<f32>,
    pub loop_start: usize,
    pub loop_len: usize,
    pub loop_kind: LoopKind,
    /// Default volume, 0..=64
    pub volume: u8,
    /// Fine tune in 1/128 semitone steps
    pub finetune: i8,
    /// Transpose in semitones
    pub relative_note: i8,
    /// Default panning, 0 (left) ..= 255 (right); `None` keeps the channel's
    pub panning: Option<u8>,
}

impl TrackerSample {
    pub fn loop_end(&self) -> usize {
        self.loop_start + self.loop_len
    }

    pub fn has_loop(&self) -> bool {
        self.loop_kind != LoopKind::None && self.loop_len > 0
    }
}

/// Volume envelope with optional sustain point and loop
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    /// (tick, value 0..=64), ticks ascending
    pub points: Vec<(u16, u16)>,
    pub sustain: Option<usize>,
    pub loop_range: Option<(usize, usize)>,
}

impl Envelope {
    /// Envelope value (0.0..=64.0) at `tick`, linearly interpolated
    pub fn value_at(&self, tick: u16) -> f32 {
        let Some(&(first_tick, first_value)) = self.points.first() else {
            return 64.0;
        };
        if tick <= first_tick {
            return first_value as f32;
        }
        for pair in self.points.windows(2) {
            let (x0, y0) = pair[0];
            let (x1, y1) = pair[1];
            if tick < x1 {
                if x1 <= x0 {
                    return y1 as f32;
                }
                let t = (tick - x0) as f32 / (x1 - x0) as f32;
                return y0 as f32 + (y1 as f32 - y0 as f32) * t;
            }
        }
        self.points
            .last()
            .map(|&(_, value)| value as f32)
            .unwrap_or(64.0)
    }

    pub fn point_tick(&self, index: usize) -> Option<u16> {
        self.points.get(index).map(|&(tick, _)| tick)
    }

    /// Tick after `tick` while the note is held (`key_on`) or released
    pub fn advance(&self, tick: u16, key_on: bool) -> u16 {
        if key_on {
            if let Some(sustain_tick) = self.sustain.and_then(|s| self.point_tick(s)) {
                if tick == sustain_tick {
                    return tick;
                }
            }
        }
        let next = tick.saturating_add(1);
        if let Some((start, end)) = self.loop_range {
            if let (Some(start_tick), Some(end_tick)) = (self.point_tick(start), self.point_tick(end)) {
                if next >= end_tick && tick <= end_tick {
                    return start_tick;
                }
            }
        }
        next
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    /// Sample index for each of the 96 notes
    pub sample_map: [u8; 96],
    pub samples: Vec<TrackerSample>,
    pub volume_envelope: Option<Envelope>,
    /// Fadeout per tick after key off, out of 65536
    pub fadeout: u16,
}

impl Instrument {
    /// Instrument playing a single sample on every note
    pub fn single(sample: TrackerSample) -> Self {
        Self {
            sample_map: [0; 96],
            samples: vec![sample],
            volume_envelope: None,
            fadeout: 0,
        }
    }

    pub fn sample_for_note(&self, note: u8) -> Option<usize> {
        let index = *self.sample_map.get(note.checked_sub(1)? as usize)? as usize;
        (index < self.samples.len()).then_some(index)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: String,
    pub channels: usize,
    /// Pattern index per song position
    pub orders: Vec<u8>,
    pub restart: usize,
    pub patterns: Vec<Pattern>,
    pub instruments: Vec<Instrument>,
    pub initial_speed: u32,
    pub initial_bpm: u32,
    /// Linear (XM) rather than Amiga frequency table
    pub linear: bool,
    /// Initial panning per channel
    pub channel_panning: Vec<u8>,
}

impl Module {
    pub fn pattern_at(&self, order: usize) -> Option<&Pattern> {
        let index = *self.orders.get(order)? as usize;
        self.patterns.get(index)
    }

    /// Rows in the pattern at `order`; missing patterns count as 64 empty rows
    pub fn rows_at(&self, order: usize) -> usize {
        self.pattern_at(order).map(|p| p.rows).unwrap_or(64)
    }
}

/// Trim a fixed-size, NUL-padded name field
pub(crate) fn read_name(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> Envelope {
        Envelope {
            points: vec![(0, 64), (10, 32), (20, 0)],
            sustain: None,
            loop_range: None,
        }
    }

    #[test]
    fn test_envelope_interpolates() {
        let env = envelope();
        assert_eq!(env.value_at(0), 64.0);
        assert_eq!(env.value_at(5), 48.0);
        assert_eq!(env.value_at(10), 32.0);
        assert_eq!(env.value_at(30), 0.0);
    }

    #[test]
    fn test_envelope_sustain_holds_while_key_on() {
        let mut env = envelope();
        env.sustain = Some(1);
        assert_eq!(env.advance(10, true), 10);
        assert_eq!(env.advance(10, false), 11);
    }

    #[test]
    fn test_envelope_loop_wraps() {
        let mut env = envelope();
        env.loop_range = Some((0, 1));
        assert_eq!(env.advance(8, false), 9);
        assert_eq!(env.advance(9, false), 0);
    }

    #[test]
    fn test_sample_for_note() {
        let mut inst = Instrument::single(TrackerSample::default());
        assert_eq!(inst.sample_for_note(49), Some(0));
        inst.sample_map[48] = 3;
        assert_eq!(inst.sample_for_note(49), None);
        assert_eq!(inst.sample_for_note(0), None);
    }

    #[test]
    fn test_read_name() {
        assert_eq!(read_name(b"song\0\0\0\0"), "song");
        assert_eq!(read_name(b"padded  "), "padded");
    }
}
