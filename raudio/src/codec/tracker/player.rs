//! Tick-based module playback
//!
//! A row lasts `speed` ticks and a tick lasts `rate * 5 / (2 * bpm)` output
//! frames. Row effects and new notes apply on tick 0; slides, vibrato and
//! the other continuous effects run on the remaining ticks. Playback ends
//! when the song reaches a row it has already played.

use super::module::{Cell, LoopKind, Module, TrackerSample, NOTE_MAX, NOTE_OFF};
use std::collections::HashSet;
use std::sync::Arc;

const ARPEGGIO: u8 = 0x0;
const PORTA_UP: u8 = 0x1;
const PORTA_DOWN: u8 = 0x2;
const TONE_PORTA: u8 = 0x3;
const VIBRATO: u8 = 0x4;
const TONE_PORTA_VOLUME_SLIDE: u8 = 0x5;
const VIBRATO_VOLUME_SLIDE: u8 = 0x6;
const SET_PANNING: u8 = 0x8;
const SAMPLE_OFFSET: u8 = 0x9;
const VOLUME_SLIDE: u8 = 0xa;
const POSITION_JUMP: u8 = 0xb;
const SET_VOLUME: u8 = 0xc;
const PATTERN_BREAK: u8 = 0xd;
const EXTENDED: u8 = 0xe;
const SET_SPEED: u8 = 0xf;
const GLOBAL_VOLUME: u8 = 0x10;
const KEY_OFF: u8 = 0x14;

/// Half sine, 32 steps, peak 255
const VIBRATO_TABLE: [u8; 32] = [
    0, 24, 49, 74, 97, 120, 141, 161, 180, 197, 212, 224, 235, 244, 250, 253, 255, 253, 250, 244,
    235, 224, 212, 197, 180, 161, 141, 120, 97, 74, 49, 24,
];

const MIN_PERIOD: f32 = 1.0;
const MAX_PERIOD: f32 = 32000.0;
const FADEOUT_MAX: u32 = 65536;
const MAX_VOLUME: i32 = 64;
/// Headroom so several full-scale channels do not clip
const MIX_AMP: f32 = 0.5;

/// Period of a 0-based note (C-0 = 0) in FastTracker 2 units
pub fn note_period(real_note: i32, finetune: i8, linear: bool) -> f32 {
    if linear {
        7680.0 - real_note as f32 * 64.0 - finetune as f32 / 2.0
    } else {
        1712.0 * 2f32.powf(-(real_note as f32 - 48.0 + finetune as f32 / 128.0) / 12.0)
    }
}

/// Playback frequency in Hz for a period
pub fn period_frequency(period: f32, linear: bool) -> f32 {
    if linear {
        8363.0 * 2f32.powf((4608.0 - period) / 768.0)
    } else {
        8363.0 * 1712.0 / period
    }
}

/// Output frames per tick, fractional
pub fn samples_per_tick(sample_rate: u32, bpm: u32) -> f64 {
    sample_rate as f64 * 5.0 / (2.0 * bpm.max(1) as f64)
}

fn channel_sample(
    module: &Module,
    instrument: Option<usize>,
    sample: Option<usize>,
) -> Option<&TrackerSample> {
    module.instruments.get(instrument?)?.samples.get(sample?)
}

#[derive(Debug, Clone)]
struct Channel {
    instrument: Option<usize>,
    sample: Option<usize>,
    active: bool,
    position: f64,
    forward: bool,
    period: f32,
    target_period: f32,
    volume: i32,
    panning: u8,
    key_on: bool,
    fadeout: u32,
    envelope_tick: u16,

    effect: u8,
    param: u8,
    volume_column: u8,

    porta_up: u8,
    porta_down: u8,
    tone_porta_speed: u8,
    vibrato_speed: u8,
    vibrato_depth: u8,
    vibrato_pos: u8,
    volume_slide: u8,
    sample_offset: u8,

    vibrato_offset: f32,
    arpeggio: u8,
}

impl Channel {
    fn new(panning: u8) -> Self {
        Self {
            instrument: None,
            sample: None,
            active: false,
            position: 0.0,
            forward: true,
            period: 0.0,
            target_period: 0.0,
            volume: 0,
            panning,
            key_on: false,
            fadeout: FADEOUT_MAX,
            envelope_tick: 0,
            effect: 0,
            param: 0,
            volume_column: 0,
            porta_up: 0,
            porta_down: 0,
            tone_porta_speed: 0,
            vibrato_speed: 0,
            vibrato_depth: 0,
            vibrato_pos: 0,
            volume_slide: 0,
            sample_offset: 0,
            vibrato_offset: 0.0,
            arpeggio: 0,
        }
    }

    /// Tick 0 handling of one cell
    fn trigger(&mut self, cell: Cell, module: &Module) {
        self.effect = cell.effect;
        self.param = cell.param;
        self.volume_column = cell.volume;
        self.vibrato_offset = 0.0;
        self.arpeggio = 0;

        let tone_porta = matches!(cell.effect, TONE_PORTA | TONE_PORTA_VOLUME_SLIDE)
            || cell.volume >> 4 == 0xf;

        if cell.instrument > 0 {
            let index = cell.instrument as usize - 1;
            match module.instruments.get(index) {
                Some(instrument) => {
                    self.instrument = Some(index);
                    let sample_index = if (1..=NOTE_MAX).contains(&cell.note) {
                        instrument.sample_for_note(cell.note)
                    } else {
                        self.sample
                    };
                    if let Some(sample) = sample_index.and_then(|i| instrument.samples.get(i)) {
                        self.volume = sample.volume as i32;
                        if let Some(panning) = sample.panning {
                            self.panning = panning;
                        }
                    }
                    self.key_on = true;
                    self.fadeout = FADEOUT_MAX;
                    self.envelope_tick = 0;
                }
                None => {
                    self.instrument = None;
                    self.active = false;
                }
            }
        }

        match cell.note {
            NOTE_OFF => self.key_off(module),
            1..=NOTE_MAX => self.start_note(cell, module, tone_porta),
            _ => {}
        }

        match cell.volume {
            v @ 0x10..=0x50 => self.volume = (v - 0x10) as i32,
            v @ 0x80..=0x8f => self.volume = (self.volume - (v & 0xf) as i32).max(0),
            v @ 0x90..=0x9f => self.volume = (self.volume + (v & 0xf) as i32).min(MAX_VOLUME),
            v @ 0xc0..=0xcf => self.panning = (v & 0xf) * 17,
            v @ 0xf0..=0xff if v & 0xf != 0 => self.tone_porta_speed = (v & 0xf) << 4,
            _ => {}
        }

        let (x, y) = (cell.param >> 4, cell.param & 0xf);
        match cell.effect {
            PORTA_UP if cell.param != 0 => self.porta_up = cell.param,
            PORTA_DOWN if cell.param != 0 => self.porta_down = cell.param,
            TONE_PORTA if cell.param != 0 => self.tone_porta_speed = cell.param,
            VIBRATO => {
                if x != 0 {
                    self.vibrato_speed = x;
                }
                if y != 0 {
                    self.vibrato_depth = y;
                }
            }
            TONE_PORTA_VOLUME_SLIDE | VIBRATO_VOLUME_SLIDE | VOLUME_SLIDE if cell.param != 0 => {
                self.volume_slide = cell.param
            }
            SET_PANNING => self.panning = cell.param,
            SET_VOLUME => self.volume = (cell.param as i32).min(MAX_VOLUME),
            EXTENDED => match x {
                0x1 => self.period = (self.period - y as f32 * 4.0).max(MIN_PERIOD),
                0x2 => self.period = (self.period + y as f32 * 4.0).min(MAX_PERIOD),
                0xa => self.volume = (self.volume + y as i32).min(MAX_VOLUME),
                0xb => self.volume = (self.volume - y as i32).max(0),
                0xc if y == 0 => self.volume = 0,
                _ => {}
            },
            KEY_OFF if cell.param == 0 => self.key_off(module),
            _ => {}
        }
    }

    fn start_note(&mut self, cell: Cell, module: &Module, tone_porta: bool) {
        let Some(instrument) = self.instrument.and_then(|i| module.instruments.get(i)) else {
            return;
        };
        let Some(sample_index) = instrument.sample_for_note(cell.note) else {
            return;
        };
        let sample = &instrument.samples[sample_index];
        let real_note = (cell.note as i32 - 1 + sample.relative_note as i32).clamp(0, 118);
        let period = note_period(real_note, sample.finetune, module.linear);

        if tone_porta && self.active {
            self.target_period = period;
            return;
        }

        self.sample = Some(sample_index);
        self.period = period;
        self.target_period = period;
        self.position = 0.0;
        self.forward = true;
        self.vibrato_pos = 0;
        self.active = !sample.data.is_empty();

        if cell.effect == SAMPLE_OFFSET {
            if cell.param != 0 {
                self.sample_offset = cell.param;
            }
            self.position = self.sample_offset as f64 * 256.0;
            if self.position >= sample.data.len() as f64 {
                self.active = false;
            }
        }
    }

    fn key_off(&mut self, module: &Module) {
        self.key_on = false;
        let has_envelope = self
            .instrument
            .and_then(|i| module.instruments.get(i))
            .is_some_and(|inst| inst.volume_envelope.is_some());
        if !has_envelope {
            self.volume = 0;
        }
    }

    /// Effects for ticks after the first
    fn tick_effects(&mut self, tick: u32, module: &Module) {
        let (x, y) = (self.param >> 4, self.param & 0xf);
        self.vibrato_offset = 0.0;

        match self.volume_column {
            v @ 0x60..=0x6f => self.volume = (self.volume - (v & 0xf) as i32).max(0),
            v @ 0x70..=0x7f => self.volume = (self.volume + (v & 0xf) as i32).min(MAX_VOLUME),
            0xf0..=0xff => self.tone_portamento(),
            _ => {}
        }

        match self.effect {
            ARPEGGIO if self.param != 0 => {
                self.arpeggio = match tick % 3 {
                    1 => x,
                    2 => y,
                    _ => 0,
                }
            }
            PORTA_UP => {
                self.period = (self.period - self.porta_up as f32 * 4.0).max(MIN_PERIOD);
            }
            PORTA_DOWN => {
                self.period = (self.period + self.porta_down as f32 * 4.0).min(MAX_PERIOD);
            }
            TONE_PORTA => self.tone_portamento(),
            VIBRATO => self.vibrato(),
            TONE_PORTA_VOLUME_SLIDE => {
                self.tone_portamento();
                self.slide_volume();
            }
            VIBRATO_VOLUME_SLIDE => {
                self.vibrato();
                self.slide_volume();
            }
            VOLUME_SLIDE => self.slide_volume(),
            EXTENDED => match x {
                0x9 if y > 0 && tick % y as u32 == 0 => {
                    self.position = 0.0;
                    self.forward = true;
                }
                0xc if tick == y as u32 => self.volume = 0,
                _ => {}
            },
            KEY_OFF if tick == self.param as u32 => self.key_off(module),
            _ => {}
        }
    }

    fn tone_portamento(&mut self) {
        let speed = self.tone_porta_speed as f32 * 4.0;
        if self.period < self.target_period {
            self.period = (self.period + speed).min(self.target_period);
        } else if self.period > self.target_period {
            self.period = (self.period - speed).max(self.target_period);
        }
    }

    fn vibrato(&mut self) {
        let pos = self.vibrato_pos & 63;
        let delta = VIBRATO_TABLE[(pos & 31) as usize] as f32 * self.vibrato_depth as f32 / 128.0;
        self.vibrato_offset = if pos & 32 != 0 { -delta } else { delta } * 4.0;
        self.vibrato_pos = self.vibrato_pos.wrapping_add(self.vibrato_speed) & 63;
    }

    fn slide_volume(&mut self) {
        let (up, down) = (self.volume_slide >> 4, self.volume_slide & 0xf);
        self.volume = if up > 0 {
            (self.volume + up as i32).min(MAX_VOLUME)
        } else {
            (self.volume - down as i32).max(0)
        };
    }

    fn update_envelope(&mut self, module: &Module) {
        let Some(instrument) = self.instrument.and_then(|i| module.instruments.get(i)) else {
            return;
        };
        let Some(envelope) = &instrument.volume_envelope else {
            return;
        };
        self.envelope_tick = envelope.advance(self.envelope_tick, self.key_on);
        if !self.key_on {
            self.fadeout = self.fadeout.saturating_sub(instrument.fadeout as u32);
            if self.fadeout == 0 {
                self.active = false;
            }
        }
    }

    fn gain(&self, module: &Module, global_volume: i32) -> f32 {
        let envelope = self
            .instrument
            .and_then(|i| module.instruments.get(i))
            .and_then(|inst| inst.volume_envelope.as_ref())
            .map(|env| env.value_at(self.envelope_tick))
            .unwrap_or(64.0);
        self.volume as f32 / 64.0
            * envelope / 64.0
            * self.fadeout as f32 / FADEOUT_MAX as f32
            * global_volume as f32 / 64.0
    }

    fn frequency(&self, linear: bool) -> f32 {
        let mut period = self.period;
        if self.arpeggio > 0 {
            period = if linear {
                period - self.arpeggio as f32 * 64.0
            } else {
                period * 2f32.powf(-(self.arpeggio as f32) / 12.0)
            };
        }
        period_frequency((period + self.vibrato_offset).clamp(MIN_PERIOD, MAX_PERIOD), linear)
    }

    /// Interpolated value at the play position, then step forward
    fn next_sample(&mut self, sample: &TrackerSample, step: f64) -> Option<f32> {
        let index = self.position as usize;
        if self.position < 0.0 || index >= sample.data.len() {
            self.active = false;
            return None;
        }
        let frac = (self.position - index as f64) as f32;
        let next = if sample.has_loop() && index + 1 >= sample.loop_end() {
            sample.loop_start
        } else {
            index + 1
        };
        let s0 = sample.data[index];
        let s1 = sample.data.get(next).copied().unwrap_or(s0);
        let value = s0 + (s1 - s0) * frac;

        if self.forward {
            self.position += step;
        } else {
            self.position -= step;
        }

        if sample.has_loop() {
            let start = sample.loop_start as f64;
            let end = sample.loop_end() as f64;
            match sample.loop_kind {
                LoopKind::Forward => {
                    if self.position >= end {
                        self.position = start + (self.position - end) % (end - start);
                    }
                }
                LoopKind::PingPong => {
                    if self.forward && self.position >= end {
                        self.position = (2.0 * (end - 1.0) - self.position).max(start);
                        self.forward = false;
                    } else if !self.forward && self.position < start {
                        self.position = (2.0 * start - self.position).min(end - 1.0);
                        self.forward = true;
                    }
                }
                LoopKind::None => {}
            }
        }
        Some(value)
    }
}

/// Renders a module to interleaved stereo f32
#[derive(Debug, Clone)]
pub struct Player {
    module: Arc<Module>,
    sample_rate: u32,
    channels: Vec<Channel>,
    speed: u32,
    bpm: u32,
    global_volume: i32,
    order: usize,
    row: usize,
    tick: u32,
    jump_order: Option<usize>,
    break_row: Option<usize>,
    visited: HashSet<(usize, usize)>,
    started: bool,
    ended: bool,
    tick_frames_left: usize,
    tick_remainder: f64,
}

impl Player {
    pub fn new(module: Arc<Module>, sample_rate: u32) -> Self {
        let mut player = Self {
            module,
            sample_rate,
            channels: Vec::new(),
            speed: 6,
            bpm: 125,
            global_volume: MAX_VOLUME,
            order: 0,
            row: 0,
            tick: 0,
            jump_order: None,
            break_row: None,
            visited: HashSet::new(),
            started: false,
            ended: false,
            tick_frames_left: 0,
            tick_remainder: 0.0,
        };
        player.reset();
        player
    }

    /// Back to the first row with fresh channel state
    pub fn reset(&mut self) {
        self.channels = (0..self.module.channels)
            .map(|c| Channel::new(self.module.channel_panning.get(c).copied().unwrap_or(128)))
            .collect();
        self.speed = self.module.initial_speed.max(1);
        self.bpm = self.module.initial_bpm.max(1);
        self.global_volume = MAX_VOLUME;
        self.order = 0;
        self.row = 0;
        self.tick = 0;
        self.jump_order = None;
        self.break_row = None;
        self.visited.clear();
        self.started = false;
        self.ended = false;
        self.tick_frames_left = 0;
        self.tick_remainder = 0.0;
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_finished(&self) -> bool {
        self.ended
    }

    /// Song length in output frames, found by running the sequencer silently
    pub fn measure_frames(&self) -> u64 {
        let mut dry_run = Player::new(Arc::clone(&self.module), self.sample_rate);
        let mut total = 0u64;
        while dry_run.advance_tick() {
            total += dry_run.tick_frames_left as u64;
        }
        total
    }

    /// Render up to `frames` stereo frames; fewer means the song ended
    pub fn render(&mut self, out: &mut [f32], frames: usize) -> usize {
        let frames = frames.min(out.len() / 2);
        let mut produced = 0;
        while produced < frames && !self.ended {
            if self.tick_frames_left == 0 {
                if !self.advance_tick() {
                    break;
                }
                continue;
            }
            let n = (frames - produced).min(self.tick_frames_left);
            self.mix(&mut out[produced * 2..(produced + n) * 2], n);
            produced += n;
            self.tick_frames_left -= n;
        }
        produced
    }

    /// Move to the next tick, running row or tick effects; false at song end
    fn advance_tick(&mut self) -> bool {
        if self.ended {
            return false;
        }
        let module = Arc::clone(&self.module);

        if self.started {
            for channel in &mut self.channels {
                channel.update_envelope(&module);
            }
            self.tick += 1;
            if self.tick >= self.speed {
                self.tick = 0;
                if !self.next_row() {
                    self.ended = true;
                    return false;
                }
            }
        } else {
            self.started = true;
            self.visited.insert((self.order, self.row));
        }

        if self.tick == 0 {
            self.process_row(&module);
        } else {
            for channel in &mut self.channels {
                channel.tick_effects(self.tick, &module);
            }
        }

        let exact = samples_per_tick(self.sample_rate, self.bpm) + self.tick_remainder;
        let frames = exact.floor();
        self.tick_remainder = exact - frames;
        self.tick_frames_left = frames as usize;
        true
    }

    /// Step to the next row, honouring jumps and breaks; false on a revisit
    fn next_row(&mut self) -> bool {
        let (mut order, mut row) = if self.jump_order.is_some() || self.break_row.is_some() {
            let order = self.jump_order.take().unwrap_or(self.order + 1);
            (order, self.break_row.take().unwrap_or(0))
        } else if self.row + 1 < self.module.rows_at(self.order) {
            (self.order, self.row + 1)
        } else {
            (self.order + 1, 0)
        };

        if order >= self.module.orders.len() {
            order = self.module.restart;
        }
        if row >= self.module.rows_at(order) {
            row = 0;
        }
        self.order = order;
        self.row = row;
        self.visited.insert((order, row))
    }

    fn process_row(&mut self, module: &Module) {
        let channel_count = module.channels.min(self.channels.len());
        let pattern = module.pattern_at(self.order);
        for index in 0..channel_count {
            let cell = pattern
                .map(|p| p.cell(self.row, index, module.channels))
                .unwrap_or_default();

            match cell.effect {
                POSITION_JUMP => self.jump_order = Some(cell.param as usize),
                PATTERN_BREAK => {
                    self.break_row =
                        Some((cell.param >> 4) as usize * 10 + (cell.param & 0xf) as usize)
                }
                SET_SPEED if cell.param > 0 => {
                    if cell.param < 0x20 {
                        self.speed = cell.param as u32;
                    } else {
                        self.bpm = cell.param as u32;
                    }
                }
                GLOBAL_VOLUME => self.global_volume = (cell.param as i32).min(MAX_VOLUME),
                _ => {}
            }

            self.channels[index].trigger(cell, module);
        }
    }

    fn mix(&mut self, out: &mut [f32], frames: usize) {
        let out = &mut out[..frames * 2];
        out.fill(0.0);
        let module = Arc::clone(&self.module);

        for channel in &mut self.channels {
            if !channel.active {
                continue;
            }
            let Some(sample) = channel_sample(&module, channel.instrument, channel.sample) else {
                channel.active = false;
                continue;
            };
            let gain = channel.gain(&module, self.global_volume) * MIX_AMP;
            let pan = channel.panning as f32 / 255.0;
            let (left, right) = (gain * (1.0 - pan), gain * pan);
            let step = channel.frequency(module.linear) as f64 / self.sample_rate as f64;

            for frame in out.chunks_exact_mut(2) {
                let Some(value) = channel.next_sample(sample, step) else {
                    break;
                };
                frame[0] += value * left;
                frame[1] += value * right;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::tracker::protracker::{parse_mod, tests::tiny_mod};
    use crate::codec::tracker::xm::{parse_xm, tests::tiny_xm};

    #[test]
    fn test_linear_period_reference() {
        assert_eq!(note_period(48, 0, true), 4608.0);
        assert!((period_frequency(4608.0, true) - 8363.0).abs() < 1e-3);
        // One octave up doubles the frequency.
        let up = period_frequency(note_period(60, 0, true), true);
        assert!((up - 16726.0).abs() < 0.1);
    }

    #[test]
    fn test_amiga_period_reference() {
        assert!((note_period(48, 0, false) - 1712.0).abs() < 1e-3);
        assert!((period_frequency(1712.0, false) - 8363.0).abs() < 1e-3);
        assert!((note_period(36, 0, false) - 3424.0).abs() < 1e-2);
    }

    #[test]
    fn test_samples_per_tick() {
        assert_eq!(samples_per_tick(48000, 125), 960.0);
        assert_eq!(samples_per_tick(44100, 125), 882.0);
    }

    #[test]
    fn test_mod_length_includes_pattern_break() {
        let module = Arc::new(parse_mod(&tiny_mod(4)).unwrap());
        let player = Player::new(module, 48000);
        assert_eq!(player.measure_frames(), 4 * 6 * 960);
    }

    #[test]
    fn test_full_pattern_length() {
        let module = Arc::new(parse_mod(&tiny_mod(64)).unwrap());
        let player = Player::new(module, 48000);
        assert_eq!(player.measure_frames(), 64 * 6 * 960);
    }

    #[test]
    fn test_render_stops_at_song_end() {
        let module = Arc::new(parse_xm(&tiny_xm()).unwrap());
        let mut player = Player::new(module, 48000);
        let total = player.measure_frames();
        assert_eq!(total, 4 * 3 * 800);

        let mut out = vec![0.0f32; 4096 * 2];
        let mut rendered = 0u64;
        let mut peak = 0.0f32;
        loop {
            let n = player.render(&mut out, 4096);
            if n == 0 {
                break;
            }
            peak = out[..n * 2].iter().fold(peak, |p, s| p.max(s.abs()));
            rendered += n as u64;
        }
        assert_eq!(rendered, total);
        assert!(player.is_finished());
        assert!(peak > 0.0);

        player.reset();
        assert!(!player.is_finished());
        assert_eq!(player.render(&mut out, 16), 16);
    }

    #[test]
    fn test_speed_and_tempo_effect() {
        let mut bytes = tiny_mod(4);
        // Row 0, channel 2: F03 (speed 3)
        let cell = 1084 + 2 * 4;
        bytes[cell + 2] = 0x0f;
        bytes[cell + 3] = 0x03;
        let module = Arc::new(parse_mod(&bytes).unwrap());
        let player = Player::new(module, 48000);
        assert_eq!(player.measure_frames(), 4 * 3 * 960);
    }

    #[test]
    fn test_volume_slide_clamps() {
        let mut channel = Channel::new(128);
        channel.volume = 60;
        channel.volume_slide = 0x80;
        channel.slide_volume();
        assert_eq!(channel.volume, 64);
        channel.volume_slide = 0x0f;
        for _ in 0..5 {
            channel.slide_volume();
        }
        assert_eq!(channel.volume, 0);
    }

    #[test]
    fn test_forward_loop_wraps_position() {
        let sample = TrackerSample {
            data: vec![0.0, 0.25, 0.5, 0.75],
            loop_start: 1,
            loop_len: 3,
            loop_kind: LoopKind::Forward,
            volume: 64,
            ..Default::default()
        };
        let mut channel = Channel::new(128);
        channel.active = true;
        let values: Vec<f32> = (0..7).filter_map(|_| channel.next_sample(&sample, 1.0)).collect();
        assert_eq!(values, vec![0.0, 0.25, 0.5, 0.75, 0.25, 0.5, 0.75]);
    }

    #[test]
    fn test_one_shot_sample_ends() {
        let sample = TrackerSample {
            data: vec![0.5; 3],
            volume: 64,
            ..Default::default()
        };
        let mut channel = Channel::new(128);
        channel.active = true;
        let count = (0..10).filter_map(|_| channel.next_sample(&sample, 1.0)).count();
        assert_eq!(count, 3);
        assert!(!channel.active);
    }
}
