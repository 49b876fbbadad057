//! Deterministic audio fixtures for integration tests
//!
//! Sine waves written as 16-bit PCM WAV, either to a file in a temp dir or
//! to memory. `sine_i16` exposes the exact quantised samples so tests can
//! compare decoded output against what was written.

use hound::{WavSpec, WavWriter};
use std::f32::consts::PI;
use std::io::Cursor;
use std::path::Path;

/// Standard test sample rate (44.1 kHz)
pub const TEST_SAMPLE_RATE: u32 = 44100;

/// Quantised sine: `frames` frames of `frequency_hz` at `amplitude`
pub fn sine_i16(frames: usize, frequency_hz: f32, amplitude: f32, sample_rate: u32) -> Vec<i16> {
    let amplitude_i16 = amplitude * i16::MAX as f32;
    (0..frames)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            ((2.0 * PI * frequency_hz * t).sin() * amplitude_i16) as i16
        })
        .collect()
}

fn spec(channels: u16, sample_rate: u32) -> WavSpec {
    WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Write a sine WAV with the same signal on every channel
pub fn generate_sine_wav<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
    channels: u16,
    frames: usize,
    frequency_hz: f32,
    amplitude: f32,
) -> Result<(), hound::Error> {
    let mut writer = WavWriter::create(path, spec(channels, sample_rate))?;
    for s in sine_i16(frames, frequency_hz, amplitude, sample_rate) {
        for _ in 0..channels {
            writer.write_sample(s)?;
        }
    }
    writer.finalize()
}

/// In-memory sine WAV file
pub fn sine_wav_bytes(
    sample_rate: u32,
    channels: u16,
    frames: usize,
    frequency_hz: f32,
    amplitude: f32,
) -> Vec<u8> {
    let mut bytes = Vec::new();
    {
        let mut writer = WavWriter::new(Cursor::new(&mut bytes), spec(channels, sample_rate))
            .expect("create in-memory WAV writer");
        for s in sine_i16(frames, frequency_hz, amplitude, sample_rate) {
            for _ in 0..channels {
                writer.write_sample(s).expect("write sample");
            }
        }
        writer.finalize().expect("finalize WAV");
    }
    bytes
}
