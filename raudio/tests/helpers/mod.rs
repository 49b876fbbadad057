//! Test helpers shared by the raudio integration tests
//!
//! - `audio_generator`: sine WAV fixtures (file and in-memory)
//! - headless engine construction and mixer draining

#![allow(dead_code)]

pub mod audio_generator;

pub use audio_generator::{
    generate_sine_wav, sine_i16, sine_wav_bytes, TEST_SAMPLE_RATE,
};

use raudio::{AudioConfig, AudioEngine};
use std::path::PathBuf;
use tempfile::TempDir;

/// Engine with no device attached
pub fn headless_engine(sample_rate: u32, channels: u16) -> AudioEngine {
    AudioEngine::new(&AudioConfig::headless(sample_rate, channels)).expect("create engine")
}

/// Write a mono 16-bit sine fixture into a fresh temp dir
///
/// Keep the returned `TempDir` alive while the file is in use.
pub fn sine_fixture(name: &str, sample_rate: u32, frames: usize) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join(name);
    generate_sine_wav(&path, sample_rate, 1, frames, 440.0, 0.5).expect("write sine fixture");
    (dir, path)
}

/// Mix `chunks` blocks of `chunk_frames` and return them concatenated
pub fn mix_chunks(engine: &AudioEngine, chunk_frames: usize, chunks: usize) -> Vec<f32> {
    let channels = engine.channels();
    let mut out = Vec::with_capacity(chunk_frames * chunks * channels);
    let mut block = vec![0.0f32; chunk_frames * channels];
    for _ in 0..chunks {
        engine.mix(&mut block);
        out.extend_from_slice(&block);
    }
    out
}
