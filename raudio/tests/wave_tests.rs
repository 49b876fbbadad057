//! Wave loading, conversion and export

mod helpers;

use helpers::{sine_fixture, sine_i16, sine_wav_bytes};
use raudio::{Error, SampleFormat, Wave};

#[test]
fn test_load_wav_file() {
    let (_dir, path) = sine_fixture("tone.wav", 22050, 2205);
    let wave = Wave::load(&path).unwrap();

    assert!(wave.is_ready());
    assert_eq!(wave.sample_rate, 22050);
    assert_eq!(wave.channels, 1);
    assert_eq!(wave.frame_count, 2205);
    assert_eq!(wave.sample_size, 16);
    assert_eq!(wave.format_kind(), SampleFormat::S16);

    let expected = sine_i16(2205, 440.0, 0.5, 22050);
    for (got, want) in wave.samples().iter().zip(&expected) {
        assert!((got - *want as f32 / 32768.0).abs() < 1e-6);
    }
}

#[test]
fn test_load_from_memory_matches_file() {
    let (_dir, path) = sine_fixture("tone.wav", 44100, 1000);
    let from_file = Wave::load(&path).unwrap();
    let from_memory = Wave::load_from_memory(".wav", &sine_wav_bytes(44100, 1, 1000, 440.0, 0.5)).unwrap();
    assert_eq!(from_file, from_memory);
}

#[test]
fn test_unknown_type_is_unsupported() {
    let err = Wave::load_from_memory(".aiff", &[0u8; 32]).unwrap_err();
    assert!(matches!(err, Error::UnsupportedFormat(_)));
}

#[test]
fn test_export_wav_round_trip() {
    let (dir, path) = sine_fixture("tone.wav", 44100, 1000);
    let wave = Wave::load(&path).unwrap();

    let out = dir.path().join("copy.wav");
    wave.export(&out).unwrap();
    assert_eq!(Wave::load(&out).unwrap(), wave);
}

#[test]
fn test_export_float_wav() {
    let dir = tempfile::tempdir().unwrap();
    let wave = Wave::from_samples(&[0.5, -0.25, 0.125, 0.0], 8000, 32, 2).unwrap();
    let out = dir.path().join("float.wav");
    wave.export(&out).unwrap();

    let reader = hound::WavReader::open(&out).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_format, hound::SampleFormat::Float);
    assert_eq!(spec.bits_per_sample, 32);
    assert_eq!(spec.channels, 2);
    let samples: Vec<f32> = reader.into_samples::<f32>().map(|s| s.unwrap()).collect();
    assert_eq!(samples, vec![0.5, -0.25, 0.125, 0.0]);
}

#[test]
fn test_export_raw_writes_native_bytes() {
    let (dir, path) = sine_fixture("tone.wav", 44100, 500);
    let wave = Wave::load(&path).unwrap();
    let out = dir.path().join("tone.raw");
    wave.export(&out).unwrap();
    assert_eq!(std::fs::metadata(&out).unwrap().len(), 500 * 2);
}

#[test]
fn test_format_then_crop() {
    let (_dir, path) = sine_fixture("tone.wav", 22050, 2205);
    let mut wave = Wave::load(&path).unwrap();
    wave.format(44100, 32, 2).unwrap();
    assert_eq!(wave.sample_rate, 44100);
    assert_eq!(wave.channels, 2);
    assert_eq!(wave.frame_count, 4410);
    assert_eq!(wave.format_kind(), SampleFormat::F32);

    wave.crop(100, 1100);
    assert_eq!(wave.frame_count, 1000);
    assert_eq!(wave.samples().len(), 2000);
}

#[test]
fn test_format_to_8_bit() {
    let mut wave = Wave::from_samples(&[0.5, -0.5, 0.0], 8000, 32, 1).unwrap();
    wave.format(8000, 8, 1).unwrap();
    assert_eq!(wave.format_kind(), SampleFormat::U8);
    assert_eq!(wave.samples(), vec![0.5, -0.5, 0.0]);
}
