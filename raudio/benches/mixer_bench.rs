//! Mixer Throughput Benchmark
//!
//! Measures one device period (512 frames, stereo, 44.1 kHz) through
//! `AudioEngine::mix` with a growing number of active buffers.
//!
//! **Goal:** A period with 16 voices should mix far faster than the 11.6 ms
//! it represents.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use raudio::{AudioConfig, AudioEngine, Sound, Wave};

const RATE: u32 = 44_100;
const PERIOD: usize = 512;

fn engine_with_voices(voices: usize, pitch: f32) -> (AudioEngine, Vec<Sound>) {
    let engine = AudioEngine::new(&AudioConfig::headless(RATE, 2)).expect("engine");
    let samples: Vec<f32> = (0..RATE as usize)
        .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / RATE as f32).sin() * 0.25)
        .collect();
    let wave = Wave::from_samples(&samples, RATE, 16, 1).expect("wave");

    let sounds: Vec<Sound> = (0..voices)
        .map(|i| {
            let sound = engine.load_sound_from_wave(&wave);
            engine.set_sound_looping(&sound, true);
            engine.set_sound_pan(&sound, i as f32 / voices.max(1) as f32);
            engine.set_sound_pitch(&sound, pitch);
            engine.play_sound(&sound);
            sound
        })
        .collect();
    (engine, sounds)
}

fn bench_mix_voices(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixer_throughput");
    group.throughput(Throughput::Elements(PERIOD as u64));

    for voices in [1usize, 4, 16] {
        group.bench_with_input(BenchmarkId::new("voices", voices), &voices, |b, &voices| {
            let (engine, _sounds) = engine_with_voices(voices, 1.0);
            let mut output = vec![0.0f32; PERIOD * 2];
            b.iter(|| {
                engine.mix(black_box(&mut output));
                black_box(&output);
            });
        });
    }

    group.finish();
}

fn bench_mix_pitched(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixer_throughput");
    group.throughput(Throughput::Elements(PERIOD as u64));

    // Non-unity pitch forces every voice through the rate converter
    group.bench_function("voices_16_pitched", |b| {
        let (engine, _sounds) = engine_with_voices(16, 1.25);
        let mut output = vec![0.0f32; PERIOD * 2];
        b.iter(|| {
            engine.mix(black_box(&mut output));
            black_box(&output);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_mix_voices, bench_mix_pitched);
criterion_main!(benches);
