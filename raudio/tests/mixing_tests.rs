//! Mixer behaviour: pan law, accumulation, processors and the end-to-end path

mod helpers;

use helpers::{headless_engine, mix_chunks, sine_fixture, sine_i16};
use raudio::engine::mixer::pan_gains;
use raudio::{processor, AudioEngine, Sound, Wave};

fn constant_sound(engine: &AudioEngine, value: f32, frames: usize) -> Sound {
    let wave = Wave::from_samples(&vec![value; frames], engine.sample_rate(), 32, 1).unwrap();
    engine.load_sound_from_wave(&wave)
}

#[test]
fn test_pan_law_boundaries() {
    assert_eq!(pan_gains(0.8, 1.0), (0.8, 0.0));
    assert_eq!(pan_gains(0.8, 0.0), (0.0, 0.8));

    let (l, r) = pan_gains(1.0, 0.5);
    assert_eq!(l, r);
    assert!((l - 0.6875).abs() < 1e-6);
}

#[test]
fn test_mix_applies_pan_per_channel() {
    let engine = headless_engine(44100, 2);
    let sound = constant_sound(&engine, 0.5, 1000);
    engine.set_sound_pan(&sound, 1.0);
    engine.play_sound(&sound);

    let out = mix_chunks(&engine, 64, 1);
    for frame in out.chunks_exact(2) {
        assert_eq!(frame[0], 0.5);
        assert_eq!(frame[1], 0.0);
    }
}

#[test]
fn test_mix_is_silent_without_playing_buffers() {
    let engine = headless_engine(44100, 2);
    let _sound = constant_sound(&engine, 0.5, 1000);
    let out = mix_chunks(&engine, 128, 2);
    assert!(out.iter().all(|&s| s == 0.0));
}

#[test]
fn test_accumulation_is_commutative() {
    let a_then_b = headless_engine(44100, 2);
    let b_then_a = headless_engine(44100, 2);

    let a = constant_sound(&a_then_b, 0.3, 500);
    let b = constant_sound(&a_then_b, -0.2, 700);
    let b2 = constant_sound(&b_then_a, -0.2, 700);
    let a2 = constant_sound(&b_then_a, 0.3, 500);

    a_then_b.set_sound_pan(&a, 0.2);
    b_then_a.set_sound_pan(&a2, 0.2);
    a_then_b.set_sound_volume(&b, 0.7);
    b_then_a.set_sound_volume(&b2, 0.7);
    for (engine, sounds) in [(&a_then_b, [a, b]), (&b_then_a, [b2, a2])] {
        for sound in &sounds {
            engine.play_sound(sound);
        }
    }

    let x = mix_chunks(&a_then_b, 256, 4);
    let y = mix_chunks(&b_then_a, 256, 4);
    for (p, q) in x.iter().zip(&y) {
        assert!((p - q).abs() < 1e-6);
    }
}

#[test]
fn test_end_to_end_sine_sound() {
    let engine = headless_engine(44100, 2);
    let (_dir, path) = sine_fixture("sine.wav", 44100, 44100);
    let sound = engine.load_sound(&path);
    assert!(engine.is_sound_ready(&sound));
    assert_eq!(sound.frame_count, 44100);
    engine.play_sound(&sound);

    let chunk_frames = 512;
    let mut mixed = Vec::new();
    let mut chunks = 0;
    while engine.is_sound_playing(&sound) {
        mixed.extend(mix_chunks(&engine, chunk_frames, 1));
        chunks += 1;
        assert!(chunks <= 100, "sound never finished");
    }

    // 44100 = 86 * 512 + 68
    assert_eq!(chunks, 87);
    let played = 86 * chunk_frames + 68;
    assert_eq!(played, 44100);

    let expected = sine_i16(44100, 440.0, 0.5, 44100);
    let (gain, _) = pan_gains(1.0, 0.5);
    for (i, frame) in mixed.chunks_exact(2).enumerate() {
        assert_eq!(frame[0], frame[1]);
        if i < played {
            let want = expected[i] as f32 / 32768.0 * gain;
            assert!((frame[0] - want).abs() < 1e-4, "frame {}", i);
        } else {
            assert_eq!(frame[0], 0.0, "padding frame {}", i);
        }
    }
}

#[test]
fn test_buffer_processor_runs_before_pan() {
    let engine = headless_engine(44100, 2);
    let sound = constant_sound(&engine, 0.5, 1000);
    // Stereo frames: keep left, silence right
    let left_only = processor(|frames: &mut [f32], _frames: usize| {
        for frame in frames.chunks_exact_mut(2) {
            frame[1] = 0.0;
        }
    });
    engine.attach_sound_processor(&sound, left_only.clone());
    engine.play_sound(&sound);

    let out = mix_chunks(&engine, 32, 1);
    assert!((out[0] - 0.5 * 0.6875).abs() < 1e-6);
    assert_eq!(out[1], 0.0);

    engine.detach_sound_processor(&sound, &left_only);
    let out = mix_chunks(&engine, 32, 1);
    assert_eq!(out[0], out[1]);
}

#[test]
fn test_mixed_processors_run_in_order_before_master_volume() {
    let engine = headless_engine(44100, 2);
    let add = processor(|frames: &mut [f32], _| frames.iter_mut().for_each(|s| *s += 0.1));
    let double = processor(|frames: &mut [f32], _| frames.iter_mut().for_each(|s| *s *= 2.0));
    engine.attach_audio_mixed_processor(add.clone());
    engine.attach_audio_mixed_processor(double.clone());

    let out = mix_chunks(&engine, 16, 1);
    assert!(out.iter().all(|&s| (s - 0.2).abs() < 1e-6));

    engine.set_master_volume(0.5);
    let out = mix_chunks(&engine, 16, 1);
    assert!(out.iter().all(|&s| (s - 0.1).abs() < 1e-6));

    engine.detach_audio_mixed_processor(&add);
    engine.detach_audio_mixed_processor(&double);
    let out = mix_chunks(&engine, 16, 1);
    assert!(out.iter().all(|&s| s == 0.0));
}

#[test]
fn test_detach_removes_every_instance() {
    let engine = headless_engine(44100, 2);
    let add = processor(|frames: &mut [f32], _| frames.iter_mut().for_each(|s| *s += 0.25));
    engine.attach_audio_mixed_processor(add.clone());
    engine.attach_audio_mixed_processor(add.clone());

    let out = mix_chunks(&engine, 8, 1);
    assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-6));

    engine.detach_audio_mixed_processor(&add);
    let out = mix_chunks(&engine, 8, 1);
    assert!(out.iter().all(|&s| s == 0.0));
}

#[test]
fn test_pitch_shortens_playback() {
    let engine = headless_engine(44100, 2);
    let sound = constant_sound(&engine, 0.5, 4410);
    engine.set_sound_pitch(&sound, 2.0);
    engine.play_sound(&sound);

    let mut chunks = 0;
    while engine.is_sound_playing(&sound) {
        mix_chunks(&engine, 441, 1);
        chunks += 1;
        assert!(chunks < 20);
    }
    // 4410 source frames at double speed last about 2205 output frames.
    assert!((5..=6).contains(&chunks), "{}", chunks);
}

#[test]
fn test_slowed_sound_plays_every_frame() {
    let engine = headless_engine(44100, 2);
    let sound = constant_sound(&engine, 0.5, 441);
    engine.set_sound_pitch(&sound, 0.5);
    engine.play_sound(&sound);

    let out = mix_chunks(&engine, 1024, 1);
    let level = 0.5 * 0.6875;
    let voiced = out
        .chunks_exact(2)
        .take_while(|frame| (frame[0] - level).abs() < 1e-6 && (frame[1] - level).abs() < 1e-6)
        .count();
    assert_eq!(voiced, 882);
    assert!(out[882 * 2..].iter().all(|&s| s == 0.0));
    assert!(!engine.is_sound_playing(&sound));
}

#[test]
fn test_paused_sound_is_not_mixed() {
    let engine = headless_engine(44100, 2);
    let sound = constant_sound(&engine, 0.5, 44100);
    engine.play_sound(&sound);
    engine.pause_sound(&sound);
    assert!(mix_chunks(&engine, 128, 1).iter().all(|&s| s == 0.0));

    engine.resume_sound(&sound);
    assert!(mix_chunks(&engine, 128, 1).iter().any(|&s| s != 0.0));
}
