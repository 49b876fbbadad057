//! Music streaming: the update pump, looping, position and seeking

mod helpers;

use helpers::{headless_engine, mix_chunks, sine_fixture, sine_wav_bytes};
use raudio::codec::CodecKind;

const SUB: u64 = 1470;

#[test]
fn test_load_wav_music() {
    let engine = headless_engine(44100, 2);
    let (_dir, path) = sine_fixture("song.wav", 44100, 44100);
    let music = engine.load_music_stream(&path);

    assert!(engine.is_music_ready(&music));
    assert_eq!(music.kind(), Some(CodecKind::Wav));
    assert_eq!(music.frame_count, 44100);
    assert_eq!(music.stream.channels, 1);
    assert!(music.looping);
    assert!((engine.music_time_length(&music) - 1.0).abs() < 1e-6);
}

#[test]
fn test_missing_file_is_not_ready() {
    let engine = headless_engine(44100, 2);
    let music = engine.load_music_stream("nowhere/song.ogg");
    assert!(!engine.is_music_ready(&music));
    assert_eq!(engine.buffer_count(), 0);
    // Calls on unready music are no-ops.
    engine.play_music_stream(&music);
    assert!(!engine.is_music_stream_playing(&music));
}

#[test]
fn test_non_looping_music_stops_at_end() {
    let engine = headless_engine(44100, 2);
    let mut music =
        engine.load_music_stream_from_memory(".wav", sine_wav_bytes(44100, 1, 44100, 440.0, 0.5));
    music.looping = false;
    engine.update_music_stream(&mut music);
    engine.play_music_stream(&music);

    let mut ticks = 0;
    while engine.is_music_stream_playing(&music) {
        mix_chunks(&engine, 512, 1);
        engine.update_music_stream(&mut music);
        ticks += 1;
        assert!(ticks < 200, "music never stopped");
    }
    // The last refill lands a little before the source runs out.
    assert!(ticks >= 75, "{}", ticks);

    let status = engine.buffer_status(music.stream.handle().unwrap()).unwrap();
    assert_eq!(status.frames_processed, 0);
    assert_eq!(status.sub_buffer_processed, [true, true]);
}

#[test]
fn test_looping_music_wraps_position() {
    let engine = headless_engine(44100, 2);
    let mut music =
        engine.load_music_stream_from_memory(".wav", sine_wav_bytes(44100, 1, 10000, 440.0, 0.5));
    engine.update_music_stream(&mut music);
    engine.play_music_stream(&music);

    let length = engine.music_time_length(&music);
    for _ in 0..100 {
        mix_chunks(&engine, 512, 1);
        engine.update_music_stream(&mut music);
        let played = engine.music_time_played(&music);
        assert!((0.0..length).contains(&played), "{}", played);

        let status = engine.buffer_status(music.stream.handle().unwrap()).unwrap();
        assert!(status.frames_processed < music.frame_count);
    }
    assert!(engine.is_music_stream_playing(&music));
}

#[test]
fn test_time_played_tracks_the_mixer() {
    let engine = headless_engine(44100, 2);
    let mut music =
        engine.load_music_stream_from_memory(".wav", sine_wav_bytes(44100, 1, 44100, 440.0, 0.5));
    engine.update_music_stream(&mut music);
    engine.play_music_stream(&music);
    assert_eq!(engine.music_time_played(&music), 0.0);

    mix_chunks(&engine, 1000, 1);
    let played = engine.music_time_played(&music);
    assert!((played - 1000.0 / 44100.0).abs() < 1e-6, "{}", played);

    // Draining half 0 and refilling it keeps the arithmetic consistent.
    mix_chunks(&engine, 470, 1);
    engine.update_music_stream(&mut music);
    let played = engine.music_time_played(&music);
    assert!((played - SUB as f32 / 44100.0).abs() < 1e-6, "{}", played);
}

#[test]
fn test_stop_rewinds_decoder() {
    let engine = headless_engine(44100, 2);
    let mut music =
        engine.load_music_stream_from_memory(".wav", sine_wav_bytes(44100, 1, 44100, 440.0, 0.5));
    engine.update_music_stream(&mut music);
    engine.play_music_stream(&music);
    for _ in 0..10 {
        mix_chunks(&engine, 512, 1);
        engine.update_music_stream(&mut music);
    }

    engine.stop_music_stream(&mut music);
    assert!(!engine.is_music_stream_playing(&music));
    assert_eq!(engine.music_time_played(&music), 0.0);

    engine.update_music_stream(&mut music);
    let status = engine.buffer_status(music.stream.handle().unwrap()).unwrap();
    assert_eq!(status.frames_processed, 2 * SUB);
}

#[test]
fn test_seek_sets_position() {
    let engine = headless_engine(44100, 2);
    let mut music =
        engine.load_music_stream_from_memory(".wav", sine_wav_bytes(44100, 1, 44100, 440.0, 0.5));
    engine.seek_music_stream(&mut music, 0.5);

    let status = engine.buffer_status(music.stream.handle().unwrap()).unwrap();
    assert_eq!(status.frames_processed, 22050);
    let played = engine.music_time_played(&music);
    assert!((played - 0.5).abs() < 1e-6, "{}", played);
}

#[test]
fn test_music_setters_reach_the_stream() {
    let engine = headless_engine(44100, 2);
    let music =
        engine.load_music_stream_from_memory(".wav", sine_wav_bytes(44100, 2, 4410, 440.0, 0.5));
    engine.set_music_volume(&music, 0.4);
    engine.set_music_pan(&music, 0.25);
    engine.set_music_pitch(&music, 1.5);

    let status = engine.buffer_status(music.stream.handle().unwrap()).unwrap();
    assert_eq!(status.volume, 0.4);
    assert_eq!(status.pan, 0.25);
    assert_eq!(status.pitch, 1.5);
    assert!(status.looping);
}

#[test]
fn test_unload_music() {
    let engine = headless_engine(44100, 2);
    let mut music =
        engine.load_music_stream_from_memory(".wav", sine_wav_bytes(44100, 1, 4410, 440.0, 0.5));
    engine.unload_music_stream(&mut music);
    assert!(!engine.is_music_ready(&music));
    assert_eq!(engine.buffer_count(), 0);
    // Pumping unloaded music does nothing.
    engine.update_music_stream(&mut music);
}
