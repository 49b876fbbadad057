//! Music: codec-backed streams refilled by the application
//!
//! A `Music` owns an open codec context and a STREAM buffer. Nothing decodes
//! in the background: the application calls `update_music_stream` once per
//! tick, which decodes into whichever halves the mixer has drained.

use super::buffer::valid_channels;
use super::processor::ProcessorRef;
use super::stream::AudioStream;
use super::AudioEngine;
use crate::audio::types::MAX_CHANNELS;
use crate::codec::{CodecKind, CodecStream, MusicContext};
use raudio_common::time::{frames_to_seconds, seconds_to_frames};
use std::path::Path;
use tracing::{debug, info, warn};

/// A streamed piece of music
#[derive(Debug, Default)]
pub struct Music {
    pub stream: AudioStream,
    /// Total frames in the decoded source
    pub frame_count: u64,
    /// Restart from the beginning when the source runs out
    pub looping: bool,
    ctx: Option<MusicContext>,
    /// One sub-buffer of decoded frames, reused across updates
    pcm: Vec<f32>,
}

impl Music {
    /// Codec behind this music, `None` once unloaded
    pub fn kind(&self) -> Option<CodecKind> {
        self.ctx.as_ref().map(|ctx| ctx.kind())
    }
}

impl AudioEngine {
    /// Open a music file for streaming
    ///
    /// Returns music that is not ready when the file cannot be opened.
    pub fn load_music_stream(&self, path: impl AsRef<Path>) -> Music {
        let path = path.as_ref();
        match MusicContext::open(path) {
            Ok(ctx) => {
                let music = self.music_from_context(ctx);
                if self.is_music_ready(&music) {
                    info!("MUSIC: Loaded {}", path.display());
                }
                music
            }
            Err(e) => {
                warn!("MUSIC: Failed to open {}: {}", path.display(), e);
                Music::default()
            }
        }
    }

    /// Stream music from an in-memory file of type `ext` (".ogg", "xm", ...)
    pub fn load_music_stream_from_memory(&self, ext: &str, bytes: Vec<u8>) -> Music {
        match MusicContext::open_memory(ext, bytes) {
            Ok(ctx) => self.music_from_context(ctx),
            Err(e) => {
                warn!("MUSIC: Failed to open {} data: {}", ext, e);
                Music::default()
            }
        }
    }

    fn music_from_context(&self, ctx: MusicContext) -> Music {
        let format = ctx.info();
        if format.total_frames == 0 {
            warn!("MUSIC: {:?} source holds no frames", ctx.kind());
            return Music::default();
        }
        if !valid_channels(format.channels) {
            warn!(
                "MUSIC: {:?} source has {} channels, at most {} are supported",
                ctx.kind(),
                format.channels,
                MAX_CHANNELS
            );
            return Music::default();
        }

        let stream = self.load_audio_stream(format.sample_rate, 32, format.channels);
        if !self.is_audio_stream_ready(&stream) {
            return Music::default();
        }

        info!(
            "MUSIC: {:?} stream ({} Hz, {} bit, {} ch, {:.2}s)",
            ctx.kind(),
            format.sample_rate,
            format.bits_per_sample,
            format.channels,
            frames_to_seconds(format.total_frames, format.sample_rate)
        );
        Music {
            stream,
            frame_count: format.total_frames,
            looping: true,
            ctx: Some(ctx),
            pcm: Vec::new(),
        }
    }

    pub fn is_music_ready(&self, music: &Music) -> bool {
        music.ctx.is_some() && music.frame_count > 0 && self.is_audio_stream_ready(&music.stream)
    }

    /// Free the stream buffer and close the codec
    pub fn unload_music_stream(&self, music: &mut Music) {
        self.unload_audio_stream(&mut music.stream);
        if music.ctx.take().is_some() {
            info!("MUSIC: Unloaded music stream");
        }
        music.frame_count = 0;
        music.pcm = Vec::new();
    }

    /// Start or restart the stream without moving the mixer cursor
    pub fn play_music_stream(&self, music: &Music) {
        self.with_buffer(music.stream.buffer, "PlayMusicStream", |b| {
            let cursor = b.frame_cursor_pos();
            b.play();
            b.set_frame_cursor_pos(cursor);
        });
    }

    pub fn pause_music_stream(&self, music: &Music) {
        self.pause_audio_stream(&music.stream);
    }

    pub fn resume_music_stream(&self, music: &Music) {
        self.resume_audio_stream(&music.stream);
    }

    /// Stop playback and rewind the decoder
    pub fn stop_music_stream(&self, music: &mut Music) {
        self.stop_audio_stream(&music.stream);
        if let Some(ctx) = music.ctx.as_mut() {
            ctx.seek_to_start();
        }
    }

    pub fn is_music_stream_playing(&self, music: &Music) -> bool {
        self.is_audio_stream_playing(&music.stream)
    }

    /// Decode into every drained half of the stream buffer
    ///
    /// Call once per application tick while the music plays.
    pub fn update_music_stream(&self, music: &mut Music) {
        let Some(handle) = music.stream.buffer else {
            return;
        };
        let Some((sub_frames, drained)) = self.query_buffer(Some(handle), |b| {
            let [first, second] = b.sub_buffer_processed();
            (b.sub_buffer_size(), first as usize + second as usize)
        }) else {
            return;
        };
        let Some(ctx) = music.ctx.as_mut() else {
            return;
        };

        let channels = music.stream.channels;
        let mut pcm = std::mem::take(&mut music.pcm);
        pcm.resize(sub_frames * channels, 0.0);

        let mut ending = false;
        for _ in 0..drained {
            let frames_processed = self
                .query_buffer(Some(handle), |b| b.frames_processed())
                .unwrap_or(0);
            let frames_left = music.frame_count.saturating_sub(frames_processed);
            let frames_to_stream = if music.looping {
                sub_frames
            } else {
                sub_frames.min(frames_left as usize)
            };

            // Decoding happens outside the engine lock.
            let mut filled = 0;
            let mut rewound = false;
            while filled < frames_to_stream {
                let got = ctx.decode_frames(&mut pcm[filled * channels..], frames_to_stream - filled);
                filled += got;
                if got > 0 {
                    rewound = false;
                    continue;
                }
                if !music.looping || rewound {
                    break;
                }
                ctx.seek_to_start();
                rewound = true;
            }

            let frame_count = music.frame_count;
            let refilled = self
                .with_buffer(Some(handle), "UpdateMusicStream", |b| {
                    let half = b.update_stream(&pcm[..filled * channels], filled);
                    b.set_frames_processed(b.frames_processed() % frame_count);
                    half
                })
                .flatten();
            if refilled.is_none() {
                break;
            }

            if !music.looping && frames_left <= sub_frames as u64 {
                ending = true;
                break;
            }
        }
        music.pcm = pcm;

        if ending {
            debug!("MUSIC: Reached end of stream");
            self.stop_music_stream(music);
        }
    }

    /// Jump to `seconds` from the start
    ///
    /// Module formats cannot seek and are left where they are.
    pub fn seek_music_stream(&self, music: &mut Music, seconds: f32) {
        let Some(ctx) = music.ctx.as_mut() else {
            warn!("SeekMusicStream: music not loaded");
            return;
        };
        let mut frame = seconds_to_frames(seconds, music.stream.sample_rate);
        if music.frame_count > 0 {
            frame = frame.min(music.frame_count - 1);
        }

        if let Err(e) = ctx.seek_to_frame(frame) {
            warn!("SeekMusicStream: {:?} cannot seek: {}", ctx.kind(), e);
            return;
        }
        self.with_buffer(music.stream.buffer, "SeekMusicStream", |b| {
            b.set_frames_processed(frame)
        });
        debug!("MUSIC: Seeked to frame {}", frame);
    }

    /// Total length in seconds
    pub fn music_time_length(&self, music: &Music) -> f32 {
        frames_to_seconds(music.frame_count, music.stream.sample_rate)
    }

    /// Seconds of the source the mixer has consumed, wrapping when looping
    pub fn music_time_played(&self, music: &Music) -> f32 {
        if music.frame_count == 0 || music.stream.sample_rate == 0 {
            return 0.0;
        }
        let frame_count = music.frame_count as i64;
        self.query_buffer(music.stream.buffer, |b| {
            let sub = b.sub_buffer_size() as i64;
            if sub == 0 {
                return 0.0;
            }
            let [first, second] = b.sub_buffer_processed();
            let queued = (!first as i64 + !second as i64) * sub;
            let sent_to_mix = b.frame_cursor_pos() as i64 % sub;
            let played = (b.frames_processed() as i64 - queued + sent_to_mix).rem_euclid(frame_count);
            frames_to_seconds(played as u64, music.stream.sample_rate)
        })
        .unwrap_or(0.0)
    }

    pub fn set_music_volume(&self, music: &Music, volume: f32) {
        self.set_audio_stream_volume(&music.stream, volume);
    }

    pub fn set_music_pitch(&self, music: &Music, pitch: f32) {
        self.set_audio_stream_pitch(&music.stream, pitch);
    }

    pub fn set_music_pan(&self, music: &Music, pan: f32) {
        self.set_audio_stream_pan(&music.stream, pan);
    }

    pub fn attach_music_processor(&self, music: &Music, processor: ProcessorRef) {
        self.attach_audio_stream_processor(&music.stream, processor);
    }

    pub fn detach_music_processor(&self, music: &Music, processor: &ProcessorRef) {
        self.detach_audio_stream_processor(&music.stream, processor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::qoa::tests::constant_qoa;
    use crate::codec::tracker::protracker::tests::tiny_mod;
    use crate::config::AudioConfig;

    fn engine() -> AudioEngine {
        AudioEngine::new(&AudioConfig::headless(44100, 2)).unwrap()
    }

    #[test]
    fn test_load_qoa_from_memory() {
        let engine = engine();
        let music = engine.load_music_stream_from_memory(".qoa", constant_qoa(1, 44100, 10000));
        assert!(engine.is_music_ready(&music));
        assert_eq!(music.kind(), Some(CodecKind::Qoa));
        assert_eq!(music.frame_count, 10000);
        assert!(music.looping);
        assert!((engine.music_time_length(&music) - 10000.0 / 44100.0).abs() < 1e-6);
    }

    #[test]
    fn test_too_many_channels_is_not_ready() {
        let spec = hound::WavSpec {
            channels: 10,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..10 * 100 {
                writer.write_sample(1000i16).unwrap();
            }
            writer.finalize().unwrap();
        }

        let engine = engine();
        let music = engine.load_music_stream_from_memory(".wav", cursor.into_inner());
        assert!(!engine.is_music_ready(&music));
        assert_eq!(engine.buffer_count(), 0);
    }

    #[test]
    fn test_bad_data_is_not_ready() {
        let engine = engine();
        let music = engine.load_music_stream_from_memory(".qoa", vec![0; 64]);
        assert!(!engine.is_music_ready(&music));
        let music = engine.load_music_stream_from_memory(".opus", vec![0; 64]);
        assert!(!engine.is_music_ready(&music));
        assert_eq!(engine.buffer_count(), 0);
    }

    #[test]
    fn test_first_update_fills_both_halves() {
        let engine = engine();
        let mut music = engine.load_music_stream_from_memory(".qoa", constant_qoa(1, 44100, 10000));
        engine.update_music_stream(&mut music);

        let status = engine.buffer_status(music.stream.handle().unwrap()).unwrap();
        assert_eq!(status.sub_buffer_processed, [false, false]);
        assert_eq!(status.frames_processed, 2 * 1470);
        assert_eq!(engine.music_time_played(&music), 0.0);
    }

    #[test]
    fn test_play_preserves_cursor() {
        let engine = engine();
        let mut music = engine.load_music_stream_from_memory(".qoa", constant_qoa(1, 44100, 10000));
        engine.update_music_stream(&mut music);
        engine.play_music_stream(&music);

        let mut out = vec![0.0; 200 * 2];
        engine.mix(&mut out);
        engine.pause_music_stream(&music);
        engine.play_music_stream(&music);
        let status = engine.buffer_status(music.stream.handle().unwrap()).unwrap();
        assert_eq!(status.frame_cursor_pos, 200);
    }

    #[test]
    fn test_seek_updates_position() {
        let engine = engine();
        let mut music = engine.load_music_stream_from_memory(".qoa", constant_qoa(1, 44100, 20000));
        engine.seek_music_stream(&mut music, 0.25);
        let status = engine.buffer_status(music.stream.handle().unwrap()).unwrap();
        assert_eq!(status.frames_processed, 11025);
    }

    #[test]
    fn test_module_cannot_seek() {
        let engine = engine();
        let mut music = engine.load_music_stream_from_memory(".mod", tiny_mod(4));
        assert!(engine.is_music_ready(&music));
        assert_eq!(music.stream.sample_rate, 48000);
        assert!((engine.music_time_length(&music) - 0.48).abs() < 1e-6);

        engine.seek_music_stream(&mut music, 0.1);
        let status = engine.buffer_status(music.stream.handle().unwrap()).unwrap();
        assert_eq!(status.frames_processed, 0);
    }

    #[test]
    fn test_unload() {
        let engine = engine();
        let mut music = engine.load_music_stream_from_memory(".mod", tiny_mod(4));
        engine.unload_music_stream(&mut music);
        assert!(!engine.is_music_ready(&music));
        assert_eq!(music.kind(), None);
        assert_eq!(engine.buffer_count(), 0);
    }
}
