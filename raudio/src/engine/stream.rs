//! Raw PCM streams pushed by the application

use super::buffer::{valid_channels, AudioBuffer, BufferUsage, StreamCallback};
use super::processor::ProcessorRef;
use super::{AudioEngine, BufferHandle};
use crate::audio::types::{Sample, SampleFormat};
use tracing::{info, warn};

/// Handle to a STREAM buffer fed by `update_audio_stream`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioStream {
    pub(crate) buffer: Option<BufferHandle>,
    /// Frequency (samples per second)
    pub sample_rate: u32,
    /// Bit depth: 8, 16 or 32 (float)
    pub sample_size: u32,
    pub channels: usize,
}

impl AudioStream {
    pub fn handle(&self) -> Option<BufferHandle> {
        self.buffer
    }
}

impl AudioEngine {
    /// Create a stream whose halves hold one sub-buffer each
    ///
    /// Sub-buffers are at least one device period long. Returns a stream
    /// that is not ready when the format is unsupported.
    pub fn load_audio_stream(&self, sample_rate: u32, sample_size: u32, channels: usize) -> AudioStream {
        let Some(format) = SampleFormat::from_sample_size(sample_size) else {
            warn!("STREAM: Unsupported sample size {} bits", sample_size);
            return AudioStream::default();
        };
        if sample_rate == 0 {
            warn!("STREAM: Sample rate must be > 0");
            return AudioStream::default();
        }
        let channels = if valid_channels(channels) {
            channels
        } else {
            warn!("STREAM: Unsupported channel count {}, using mono", channels);
            1
        };

        let sub_buffer_frames = self.stream_sub_buffer_frames();
        let mut buffer = match AudioBuffer::new(
            format,
            channels,
            sample_rate,
            sub_buffer_frames * 2,
            BufferUsage::Stream,
            self.channels(),
            self.sample_rate(),
        ) {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!("STREAM: Failed to create audio buffer: {}", e);
                return AudioStream::default();
            }
        };

        buffer.set_looping(true);
        let handle = self.track(buffer);

        info!(
            "STREAM: Initialized audio stream ({} Hz, {} bit, {} ch, {} frame sub-buffers)",
            sample_rate, sample_size, channels, sub_buffer_frames
        );
        AudioStream {
            buffer: Some(handle),
            sample_rate,
            sample_size,
            channels,
        }
    }

    pub fn is_audio_stream_ready(&self, stream: &AudioStream) -> bool {
        stream.buffer.is_some_and(|handle| self.is_buffer_valid(handle))
    }

    /// Stop tracking the stream and free its buffer
    pub fn unload_audio_stream(&self, stream: &mut AudioStream) {
        if let Some(handle) = stream.buffer.take() {
            self.destroy_buffer(handle);
            info!("STREAM: Unloaded audio stream data from RAM");
        }
    }

    /// Push up to one sub-buffer of frames into whichever half was drained
    ///
    /// Samples are converted to the stream's own format on the way in.
    pub fn update_audio_stream<T: Sample>(&self, stream: &AudioStream, data: &[T], frame_count: usize) {
        self.with_buffer(stream.buffer, "UpdateAudioStream", |b| {
            b.update_stream(data, frame_count)
        });
    }

    /// True when at least one half is waiting to be refilled
    pub fn is_audio_stream_processed(&self, stream: &AudioStream) -> bool {
        self.query_buffer(stream.buffer, |b| {
            let [first, second] = b.sub_buffer_processed();
            first || second
        })
        .unwrap_or(false)
    }

    pub fn play_audio_stream(&self, stream: &AudioStream) {
        self.with_buffer(stream.buffer, "PlayAudioStream", |b| b.play());
    }

    pub fn pause_audio_stream(&self, stream: &AudioStream) {
        self.with_buffer(stream.buffer, "PauseAudioStream", |b| b.pause());
    }

    pub fn resume_audio_stream(&self, stream: &AudioStream) {
        self.with_buffer(stream.buffer, "ResumeAudioStream", |b| b.resume());
    }

    pub fn is_audio_stream_playing(&self, stream: &AudioStream) -> bool {
        self.query_buffer(stream.buffer, |b| b.is_playing())
            .unwrap_or(false)
    }

    pub fn stop_audio_stream(&self, stream: &AudioStream) {
        self.with_buffer(stream.buffer, "StopAudioStream", |b| b.stop());
    }

    pub fn set_audio_stream_volume(&self, stream: &AudioStream, volume: f32) {
        self.with_buffer(stream.buffer, "SetAudioStreamVolume", |b| b.set_volume(volume));
    }

    pub fn set_audio_stream_pitch(&self, stream: &AudioStream, pitch: f32) {
        if let Some(handle) = stream.buffer {
            self.set_buffer_pitch(handle, pitch);
        }
    }

    pub fn set_audio_stream_pan(&self, stream: &AudioStream, pan: f32) {
        self.with_buffer(stream.buffer, "SetAudioStreamPan", |b| b.set_pan(pan));
    }

    /// Pull frames from `callback` instead of the double buffer
    pub fn set_audio_stream_callback(&self, stream: &AudioStream, callback: Option<StreamCallback>) {
        self.with_buffer(stream.buffer, "SetAudioStreamCallback", |b| {
            b.set_callback(callback)
        });
    }

    pub fn attach_audio_stream_processor(&self, stream: &AudioStream, processor: ProcessorRef) {
        if let Some(handle) = stream.buffer {
            self.attach_buffer_processor(handle, processor);
        }
    }

    pub fn detach_audio_stream_processor(&self, stream: &AudioStream, processor: &ProcessorRef) {
        if let Some(handle) = stream.buffer {
            self.detach_buffer_processor(handle, processor);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::AudioConfig;
    use crate::engine::AudioEngine;

    #[test]
    fn test_stream_sub_buffer_uses_default_size() {
        let engine = AudioEngine::new(&AudioConfig::headless(48000, 2)).unwrap();
        let stream = engine.load_audio_stream(48000, 16, 2);
        assert!(engine.is_audio_stream_ready(&stream));

        let status = engine.buffer_status(stream.handle().unwrap()).unwrap();
        assert_eq!(status.size_in_frames, 3200);
        assert!(status.looping);
        assert_eq!(status.sub_buffer_processed, [true, true]);
    }

    #[test]
    fn test_invalid_channels_fall_back_to_mono() {
        let engine = AudioEngine::new(&AudioConfig::headless(44100, 2)).unwrap();
        let stream = engine.load_audio_stream(22050, 32, 0);
        assert_eq!(stream.channels, 1);
        assert!(engine.is_audio_stream_ready(&stream));
    }

    #[test]
    fn test_unsupported_sample_size() {
        let engine = AudioEngine::new(&AudioConfig::headless(44100, 2)).unwrap();
        let stream = engine.load_audio_stream(44100, 24, 2);
        assert!(!engine.is_audio_stream_ready(&stream));
        // Calls on a stream that never loaded are no-ops.
        engine.play_audio_stream(&stream);
        assert!(!engine.is_audio_stream_playing(&stream));
    }

    #[test]
    fn test_unload_invalidates() {
        let engine = AudioEngine::new(&AudioConfig::headless(44100, 2)).unwrap();
        let mut stream = engine.load_audio_stream(44100, 16, 1);
        engine.unload_audio_stream(&mut stream);
        assert!(!engine.is_audio_stream_ready(&stream));
        assert_eq!(engine.buffer_count(), 0);
    }
}
