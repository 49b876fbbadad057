//! The audio engine: buffer ownership, shared state and the public API
//!
//! One `AudioEngine` owns every buffer behind a single coarse mutex that the
//! mixer shares with all application-thread calls. Sounds, music and raw
//! streams are thin handle types; the operations on them are methods of the
//! engine (see `sound`, `music` and `stream`).

pub mod arena;
pub mod buffer;
pub mod mixer;
pub mod music;
pub mod processor;
pub mod sound;
pub mod stream;

use crate::audio::types::SampleFormat;
use crate::config::AudioConfig;
use crate::Result;
use arena::BufferArena;
use buffer::{valid_channels, AudioBuffer, BufferStatus, BufferUsage};
use processor::{ProcessorChain, ProcessorRef};
use sound::SoundPool;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

pub use arena::BufferHandle;

/// Everything the mixer and the API mutate, guarded by one mutex
pub(crate) struct EngineState {
    pub(crate) buffers: BufferArena,
    pub(crate) mixed_processors: ProcessorChain,
    pub(crate) master_volume: f32,
    pub(crate) sound_pool: SoundPool,
}

/// Audio mixing engine
///
/// Construct one per output device. It is `Send + Sync`; share it with the
/// device callback through an `Arc`.
pub struct AudioEngine {
    sample_rate: u32,
    channels: usize,
    /// Hardware period reported by the device, 0 when headless
    period_frames: AtomicU32,
    /// Default stream sub-buffer size, 0 = `sample_rate / 30`
    stream_buffer_frames: AtomicU32,
    state: Mutex<EngineState>,
}

impl AudioEngine {
    /// Create an engine mixing at the config's sample rate and channel count
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let config = config.clone().validated()?;

        info!(
            "Audio engine initialized: {} Hz, {} channels, f32 mixing",
            config.sample_rate, config.channels
        );

        Ok(Self {
            sample_rate: config.sample_rate,
            channels: config.channels as usize,
            period_frames: AtomicU32::new(0),
            stream_buffer_frames: AtomicU32::new(config.stream_buffer_frames),
            state: Mutex::new(EngineState {
                buffers: BufferArena::default(),
                mixed_processors: ProcessorChain::default(),
                master_volume: config.master_volume.clamp(0.0, 1.0),
                sound_pool: SoundPool::default(),
            }),
        })
    }

    /// True once the engine holds a usable mixing format
    pub fn is_ready(&self) -> bool {
        self.sample_rate > 0 && self.channels > 0
    }

    /// Mixing sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Mixing channel count
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Lock shared state, recovering from a poisoned mutex
    pub(crate) fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record the device's hardware period (used to size stream buffers)
    pub fn set_period_size(&self, frames: u32) {
        self.period_frames.store(frames, Ordering::Relaxed);
    }

    pub fn period_size(&self) -> u32 {
        self.period_frames.load(Ordering::Relaxed)
    }

    /// Default sub-buffer size for streams created from now on
    pub fn set_audio_stream_buffer_size_default(&self, frames: u32) {
        self.stream_buffer_frames.store(frames, Ordering::Relaxed);
    }

    /// Sub-buffer size a new stream gets
    pub(crate) fn stream_sub_buffer_frames(&self) -> usize {
        let configured = self.stream_buffer_frames.load(Ordering::Relaxed);
        let default_size = if configured == 0 {
            self.sample_rate / 30
        } else {
            configured
        };
        default_size.max(self.period_size()).max(1) as usize
    }

    /// Set the master volume (clamped to 0.0-1.0)
    pub fn set_master_volume(&self, volume: f32) {
        self.lock().master_volume = volume.clamp(0.0, 1.0);
    }

    pub fn master_volume(&self) -> f32 {
        self.lock().master_volume
    }

    /// Number of live buffers (sounds, aliases, streams)
    pub fn buffer_count(&self) -> usize {
        self.lock().buffers.len()
    }

    // ------------------------------------------------------------------
    // Buffer lifecycle
    // ------------------------------------------------------------------

    /// Create a buffer of silence and start tracking it
    ///
    /// Returns `None` (with a warning) for unsupported formats.
    pub fn create_buffer(
        &self,
        format: SampleFormat,
        channels: usize,
        sample_rate: u32,
        size_in_frames: usize,
        usage: BufferUsage,
    ) -> Option<BufferHandle> {
        if !valid_channels(channels) {
            warn!("Failed to create audio buffer: {} channels unsupported", channels);
            return None;
        }
        match AudioBuffer::new(
            format,
            channels,
            sample_rate,
            size_in_frames,
            usage,
            self.channels,
            self.sample_rate,
        ) {
            Ok(buffer) => Some(self.track(buffer)),
            Err(e) => {
                warn!("Failed to create audio buffer: {}", e);
                None
            }
        }
    }

    /// Insert an already-built buffer (allocation happens before locking)
    pub(crate) fn track(&self, buffer: AudioBuffer) -> BufferHandle {
        let handle = self.lock().buffers.insert(buffer);
        debug!("Tracking audio buffer {:?}", handle);
        handle
    }

    /// Stop tracking and free a buffer; shared sample data lives on in aliases
    pub fn destroy_buffer(&self, handle: BufferHandle) -> bool {
        let removed = self.lock().buffers.remove(handle);
        match removed {
            Some(buffer) => {
                // Freed here, after the lock is released.
                drop(buffer);
                debug!("Released audio buffer {:?}", handle);
                true
            }
            None => {
                warn!("Attempted to release an unknown audio buffer");
                false
            }
        }
    }

    /// Run `f` on a live buffer, warning when the handle is missing or stale
    pub(crate) fn with_buffer<R>(
        &self,
        handle: Option<BufferHandle>,
        what: &str,
        f: impl FnOnce(&mut AudioBuffer) -> R,
    ) -> Option<R> {
        let Some(handle) = handle else {
            warn!("{}: audio buffer not initialized", what);
            return None;
        };
        let mut state = self.lock();
        match state.buffers.get_mut(handle) {
            Some(buffer) => Some(f(buffer)),
            None => {
                warn!("{}: audio buffer handle is no longer valid", what);
                None
            }
        }
    }

    /// Read-only access without usage warnings (for predicates)
    pub(crate) fn query_buffer<R>(
        &self,
        handle: Option<BufferHandle>,
        f: impl FnOnce(&AudioBuffer) -> R,
    ) -> Option<R> {
        let handle = handle?;
        let state = self.lock();
        state.buffers.get(handle).map(f)
    }

    pub fn is_buffer_valid(&self, handle: BufferHandle) -> bool {
        self.lock().buffers.contains(handle)
    }

    /// Start from the first frame
    pub fn play_buffer(&self, handle: BufferHandle) {
        self.with_buffer(Some(handle), "PlayAudioBuffer", |b| b.play());
    }

    /// Stop and rewind; no effect unless playing and not paused
    pub fn stop_buffer(&self, handle: BufferHandle) {
        self.with_buffer(Some(handle), "StopAudioBuffer", |b| b.stop());
    }

    pub fn pause_buffer(&self, handle: BufferHandle) {
        self.with_buffer(Some(handle), "PauseAudioBuffer", |b| b.pause());
    }

    pub fn resume_buffer(&self, handle: BufferHandle) {
        self.with_buffer(Some(handle), "ResumeAudioBuffer", |b| b.resume());
    }

    /// Playing and not paused
    pub fn is_buffer_playing(&self, handle: BufferHandle) -> bool {
        self.query_buffer(Some(handle), |b| b.is_playing())
            .unwrap_or(false)
    }

    pub fn set_buffer_volume(&self, handle: BufferHandle, volume: f32) {
        self.with_buffer(Some(handle), "SetAudioBufferVolume", |b| b.set_volume(volume));
    }

    /// Pitch must be > 0; other values are ignored with a warning
    pub fn set_buffer_pitch(&self, handle: BufferHandle, pitch: f32) {
        if !(pitch > 0.0 && pitch.is_finite()) {
            warn!("SetAudioBufferPitch: pitch must be > 0, got {}", pitch);
            return;
        }
        self.with_buffer(Some(handle), "SetAudioBufferPitch", |b| b.set_pitch(pitch));
    }

    pub fn set_buffer_pan(&self, handle: BufferHandle, pan: f32) {
        self.with_buffer(Some(handle), "SetAudioBufferPan", |b| b.set_pan(pan));
    }

    pub fn set_buffer_looping(&self, handle: BufferHandle, looping: bool) {
        self.with_buffer(Some(handle), "SetAudioBufferLooping", |b| {
            b.set_looping(looping)
        });
    }

    /// Snapshot of a buffer's state
    pub fn buffer_status(&self, handle: BufferHandle) -> Option<BufferStatus> {
        self.query_buffer(Some(handle), |b| b.status())
    }

    /// Read native-format frames (normalised f32, native channels) directly
    ///
    /// `out` must hold `frame_count * channels` samples; shorter outputs are
    /// clamped. Returns frames produced as described for the buffer's usage.
    pub fn read_buffer_internal(
        &self,
        handle: BufferHandle,
        out: &mut [f32],
        frame_count: usize,
    ) -> usize {
        self.with_buffer(Some(handle), "ReadAudioBuffer", |b| {
            let frames = frame_count.min(out.len() / b.channels());
            b.read_internal(out, frames)
        })
        .unwrap_or(0)
    }

    /// Read frames already converted to the mixing format
    pub fn read_buffer_mixing(
        &self,
        handle: BufferHandle,
        out: &mut [f32],
        frame_count: usize,
    ) -> usize {
        self.with_buffer(Some(handle), "ReadAudioBufferMixing", |b| {
            b.read_mixing(out, frame_count)
        })
        .unwrap_or(0)
    }

    /// Input frames the buffer's converter needs for `output_frames` mixed frames
    pub fn buffer_required_input_frames(
        &self,
        handle: BufferHandle,
        output_frames: usize,
    ) -> Option<usize> {
        self.query_buffer(Some(handle), |b| b.required_input_frames(output_frames))
    }

    // ------------------------------------------------------------------
    // Processors
    // ------------------------------------------------------------------

    /// Append a processor to one buffer's pre-mix chain
    pub fn attach_buffer_processor(&self, handle: BufferHandle, processor: ProcessorRef) {
        self.with_buffer(Some(handle), "AttachAudioProcessor", |b| {
            b.processors.attach(processor)
        });
    }

    /// Remove every instance of `processor` from one buffer's chain
    pub fn detach_buffer_processor(&self, handle: BufferHandle, processor: &ProcessorRef) {
        self.with_buffer(Some(handle), "DetachAudioProcessor", |b| {
            b.processors.detach(processor)
        });
    }

    /// Append a processor to the global post-mix chain
    pub fn attach_audio_mixed_processor(&self, processor: ProcessorRef) {
        self.lock().mixed_processors.attach(processor);
    }

    /// Remove every instance of `processor` from the post-mix chain
    pub fn detach_audio_mixed_processor(&self, processor: &ProcessorRef) {
        self.lock().mixed_processors.detach(processor);
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let released = state.buffers.drain().len();
        state.mixed_processors = ProcessorChain::default();
        info!("Audio engine closed ({} buffers released)", released);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> AudioEngine {
        AudioEngine::new(&AudioConfig::headless(44100, 2)).unwrap()
    }

    #[test]
    fn test_engine_rejects_invalid_config() {
        assert!(AudioEngine::new(&AudioConfig::headless(0, 2)).is_err());
    }

    #[test]
    fn test_create_and_destroy() {
        let engine = engine();
        let handle = engine
            .create_buffer(SampleFormat::S16, 1, 22050, 128, BufferUsage::Static)
            .unwrap();
        assert_eq!(engine.buffer_count(), 1);
        assert!(engine.destroy_buffer(handle));
        assert!(!engine.destroy_buffer(handle));
        assert_eq!(engine.buffer_count(), 0);
    }

    #[test]
    fn test_invalid_channel_count() {
        let engine = engine();
        assert!(engine
            .create_buffer(SampleFormat::F32, 0, 44100, 16, BufferUsage::Static)
            .is_none());
        assert!(engine
            .create_buffer(SampleFormat::F32, 12, 44100, 16, BufferUsage::Static)
            .is_none());
    }

    #[test]
    fn test_stream_buffer_defaults() {
        let engine = engine();
        assert_eq!(engine.stream_sub_buffer_frames(), 1470);

        engine.set_period_size(2048);
        assert_eq!(engine.stream_sub_buffer_frames(), 2048);

        engine.set_audio_stream_buffer_size_default(4096);
        assert_eq!(engine.stream_sub_buffer_frames(), 4096);
    }

    #[test]
    fn test_master_volume_clamped() {
        let engine = engine();
        engine.set_master_volume(3.0);
        assert_eq!(engine.master_volume(), 1.0);
        engine.set_master_volume(-1.0);
        assert_eq!(engine.master_volume(), 0.0);
    }

    #[test]
    fn test_invalid_pitch_ignored() {
        let engine = engine();
        let handle = engine
            .create_buffer(SampleFormat::F32, 2, 44100, 16, BufferUsage::Static)
            .unwrap();
        engine.set_buffer_pitch(handle, 0.0);
        engine.set_buffer_pitch(handle, -2.0);
        assert_eq!(engine.buffer_status(handle).unwrap().pitch, 1.0);

        engine.set_buffer_pitch(handle, 1.5);
        assert_eq!(engine.buffer_status(handle).unwrap().pitch, 1.5);
    }

    #[test]
    fn test_stale_handle_operations_are_noops() {
        let engine = engine();
        let handle = engine
            .create_buffer(SampleFormat::F32, 2, 44100, 16, BufferUsage::Static)
            .unwrap();
        engine.destroy_buffer(handle);

        engine.play_buffer(handle);
        assert!(!engine.is_buffer_playing(handle));
        assert!(engine.buffer_status(handle).is_none());
        let mut out = [0.0f32; 8];
        assert_eq!(engine.read_buffer_internal(handle, &mut out, 4), 0);
    }
}
