//! Sounds: whole clips resident in the mixing format
//!
//! A sound's samples are converted to the device channel count and rate at
//! load time, so playback only applies pitch. Aliases share the sample data
//! through an `Arc` and keep their own play state. The multi-play pool holds
//! short-lived aliases for overlapping plays of one sound.

use super::buffer::{AudioBuffer, BufferUsage};
use super::processor::ProcessorRef;
use super::{AudioEngine, BufferHandle};
use crate::audio::resampler::Resampler;
use crate::audio::types::{map_channels, Sample, SampleData};
use crate::audio::wave::Wave;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Concurrent plays available to `play_sound_multi`
pub const MAX_SOUND_POOL: usize = 16;

/// Handle to a loaded sound or sound alias
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sound {
    pub(crate) buffer: Option<BufferHandle>,
    pub frame_count: usize,
    pub sample_rate: u32,
    pub sample_size: u32,
    pub channels: usize,
}

impl Sound {
    pub fn handle(&self) -> Option<BufferHandle> {
        self.buffer
    }
}

#[derive(Debug, Clone, Copy)]
struct PoolSlot {
    handle: BufferHandle,
    /// Pool play counter when the slot was filled
    started: u64,
}

/// Fixed set of alias buffers owned by the engine
#[derive(Debug, Default)]
pub(crate) struct SoundPool {
    slots: [Option<PoolSlot>; MAX_SOUND_POOL],
    plays: u64,
}

impl AudioEngine {
    /// Load a file and convert it into a sound
    ///
    /// Returns a sound that is not ready when the file cannot be decoded.
    pub fn load_sound(&self, path: impl AsRef<Path>) -> Sound {
        let path = path.as_ref();
        match Wave::load(path) {
            Ok(wave) => self.load_sound_from_wave(&wave),
            Err(e) => {
                warn!("SOUND: Failed to load {}: {}", path.display(), e);
                Sound::default()
            }
        }
    }

    /// Convert a wave into the mixing format and track it as a STATIC buffer
    pub fn load_sound_from_wave(&self, wave: &Wave) -> Sound {
        if !wave.is_ready() {
            warn!("SOUND: Wave holds no data");
            return Sound::default();
        }

        let channels = self.channels();
        let mapped = map_channels(&wave.samples(), wave.channels, channels);
        let samples = match Resampler::resample(
            &mapped,
            wave.sample_rate,
            self.sample_rate(),
            channels as u16,
        ) {
            Ok(samples) => samples,
            Err(e) => {
                warn!("SOUND: Failed to convert wave to mixing format: {}", e);
                return Sound::default();
            }
        };

        let frame_count = samples.len() / channels;
        if frame_count == 0 {
            warn!("SOUND: Wave converted to zero frames");
            return Sound::default();
        }

        let data = Arc::new(SampleData::F32(samples));
        let buffer = match AudioBuffer::with_data(
            data,
            channels,
            self.sample_rate(),
            BufferUsage::Static,
            channels,
            self.sample_rate(),
        ) {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!("SOUND: Failed to create audio buffer: {}", e);
                return Sound::default();
            }
        };

        let handle = self.track(buffer);
        info!(
            "SOUND: Loaded {} frames ({} Hz, {} ch source)",
            frame_count, wave.sample_rate, wave.channels
        );
        Sound {
            buffer: Some(handle),
            frame_count,
            sample_rate: self.sample_rate(),
            sample_size: 32,
            channels,
        }
    }

    /// New sound sharing `source`'s samples with independent play state
    pub fn load_sound_alias(&self, source: &Sound) -> Sound {
        let Some(alias) = self.build_alias(source) else {
            warn!("SOUND: Cannot alias a sound that is not loaded");
            return Sound::default();
        };
        let handle = self.track(alias);
        debug!("SOUND: Alias {:?} created", handle);
        Sound {
            buffer: Some(handle),
            ..*source
        }
    }

    /// Unshared copy of the source buffer's settings over the same data
    fn build_alias(&self, source: &Sound) -> Option<AudioBuffer> {
        let (data, channels, sample_rate, volume, pitch, pan) = self.query_buffer(source.buffer, |b| {
            (
                Arc::clone(b.data()),
                b.channels(),
                b.sample_rate(),
                b.volume(),
                b.pitch(),
                b.pan(),
            )
        })?;

        let mut alias = AudioBuffer::with_data(
            data,
            channels,
            sample_rate,
            BufferUsage::Static,
            self.channels(),
            self.sample_rate(),
        )
        .ok()?;
        alias.set_volume(volume);
        alias.set_pitch(pitch);
        alias.set_pan(pan);
        Some(alias)
    }

    pub fn is_sound_ready(&self, sound: &Sound) -> bool {
        sound.frame_count > 0
            && sound.sample_rate > 0
            && sound.channels > 0
            && sound.buffer.is_some_and(|h| self.is_buffer_valid(h))
    }

    pub fn unload_sound(&self, sound: &mut Sound) {
        if let Some(handle) = sound.buffer.take() {
            self.destroy_buffer(handle);
            info!("SOUND: Unloaded sound data from RAM");
        }
    }

    /// Release an alias; the samples stay alive while any other sound uses them
    pub fn unload_sound_alias(&self, alias: &mut Sound) {
        if let Some(handle) = alias.buffer.take() {
            self.destroy_buffer(handle);
            debug!("SOUND: Alias {:?} released", handle);
        }
    }

    /// Stop the sound and overwrite its samples from the first frame
    ///
    /// `data` is in the sound's own channel layout. Aliases created earlier
    /// keep the samples they had.
    pub fn update_sound<T: Sample>(&self, sound: &Sound, data: &[T], frame_count: usize) {
        self.with_buffer(sound.buffer, "UpdateSound", |b| {
            b.stop();
            b.update_static(data, frame_count)
        });
    }

    pub fn play_sound(&self, sound: &Sound) {
        self.with_buffer(sound.buffer, "PlaySound", |b| b.play());
    }

    pub fn stop_sound(&self, sound: &Sound) {
        self.with_buffer(sound.buffer, "StopSound", |b| b.stop());
    }

    pub fn pause_sound(&self, sound: &Sound) {
        self.with_buffer(sound.buffer, "PauseSound", |b| b.pause());
    }

    pub fn resume_sound(&self, sound: &Sound) {
        self.with_buffer(sound.buffer, "ResumeSound", |b| b.resume());
    }

    pub fn is_sound_playing(&self, sound: &Sound) -> bool {
        self.query_buffer(sound.buffer, |b| b.is_playing())
            .unwrap_or(false)
    }

    pub fn set_sound_volume(&self, sound: &Sound, volume: f32) {
        self.with_buffer(sound.buffer, "SetSoundVolume", |b| b.set_volume(volume));
    }

    pub fn set_sound_pitch(&self, sound: &Sound, pitch: f32) {
        if let Some(handle) = sound.buffer {
            self.set_buffer_pitch(handle, pitch);
        }
    }

    pub fn set_sound_pan(&self, sound: &Sound, pan: f32) {
        self.with_buffer(sound.buffer, "SetSoundPan", |b| b.set_pan(pan));
    }

    pub fn set_sound_looping(&self, sound: &Sound, looping: bool) {
        self.with_buffer(sound.buffer, "SetSoundLooping", |b| b.set_looping(looping));
    }

    pub fn attach_sound_processor(&self, sound: &Sound, processor: ProcessorRef) {
        if let Some(handle) = sound.buffer {
            self.attach_buffer_processor(handle, processor);
        }
    }

    pub fn detach_sound_processor(&self, sound: &Sound, processor: &ProcessorRef) {
        if let Some(handle) = sound.buffer {
            self.detach_buffer_processor(handle, processor);
        }
    }

    // ------------------------------------------------------------------
    // Multi-play pool
    // ------------------------------------------------------------------

    /// Play an extra, overlapping instance of `sound`
    ///
    /// Takes the first pool slot that is not playing. When all slots are
    /// busy the instance started longest ago is cut off.
    pub fn play_sound_multi(&self, sound: &Sound) {
        let Some(mut alias) = self.build_alias(sound) else {
            warn!("SOUND: Cannot play a sound that is not loaded");
            return;
        };
        alias.play();

        let evicted = {
            let mut state = self.lock();
            let state = &mut *state;
            let pool = &mut state.sound_pool;

            let idle = pool.slots.iter().position(|slot| match slot {
                None => true,
                Some(slot) => state
                    .buffers
                    .get(slot.handle)
                    .map_or(true, |b| !b.is_playing()),
            });
            let index = idle.unwrap_or_else(|| {
                pool.slots
                    .iter()
                    .enumerate()
                    .min_by_key(|&(_, slot)| slot.map_or(0, |s| s.started))
                    .map(|(i, _)| i)
                    .unwrap_or(0)
            });
            if idle.is_none() {
                debug!("SOUND: Pool full, evicting slot {}", index);
            }

            let evicted = pool.slots[index]
                .take()
                .and_then(|slot| state.buffers.remove(slot.handle));
            let handle = state.buffers.insert(alias);
            pool.slots[index] = Some(PoolSlot {
                handle,
                started: pool.plays,
            });
            pool.plays += 1;
            evicted
        };
        drop(evicted);
    }

    /// Stop and release every pooled instance
    pub fn stop_sound_multi(&self) {
        let released: Vec<AudioBuffer> = {
            let mut state = self.lock();
            let state = &mut *state;
            state
                .sound_pool
                .slots
                .iter_mut()
                .filter_map(|slot| slot.take())
                .filter_map(|slot| state.buffers.remove(slot.handle))
                .collect()
        };
        debug!("SOUND: Released {} pooled instances", released.len());
    }

    /// Pooled instances currently playing
    pub fn sounds_playing(&self) -> usize {
        let state = self.lock();
        state
            .sound_pool
            .slots
            .iter()
            .flatten()
            .filter(|slot| {
                state
                    .buffers
                    .get(slot.handle)
                    .is_some_and(|b| b.is_playing())
            })
            .count()
    }
}
