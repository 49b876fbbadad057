//! Audio buffers: the playable unit tracked by the engine
//!
//! A buffer holds native-format samples plus play state. STATIC buffers are a
//! single block read start to end; STREAM buffers are a double buffer whose
//! halves are refilled by the application thread and drained by the mixer.

use super::processor::ProcessorChain;
use crate::audio::converter::FormatConverter;
use crate::audio::types::{Sample, SampleData, SampleFormat, MAX_CHANNELS};
use crate::Result;
use std::sync::Arc;
use tracing::warn;

/// Input scratch for one converter pull: 4096 bytes of f32 samples
const INPUT_SCRATCH_SAMPLES: usize = 1024;

/// How a buffer's data is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Whole sound resident, read once per play (or looped)
    Static,
    /// Double buffer refilled by `update_audio_stream`
    Stream,
}

/// Pull callback for streams: fill `frames` (native channel count, normalised
/// f32) with `frame_count` frames
pub type StreamCallback = Box<dyn FnMut(&mut [f32], usize) + Send>;

/// Point-in-time copy of a buffer's state
#[derive(Debug, Clone, PartialEq)]
pub struct BufferStatus {
    pub usage: BufferUsage,
    pub format: SampleFormat,
    pub channels: usize,
    pub sample_rate: u32,
    pub size_in_frames: usize,
    pub playing: bool,
    pub paused: bool,
    pub looping: bool,
    pub volume: f32,
    pub pitch: f32,
    pub pan: f32,
    pub frame_cursor_pos: usize,
    pub frames_processed: u64,
    pub sub_buffer_processed: [bool; 2],
    pub has_callback: bool,
    pub processor_count: usize,
}

/// Sample storage plus the read cursor and play flags
struct FrameSource {
    data: Arc<SampleData>,
    channels: usize,
    size_in_frames: usize,
    usage: BufferUsage,
    playing: bool,
    paused: bool,
    looping: bool,
    sub_buffer_processed: [bool; 2],
    frame_cursor_pos: usize,
    frames_processed: u64,
    callback: Option<StreamCallback>,
}

impl FrameSource {
    fn sub_buffer_size(&self) -> usize {
        match self.usage {
            BufferUsage::Static => self.size_in_frames,
            BufferUsage::Stream => self.size_in_frames / 2,
        }
    }

    fn is_playing(&self) -> bool {
        self.playing && !self.paused
    }

    fn stop(&mut self) {
        if !self.is_playing() {
            return;
        }
        self.playing = false;
        self.paused = false;
        self.frame_cursor_pos = 0;
        self.frames_processed = 0;
        self.sub_buffer_processed = [true, true];
    }

    /// Next `frame_count` native frames into `out`, zero-padding any shortfall
    fn read(&mut self, out: &mut [f32], frame_count: usize) -> usize {
        let ch = self.channels;
        let out = &mut out[..frame_count * ch];

        if let Some(callback) = self.callback.as_mut() {
            callback(out, frame_count);
            self.frames_processed += frame_count as u64;
            return frame_count;
        }

        let is_stream = self.usage == BufferUsage::Stream;
        let sub_size = self.sub_buffer_size();
        if !self.playing || sub_size == 0 {
            out.fill(0.0);
            return if is_stream { frame_count } else { 0 };
        }

        let mut current = self.frame_cursor_pos / sub_size;
        if current > 1 {
            out.fill(0.0);
            return 0;
        }

        // Snapshot: a half drained during this call must not be read again in it.
        let mut processed = self.sub_buffer_processed;
        let mut frames_read = 0;
        loop {
            if is_stream {
                if processed[current] {
                    break;
                }
            } else if frames_read >= frame_count {
                break;
            }

            let wanted = frame_count - frames_read;
            if wanted == 0 {
                break;
            }

            let available = if is_stream {
                sub_size * (current + 1) - self.frame_cursor_pos
            } else {
                self.size_in_frames - self.frame_cursor_pos
            };
            let n = wanted.min(available);

            self.data.read_f32(
                self.frame_cursor_pos * ch,
                &mut out[frames_read * ch..(frames_read + n) * ch],
            );
            self.frame_cursor_pos = (self.frame_cursor_pos + n) % self.size_in_frames;
            frames_read += n;

            if n == available {
                if is_stream {
                    self.sub_buffer_processed[current] = true;
                    processed[current] = true;
                    current = (current + 1) % 2;
                }
                if !self.looping {
                    self.stop();
                    break;
                }
            }
        }

        out[frames_read * ch..].fill(0.0);
        if is_stream {
            frame_count
        } else {
            frames_read
        }
    }
}

/// A playable buffer with its converter and processor chain
pub(crate) struct AudioBuffer {
    source: FrameSource,
    converter: FormatConverter,
    pub(crate) processors: ProcessorChain,
    sample_rate: u32,
    device_sample_rate: u32,
    volume: f32,
    pitch: f32,
    pan: f32,
}

impl AudioBuffer {
    /// Buffer of `size_in_frames` frames of silence
    ///
    /// STREAM sizes are rounded up to an even count so both halves match.
    pub(crate) fn new(
        format: SampleFormat,
        channels: usize,
        sample_rate: u32,
        size_in_frames: usize,
        usage: BufferUsage,
        device_channels: usize,
        device_sample_rate: u32,
    ) -> Result<Self> {
        let size_in_frames = match usage {
            BufferUsage::Stream => size_in_frames + size_in_frames % 2,
            BufferUsage::Static => size_in_frames,
        };
        let data = Arc::new(SampleData::silence(format, size_in_frames * channels));
        Self::with_data(
            data,
            channels,
            sample_rate,
            usage,
            device_channels,
            device_sample_rate,
        )
    }

    /// Buffer over existing (possibly shared) sample data
    pub(crate) fn with_data(
        data: Arc<SampleData>,
        channels: usize,
        sample_rate: u32,
        usage: BufferUsage,
        device_channels: usize,
        device_sample_rate: u32,
    ) -> Result<Self> {
        let converter =
            FormatConverter::new(channels, sample_rate, device_channels, device_sample_rate)?;
        let size_in_frames = data.len() / channels;

        Ok(Self {
            source: FrameSource {
                data,
                channels,
                size_in_frames,
                usage,
                playing: false,
                paused: false,
                looping: false,
                sub_buffer_processed: [true, true],
                frame_cursor_pos: 0,
                frames_processed: 0,
                callback: None,
            },
            converter,
            processors: ProcessorChain::default(),
            sample_rate,
            device_sample_rate,
            volume: 1.0,
            pitch: 1.0,
            pan: 0.5,
        })
    }

    pub(crate) fn data(&self) -> &Arc<SampleData> {
        &self.source.data
    }

    pub(crate) fn format(&self) -> SampleFormat {
        self.source.data.format()
    }

    pub(crate) fn channels(&self) -> usize {
        self.source.channels
    }

    pub(crate) fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub(crate) fn usage(&self) -> BufferUsage {
        self.source.usage
    }

    pub(crate) fn size_in_frames(&self) -> usize {
        self.source.size_in_frames
    }

    pub(crate) fn sub_buffer_size(&self) -> usize {
        self.source.sub_buffer_size()
    }

    pub(crate) fn volume(&self) -> f32 {
        self.volume
    }

    pub(crate) fn pan(&self) -> f32 {
        self.pan
    }

    pub(crate) fn is_playing(&self) -> bool {
        self.source.is_playing()
    }

    pub(crate) fn is_active(&self) -> bool {
        self.source.playing
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.source.paused
    }

    pub(crate) fn is_looping(&self) -> bool {
        self.source.looping
    }

    pub(crate) fn frame_cursor_pos(&self) -> usize {
        self.source.frame_cursor_pos
    }

    pub(crate) fn frames_processed(&self) -> u64 {
        self.source.frames_processed
    }

    pub(crate) fn sub_buffer_processed(&self) -> [bool; 2] {
        self.source.sub_buffer_processed
    }

    pub(crate) fn set_frames_processed(&mut self, frames: u64) {
        self.source.frames_processed = frames;
    }

    pub(crate) fn set_frame_cursor_pos(&mut self, pos: usize) {
        if self.source.size_in_frames > 0 {
            self.source.frame_cursor_pos = pos % self.source.size_in_frames;
        }
    }

    /// Swap in shared data (aliases); the frame count follows the new data
    pub(crate) fn attach_data(&mut self, data: Arc<SampleData>) {
        self.source.size_in_frames = data.len() / self.source.channels;
        self.source.data = data;
        self.source.frame_cursor_pos = 0;
    }

    /// Restart from the first frame
    pub(crate) fn play(&mut self) {
        self.source.playing = true;
        self.source.paused = false;
        self.source.frame_cursor_pos = 0;
        self.converter.reset();
    }

    pub(crate) fn stop(&mut self) {
        self.source.stop();
    }

    pub(crate) fn pause(&mut self) {
        self.source.paused = true;
    }

    pub(crate) fn resume(&mut self) {
        self.source.paused = false;
    }

    pub(crate) fn set_looping(&mut self, looping: bool) {
        self.source.looping = looping;
    }

    /// Negative volumes are treated as silence; no upper bound
    pub(crate) fn set_volume(&mut self, volume: f32) {
        self.volume = volume.max(0.0);
    }

    /// Caller guarantees `pitch > 0`
    pub(crate) fn set_pitch(&mut self, pitch: f32) {
        let output_rate = self.device_sample_rate as f64 / pitch as f64;
        self.converter.set_output_rate(output_rate);
        self.pitch = pitch;
    }

    pub(crate) fn set_pan(&mut self, pan: f32) {
        self.pan = pan.clamp(0.0, 1.0);
    }

    pub(crate) fn set_callback(&mut self, callback: Option<StreamCallback>) {
        self.source.callback = callback;
    }

    pub(crate) fn pitch(&self) -> f32 {
        self.pitch
    }

    pub(crate) fn required_input_frames(&self, output_frames: usize) -> usize {
        self.converter.required_input_frames(output_frames)
    }

    /// Native-format read (no conversion)
    pub(crate) fn read_internal(&mut self, out: &mut [f32], frame_count: usize) -> usize {
        self.source.read(out, frame_count)
    }

    /// Read `frame_count` frames in the mixing format
    pub(crate) fn read_mixing(&mut self, out: &mut [f32], frame_count: usize) -> usize {
        let mut scratch = [0.0f32; INPUT_SCRATCH_SAMPLES];
        let channels_in = self.converter.channels_in();
        let channels_out = self.converter.channels_out();
        let input_cap = INPUT_SCRATCH_SAMPLES / channels_in;
        let frame_count = frame_count.min(out.len() / channels_out);

        let mut total = 0;
        let mut exhausted = false;
        while total < frame_count {
            let out_needed = frame_count - total;
            let in_needed = self.converter.required_input_frames(out_needed).min(input_cap);

            let in_read = self.source.read(&mut scratch, in_needed);
            let (in_used, out_made) = self.converter.process(
                &scratch,
                in_read,
                &mut out[total * channels_out..],
                out_needed,
            );
            total += out_made;

            if in_read < in_needed {
                exhausted = true;
                break;
            }
            if in_used == 0 && out_made == 0 {
                break;
            }
        }

        if total < frame_count {
            if exhausted {
                total += self
                    .converter
                    .flush(&mut out[total * channels_out..], frame_count - total);
            }
            out[total * channels_out..frame_count * channels_out].fill(0.0);
        }
        total
    }

    /// Refill whichever half the mixer has drained
    ///
    /// Returns the index of the refilled half, or `None` when neither half
    /// was available.
    pub(crate) fn update_stream<T: Sample>(
        &mut self,
        data: &[T],
        frame_count: usize,
    ) -> Option<usize> {
        let ch = self.source.channels;
        let [first, second] = self.source.sub_buffer_processed;
        if !first && !second {
            warn!("Audio stream buffer not available for updating");
            return None;
        }

        let target = if first && second {
            self.source.frame_cursor_pos = 0;
            0
        } else if first {
            0
        } else {
            1
        };

        let sub_size = self.source.sub_buffer_size();
        // Position tracking always advances by a whole half.
        self.source.frames_processed += sub_size as u64;

        let mut frames = frame_count.min(data.len() / ch);
        if frames > sub_size {
            warn!(
                "Attempting to write {} frames to a {} frame stream sub-buffer, excess ignored",
                frames, sub_size
            );
            frames = sub_size;
        }

        let offset = target * sub_size * ch;
        let data_store = Arc::make_mut(&mut self.source.data);
        data_store.write(offset, &data[..frames * ch]);
        data_store.fill_silence(offset + frames * ch, (sub_size - frames) * ch);
        self.source.sub_buffer_processed[target] = false;
        Some(target)
    }

    /// Overwrite the start of a STATIC buffer's samples
    pub(crate) fn update_static<T: Sample>(&mut self, data: &[T], frame_count: usize) -> usize {
        let ch = self.source.channels;
        let frames = frame_count
            .min(data.len() / ch)
            .min(self.source.size_in_frames);
        Arc::make_mut(&mut self.source.data).write(0, &data[..frames * ch]);
        frames
    }

    pub(crate) fn status(&self) -> BufferStatus {
        BufferStatus {
            usage: self.source.usage,
            format: self.format(),
            channels: self.source.channels,
            sample_rate: self.sample_rate,
            size_in_frames: self.source.size_in_frames,
            playing: self.source.playing,
            paused: self.source.paused,
            looping: self.source.looping,
            volume: self.volume,
            pitch: self.pitch,
            pan: self.pan,
            frame_cursor_pos: self.source.frame_cursor_pos,
            frames_processed: self.source.frames_processed,
            sub_buffer_processed: self.source.sub_buffer_processed,
            has_callback: self.source.callback.is_some(),
            processor_count: self.processors.len(),
        }
    }
}

/// Whether `channels` is a supported buffer channel count
pub(crate) fn valid_channels(channels: usize) -> bool {
    (1..=MAX_CHANNELS).contains(&channels)
}
