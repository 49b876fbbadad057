//! QOA ("Quite OK Audio") decoding
//!
//! ```text
//! File header (8 bytes):  "qoaf" + samples per channel (u32 BE)
//! Frame header (8 bytes): channels (u8) | sample rate (u24) | samples (u16) | frame size (u16)
//! Per channel LMS state:  history[4] i16 BE + weights[4] i16 BE
//! Slices (8 bytes each):  scalefactor (4 bits) + 20 x 3-bit residuals, interleaved by channel
//! ```

use super::{CodecStream, StreamInfo};
use crate::audio::types::MAX_CHANNELS;
use crate::error::{Error, Result};
use tracing::{debug, warn};

const QOA_MAGIC: &[u8; 4] = b"qoaf";
const QOA_FILE_HEADER_SIZE: usize = 8;
const QOA_FRAME_HEADER_SIZE: usize = 8;
const QOA_LMS_STATE_SIZE: usize = 16;
const QOA_SLICE_LEN: usize = 20;
const QOA_SLICES_PER_FRAME: usize = 256;
/// Samples per channel in every frame but the last
pub const QOA_FRAME_LEN: usize = QOA_SLICE_LEN * QOA_SLICES_PER_FRAME;

/// Dequantisation table: round(scalefactor * [0.75, -0.75, 2.5, -2.5, 4.5, -4.5, 7, -7])
const QOA_DEQUANT_TAB: [[i32; 8]; 16] = [
    [1, -1, 3, -3, 5, -5, 7, -7],
    [5, -5, 18, -18, 32, -32, 49, -49],
    [16, -16, 53, -53, 95, -95, 147, -147],
    [34, -34, 113, -113, 203, -203, 315, -315],
    [63, -63, 210, -210, 378, -378, 588, -588],
    [104, -104, 345, -345, 621, -621, 966, -966],
    [158, -158, 528, -528, 950, -950, 1477, -1477],
    [228, -228, 760, -760, 1368, -1368, 2128, -2128],
    [316, -316, 1053, -1053, 1895, -1895, 2947, -2947],
    [422, -422, 1405, -1405, 2529, -2529, 3934, -3934],
    [548, -548, 1828, -1828, 3290, -3290, 5117, -5117],
    [696, -696, 2320, -2320, 4176, -4176, 6496, -6496],
    [868, -868, 2893, -2893, 5207, -5207, 8099, -8099],
    [1064, -1064, 3548, -3548, 6386, -6386, 9933, -9933],
    [1286, -1286, 4288, -4288, 7718, -7718, 12005, -12005],
    [1536, -1536, 5120, -5120, 9216, -9216, 14336, -14336],
];

/// 4-tap LMS predictor
#[derive(Debug, Clone, Copy, Default)]
struct Lms {
    history: [i32; 4],
    weights: [i32; 4],
}

impl Lms {
    fn predict(&self) -> i32 {
        let mut prediction = 0i32;
        for i in 0..4 {
            prediction = prediction.wrapping_add(self.weights[i].wrapping_mul(self.history[i]));
        }
        prediction >> 13
    }

    fn update(&mut self, sample: i32, residual: i32) {
        let delta = residual >> 4;
        for i in 0..4 {
            self.weights[i] += if self.history[i] < 0 { -delta } else { delta };
        }
        self.history.rotate_left(1);
        self.history[3] = sample;
    }
}

fn read_u64(bytes: &[u8], offset: usize) -> Result<u64> {
    bytes
        .get(offset..offset + 8)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_be_bytes)
        .ok_or_else(|| Error::Decode("truncated QOA data".to_string()))
}

#[derive(Debug, Clone, Copy)]
struct FrameHeader {
    channels: usize,
    sample_rate: u32,
    samples: usize,
    size: usize,
}

fn read_frame_header(bytes: &[u8], offset: usize) -> Result<FrameHeader> {
    let header = read_u64(bytes, offset)?;
    Ok(FrameHeader {
        channels: (header >> 56) as usize,
        sample_rate: ((header >> 32) & 0xff_ffff) as u32,
        samples: ((header >> 16) & 0xffff) as usize,
        size: (header & 0xffff) as usize,
    })
}

/// Streaming QOA decoder over an in-memory file
pub struct QoaStream {
    bytes: Vec<u8>,
    info: StreamInfo,
    /// Byte offset of every frame header
    frame_offsets: Vec<usize>,
    next_frame: usize,
    /// Current frame, interleaved and normalised
    pending: Vec<f32>,
    pending_pos: usize,
}

impl QoaStream {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < QOA_FILE_HEADER_SIZE + QOA_FRAME_HEADER_SIZE || &bytes[..4] != QOA_MAGIC {
            return Err(Error::Decode("not a QOA file".to_string()));
        }
        let total_frames = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as u64;
        if total_frames == 0 {
            return Err(Error::Decode("streaming QOA files are not supported".to_string()));
        }

        let first = read_frame_header(&bytes, QOA_FILE_HEADER_SIZE)?;
        if first.channels == 0 || first.channels > MAX_CHANNELS || first.sample_rate == 0 {
            return Err(Error::Decode(format!(
                "invalid QOA frame header: {} channels, {} Hz",
                first.channels, first.sample_rate
            )));
        }

        let mut frame_offsets = Vec::new();
        let mut offset = QOA_FILE_HEADER_SIZE;
        while offset + QOA_FRAME_HEADER_SIZE <= bytes.len() {
            let header = read_frame_header(&bytes, offset)?;
            if header.size < QOA_FRAME_HEADER_SIZE {
                break;
            }
            frame_offsets.push(offset);
            offset += header.size;
        }

        debug!(
            "Opened QOA stream: {} Hz, {} channels, {} frames in {} QOA frames",
            first.sample_rate,
            first.channels,
            total_frames,
            frame_offsets.len()
        );

        Ok(Self {
            bytes,
            info: StreamInfo {
                sample_rate: first.sample_rate,
                channels: first.channels,
                total_frames,
                bits_per_sample: 16,
            },
            frame_offsets,
            next_frame: 0,
            pending: Vec::new(),
            pending_pos: 0,
        })
    }

    /// Decode QOA frame `index` into `pending`
    fn decode_frame(&mut self, index: usize) -> Result<()> {
        let offset = self.frame_offsets[index];
        let header = read_frame_header(&self.bytes, offset)?;
        let channels = self.info.channels;
        if header.channels != channels {
            return Err(Error::Decode("QOA channel count changed mid-stream".to_string()));
        }

        let mut pos = offset + QOA_FRAME_HEADER_SIZE;
        let mut lms = [Lms::default(); MAX_CHANNELS];
        for state in lms.iter_mut().take(channels) {
            let history = read_u64(&self.bytes, pos)?;
            let weights = read_u64(&self.bytes, pos + 8)?;
            for i in 0..4 {
                state.history[i] = (history >> (48 - i * 16)) as u16 as i16 as i32;
                state.weights[i] = (weights >> (48 - i * 16)) as u16 as i16 as i32;
            }
            pos += QOA_LMS_STATE_SIZE;
        }

        let samples = header.samples;
        self.pending.clear();
        self.pending.resize(samples * channels, 0.0);
        self.pending_pos = 0;

        let mut sample_index = 0;
        while sample_index < samples {
            for (ch, state) in lms.iter_mut().enumerate().take(channels) {
                let mut slice = read_u64(&self.bytes, pos)?;
                pos += 8;

                let scalefactor = ((slice >> 60) & 0xf) as usize;
                slice <<= 4;
                let slice_end = (sample_index + QOA_SLICE_LEN).min(samples);
                for si in sample_index..slice_end {
                    let quantized = ((slice >> 61) & 0x7) as usize;
                    let dequantized = QOA_DEQUANT_TAB[scalefactor][quantized];
                    let reconstructed = (state.predict() + dequantized).clamp(-32768, 32767);
                    state.update(reconstructed, dequantized);
                    self.pending[si * channels + ch] = reconstructed as f32 / 32768.0;
                    slice <<= 3;
                }
            }
            sample_index += QOA_SLICE_LEN;
        }
        Ok(())
    }
}

impl CodecStream for QoaStream {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn decode_frames(&mut self, out: &mut [f32], max_frames: usize) -> usize {
        let channels = self.info.channels;
        let max_frames = max_frames.min(out.len() / channels);
        let mut frames = 0;

        while frames < max_frames {
            if self.pending_pos >= self.pending.len() {
                if self.next_frame >= self.frame_offsets.len() {
                    break;
                }
                let index = self.next_frame;
                self.next_frame += 1;
                if let Err(e) = self.decode_frame(index) {
                    warn!("QOA frame {} failed to decode: {}", index, e);
                    self.next_frame = self.frame_offsets.len();
                    self.pending.clear();
                    self.pending_pos = 0;
                    break;
                }
            }
            let available = (self.pending.len() - self.pending_pos) / channels;
            let n = available.min(max_frames - frames);
            out[frames * channels..(frames + n) * channels]
                .copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + n * channels]);
            self.pending_pos += n * channels;
            frames += n;
        }
        frames
    }

    fn seek_to_start(&mut self) {
        self.next_frame = 0;
        self.pending.clear();
        self.pending_pos = 0;
    }

    fn seek_to_frame(&mut self, frame: u64) -> Result<()> {
        if frame >= self.info.total_frames {
            return Err(Error::InvalidInput(format!(
                "seek to frame {} beyond end ({} frames)",
                frame, self.info.total_frames
            )));
        }
        let index = frame as usize / QOA_FRAME_LEN;
        if index >= self.frame_offsets.len() {
            return Err(Error::Decode("QOA frame index out of range".to_string()));
        }
        self.decode_frame(index)?;
        self.next_frame = index + 1;
        self.pending_pos = (frame as usize % QOA_FRAME_LEN) * self.info.channels;
        Ok(())
    }
}
