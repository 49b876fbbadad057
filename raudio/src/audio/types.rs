//! Core audio data types
//!
//! Sample storage is typed per format instead of raw bytes. Every read path
//! normalises to f32 in [-1.0, 1.0): `u8` is offset-binary around 128, `i16`
//! is scaled by 1/32768 and `f32` passes through.

/// Upper bound on channels for any buffer or device
pub const MAX_CHANNELS: usize = 8;

/// Native sample format of a buffer, stream or wave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Unsigned 8-bit
    U8,
    /// Signed 16-bit
    S16,
    /// 32-bit float
    F32,
}

impl SampleFormat {
    /// Map a bit depth (8, 16, 32) to a format, 32 meaning float
    pub fn from_sample_size(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(SampleFormat::U8),
            16 => Some(SampleFormat::S16),
            32 => Some(SampleFormat::F32),
            _ => None,
        }
    }

    /// Bit depth of this format
    pub fn sample_size(self) -> u32 {
        match self {
            SampleFormat::U8 => 8,
            SampleFormat::S16 => 16,
            SampleFormat::F32 => 32,
        }
    }

    /// Bytes per single-channel sample
    pub fn bytes_per_sample(self) -> usize {
        self.sample_size() as usize / 8
    }
}

/// A primitive sample type the engine can store and convert
pub trait Sample: Copy + Send + 'static {
    const FORMAT: SampleFormat;

    fn to_f32(self) -> f32;

    fn from_f32(value: f32) -> Self;
}

impl Sample for u8 {
    const FORMAT: SampleFormat = SampleFormat::U8;

    #[inline]
    fn to_f32(self) -> f32 {
        (self as f32 - 128.0) / 128.0
    }

    #[inline]
    fn from_f32(value: f32) -> Self {
        (value * 128.0 + 128.0).round().clamp(0.0, 255.0) as u8
    }
}

impl Sample for i16 {
    const FORMAT: SampleFormat = SampleFormat::S16;

    #[inline]
    fn to_f32(self) -> f32 {
        self as f32 / 32768.0
    }

    #[inline]
    fn from_f32(value: f32) -> Self {
        (value * 32768.0).round().clamp(-32768.0, 32767.0) as i16
    }
}

impl Sample for f32 {
    const FORMAT: SampleFormat = SampleFormat::F32;

    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f32(value: f32) -> Self {
        value
    }
}

/// Interleaved sample storage in one of the native formats
#[derive(Debug, Clone, PartialEq)]
pub enum SampleData {
    U8(Vec<u8>),
    S16(Vec<i16>),
    F32(Vec<f32>),
}

impl Default for SampleData {
    fn default() -> Self {
        SampleData::F32(Vec::new())
    }
}

impl SampleData {
    /// `len` samples of silence in `format`
    pub fn silence(format: SampleFormat, len: usize) -> Self {
        match format {
            SampleFormat::U8 => SampleData::U8(vec![128; len]),
            SampleFormat::S16 => SampleData::S16(vec![0; len]),
            SampleFormat::F32 => SampleData::F32(vec![0.0; len]),
        }
    }

    /// Convert normalised floats into `format`
    pub fn from_f32(format: SampleFormat, samples: &[f32]) -> Self {
        match format {
            SampleFormat::U8 => SampleData::U8(samples.iter().map(|&s| u8::from_f32(s)).collect()),
            SampleFormat::S16 => {
                SampleData::S16(samples.iter().map(|&s| i16::from_f32(s)).collect())
            }
            SampleFormat::F32 => SampleData::F32(samples.to_vec()),
        }
    }

    pub fn format(&self) -> SampleFormat {
        match self {
            SampleData::U8(_) => SampleFormat::U8,
            SampleData::S16(_) => SampleFormat::S16,
            SampleData::F32(_) => SampleFormat::F32,
        }
    }

    /// Number of samples (not frames)
    pub fn len(&self) -> usize {
        match self {
            SampleData::U8(v) => v.len(),
            SampleData::S16(v) => v.len(),
            SampleData::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `out.len()` samples starting at `offset`, normalised to f32
    pub fn read_f32(&self, offset: usize, out: &mut [f32]) {
        let end = offset + out.len();
        match self {
            SampleData::U8(v) => {
                for (o, &s) in out.iter_mut().zip(&v[offset..end]) {
                    *o = s.to_f32();
                }
            }
            SampleData::S16(v) => {
                for (o, &s) in out.iter_mut().zip(&v[offset..end]) {
                    *o = s.to_f32();
                }
            }
            SampleData::F32(v) => out.copy_from_slice(&v[offset..end]),
        }
    }

    /// Overwrite samples starting at `offset` with `src`, converting as needed
    pub fn write<T: Sample>(&mut self, offset: usize, src: &[T]) {
        let end = offset + src.len();
        match self {
            SampleData::U8(v) => write_converted(&mut v[offset..end], src),
            SampleData::S16(v) => write_converted(&mut v[offset..end], src),
            SampleData::F32(v) => write_converted(&mut v[offset..end], src),
        }
    }

    /// Reset `len` samples starting at `offset` to silence
    pub fn fill_silence(&mut self, offset: usize, len: usize) {
        let end = offset + len;
        match self {
            SampleData::U8(v) => v[offset..end].fill(128),
            SampleData::S16(v) => v[offset..end].fill(0),
            SampleData::F32(v) => v[offset..end].fill(0.0),
        }
    }

    /// All samples normalised to f32
    pub fn to_f32_vec(&self) -> Vec<f32> {
        let mut out = vec![0.0; self.len()];
        self.read_f32(0, &mut out);
        out
    }

    /// Keep only samples in `start..end`
    pub fn truncate_range(&mut self, start: usize, end: usize) {
        match self {
            SampleData::U8(v) => keep_range(v, start, end),
            SampleData::S16(v) => keep_range(v, start, end),
            SampleData::F32(v) => keep_range(v, start, end),
        }
    }

    /// Little-endian byte image of the samples
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            SampleData::U8(v) => v.clone(),
            SampleData::S16(v) => v.iter().flat_map(|s| s.to_le_bytes()).collect(),
            SampleData::F32(v) => v.iter().flat_map(|s| s.to_le_bytes()).collect(),
        }
    }
}

fn write_converted<D: Sample, S: Sample>(dst: &mut [D], src: &[S]) {
    // Same-format writes round trip exactly through f32.
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = D::from_f32(s.to_f32());
    }
}

fn keep_range<T>(v: &mut Vec<T>, start: usize, end: usize) {
    v.truncate(end);
    v.drain(..start);
}

/// Map one interleaved frame between channel layouts
///
/// Mono is duplicated to every output channel, anything down to mono is
/// averaged, and other layouts copy matching channels and zero the rest.
#[inline]
pub fn map_frame(input: &[f32], output: &mut [f32]) {
    let (ch_in, ch_out) = (input.len(), output.len());
    if ch_in == ch_out {
        output.copy_from_slice(input);
    } else if ch_in == 1 {
        output.fill(input[0]);
    } else if ch_out == 1 {
        output[0] = input.iter().sum::<f32>() / ch_in as f32;
    } else {
        for (c, o) in output.iter_mut().enumerate() {
            *o = if c < ch_in { input[c] } else { 0.0 };
        }
    }
}

/// Remap a whole interleaved buffer to `channels_out`
pub fn map_channels(samples: &[f32], channels_in: usize, channels_out: usize) -> Vec<f32> {
    if channels_in == channels_out || channels_in == 0 {
        return samples.to_vec();
    }
    let frames = samples.len() / channels_in;
    let mut out = vec![0.0; frames * channels_out];
    for (src, dst) in samples
        .chunks_exact(channels_in)
        .zip(out.chunks_exact_mut(channels_out))
    {
        map_frame(src, dst);
    }
    out
}
