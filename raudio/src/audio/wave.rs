//! In-memory PCM waves: load, reformat, crop and export
//!
//! A `Wave` is fully decoded audio in one of the native sample formats. It is
//! the staging form for sounds (`AudioEngine::load_sound_from_wave`) and the
//! output of offline rendering.

use crate::audio::resampler::Resampler;
use crate::audio::types::{map_channels, SampleData, SampleFormat, MAX_CHANNELS};
use crate::codec::{decode_all, CodecStream, MusicContext};
use crate::error::{Error, Result};
use std::path::Path;
use tracing::{debug, info, warn};

/// Decoded interleaved audio held in memory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Wave {
    pub frame_count: usize,
    pub sample_rate: u32,
    /// Bit depth: 8, 16 or 32 (float)
    pub sample_size: u32,
    pub channels: usize,
    pub data: SampleData,
}

impl Wave {
    /// Wrap normalised float samples, storing them at `sample_size` bits
    pub fn from_samples(
        samples: &[f32],
        sample_rate: u32,
        sample_size: u32,
        channels: usize,
    ) -> Result<Self> {
        let format = SampleFormat::from_sample_size(sample_size).ok_or_else(|| {
            Error::InvalidInput(format!("unsupported sample size: {} bits", sample_size))
        })?;
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(Error::InvalidInput(format!(
                "unsupported channel count: {}",
                channels
            )));
        }
        Ok(Self {
            frame_count: samples.len() / channels,
            sample_rate,
            sample_size,
            channels,
            data: SampleData::from_f32(format, &samples[..samples.len() / channels * channels]),
        })
    }

    /// Load and fully decode an audio file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut ctx = MusicContext::open(path)?;
        let wave = Self::decode(&mut ctx)?;
        info!(
            "WAVE: Data loaded from {} ({} Hz, {} bit, {} ch, {} frames)",
            path.display(),
            wave.sample_rate,
            wave.sample_size,
            wave.channels,
            wave.frame_count
        );
        Ok(wave)
    }

    /// Decode an in-memory file of type `ext` (".wav", "qoa", ...)
    pub fn load_from_memory(ext: &str, bytes: &[u8]) -> Result<Self> {
        let mut ctx = MusicContext::open_memory(ext, bytes.to_vec())?;
        Self::decode(&mut ctx)
    }

    fn decode(ctx: &mut MusicContext) -> Result<Self> {
        let info = ctx.info();
        let samples = decode_all(ctx);
        if samples.is_empty() {
            return Err(Error::Decode(format!("{:?} stream holds no audio", ctx.kind())));
        }
        let sample_size = match info.bits_per_sample {
            8 => 8,
            1..=16 => 16,
            _ => 32,
        };
        Self::from_samples(&samples, info.sample_rate, sample_size, info.channels)
    }

    /// True when the wave holds playable data
    pub fn is_ready(&self) -> bool {
        self.frame_count > 0
            && self.sample_rate > 0
            && self.channels > 0
            && SampleFormat::from_sample_size(self.sample_size).is_some()
            && !self.data.is_empty()
    }

    pub fn format_kind(&self) -> SampleFormat {
        self.data.format()
    }

    /// Convert in place to a new rate, bit depth and channel count
    pub fn format(&mut self, sample_rate: u32, sample_size: u32, channels: usize) -> Result<()> {
        let format = SampleFormat::from_sample_size(sample_size).ok_or_else(|| {
            Error::InvalidInput(format!("unsupported sample size: {} bits", sample_size))
        })?;
        if channels == 0 || channels > MAX_CHANNELS || sample_rate == 0 {
            return Err(Error::InvalidInput(format!(
                "cannot format wave to {} Hz, {} ch",
                sample_rate, channels
            )));
        }
        if sample_rate == self.sample_rate
            && sample_size == self.sample_size
            && channels == self.channels
        {
            return Ok(());
        }

        let mut samples = map_channels(&self.data.to_f32_vec(), self.channels, channels);
        if sample_rate != self.sample_rate {
            samples = Resampler::resample(&samples, self.sample_rate, sample_rate, channels as u16)?;
        }

        debug!(
            "WAVE: Formatted {} Hz/{} bit/{} ch -> {} Hz/{} bit/{} ch",
            self.sample_rate, self.sample_size, self.channels, sample_rate, sample_size, channels
        );
        self.frame_count = samples.len() / channels;
        self.sample_rate = sample_rate;
        self.sample_size = sample_size;
        self.channels = channels;
        self.data = SampleData::from_f32(format, &samples);
        Ok(())
    }

    /// Keep only frames `init_frame..final_frame`
    pub fn crop(&mut self, init_frame: usize, final_frame: usize) {
        if init_frame < final_frame && final_frame <= self.frame_count {
            self.data
                .truncate_range(init_frame * self.channels, final_frame * self.channels);
            self.frame_count = final_frame - init_frame;
        } else {
            warn!(
                "WAVE: Crop range {}..{} out of bounds for {} frames",
                init_frame, final_frame, self.frame_count
            );
        }
    }

    /// All samples, interleaved and normalised to f32
    pub fn samples(&self) -> Vec<f32> {
        self.data.to_f32_vec()
    }

    /// Write the wave to disk; the extension picks the container
    pub fn export(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "wav" => self.export_wav(path)?,
            "raw" => std::fs::write(path, self.data.to_le_bytes())?,
            other => {
                return Err(Error::UnsupportedFormat(format!(
                    "cannot export wave as .{}",
                    other
                )))
            }
        }
        info!("WAVE: Exported {} frames to {}", self.frame_count, path.display());
        Ok(())
    }

    fn export_wav(&self, path: &Path) -> Result<()> {
        let spec = hound::WavSpec {
            channels: self.channels as u16,
            sample_rate: self.sample_rate,
            bits_per_sample: self.data.format().sample_size() as u16,
            sample_format: match self.data.format() {
                SampleFormat::F32 => hound::SampleFormat::Float,
                SampleFormat::U8 | SampleFormat::S16 => hound::SampleFormat::Int,
            },
        };
        let mut writer = hound::WavWriter::create(path, spec).map_err(wav_error)?;
        match &self.data {
            SampleData::U8(v) => {
                for &s in v {
                    // hound stores 8-bit as signed and re-biases on write.
                    writer.write_sample((s as i16 - 128) as i8).map_err(wav_error)?;
                }
            }
            SampleData::S16(v) => {
                for &s in v {
                    writer.write_sample(s).map_err(wav_error)?;
                }
            }
            SampleData::F32(v) => {
                for &s in v {
                    writer.write_sample(s).map_err(wav_error)?;
                }
            }
        }
        writer.finalize().map_err(wav_error)
    }
}

fn wav_error(e: hound::Error) -> Error {
    match e {
        hound::Error::IoError(io) => Error::Io(io),
        other => Error::InvalidInput(format!("WAV export failed: {}", other)),
    }
}
