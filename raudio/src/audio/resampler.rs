//! Offline sample-rate conversion using rubato
//!
//! Used when a whole buffer is converted up front: `Wave::format` and loading
//! a Sound into the mixing format. Real-time pitch/rate conversion happens in
//! `FormatConverter` instead.

use crate::error::{Error, Result};
use rubato::{FastFixedIn, Resampler as RubatoResampler};
use tracing::debug;

/// Whole-buffer resampler
pub struct Resampler;

impl Resampler {
    /// Resample interleaved audio from `input_rate` to `output_rate`
    ///
    /// # Arguments
    /// - `input`: Interleaved audio samples
    /// - `input_rate`: Input sample rate
    /// - `output_rate`: Output sample rate
    /// - `channels`: Number of interleaved channels
    ///
    /// # Returns
    /// Interleaved audio of exactly `frames * output_rate / input_rate` frames,
    /// with the resampler's group delay removed.
    pub fn resample(
        input: &[f32],
        input_rate: u32,
        output_rate: u32,
        channels: u16,
    ) -> Result<Vec<f32>> {
        if channels == 0 || input_rate == 0 || output_rate == 0 {
            return Err(Error::InvalidInput(format!(
                "Cannot resample {}ch {}Hz -> {}Hz",
                channels, input_rate, output_rate
            )));
        }

        if input_rate == output_rate {
            debug!("Sample rate already at {}Hz, skipping resample", output_rate);
            return Ok(input.to_vec());
        }

        let num_channels = channels as usize;
        let input_frames = input.len() / num_channels;
        if input_frames == 0 {
            return Ok(Vec::new());
        }
        let expected_frames =
            (input_frames as u64 * output_rate as u64 / input_rate as u64) as usize;

        debug!(
            "Resampling {} frames from {}Hz to {}Hz ({} channels)",
            input_frames, input_rate, output_rate, channels
        );

        let planar_input = Self::deinterleave(input, channels);
        let mut resampler = Self::create_resampler(input_rate, output_rate, channels, input_frames)?;
        let delay = resampler.output_delay();

        let mut planar_output = resampler
            .process(&planar_input, None)
            .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;

        // Flush the frames still held back by the filter delay.
        let tail = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| Error::Decode(format!("Resampling flush failed: {}", e)))?;
        for (channel, rest) in planar_output.iter_mut().zip(tail) {
            channel.extend(rest);
            channel.drain(..delay.min(channel.len()));
            channel.resize(expected_frames, 0.0);
        }

        Ok(Self::interleave(planar_output))
    }

    fn create_resampler(
        input_rate: u32,
        output_rate: u32,
        channels: u16,
        chunk_size: usize,
    ) -> Result<FastFixedIn<f32>> {
        FastFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0, // max_relative_ratio (no runtime changes)
            rubato::PolynomialDegree::Septic,
            chunk_size,
            channels as usize,
        )
        .map_err(|e| Error::Decode(format!("Failed to create resampler: {}", e)))
    }

    /// Convert interleaved samples to planar format.
    ///
    /// Input:  [L, R, L, R, L, R, ...]
    /// Output: [[L, L, L, ...], [R, R, R, ...]]
    fn deinterleave(samples: &[f32], channels: u16) -> Vec<Vec<f32>> {
        let num_channels = channels as usize;
        let num_frames = samples.len() / num_channels;

        let mut planar = vec![Vec::with_capacity(num_frames); num_channels];
        for frame in samples.chunks_exact(num_channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                planar[ch].push(sample);
            }
        }
        planar
    }

    /// Convert planar samples to interleaved format.
    fn interleave(planar: Vec<Vec<f32>>) -> Vec<f32> {
        let Some(first) = planar.first() else {
            return Vec::new();
        };

        let num_channels = planar.len();
        let num_frames = first.len();
        let mut interleaved = Vec::with_capacity(num_frames * num_channels);
        for frame_idx in 0..num_frames {
            for channel in &planar {
                interleaved.push(channel[frame_idx]);
            }
        }
        interleaved
    }
}
