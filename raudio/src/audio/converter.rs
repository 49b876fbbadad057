//! Per-buffer real-time format converter
//!
//! Converts normalised frames at a buffer's native channel count and sample
//! rate into the mixing format (device channels, device rate). Rate
//! conversion is linear interpolation with a 32.32 fixed-point phase, so
//! `required_input_frames` is exact: `process` consumes precisely that many
//! frames when given them. The output rate can change at any time (pitch).

use super::types::{map_frame, MAX_CHANNELS};
use crate::{Error, Result};

const FRAC_BITS: u32 = 32;
const FRAC_ONE: u64 = 1 << FRAC_BITS;

/// Pull-based channel + sample-rate converter
#[derive(Debug, Clone)]
pub struct FormatConverter {
    channels_in: usize,
    channels_out: usize,
    sample_rate_in: u32,
    sample_rate_out: f64,
    /// Input frames advanced per output frame, 32.32 fixed point
    step: u64,
    /// Position between `prev` and `next`, 32.32 fixed point
    frac: u64,
    prev: [f32; MAX_CHANNELS],
    next: [f32; MAX_CHANNELS],
}

impl FormatConverter {
    /// Create a converter from `(channels_in, sample_rate_in)` to the mixing format
    pub fn new(
        channels_in: usize,
        sample_rate_in: u32,
        channels_out: usize,
        sample_rate_out: u32,
    ) -> Result<Self> {
        if channels_in == 0 || channels_in > MAX_CHANNELS {
            return Err(Error::InvalidInput(format!(
                "Unsupported input channel count: {}",
                channels_in
            )));
        }
        if channels_out == 0 || channels_out > MAX_CHANNELS {
            return Err(Error::InvalidInput(format!(
                "Unsupported output channel count: {}",
                channels_out
            )));
        }
        if sample_rate_in == 0 || sample_rate_out == 0 {
            return Err(Error::InvalidInput("Sample rate must be > 0".to_string()));
        }

        let mut converter = Self {
            channels_in,
            channels_out,
            sample_rate_in,
            sample_rate_out: sample_rate_out as f64,
            step: FRAC_ONE,
            // Two input frames must be loaded before the first interpolated output.
            frac: 2 * FRAC_ONE,
            prev: [0.0; MAX_CHANNELS],
            next: [0.0; MAX_CHANNELS],
        };
        converter.set_output_rate(sample_rate_out as f64);
        Ok(converter)
    }

    pub fn channels_in(&self) -> usize {
        self.channels_in
    }

    pub fn channels_out(&self) -> usize {
        self.channels_out
    }

    pub fn sample_rate_in(&self) -> u32 {
        self.sample_rate_in
    }

    /// Current effective output rate in Hz
    pub fn sample_rate_out(&self) -> f64 {
        self.sample_rate_out
    }

    /// Change the effective output rate, keeping the interpolation phase
    pub fn set_output_rate(&mut self, rate: f64) {
        if rate <= 0.0 || !rate.is_finite() {
            return;
        }
        self.sample_rate_out = rate;
        let ratio = self.sample_rate_in as f64 / rate;
        self.step = ((ratio * FRAC_ONE as f64).round() as u64).max(1);
    }

    /// True when no rate conversion is taking place
    pub fn is_passthrough(&self) -> bool {
        self.step == FRAC_ONE
    }

    /// Input frames needed to produce exactly `output_frames` frames
    pub fn required_input_frames(&self, output_frames: usize) -> usize {
        if output_frames == 0 {
            return 0;
        }
        if self.is_passthrough() {
            return output_frames;
        }
        let end = self.frac as u128 + (output_frames as u128 - 1) * self.step as u128;
        (end >> FRAC_BITS) as usize
    }

    /// Convert `input_frames` interleaved frames into at most `output_frames`
    ///
    /// Returns `(input_frames_consumed, output_frames_produced)`.
    pub fn process(
        &mut self,
        input: &[f32],
        input_frames: usize,
        output: &mut [f32],
        output_frames: usize,
    ) -> (usize, usize) {
        let (ci, co) = (self.channels_in, self.channels_out);
        let input_frames = input_frames.min(input.len() / ci);
        let output_frames = output_frames.min(output.len() / co);

        if self.is_passthrough() {
            let frames = input_frames.min(output_frames);
            for f in 0..frames {
                map_frame(&input[f * ci..(f + 1) * ci], &mut output[f * co..(f + 1) * co]);
            }
            if frames > 0 {
                // Park the phase so a later rate change resumes from the last frame.
                let last = &output[(frames - 1) * co..frames * co];
                self.prev[..co].copy_from_slice(last);
                self.next[..co].copy_from_slice(last);
                self.frac = FRAC_ONE;
            }
            return (frames, frames);
        }

        let mut consumed = 0;
        let mut produced = 0;
        while produced < output_frames {
            while self.frac >= FRAC_ONE {
                if consumed == input_frames {
                    return (consumed, produced);
                }
                self.prev = self.next;
                map_frame(
                    &input[consumed * ci..(consumed + 1) * ci],
                    &mut self.next[..co],
                );
                consumed += 1;
                self.frac -= FRAC_ONE;
            }

            let t = (self.frac as f64 / FRAC_ONE as f64) as f32;
            let out = &mut output[produced * co..(produced + 1) * co];
            for (c, o) in out.iter_mut().enumerate() {
                *o = self.prev[c] + (self.next[c] - self.prev[c]) * t;
            }
            produced += 1;
            self.frac += self.step;
        }

        (consumed, produced)
    }

    /// Emit the frames left after the final input frame
    ///
    /// Call once the source has run dry. Output positions that fall between
    /// the last loaded frame and the one that will never arrive hold that
    /// last frame. Returns the frames written; 0 in passthrough.
    pub fn flush(&mut self, output: &mut [f32], output_frames: usize) -> usize {
        if self.is_passthrough() {
            return 0;
        }
        let co = self.channels_out;
        let output_frames = output_frames.min(output.len() / co);

        let mut produced = 0;
        while produced < output_frames && (FRAC_ONE..2 * FRAC_ONE).contains(&self.frac) {
            output[produced * co..(produced + 1) * co].copy_from_slice(&self.next[..co]);
            produced += 1;
            self.frac += self.step;
        }
        produced
    }

    /// Forget interpolation history
    pub fn reset(&mut self) {
        self.frac = 2 * FRAC_ONE;
        self.prev = [0.0; MAX_CHANNELS];
        self.next = [0.0; MAX_CHANNELS];
    }
}
