//! The mixing pass run by the device callback
//!
//! Every playing buffer is converted to the mixing format in scratch-sized
//! chunks, run through its own processors and summed into the output with
//! volume and pan. The post-mix chain and master volume are applied last.

use super::buffer::AudioBuffer;
use super::AudioEngine;

/// Mixing scratch: 4096 bytes of f32 samples
const MIX_SCRATCH_SAMPLES: usize = 1024;

/// Per-side gains for a volume and pan (0.0 right .. 1.0 left)
///
/// Uses the polynomial law `g(p) = 0.5 * p * (3 - p^2)`, so both sides sit at
/// 0.6875 of the volume when centred.
pub fn pan_gains(volume: f32, pan: f32) -> (f32, f32) {
    let left = pan;
    let right = 1.0 - pan;
    let left_gain = volume * 0.5 * left * (3.0 - left * left);
    let right_gain = volume * 0.5 * right * (3.0 - right * right);
    (left_gain, right_gain)
}

/// Accumulate `frame_count` frames of `frames` into `output`
///
/// Stereo output uses the pan law. Other channel counts apply the volume
/// only.
pub(crate) fn mix_frames(
    output: &mut [f32],
    frames: &[f32],
    frame_count: usize,
    channels: usize,
    volume: f32,
    pan: f32,
) {
    let samples = frame_count * channels;
    if channels == 2 {
        let (left_gain, right_gain) = pan_gains(volume, pan);
        for (out, frame) in output[..samples]
            .chunks_exact_mut(2)
            .zip(frames[..samples].chunks_exact(2))
        {
            out[0] += frame[0] * left_gain;
            out[1] += frame[1] * right_gain;
        }
    } else {
        for (out, sample) in output[..samples].iter_mut().zip(&frames[..samples]) {
            *out += sample * volume;
        }
    }
}

/// Pull one buffer's contribution for the whole output block
fn mix_buffer(buffer: &mut AudioBuffer, output: &mut [f32], frame_count: usize, channels: usize) {
    let mut scratch = [0.0f32; MIX_SCRATCH_SAMPLES];
    let chunk_frames = MIX_SCRATCH_SAMPLES / channels;

    let mut frames_done = 0;
    while frames_done < frame_count {
        let wanted = chunk_frames.min(frame_count - frames_done);
        let got = buffer.read_mixing(&mut scratch, wanted);

        if got > 0 {
            let mixed = &mut scratch[..got * channels];
            buffer.processors.run(mixed, got);
            mix_frames(
                &mut output[frames_done * channels..],
                mixed,
                got,
                channels,
                buffer.volume(),
                buffer.pan(),
            );
        }
        frames_done += got;

        // Reading can stop a non-looping buffer at its end.
        if !buffer.is_active() {
            break;
        }

        if got < wanted {
            if !buffer.is_looping() {
                buffer.stop();
                break;
            }
            buffer.set_frame_cursor_pos(0);
            if got == 0 {
                break;
            }
        }
    }
}

impl AudioEngine {
    /// Fill `output` (interleaved, engine channel count) with the next block
    ///
    /// This is the device callback's entry point. Only the length of `output`
    /// matters; whatever it held is overwritten.
    pub fn mix(&self, output: &mut [f32]) {
        output.fill(0.0);
        let channels = self.channels();
        let frame_count = output.len() / channels;
        if frame_count == 0 {
            return;
        }

        let mut state = self.lock();
        state.buffers.for_each_mut(|buffer| {
            if !buffer.is_active() || buffer.is_paused() {
                return;
            }
            mix_buffer(buffer, output, frame_count, channels);
        });

        let samples = &mut output[..frame_count * channels];
        state.mixed_processors.run(samples, frame_count);

        let master = state.master_volume;
        drop(state);

        if master != 1.0 {
            for sample in samples.iter_mut() {
                *sample *= master;
            }
        }
    }
}
