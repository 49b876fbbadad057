//! Sample types, conversion and device output
//!
//! `types` defines native sample storage, `converter` the per-buffer real-time
//! conversion into the mixing format, `resampler` offline rate conversion,
//! `wave` in-memory PCM and `output` the cpal device backend.

pub mod converter;
pub mod output;
pub mod resampler;
pub mod types;
pub mod wave;

pub use converter::FormatConverter;
pub use output::AudioOutput;
pub use types::{Sample, SampleData, SampleFormat, MAX_CHANNELS};
pub use wave::Wave;
