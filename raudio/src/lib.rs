//! # raudio
//!
//! A small software audio mixer: sounds, streamed music and raw PCM streams
//! mixed into one device-format output.
//!
//! **Architecture:** an [`AudioEngine`] owns every buffer behind one mutex.
//! The device callback (cpal, see [`audio::output`]) calls
//! [`AudioEngine::mix`]; the application loads, plays and refills buffers
//! from its own thread. Music is decoded by symphonia and native QOA and
//! tracker decoders, one chunk per `update_music_stream` call.

pub mod audio;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;

pub use audio::types::{Sample, SampleData, SampleFormat};
pub use audio::wave::Wave;
pub use config::AudioConfig;
pub use engine::buffer::{BufferStatus, BufferUsage, StreamCallback};
pub use engine::music::Music;
pub use engine::processor::{processor, AudioProcessor, ProcessorRef};
pub use engine::sound::Sound;
pub use engine::stream::AudioStream;
pub use engine::{AudioEngine, BufferHandle};
pub use error::{Error, Result};
