//! Tracker module playback (MOD and XM)
//!
//! Modules are rendered, not decoded: a [`Player`] sequences patterns and
//! mixes instrument samples into stereo float at [`TRACKER_SAMPLE_RATE`].

pub mod module;
pub mod player;
pub mod protracker;
pub mod xm;

use super::{CodecStream, StreamInfo};
use crate::error::{Error, Result};
use module::Module;
use player::Player;
use std::sync::Arc;
use tracing::{debug, warn};

/// Output rate of rendered modules
pub const TRACKER_SAMPLE_RATE: u32 = 48000;

/// Output channels of rendered modules
pub const TRACKER_CHANNELS: usize = 2;

/// A module player behind the codec contract
pub struct TrackerStream {
    player: Player,
    total_frames: u64,
}

impl TrackerStream {
    pub fn from_xm(bytes: &[u8]) -> Result<Self> {
        Self::new(xm::parse_xm(bytes)?)
    }

    pub fn from_mod(bytes: &[u8]) -> Result<Self> {
        Self::new(protracker::parse_mod(bytes)?)
    }

    pub fn new(module: Module) -> Result<Self> {
        if module.orders.is_empty() {
            return Err(Error::Decode("module has no song positions".to_string()));
        }
        let name = module.name.clone();
        let player = Player::new(Arc::new(module), TRACKER_SAMPLE_RATE);
        let total_frames = player.measure_frames();
        debug!(
            "Module \"{}\" plays for {} frames ({:.1}s)",
            name,
            total_frames,
            total_frames as f64 / TRACKER_SAMPLE_RATE as f64
        );
        Ok(Self {
            player,
            total_frames,
        })
    }
}

impl CodecStream for TrackerStream {
    fn info(&self) -> StreamInfo {
        StreamInfo {
            sample_rate: TRACKER_SAMPLE_RATE,
            channels: TRACKER_CHANNELS,
            total_frames: self.total_frames,
            bits_per_sample: 32,
        }
    }

    fn decode_frames(&mut self, out: &mut [f32], max_frames: usize) -> usize {
        self.player.render(out, max_frames)
    }

    fn seek_to_start(&mut self) {
        self.player.reset();
    }

    fn seek_to_frame(&mut self, frame: u64) -> Result<()> {
        if frame == 0 {
            self.player.reset();
            return Ok(());
        }
        warn!("Module formats can only restart from the beginning");
        Err(Error::InvalidInput(format!(
            "cannot seek a module to frame {}",
            frame
        )))
    }
}
