//! raudio engine and device configuration

use crate::Result;
use serde::Deserialize;
use std::path::Path;

/// Environment variable naming a config file
pub const CONFIG_ENV_VAR: &str = "RAUDIO_CONFIG";

/// Directory name under the platform config dir
pub const CONFIG_APP_NAME: &str = "raudio";

/// Default mixing sample rate
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Default mixing channel count
pub const DEFAULT_CHANNELS: u16 = 2;

/// Audio engine configuration
///
/// Every field has a default, so a TOML file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Mixing (device) sample rate in Hz
    pub sample_rate: u32,
    /// Mixing (device) channel count
    pub channels: u16,
    /// Default sub-buffer size for new streams in frames, 0 = `sample_rate / 30`
    pub stream_buffer_frames: u32,
    /// Output device name, default device when unset
    pub device_name: Option<String>,
    /// Requested hardware period in frames, backend default when unset
    pub device_buffer_frames: Option<u32>,
    /// Initial master volume (0.0-1.0)
    pub master_volume: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            stream_buffer_frames: 0,
            device_name: None,
            device_buffer_frames: None,
            master_volume: 1.0,
        }
    }
}

impl AudioConfig {
    /// Load configuration following CLI > env > user file > defaults
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let path =
            raudio_common::config::resolve_config_path(cli_path, CONFIG_ENV_VAR, CONFIG_APP_NAME);
        let config: AudioConfig = raudio_common::config::load_toml_config(path.as_deref())?;
        config.validated()
    }

    /// Reject values the engine cannot run with
    pub fn validated(self) -> Result<Self> {
        if self.sample_rate == 0 {
            return Err(crate::Error::Config("sample_rate must be > 0".to_string()));
        }
        if self.channels == 0 || self.channels as usize > crate::audio::types::MAX_CHANNELS {
            return Err(crate::Error::Config(format!(
                "channels must be 1..={}, got {}",
                crate::audio::types::MAX_CHANNELS,
                self.channels
            )));
        }
        Ok(self)
    }

    /// Config for a headless engine with the given mixing format
    pub fn headless(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            ..Self::default()
        }
    }
}
