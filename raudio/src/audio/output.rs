//! Audio output using cpal
//!
//! Opens a device, negotiates a stream config close to the requested mixing
//! format and runs `AudioEngine::mix` from the device's real-time callback.

use crate::config::AudioConfig;
use crate::engine::AudioEngine;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Mix scratch size when the device does not report a fixed period
const DEFAULT_SCRATCH_FRAMES: usize = 4096;

/// Output device plus the running stream, if started
pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
    engine: Option<Arc<AudioEngine>>,
    /// Set by the stream's error callback
    error_flag: Arc<AtomicBool>,
    error_count: Arc<AtomicU32>,
}

impl AudioOutput {
    /// Names of the host's output devices
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open the configured device, falling back to the default device
    ///
    /// The negotiated rate and channel count may differ from the request;
    /// build the engine from [`AudioOutput::engine_config`].
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = Self::find_device(&host, config.device_name.as_deref())?;

        let (mut stream_config, sample_format) =
            Self::negotiate_config(&device, config.sample_rate, config.channels)?;

        if let Some(frames) = config.device_buffer_frames {
            stream_config.buffer_size = cpal::BufferSize::Fixed(frames);
            debug!("Using requested buffer size: {} frames", frames);
        } else {
            debug!("Using device default buffer size");
        }

        info!(
            "Audio device opened: {} ({} Hz, {} ch, {:?})",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            stream_config.sample_rate.0,
            stream_config.channels,
            sample_format
        );

        Ok(Self {
            device,
            config: stream_config,
            sample_format,
            stream: None,
            engine: None,
            error_flag: Arc::new(AtomicBool::new(false)),
            error_count: Arc::new(AtomicU32::new(0)),
        })
    }

    fn find_device(host: &cpal::Host, name: Option<&str>) -> Result<Device> {
        if let Some(name) = name {
            let mut devices = host
                .output_devices()
                .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;

            if let Some(dev) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
                info!("Found requested audio device: {}", name);
                return Ok(dev);
            }
            warn!("Requested device '{}' not found, falling back to default device", name);
        }

        host.default_output_device()
            .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))
    }

    /// Pick a stream config: f32 at the requested format, then any sample
    /// type we can write at that format, then the device default
    fn negotiate_config(
        device: &Device,
        sample_rate: u32,
        channels: u16,
    ) -> Result<(StreamConfig, SampleFormat)> {
        let supported: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?
            .filter(|c| {
                c.channels() == channels
                    && c.min_sample_rate().0 <= sample_rate
                    && c.max_sample_rate().0 >= sample_rate
            })
            .collect();

        let preferred = supported
            .iter()
            .find(|c| c.sample_format() == SampleFormat::F32)
            .or_else(|| {
                supported
                    .iter()
                    .find(|c| matches!(c.sample_format(), SampleFormat::I16 | SampleFormat::U16))
            });

        if let Some(range) = preferred {
            let sample_format = range.sample_format();
            let config = range
                .clone()
                .with_sample_rate(cpal::SampleRate(sample_rate))
                .config();
            return Ok((config, sample_format));
        }

        warn!(
            "Device does not support {} Hz / {} ch, using its default config",
            sample_rate, channels
        );
        let default = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;
        Ok((default.config(), default.sample_format()))
    }

    /// `base` with the negotiated device format filled in
    pub fn engine_config(&self, base: &AudioConfig) -> AudioConfig {
        AudioConfig {
            sample_rate: self.sample_rate(),
            channels: self.channels(),
            ..base.clone()
        }
    }

    /// Start pulling mixed audio from `engine`
    ///
    /// The engine must mix at the device's rate and channel count.
    pub fn start(&mut self, engine: Arc<AudioEngine>) -> Result<()> {
        if engine.sample_rate() != self.sample_rate() || engine.channels() != self.channels() as usize {
            return Err(Error::AudioOutput(format!(
                "Engine format {} Hz / {} ch does not match device {} Hz / {} ch",
                engine.sample_rate(),
                engine.channels(),
                self.sample_rate(),
                self.channels()
            )));
        }
        engine.set_period_size(self.period_frames());

        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32>(Arc::clone(&engine))?,
            SampleFormat::I16 => self.build_stream::<i16>(Arc::clone(&engine))?,
            SampleFormat::U16 => self.build_stream::<u16>(Arc::clone(&engine))?,
            sample_format => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {:?}",
                    sample_format
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

        self.stream = Some(stream);
        self.engine = Some(engine);
        info!("Audio stream started");
        Ok(())
    }

    fn build_stream<T>(&self, engine: Arc<AudioEngine>) -> Result<Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let error_flag = Arc::clone(&self.error_flag);
        let error_count = Arc::clone(&self.error_count);
        let mut mixed =
            vec![0.0f32; scratch_samples(self.period_frames(), self.config.channels as usize)];

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    fill_output(&engine, &mut mixed, data);
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_flag.store(true, Ordering::SeqCst);
                    error_count.fetch_add(1, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
    }

    /// Pause and drop the stream
    pub fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            info!("Stopping audio stream");
            stream
                .pause()
                .map_err(|e| Error::AudioOutput(format!("Failed to pause stream: {}", e)))?;
        }
        Ok(())
    }

    /// Rebuild the stream after a device error, keeping the same engine
    pub fn try_recover(&mut self) -> Result<()> {
        let Some(engine) = self.engine.take() else {
            return Err(Error::AudioOutput("Audio stream was never started".to_string()));
        };
        warn!("Attempting audio stream recovery (error count: {})", self.error_count());

        if let Err(e) = self.stop() {
            warn!("Failed to stop stream during recovery: {}", e);
        }
        self.start(engine)?;
        self.clear_error();
        info!("Audio stream recovery successful");
        Ok(())
    }

    pub fn device_name(&self) -> String {
        self.device
            .name()
            .unwrap_or_else(|_| "Unknown".to_string())
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    pub fn sample_format(&self) -> SampleFormat {
        self.sample_format
    }

    /// Fixed hardware period in frames, 0 when the device picks it
    pub fn period_frames(&self) -> u32 {
        match self.config.buffer_size {
            cpal::BufferSize::Fixed(frames) => frames,
            cpal::BufferSize::Default => 0,
        }
    }

    pub fn has_error(&self) -> bool {
        self.error_flag.load(Ordering::SeqCst)
    }

    pub fn clear_error(&self) {
        self.error_flag.store(false, Ordering::SeqCst);
        self.error_count.store(0, Ordering::SeqCst);
    }

    /// Stream errors since the last `clear_error`
    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::SeqCst)
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Callback scratch length in samples, a whole number of frames
///
/// Larger device requests are mixed in several blocks.
fn scratch_samples(period_frames: u32, channels: usize) -> usize {
    (period_frames as usize).max(DEFAULT_SCRATCH_FRAMES) * channels.max(1)
}

/// Mix into `data` one scratch-sized block at a time
fn fill_output<T>(engine: &AudioEngine, scratch: &mut [f32], data: &mut [T])
where
    T: SizedSample + FromSample<f32>,
{
    for out in data.chunks_mut(scratch.len()) {
        let block = &mut scratch[..out.len()];
        engine.mix(block);
        write_samples(block, out);
    }
}

/// Clamp mixed floats into the device's sample type
fn write_samples<T>(mixed: &[f32], out: &mut [T])
where
    T: SizedSample + FromSample<f32>,
{
    for (o, &s) in out.iter_mut().zip(mixed) {
        *o = T::from_sample(s.clamp(-1.0, 1.0));
    }
}
