//! raudio player - plays sounds and music through the mixing engine
//!
//! Music files are streamed and pumped once per tick; `--sound` files are
//! loaded whole. With `--render` the mix goes to a WAV file instead of a
//! device.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use raudio::audio::output::AudioOutput;
use raudio::{AudioConfig, AudioEngine, Music, Sound, Wave};
use raudio_common::logging::init_tracing;
use raudio_common::time::{format_clock, frames_to_seconds};
use tracing::{info, warn};

/// Frames mixed per offline render step
const RENDER_CHUNK_FRAMES: usize = 1024;

/// Application tick while playing through a device
const TICK: Duration = Duration::from_millis(10);

/// Command-line arguments for raudio
#[derive(Parser, Debug)]
#[command(name = "raudio")]
#[command(about = "Play sounds and music through the raudio mixer")]
#[command(version)]
struct Args {
    /// Music files to stream (wav, ogg, mp3, flac, qoa, xm, mod)
    files: Vec<PathBuf>,

    /// Sound files to load into memory and play
    #[arg(short, long = "sound")]
    sounds: Vec<PathBuf>,

    /// Volume for every sound and music stream
    #[arg(long, default_value_t = 1.0)]
    volume: f32,

    /// Pitch for every sound and music stream (> 0)
    #[arg(long, default_value_t = 1.0)]
    pitch: f32,

    /// Pan, 0.0 to 1.0 (left weight), 0.5 is centre
    #[arg(long, default_value_t = 0.5)]
    pan: f32,

    /// Loop everything until the duration limit
    #[arg(short, long = "loop")]
    looping: bool,

    /// Stop after this many seconds
    #[arg(long)]
    seconds: Option<f32>,

    /// Config file (overrides RAUDIO_CONFIG and the user config)
    #[arg(short, long, env = "RAUDIO_CONFIG")]
    config: Option<PathBuf>,

    /// Output device name
    #[arg(short, long)]
    device: Option<String>,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Mix offline into this WAV file instead of playing
    #[arg(long)]
    render: Option<PathBuf>,
}

/// Everything loaded for one run
struct Session {
    sounds: Vec<Sound>,
    music: Vec<Music>,
}

impl Session {
    fn load(engine: &AudioEngine, args: &Args) -> Result<Self> {
        let mut sounds = Vec::new();
        for path in &args.sounds {
            let sound = engine.load_sound(path);
            if !engine.is_sound_ready(&sound) {
                warn!("Skipping {}", path.display());
                continue;
            }
            engine.set_sound_volume(&sound, args.volume);
            engine.set_sound_pitch(&sound, args.pitch);
            engine.set_sound_pan(&sound, args.pan);
            engine.set_sound_looping(&sound, args.looping);
            sounds.push(sound);
        }

        let mut music = Vec::new();
        for path in &args.files {
            let mut m = engine.load_music_stream(path);
            if !engine.is_music_ready(&m) {
                warn!("Skipping {}", path.display());
                continue;
            }
            m.looping = args.looping;
            engine.set_music_volume(&m, args.volume);
            engine.set_music_pitch(&m, args.pitch);
            engine.set_music_pan(&m, args.pan);
            info!(
                "{}: {}",
                path.display(),
                format_clock(engine.music_time_length(&m))
            );
            music.push(m);
        }

        if sounds.is_empty() && music.is_empty() {
            bail!("Nothing to play");
        }
        Ok(Self { sounds, music })
    }

    fn play(&mut self, engine: &AudioEngine) {
        for sound in &self.sounds {
            engine.play_sound(sound);
        }
        for music in &mut self.music {
            engine.update_music_stream(music);
            engine.play_music_stream(music);
        }
    }

    /// Pump music streams; false once nothing is playing
    fn tick(&mut self, engine: &AudioEngine) -> bool {
        for music in &mut self.music {
            engine.update_music_stream(music);
        }
        self.sounds.iter().any(|s| engine.is_sound_playing(s))
            || self.music.iter().any(|m| engine.is_music_stream_playing(m))
    }

    fn report(&self, engine: &AudioEngine) {
        for music in &self.music {
            info!(
                "{} / {}",
                format_clock(engine.music_time_played(music)),
                format_clock(engine.music_time_length(music))
            );
        }
    }

    fn unload(mut self, engine: &AudioEngine) {
        for sound in &mut self.sounds {
            engine.unload_sound(sound);
        }
        for music in &mut self.music {
            engine.unload_music_stream(music);
        }
    }
}

fn main() -> Result<()> {
    init_tracing("raudio=info");

    let args = Args::parse();

    if args.list_devices {
        for name in AudioOutput::list_devices().context("Failed to list output devices")? {
            println!("{}", name);
        }
        return Ok(());
    }

    let mut config = AudioConfig::load(args.config.as_deref()).context("Failed to load config")?;
    if let Some(device) = &args.device {
        config.device_name = Some(device.clone());
    }

    match &args.render {
        Some(path) => render(&args, &config, path),
        None => play(&args, &config),
    }
}

/// Play through the output device until everything finishes
fn play(args: &Args, config: &AudioConfig) -> Result<()> {
    let mut output = AudioOutput::new(config).context("Failed to open audio device")?;
    let engine = Arc::new(
        AudioEngine::new(&output.engine_config(config)).context("Failed to create audio engine")?,
    );
    let mut session = Session::load(&engine, args)?;

    output
        .start(Arc::clone(&engine))
        .context("Failed to start audio output")?;
    info!("Playing on {}", output.device_name());
    session.play(&engine);

    let started = Instant::now();
    let mut last_report = started;
    loop {
        if !session.tick(&engine) {
            break;
        }
        if args
            .seconds
            .is_some_and(|limit| started.elapsed().as_secs_f32() >= limit)
        {
            break;
        }
        if output.has_error() {
            output.try_recover().context("Audio output failed")?;
        }
        if last_report.elapsed() >= Duration::from_secs(1) {
            session.report(&engine);
            last_report = Instant::now();
        }
        thread::sleep(TICK);
    }

    output.stop().context("Failed to stop audio output")?;
    session.unload(&engine);
    info!("Playback finished");
    Ok(())
}

/// Mix offline in fixed chunks and write the result as 32-bit float WAV
fn render(args: &Args, config: &AudioConfig, path: &Path) -> Result<()> {
    if args.looping && args.seconds.is_none() {
        bail!("--render with --loop needs --seconds");
    }

    let engine = AudioEngine::new(config).context("Failed to create audio engine")?;
    let channels = engine.channels();
    let rate = engine.sample_rate();
    let mut session = Session::load(&engine, args)?;
    session.play(&engine);

    let mut mixed = Vec::new();
    let mut chunk = vec![0.0f32; RENDER_CHUNK_FRAMES * channels];
    let mut frames = 0u64;
    while session.tick(&engine) {
        if args
            .seconds
            .is_some_and(|limit| frames_to_seconds(frames, rate) >= limit)
        {
            break;
        }
        engine.mix(&mut chunk);
        mixed.extend_from_slice(&chunk);
        frames += RENDER_CHUNK_FRAMES as u64;
    }
    session.unload(&engine);

    let wave = Wave::from_samples(&mixed, rate, 32, channels)?;
    wave.export(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(
        "Rendered {} to {}",
        format_clock(frames_to_seconds(frames, rate)),
        path.display()
    );
    Ok(())
}
