//! Codec adapters behind one streaming decode contract
//!
//! Every supported container decodes to interleaved, normalised f32 frames
//! through [`CodecStream`]. [`MusicContext`] is the closed set of adapters a
//! music stream can own.

pub mod decoder;
pub mod qoa;
pub mod tracker;

use crate::{Error, Result};
use decoder::DecoderStream;
use qoa::QoaStream;
use std::path::Path;
use tracker::TrackerStream;

/// Format reported by an opened codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub channels: usize,
    /// Total frames, 0 when unknown
    pub total_frames: u64,
    /// Source bit depth; 32 means float
    pub bits_per_sample: u32,
}

/// Streaming decode contract shared by every codec adapter
pub trait CodecStream: Send {
    fn info(&self) -> StreamInfo;

    /// Decode up to `max_frames` frames into `out`; 0 means exhausted
    fn decode_frames(&mut self, out: &mut [f32], max_frames: usize) -> usize;

    /// Rewind so the next decode starts at frame 0
    fn seek_to_start(&mut self);

    /// Position the stream so the next decode starts at `frame`
    fn seek_to_frame(&mut self, frame: u64) -> Result<()>;
}

/// Container/codec families, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    Wav,
    Ogg,
    Mp3,
    Flac,
    Qoa,
    Xm,
    Mod,
}

impl CodecKind {
    /// Match an extension with or without the leading dot, ignoring case
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "wav" => Some(CodecKind::Wav),
            "ogg" => Some(CodecKind::Ogg),
            "mp3" => Some(CodecKind::Mp3),
            "flac" => Some(CodecKind::Flac),
            "qoa" => Some(CodecKind::Qoa),
            "xm" => Some(CodecKind::Xm),
            "mod" => Some(CodecKind::Mod),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn extension(self) -> &'static str {
        match self {
            CodecKind::Wav => "wav",
            CodecKind::Ogg => "ogg",
            CodecKind::Mp3 => "mp3",
            CodecKind::Flac => "flac",
            CodecKind::Qoa => "qoa",
            CodecKind::Xm => "xm",
            CodecKind::Mod => "mod",
        }
    }

    /// Module formats render rather than decode and cannot seek
    pub fn is_tracker(self) -> bool {
        matches!(self, CodecKind::Xm | CodecKind::Mod)
    }
}

/// The decode context owned by a music stream
pub enum MusicContext {
    Wav(DecoderStream),
    Ogg(DecoderStream),
    Mp3(DecoderStream),
    Flac(DecoderStream),
    Qoa(QoaStream),
    Xm(TrackerStream),
    Mod(TrackerStream),
}

impl MusicContext {
    /// Open a file, picking the codec from its extension
    pub fn open(path: &Path) -> Result<Self> {
        let kind = CodecKind::from_path(path).ok_or_else(|| {
            Error::UnsupportedFormat(format!("unrecognised file extension: {}", path.display()))
        })?;
        let bytes = std::fs::read(path)?;
        Self::from_bytes(kind, bytes)
    }

    /// Open an in-memory file of type `ext` (".ogg", "xm", ...)
    pub fn open_memory(ext: &str, bytes: Vec<u8>) -> Result<Self> {
        let kind = CodecKind::from_extension(ext)
            .ok_or_else(|| Error::UnsupportedFormat(format!("unsupported file type: {}", ext)))?;
        Self::from_bytes(kind, bytes)
    }

    fn from_bytes(kind: CodecKind, bytes: Vec<u8>) -> Result<Self> {
        Ok(match kind {
            CodecKind::Wav => MusicContext::Wav(DecoderStream::from_bytes(bytes, kind.extension())?),
            CodecKind::Ogg => MusicContext::Ogg(DecoderStream::from_bytes(bytes, kind.extension())?),
            CodecKind::Mp3 => MusicContext::Mp3(DecoderStream::from_bytes(bytes, kind.extension())?),
            CodecKind::Flac => {
                MusicContext::Flac(DecoderStream::from_bytes(bytes, kind.extension())?)
            }
            CodecKind::Qoa => MusicContext::Qoa(QoaStream::from_bytes(bytes)?),
            CodecKind::Xm => MusicContext::Xm(TrackerStream::from_xm(&bytes)?),
            CodecKind::Mod => MusicContext::Mod(TrackerStream::from_mod(&bytes)?),
        })
    }

    pub fn kind(&self) -> CodecKind {
        match self {
            MusicContext::Wav(_) => CodecKind::Wav,
            MusicContext::Ogg(_) => CodecKind::Ogg,
            MusicContext::Mp3(_) => CodecKind::Mp3,
            MusicContext::Flac(_) => CodecKind::Flac,
            MusicContext::Qoa(_) => CodecKind::Qoa,
            MusicContext::Xm(_) => CodecKind::Xm,
            MusicContext::Mod(_) => CodecKind::Mod,
        }
    }

    fn stream(&self) -> &dyn CodecStream {
        match self {
            MusicContext::Wav(s)
            | MusicContext::Ogg(s)
            | MusicContext::Mp3(s)
            | MusicContext::Flac(s) => s,
            MusicContext::Qoa(s) => s,
            MusicContext::Xm(s) | MusicContext::Mod(s) => s,
        }
    }

    fn stream_mut(&mut self) -> &mut dyn CodecStream {
        match self {
            MusicContext::Wav(s)
            | MusicContext::Ogg(s)
            | MusicContext::Mp3(s)
            | MusicContext::Flac(s) => s,
            MusicContext::Qoa(s) => s,
            MusicContext::Xm(s) | MusicContext::Mod(s) => s,
        }
    }
}

impl CodecStream for MusicContext {
    fn info(&self) -> StreamInfo {
        self.stream().info()
    }

    fn decode_frames(&mut self, out: &mut [f32], max_frames: usize) -> usize {
        self.stream_mut().decode_frames(out, max_frames)
    }

    fn seek_to_start(&mut self) {
        self.stream_mut().seek_to_start()
    }

    fn seek_to_frame(&mut self, frame: u64) -> Result<()> {
        if self.kind().is_tracker() && frame != 0 {
            return Err(Error::InvalidInput(
                "module formats only support restarting from the beginning".to_string(),
            ));
        }
        self.stream_mut().seek_to_frame(frame)
    }
}

impl std::fmt::Debug for MusicContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MusicContext")
            .field("kind", &self.kind())
            .field("info", &self.info())
            .finish()
    }
}

/// Decode a whole stream into memory
pub fn decode_all(stream: &mut dyn CodecStream) -> Vec<f32> {
    const CHUNK_FRAMES: usize = 4096;
    let info = stream.info();
    let channels = info.channels.max(1);
    let mut samples = Vec::with_capacity(info.total_frames as usize * channels);
    let mut chunk = vec![0.0f32; CHUNK_FRAMES * channels];
    loop {
        let n = stream.decode_frames(&mut chunk, CHUNK_FRAMES);
        if n == 0 {
            break;
        }
        samples.extend_from_slice(&chunk[..n * channels]);
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(CodecKind::from_extension(".WAV"), Some(CodecKind::Wav));
        assert_eq!(CodecKind::from_extension("xm"), Some(CodecKind::Xm));
        assert_eq!(CodecKind::from_extension(".Qoa"), Some(CodecKind::Qoa));
        assert_eq!(CodecKind::from_extension("opus"), None);
    }

    #[test]
    fn test_kind_from_path() {
        assert_eq!(
            CodecKind::from_path(Path::new("music/theme.mod")),
            Some(CodecKind::Mod)
        );
        assert_eq!(CodecKind::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_unknown_extension_is_unsupported() {
        let err = MusicContext::open_memory(".aiff", vec![0; 16]).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }
}
