//! WAV, OGG, MP3 and FLAC decoding through symphonia
//!
//! Packets are decoded on demand; any frames beyond what a caller asked for
//! are kept in `pending` for the next call.

use super::{CodecStream, StreamInfo};
use crate::error::{Error, Result};
use std::io::Cursor;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::conv::IntoSample;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::{Sample, SampleFormat as SymphoniaSampleFormat};
use tracing::{debug, warn};

/// Streaming symphonia decoder over an in-memory file
pub struct DecoderStream {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    info: StreamInfo,
    pending: Vec<f32>,
    pending_pos: usize,
    /// Frames still to discard after an inexact seek
    skip_frames: u64,
    finished: bool,
}

impl DecoderStream {
    /// Probe `bytes` (hinted by `extension`) and open its first audio track
    pub fn from_bytes(bytes: Vec<u8>, extension: &str) -> Result<Self> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let mut hint = Hint::new();
        hint.with_extension(extension);

        let format_opts = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };
        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &MetadataOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to probe format: {}", e)))?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;

        let track_id = track.id;
        let params = track.codec_params.clone();

        let sample_rate = params
            .sample_rate
            .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;
        let channels = params
            .channels
            .map(|c| c.count())
            .ok_or_else(|| Error::Decode("Channel count not found".to_string()))?;

        let bits_per_sample = match params.sample_format {
            Some(SymphoniaSampleFormat::F32) | Some(SymphoniaSampleFormat::F64) => 32,
            _ => params.bits_per_sample.unwrap_or(32),
        };

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        let mut stream = Self {
            format,
            decoder,
            track_id,
            info: StreamInfo {
                sample_rate,
                channels,
                total_frames: params.n_frames.unwrap_or(0),
                bits_per_sample,
            },
            pending: Vec::new(),
            pending_pos: 0,
            skip_frames: 0,
            finished: false,
        };

        if stream.info.total_frames == 0 {
            stream.info.total_frames = stream.count_frames();
            stream.seek_to_frame(0)?;
        }

        debug!(
            "Opened {} stream: {} Hz, {} channels, {} frames",
            extension, sample_rate, channels, stream.info.total_frames
        );
        Ok(stream)
    }

    /// Walk every packet once to total the frame count
    fn count_frames(&mut self) -> u64 {
        let mut frames = 0u64;
        loop {
            match self.format.next_packet() {
                Ok(packet) if packet.track_id() == self.track_id => frames += packet.dur,
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        frames
    }

    /// Decode the next packet into `pending`; false at end of stream
    fn decode_next_packet(&mut self) -> bool {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return false;
                }
                Err(e) => {
                    warn!("Error reading packet: {}", e);
                    return false;
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    self.pending.clear();
                    self.pending_pos = 0;
                    convert_samples_to_f32(&decoded, &mut self.pending);
                    self.drop_skipped_frames();
                    if self.pending.is_empty() {
                        continue;
                    }
                    return true;
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Decode error: {}", e);
                    continue;
                }
                Err(e) => {
                    warn!("Decoder failed: {}", e);
                    return false;
                }
            }
        }
    }

    fn drop_skipped_frames(&mut self) {
        if self.skip_frames == 0 {
            return;
        }
        let channels = self.info.channels;
        let available = (self.pending.len() / channels) as u64;
        let skip = self.skip_frames.min(available);
        self.pending_pos = skip as usize * channels;
        self.skip_frames -= skip;
    }
}

impl CodecStream for DecoderStream {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn decode_frames(&mut self, out: &mut [f32], max_frames: usize) -> usize {
        let channels = self.info.channels;
        let max_frames = max_frames.min(out.len() / channels);
        let mut frames = 0;

        while frames < max_frames {
            if self.pending_pos >= self.pending.len() {
                if self.finished || !self.decode_next_packet() {
                    self.finished = true;
                    break;
                }
            }
            let available = (self.pending.len() - self.pending_pos) / channels;
            let n = available.min(max_frames - frames);
            out[frames * channels..(frames + n) * channels]
                .copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + n * channels]);
            self.pending_pos += n * channels;
            frames += n;
        }
        frames
    }

    fn seek_to_start(&mut self) {
        if let Err(e) = self.seek_to_frame(0) {
            warn!("Failed to rewind stream: {}", e);
        }
    }

    fn seek_to_frame(&mut self, frame: u64) -> Result<()> {
        let seeked = self
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: frame,
                    track_id: self.track_id,
                },
            )
            .map_err(|e| Error::Decode(format!("Seek to frame {} failed: {}", frame, e)))?;

        self.decoder.reset();
        self.pending.clear();
        self.pending_pos = 0;
        self.skip_frames = seeked.required_ts.saturating_sub(seeked.actual_ts);
        self.finished = false;
        Ok(())
    }
}

/// Append a decoded buffer to `output` as interleaved f32
fn convert_samples_to_f32(decoded: &AudioBufferRef, output: &mut Vec<f32>) {
    match decoded {
        AudioBufferRef::U8(buf) => interleave(&**buf, output),
        AudioBufferRef::U16(buf) => interleave(&**buf, output),
        AudioBufferRef::U24(buf) => interleave(&**buf, output),
        AudioBufferRef::U32(buf) => interleave(&**buf, output),
        AudioBufferRef::S8(buf) => interleave(&**buf, output),
        AudioBufferRef::S16(buf) => interleave(&**buf, output),
        AudioBufferRef::S24(buf) => interleave(&**buf, output),
        AudioBufferRef::S32(buf) => interleave(&**buf, output),
        AudioBufferRef::F32(buf) => interleave(&**buf, output),
        AudioBufferRef::F64(buf) => interleave(&**buf, output),
    }
}

fn interleave<S>(buf: &AudioBuffer<S>, output: &mut Vec<f32>)
where
    S: Sample + IntoSample<f32>,
{
    let num_channels = buf.spec().channels.count();
    let num_frames = buf.frames();
    output.reserve(num_frames * num_channels);

    for frame_idx in 0..num_frames {
        for ch_idx in 0..num_channels {
            output.push(buf.chan(ch_idx)[frame_idx].into_sample());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(samples: &[i16], channels: u16, sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_wav_info() {
        let bytes = wav_bytes(&vec![0i16; 2000], 2, 22050);
        let stream = DecoderStream::from_bytes(bytes, "wav").unwrap();
        let info = stream.info();
        assert_eq!(info.sample_rate, 22050);
        assert_eq!(info.channels, 2);
        assert_eq!(info.total_frames, 1000);
        assert_eq!(info.bits_per_sample, 16);
    }

    #[test]
    fn test_decode_in_small_chunks() {
        let samples: Vec<i16> = (0..500).map(|i| (i * 16) as i16).collect();
        let bytes = wav_bytes(&samples, 1, 8000);
        let mut stream = DecoderStream::from_bytes(bytes, "wav").unwrap();

        let mut out = vec![0.0f32; 7];
        let mut decoded = Vec::new();
        loop {
            let n = stream.decode_frames(&mut out, 7);
            if n == 0 {
                break;
            }
            decoded.extend_from_slice(&out[..n]);
        }
        assert_eq!(decoded.len(), 500);
        assert_eq!(decoded[1], 16.0 / 32768.0);
        assert_eq!(decoded[499], (499.0 * 16.0) / 32768.0);
    }

    #[test]
    fn test_seek_to_start_replays() {
        let samples: Vec<i16> = (0..300).map(|i| i as i16).collect();
        let bytes = wav_bytes(&samples, 1, 8000);
        let mut stream = DecoderStream::from_bytes(bytes, "wav").unwrap();

        let mut first = vec![0.0f32; 300];
        assert_eq!(stream.decode_frames(&mut first, 300), 300);
        let mut out = vec![0.0f32; 10];
        assert_eq!(stream.decode_frames(&mut out, 10), 0);

        stream.seek_to_start();
        let mut again = vec![0.0f32; 300];
        assert_eq!(stream.decode_frames(&mut again, 300), 300);
        assert_eq!(first, again);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(DecoderStream::from_bytes(vec![1, 2, 3, 4, 5], "wav").is_err());
    }
}
