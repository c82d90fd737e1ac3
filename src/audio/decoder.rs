use std::fs::File;
use std::path::Path;
use std::time::Duration;

use log::{debug, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::audio::MetadataExtractor;
use crate::error::DecodeError;
use crate::models::{AudioBuffer, AudioMetadata};

/// Core trait for audio decoding functionality
pub trait AudioDecoder: Send {
    /// Decode the next chunk of audio data, `None` at end of stream
    fn decode_next(&mut self) -> Result<Option<AudioBuffer>, DecodeError>;

    /// Get metadata information about the audio file
    fn metadata(&self) -> &AudioMetadata;

    /// Get the total duration reported by the container
    fn duration(&self) -> Duration;

    /// Get the sample rate of the audio file
    fn sample_rate(&self) -> u32;

    /// Get the number of audio channels
    fn channels(&self) -> u16;
}

/// Decoder for every container/codec pair symphonia can probe
pub struct SymphoniaDecoder {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    metadata: AudioMetadata,
    duration: Duration,
    sample_rate: u32,
    channels: u16,
}

impl SymphoniaDecoder {
    /// Open and probe the file at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DecodeError> {
        let file = File::open(&path)
            .map_err(|e| DecodeError::DecodeFailed(format!("Failed to open file: {}", e)))?;

        let media_source = MediaSourceStream::new(Box::new(file), Default::default());

        // Create a hint to help the format registry guess the format
        let mut hint = Hint::new();
        if let Some(ext_str) = path.as_ref().extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext_str);
        }

        let mut probed = symphonia::default::get_probe()
            .format(&hint, media_source, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| DecodeError::UnsupportedFormat {
                format: format!("Probe failed: {}", e),
            })?;

        let track = probed
            .format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::UnsupportedFormat {
                format: "No audio track found".to_string(),
            })?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::UnsupportedFormat {
                format: format!("No decoder for codec: {}", e),
            })?;

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| DecodeError::CorruptedFile("Missing sample rate".to_string()))?;
        let channels = codec_params.channels.map(|c| c.count() as u16).unwrap_or(2);

        let duration = codec_params
            .n_frames
            .map(|n_frames| Duration::from_secs_f64(n_frames as f64 / sample_rate as f64))
            .unwrap_or(Duration::ZERO);

        let metadata = MetadataExtractor::extract(&mut probed.metadata, probed.format.as_mut());

        debug!(
            "Opened {} ({} Hz, {} ch, {:.2}s)",
            path.as_ref().display(),
            sample_rate,
            channels,
            duration.as_secs_f64()
        );

        Ok(Self {
            format_reader: probed.format,
            decoder,
            track_id,
            metadata,
            duration,
            sample_rate,
            channels,
        })
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn decode_next(&mut self) -> Result<Option<AudioBuffer>, DecodeError> {
        loop {
            let packet = match self.format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                // A new logical stream starts here; only the first one is played
                Err(SymphoniaError::ResetRequired) => return Ok(None),
                Err(err) => {
                    return Err(DecodeError::DecodeFailed(format!("Failed to read packet: {}", err)));
                }
            };

            // Only process packets for our track
            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let frames = decoded.frames();
                    if frames == 0 {
                        continue;
                    }
                    let spec = *decoded.spec();
                    let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    sample_buf.copy_interleaved_ref(decoded);

                    return Ok(Some(AudioBuffer {
                        samples: sample_buf.samples().to_vec(),
                        channels: spec.channels.count() as u16,
                        sample_rate: spec.rate,
                        frames,
                    }));
                }
                Err(SymphoniaError::DecodeError(msg)) => {
                    // Corrupt packet: skip it and keep going
                    warn!("Skipping undecodable packet: {}", msg);
                    continue;
                }
                Err(e) => return Err(DecodeError::DecodeFailed(format!("Failed to decode packet: {}", e))),
            }
        }
    }

    fn metadata(&self) -> &AudioMetadata {
        &self.metadata
    }

    fn duration(&self) -> Duration {
        self.duration
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }
}

/// Fully decoded, seekable PCM for one track.
///
/// Samples are interleaved f32. The stream is immutable once built, so the
/// audio thread can read any frame range without synchronising with the
/// decoder.
#[derive(Debug, Clone)]
pub struct DecodedStream {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
    frames: u64,
}

impl DecodedStream {
    pub fn from_interleaved(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        let frames = (samples.len() / channels as usize) as u64;
        Self {
            samples,
            channels,
            sample_rate,
            frames,
        }
    }

    /// Drain `decoder` into memory
    pub fn decode_all(decoder: &mut dyn AudioDecoder) -> Result<Self, DecodeError> {
        let channels = decoder.channels().max(1);
        let sample_rate = decoder.sample_rate();
        if sample_rate == 0 {
            return Err(DecodeError::CorruptedFile("Sample rate is zero".to_string()));
        }

        let expected = decoder.duration().as_secs_f64() * sample_rate as f64 * channels as f64;
        let mut samples = Vec::with_capacity(expected.max(0.0) as usize);

        while let Some(buffer) = decoder.decode_next()? {
            if buffer.channels == channels {
                samples.extend_from_slice(&buffer.samples);
            } else {
                let start = samples.len();
                samples.resize(start + buffer.frames * channels as usize, 0.0);
                remap_channels(&buffer.samples, buffer.channels as usize, &mut samples[start..], channels as usize, buffer.frames);
            }
        }

        if samples.is_empty() {
            return Err(DecodeError::CorruptedFile("File contains no audio frames".to_string()));
        }

        Ok(Self::from_interleaved(samples, channels, sample_rate))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn len_frames(&self) -> u64 {
        self.frames
    }

    pub fn length_seconds(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }

    /// Interleaved samples of the whole stream
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Copy frames starting at `start_frame` into `dest` (interleaved with
    /// `out_channels`), converting channel layout as needed. Frames past the
    /// end of the stream are written as silence. Returns the number of frames
    /// actually taken from the stream.
    pub fn read_into(&self, start_frame: u64, dest: &mut [f32], out_channels: usize) -> usize {
        if out_channels == 0 {
            return 0;
        }
        let wanted = dest.len() / out_channels;
        let available = self.frames.saturating_sub(start_frame).min(wanted as u64) as usize;

        if available > 0 {
            let src_ch = self.channels as usize;
            let begin = start_frame as usize * src_ch;
            let src = &self.samples[begin..begin + available * src_ch];
            remap_channels(src, src_ch, &mut dest[..available * out_channels], out_channels, available);
        }
        dest[available * out_channels..].fill(0.0);

        available
    }
}

/// Upmix/downmix interleaved frames between channel layouts
fn remap_channels(src: &[f32], src_ch: usize, dst: &mut [f32], dst_ch: usize, frames: usize) {
    if src_ch == dst_ch {
        dst[..frames * dst_ch].copy_from_slice(&src[..frames * src_ch]);
    } else if dst_ch == 1 {
        // Downmix to mono by averaging channels
        for f in 0..frames {
            let frame = &src[f * src_ch..(f + 1) * src_ch];
            dst[f] = frame.iter().sum::<f32>() / src_ch as f32;
        }
    } else if src_ch == 1 {
        // Mono to every output channel
        for f in 0..frames {
            dst[f * dst_ch..(f + 1) * dst_ch].fill(src[f]);
        }
    } else {
        // Copy available channels, pad with silence
        for f in 0..frames {
            for c in 0..dst_ch {
                dst[f * dst_ch + c] = if c < src_ch { src[f * src_ch + c] } else { 0.0 };
            }
        }
    }
}

/// Open, decode and tag-read a file on the calling thread
pub fn open_file(path: &Path) -> Result<(DecodedStream, AudioMetadata, Duration), DecodeError> {
    let mut decoder = SymphoniaDecoder::open(path)?;
    let metadata = decoder.metadata().clone();
    let reported = decoder.duration();
    let stream = DecodedStream::decode_all(&mut decoder)?;
    Ok((stream, metadata, reported))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Write a 16-bit PCM WAV file filled with `value`
    pub(crate) fn write_test_wav(dir: &Path, name: &str, sample_rate: u32, channels: u16, seconds: f64, value: f32) -> PathBuf {
        let frames = (seconds * sample_rate as f64).round() as u32;
        let data_len = frames * channels as u32 * 2;
        let sample = (value.clamp(-1.0, 1.0) * 32767.0) as i16;

        let mut bytes = Vec::with_capacity(44 + data_len as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(sample_rate * channels as u32 * 2).to_le_bytes());
        bytes.extend_from_slice(&(channels * 2).to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for _ in 0..frames * channels as u32 {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }

        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(&bytes).unwrap();
        path
    }

    struct ScriptedDecoder {
        buffers: Vec<AudioBuffer>,
        metadata: AudioMetadata,
    }

    impl AudioDecoder for ScriptedDecoder {
        fn decode_next(&mut self) -> Result<Option<AudioBuffer>, DecodeError> {
            if self.buffers.is_empty() {
                Ok(None)
            } else {
                Ok(Some(self.buffers.remove(0)))
            }
        }

        fn metadata(&self) -> &AudioMetadata {
            &self.metadata
        }

        fn duration(&self) -> Duration {
            Duration::from_millis(4)
        }

        fn sample_rate(&self) -> u32 {
            1000
        }

        fn channels(&self) -> u16 {
            2
        }
    }

    #[test]
    fn test_decode_all_concatenates_buffers() {
        let mut decoder = ScriptedDecoder {
            buffers: vec![
                AudioBuffer { samples: vec![0.1, 0.2, 0.3, 0.4], channels: 2, sample_rate: 1000, frames: 2 },
                AudioBuffer { samples: vec![0.5, 0.6], channels: 2, sample_rate: 1000, frames: 1 },
                // mono packet gets upmixed to the stream layout
                AudioBuffer { samples: vec![0.9], channels: 1, sample_rate: 1000, frames: 1 },
            ],
            metadata: AudioMetadata::new(),
        };

        let stream = DecodedStream::decode_all(&mut decoder).unwrap();
        assert_eq!(stream.len_frames(), 4);
        assert_eq!(stream.samples(), &[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.9, 0.9]);
        assert!((stream.length_seconds() - 0.004).abs() < 1e-9);
    }

    #[test]
    fn test_decode_all_rejects_empty_stream() {
        let mut decoder = ScriptedDecoder { buffers: Vec::new(), metadata: AudioMetadata::new() };
        let result = DecodedStream::decode_all(&mut decoder);
        assert!(matches!(result, Err(DecodeError::CorruptedFile(_))));
    }

    #[test]
    fn test_read_into_pads_past_end() {
        let stream = DecodedStream::from_interleaved(vec![1.0, 2.0, 3.0], 1, 100);
        let mut dest = [9.0f32; 10];

        let read = stream.read_into(1, &mut dest, 2);
        assert_eq!(read, 2);
        assert_eq!(dest, [2.0, 2.0, 3.0, 3.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);

        let read = stream.read_into(7, &mut dest, 2);
        assert_eq!(read, 0);
        assert!(dest.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_read_into_downmixes_to_mono() {
        let stream = DecodedStream::from_interleaved(vec![0.2, 0.4, -1.0, 1.0], 2, 100);
        let mut dest = [0.0f32; 2];
        assert_eq!(stream.read_into(0, &mut dest, 1), 2);
        assert!((dest[0] - 0.3).abs() < 1e-6);
        assert_eq!(dest[1], 0.0);
    }

    #[test]
    fn test_open_wav_file() {
        let dir = TempDir::new().unwrap();
        let path = write_test_wav(dir.path(), "tone.wav", 8000, 2, 1.5, 0.5);

        let (stream, metadata, reported) = open_file(&path).unwrap();
        assert_eq!(stream.sample_rate(), 8000);
        assert_eq!(stream.channels(), 2);
        assert_eq!(stream.len_frames(), 12000);
        assert!((reported.as_secs_f64() - 1.5).abs() < 1e-6);
        assert!((stream.samples()[0] - 0.5).abs() < 1e-3);
        assert!(metadata.artist.is_none());
    }

    #[test]
    fn test_open_missing_file() {
        let result = SymphoniaDecoder::open("/nonexistent/file.flac");
        match result {
            Err(DecodeError::DecodeFailed(msg)) => assert!(msg.contains("Failed to open file")),
            _ => panic!("Expected DecodeFailed error"),
        }
    }

    #[test]
    fn test_open_garbage_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("noise.wav");
        std::fs::write(&path, b"definitely not audio data").unwrap();

        let result = SymphoniaDecoder::open(&path);
        assert!(matches!(result, Err(DecodeError::UnsupportedFormat { .. })));
    }
}
