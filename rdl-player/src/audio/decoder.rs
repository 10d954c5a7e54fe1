//! Audio decoder using symphonia
//!
//! Decodes an in-memory audio resource (MP3, AAC, FLAC, Vorbis, WAV) to
//! interleaved stereo f32 in chunks, starting from any position.

use crate::audio::types::to_stereo;
use crate::error::{Error, Result};
use std::io::Cursor;
use std::sync::Arc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo, Track};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use tracing::{debug, warn};

/// Format facts learned when probing a resource
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioInfo {
    /// Source sample rate (before resampling)
    pub sample_rate: u32,
    /// Source channel count
    pub channels: u16,
    /// Duration in seconds, 0.0 if it cannot be determined
    pub duration_seconds: f64,
}

/// Open the format reader for `data` and pick the first decodable track
fn open_format(data: Arc<[u8]>, extension: Option<&str>) -> Result<(Box<dyn FormatReader>, Track)> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

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
        .cloned()
        .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;

    Ok((format, track))
}

/// Duration from the container header, if it declares one
fn declared_duration(track: &Track) -> Option<f64> {
    let params = &track.codec_params;
    let n_frames = params.n_frames?;

    match params.time_base {
        Some(time_base) => {
            let time = time_base.calc_time(n_frames);
            Some(time.seconds as f64 + time.frac)
        }
        None => params
            .sample_rate
            .filter(|&rate| rate > 0)
            .map(|rate| n_frames as f64 / rate as f64),
    }
}

/// Duration by walking every packet, for streams without a declared length
fn scanned_duration(format: &mut dyn FormatReader, track: &Track) -> f64 {
    let mut end_ts = 0u64;
    loop {
        match format.next_packet() {
            Ok(packet) if packet.track_id() == track.id => {
                end_ts = end_ts.max(packet.ts() + packet.dur());
            }
            Ok(_) => continue,
            Err(_) => break,
        }
    }

    let params = &track.codec_params;
    match (params.time_base, params.sample_rate) {
        (Some(time_base), _) => {
            let time = time_base.calc_time(end_ts);
            time.seconds as f64 + time.frac
        }
        (None, Some(rate)) if rate > 0 => end_ts as f64 / rate as f64,
        _ => 0.0,
    }
}

/// Probe `data` for sample rate, channel count and duration
pub fn probe(data: Arc<[u8]>, extension: Option<&str>) -> Result<AudioInfo> {
    let (mut format, track) = open_format(data, extension)?;
    let params = &track.codec_params;

    let sample_rate = params
        .sample_rate
        .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;
    let channels = params.channels.map(|c| c.count() as u16).unwrap_or(2);

    let duration_seconds = match declared_duration(&track) {
        Some(duration) => duration,
        None => {
            debug!("No declared duration, scanning packets");
            scanned_duration(format.as_mut(), &track)
        }
    };

    debug!(sample_rate, channels, duration_seconds, "Probed audio");

    Ok(AudioInfo {
        sample_rate,
        channels,
        duration_seconds,
    })
}

/// Chunked decoder over an in-memory resource
pub struct StreamDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    /// Decoded frames before this timestamp are dropped (accurate seek)
    skip_until_ts: u64,
    eof: bool,
}

impl StreamDecoder {
    pub fn open(data: Arc<[u8]>, extension: Option<&str>) -> Result<Self> {
        let (format, track) = open_format(data, extension)?;

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        Ok(Self {
            format,
            decoder,
            track_id: track.id,
            sample_rate,
            skip_until_ts: 0,
            eof: false,
        })
    }

    /// Source sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Position the decoder at `position_seconds`.
    ///
    /// A position the container cannot reach (past the end) leaves the
    /// decoder exhausted.
    pub fn seek(&mut self, position_seconds: f64) {
        let secs = position_seconds.max(0.0);
        let time = Time::new(secs.trunc() as u64, secs.fract());

        match self.format.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time,
                track_id: Some(self.track_id),
            },
        ) {
            Ok(seeked) => {
                self.decoder.reset();
                self.skip_until_ts = seeked.required_ts;
                self.eof = false;
                debug!(
                    required_ts = seeked.required_ts,
                    actual_ts = seeked.actual_ts,
                    "Seeked"
                );
            }
            Err(e) => {
                debug!("Seek to {:.3}s failed: {}", secs, e);
                self.eof = true;
            }
        }
    }

    /// Decode the next chunk as interleaved stereo.
    ///
    /// Returns `Ok(None)` at end of stream. Corrupt packets are skipped.
    pub fn next_chunk(&mut self) -> Result<Option<Vec<f32>>> {
        loop {
            if self.eof {
                return Ok(None);
            }

            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.eof = true;
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    // Track list changed mid-stream; treat as the end
                    self.eof = true;
                    return Ok(None);
                }
                Err(e) => return Err(Error::Decode(format!("Failed to read packet: {}", e))),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping corrupt packet: {}", e);
                    continue;
                }
                Err(e) => return Err(Error::Decode(format!("Decode failed: {}", e))),
            };

            let frames = decoded.frames();
            if frames == 0 {
                continue;
            }
            let spec = *decoded.spec();
            let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buffer.copy_interleaved_ref(decoded);

            let mut samples = to_stereo(buffer.samples(), spec.channels.count());

            let ts = packet.ts();
            if ts < self.skip_until_ts {
                let skip = ((self.skip_until_ts - ts) as usize).min(frames);
                samples.drain(..(skip * 2).min(samples.len()));
                if samples.is_empty() {
                    continue;
                }
            }

            return Ok(Some(samples));
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    /// In-memory 16-bit WAV of a quiet ramp, `seconds` long
    pub(crate) fn wav_bytes(sample_rate: u32, channels: u16, seconds: f64) -> Arc<[u8]> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            let frames = (sample_rate as f64 * seconds) as u32;
            for i in 0..frames {
                for _ in 0..channels {
                    writer.write_sample(((i % 200) as i16) * 10).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        Arc::from(cursor.into_inner())
    }

    fn decode_all(decoder: &mut StreamDecoder) -> usize {
        let mut samples = 0;
        while let Some(chunk) = decoder.next_chunk().unwrap() {
            samples += chunk.len();
        }
        samples / 2
    }

    #[test]
    fn test_probe_wav() {
        let info = probe(wav_bytes(8000, 1, 2.0), Some("wav")).unwrap();
        assert_eq!(info.sample_rate, 8000);
        assert_eq!(info.channels, 1);
        assert!((info.duration_seconds - 2.0).abs() < 0.01);
    }

    #[test]
    fn test_probe_rejects_garbage() {
        let data: Arc<[u8]> = Arc::from(vec![0u8; 64]);
        assert!(matches!(probe(data, None), Err(Error::Decode(_))));
    }

    #[test]
    fn test_decode_mono_as_stereo() {
        let mut decoder = StreamDecoder::open(wav_bytes(8000, 1, 1.0), Some("wav")).unwrap();
        assert_eq!(decoder.sample_rate(), 8000);
        assert_eq!(decode_all(&mut decoder), 8000);
    }

    #[test]
    fn test_seek_skips_to_position() {
        let mut decoder = StreamDecoder::open(wav_bytes(8000, 2, 2.0), Some("wav")).unwrap();
        decoder.seek(1.5);
        let frames = decode_all(&mut decoder);
        assert!((frames as i64 - 4000).abs() <= 1, "decoded {} frames", frames);
    }

    #[test]
    fn test_seek_past_end_is_exhausted() {
        let mut decoder = StreamDecoder::open(wav_bytes(8000, 2, 1.0), Some("wav")).unwrap();
        decoder.seek(30.0);
        assert!(decoder.next_chunk().unwrap().is_none());
    }
}
