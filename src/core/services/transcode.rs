//! In-memory transcoding of voice containers into the formats the speech
//! backends accept: PCM16 WAV for the web recognizer, FLAC for the cloud one.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

/// Both backends are fed 16kHz mono.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("audio decode failed: {0}")]
    Decode(String),

    #[error("resample failed: {0}")]
    Resample(String),

    #[error("flac encode failed: {0}")]
    FlacEncode(String),

    #[error("malformed wav data: {0}")]
    MalformedWav(String),
}

/// Decoded waveform buffer, kept alongside its rate so calibration can work
/// in sample units.
pub struct WavAudio {
    pub sample_rate: u32,
    pub samples: Vec<i16>,
}

impl WavAudio {
    /// Serialize as a standard 44-byte-header RIFF/WAVE file, PCM16 mono.
    pub fn to_bytes(&self) -> Vec<u8> {
        let channels: u16 = 1;
        let bits_per_sample: u16 = 16;
        let byte_rate = self.sample_rate * u32::from(channels) * u32::from(bits_per_sample) / 8;
        let block_align = channels * bits_per_sample / 8;
        let data_size = (self.samples.len() * 2) as u32;

        let mut buf = Vec::with_capacity(44 + data_size as usize);
        buf.extend_from_slice(b"RIFF");
        buf.extend_from_slice(&(36 + data_size).to_le_bytes());
        buf.extend_from_slice(b"WAVE");
        buf.extend_from_slice(b"fmt ");
        buf.extend_from_slice(&16u32.to_le_bytes());
        buf.extend_from_slice(&1u16.to_le_bytes());
        buf.extend_from_slice(&channels.to_le_bytes());
        buf.extend_from_slice(&self.sample_rate.to_le_bytes());
        buf.extend_from_slice(&byte_rate.to_le_bytes());
        buf.extend_from_slice(&block_align.to_le_bytes());
        buf.extend_from_slice(&bits_per_sample.to_le_bytes());
        buf.extend_from_slice(b"data");
        buf.extend_from_slice(&data_size.to_le_bytes());
        for s in &self.samples {
            buf.extend_from_slice(&s.to_le_bytes());
        }
        buf
    }

    /// Parse a PCM16 mono WAV buffer produced by [`to_wav`].
    pub fn from_bytes(data: &[u8]) -> Result<Self, TranscodeError> {
        if data.len() < 44 || &data[0..4] != b"RIFF" || &data[8..12] != b"WAVE" {
            return Err(TranscodeError::MalformedWav("missing RIFF header".into()));
        }

        let mut sample_rate = None;
        let mut pcm: Option<&[u8]> = None;
        let mut pos = 12;
        while pos + 8 <= data.len() {
            let chunk_id = &data[pos..pos + 4];
            let chunk_len =
                u32::from_le_bytes([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]])
                    as usize;
            let body = pos + 8;
            if body + chunk_len > data.len() {
                return Err(TranscodeError::MalformedWav("truncated chunk".into()));
            }
            match chunk_id {
                b"fmt " => {
                    if chunk_len < 16 {
                        return Err(TranscodeError::MalformedWav("short fmt chunk".into()));
                    }
                    sample_rate = Some(u32::from_le_bytes([
                        data[body + 4],
                        data[body + 5],
                        data[body + 6],
                        data[body + 7],
                    ]));
                }
                b"data" => pcm = Some(&data[body..body + chunk_len]),
                _ => {}
            }
            pos = body + chunk_len + (chunk_len & 1);
        }

        let sample_rate =
            sample_rate.ok_or_else(|| TranscodeError::MalformedWav("no fmt chunk".into()))?;
        let pcm = pcm.ok_or_else(|| TranscodeError::MalformedWav("no data chunk".into()))?;
        let samples = pcm
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();

        Ok(WavAudio {
            sample_rate,
            samples,
        })
    }
}

/// Re-encode the voice blob as PCM16 mono 16kHz WAV.
pub fn to_wav(data: &[u8], mime_type: &str) -> Result<Vec<u8>, TranscodeError> {
    let samples = decode_to_pcm(data, mime_type)?;
    Ok(WavAudio {
        sample_rate: TARGET_SAMPLE_RATE,
        samples,
    }
    .to_bytes())
}

/// Re-encode the voice blob as 16-bit mono 16kHz FLAC.
pub fn to_flac(data: &[u8], mime_type: &str) -> Result<Vec<u8>, TranscodeError> {
    let samples = decode_to_pcm(data, mime_type)?;
    encode_flac(&samples)
}

fn encode_flac(samples: &[i16]) -> Result<Vec<u8>, TranscodeError> {
    use flacenc::bitsink::ByteSink;
    use flacenc::component::BitRepr;
    use flacenc::error::Verify;

    let widened: Vec<i32> = samples.iter().map(|&s| i32::from(s)).collect();

    let config = flacenc::config::Encoder::default()
        .into_verified()
        .map_err(|(_, e)| TranscodeError::FlacEncode(format!("config: {e}")))?;
    let source =
        flacenc::source::MemSource::from_samples(&widened, 1, 16, TARGET_SAMPLE_RATE as usize);
    let stream = flacenc::encode_with_fixed_block_size(&config, source, config.block_size)
        .map_err(|e| TranscodeError::FlacEncode(format!("{e:?}")))?;

    let mut sink = ByteSink::new();
    stream
        .write(&mut sink)
        .map_err(|e| TranscodeError::FlacEncode(format!("{e:?}")))?;
    Ok(sink.as_slice().to_vec())
}

/// Decode whatever container the platform handed us into 16kHz mono i16.
fn decode_to_pcm(data: &[u8], mime_type: &str) -> Result<Vec<i16>, TranscodeError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data.to_vec())), Default::default());

    let mut hint = Hint::new();
    // Telegram voice notes arrive as audio/ogg; the rest covers forwarded files.
    let extension = match mime_type {
        "audio/ogg" | "audio/opus" => Some("ogg"),
        "audio/wav" | "audio/wave" | "audio/x-wav" => Some("wav"),
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" | "audio/aac" => Some("m4a"),
        _ => None,
    };
    if let Some(extension) = extension {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| TranscodeError::Decode(format!("probe failed: {e}")))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| TranscodeError::Decode("no audio track found".into()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let source_rate = codec_params.sample_rate.unwrap_or(TARGET_SAMPLE_RATE);
    let channels = codec_params.channels.map_or(1, |c| c.count());

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| TranscodeError::Decode(format!("codec init failed: {e}")))?;

    let mut pcm: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break
            }
            Err(e) => return Err(TranscodeError::Decode(format!("packet read: {e}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder
            .decode(&packet)
            .map_err(|e| TranscodeError::Decode(format!("decode: {e}")))?;
        let spec = *decoded.spec();
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        downmix(&mut pcm, sample_buf.samples(), channels);
    }

    if pcm.is_empty() {
        return Err(TranscodeError::Decode("no audio samples decoded".into()));
    }
    if source_rate != TARGET_SAMPLE_RATE {
        pcm = resample(&pcm, source_rate, TARGET_SAMPLE_RATE)?;
    }

    Ok(pcm
        .into_iter()
        .map(|s| (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16)
        .collect())
}

fn downmix(pcm: &mut Vec<f32>, interleaved: &[f32], channels: usize) {
    if channels <= 1 {
        pcm.extend_from_slice(interleaved);
        return;
    }
    pcm.extend(
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
    );
}

fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, TranscodeError> {
    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
    };

    const CHUNK_SIZE: usize = 1024;
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = f64::from(to_rate) / f64::from(from_rate);

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, CHUNK_SIZE, 1)
        .map_err(|e| TranscodeError::Resample(format!("init: {e}")))?;

    let mut output = Vec::with_capacity((samples.len() as f64 * ratio) as usize + CHUNK_SIZE);
    for chunk in samples.chunks(CHUNK_SIZE) {
        // The fixed-input resampler wants full chunks; zero-pad the tail.
        let mut frame = chunk.to_vec();
        frame.resize(CHUNK_SIZE, 0.0);

        let resampled = resampler
            .process(&[frame], None)
            .map_err(|e| TranscodeError::Resample(format!("process: {e}")))?;
        if let Some(channel) = resampled.first() {
            output.extend_from_slice(channel);
        }
    }

    Ok(output)
}
