//! PCM codec: float samples <-> 16-bit little-endian PCM <-> base64 text.
//!
//! Pure functions plus the two small sample-rate helpers the device layers need.

use crate::error::{LiveError, LiveResult};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use std::time::Duration;

/// Microphone capture rate expected by the remote service.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Rate of the synthesized speech sent back by the remote service.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

const PCM_SCALE: f32 = 32768.0;

/// Convert one float sample to 16-bit PCM: `round(s × 32768)`, clamped.
pub fn sample_to_i16(sample: f32) -> i16 {
    (sample * PCM_SCALE)
        .round()
        .clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Convert one 16-bit sample back to `[-1, 1]`.
pub fn sample_to_f32(sample: i16) -> f32 {
    sample as f32 / PCM_SCALE
}

/// A fixed-length block of 16-bit samples captured from the microphone.
/// Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pcm: Vec<i16>,
    sample_rate: u32,
}

impl AudioFrame {
    pub fn from_f32(samples: &[f32], sample_rate: u32) -> Self {
        Self {
            pcm: samples.iter().copied().map(sample_to_i16).collect(),
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.pcm
    }

    pub fn len(&self) -> usize {
        self.pcm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// MIME-like descriptor, e.g. `audio/pcm;rate=16000`.
    pub fn mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.sample_rate)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.pcm.len() as f64 / self.sample_rate.max(1) as f64)
    }

    /// Little-endian bytes, base64 encoded.
    pub fn to_base64(&self) -> String {
        let bytes: Vec<u8> = self.pcm.iter().flat_map(|s| s.to_le_bytes()).collect();
        B64.encode(bytes)
    }
}

/// Decoded audio ready for scheduling: interleaved samples in `[-1, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels: channels.max(1),
        }
    }

    /// Interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Duration in seconds on the output timeline.
    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate.max(1) as f64
    }

    /// Collapse to one channel by averaging.
    pub fn to_mono(&self) -> Vec<f32> {
        downmix_to_mono(&self.samples, self.channels)
    }
}

/// Encode float samples as base64 16-bit little-endian PCM.
pub fn encode_frame(samples: &[f32]) -> String {
    AudioFrame::from_f32(samples, INPUT_SAMPLE_RATE).to_base64()
}

/// Decode base64 16-bit little-endian PCM into normalized samples.
///
/// The byte length must be a multiple of `2 × channels`.
pub fn decode_frame(text: &str, sample_rate: u32, channels: u16) -> LiveResult<AudioBuffer> {
    if channels == 0 {
        return Err(LiveError::MalformedAudioData("zero channels".to_string()));
    }
    let bytes = B64
        .decode(text.trim())
        .map_err(|e| LiveError::MalformedAudioData(format!("invalid base64: {}", e)))?;
    let frame_bytes = 2 * channels as usize;
    if bytes.len() % frame_bytes != 0 {
        return Err(LiveError::MalformedAudioData(format!(
            "{} bytes is not a multiple of {} ({} channel(s) of 16-bit PCM)",
            bytes.len(),
            frame_bytes,
            channels
        )));
    }
    let samples = bytes
        .chunks_exact(2)
        .map(|b| sample_to_f32(i16::from_le_bytes([b[0], b[1]])))
        .collect();
    Ok(AudioBuffer::new(samples, sample_rate, channels))
}

/// Average interleaved channels down to mono.
pub fn downmix_to_mono(interleaved: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Streaming linear-interpolation resampler for mono audio.
///
/// Carries the last input sample across calls so block boundaries stay continuous.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    step: f64,
    pos: f64,
    prev: f32,
}

impl LinearResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        Self {
            step: from_rate.max(1) as f64 / to_rate.max(1) as f64,
            pos: 1.0,
            prev: 0.0,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        (self.step - 1.0).abs() < f64::EPSILON
    }

    /// Resample `input`, appending to `out`.
    pub fn process(&mut self, input: &[f32], out: &mut Vec<f32>) {
        if input.is_empty() {
            return;
        }
        if self.is_passthrough() {
            out.extend_from_slice(input);
            return;
        }
        // index 0 is the carried sample, index k is input[k - 1]
        let n = input.len() as f64;
        while self.pos <= n {
            let i = self.pos.floor() as usize;
            let frac = (self.pos - i as f64) as f32;
            let a = if i == 0 { self.prev } else { input[i - 1] };
            let b = input.get(i).copied().unwrap_or(a);
            out.push(a + (b - a) * frac);
            self.pos += self.step;
        }
        self.pos -= n;
        self.prev = input[input.len() - 1];
    }
}

/// One-shot resample of a complete mono buffer.
pub fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    let mut resampler = LinearResampler::new(from_rate, to_rate);
    let mut out = Vec::with_capacity(input.len() * to_rate.max(1) as usize / from_rate.max(1) as usize + 1);
    resampler.process(input, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_within_one_quantization_step() {
        let input: Vec<f32> = (0..=200).map(|i| -1.0 + i as f32 * 0.01).collect();
        let decoded = decode_frame(&encode_frame(&input), INPUT_SAMPLE_RATE, 1).unwrap();
        assert_eq!(decoded.samples().len(), input.len());
        for (a, b) in input.iter().zip(decoded.samples()) {
            assert!((a - b).abs() <= 1.0 / 32768.0 + 1e-6, "{} vs {}", a, b);
        }
    }

    #[test]
    fn full_scale_is_clamped() {
        assert_eq!(sample_to_i16(1.0), i16::MAX);
        assert_eq!(sample_to_i16(-1.0), i16::MIN);
        assert_eq!(sample_to_i16(3.5), i16::MAX);
        assert_eq!(sample_to_i16(0.0), 0);
    }

    #[test]
    fn odd_byte_count_is_malformed() {
        let text = B64.encode([1u8, 2, 3]);
        assert!(matches!(
            decode_frame(&text, OUTPUT_SAMPLE_RATE, 1),
            Err(LiveError::MalformedAudioData(_))
        ));
        // 6 bytes is fine for mono, not for stereo
        let text = B64.encode([0u8; 6]);
        assert!(decode_frame(&text, OUTPUT_SAMPLE_RATE, 1).is_ok());
        assert!(decode_frame(&text, OUTPUT_SAMPLE_RATE, 2).is_err());
    }

    #[test]
    fn invalid_base64_is_malformed() {
        assert!(matches!(
            decode_frame("%%%not-base64", OUTPUT_SAMPLE_RATE, 1),
            Err(LiveError::MalformedAudioData(_))
        ));
    }

    #[test]
    fn frame_descriptor_and_duration() {
        let frame = AudioFrame::from_f32(&vec![0.0; 4096], INPUT_SAMPLE_RATE);
        assert_eq!(frame.mime_type(), "audio/pcm;rate=16000");
        assert_eq!(frame.len(), 4096);
        assert_eq!(frame.duration(), Duration::from_millis(256));

        let buffer = AudioBuffer::new(vec![0.0; 24_000], OUTPUT_SAMPLE_RATE, 1);
        assert!((buffer.duration_secs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn resampler_keeps_length_ratio_across_blocks() {
        let mut r = LinearResampler::new(48_000, 16_000);
        let mut out = Vec::new();
        for _ in 0..10 {
            r.process(&vec![0.25; 480], &mut out);
        }
        assert!((out.len() as i64 - 1600).abs() <= 1, "got {}", out.len());
        assert!(out.iter().skip(1).all(|s| (s - 0.25).abs() < 1e-6));

        let up = resample_linear(&vec![0.5; 240], 24_000, 48_000);
        assert!((up.len() as i64 - 480).abs() <= 1);
    }

    #[test]
    fn downmix_averages_channels() {
        assert_eq!(downmix_to_mono(&[1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
        assert_eq!(downmix_to_mono(&[0.1, 0.2], 1), vec![0.1, 0.2]);
    }
}
