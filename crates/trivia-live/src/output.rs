//! Speaker output through `cpal`: a small timeline mixer.
//!
//! Every started chunk is resampled to the device rate and placed at its start
//! sample. The device callback sums whatever overlaps the buffer being rendered,
//! applies the host-volume gain and advances the clock. Chunks that have fully
//! played are reported on the ended channel.

use crate::error::{LiveError, LiveResult};
use crate::pcm::{resample_linear, AudioBuffer};
use crate::playback::{AudioOutput, ChunkId};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

struct MixChunk {
    id: ChunkId,
    start_frame: u64,
    samples: Vec<f32>,
}

impl MixChunk {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

struct Mixer {
    rate: u32,
    rendered: u64,
    gain: f32,
    /// Frames by which chunks of the current run were pushed back because the
    /// device clock had already passed their start.
    late_frames: u64,
    chunks: Vec<MixChunk>,
    ended_tx: mpsc::UnboundedSender<ChunkId>,
}

impl Mixer {
    fn now_secs(&self) -> f64 {
        self.rendered as f64 / self.rate.max(1) as f64
    }

    /// Place a chunk (already at the device rate) on the timeline. A start the
    /// callback has rendered past is moved to the next unrendered frame, and the
    /// rest of the run follows it so chunks stay back to back.
    fn place(&mut self, id: ChunkId, samples: Vec<f32>, at: f64) {
        let requested = (at.max(0.0) * self.rate as f64).round() as u64 + self.late_frames;
        let start_frame = requested.max(self.rendered);
        if start_frame > requested {
            debug!(chunk_id = id, late = start_frame - requested, "chunk start moved to the device clock");
            self.late_frames += start_frame - requested;
        }
        self.chunks.push(MixChunk {
            id,
            start_frame,
            samples,
        });
    }

    fn clear(&mut self) {
        self.chunks.clear();
        self.late_frames = 0;
    }

    /// Render `frames` mono frames into `out`, then retire finished chunks.
    fn render(&mut self, out: &mut Vec<f32>, frames: usize) {
        out.clear();
        out.resize(frames, 0.0);
        let from = self.rendered;
        let to = from + frames as u64;
        for chunk in &self.chunks {
            let start = chunk.start_frame.max(from);
            let end = chunk.end_frame().min(to);
            for f in start..end {
                out[(f - from) as usize] += chunk.samples[(f - chunk.start_frame) as usize];
            }
        }
        for s in out.iter_mut() {
            *s = (*s * self.gain).clamp(-1.0, 1.0);
        }
        self.rendered = to;

        let ended_tx = &self.ended_tx;
        self.chunks.retain(|c| {
            if c.end_frame() <= to {
                let _ = ended_tx.send(c.id);
                false
            } else {
                true
            }
        });
        if self.chunks.is_empty() {
            self.late_frames = 0;
        }
    }
}

/// Default output device with a sample-accurate clock.
pub struct CpalOutput {
    mixer: Arc<Mutex<Mixer>>,
    ended_rx: Option<mpsc::UnboundedReceiver<ChunkId>>,
    stop_tx: Option<std::sync::mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    device_name: String,
}

impl CpalOutput {
    /// Open the default output device. `gain` is the host volume in `[0, 1]`.
    pub fn new(gain: f32) -> LiveResult<Self> {
        info!("🔊 Initializing audio output");
        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<LiveResult<(String, Arc<Mutex<Mixer>>)>>();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let gain = gain.clamp(0.0, 1.0);

        let thread = std::thread::Builder::new()
            .name("trivia-speaker".to_string())
            .spawn(move || {
                let opened = (|| -> LiveResult<(String, Arc<Mutex<Mixer>>, cpal::Stream)> {
                    let device = cpal::default_host()
                        .default_output_device()
                        .ok_or_else(|| LiveError::AudioDevice("No output device available".to_string()))?;
                    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
                    let supported = device.default_output_config()?;
                    let config: cpal::StreamConfig = supported.config();
                    debug!(device = %name, ?config, "output stream config");
                    let mixer = Arc::new(Mutex::new(Mixer {
                        rate: config.sample_rate.0,
                        rendered: 0,
                        gain,
                        late_frames: 0,
                        chunks: Vec::new(),
                        ended_tx,
                    }));
                    let stream = match supported.sample_format() {
                        cpal::SampleFormat::F32 => build_output::<f32>(&device, &config, mixer.clone()),
                        cpal::SampleFormat::I16 => build_output::<i16>(&device, &config, mixer.clone()),
                        cpal::SampleFormat::U16 => build_output::<u16>(&device, &config, mixer.clone()),
                        other => Err(LiveError::AudioDevice(format!(
                            "unsupported sample format {:?}",
                            other
                        ))),
                    }?;
                    stream.play()?;
                    Ok((name, mixer, stream))
                })();

                match opened {
                    Ok((name, mixer, stream)) => {
                        let _ = ready_tx.send(Ok((name, mixer)));
                        let _ = stop_rx.recv();
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })?;

        let (device_name, mixer) = ready_rx
            .recv()
            .map_err(|_| LiveError::Playback("output thread exited".to_string()))??;
        let rate = mixer.lock().map(|m| m.rate).unwrap_or_default();
        info!("✅ Audio output ready on {} ({} Hz)", device_name, rate);

        Ok(Self {
            mixer,
            ended_rx: Some(ended_rx),
            stop_tx: Some(stop_tx),
            thread: Some(thread),
            device_name,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn set_gain(&self, gain: f32) {
        if let Ok(mut mixer) = self.mixer.lock() {
            mixer.gain = gain.clamp(0.0, 1.0);
        }
    }

    /// List available output devices
    pub fn list_output_devices() -> LiveResult<Vec<String>> {
        Ok(cpal::default_host()
            .output_devices()?
            .filter_map(|d| d.name().ok())
            .collect())
    }
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mixer: Arc<Mutex<Mixer>>,
) -> LiveResult<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels.max(1) as usize;
    let mut mono = Vec::new();
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let frames = data.len() / channels;
            match mixer.lock() {
                Ok(mut m) => m.render(&mut mono, frames),
                Err(_) => {
                    mono.clear();
                    mono.resize(frames, 0.0);
                }
            }
            for (frame, value) in data.chunks_mut(channels).zip(mono.iter()) {
                for sample in frame.iter_mut() {
                    *sample = <T as cpal::Sample>::from_sample(*value);
                }
            }
        },
        move |err| {
            warn!("Audio output stream error: {}", err);
        },
        None,
    )?;
    Ok(stream)
}

impl AudioOutput for CpalOutput {
    fn now(&self) -> f64 {
        self.mixer
            .lock()
            .map(|m| m.now_secs())
            .unwrap_or(0.0)
    }

    fn start(&mut self, id: ChunkId, buffer: AudioBuffer, at: f64) -> LiveResult<()> {
        let mut mixer = self
            .mixer
            .lock()
            .map_err(|_| LiveError::Playback("mixer lock poisoned".to_string()))?;
        let samples = resample_linear(&buffer.to_mono(), buffer.sample_rate(), mixer.rate);
        mixer.place(id, samples, at);
        Ok(())
    }

    fn stop_all(&mut self) {
        if let Ok(mut mixer) = self.mixer.lock() {
            mixer.clear();
        }
    }

    fn take_ended_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<ChunkId>> {
        self.ended_rx.take()
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.stop_tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("output thread panicked");
            }
        }
        info!("🔇 Audio output released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixer(rate: u32) -> (Mixer, mpsc::UnboundedReceiver<ChunkId>) {
        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        (
            Mixer {
                rate,
                rendered: 0,
                gain: 1.0,
                late_frames: 0,
                chunks: Vec::new(),
                ended_tx,
            },
            ended_rx,
        )
    }

    #[test]
    fn chunks_play_at_their_start_frame_and_report_ended() {
        let (mut m, mut ended) = mixer(10);
        m.chunks.push(MixChunk {
            id: 1,
            start_frame: 2,
            samples: vec![0.5; 3],
        });
        let mut out = Vec::new();
        m.render(&mut out, 4);
        assert_eq!(out, vec![0.0, 0.0, 0.5, 0.5]);
        assert!(ended.try_recv().is_err());

        m.render(&mut out, 4);
        assert_eq!(out, vec![0.5, 0.0, 0.0, 0.0]);
        assert_eq!(ended.try_recv().ok(), Some(1));
        assert_eq!(m.rendered, 8);
    }

    #[test]
    fn gain_scales_the_mix() {
        let (mut m, _ended) = mixer(10);
        m.gain = 0.5;
        m.chunks.push(MixChunk {
            id: 7,
            start_frame: 0,
            samples: vec![0.8; 2],
        });
        let mut out = Vec::new();
        m.render(&mut out, 2);
        assert!(out.iter().all(|s| (s - 0.4).abs() < 1e-6));
    }

    #[test]
    fn chunk_started_after_the_clock_moved_keeps_its_first_samples() {
        let (mut m, _ended) = mixer(10);
        let at = m.now_secs();
        let mut out = Vec::new();
        // device callback runs between reading the clock and starting the chunk
        m.render(&mut out, 4);
        m.place(1, vec![0.1, 0.2, 0.3], at);
        m.place(2, vec![0.4], at + 0.3);

        m.render(&mut out, 4);
        assert_eq!(out, vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn late_offset_is_dropped_once_the_run_ends() {
        let (mut m, mut ended) = mixer(10);
        let mut out = Vec::new();
        m.render(&mut out, 2);
        m.place(1, vec![0.5], 0.0);
        assert_eq!(m.late_frames, 2);
        m.render(&mut out, 2);
        assert_eq!(ended.try_recv().ok(), Some(1));
        assert_eq!(m.late_frames, 0);

        m.place(2, vec![0.5; 2], 0.5);
        m.render(&mut out, 4);
        assert_eq!(out, vec![0.0, 0.5, 0.5, 0.0]);

        m.place(3, vec![0.5], 0.0);
        assert!(m.late_frames > 0);
        m.clear();
        assert_eq!(m.late_frames, 0);
        assert!(m.chunks.is_empty());
    }

    #[test]
    #[ignore] // Requires an audio output device
    fn open_default_output() {
        let mut output = CpalOutput::new(0.8).unwrap();
        assert!(output.take_ended_receiver().is_some());
        assert!(output.now() >= 0.0);
    }
}
