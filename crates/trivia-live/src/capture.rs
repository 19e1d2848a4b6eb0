//! Capture pipeline: microphone samples -> fixed-size frames -> outbound path.
//!
//! The device side pushes samples into a [`CaptureSink`], which slices them into
//! frames of `frame_size` samples and hands each finished frame to the session
//! through a one-slot channel. A frame that finds the gate closed or the slot
//! occupied is dropped, never queued.

use crate::error::{LiveError, LiveResult};
use crate::pcm::{downmix_to_mono, AudioFrame, LinearResampler, INPUT_SAMPLE_RATE};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Default microphone samples per outbound frame.
pub const DEFAULT_FRAME_SIZE: usize = 4096;

/// Slices a continuous sample stream into fixed-size frames.
#[derive(Debug)]
pub struct FrameAssembler {
    frame_size: usize,
    sample_rate: u32,
    pending: Vec<f32>,
}

impl FrameAssembler {
    pub fn new(frame_size: usize, sample_rate: u32) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            sample_rate,
            pending: Vec::with_capacity(frame_size),
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Samples waiting for the next frame. Always below `frame_size`.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Append samples, calling `emit` once per completed frame.
    pub fn push(&mut self, samples: &[f32], mut emit: impl FnMut(AudioFrame)) {
        let mut rest = samples;
        while !rest.is_empty() {
            let take = (self.frame_size - self.pending.len()).min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.pending.len() == self.frame_size {
                emit(AudioFrame::from_f32(&self.pending, self.sample_rate));
                self.pending.clear();
            }
        }
    }

    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

#[derive(Debug, Default)]
struct GateState {
    open: AtomicBool,
    sent: AtomicU64,
    dropped: AtomicU64,
}

/// Session-side switch for the outbound frame path.
///
/// Closed while connecting or reconnecting; frames produced meanwhile are dropped.
#[derive(Debug, Clone)]
pub struct FrameGate {
    state: Arc<GateState>,
}

impl FrameGate {
    pub fn open(&self) {
        self.state.open.store(true, Ordering::SeqCst);
    }

    pub fn close(&self) {
        self.state.open.store(false, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.state.open.load(Ordering::SeqCst)
    }

    /// Frames handed to the outbound path so far.
    pub fn sent(&self) -> u64 {
        self.state.sent.load(Ordering::Relaxed)
    }

    /// Frames discarded because the outbound path was not ready.
    pub fn dropped(&self) -> u64 {
        self.state.dropped.load(Ordering::Relaxed)
    }

    /// Move `n` frames counted as sent over to dropped. For frames that were
    /// queued but never reached the service.
    pub fn mark_undelivered(&self, n: u64) {
        if n == 0 {
            return;
        }
        let _ = self
            .state
            .sent
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |sent| Some(sent.saturating_sub(n)));
        self.state.dropped.fetch_add(n, Ordering::Relaxed);
    }

    /// Empty the frame slot, counting whatever was waiting as dropped.
    pub fn discard_queued(&self, rx: &mut mpsc::Receiver<AudioFrame>) -> u64 {
        let mut discarded = 0;
        while rx.try_recv().is_ok() {
            discarded += 1;
        }
        self.mark_undelivered(discarded);
        discarded
    }
}

/// Device-side end of the pipeline. Owned by whatever produces samples.
#[derive(Debug)]
pub struct CaptureSink {
    assembler: FrameAssembler,
    tx: mpsc::Sender<AudioFrame>,
    state: Arc<GateState>,
}

impl CaptureSink {
    /// Push mono samples at [`INPUT_SAMPLE_RATE`].
    pub fn push_samples(&mut self, samples: &[f32]) {
        let tx = &self.tx;
        let state = &self.state;
        self.assembler.push(samples, |frame| {
            if !state.open.load(Ordering::SeqCst) {
                state.dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
            match tx.try_send(frame) {
                Ok(()) => {
                    state.sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    state.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        });
    }

    pub fn frame_size(&self) -> usize {
        self.assembler.frame_size()
    }
}

/// Build the pipeline: the sink for the device, the gate and frame receiver for the session.
pub fn capture_pipeline(frame_size: usize) -> (CaptureSink, FrameGate, mpsc::Receiver<AudioFrame>) {
    let (tx, rx) = mpsc::channel(1);
    let state = Arc::new(GateState::default());
    let sink = CaptureSink {
        assembler: FrameAssembler::new(frame_size, INPUT_SAMPLE_RATE),
        tx,
        state: state.clone(),
    };
    (sink, FrameGate { state }, rx)
}

/// Scoped ownership of an open microphone. Dropping it releases the device.
pub struct CaptureStream {
    label: String,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl CaptureStream {
    pub fn new(label: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            label: label.into(),
            release: Some(Box::new(release)),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
            info!("🎤 Microphone released ({})", self.label);
        }
    }
}

impl std::fmt::Debug for CaptureStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureStream").field("label", &self.label).finish()
    }
}

/// Anything that can feed microphone audio into a [`CaptureSink`].
pub trait MicrophoneSource: Send + Sync {
    /// Acquire the device and start pushing samples. Fails with
    /// [`LiveError::MicrophoneUnavailable`] when no usable input exists.
    fn open(&self, sink: CaptureSink) -> LiveResult<CaptureStream>;
}

/// Microphone input through `cpal`.
///
/// The stream is not `Send`, so it is built and kept alive on its own thread
/// until the returned [`CaptureStream`] is dropped.
#[derive(Debug, Clone, Default)]
pub struct CpalMicrophone {
    device_name: Option<String>,
}

impl CpalMicrophone {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
        }
    }

    /// List available input devices
    pub fn list_input_devices() -> LiveResult<Vec<String>> {
        let host = cpal::default_host();
        Ok(host
            .input_devices()?
            .filter_map(|d| d.name().ok())
            .collect())
    }

    fn pick_device(&self) -> LiveResult<cpal::Device> {
        let host = cpal::default_host();
        match &self.device_name {
            Some(name) => host
                .input_devices()
                .map_err(|e| LiveError::MicrophoneUnavailable(e.to_string()))?
                .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
                .ok_or_else(|| {
                    LiveError::MicrophoneUnavailable(format!("input device '{}' not found", name))
                }),
            None => host
                .default_input_device()
                .ok_or_else(|| LiveError::MicrophoneUnavailable("no input device available".into())),
        }
    }

    fn run_stream(
        &self,
        sink: CaptureSink,
        ready: std::sync::mpsc::Sender<LiveResult<String>>,
        stop: std::sync::mpsc::Receiver<()>,
    ) {
        let opened = (|| -> LiveResult<(String, cpal::Stream)> {
            let device = self.pick_device()?;
            let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
            let supported = device.default_input_config().map_err(unavailable)?;
            let config: cpal::StreamConfig = supported.config();
            debug!(device = %name, ?config, "input stream config");
            let stream = match supported.sample_format() {
                cpal::SampleFormat::F32 => build_input::<f32>(&device, &config, sink),
                cpal::SampleFormat::I16 => build_input::<i16>(&device, &config, sink),
                cpal::SampleFormat::U16 => build_input::<u16>(&device, &config, sink),
                other => Err(LiveError::MicrophoneUnavailable(format!(
                    "unsupported sample format {:?}",
                    other
                ))),
            }?;
            stream.play().map_err(unavailable)?;
            Ok((name, stream))
        })();

        match opened {
            Ok((name, stream)) => {
                let _ = ready.send(Ok(name));
                // Blocks until the guard drops its sender.
                let _ = stop.recv();
                drop(stream);
            }
            Err(e) => {
                let _ = ready.send(Err(e));
            }
        }
    }
}

fn unavailable(e: impl std::fmt::Display) -> LiveError {
    LiveError::MicrophoneUnavailable(e.to_string())
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut sink: CaptureSink,
) -> LiveResult<cpal::Stream>
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    let channels = config.channels;
    let mut resampler = LinearResampler::new(config.sample_rate.0, INPUT_SAMPLE_RATE);
    let mut scratch = Vec::new();
    let mut resampled = Vec::new();
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                scratch.clear();
                scratch.extend(data.iter().map(|s| <f32 as cpal::Sample>::from_sample(*s)));
                let mono = downmix_to_mono(&scratch, channels);
                resampled.clear();
                resampler.process(&mono, &mut resampled);
                sink.push_samples(&resampled);
            },
            move |err| {
                warn!("Audio input stream error: {}", err);
            },
            None,
        )
        .map_err(unavailable)
}

impl MicrophoneSource for CpalMicrophone {
    fn open(&self, sink: CaptureSink) -> LiveResult<CaptureStream> {
        info!("🎤 Opening microphone ({} Hz mono frames of {})", INPUT_SAMPLE_RATE, sink.frame_size());
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let mic = self.clone();
        let handle: JoinHandle<()> = std::thread::Builder::new()
            .name("trivia-mic".to_string())
            .spawn(move || mic.run_stream(sink, ready_tx, stop_rx))?;

        let name = ready_rx
            .recv()
            .map_err(|_| LiveError::MicrophoneUnavailable("capture thread exited".into()))??;
        info!("✅ Microphone capture started on {}", name);

        Ok(CaptureStream::new(name, move || {
            drop(stop_tx);
            if handle.join().is_err() {
                warn!("capture thread panicked");
            }
        }))
    }
}
