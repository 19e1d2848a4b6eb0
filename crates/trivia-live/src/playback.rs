//! Playback scheduling: gapless, ordered output of the host's audio chunks.
//!
//! Chunks are placed on the output timeline at `max(next_start_time, clock_now)`
//! and the cursor advances by each chunk's duration. The live set holds every
//! chunk that has been started and has not reported "ended"; the speaking
//! indicator follows whether that set is empty.

use crate::error::LiveResult;
use crate::pcm::AudioBuffer;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Identifier of one scheduled chunk, unique for the lifetime of a scheduler.
pub type ChunkId = u64;

/// An audio sink with its own clock.
///
/// `start` must not block; the output reports each chunk's natural end on the
/// receiver handed out by [`AudioOutput::take_ended_receiver`]. Chunks silenced by
/// `stop_all` are not reported.
pub trait AudioOutput: Send {
    /// Current output-clock time in seconds.
    fn now(&self) -> f64;

    /// Begin playing `buffer` at output time `at` (seconds).
    fn start(&mut self, id: ChunkId, buffer: AudioBuffer, at: f64) -> LiveResult<()>;

    /// Silence every started chunk immediately.
    fn stop_all(&mut self);

    /// Take the "ended" event receiver. Returns `None` after the first call.
    fn take_ended_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<ChunkId>>;
}

/// A chunk as placed on the output timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackChunk {
    pub id: ChunkId,
    pub start_time: f64,
    pub duration: f64,
}

impl PlaybackChunk {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

/// Owns the output device, the next-start cursor and the live set.
pub struct PlaybackScheduler {
    output: Box<dyn AudioOutput>,
    next_start_time: f64,
    live: BTreeMap<ChunkId, PlaybackChunk>,
    next_id: ChunkId,
    reported_speaking: bool,
}

impl PlaybackScheduler {
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        Self {
            output,
            next_start_time: 0.0,
            live: BTreeMap::new(),
            next_id: 1,
            reported_speaking: false,
        }
    }

    /// Forwarded from the output. See [`AudioOutput::take_ended_receiver`].
    pub fn take_ended_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<ChunkId>> {
        self.output.take_ended_receiver()
    }

    /// Place `buffer` right after the previously scheduled chunk, or at the
    /// clock if the output has already run past it.
    pub fn schedule(&mut self, buffer: AudioBuffer) -> LiveResult<PlaybackChunk> {
        let now = self.output.now();
        let start_time = self.next_start_time.max(now);
        let chunk = PlaybackChunk {
            id: self.next_id,
            start_time,
            duration: buffer.duration_secs(),
        };
        self.output.start(chunk.id, buffer, start_time)?;
        self.next_id += 1;
        self.next_start_time = chunk.end_time();
        self.live.insert(chunk.id, chunk);
        debug!(chunk_id = chunk.id, start = chunk.start_time, duration = chunk.duration, "chunk scheduled");
        Ok(chunk)
    }

    /// Drop a chunk from the live set once it has finished. Returns `false` for
    /// ids that are no longer live (already ended or interrupted).
    pub fn on_chunk_ended(&mut self, id: ChunkId) -> bool {
        self.live.remove(&id).is_some()
    }

    /// Barge-in: stop everything, clear the live set and restart the cursor at the clock.
    pub fn interrupt(&mut self) -> usize {
        let stopped = self.live.len();
        self.output.stop_all();
        self.live.clear();
        self.next_start_time = self.output.now();
        if stopped > 0 {
            info!("⏹️ Playback interrupted ({} chunk(s) stopped)", stopped);
        }
        stopped
    }

    pub fn is_speaking(&self) -> bool {
        !self.live.is_empty()
    }

    /// Report the speaking indicator if it changed since the last call.
    pub fn take_speaking_change(&mut self) -> Option<bool> {
        let speaking = self.is_speaking();
        if speaking != self.reported_speaking {
            self.reported_speaking = speaking;
            Some(speaking)
        } else {
            None
        }
    }

    pub fn live_len(&self) -> usize {
        self.live.len()
    }

    /// Live chunks in scheduling order.
    pub fn live_chunks(&self) -> impl Iterator<Item = &PlaybackChunk> {
        self.live.values()
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn clock_now(&self) -> f64 {
        self.output.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcm::OUTPUT_SAMPLE_RATE;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Shared {
        now: f64,
        started: Vec<(ChunkId, f64)>,
        stops: usize,
    }

    struct ManualOutput {
        shared: Arc<Mutex<Shared>>,
    }

    impl AudioOutput for ManualOutput {
        fn now(&self) -> f64 {
            self.shared.lock().unwrap().now
        }

        fn start(&mut self, id: ChunkId, _buffer: AudioBuffer, at: f64) -> LiveResult<()> {
            self.shared.lock().unwrap().started.push((id, at));
            Ok(())
        }

        fn stop_all(&mut self) {
            self.shared.lock().unwrap().stops += 1;
        }

        fn take_ended_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<ChunkId>> {
            None
        }
    }

    fn scheduler() -> (PlaybackScheduler, Arc<Mutex<Shared>>) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let output = ManualOutput {
            shared: shared.clone(),
        };
        (PlaybackScheduler::new(Box::new(output)), shared)
    }

    fn chunk_of(secs: f64) -> AudioBuffer {
        let frames = (secs * OUTPUT_SAMPLE_RATE as f64).round() as usize;
        AudioBuffer::new(vec![0.0; frames], OUTPUT_SAMPLE_RATE, 1)
    }

    #[test]
    fn start_times_never_overlap_and_never_precede_the_clock() {
        let (mut scheduler, shared) = scheduler();
        let mut seed: u64 = 0x2545_f491;
        let mut previous: Option<PlaybackChunk> = None;

        for _ in 0..200 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let duration = 0.01 + (seed >> 40) as f64 / (1u64 << 24) as f64 * 0.3;
            // clock sometimes jumps ahead of the cursor (underrun)
            let advance = ((seed >> 16) & 0xff) as f64 / 255.0 * 0.4;
            let clock = {
                let mut s = shared.lock().unwrap();
                s.now += advance;
                s.now
            };

            let chunk = scheduler.schedule(chunk_of(duration)).unwrap();
            assert!(chunk.start_time >= clock);
            if let Some(prev) = previous {
                assert!(chunk.start_time >= prev.start_time);
                assert!(chunk.start_time >= prev.end_time() - 1e-9);
            }
            previous = Some(chunk);
        }

        let started = &shared.lock().unwrap().started;
        assert_eq!(started.len(), 200);
        assert!(started.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn back_to_back_chunks_are_gapless() {
        let (mut scheduler, shared) = scheduler();
        shared.lock().unwrap().now = 2.0;
        let a = scheduler.schedule(chunk_of(0.5)).unwrap();
        let b = scheduler.schedule(chunk_of(0.25)).unwrap();
        assert_eq!(a.start_time, 2.0);
        assert!((b.start_time - 2.5).abs() < 1e-9);
        assert!((scheduler.next_start_time() - 2.75).abs() < 1e-9);
    }

    #[test]
    fn speaking_follows_the_live_set() {
        let (mut scheduler, _shared) = scheduler();
        assert_eq!(scheduler.take_speaking_change(), None);

        let a = scheduler.schedule(chunk_of(0.1)).unwrap();
        let b = scheduler.schedule(chunk_of(0.1)).unwrap();
        assert_eq!(scheduler.take_speaking_change(), Some(true));
        assert_eq!(scheduler.take_speaking_change(), None);

        assert!(scheduler.on_chunk_ended(a.id));
        assert!(!scheduler.on_chunk_ended(a.id));
        assert_eq!(scheduler.take_speaking_change(), None);
        assert!(scheduler.on_chunk_ended(b.id));
        assert_eq!(scheduler.take_speaking_change(), Some(false));
    }

    #[test]
    fn interrupt_clears_everything_and_resets_the_cursor() {
        let (mut scheduler, shared) = scheduler();
        for _ in 0..4 {
            scheduler.schedule(chunk_of(1.0)).unwrap();
        }
        shared.lock().unwrap().now = 0.5;

        assert_eq!(scheduler.interrupt(), 4);
        assert_eq!(scheduler.live_len(), 0);
        assert!(!scheduler.is_speaking());
        assert_eq!(scheduler.next_start_time(), 0.5);
        assert_eq!(shared.lock().unwrap().stops, 1);

        // ended events for interrupted chunks are ignored
        assert!(!scheduler.on_chunk_ended(1));
        let next = scheduler.schedule(chunk_of(0.2)).unwrap();
        assert_eq!(next.start_time, 0.5);
    }
}
