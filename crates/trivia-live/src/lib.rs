//! # Trivia Live - Live Audio Session Manager
//!
//! Runs one voice round against a remote conversational host: microphone frames
//! go out as they are captured, synthesized speech comes back and is played
//! gaplessly, and the host's scoring calls are mirrored into local game state.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          LiveSession                              │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────────────┐  │
//! │  │  Microphone  │→ │ FrameGate    │→ │ realtimeInput (base64) │──┼──► service
//! │  │ (cpal, 16k)  │  │ 4096 / drop  │  └────────────────────────┘  │
//! │  └──────────────┘  └──────────────┘                              │
//! │                                       ┌────────────────────────┐ │
//! │  ┌──────────────┐  ┌──────────────┐   │  ServerEvent (ordered) │◄┼─── service
//! │  │  Speakers    │← │  Playback    │ ← │ audio / interrupted /  │ │
//! │  │ (cpal mixer) │  │  Scheduler   │   │ transcript / toolCall  │ │
//! │  └──────────────┘  └──────────────┘   └───────────┬────────────┘ │
//! │                                                   ↓              │
//! │  ┌──────────────┐  ┌──────────────┐   ┌────────────────────────┐ │
//! │  │  Reconnect   │  │  Transcript  │   │ ToolCallBridge → ack   │─┼──► service
//! │  │  Policy (3×) │  │  Tracker     │   │ GameProgressState      │ │
//! │  └──────────────┘  └──────────────┘   └────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod capture;
pub mod config;
pub mod error;
pub mod output;
pub mod pcm;
pub mod playback;
pub mod protocol;
pub mod reconnect;
pub mod session;
pub mod tool_bridge;
pub mod transcript;
pub mod transport;

pub use capture::{
    capture_pipeline, CaptureSink, CaptureStream, CpalMicrophone, FrameAssembler, FrameGate,
    MicrophoneSource, DEFAULT_FRAME_SIZE,
};
pub use config::SessionConfig;
pub use error::{LiveError, LiveResult};
pub use output::CpalOutput;
pub use pcm::{
    decode_frame, encode_frame, AudioBuffer, AudioFrame, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE,
};
pub use playback::{AudioOutput, ChunkId, PlaybackChunk, PlaybackScheduler};
pub use protocol::{ClientMessage, FunctionCall, FunctionResponse, ServerEvent, ServerMessage};
pub use reconnect::ReconnectPolicy;
pub use session::{
    LiveSession, RoundCommand, RoundController, RoundEvent, RoundOutcome, RoundReport,
    SessionState,
};
pub use tool_bridge::{ToolCallBridge, ToolOutcome, UpdateScoreArgs};
pub use transcript::{Speaker, TranscriptEntry, TranscriptTracker};
pub use transport::{Connector, GeminiLiveConnector, LiveTransport, WebSocketTransport};
