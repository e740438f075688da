//! Encoder/transmission engine boundary.
//!
//! The engine is a black box: operations report success or failure directly,
//! and asynchronous state changes arrive as [`EngineEvent`]s on a broadcast
//! channel.

pub mod mock;

use crate::error::StreamError;
use crate::platform::Platform;
use crate::settings::EncoderProfile;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

/// Callbacks emitted by the transmission engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    /// Video output is flowing
    Started,
    /// Video output ended
    Stopped,
    /// Connection to the ingest server was lost, the engine is retrying
    Reconnecting,
    /// Connection re-established after `Reconnecting`
    Recovered,
    /// Unrecoverable output failure
    FatalError { message: String },
    RecordingStarted,
    RecordingStopped,
    RecordingError { message: String },
    ReplayBufferStarted,
    ReplayBufferStopped,
    /// The replay buffer finished writing a clip
    ReplaySaved,
    ReplayBufferError { message: String },
}

impl EngineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::Started => "started",
            EngineEvent::Stopped => "stopped",
            EngineEvent::Reconnecting => "reconnecting",
            EngineEvent::Recovered => "recovered",
            EngineEvent::FatalError { .. } => "fatal_error",
            EngineEvent::RecordingStarted => "recording_started",
            EngineEvent::RecordingStopped => "recording_stopped",
            EngineEvent::RecordingError { .. } => "recording_error",
            EngineEvent::ReplayBufferStarted => "replay_buffer_started",
            EngineEvent::ReplayBufferStopped => "replay_buffer_stopped",
            EngineEvent::ReplaySaved => "replay_saved",
            EngineEvent::ReplayBufferError { .. } => "replay_buffer_error",
        }
    }
}

/// Encoder and output control consumed by the orchestrator
#[async_trait]
pub trait TransmissionEngine: Send + Sync {
    /// Start sending video to the configured ingest(s)
    async fn begin(&self) -> Result<(), StreamError>;

    /// Stop sending video
    async fn end(&self) -> Result<(), StreamError>;

    /// Apply an optimized encoder profile before going live
    async fn apply_profile(&self, profile: &EncoderProfile) -> Result<(), StreamError>;

    /// Fan the single output out to several destinations
    async fn configure_restream(&self, platforms: &[Platform]) -> Result<(), StreamError>;

    async fn start_recording(&self) -> Result<(), StreamError>;

    async fn stop_recording(&self) -> Result<(), StreamError>;

    async fn start_replay_buffer(&self) -> Result<(), StreamError>;

    async fn stop_replay_buffer(&self) -> Result<(), StreamError>;

    async fn save_replay(&self) -> Result<(), StreamError>;

    /// Subscribe to engine callbacks
    fn events(&self) -> broadcast::Receiver<EngineEvent>;
}
