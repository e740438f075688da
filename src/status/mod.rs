//! Streaming, recording and replay buffer output status.

mod tracker;
#[cfg(test)]
mod tests;

pub use tracker::{reduce, Output, StatusChange, StatusEvent};

use crate::info::StreamInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamingState {
    #[default]
    Offline,
    Starting,
    Live,
    Ending,
    Reconnecting,
}

impl StreamingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamingState::Offline => "offline",
            StreamingState::Starting => "starting",
            StreamingState::Live => "live",
            StreamingState::Ending => "ending",
            StreamingState::Reconnecting => "reconnecting",
        }
    }

    /// Live or trying to stay live
    pub fn is_active(&self) -> bool {
        matches!(self, StreamingState::Live | StreamingState::Reconnecting)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    #[default]
    Offline,
    Starting,
    Recording,
    Stopping,
}

impl RecordingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingState::Offline => "offline",
            RecordingState::Starting => "starting",
            RecordingState::Recording => "recording",
            RecordingState::Stopping => "stopping",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayBufferState {
    #[default]
    Offline,
    Starting,
    Running,
    Stopping,
    Saving,
}

impl ReplayBufferState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplayBufferState::Offline => "offline",
            ReplayBufferState::Starting => "starting",
            ReplayBufferState::Running => "running",
            ReplayBufferState::Stopping => "stopping",
            ReplayBufferState::Saving => "saving",
        }
    }
}

macro_rules! display_as_str {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

display_as_str!(StreamingState, RecordingState, ReplayBufferState);

/// Snapshot of everything a UI needs to render the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingServiceState {
    pub streaming_status: StreamingState,
    pub streaming_status_time: DateTime<Utc>,
    pub recording_status: RecordingState,
    pub recording_status_time: DateTime<Utc>,
    pub replay_buffer_status: ReplayBufferState,
    pub replay_buffer_status_time: DateTime<Utc>,
    pub selective_recording: bool,
    pub info: StreamInfo,
}

impl StreamingServiceState {
    /// All outputs offline, stamped with `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            streaming_status: StreamingState::Offline,
            streaming_status_time: now,
            recording_status: RecordingState::Offline,
            recording_status_time: now,
            replay_buffer_status: ReplayBufferState::Offline,
            replay_buffer_status_time: now,
            selective_recording: false,
            info: StreamInfo::new(),
        }
    }
}

impl Default for StreamingServiceState {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}
