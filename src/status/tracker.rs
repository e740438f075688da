use super::{RecordingState, ReplayBufferState, StreamingServiceState, StreamingState};
use crate::error::{OrchestratorError, Result};
use crate::transmission::EngineEvent;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Inputs of the status reducer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// `startVideoTransmission` went pending
    TransmissionStarting,
    /// Every checklist step is done and the lifecycle became live
    GoLiveCompleted,
    /// The checklist halted before going live
    GoLiveAborted,
    /// The user asked to stop the stream
    StopRequested,
    /// `Recovered` did not arrive in time after `Reconnecting`
    ReconnectTimedOut,
    RecordingRequested,
    RecordingStopRequested,
    RecordingStartFailed,
    ReplayBufferRequested,
    ReplayBufferStopRequested,
    ReplaySaveRequested,
    ReplayBufferStartFailed,
    /// The engine refused to write a clip; the buffer keeps running
    ReplaySaveFailed,
    Engine(EngineEvent),
}

impl StatusEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StatusEvent::TransmissionStarting => "transmission_starting",
            StatusEvent::GoLiveCompleted => "go_live_completed",
            StatusEvent::GoLiveAborted => "go_live_aborted",
            StatusEvent::StopRequested => "stop_requested",
            StatusEvent::ReconnectTimedOut => "reconnect_timed_out",
            StatusEvent::RecordingRequested => "recording_requested",
            StatusEvent::RecordingStopRequested => "recording_stop_requested",
            StatusEvent::RecordingStartFailed => "recording_start_failed",
            StatusEvent::ReplayBufferRequested => "replay_buffer_requested",
            StatusEvent::ReplayBufferStopRequested => "replay_buffer_stop_requested",
            StatusEvent::ReplaySaveRequested => "replay_save_requested",
            StatusEvent::ReplayBufferStartFailed => "replay_buffer_start_failed",
            StatusEvent::ReplaySaveFailed => "replay_save_failed",
            StatusEvent::Engine(event) => event.name(),
        }
    }
}

/// The output a status event applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Streaming,
    Recording,
    ReplayBuffer,
}

impl Output {
    pub fn as_str(&self) -> &'static str {
        match self {
            Output::Streaming => "streaming",
            Output::Recording => "recording",
            Output::ReplayBuffer => "replay buffer",
        }
    }

    fn of(event: &StatusEvent) -> Output {
        use EngineEvent as E;
        match event {
            StatusEvent::TransmissionStarting
            | StatusEvent::GoLiveCompleted
            | StatusEvent::GoLiveAborted
            | StatusEvent::StopRequested
            | StatusEvent::ReconnectTimedOut
            | StatusEvent::Engine(
                E::Started | E::Stopped | E::Reconnecting | E::Recovered | E::FatalError { .. },
            ) => Output::Streaming,
            StatusEvent::RecordingRequested
            | StatusEvent::RecordingStopRequested
            | StatusEvent::RecordingStartFailed
            | StatusEvent::Engine(E::RecordingStarted | E::RecordingStopped | E::RecordingError { .. }) => {
                Output::Recording
            }
            StatusEvent::ReplayBufferRequested
            | StatusEvent::ReplayBufferStopRequested
            | StatusEvent::ReplaySaveRequested
            | StatusEvent::ReplayBufferStartFailed
            | StatusEvent::ReplaySaveFailed
            | StatusEvent::Engine(
                E::ReplayBufferStarted
                | E::ReplayBufferStopped
                | E::ReplaySaved
                | E::ReplayBufferError { .. },
            ) => Output::ReplayBuffer,
        }
    }
}

/// A status transition applied by [`reduce`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Streaming {
        from: StreamingState,
        to: StreamingState,
    },
    Recording {
        from: RecordingState,
        to: RecordingState,
    },
    ReplayBuffer {
        from: ReplayBufferState,
        to: ReplayBufferState,
    },
}

/// Where a reducer table sends the current state on an event
enum Step<S> {
    To(S),
    Ignore,
    Invalid,
}

/// Apply `event` to the output it concerns, stamping the change with `now`.
///
/// Returns `Ok(None)` when the event does not change anything (a repeated or
/// late callback) and `InvalidStatusTransition` when it cannot happen in the
/// current state. The state is untouched unless a change is returned.
pub fn reduce(
    state: &mut StreamingServiceState,
    event: &StatusEvent,
    now: DateTime<Utc>,
) -> Result<Option<StatusChange>> {
    let output = Output::of(event);
    let change = match output {
        Output::Streaming => {
            let from = state.streaming_status;
            match streaming_step(from, event) {
                Step::To(to) if to != from => {
                    state.streaming_status = to;
                    state.streaming_status_time = now;
                    Some(StatusChange::Streaming { from, to })
                }
                Step::To(_) | Step::Ignore => None,
                Step::Invalid => return Err(invalid(output, from.as_str(), event)),
            }
        }
        Output::Recording => {
            let from = state.recording_status;
            match recording_step(from, event) {
                Step::To(to) if to != from => {
                    state.recording_status = to;
                    state.recording_status_time = now;
                    Some(StatusChange::Recording { from, to })
                }
                Step::To(_) | Step::Ignore => None,
                Step::Invalid => return Err(invalid(output, from.as_str(), event)),
            }
        }
        Output::ReplayBuffer => {
            let from = state.replay_buffer_status;
            match replay_buffer_step(from, event) {
                Step::To(to) if to != from => {
                    state.replay_buffer_status = to;
                    state.replay_buffer_status_time = now;
                    Some(StatusChange::ReplayBuffer { from, to })
                }
                Step::To(_) | Step::Ignore => None,
                Step::Invalid => return Err(invalid(output, from.as_str(), event)),
            }
        }
    };

    if let Some(change) = &change {
        debug!("Status {:?} on {}", change, event.name());
    }
    Ok(change)
}

fn invalid(output: Output, from: &str, event: &StatusEvent) -> OrchestratorError {
    OrchestratorError::InvalidStatusTransition {
        output: output.as_str(),
        from: from.to_string(),
        event: event.name().to_string(),
    }
}

fn streaming_step(from: StreamingState, event: &StatusEvent) -> Step<StreamingState> {
    use StreamingState::*;
    match (from, event) {
        (Offline, StatusEvent::TransmissionStarting) => Step::To(Starting),
        (Starting, StatusEvent::GoLiveCompleted) => Step::To(Live),
        (Starting | Offline, StatusEvent::GoLiveAborted) => Step::To(Offline),
        (Live | Reconnecting, StatusEvent::StopRequested) => Step::To(Ending),
        (Reconnecting, StatusEvent::ReconnectTimedOut) => Step::To(Offline),
        (_, StatusEvent::ReconnectTimedOut) => Step::Ignore,

        // Live is entered together with the lifecycle, not on the engine callback
        (Starting | Live, StatusEvent::Engine(EngineEvent::Started)) => Step::Ignore,
        (Ending | Live | Reconnecting, StatusEvent::Engine(EngineEvent::Stopped)) => Step::To(Offline),
        (Offline | Starting, StatusEvent::Engine(EngineEvent::Stopped)) => Step::Ignore,
        (Live | Reconnecting, StatusEvent::Engine(EngineEvent::Reconnecting)) => Step::To(Reconnecting),
        (Reconnecting | Live, StatusEvent::Engine(EngineEvent::Recovered)) => Step::To(Live),
        (Live | Reconnecting | Ending, StatusEvent::Engine(EngineEvent::FatalError { .. })) => {
            Step::To(Offline)
        }
        // A fatal error while starting aborts the go-live instead
        (Offline | Starting, StatusEvent::Engine(EngineEvent::FatalError { .. })) => Step::Ignore,
        _ => Step::Invalid,
    }
}

fn recording_step(from: RecordingState, event: &StatusEvent) -> Step<RecordingState> {
    use RecordingState::*;
    match (from, event) {
        (Offline, StatusEvent::RecordingRequested) => Step::To(Starting),
        (Starting | Recording, StatusEvent::RecordingStopRequested) => Step::To(Stopping),
        (Starting, StatusEvent::RecordingStartFailed) => Step::To(Offline),
        (Starting, StatusEvent::Engine(EngineEvent::RecordingStarted)) => Step::To(Recording),
        (Recording, StatusEvent::Engine(EngineEvent::RecordingStarted)) => Step::Ignore,
        (Stopping | Recording | Starting, StatusEvent::Engine(EngineEvent::RecordingStopped)) => {
            Step::To(Offline)
        }
        (_, StatusEvent::Engine(EngineEvent::RecordingError { .. })) => Step::To(Offline),
        (Offline, StatusEvent::Engine(EngineEvent::RecordingStopped)) => Step::Ignore,
        _ => Step::Invalid,
    }
}

fn replay_buffer_step(from: ReplayBufferState, event: &StatusEvent) -> Step<ReplayBufferState> {
    use ReplayBufferState::*;
    match (from, event) {
        (Offline, StatusEvent::ReplayBufferRequested) => Step::To(Starting),
        (Starting | Running, StatusEvent::ReplayBufferStopRequested) => Step::To(Stopping),
        (Running, StatusEvent::ReplaySaveRequested) => Step::To(Saving),
        (Starting, StatusEvent::ReplayBufferStartFailed) => Step::To(Offline),
        (Starting, StatusEvent::Engine(EngineEvent::ReplayBufferStarted)) => Step::To(Running),
        (Running, StatusEvent::Engine(EngineEvent::ReplayBufferStarted)) => Step::Ignore,
        (Saving, StatusEvent::Engine(EngineEvent::ReplaySaved) | StatusEvent::ReplaySaveFailed) => {
            Step::To(Running)
        }
        (Running, StatusEvent::Engine(EngineEvent::ReplaySaved)) => Step::Ignore,
        (
            Stopping | Running | Saving | Starting,
            StatusEvent::Engine(EngineEvent::ReplayBufferStopped),
        ) => Step::To(Offline),
        (Offline, StatusEvent::Engine(EngineEvent::ReplayBufferStopped)) => Step::Ignore,
        (_, StatusEvent::Engine(EngineEvent::ReplayBufferError { .. })) => Step::To(Offline),
        _ => Step::Invalid,
    }
}
