use super::*;
use crate::error::OrchestratorError;
use crate::transmission::EngineEvent;
use chrono::{Duration, TimeZone, Utc};

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

fn apply(state: &mut StreamingServiceState, events: &[StatusEvent]) -> Vec<StatusChange> {
    events
        .iter()
        .enumerate()
        .filter_map(|(i, event)| {
            let now = epoch() + Duration::seconds(i as i64 + 1);
            reduce(state, event, now).unwrap()
        })
        .collect()
}

#[test]
fn test_initial_state_is_offline() {
    let state = StreamingServiceState::new(epoch());
    assert_eq!(state.streaming_status, StreamingState::Offline);
    assert_eq!(state.recording_status, RecordingState::Offline);
    assert_eq!(state.replay_buffer_status, ReplayBufferState::Offline);
    assert_eq!(state.streaming_status_time, epoch());
    assert!(!state.selective_recording);
}

#[test]
fn test_streaming_lifecycle() {
    let mut state = StreamingServiceState::new(epoch());
    let changes = apply(
        &mut state,
        &[
            StatusEvent::TransmissionStarting,
            StatusEvent::Engine(EngineEvent::Started),
            StatusEvent::GoLiveCompleted,
            StatusEvent::StopRequested,
            StatusEvent::Engine(EngineEvent::Stopped),
        ],
    );

    let statuses: Vec<StreamingState> = changes
        .iter()
        .map(|change| match change {
            StatusChange::Streaming { to, .. } => *to,
            other => panic!("unexpected change {:?}", other),
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            StreamingState::Starting,
            StreamingState::Live,
            StreamingState::Ending,
            StreamingState::Offline
        ]
    );
    assert_eq!(state.streaming_status_time, epoch() + Duration::seconds(5));
}

#[test]
fn test_reconnect_round_trip() {
    let mut state = StreamingServiceState::new(epoch());
    apply(
        &mut state,
        &[StatusEvent::TransmissionStarting, StatusEvent::GoLiveCompleted],
    );

    let changes = apply(
        &mut state,
        &[
            StatusEvent::Engine(EngineEvent::Reconnecting),
            StatusEvent::Engine(EngineEvent::Recovered),
        ],
    );
    assert_eq!(
        changes,
        vec![
            StatusChange::Streaming {
                from: StreamingState::Live,
                to: StreamingState::Reconnecting
            },
            StatusChange::Streaming {
                from: StreamingState::Reconnecting,
                to: StreamingState::Live
            },
        ]
    );
}

#[test]
fn test_reconnect_timeout_goes_offline() {
    let mut state = StreamingServiceState::new(epoch());
    apply(
        &mut state,
        &[
            StatusEvent::TransmissionStarting,
            StatusEvent::GoLiveCompleted,
            StatusEvent::Engine(EngineEvent::Reconnecting),
            StatusEvent::ReconnectTimedOut,
        ],
    );
    assert_eq!(state.streaming_status, StreamingState::Offline);

    // A timer that fires after recovery is stale
    let mut state = StreamingServiceState::new(epoch());
    apply(
        &mut state,
        &[StatusEvent::TransmissionStarting, StatusEvent::GoLiveCompleted],
    );
    assert_eq!(
        reduce(&mut state, &StatusEvent::ReconnectTimedOut, epoch()).unwrap(),
        None
    );
    assert_eq!(state.streaming_status, StreamingState::Live);
}

#[test]
fn test_aborted_go_live_returns_offline() {
    let mut state = StreamingServiceState::new(epoch());
    apply(&mut state, &[StatusEvent::TransmissionStarting]);
    apply(&mut state, &[StatusEvent::GoLiveAborted]);
    assert_eq!(state.streaming_status, StreamingState::Offline);

    // Aborting before transmission started changes nothing
    assert_eq!(
        reduce(&mut state, &StatusEvent::GoLiveAborted, epoch()).unwrap(),
        None
    );
}

#[test]
fn test_invalid_transition_is_rejected_without_change() {
    let mut state = StreamingServiceState::new(epoch());

    let result = reduce(
        &mut state,
        &StatusEvent::Engine(EngineEvent::Reconnecting),
        epoch() + Duration::seconds(1),
    );
    match result {
        Err(OrchestratorError::InvalidStatusTransition { output, from, event }) => {
            assert_eq!(output, "streaming");
            assert_eq!(from, "offline");
            assert_eq!(event, "reconnecting");
        }
        other => panic!("expected invalid transition, got {:?}", other),
    }
    assert_eq!(state.streaming_status, StreamingState::Offline);
    assert_eq!(state.streaming_status_time, epoch());

    assert!(reduce(&mut state, &StatusEvent::GoLiveCompleted, epoch()).is_err());
    assert!(reduce(&mut state, &StatusEvent::StopRequested, epoch()).is_err());
}

#[test]
fn test_recording_lifecycle() {
    let mut state = StreamingServiceState::new(epoch());
    apply(
        &mut state,
        &[
            StatusEvent::RecordingRequested,
            StatusEvent::Engine(EngineEvent::RecordingStarted),
        ],
    );
    assert_eq!(state.recording_status, RecordingState::Recording);
    assert_eq!(state.streaming_status, StreamingState::Offline);

    apply(
        &mut state,
        &[
            StatusEvent::RecordingStopRequested,
            StatusEvent::Engine(EngineEvent::RecordingStopped),
        ],
    );
    assert_eq!(state.recording_status, RecordingState::Offline);
    assert_eq!(state.recording_status_time, epoch() + Duration::seconds(2));
}

#[test]
fn test_recording_error_goes_offline() {
    let mut state = StreamingServiceState::new(epoch());
    apply(
        &mut state,
        &[
            StatusEvent::RecordingRequested,
            StatusEvent::Engine(EngineEvent::RecordingError {
                message: "disk full".to_string(),
            }),
        ],
    );
    assert_eq!(state.recording_status, RecordingState::Offline);
    assert!(reduce(&mut state, &StatusEvent::RecordingStopRequested, epoch()).is_err());
}

#[test]
fn test_replay_buffer_save_cycle() {
    let mut state = StreamingServiceState::new(epoch());
    let changes = apply(
        &mut state,
        &[
            StatusEvent::ReplayBufferRequested,
            StatusEvent::Engine(EngineEvent::ReplayBufferStarted),
            StatusEvent::ReplaySaveRequested,
            StatusEvent::Engine(EngineEvent::ReplaySaved),
            StatusEvent::ReplayBufferStopRequested,
            StatusEvent::Engine(EngineEvent::ReplayBufferStopped),
        ],
    );

    let statuses: Vec<ReplayBufferState> = changes
        .iter()
        .map(|change| match change {
            StatusChange::ReplayBuffer { to, .. } => *to,
            other => panic!("unexpected change {:?}", other),
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            ReplayBufferState::Starting,
            ReplayBufferState::Running,
            ReplayBufferState::Saving,
            ReplayBufferState::Running,
            ReplayBufferState::Stopping,
            ReplayBufferState::Offline,
        ]
    );
}

#[test]
fn test_save_requires_running_buffer() {
    let mut state = StreamingServiceState::new(epoch());
    assert!(reduce(&mut state, &StatusEvent::ReplaySaveRequested, epoch()).is_err());
}

#[test]
fn test_outputs_are_independent() {
    let mut state = StreamingServiceState::new(epoch());
    apply(
        &mut state,
        &[
            StatusEvent::TransmissionStarting,
            StatusEvent::RecordingRequested,
            StatusEvent::ReplayBufferRequested,
            StatusEvent::GoLiveCompleted,
            StatusEvent::Engine(EngineEvent::FatalError {
                message: "encoder crashed".to_string(),
            }),
        ],
    );

    assert_eq!(state.streaming_status, StreamingState::Offline);
    assert_eq!(state.recording_status, RecordingState::Starting);
    assert_eq!(state.replay_buffer_status, ReplayBufferState::Starting);
}

#[test]
fn test_state_serialization() {
    let state = StreamingServiceState::new(epoch());
    let json = serde_json::to_value(&state).unwrap();
    assert_eq!(json["streamingStatus"], "offline");
    assert_eq!(json["replayBufferStatus"], "offline");
    assert_eq!(json["info"]["lifecycle"], "empty");
    assert!(json["streamingStatusTime"].is_string());
}
