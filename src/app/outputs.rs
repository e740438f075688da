use super::go_live::spawn_teardown;
use super::session::Session;
use super::types::{Message, OutputOp};
use crate::error::{OrchestratorError, Result, StreamError};
use crate::info::Lifecycle;
use crate::status::{RecordingState, ReplayBufferState, StatusChange, StatusEvent, StreamingState};
use crate::transmission::{EngineEvent, TransmissionEngine};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

impl OutputOp {
    fn name(&self) -> &'static str {
        match self {
            OutputOp::StartRecording => "start recording",
            OutputOp::StopRecording => "stop recording",
            OutputOp::StartReplayBuffer => "start replay buffer",
            OutputOp::StopReplayBuffer => "stop replay buffer",
            OutputOp::SaveReplay => "save replay",
        }
    }

    async fn perform(self, engine: &dyn TransmissionEngine) -> std::result::Result<(), StreamError> {
        match self {
            OutputOp::StartRecording => engine.start_recording().await,
            OutputOp::StopRecording => engine.stop_recording().await,
            OutputOp::StartReplayBuffer => engine.start_replay_buffer().await,
            OutputOp::StopReplayBuffer => engine.stop_replay_buffer().await,
            OutputOp::SaveReplay => engine.save_replay().await,
        }
    }

    /// Status input that settles the output when the engine call itself failed
    fn failure_event(&self, error: &StreamError) -> StatusEvent {
        match self {
            OutputOp::StartRecording => StatusEvent::RecordingStartFailed,
            OutputOp::StopRecording => StatusEvent::Engine(EngineEvent::RecordingError {
                message: error.message.clone(),
            }),
            OutputOp::StartReplayBuffer => StatusEvent::ReplayBufferStartFailed,
            OutputOp::StopReplayBuffer => StatusEvent::Engine(EngineEvent::ReplayBufferError {
                message: error.message.clone(),
            }),
            OutputOp::SaveReplay => StatusEvent::ReplaySaveFailed,
        }
    }
}

impl Session {
    /// `live -> empty`, ending the transmission and every live broadcast
    pub(super) async fn stop_streaming(&mut self) -> Result<()> {
        if self.state.info.lifecycle != Lifecycle::Live {
            return Err(OrchestratorError::InvalidTransition {
                from: self.state.info.lifecycle,
                to: Lifecycle::Empty,
            });
        }

        info!("Stopping stream");
        self.apply_status(StatusEvent::StopRequested).await?;
        self.end_live(None, true).await;
        Ok(())
    }

    /// One-key streaming control; what it does depends on where the session is
    pub(super) async fn toggle_streaming(&mut self) -> Result<()> {
        let lifecycle = self.state.info.lifecycle;
        match (self.state.streaming_status, lifecycle) {
            (StreamingState::Offline, Lifecycle::Empty) => {
                let settings = self
                    .last_request
                    .clone()
                    .unwrap_or_else(|| self.config.go_live.clone());
                self.request_go_live(settings).await
            }
            (StreamingState::Offline, Lifecycle::WaitForNewSettings) => self.confirm_checklist().await,
            (StreamingState::Offline, Lifecycle::Prepopulate) => {
                debug!("Settings are still synchronizing");
                Ok(())
            }
            (StreamingState::Offline | StreamingState::Starting, Lifecycle::RunChecklist) => {
                self.cancel_go_live().await
            }
            (StreamingState::Live | StreamingState::Reconnecting, _) => self.stop_streaming().await,
            (StreamingState::Ending, _) => {
                debug!("Stream is already ending");
                Ok(())
            }
            (status, lifecycle) => Err(OrchestratorError::invalid_command(format!(
                "cannot toggle streaming while {} in lifecycle {}",
                status, lifecycle
            ))),
        }
    }

    pub(super) async fn toggle_recording(&mut self) -> Result<()> {
        match self.state.recording_status {
            RecordingState::Offline => {
                self.apply_status(StatusEvent::RecordingRequested).await?;
                self.spawn_output(OutputOp::StartRecording);
            }
            RecordingState::Starting | RecordingState::Recording => {
                self.apply_status(StatusEvent::RecordingStopRequested)
                    .await?;
                self.spawn_output(OutputOp::StopRecording);
            }
            RecordingState::Stopping => debug!("Recording is already stopping"),
        }
        Ok(())
    }

    pub(super) async fn toggle_replay_buffer(&mut self) -> Result<()> {
        match self.state.replay_buffer_status {
            ReplayBufferState::Offline => {
                self.apply_status(StatusEvent::ReplayBufferRequested)
                    .await?;
                self.spawn_output(OutputOp::StartReplayBuffer);
            }
            ReplayBufferState::Starting | ReplayBufferState::Running => {
                self.apply_status(StatusEvent::ReplayBufferStopRequested)
                    .await?;
                self.spawn_output(OutputOp::StopReplayBuffer);
            }
            ReplayBufferState::Stopping | ReplayBufferState::Saving => {
                return Err(OrchestratorError::invalid_command(format!(
                    "replay buffer is {}",
                    self.state.replay_buffer_status
                )));
            }
        }
        Ok(())
    }

    pub(super) async fn save_replay(&mut self) -> Result<()> {
        if self.state.replay_buffer_status != ReplayBufferState::Running {
            return Err(OrchestratorError::invalid_command(format!(
                "cannot save a replay while the replay buffer is {}",
                self.state.replay_buffer_status
            )));
        }
        self.apply_status(StatusEvent::ReplaySaveRequested).await?;
        self.spawn_output(OutputOp::SaveReplay);
        Ok(())
    }

    pub(super) fn set_selective_recording(&mut self, enabled: bool) -> Result<()> {
        if self.state.recording_status != RecordingState::Offline {
            return Err(OrchestratorError::invalid_command(
                "selective recording can only change while recording is offline",
            ));
        }
        self.state.selective_recording = enabled;
        Ok(())
    }

    fn spawn_output(&mut self, op: OutputOp) {
        self.tasks_in_flight += 1;
        let engine = Arc::clone(&self.engine);
        let internal = self.internal.clone();

        tokio::spawn(async move {
            let result = op.perform(engine.as_ref()).await;
            let _ = internal.send(Message::OutputFinished { op, result });
        });
    }

    pub(super) async fn output_finished(&mut self, op: OutputOp, result: std::result::Result<(), StreamError>) {
        if let Err(e) = result {
            error!("Failed to {}: {}", op.name(), e);
            self.apply_status_or_warn(op.failure_event(&e)).await;
        }
    }

    pub(super) async fn stop_outputs_for_shutdown(&mut self) {
        if matches!(
            self.state.recording_status,
            RecordingState::Starting | RecordingState::Recording
        ) {
            if let Err(e) = self.toggle_recording().await {
                warn!("Failed to stop recording: {}", e);
            }
        }
        if matches!(
            self.state.replay_buffer_status,
            ReplayBufferState::Starting | ReplayBufferState::Running
        ) {
            if let Err(e) = self.toggle_replay_buffer().await {
                warn!("Failed to stop replay buffer: {}", e);
            }
        }
    }

    pub(super) async fn engine_event(&mut self, event: EngineEvent) {
        debug!("Engine event: {}", event.name());

        match &event {
            EngineEvent::FatalError { message } if self.state.info.lifecycle == Lifecycle::RunChecklist => {
                error!("Transmission failed while going live: {}", message);
                self.pending_fatal = Some(StreamError::encoder(message.clone()));
                if let Some(cancel) = &self.checklist_cancel {
                    cancel.cancel();
                }
                return;
            }
            _ => {}
        }

        let change = self
            .apply_status_or_warn(StatusEvent::Engine(event.clone()))
            .await;

        match (change, event) {
            (
                Some(StatusChange::Streaming {
                    to: StreamingState::Reconnecting,
                    ..
                }),
                _,
            ) => self.arm_reconnect_timer(),
            (
                Some(StatusChange::Streaming {
                    from: StreamingState::Reconnecting,
                    to: StreamingState::Live,
                }),
                _,
            ) => {
                info!("Stream connection recovered");
                self.reconnect_epoch += 1;
            }
            (
                Some(StatusChange::Streaming {
                    from: StreamingState::Live | StreamingState::Reconnecting,
                    to: StreamingState::Offline,
                }),
                event,
            ) => {
                let error = match event {
                    EngineEvent::FatalError { message } => StreamError::encoder(message),
                    _ => StreamError::network("transmission stopped unexpectedly"),
                };
                self.end_live(Some(error), false).await;
            }
            _ => {}
        }
    }

    fn arm_reconnect_timer(&mut self) {
        self.reconnect_epoch += 1;
        let epoch = self.reconnect_epoch;
        let limit = self.config.timeouts.reconnect();
        let internal = self.internal.clone();
        warn!("Stream reconnecting, giving up after {:?}", limit);

        tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            let _ = internal.send(Message::ReconnectTimeout { epoch });
        });
    }

    pub(super) async fn reconnect_timeout(&mut self, epoch: u64) {
        if epoch != self.reconnect_epoch || self.state.streaming_status != StreamingState::Reconnecting {
            debug!("Stale reconnect timer #{}", epoch);
            return;
        }

        error!("Stream did not recover within {:?}", self.config.timeouts.reconnect());
        if self
            .apply_status_or_warn(StatusEvent::ReconnectTimedOut)
            .await
            .is_some()
        {
            let error = StreamError::network("connection to the ingest server was lost");
            self.end_live(Some(error), true).await;
        }
    }

    /// `live -> empty`, tearing down whatever is still running
    async fn end_live(&mut self, error: Option<StreamError>, end_engine: bool) {
        self.reconnect_epoch += 1;
        let platforms = std::mem::take(&mut self.live_platforms);

        match self.state.info.end_stream(error.clone()) {
            Ok(from) => self.lifecycle_changed(from).await,
            Err(e) => error!("Failed to end stream: {}", e),
        }

        self.telemetry.record(
            "stream_end",
            json!({
                "sessionId": self.id,
                "platforms": platforms,
                "reason": error.as_ref().map(|e| e.kind.as_str()).unwrap_or("user"),
            }),
        );
        if let Some(error) = &error {
            self.report_failure(error).await;
        }

        spawn_teardown(self, end_engine, platforms);
    }

    pub(super) async fn teardown_finished(&mut self) {
        if self.state.streaming_status == StreamingState::Ending {
            debug!("Teardown finished without a stop callback");
            self.apply_status_or_warn(StatusEvent::Engine(EngineEvent::Stopped))
                .await;
        }
    }
}
