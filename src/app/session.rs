use super::types::{Command, Message, Reply};
use crate::checklist::ChecklistExecutor;
use crate::config::GoLiveConfig;
use crate::error::{OrchestratorError, Result, StreamError};
use crate::events::{EventBus, GoLiveEvent};
use crate::info::Lifecycle;
use crate::platform::{Platform, PlatformRegistry, SocialPoster};
use crate::settings::GoLiveSettings;
use crate::status::{reduce, StatusChange, StatusEvent, StreamingServiceState};
use crate::telemetry::TelemetrySink;
use crate::transmission::TransmissionEngine;
use chrono::Utc;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Single writer of the streaming state.
///
/// Commands arrive from [`super::StreamingService`] handles; everything the
/// session spawns (settings sync, checklist runs, teardown, engine calls)
/// reports back through the internal channel, which is always drained first.
pub(super) struct Session {
    pub(super) id: Uuid,
    pub(super) config: GoLiveConfig,
    pub(super) state: StreamingServiceState,

    // Collaborators
    pub(super) registry: PlatformRegistry,
    pub(super) engine: Arc<dyn TransmissionEngine>,
    pub(super) social: Option<Arc<dyn SocialPoster>>,
    pub(super) telemetry: Arc<dyn TelemetrySink>,

    // Outputs
    pub(super) event_bus: EventBus,
    pub(super) snapshot: watch::Sender<StreamingServiceState>,
    pub(super) internal: mpsc::UnboundedSender<Message>,

    // Go-live
    pub(super) last_request: Option<GoLiveSettings>,
    pub(super) settings: Option<GoLiveSettings>,
    pub(super) sync_generation: u64,
    pub(super) sync_task: Option<JoinHandle<()>>,
    pub(super) executor: Option<ChecklistExecutor>,
    pub(super) checklist_cancel: Option<CancellationToken>,
    pub(super) pending_fatal: Option<StreamError>,
    pub(super) disabled_since_run: BTreeSet<Platform>,
    pub(super) reenabled: BTreeSet<Platform>,
    pub(super) live_platforms: Vec<Platform>,
    pub(super) reconnect_epoch: u64,

    // Lifecycle management
    pub(super) tasks_in_flight: usize,
    pub(super) shutdown_reply: Option<Reply<()>>,
    pub(super) shutting_down: bool,
}

impl Session {
    pub(super) async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Message>,
    ) {
        info!("Streaming session {} started", self.id);

        loop {
            tokio::select! {
                biased;
                Some(message) = internal.recv() => self.handle_message(message).await,
                command = commands.recv(), if !self.shutting_down => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("All service handles dropped");
                        self.begin_shutdown().await;
                    }
                },
                else => break,
            }

            self.publish_snapshot();

            if self.shutting_down && self.is_idle() {
                break;
            }
        }

        info!("Streaming session {} stopped", self.id);
        if let Some(reply) = self.shutdown_reply.take() {
            let _ = reply.send(Ok(()));
        }
    }

    async fn handle_command(&mut self, command: Command) {
        debug!("Handling command {}", command.name());

        match command {
            Command::RequestGoLive { settings, reply } => {
                let result = self.request_go_live(settings).await;
                respond(reply, result);
            }
            Command::ConfirmChecklist { reply } => {
                let result = self.confirm_checklist().await;
                respond(reply, result);
            }
            Command::CancelGoLive { reply } => {
                let result = self.cancel_go_live().await;
                respond(reply, result);
            }
            Command::RetryFailedStep { step, reply } => {
                let result = self.retry_failed_step(step).await;
                respond(reply, result);
            }
            Command::StopStreaming { reply } => {
                let result = self.stop_streaming().await;
                respond(reply, result);
            }
            Command::ToggleStreaming { reply } => {
                let result = self.toggle_streaming().await;
                respond(reply, result);
            }
            Command::ToggleRecording { reply } => {
                let result = self.toggle_recording().await;
                respond(reply, result);
            }
            Command::ToggleReplayBuffer { reply } => {
                let result = self.toggle_replay_buffer().await;
                respond(reply, result);
            }
            Command::SaveReplay { reply } => {
                let result = self.save_replay().await;
                respond(reply, result);
            }
            Command::UpdateSettings { settings, reply } => {
                let result = self.update_settings(settings);
                respond(reply, result);
            }
            Command::SetSelectiveRecording { enabled, reply } => {
                let result = self.set_selective_recording(enabled);
                respond(reply, result);
            }
            Command::Shutdown { reply } => {
                self.shutdown_reply = Some(reply);
                self.begin_shutdown().await;
            }
        }
    }

    async fn handle_message(&mut self, message: Message) {
        match message {
            Message::SettingsSynced { generation, result } => {
                self.settings_synced(generation, result).await
            }
            Message::StepChanged(update) => self.step_changed(update).await,
            Message::ChecklistFinished { executor, outcome } => {
                self.checklist_finished(executor, outcome).await
            }
            Message::Engine(event) => self.engine_event(event).await,
            Message::ReconnectTimeout { epoch } => self.reconnect_timeout(epoch).await,
            Message::OutputFinished { op, result } => {
                self.tasks_in_flight = self.tasks_in_flight.saturating_sub(1);
                self.output_finished(op, result).await;
            }
            Message::TeardownFinished => {
                self.tasks_in_flight = self.tasks_in_flight.saturating_sub(1);
                self.teardown_finished().await;
            }
        }
    }

    /// Stop whatever is running and exit once spawned work has reported back
    async fn begin_shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        info!("Shutting down streaming session");
        self.shutting_down = true;

        match self.state.info.lifecycle {
            Lifecycle::Prepopulate | Lifecycle::RunChecklist => {
                if let Err(e) = self.cancel_go_live().await {
                    warn!("Failed to cancel go-live during shutdown: {}", e);
                }
            }
            Lifecycle::Live => {
                if let Err(e) = self.stop_streaming().await {
                    warn!("Failed to stop stream during shutdown: {}", e);
                }
            }
            Lifecycle::Empty | Lifecycle::WaitForNewSettings => {}
        }

        self.stop_outputs_for_shutdown().await;
    }

    fn is_idle(&self) -> bool {
        self.checklist_cancel.is_none() && self.sync_task.is_none() && self.tasks_in_flight == 0
    }

    pub(super) fn publish_snapshot(&self) {
        self.snapshot.send_if_modified(|current| {
            if *current == self.state {
                false
            } else {
                *current = self.state.clone();
                true
            }
        });
    }

    /// Publish on the bus; a bus without subscribers is not an error here
    pub(super) async fn publish(&self, event: GoLiveEvent) {
        if let Err(e) = self.event_bus.publish(event).await {
            debug!("Event not delivered: {}", e);
        }
    }

    pub(super) async fn lifecycle_changed(&self, from: Lifecycle) {
        let to = self.state.info.lifecycle;
        if from != to {
            self.publish(GoLiveEvent::LifecycleChanged { from, to }).await;
        }
    }

    /// Feed the status reducer and announce the change, if any
    pub(super) async fn apply_status(&mut self, event: StatusEvent) -> Result<Option<StatusChange>> {
        let change = reduce(&mut self.state, &event, Utc::now())?;
        if let Some(change) = change {
            self.announce_status(change).await;
        }
        Ok(change)
    }

    /// Like [`Self::apply_status`] for inputs the session does not control, such as late callbacks
    pub(super) async fn apply_status_or_warn(&mut self, event: StatusEvent) -> Option<StatusChange> {
        match self.apply_status(event).await {
            Ok(change) => change,
            Err(e) => {
                warn!("Ignoring status input: {}", e);
                None
            }
        }
    }

    async fn announce_status(&self, change: StatusChange) {
        let event = match change {
            StatusChange::Streaming { to, .. } => {
                self.telemetry
                    .record("StreamingStatus", json!({ "status": to, "sessionId": self.id }));
                GoLiveEvent::StreamingStatusChanged {
                    status: to,
                    time: self.state.streaming_status_time,
                }
            }
            StatusChange::Recording { to, .. } => {
                self.telemetry
                    .record("Recording", json!({ "status": to, "sessionId": self.id }));
                GoLiveEvent::RecordingStatusChanged {
                    status: to,
                    time: self.state.recording_status_time,
                }
            }
            StatusChange::ReplayBuffer { to, .. } => {
                self.telemetry
                    .record("ReplayBuffer", json!({ "status": to, "sessionId": self.id }));
                GoLiveEvent::ReplayBufferStatusChanged {
                    status: to,
                    time: self.state.replay_buffer_status_time,
                }
            }
        };
        self.publish(event).await;
    }

    pub(super) fn invalid_in_lifecycle(&self, action: &str) -> OrchestratorError {
        OrchestratorError::invalid_command(format!(
            "cannot {} while lifecycle is {}",
            action, self.state.info.lifecycle
        ))
    }
}

fn respond<T>(reply: Reply<T>, result: Result<T>) {
    if let Err(e) = &result {
        warn!("Command rejected: {}", e);
    }
    let _ = reply.send(result);
}
