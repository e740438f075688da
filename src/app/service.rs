use super::session::Session;
use super::types::{Command, Message, Reply};
use crate::checklist::ChecklistStep;
use crate::config::GoLiveConfig;
use crate::error::{OrchestratorError, Result};
use crate::events::{EventBus, EventFilter, EventReceiver, GoLiveEvent, RecordingStatusReceiver, StatusReceiver};
use crate::platform::{PlatformAdapter, PlatformRegistry, SocialPoster};
use crate::settings::GoLiveSettings;
use crate::status::StreamingServiceState;
use crate::telemetry::{TelemetrySink, TracingTelemetry};
use crate::transmission::{EngineEvent, TransmissionEngine};
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Handle to a running streaming session.
///
/// Cheap to clone; every clone talks to the same session task. Commands are
/// applied one at a time in the order they are received.
#[derive(Clone)]
pub struct StreamingService {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<StreamingServiceState>,
    event_bus: EventBus,
}

impl StreamingService {
    pub fn builder() -> StreamingServiceBuilder {
        StreamingServiceBuilder::new()
    }

    /// Begin a go-live with `settings`; synchronization continues in the background
    pub async fn request_go_live(&self, settings: GoLiveSettings) -> Result<()> {
        self.call(|reply| Command::RequestGoLive { settings, reply })
            .await
    }

    /// Start the checklist with the synchronized settings
    pub async fn confirm_checklist(&self) -> Result<()> {
        self.call(|reply| Command::ConfirmChecklist { reply }).await
    }

    /// Cancel settings synchronization or the running checklist
    pub async fn cancel_go_live(&self) -> Result<()> {
        self.call(|reply| Command::CancelGoLive { reply }).await
    }

    pub async fn retry_failed_step(&self, step: ChecklistStep) -> Result<()> {
        self.call(|reply| Command::RetryFailedStep { step, reply })
            .await
    }

    pub async fn stop_streaming(&self) -> Result<()> {
        self.call(|reply| Command::StopStreaming { reply }).await
    }

    pub async fn toggle_streaming(&self) -> Result<()> {
        self.call(|reply| Command::ToggleStreaming { reply }).await
    }

    pub async fn toggle_recording(&self) -> Result<()> {
        self.call(|reply| Command::ToggleRecording { reply }).await
    }

    pub async fn toggle_replay_buffer(&self) -> Result<()> {
        self.call(|reply| Command::ToggleReplayBuffer { reply }).await
    }

    pub async fn save_replay(&self) -> Result<()> {
        self.call(|reply| Command::SaveReplay { reply }).await
    }

    /// Replace the go-live settings; rejected while they are locked
    pub async fn update_settings(&self, settings: GoLiveSettings) -> Result<()> {
        self.call(|reply| Command::UpdateSettings { settings, reply })
            .await
    }

    pub async fn set_selective_recording(&self, enabled: bool) -> Result<()> {
        self.call(|reply| Command::SetSelectiveRecording { enabled, reply })
            .await
    }

    /// Stop everything that is running and wait for the session to exit
    pub async fn shutdown(&self) -> Result<()> {
        self.call(|reply| Command::Shutdown { reply }).await
    }

    /// Current snapshot of the session
    pub fn get_model(&self) -> StreamingServiceState {
        self.snapshot.borrow().clone()
    }

    /// Snapshot stream; the receiver always holds the latest state
    pub fn subscribe_model(&self) -> watch::Receiver<StreamingServiceState> {
        self.snapshot.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<GoLiveEvent> {
        self.event_bus.subscribe()
    }

    pub fn filtered_events(&self, filter: EventFilter, name: &str) -> EventReceiver {
        EventReceiver::new(self.event_bus.subscribe(), filter, name.to_string())
    }

    /// Streaming status values as they are entered
    pub fn streaming_status_changes(&self) -> StatusReceiver {
        StatusReceiver::new(self.event_bus.subscribe())
    }

    pub fn recording_status_changes(&self) -> RecordingStatusReceiver {
        RecordingStatusReceiver::new(self.event_bus.subscribe())
    }

    /// Wait until a snapshot satisfies `predicate`
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<StreamingServiceState>
    where
        F: FnMut(&StreamingServiceState) -> bool,
    {
        let mut snapshot = self.snapshot.clone();
        let state = snapshot
            .wait_for(|state| predicate(state))
            .await
            .map_err(|_| OrchestratorError::SessionClosed)?;
        Ok(state.clone())
    }

    async fn call<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| OrchestratorError::SessionClosed)?;
        response.await.map_err(|_| OrchestratorError::SessionClosed)?
    }
}

/// Builder for [`StreamingService`]
pub struct StreamingServiceBuilder {
    config: GoLiveConfig,
    registry: PlatformRegistry,
    engine: Option<Arc<dyn TransmissionEngine>>,
    social: Option<Arc<dyn SocialPoster>>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl Default for StreamingServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingServiceBuilder {
    pub fn new() -> Self {
        Self {
            config: GoLiveConfig::default(),
            registry: PlatformRegistry::new(),
            engine: None,
            social: None,
            telemetry: Arc::new(TracingTelemetry),
        }
    }

    pub fn with_config(mut self, config: GoLiveConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_platform(mut self, adapter: Arc<dyn PlatformAdapter>) -> Self {
        self.registry.register(adapter);
        self
    }

    pub fn with_engine(mut self, engine: Arc<dyn TransmissionEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_social_poster(mut self, poster: Arc<dyn SocialPoster>) -> Self {
        self.social = Some(poster);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Spawn the session task. Must be called from within a tokio runtime.
    pub fn build(self) -> Result<StreamingService> {
        self.config.validate()?;
        let engine = self.engine.ok_or_else(|| {
            OrchestratorError::component("session", "a transmission engine is required")
        })?;
        if self.registry.is_empty() {
            warn!("Streaming session built without platform adapters");
        }

        let event_bus = if self.config.session.debug_events {
            EventBus::with_debug_logging(self.config.session.event_bus_capacity)
        } else {
            EventBus::new(self.config.session.event_bus_capacity)
        };

        let state = StreamingServiceState::new(Utc::now());
        let (snapshot_tx, snapshot_rx) = watch::channel(state.clone());
        let (command_tx, command_rx) = mpsc::channel(self.config.session.command_queue_capacity);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        spawn_engine_forwarder(engine.events(), internal_tx.clone());

        let session = Session {
            id: Uuid::new_v4(),
            config: self.config,
            state,
            registry: self.registry,
            engine,
            social: self.social,
            telemetry: self.telemetry,
            event_bus: event_bus.clone(),
            snapshot: snapshot_tx,
            internal: internal_tx,
            last_request: None,
            settings: None,
            sync_generation: 0,
            sync_task: None,
            executor: None,
            checklist_cancel: None,
            pending_fatal: None,
            disabled_since_run: BTreeSet::new(),
            reenabled: BTreeSet::new(),
            live_platforms: Vec::new(),
            reconnect_epoch: 0,
            tasks_in_flight: 0,
            shutdown_reply: None,
            shutting_down: false,
        };
        info!("Starting streaming session {}", session.id);
        tokio::spawn(session.run(command_rx, internal_rx));

        Ok(StreamingService {
            commands: command_tx,
            snapshot: snapshot_rx,
            event_bus,
        })
    }
}

/// Relay engine callbacks into the session until either side goes away
fn spawn_engine_forwarder(
    mut events: broadcast::Receiver<EngineEvent>,
    internal: mpsc::UnboundedSender<Message>,
) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if internal.send(Message::Engine(event)).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Session lagged behind engine by {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Engine event channel closed");
                    break;
                }
            }
        }
    });
}
