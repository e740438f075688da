use crate::checklist::{ChecklistStep, ItemState};
use crate::error::{EventBusError, StreamError};
use crate::info::Lifecycle;
use crate::platform::Platform;
use crate::status::{RecordingState, ReplayBufferState, StreamingState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Change notifications published by a streaming session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GoLiveEvent {
    /// The go-live lifecycle moved
    LifecycleChanged { from: Lifecycle, to: Lifecycle },
    /// A checklist step changed state
    ChecklistItemChanged {
        step: ChecklistStep,
        state: ItemState,
        error: Option<StreamError>,
    },
    StreamingStatusChanged {
        status: StreamingState,
        time: DateTime<Utc>,
    },
    RecordingStatusChanged {
        status: RecordingState,
        time: DateTime<Utc>,
    },
    ReplayBufferStatusChanged {
        status: ReplayBufferState,
        time: DateTime<Utc>,
    },
    /// Remote settings were merged for these platforms
    SettingsSynchronized { platforms: Vec<Platform> },
    /// A go-live attempt or live stream ended on an error
    GoLiveFailed { error: StreamError },
}

impl GoLiveEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            GoLiveEvent::LifecycleChanged { from, to } => {
                format!("Lifecycle {} -> {}", from, to)
            }
            GoLiveEvent::ChecklistItemChanged { step, state, error } => match error {
                Some(error) => format!("Checklist {} {}: {}", step, state, error),
                None => format!("Checklist {} {}", step, state),
            },
            GoLiveEvent::StreamingStatusChanged { status, .. } => {
                format!("Streaming {}", status)
            }
            GoLiveEvent::RecordingStatusChanged { status, .. } => {
                format!("Recording {}", status)
            }
            GoLiveEvent::ReplayBufferStatusChanged { status, .. } => {
                format!("Replay buffer {}", status)
            }
            GoLiveEvent::SettingsSynchronized { platforms } => {
                format!("Settings synchronized for {} platform(s)", platforms.len())
            }
            GoLiveEvent::GoLiveFailed { error } => format!("Go-live failed: {}", error),
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            GoLiveEvent::LifecycleChanged { .. } => "lifecycle_changed",
            GoLiveEvent::ChecklistItemChanged { .. } => "checklist_item_changed",
            GoLiveEvent::StreamingStatusChanged { .. } => "streaming_status_changed",
            GoLiveEvent::RecordingStatusChanged { .. } => "recording_status_changed",
            GoLiveEvent::ReplayBufferStatusChanged { .. } => "replay_buffer_status_changed",
            GoLiveEvent::SettingsSynchronized { .. } => "settings_synchronized",
            GoLiveEvent::GoLiveFailed { .. } => "go_live_failed",
        }
    }

    /// The platform this event concerns, if any
    pub fn platform(&self) -> Option<Platform> {
        match self {
            GoLiveEvent::ChecklistItemChanged { step, error, .. } => error
                .as_ref()
                .and_then(|e| e.platform)
                .or_else(|| step.lane()),
            GoLiveEvent::GoLiveFailed { error } => error.platform,
            _ => None,
        }
    }
}

/// Broadcast bus carrying [`GoLiveEvent`]s to UI and telemetry subscribers
pub struct EventBus {
    sender: broadcast::Sender<GoLiveEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: true,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GoLiveEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers, returning how many received it
    pub async fn publish(&self, event: GoLiveEvent) -> Result<usize, EventBusError> {
        if self.debug_logging {
            debug!("Publishing event: {}", event.description());
        }

        match &event {
            GoLiveEvent::LifecycleChanged { .. } => info!("{}", event.description()),
            GoLiveEvent::GoLiveFailed { error } => {
                error!("Go-live failed: {}", error);
            }
            GoLiveEvent::StreamingStatusChanged {
                status: StreamingState::Reconnecting,
                ..
            } => {
                warn!("Stream connection lost, reconnecting");
            }
            _ => {}
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            debug_logging: self.debug_logging,
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Accept checklist and failure events concerning these platforms
    Platforms(Vec<Platform>),
    Custom(fn(&GoLiveEvent) -> bool),
}

impl EventFilter {
    pub fn matches(&self, event: &GoLiveEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Platforms(platforms) => event
                .platform()
                .is_some_and(|platform| platforms.contains(&platform)),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<GoLiveEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(receiver: broadcast::Receiver<GoLiveEvent>, filter: EventFilter, name: String) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<GoLiveEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::PublishFailed {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<GoLiveEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::PublishFailed {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}

/// Stream of streaming status values, in the order they were entered
pub struct StatusReceiver {
    inner: EventReceiver,
}

impl StatusReceiver {
    pub fn new(receiver: broadcast::Receiver<GoLiveEvent>) -> Self {
        Self {
            inner: EventReceiver::new(
                receiver,
                EventFilter::EventTypes(vec!["streaming_status_changed"]),
                "streaming-status".to_string(),
            ),
        }
    }

    pub async fn recv(&mut self) -> Result<StreamingState, EventBusError> {
        loop {
            if let GoLiveEvent::StreamingStatusChanged { status, .. } = self.inner.recv().await? {
                return Ok(status);
            }
        }
    }

    /// Every status received so far, without waiting
    pub fn drain(&mut self) -> Result<Vec<StreamingState>, EventBusError> {
        let mut statuses = Vec::new();
        while let Some(event) = self.inner.try_recv()? {
            if let GoLiveEvent::StreamingStatusChanged { status, .. } = event {
                statuses.push(status);
            }
        }
        Ok(statuses)
    }
}

/// Stream of recording status values, in the order they were entered
pub struct RecordingStatusReceiver {
    inner: EventReceiver,
}

impl RecordingStatusReceiver {
    pub fn new(receiver: broadcast::Receiver<GoLiveEvent>) -> Self {
        Self {
            inner: EventReceiver::new(
                receiver,
                EventFilter::EventTypes(vec!["recording_status_changed"]),
                "recording-status".to_string(),
            ),
        }
    }

    pub async fn recv(&mut self) -> Result<RecordingState, EventBusError> {
        loop {
            if let GoLiveEvent::RecordingStatusChanged { status, .. } = self.inner.recv().await? {
                return Ok(status);
            }
        }
    }

    pub fn drain(&mut self) -> Result<Vec<RecordingState>, EventBusError> {
        let mut statuses = Vec::new();
        while let Some(event) = self.inner.try_recv()? {
            if let GoLiveEvent::RecordingStatusChanged { status, .. } = event {
                statuses.push(status);
            }
        }
        Ok(statuses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    fn status(status: StreamingState) -> GoLiveEvent {
        GoLiveEvent::StreamingStatusChanged {
            status,
            time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let event = GoLiveEvent::LifecycleChanged {
            from: Lifecycle::Empty,
            to: Lifecycle::Prepopulate,
        };
        let subscriber_count = event_bus.publish(event.clone()).await.unwrap();
        assert_eq!(subscriber_count, 1);

        assert_eq!(receiver.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_fails() {
        let event_bus = EventBus::new(10);
        assert!(!event_bus.has_subscribers());
        let result = event_bus.publish(status(StreamingState::Live)).await;
        assert!(matches!(result, Err(EventBusError::PublishFailed { .. })));
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();
        assert_eq!(event_bus.subscriber_count(), 2);

        event_bus.publish(status(StreamingState::Starting)).await.unwrap();

        let _ = timeout(Duration::from_millis(100), receiver1.recv())
            .await
            .unwrap()
            .unwrap();
        let _ = timeout(Duration::from_millis(100), receiver2.recv())
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_platform_filter() {
        let filter = EventFilter::Platforms(vec![Platform::Youtube]);

        let youtube_step = GoLiveEvent::ChecklistItemChanged {
            step: ChecklistStep::PublishYoutubeBroadcast,
            state: ItemState::Pending,
            error: None,
        };
        let twitch_failure = GoLiveEvent::GoLiveFailed {
            error: StreamError::platform_rejected(Platform::Twitch, "bad key"),
        };

        assert!(filter.matches(&youtube_step));
        assert!(!filter.matches(&twitch_failure));
        assert!(!filter.matches(&status(StreamingState::Live)));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let event_bus = EventBus::new(10);
        let filter = EventFilter::EventTypes(vec!["go_live_failed"]);
        let mut filtered = EventReceiver::new(event_bus.subscribe(), filter, "test".to_string());

        event_bus.publish(status(StreamingState::Starting)).await.unwrap();
        event_bus
            .publish(GoLiveEvent::GoLiveFailed {
                error: StreamError::encoder("no encoder"),
            })
            .await
            .unwrap();

        let received = timeout(Duration::from_millis(100), filtered.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.event_type(), "go_live_failed");
        assert!(filtered.try_recv().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_status_receiver_yields_streaming_states() {
        let event_bus = EventBus::new(10);
        let mut statuses = StatusReceiver::new(event_bus.subscribe());

        event_bus.publish(status(StreamingState::Starting)).await.unwrap();
        event_bus
            .publish(GoLiveEvent::LifecycleChanged {
                from: Lifecycle::RunChecklist,
                to: Lifecycle::Live,
            })
            .await
            .unwrap();
        event_bus.publish(status(StreamingState::Live)).await.unwrap();

        assert_eq!(statuses.recv().await.unwrap(), StreamingState::Starting);
        assert_eq!(statuses.drain().unwrap(), vec![StreamingState::Live]);
    }

    #[tokio::test]
    async fn test_recording_status_receiver_skips_other_events() {
        let event_bus = EventBus::new(10);
        let mut recording = RecordingStatusReceiver::new(event_bus.subscribe());

        event_bus.publish(status(StreamingState::Starting)).await.unwrap();
        for state in [RecordingState::Starting, RecordingState::Recording] {
            event_bus
                .publish(GoLiveEvent::RecordingStatusChanged {
                    status: state,
                    time: Utc::now(),
                })
                .await
                .unwrap();
        }

        let first = timeout(Duration::from_secs(1), recording.recv()).await.unwrap();
        assert_eq!(first.unwrap(), RecordingState::Starting);
        assert_eq!(recording.drain().unwrap(), vec![RecordingState::Recording]);
        assert!(recording.drain().unwrap().is_empty());
    }

    #[test]
    fn test_event_serialization() {
        let event = GoLiveEvent::ChecklistItemChanged {
            step: ChecklistStep::SetupRestream,
            state: ItemState::NotStarted,
            error: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "checklistItemChanged");
        assert_eq!(json["step"], "setupRestream");
        assert_eq!(json["state"], "not-started");
        assert_eq!(event.description(), "Checklist setupRestream not-started");
    }
}
