use super::{EngineEvent, TransmissionEngine};
use crate::error::StreamError;
use crate::platform::Platform;
use crate::settings::EncoderProfile;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

/// Calls observed by the mock engine, in order
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Begin,
    End,
    ApplyProfile(String),
    ConfigureRestream(Vec<Platform>),
    StartRecording,
    StopRecording,
    StartReplayBuffer,
    StopReplayBuffer,
    SaveReplay,
}

/// Simulated engine: successful operations emit the matching callback
pub struct MockTransmissionEngine {
    events: broadcast::Sender<EngineEvent>,
    delay: Duration,
    begin_error: Mutex<Option<StreamError>>,
    recording_error: Mutex<Option<String>>,
    calls: Mutex<Vec<EngineCall>>,
}

impl Default for MockTransmissionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransmissionEngine {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            events,
            delay: Duration::ZERO,
            begin_error: Mutex::new(None),
            recording_error: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Simulated latency for every operation
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_begin(self, message: &str) -> Self {
        self.set_begin_error(Some(StreamError::encoder(message)));
        self
    }

    pub fn set_begin_error(&self, error: Option<StreamError>) {
        *self.begin_error.lock() = error;
    }

    /// Make later recordings fail asynchronously with `RecordingError`
    pub fn fail_recording(self, message: &str) -> Self {
        *self.recording_error.lock() = Some(message.to_string());
        self
    }

    /// Inject a callback as if the engine raised it
    pub fn emit(&self, event: EngineEvent) {
        debug!("Mock engine emitting {}", event.name());
        let _ = self.events.send(event);
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &EngineCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    async fn simulate(&self, call: EngineCall) {
        debug!("Mock engine: {:?}", call);
        self.calls.lock().push(call);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl TransmissionEngine for MockTransmissionEngine {
    async fn begin(&self) -> Result<(), StreamError> {
        self.simulate(EngineCall::Begin).await;
        if let Some(error) = self.begin_error.lock().clone() {
            return Err(error);
        }
        self.emit(EngineEvent::Started);
        Ok(())
    }

    async fn end(&self) -> Result<(), StreamError> {
        self.simulate(EngineCall::End).await;
        self.emit(EngineEvent::Stopped);
        Ok(())
    }

    async fn apply_profile(&self, profile: &EncoderProfile) -> Result<(), StreamError> {
        self.simulate(EngineCall::ApplyProfile(profile.name.clone())).await;
        Ok(())
    }

    async fn configure_restream(&self, platforms: &[Platform]) -> Result<(), StreamError> {
        self.simulate(EngineCall::ConfigureRestream(platforms.to_vec()))
            .await;
        Ok(())
    }

    async fn start_recording(&self) -> Result<(), StreamError> {
        self.simulate(EngineCall::StartRecording).await;
        let failure = self.recording_error.lock().clone();
        match failure {
            Some(message) => self.emit(EngineEvent::RecordingError { message }),
            None => self.emit(EngineEvent::RecordingStarted),
        }
        Ok(())
    }

    async fn stop_recording(&self) -> Result<(), StreamError> {
        self.simulate(EngineCall::StopRecording).await;
        self.emit(EngineEvent::RecordingStopped);
        Ok(())
    }

    async fn start_replay_buffer(&self) -> Result<(), StreamError> {
        self.simulate(EngineCall::StartReplayBuffer).await;
        self.emit(EngineEvent::ReplayBufferStarted);
        Ok(())
    }

    async fn stop_replay_buffer(&self) -> Result<(), StreamError> {
        self.simulate(EngineCall::StopReplayBuffer).await;
        self.emit(EngineEvent::ReplayBufferStopped);
        Ok(())
    }

    async fn save_replay(&self) -> Result<(), StreamError> {
        self.simulate(EngineCall::SaveReplay).await;
        self.emit(EngineEvent::ReplaySaved);
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_operations_emit_callbacks() {
        let engine = MockTransmissionEngine::new();
        let mut events = engine.events();

        engine.begin().await.unwrap();
        engine.save_replay().await.unwrap();

        assert_eq!(events.recv().await.unwrap(), EngineEvent::Started);
        assert_eq!(events.recv().await.unwrap(), EngineEvent::ReplaySaved);
        assert_eq!(engine.calls(), vec![EngineCall::Begin, EngineCall::SaveReplay]);
    }

    #[tokio::test]
    async fn test_begin_failure_emits_nothing() {
        let engine = MockTransmissionEngine::new().fail_begin("no encoder");
        let mut events = engine.events();

        let error = engine.begin().await.unwrap_err();
        assert_eq!(error.kind, crate::error::StreamErrorKind::EncoderFailure);
        assert!(events.try_recv().is_err());
    }
}
