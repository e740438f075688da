use super::{Platform, PlatformAdapter, SocialPoster};
use crate::error::{StreamError, StreamErrorKind};
use crate::settings::PlatformSettings;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// Calls observed by a mock adapter, in order
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterCall {
    FetchSettings,
    Start(PlatformSettings),
    Stop,
    Publish,
}

/// Scripted platform adapter for simulations and tests
pub struct MockPlatformAdapter {
    platform: Platform,
    supports_restream: bool,
    remote_settings: PlatformSettings,
    delay: Duration,
    fetch_error: Mutex<Option<StreamError>>,
    start_error: Mutex<Option<StreamError>>,
    publish_error: Mutex<Option<StreamError>>,
    calls: Mutex<Vec<AdapterCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockPlatformAdapter {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            supports_restream: true,
            remote_settings: PlatformSettings {
                title: format!("{} stream", platform),
                game: Some("Just Chatting".to_string()),
                ..PlatformSettings::default()
            },
            delay: Duration::ZERO,
            fetch_error: Mutex::new(None),
            start_error: Mutex::new(None),
            publish_error: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_restream(mut self, supports_restream: bool) -> Self {
        self.supports_restream = supports_restream;
        self
    }

    /// Settings returned by `fetch_settings`
    pub fn with_remote_settings(mut self, settings: PlatformSettings) -> Self {
        self.remote_settings = settings;
        self
    }

    /// Simulated API latency for every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_fetch(self, kind: StreamErrorKind, message: &str) -> Self {
        *self.fetch_error.lock() = Some(StreamError::new(kind, message).with_platform(self.platform));
        self
    }

    pub fn fail_start(self, kind: StreamErrorKind, message: &str) -> Self {
        self.set_start_error(Some(StreamError::new(kind, message)));
        self
    }

    pub fn fail_publish(self, kind: StreamErrorKind, message: &str) -> Self {
        *self.publish_error.lock() = Some(StreamError::new(kind, message).with_platform(self.platform));
        self
    }

    /// Change the outcome of later `start` calls
    pub fn set_start_error(&self, error: Option<StreamError>) {
        *self.start_error.lock() = error.map(|e| e.with_platform(self.platform));
    }

    /// Change the outcome of later `publish` calls
    pub fn set_publish_error(&self, error: Option<StreamError>) {
        *self.publish_error.lock() = error.map(|e| e.with_platform(self.platform));
    }

    pub fn calls(&self) -> Vec<AdapterCall> {
        self.calls.lock().clone()
    }

    pub fn start_count(&self) -> usize {
        self.count(|call| matches!(call, AdapterCall::Start(_)))
    }

    pub fn stop_count(&self) -> usize {
        self.count(|call| matches!(call, AdapterCall::Stop))
    }

    pub fn publish_count(&self) -> usize {
        self.count(|call| matches!(call, AdapterCall::Publish))
    }

    /// Highest number of operations that overlapped on this adapter
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn count(&self, predicate: impl Fn(&AdapterCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| predicate(call)).count()
    }

    async fn simulate(&self, call: AdapterCall) {
        debug!("Mock {} adapter: {:?}", self.platform, call);
        self.calls.lock().push(call);

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PlatformAdapter for MockPlatformAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn supports_restream(&self) -> bool {
        self.supports_restream
    }

    async fn fetch_settings(&self) -> Result<PlatformSettings, StreamError> {
        self.simulate(AdapterCall::FetchSettings).await;
        match self.fetch_error.lock().clone() {
            Some(error) => Err(error),
            None => Ok(self.remote_settings.clone()),
        }
    }

    async fn start(&self, settings: &PlatformSettings) -> Result<(), StreamError> {
        self.simulate(AdapterCall::Start(settings.clone())).await;
        match self.start_error.lock().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn stop(&self) -> Result<(), StreamError> {
        self.simulate(AdapterCall::Stop).await;
        Ok(())
    }

    async fn publish(&self) -> Result<(), StreamError> {
        self.simulate(AdapterCall::Publish).await;
        match self.publish_error.lock().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Social poster that records every post
#[derive(Default)]
pub struct MockSocialPoster {
    posts: Mutex<Vec<String>>,
    error: Mutex<Option<StreamError>>,
}

impl MockSocialPoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_error(&self, error: Option<StreamError>) {
        *self.error.lock() = error;
    }

    pub fn posts(&self) -> Vec<String> {
        self.posts.lock().clone()
    }
}

#[async_trait]
impl SocialPoster for MockSocialPoster {
    async fn post(&self, text: &str) -> Result<(), StreamError> {
        self.posts.lock().push(text.to_string());
        match self.error.lock().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
