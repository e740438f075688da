//! Pulls each enabled destination's current settings into the go-live settings.

use crate::error::StreamError;
use crate::platform::{Platform, PlatformRegistry};
use crate::settings::{GoLiveSettings, PlatformSettings};
use futures::future::join_all;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info};

/// Fetches remote settings for every enabled platform before a go-live
#[derive(Debug, Clone)]
pub struct SettingsSynchronizer {
    registry: PlatformRegistry,
    fetch_timeout: Duration,
}

impl SettingsSynchronizer {
    pub fn new(registry: PlatformRegistry, fetch_timeout: Duration) -> Self {
        Self {
            registry,
            fetch_timeout,
        }
    }

    /// Return `settings` with every enabled platform merged with its remote settings.
    ///
    /// Fetches run concurrently. The whole synchronization fails if any
    /// platform has no adapter, fails to answer, or answers too late.
    pub async fn synchronize(&self, settings: &GoLiveSettings) -> Result<GoLiveSettings, StreamError> {
        let enabled = settings.enabled_platforms();
        info!("Synchronizing settings for {} platform(s)", enabled.len());

        let fetches = enabled.iter().map(|platform| self.fetch(*platform));
        let results = join_all(fetches).await;

        let mut merged = settings.clone();
        for (platform, result) in enabled.iter().zip(results) {
            match result {
                Ok(fetched) => {
                    debug!("Merging fetched settings for {}", platform);
                    merged.platforms.get_mut(*platform).merge_fetched(&fetched);
                }
                Err(e) => {
                    error!("Settings synchronization failed for {}: {}", platform, e);
                    return Err(e);
                }
            }
        }

        Ok(merged)
    }

    async fn fetch(&self, platform: Platform) -> Result<PlatformSettings, StreamError> {
        let adapter = self.registry.get(platform).ok_or_else(|| {
            StreamError::settings_invalid(format!("no adapter registered for {}", platform))
                .with_platform(platform)
        })?;

        match timeout(self.fetch_timeout, adapter.fetch_settings()).await {
            Ok(Ok(fetched)) => Ok(fetched),
            Ok(Err(e)) => Err(StreamError::settings_invalid(format!(
                "failed to fetch {} settings: {}",
                platform, e.message
            ))
            .with_platform(platform)),
            Err(_) => Err(StreamError::settings_invalid(format!(
                "fetching {} settings timed out after {:?}",
                platform, self.fetch_timeout
            ))
            .with_platform(platform)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamErrorKind;
    use crate::platform::mock::MockPlatformAdapter;
    use std::sync::Arc;

    fn enabled(platforms: &[Platform]) -> GoLiveSettings {
        let mut settings = GoLiveSettings::default();
        for platform in platforms {
            settings.platforms.get_mut(*platform).enabled = true;
        }
        settings
    }

    #[tokio::test]
    async fn test_synchronize_merges_enabled_platforms() {
        let twitch = Arc::new(MockPlatformAdapter::new(Platform::Twitch));
        let youtube = Arc::new(MockPlatformAdapter::new(Platform::Youtube));
        let mut registry = PlatformRegistry::new();
        registry.register(twitch.clone());
        registry.register(youtube.clone());

        let sync = SettingsSynchronizer::new(registry, Duration::from_secs(1));
        let merged = sync.synchronize(&enabled(&[Platform::Twitch])).await.unwrap();

        assert_eq!(merged.platforms.twitch.title, "twitch stream");
        assert_eq!(merged.platforms.twitch.game.as_deref(), Some("Just Chatting"));
        assert!(merged.platforms.twitch.enabled);
        assert!(merged.platforms.youtube.title.is_empty());
        assert!(youtube.calls().is_empty());
    }

    #[tokio::test]
    async fn test_custom_fields_are_kept() {
        let mut registry = PlatformRegistry::new();
        registry.register(Arc::new(MockPlatformAdapter::new(Platform::Twitch)));

        let mut settings = enabled(&[Platform::Twitch]);
        settings.platforms.twitch.use_custom_fields = true;
        settings.platforms.twitch.title = "My title".to_string();

        let sync = SettingsSynchronizer::new(registry, Duration::from_secs(1));
        let merged = sync.synchronize(&settings).await.unwrap();

        assert_eq!(merged.platforms.twitch.title, "My title");
        assert_eq!(merged.platforms.twitch.game.as_deref(), Some("Just Chatting"));
    }

    #[tokio::test]
    async fn test_fetch_failure_fails_as_unit() {
        let mut registry = PlatformRegistry::new();
        registry.register(Arc::new(MockPlatformAdapter::new(Platform::Twitch)));
        registry.register(Arc::new(
            MockPlatformAdapter::new(Platform::Youtube)
                .fail_fetch(StreamErrorKind::NetworkFailure, "connection reset"),
        ));

        let sync = SettingsSynchronizer::new(registry, Duration::from_secs(1));
        let error = sync
            .synchronize(&enabled(&[Platform::Twitch, Platform::Youtube]))
            .await
            .unwrap_err();

        assert_eq!(error.kind, StreamErrorKind::SettingsInvalid);
        assert_eq!(error.platform, Some(Platform::Youtube));
        assert!(error.message.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_missing_adapter_is_settings_invalid() {
        let sync = SettingsSynchronizer::new(PlatformRegistry::new(), Duration::from_secs(1));
        let error = sync
            .synchronize(&enabled(&[Platform::Mixer]))
            .await
            .unwrap_err();

        assert_eq!(error.kind, StreamErrorKind::SettingsInvalid);
        assert_eq!(error.platform, Some(Platform::Mixer));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_times_out() {
        let mut registry = PlatformRegistry::new();
        registry.register(Arc::new(
            MockPlatformAdapter::new(Platform::Facebook).with_delay(Duration::from_secs(30)),
        ));

        let sync = SettingsSynchronizer::new(registry, Duration::from_secs(5));
        let error = sync
            .synchronize(&enabled(&[Platform::Facebook]))
            .await
            .unwrap_err();

        assert_eq!(error.platform, Some(Platform::Facebook));
        assert!(error.message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_no_enabled_platforms_is_a_no_op() {
        let sync = SettingsSynchronizer::new(PlatformRegistry::new(), Duration::from_secs(1));
        let settings = GoLiveSettings::default();
        assert_eq!(sync.synchronize(&settings).await.unwrap(), settings);
    }
}
