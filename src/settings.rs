//! Per-destination go-live settings.

use crate::error::StreamError;
use crate::platform::Platform;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Flags plus start options for one destination
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlatformSettings {
    pub enabled: bool,

    /// Keep the user's title/description/game instead of the channel's
    pub use_custom_fields: bool,

    pub title: String,
    pub description: Option<String>,
    pub game: Option<String>,

    /// Platform-specific start options (e.g. youtube `privacy`, facebook `pageId`)
    pub extras: BTreeMap<String, String>,
}

impl PlatformSettings {
    /// Merge settings fetched from the platform into this entry.
    ///
    /// Without custom fields the fetched common fields win. With custom fields
    /// only blank entries are filled. Flags are never taken from the platform.
    pub fn merge_fetched(&mut self, fetched: &PlatformSettings) {
        if self.use_custom_fields {
            if self.title.trim().is_empty() {
                self.title = fetched.title.clone();
            }
            if self.description.is_none() {
                self.description = fetched.description.clone();
            }
            if self.game.is_none() {
                self.game = fetched.game.clone();
            }
        } else {
            self.title = fetched.title.clone();
            self.description = fetched.description.clone();
            self.game = fetched.game.clone();
        }

        for (key, value) in &fetched.extras {
            self.extras
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

/// Settings for every supported destination
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformsSettings {
    pub twitch: PlatformSettings,
    pub youtube: PlatformSettings,
    pub facebook: PlatformSettings,
    pub mixer: PlatformSettings,
}

impl PlatformsSettings {
    pub fn get(&self, platform: Platform) -> &PlatformSettings {
        match platform {
            Platform::Twitch => &self.twitch,
            Platform::Youtube => &self.youtube,
            Platform::Facebook => &self.facebook,
            Platform::Mixer => &self.mixer,
        }
    }

    pub fn get_mut(&mut self, platform: Platform) -> &mut PlatformSettings {
        match platform {
            Platform::Twitch => &mut self.twitch,
            Platform::Youtube => &mut self.youtube,
            Platform::Facebook => &mut self.facebook,
            Platform::Mixer => &mut self.mixer,
        }
    }

    pub fn is_enabled(&self, platform: Platform) -> bool {
        self.get(platform).enabled
    }

    pub fn enabled_platforms(&self) -> Vec<Platform> {
        Platform::ALL
            .iter()
            .copied()
            .filter(|platform| self.is_enabled(*platform))
            .collect()
    }
}

/// Settings shared by every go-live, independent of the checklist extras
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamSettings {
    pub platforms: PlatformsSettings,
    pub advanced_mode: bool,
}

/// Encoder tuning applied before going live. Opaque to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EncoderProfile {
    pub name: String,
    pub preset: String,
    pub video_bitrate_kbps: u32,
    pub options: BTreeMap<String, String>,
}

/// Everything the go-live checklist needs
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoLiveSettings {
    pub platforms: PlatformsSettings,
    pub advanced_mode: bool,
    pub optimized_profile: Option<EncoderProfile>,
    pub tweet_text: String,
}

impl GoLiveSettings {
    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            platforms: self.platforms.clone(),
            advanced_mode: self.advanced_mode,
        }
    }

    pub fn enabled_platforms(&self) -> Vec<Platform> {
        self.platforms.enabled_platforms()
    }

    /// Whether the go-live announcement should be posted
    pub fn wants_tweet(&self) -> bool {
        !self.tweet_text.trim().is_empty()
    }

    /// Check the settings can be used to start a checklist run
    pub fn validate_for_go_live(&self) -> Result<(), StreamError> {
        let enabled = self.enabled_platforms();
        if enabled.is_empty() {
            return Err(StreamError::settings_invalid(
                "at least one platform must be enabled",
            ));
        }

        for platform in enabled {
            if self.platforms.get(platform).title.trim().is_empty() {
                return Err(StreamError::settings_invalid(format!(
                    "{} requires a stream title",
                    platform
                ))
                .with_platform(platform));
            }
        }

        Ok(())
    }
}

impl From<StreamSettings> for GoLiveSettings {
    fn from(settings: StreamSettings) -> Self {
        Self {
            platforms: settings.platforms,
            advanced_mode: settings.advanced_mode,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamErrorKind;

    fn fetched() -> PlatformSettings {
        PlatformSettings {
            enabled: false,
            use_custom_fields: false,
            title: "Channel title".to_string(),
            description: Some("Channel description".to_string()),
            game: Some("Chess".to_string()),
            extras: BTreeMap::from([("privacy".to_string(), "public".to_string())]),
        }
    }

    #[test]
    fn test_merge_without_custom_fields_takes_remote_values() {
        let mut entry = PlatformSettings {
            enabled: true,
            title: "Mine".to_string(),
            ..PlatformSettings::default()
        };

        entry.merge_fetched(&fetched());

        assert!(entry.enabled);
        assert_eq!(entry.title, "Channel title");
        assert_eq!(entry.game.as_deref(), Some("Chess"));
        assert_eq!(entry.extras.get("privacy").map(String::as_str), Some("public"));
    }

    #[test]
    fn test_merge_with_custom_fields_fills_blanks_only() {
        let mut entry = PlatformSettings {
            enabled: true,
            use_custom_fields: true,
            title: "Mine".to_string(),
            extras: BTreeMap::from([("privacy".to_string(), "unlisted".to_string())]),
            ..PlatformSettings::default()
        };

        entry.merge_fetched(&fetched());

        assert_eq!(entry.title, "Mine");
        assert_eq!(entry.description.as_deref(), Some("Channel description"));
        assert_eq!(entry.extras.get("privacy").map(String::as_str), Some("unlisted"));
    }

    #[test]
    fn test_validation_requires_an_enabled_platform() {
        let settings = GoLiveSettings::default();
        let error = settings.validate_for_go_live().unwrap_err();
        assert_eq!(error.kind, StreamErrorKind::SettingsInvalid);
        assert_eq!(error.platform, None);
    }

    #[test]
    fn test_validation_requires_titles() {
        let mut settings = GoLiveSettings::default();
        settings.platforms.youtube.enabled = true;

        let error = settings.validate_for_go_live().unwrap_err();
        assert_eq!(error.platform, Some(Platform::Youtube));

        settings.platforms.youtube.title = "Live now".to_string();
        assert!(settings.validate_for_go_live().is_ok());
        assert_eq!(settings.enabled_platforms(), vec![Platform::Youtube]);
    }

    #[test]
    fn test_settings_serialize_with_original_field_names() {
        let mut settings = GoLiveSettings::default();
        settings.platforms.twitch.use_custom_fields = true;
        settings.tweet_text = "live!".to_string();

        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["platforms"]["twitch"]["useCustomFields"], true);
        assert_eq!(json["tweetText"], "live!");
        assert_eq!(json["advancedMode"], false);
    }
}
