use crate::platform::Platform;
use crate::settings::{GoLiveSettings, PlatformSettings};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GoLiveConfig {
    pub session: SessionConfig,
    pub timeouts: TimeoutConfig,

    /// Settings used when streaming is toggled on without a previous request
    #[serde(default = "default_go_live")]
    pub go_live: GoLiveSettings,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SessionConfig {
    /// Capacity of the change notification bus
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Commands that may wait for the session before callers block
    #[serde(default = "default_command_queue_capacity")]
    pub command_queue_capacity: usize,

    /// Log every published event at debug level
    #[serde(default)]
    pub debug_events: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TimeoutConfig {
    /// Per-platform settings fetch bound
    #[serde(default = "default_settings_fetch_secs")]
    pub settings_fetch_secs: u64,

    /// Bound on a single checklist step
    #[serde(default = "default_step_secs")]
    pub step_secs: u64,

    /// Bound on stopping platforms after an aborted go-live
    #[serde(default = "default_compensation_secs")]
    pub compensation_secs: u64,

    /// How long the stream may stay reconnecting before it is considered lost
    #[serde(default = "default_reconnect_secs")]
    pub reconnect_secs: u64,
}

impl TimeoutConfig {
    pub fn settings_fetch(&self) -> Duration {
        Duration::from_secs(self.settings_fetch_secs)
    }

    pub fn step(&self) -> Duration {
        Duration::from_secs(self.step_secs)
    }

    pub fn compensation(&self) -> Duration {
        Duration::from_secs(self.compensation_secs)
    }

    pub fn reconnect(&self) -> Duration {
        Duration::from_secs(self.reconnect_secs)
    }
}

impl GoLiveConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("golive.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default(
                "session.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default(
                "session.command_queue_capacity",
                default_command_queue_capacity() as i64,
            )?
            .set_default("session.debug_events", false)?
            .set_default(
                "timeouts.settings_fetch_secs",
                default_settings_fetch_secs() as i64,
            )?
            .set_default("timeouts.step_secs", default_step_secs() as i64)?
            .set_default(
                "timeouts.compensation_secs",
                default_compensation_secs() as i64,
            )?
            .set_default("timeouts.reconnect_secs", default_reconnect_secs() as i64)?
            .add_source(File::with_name(&path_str).required(false))
            // GOLIVE_TIMEOUTS__STEP_SECS=5
            .add_source(
                Environment::with_prefix("GOLIVE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: GoLiveConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        if self.session.command_queue_capacity == 0 {
            return Err(ConfigError::Message(
                "Command queue capacity must be greater than 0".to_string(),
            ));
        }

        let timeouts = [
            ("settings_fetch_secs", self.timeouts.settings_fetch_secs),
            ("step_secs", self.timeouts.step_secs),
            ("compensation_secs", self.timeouts.compensation_secs),
            ("reconnect_secs", self.timeouts.reconnect_secs),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(ConfigError::Message(format!(
                    "Timeout {} must be greater than 0",
                    name
                )));
            }
        }

        for platform in self.go_live.enabled_platforms() {
            let entry = self.go_live.platforms.get(platform);
            if entry.use_custom_fields && entry.title.trim().is_empty() {
                return Err(ConfigError::Message(format!(
                    "go_live.platforms.{} uses custom fields but has no title",
                    platform
                )));
            }
        }

        Ok(())
    }
}

impl Default for GoLiveConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig {
                event_bus_capacity: default_event_bus_capacity(),
                command_queue_capacity: default_command_queue_capacity(),
                debug_events: false,
            },
            timeouts: TimeoutConfig {
                settings_fetch_secs: default_settings_fetch_secs(),
                step_secs: default_step_secs(),
                compensation_secs: default_compensation_secs(),
                reconnect_secs: default_reconnect_secs(),
            },
            go_live: default_go_live(),
        }
    }
}

fn default_event_bus_capacity() -> usize {
    100
}
fn default_command_queue_capacity() -> usize {
    64
}

fn default_settings_fetch_secs() -> u64 {
    10
}
fn default_step_secs() -> u64 {
    30
}
fn default_compensation_secs() -> u64 {
    10
}
fn default_reconnect_secs() -> u64 {
    60
}

fn default_go_live() -> GoLiveSettings {
    let mut settings = GoLiveSettings::default();
    *settings.platforms.get_mut(Platform::Twitch) = PlatformSettings {
        enabled: true,
        ..PlatformSettings::default()
    };
    settings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = GoLiveConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session.event_bus_capacity, 100);
        assert_eq!(config.timeouts.step(), Duration::from_secs(30));
        assert_eq!(config.go_live.enabled_platforms(), vec![Platform::Twitch]);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = GoLiveConfig::load_from_file(dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.timeouts.settings_fetch_secs, 10);
        assert_eq!(config.timeouts.compensation_secs, 10);
        assert!(!config.session.debug_events);
        assert_eq!(config.go_live, default_go_live());
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(
            r#"
[session]
debug_events = true

[timeouts]
step_secs = 5

[go_live.platforms.youtube]
enabled = true
title = "Speedrun"

[go_live.platforms.youtube.extras]
privacy = "unlisted"
"#,
        );

        let config = GoLiveConfig::load_from_file(file.path()).unwrap();
        assert!(config.session.debug_events);
        assert_eq!(config.timeouts.step_secs, 5);
        assert_eq!(config.timeouts.reconnect_secs, 60);
        assert_eq!(config.go_live.enabled_platforms(), vec![Platform::Youtube]);
        assert_eq!(config.go_live.platforms.youtube.title, "Speedrun");
        assert_eq!(
            config.go_live.platforms.youtube.extras.get("privacy").map(String::as_str),
            Some("unlisted")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_environment_variable_override() {
        env::set_var("GOLIVE_SESSION__COMMAND_QUEUE_CAPACITY", "16");

        let dir = tempfile::tempdir().unwrap();
        let config = GoLiveConfig::load_from_file(dir.path().join("absent.toml"));

        env::remove_var("GOLIVE_SESSION__COMMAND_QUEUE_CAPACITY");
        assert_eq!(config.unwrap().session.command_queue_capacity, 16);
    }

    #[test]
    fn test_config_validation() {
        let mut config = GoLiveConfig::default();
        config.timeouts.reconnect_secs = 0;
        assert!(config.validate().is_err());

        config.timeouts.reconnect_secs = 60;
        config.go_live.platforms.twitch.use_custom_fields = true;
        assert!(config.validate().is_err());

        config.go_live.platforms.twitch.title = "Morning stream".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serializes_to_toml() {
        let config = GoLiveConfig::default();
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("[session]"));
        assert!(text.contains("reconnect_secs = 60"));
    }
}
