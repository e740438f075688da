use crate::checklist::ChecklistStep;
use crate::info::Lifecycle;
use crate::platform::Platform;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Category of a user-facing go-live failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StreamErrorKind {
    /// No platform enabled, or a platform's settings failed validation
    SettingsInvalid,
    /// A platform API refused the request
    PlatformRejected,
    /// Transient network problem
    NetworkFailure,
    /// The transmission engine could not start
    EncoderFailure,
    /// The user cancelled the go-live attempt
    Cancelled,
}

impl StreamErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamErrorKind::SettingsInvalid => "settings_invalid",
            StreamErrorKind::PlatformRejected => "platform_rejected",
            StreamErrorKind::NetworkFailure => "network_failure",
            StreamErrorKind::EncoderFailure => "encoder_failure",
            StreamErrorKind::Cancelled => "cancelled",
        }
    }

    /// Whether failures of this kind are reported to telemetry
    pub fn is_reported(&self) -> bool {
        !matches!(self, StreamErrorKind::Cancelled)
    }
}

impl fmt::Display for StreamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tagged go-live error, carrying enough context to find the offending step
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("{kind}: {message}")]
pub struct StreamError {
    pub kind: StreamErrorKind,
    pub step: Option<ChecklistStep>,
    pub platform: Option<Platform>,
    pub message: String,
}

impl StreamError {
    pub fn new<S: Into<String>>(kind: StreamErrorKind, message: S) -> Self {
        Self {
            kind,
            step: None,
            platform: None,
            message: message.into(),
        }
    }

    pub fn settings_invalid<S: Into<String>>(message: S) -> Self {
        Self::new(StreamErrorKind::SettingsInvalid, message)
    }

    pub fn platform_rejected<S: Into<String>>(platform: Platform, message: S) -> Self {
        Self::new(StreamErrorKind::PlatformRejected, message).with_platform(platform)
    }

    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::new(StreamErrorKind::NetworkFailure, message)
    }

    pub fn encoder<S: Into<String>>(message: S) -> Self {
        Self::new(StreamErrorKind::EncoderFailure, message)
    }

    pub fn cancelled() -> Self {
        Self::new(StreamErrorKind::Cancelled, "go-live cancelled by user")
    }

    pub fn with_step(mut self, step: ChecklistStep) -> Self {
        self.step = Some(step);
        if self.platform.is_none() {
            self.platform = step.platform();
        }
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }
}

/// Errors raised by event bus operations
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event bus channel closed")]
    ChannelClosed,
}

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Go-live error: {0}")]
    Stream(#[from] StreamError),

    #[error("Invalid lifecycle transition from {from} to {to}")]
    InvalidTransition { from: Lifecycle, to: Lifecycle },

    #[error("Invalid {output} transition from {from} on {event}")]
    InvalidStatusTransition {
        output: &'static str,
        from: String,
        event: String,
    },

    #[error("Settings are locked while lifecycle is {lifecycle}")]
    SettingsLocked { lifecycle: Lifecycle },

    #[error("Command rejected: {message}")]
    InvalidCommand { message: String },

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("Streaming session is closed")]
    SessionClosed,

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl OrchestratorError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn invalid_command<S: Into<String>>(message: S) -> Self {
        Self::InvalidCommand {
            message: message.into(),
        }
    }

    /// The user-facing error, if this is one
    pub fn stream_error(&self) -> Option<&StreamError> {
        match self {
            OrchestratorError::Stream(error) => Some(error),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_context_fills_platform() {
        let error = StreamError::network("timeout").with_step(ChecklistStep::Youtube);
        assert_eq!(error.step, Some(ChecklistStep::Youtube));
        assert_eq!(error.platform, Some(Platform::Youtube));

        let error = StreamError::encoder("no encoder").with_step(ChecklistStep::StartVideoTransmission);
        assert_eq!(error.platform, None);
    }

    #[test]
    fn test_error_display() {
        let error = StreamError::platform_rejected(Platform::Twitch, "bad token");
        assert_eq!(error.to_string(), "platform_rejected: bad token");

        let error = OrchestratorError::InvalidTransition {
            from: Lifecycle::Empty,
            to: Lifecycle::Live,
        };
        assert_eq!(
            error.to_string(),
            "Invalid lifecycle transition from empty to live"
        );
    }

    #[test]
    fn test_cancelled_is_not_reported() {
        assert!(!StreamErrorKind::Cancelled.is_reported());
        assert!(StreamErrorKind::EncoderFailure.is_reported());
    }
}
