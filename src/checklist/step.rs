use crate::platform::Platform;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Named units of work executed while going live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChecklistStep {
    ApplyOptimizedSettings,
    Twitch,
    Youtube,
    Facebook,
    Mixer,
    SetupRestream,
    StartVideoTransmission,
    PublishYoutubeBroadcast,
    PostTweet,
}

impl ChecklistStep {
    pub const ALL: [ChecklistStep; 9] = [
        ChecklistStep::ApplyOptimizedSettings,
        ChecklistStep::Twitch,
        ChecklistStep::Youtube,
        ChecklistStep::Facebook,
        ChecklistStep::Mixer,
        ChecklistStep::SetupRestream,
        ChecklistStep::StartVideoTransmission,
        ChecklistStep::PublishYoutubeBroadcast,
        ChecklistStep::PostTweet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChecklistStep::ApplyOptimizedSettings => "applyOptimizedSettings",
            ChecklistStep::Twitch => "twitch",
            ChecklistStep::Youtube => "youtube",
            ChecklistStep::Facebook => "facebook",
            ChecklistStep::Mixer => "mixer",
            ChecklistStep::SetupRestream => "setupRestream",
            ChecklistStep::StartVideoTransmission => "startVideoTransmission",
            ChecklistStep::PublishYoutubeBroadcast => "publishYoutubeBroadcast",
            ChecklistStep::PostTweet => "postTweet",
        }
    }

    /// The step that starts the broadcast on `platform`
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Twitch => ChecklistStep::Twitch,
            Platform::Youtube => ChecklistStep::Youtube,
            Platform::Facebook => ChecklistStep::Facebook,
            Platform::Mixer => ChecklistStep::Mixer,
        }
    }

    /// The platform whose broadcast this step starts, if it is a platform step
    pub fn platform(&self) -> Option<Platform> {
        match self {
            ChecklistStep::Twitch => Some(Platform::Twitch),
            ChecklistStep::Youtube => Some(Platform::Youtube),
            ChecklistStep::Facebook => Some(Platform::Facebook),
            ChecklistStep::Mixer => Some(Platform::Mixer),
            _ => None,
        }
    }

    /// The platform this step talks to. At most one step per platform is in flight.
    pub fn lane(&self) -> Option<Platform> {
        match self {
            ChecklistStep::PublishYoutubeBroadcast => Some(Platform::Youtube),
            other => other.platform(),
        }
    }
}

impl fmt::Display for ChecklistStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of a single checklist step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemState {
    #[default]
    NotStarted,
    Pending,
    Done,
    Failed,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::NotStarted => "not-started",
            ItemState::Pending => "pending",
            ItemState::Done => "done",
            ItemState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemState::Done | ItemState::Failed)
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
