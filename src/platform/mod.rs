//! Streaming destinations and the capabilities the orchestrator consumes from them.

pub mod mock;

use crate::error::StreamError;
use crate::settings::PlatformSettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Supported streaming destinations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitch,
    Youtube,
    Facebook,
    Mixer,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Twitch,
        Platform::Youtube,
        Platform::Facebook,
        Platform::Mixer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitch => "twitch",
            Platform::Youtube => "youtube",
            Platform::Facebook => "facebook",
            Platform::Mixer => "mixer",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .iter()
            .copied()
            .find(|platform| platform.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown platform '{}'", s))
    }
}

/// Per-destination API client as seen by the orchestrator
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// The destination this adapter talks to
    fn platform(&self) -> Platform;

    /// Whether the destination can be fed from a restream fan-out
    fn supports_restream(&self) -> bool;

    /// Fetch the channel's current settings (title, game, ...)
    async fn fetch_settings(&self) -> Result<PlatformSettings, StreamError>;

    /// Apply settings and prepare the broadcast
    async fn start(&self, settings: &PlatformSettings) -> Result<(), StreamError>;

    /// End the broadcast prepared by `start`
    async fn stop(&self) -> Result<(), StreamError>;

    /// Make a prepared broadcast public once video is flowing
    async fn publish(&self) -> Result<(), StreamError> {
        Ok(())
    }
}

/// Posts the go-live announcement to social media
#[async_trait]
pub trait SocialPoster: Send + Sync {
    async fn post(&self, text: &str) -> Result<(), StreamError>;
}

/// Lookup table of the adapters available to a session
#[derive(Clone, Default)]
pub struct PlatformRegistry {
    adapters: BTreeMap<Platform, Arc<dyn PlatformAdapter>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any previous adapter for the same platform
    pub fn register(&mut self, adapter: Arc<dyn PlatformAdapter>) {
        self.adapters.insert(adapter.platform(), adapter);
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.get(&platform).cloned()
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.adapters.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl fmt::Debug for PlatformRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformRegistry")
            .field("platforms", &self.platforms())
            .finish()
    }
}
