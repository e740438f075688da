pub mod app;
pub mod checklist;
pub mod config;
pub mod error;
pub mod events;
pub mod info;
pub mod keyboard_input;
pub mod platform;
pub mod settings;
pub mod status;
pub mod sync;
pub mod telemetry;
pub mod transmission;

pub use app::{run_until_shutdown, wait_for_shutdown_signal, ShutdownReason, StreamingService, StreamingServiceBuilder};
pub use checklist::{ChecklistExecutor, ChecklistOutcome, ChecklistPlan, ChecklistStep, ItemState};
pub use config::GoLiveConfig;
pub use error::{OrchestratorError, Result, StreamError, StreamErrorKind};
pub use events::{EventBus, EventFilter, EventReceiver, GoLiveEvent, RecordingStatusReceiver, StatusReceiver};
pub use info::{Lifecycle, StreamInfo};
pub use keyboard_input::KeyboardInputHandler;
pub use platform::{Platform, PlatformAdapter, PlatformRegistry, SocialPoster};
pub use settings::{EncoderProfile, GoLiveSettings, PlatformSettings, PlatformsSettings, StreamSettings};
pub use status::{RecordingState, ReplayBufferState, StreamingServiceState, StreamingState};
pub use sync::SettingsSynchronizer;
pub use telemetry::{TelemetrySink, TracingTelemetry};
pub use transmission::{EngineEvent, TransmissionEngine};
