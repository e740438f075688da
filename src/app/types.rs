use crate::checklist::{ChecklistExecutor, ChecklistOutcome, ChecklistStep, StepUpdate};
use crate::error::{Result, StreamError};
use crate::settings::GoLiveSettings;
use crate::transmission::EngineEvent;
use tokio::sync::oneshot;

pub(super) type Reply<T> = oneshot::Sender<Result<T>>;

/// Requests accepted by the session
pub(super) enum Command {
    RequestGoLive {
        settings: GoLiveSettings,
        reply: Reply<()>,
    },
    ConfirmChecklist {
        reply: Reply<()>,
    },
    CancelGoLive {
        reply: Reply<()>,
    },
    RetryFailedStep {
        step: ChecklistStep,
        reply: Reply<()>,
    },
    StopStreaming {
        reply: Reply<()>,
    },
    ToggleStreaming {
        reply: Reply<()>,
    },
    ToggleRecording {
        reply: Reply<()>,
    },
    ToggleReplayBuffer {
        reply: Reply<()>,
    },
    SaveReplay {
        reply: Reply<()>,
    },
    UpdateSettings {
        settings: GoLiveSettings,
        reply: Reply<()>,
    },
    SetSelectiveRecording {
        enabled: bool,
        reply: Reply<()>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

impl Command {
    pub(super) fn name(&self) -> &'static str {
        match self {
            Command::RequestGoLive { .. } => "request_go_live",
            Command::ConfirmChecklist { .. } => "confirm_checklist",
            Command::CancelGoLive { .. } => "cancel_go_live",
            Command::RetryFailedStep { .. } => "retry_failed_step",
            Command::StopStreaming { .. } => "stop_streaming",
            Command::ToggleStreaming { .. } => "toggle_streaming",
            Command::ToggleRecording { .. } => "toggle_recording",
            Command::ToggleReplayBuffer { .. } => "toggle_replay_buffer",
            Command::SaveReplay { .. } => "save_replay",
            Command::UpdateSettings { .. } => "update_settings",
            Command::SetSelectiveRecording { .. } => "set_selective_recording",
            Command::Shutdown { .. } => "shutdown",
        }
    }
}

/// Engine operations run for the recording and replay buffer outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum OutputOp {
    StartRecording,
    StopRecording,
    StartReplayBuffer,
    StopReplayBuffer,
    SaveReplay,
}

/// Results reported back to the session by the tasks it spawns
pub(super) enum Message {
    SettingsSynced {
        generation: u64,
        result: std::result::Result<GoLiveSettings, StreamError>,
    },
    StepChanged(StepUpdate),
    ChecklistFinished {
        executor: ChecklistExecutor,
        outcome: ChecklistOutcome,
    },
    Engine(EngineEvent),
    ReconnectTimeout {
        epoch: u64,
    },
    OutputFinished {
        op: OutputOp,
        result: std::result::Result<(), StreamError>,
    },
    TeardownFinished,
}

/// System shutdown reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal(String),
    UserRequest,
}
