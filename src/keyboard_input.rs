use crate::app::StreamingService;
use crate::error::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Session command bound to a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    ToggleStreaming,
    ToggleRecording,
    ToggleReplayBuffer,
    SaveReplay,
    CancelGoLive,
    Quit,
}

impl KeyAction {
    pub fn from_key(code: KeyCode) -> Option<Self> {
        match code {
            KeyCode::Char('s') | KeyCode::Char(' ') => Some(KeyAction::ToggleStreaming),
            KeyCode::Char('r') => Some(KeyAction::ToggleRecording),
            KeyCode::Char('b') => Some(KeyAction::ToggleReplayBuffer),
            KeyCode::Char('p') => Some(KeyAction::SaveReplay),
            KeyCode::Char('c') => Some(KeyAction::CancelGoLive),
            KeyCode::Char('q') | KeyCode::Esc => Some(KeyAction::Quit),
            _ => None,
        }
    }

    async fn perform(self, service: &StreamingService) -> Result<()> {
        match self {
            KeyAction::ToggleStreaming => service.toggle_streaming().await,
            KeyAction::ToggleRecording => service.toggle_recording().await,
            KeyAction::ToggleReplayBuffer => service.toggle_replay_buffer().await,
            KeyAction::SaveReplay => service.save_replay().await,
            KeyAction::CancelGoLive => service.cancel_go_live().await,
            KeyAction::Quit => Ok(()),
        }
    }
}

/// Interactive keyboard control for the streaming session
pub struct KeyboardInputHandler {
    service: StreamingService,
    cancellation_token: CancellationToken,
    quit: CancellationToken,
}

impl KeyboardInputHandler {
    /// `quit` is cancelled when the quit key is pressed
    pub fn new(service: StreamingService, quit: CancellationToken) -> Self {
        Self {
            service,
            cancellation_token: CancellationToken::new(),
            quit,
        }
    }

    /// Start listening for keyboard input
    pub async fn start(&self) -> Result<()> {
        info!("Starting keyboard input handler - s: stream, r: record, b: replay buffer, p: save replay, c: cancel, q: quit");

        let service = self.service.clone();
        let cancellation_token = self.cancellation_token.clone();
        let quit = self.quit.clone();
        let runtime_handle = Handle::current();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            info!("Raw mode enabled - keyboard handler active");

            loop {
                if cancellation_token.is_cancelled() {
                    debug!("Keyboard input handler stopping");
                    break;
                }

                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        if key_event.kind != KeyEventKind::Press {
                            continue;
                        }

                        match KeyAction::from_key(key_event.code) {
                            Some(KeyAction::Quit) => {
                                info!("Quit key pressed - requesting shutdown");
                                quit.cancel();
                                break;
                            }
                            Some(action) => {
                                info!("Key action: {:?}", action);
                                let service = service.clone();
                                runtime_handle.spawn(async move {
                                    if let Err(e) = action.perform(&service).await {
                                        warn!("{:?} failed: {}", action, e);
                                    }
                                });
                            }
                            None => debug!("Key pressed: {:?}", key_event.code),
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            } else {
                debug!("Raw mode disabled");
            }

            debug!("Keyboard input handler task exited");
        });

        Ok(())
    }

    /// Stop the keyboard input handler
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping keyboard input handler");
        self.cancellation_token.cancel();

        // Give the blocking task a poll interval to restore the terminal
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockPlatformAdapter;
    use crate::platform::Platform;
    use crate::status::RecordingState;
    use crate::transmission::mock::MockTransmissionEngine;
    use std::sync::Arc;

    fn service() -> StreamingService {
        StreamingService::builder()
            .with_platform(Arc::new(MockPlatformAdapter::new(Platform::Twitch)))
            .with_engine(Arc::new(MockTransmissionEngine::new()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_key_bindings() {
        assert_eq!(
            KeyAction::from_key(KeyCode::Char('s')),
            Some(KeyAction::ToggleStreaming)
        );
        assert_eq!(
            KeyAction::from_key(KeyCode::Char('r')),
            Some(KeyAction::ToggleRecording)
        );
        assert_eq!(KeyAction::from_key(KeyCode::Esc), Some(KeyAction::Quit));
        assert_eq!(KeyAction::from_key(KeyCode::Char('x')), None);
    }

    #[tokio::test]
    async fn test_key_action_drives_session() {
        let service = service();

        KeyAction::ToggleRecording.perform(&service).await.unwrap();
        let state = service
            .wait_for(|state| state.recording_status == RecordingState::Recording)
            .await
            .unwrap();
        assert!(!state.selective_recording);
    }

    #[tokio::test]
    async fn test_keyboard_handler_stop() {
        let handler = KeyboardInputHandler::new(service(), CancellationToken::new());

        handler.stop().await.unwrap();
        assert!(handler.cancellation_token.is_cancelled());
        assert!(!handler.quit.is_cancelled());
    }
}
