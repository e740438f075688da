use super::session::Session;
use super::types::Message;
use crate::checklist::{
    ChecklistExecutor, ChecklistOutcome, ChecklistPlan, ChecklistStep, ItemState, StepObserver,
    StepRunner, StepUpdate,
};
use crate::error::{OrchestratorError, Result, StreamError};
use crate::events::GoLiveEvent;
use crate::info::Lifecycle;
use crate::platform::{Platform, PlatformAdapter, PlatformRegistry, SocialPoster};
use crate::settings::GoLiveSettings;
use crate::status::{StatusEvent, StreamingState};
use crate::sync::SettingsSynchronizer;
use crate::transmission::TransmissionEngine;
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

impl Session {
    /// `empty -> prepopulate`, then synchronize settings in the background
    pub(super) async fn request_go_live(&mut self, settings: GoLiveSettings) -> Result<()> {
        let lifecycle = self.state.info.lifecycle;
        if !lifecycle.can_transition_to(Lifecycle::Prepopulate) {
            return Err(OrchestratorError::InvalidTransition {
                from: lifecycle,
                to: Lifecycle::Prepopulate,
            });
        }
        if self.state.streaming_status != StreamingState::Offline {
            return Err(OrchestratorError::invalid_command(format!(
                "cannot go live while streaming is {}",
                self.state.streaming_status
            )));
        }

        let from = self.state.info.begin_go_live()?;
        self.last_request = Some(settings.clone());
        self.settings = None;
        self.executor = None;
        self.pending_fatal = None;
        self.disabled_since_run.clear();
        self.reenabled.clear();
        self.lifecycle_changed(from).await;

        self.sync_generation += 1;
        let generation = self.sync_generation;
        let synchronizer =
            SettingsSynchronizer::new(self.registry.clone(), self.config.timeouts.settings_fetch());
        let internal = self.internal.clone();

        self.sync_task = Some(tokio::spawn(async move {
            let result = synchronizer.synchronize(&settings).await;
            let _ = internal.send(Message::SettingsSynced { generation, result });
        }));

        Ok(())
    }

    pub(super) async fn settings_synced(
        &mut self,
        generation: u64,
        result: std::result::Result<GoLiveSettings, StreamError>,
    ) {
        if generation != self.sync_generation || self.state.info.lifecycle != Lifecycle::Prepopulate {
            debug!("Dropping stale settings synchronization #{}", generation);
            return;
        }
        self.sync_task = None;

        match result {
            Ok(settings) => {
                let platforms = settings.enabled_platforms();
                self.settings = Some(settings);
                match self.state.info.settings_synchronized() {
                    Ok(from) => {
                        self.publish(GoLiveEvent::SettingsSynchronized { platforms })
                            .await;
                        self.lifecycle_changed(from).await;
                    }
                    Err(e) => error!("Failed to enter waitForNewSettings: {}", e),
                }
            }
            Err(stream_error) => match self.state.info.settings_failed(stream_error.clone()) {
                Ok(from) => {
                    self.lifecycle_changed(from).await;
                    self.report_failure(&stream_error).await;
                }
                Err(e) => error!("Failed to leave prepopulate: {}", e),
            },
        }
    }

    /// `waitForNewSettings -> runChecklist` with a fresh checklist
    pub(super) async fn confirm_checklist(&mut self) -> Result<()> {
        let settings = self.checklist_settings(Lifecycle::RunChecklist)?;
        let plan = ChecklistPlan::from_settings(&settings);
        info!(
            "Go-live confirmed for {:?} ({} checklist steps)",
            settings.enabled_platforms(),
            plan.len()
        );

        let executor = ChecklistExecutor::new(plan, self.config.timeouts.step());
        self.start_checklist(executor, settings).await
    }

    /// Re-run a failed step and its dependents, keeping done steps
    pub(super) async fn retry_failed_step(&mut self, step: ChecklistStep) -> Result<()> {
        let settings = self.checklist_settings(Lifecycle::RunChecklist)?;
        let mut executor = self
            .executor
            .take()
            .ok_or_else(|| OrchestratorError::invalid_command("there is no checklist run to retry"))?;

        let plan = ChecklistPlan::from_settings(&settings);
        if let Err(e) = executor.prepare_retry(step, plan, &self.reenabled) {
            self.executor = Some(executor);
            return Err(e);
        }

        self.start_checklist(executor, settings).await
    }

    /// Settings for a checklist run, or the reason one cannot start
    fn checklist_settings(&mut self, next: Lifecycle) -> Result<GoLiveSettings> {
        let lifecycle = self.state.info.lifecycle;
        if !lifecycle.can_transition_to(next) {
            return Err(OrchestratorError::InvalidTransition {
                from: lifecycle,
                to: next,
            });
        }

        let settings = self
            .settings
            .clone()
            .ok_or_else(|| OrchestratorError::system("no synchronized settings available"))?;

        if let Err(stream_error) = settings.validate_for_go_live() {
            self.state.info.reject_confirmation(stream_error.clone());
            return Err(stream_error.into());
        }

        Ok(settings)
    }

    async fn start_checklist(&mut self, mut executor: ChecklistExecutor, settings: GoLiveSettings) -> Result<()> {
        let from = self.state.info.start_checklist(executor.states())?;
        self.disabled_since_run.clear();
        self.reenabled.clear();
        self.pending_fatal = None;
        self.lifecycle_changed(from).await;

        let cancel = CancellationToken::new();
        self.checklist_cancel = Some(cancel.clone());

        let runner = GoLiveRunner {
            settings,
            registry: self.registry.clone(),
            engine: Arc::clone(&self.engine),
            social: self.social.clone(),
        };
        let observer = ChannelObserver {
            internal: self.internal.clone(),
        };
        let internal = self.internal.clone();
        let compensation_timeout = self.config.timeouts.compensation();

        tokio::spawn(async move {
            let outcome = executor.run(&runner, &observer, &cancel).await;
            if outcome != ChecklistOutcome::Completed {
                compensate(&mut executor, &runner, compensation_timeout).await;
            }
            let _ = internal.send(Message::ChecklistFinished { executor, outcome });
        });

        Ok(())
    }

    pub(super) async fn step_changed(&mut self, update: StepUpdate) {
        if self.state.info.lifecycle != Lifecycle::RunChecklist {
            debug!("Ignoring late update for {}", update.step);
            return;
        }

        self.state.info.apply_step(&update);
        self.publish(GoLiveEvent::ChecklistItemChanged {
            step: update.step,
            state: update.state,
            error: update.error.clone(),
        })
        .await;

        if update.step == ChecklistStep::StartVideoTransmission && update.state == ItemState::Pending {
            self.apply_status_or_warn(StatusEvent::TransmissionStarting)
                .await;
        }
    }

    pub(super) async fn checklist_finished(&mut self, mut executor: ChecklistExecutor, outcome: ChecklistOutcome) {
        self.checklist_cancel = None;
        let pending_fatal = self.pending_fatal.take();

        let outcome = match (outcome, pending_fatal) {
            (ChecklistOutcome::Completed, Some(fatal)) => {
                // Every step finished before the cancellation took effect
                spawn_teardown(self, true, executor.done_platforms());
                executor.mark_compensated();
                ChecklistOutcome::Failed(fatal)
            }
            (ChecklistOutcome::Cancelled, Some(fatal)) => ChecklistOutcome::Failed(fatal),
            (outcome, _) => outcome,
        };

        match outcome {
            ChecklistOutcome::Completed => self.go_live(executor).await,
            ChecklistOutcome::Failed(error) => self.abort_go_live(executor, error).await,
            ChecklistOutcome::Cancelled => self.abort_go_live(executor, StreamError::cancelled()).await,
        }
    }

    /// `runChecklist -> live` and streaming `Starting -> Live` in one step
    async fn go_live(&mut self, executor: ChecklistExecutor) {
        if self.state.streaming_status != StreamingState::Starting {
            error!(
                "Checklist completed while streaming is {}, video transmission never started",
                self.state.streaming_status
            );
            let error = StreamError::encoder("video transmission is not running");
            self.abandon_go_live(executor, error).await;
            return;
        }

        let from = match self.state.info.go_live(executor.plan()) {
            Ok(from) => from,
            Err(e) => {
                error!("Checklist completed but the stream cannot go live: {}", e);
                let error = StreamError::settings_invalid(e.to_string());
                self.abandon_go_live(executor, error).await;
                return;
            }
        };
        self.apply_status_or_warn(StatusEvent::GoLiveCompleted)
            .await;
        self.lifecycle_changed(from).await;

        self.live_platforms = executor.done_platforms();
        let durations: BTreeMap<String, u128> = executor
            .plan()
            .steps()
            .filter_map(|step| executor.duration(step).map(|d| (step.to_string(), d.as_millis())))
            .collect();
        let settings = self.settings.as_ref();
        self.telemetry.record(
            "stream_start",
            json!({
                "sessionId": self.id,
                "platforms": self.live_platforms,
                "advancedMode": settings.map(|s| s.advanced_mode).unwrap_or_default(),
                "optimizedProfile": settings.is_some_and(|s| s.optimized_profile.is_some()),
                "tweet": settings.is_some_and(|s| s.wants_tweet()),
                "stepDurationsMs": durations,
            }),
        );
        info!("Stream is live on {:?}", self.live_platforms);

        self.executor = Some(executor);
    }

    /// Undo a completed checklist that cannot go live, then abort
    async fn abandon_go_live(&mut self, mut executor: ChecklistExecutor, error: StreamError) {
        let end_engine = executor.state(ChecklistStep::StartVideoTransmission) == ItemState::Done;
        spawn_teardown(self, end_engine, executor.done_platforms());
        executor.mark_compensated();
        self.abort_go_live(executor, error).await;
    }

    /// `runChecklist -> waitForNewSettings`, keeping the error for display
    async fn abort_go_live(&mut self, executor: ChecklistExecutor, error: StreamError) {
        warn!("Go-live aborted: {}", error);
        self.executor = Some(executor);

        match self.state.info.abort_checklist(error.clone()) {
            Ok(from) => {
                self.apply_status_or_warn(StatusEvent::GoLiveAborted).await;
                self.lifecycle_changed(from).await;
                self.report_failure(&error).await;
            }
            Err(e) => error!("Failed to abort checklist: {}", e),
        }
    }

    /// Cancel synchronization or the running checklist
    pub(super) async fn cancel_go_live(&mut self) -> Result<()> {
        match self.state.info.lifecycle {
            Lifecycle::Prepopulate => {
                info!("Cancelling settings synchronization");
                if let Some(task) = self.sync_task.take() {
                    task.abort();
                }
                self.sync_generation += 1;
                let from = self.state.info.settings_failed(StreamError::cancelled())?;
                self.lifecycle_changed(from).await;
                Ok(())
            }
            Lifecycle::RunChecklist => {
                info!("Cancelling go-live checklist");
                if let Some(cancel) = &self.checklist_cancel {
                    cancel.cancel();
                }
                Ok(())
            }
            _ => Err(self.invalid_in_lifecycle("cancel go-live")),
        }
    }

    /// Replace the go-live settings while they are not locked
    pub(super) fn update_settings(&mut self, settings: GoLiveSettings) -> Result<()> {
        let lifecycle = self.state.info.lifecycle;
        if lifecycle.locks_settings() {
            return Err(OrchestratorError::SettingsLocked { lifecycle });
        }

        if lifecycle == Lifecycle::WaitForNewSettings {
            if let Some(previous) = &self.settings {
                for platform in Platform::ALL {
                    let was = previous.platforms.is_enabled(platform);
                    let now = settings.platforms.is_enabled(platform);
                    if was && !now {
                        debug!("{} disabled since the last run", platform);
                        self.disabled_since_run.insert(platform);
                        self.reenabled.remove(&platform);
                    } else if !was && now && self.disabled_since_run.remove(&platform) {
                        debug!("{} re-enabled since the last run", platform);
                        self.reenabled.insert(platform);
                    }
                }
            }
            self.settings = Some(settings);
        } else {
            self.last_request = Some(settings);
        }

        Ok(())
    }

    /// Record a failed go-live for telemetry and subscribers
    pub(super) async fn report_failure(&self, error: &StreamError) {
        if error.kind.is_reported() {
            self.telemetry.record(
                "go_live_failed",
                json!({
                    "sessionId": self.id,
                    "kind": error.kind,
                    "step": error.step,
                    "platform": error.platform,
                    "message": error.message,
                }),
            );
        }
        self.publish(GoLiveEvent::GoLiveFailed {
            error: error.clone(),
        })
        .await;
    }
}

/// Stop every platform whose step completed, plus the engine if video started
async fn compensate(executor: &mut ChecklistExecutor, runner: &GoLiveRunner, limit: Duration) {
    let platforms = executor.done_platforms();
    let end_engine = executor.state(ChecklistStep::StartVideoTransmission) == ItemState::Done;
    if platforms.is_empty() && !end_engine {
        return;
    }

    info!("Compensating aborted go-live: stopping {:?}", platforms);
    teardown(&runner.registry, end_engine.then_some(&runner.engine), &platforms, limit).await;
    executor.mark_compensated();
}

/// End the engine output (if requested) and stop the given platforms, each bounded by `limit`
pub(super) async fn teardown(
    registry: &PlatformRegistry,
    engine: Option<&Arc<dyn TransmissionEngine>>,
    platforms: &[Platform],
    limit: Duration,
) {
    if let Some(engine) = engine {
        match timeout(limit, engine.end()).await {
            Ok(Ok(())) => debug!("Transmission ended"),
            Ok(Err(e)) => error!("Failed to end transmission: {}", e),
            Err(_) => error!("Ending transmission timed out after {:?}", limit),
        }
    }

    let stops = platforms.iter().filter_map(|platform| {
        let platform = *platform;
        registry.get(platform).map(|adapter| async move {
            match timeout(limit, adapter.stop()).await {
                Ok(Ok(())) => info!("Stopped broadcast on {}", platform),
                Ok(Err(e)) => error!("Failed to stop broadcast on {}: {}", platform, e),
                Err(_) => error!("Stopping {} timed out after {:?}", platform, limit),
            }
        })
    });
    join_all(stops).await;
}

/// Run [`teardown`] in the background, reporting completion to the session
pub(super) fn spawn_teardown(session: &mut Session, end_engine: bool, platforms: Vec<Platform>) {
    session.tasks_in_flight += 1;
    let registry = session.registry.clone();
    let engine = Arc::clone(&session.engine);
    let internal = session.internal.clone();
    let limit = session.config.timeouts.compensation();

    tokio::spawn(async move {
        teardown(&registry, end_engine.then_some(&engine), &platforms, limit).await;
        let _ = internal.send(Message::TeardownFinished);
    });
}

/// Performs checklist steps against the session's collaborators
pub(super) struct GoLiveRunner {
    settings: GoLiveSettings,
    registry: PlatformRegistry,
    engine: Arc<dyn TransmissionEngine>,
    social: Option<Arc<dyn SocialPoster>>,
}

impl GoLiveRunner {
    fn adapter(&self, platform: Platform) -> std::result::Result<Arc<dyn PlatformAdapter>, StreamError> {
        self.registry.get(platform).ok_or_else(|| {
            StreamError::settings_invalid(format!("no adapter registered for {}", platform))
                .with_platform(platform)
        })
    }

    async fn setup_restream(&self) -> std::result::Result<(), StreamError> {
        let platforms = self.settings.enabled_platforms();
        for platform in &platforms {
            if !self.adapter(*platform)?.supports_restream() {
                return Err(StreamError::settings_invalid(format!(
                    "{} does not support restreaming",
                    platform
                ))
                .with_platform(*platform));
            }
        }
        self.engine.configure_restream(&platforms).await
    }
}

#[async_trait]
impl StepRunner for GoLiveRunner {
    async fn run_step(&self, step: ChecklistStep) -> std::result::Result<(), StreamError> {
        if let Some(platform) = step.platform() {
            let adapter = self.adapter(platform)?;
            return adapter.start(self.settings.platforms.get(platform)).await;
        }

        match step {
            ChecklistStep::ApplyOptimizedSettings => match &self.settings.optimized_profile {
                Some(profile) => self.engine.apply_profile(profile).await,
                None => Ok(()),
            },
            ChecklistStep::SetupRestream => self.setup_restream().await,
            ChecklistStep::StartVideoTransmission => self.engine.begin().await,
            ChecklistStep::PublishYoutubeBroadcast => self.adapter(Platform::Youtube)?.publish().await,
            ChecklistStep::PostTweet => match &self.social {
                Some(poster) => poster.post(&self.settings.tweet_text).await,
                None => Err(StreamError::settings_invalid(
                    "no social account connected for the go-live announcement",
                )),
            },
            ChecklistStep::Twitch
            | ChecklistStep::Youtube
            | ChecklistStep::Facebook
            | ChecklistStep::Mixer => Ok(()),
        }
    }
}

/// Forwards executor step changes to the session
struct ChannelObserver {
    internal: mpsc::UnboundedSender<Message>,
}

impl StepObserver for ChannelObserver {
    fn step_changed(&self, update: StepUpdate) {
        let _ = self.internal.send(Message::StepChanged(update));
    }
}
