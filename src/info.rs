//! Go-live lifecycle and the error/checklist view shown to the user.

use crate::checklist::{ChecklistPlan, ChecklistStep, ItemState, StepUpdate};
use crate::error::{OrchestratorError, Result, StreamError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Where the session is in the go-live flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Lifecycle {
    /// Platform settings are not synchronized
    #[default]
    Empty,
    /// Settings synchronization in progress
    Prepopulate,
    /// Settings synchronized, waiting for the user to confirm
    WaitForNewSettings,
    /// Applying settings and starting the stream
    RunChecklist,
    /// The stream has been started successfully
    Live,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Empty => "empty",
            Lifecycle::Prepopulate => "prepopulate",
            Lifecycle::WaitForNewSettings => "waitForNewSettings",
            Lifecycle::RunChecklist => "runChecklist",
            Lifecycle::Live => "live",
        }
    }

    pub fn can_transition_to(&self, next: Lifecycle) -> bool {
        use Lifecycle::*;
        matches!(
            (self, next),
            (Empty, Prepopulate)
                | (Prepopulate, WaitForNewSettings)
                | (Prepopulate, Empty)
                | (WaitForNewSettings, RunChecklist)
                | (RunChecklist, Live)
                | (RunChecklist, WaitForNewSettings)
                | (Live, Empty)
        )
    }

    /// Whether go-live settings may not be changed in this state
    pub fn locks_settings(&self) -> bool {
        matches!(
            self,
            Lifecycle::Prepopulate | Lifecycle::RunChecklist | Lifecycle::Live
        )
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle, current error and per-step checklist state of the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    pub lifecycle: Lifecycle,
    pub error: Option<StreamError>,
    pub checklist: BTreeMap<ChecklistStep, ItemState>,
}

impl Default for StreamInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamInfo {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::Empty,
            error: None,
            checklist: ChecklistStep::ALL
                .iter()
                .map(|step| (*step, ItemState::NotStarted))
                .collect(),
        }
    }

    pub fn item(&self, step: ChecklistStep) -> ItemState {
        self.checklist.get(&step).copied().unwrap_or_default()
    }

    /// Move to `next`, failing fast on transitions the lifecycle does not allow
    fn transition(&mut self, next: Lifecycle) -> Result<Lifecycle> {
        let from = self.lifecycle;
        if !from.can_transition_to(next) {
            warn!("Rejected lifecycle transition {} -> {}", from, next);
            return Err(OrchestratorError::InvalidTransition { from, to: next });
        }

        info!("Lifecycle {} -> {}", from, next);
        self.lifecycle = next;
        Ok(from)
    }

    /// `empty -> prepopulate`
    pub fn begin_go_live(&mut self) -> Result<Lifecycle> {
        let from = self.transition(Lifecycle::Prepopulate)?;
        self.error = None;
        self.reset_checklist();
        Ok(from)
    }

    /// `prepopulate -> waitForNewSettings`
    pub fn settings_synchronized(&mut self) -> Result<Lifecycle> {
        self.transition(Lifecycle::WaitForNewSettings)
    }

    /// `prepopulate -> empty`, keeping the error for display
    pub fn settings_failed(&mut self, error: StreamError) -> Result<Lifecycle> {
        let from = self.transition(Lifecycle::Empty)?;
        self.error = Some(error);
        Ok(from)
    }

    /// Record a confirmation that was refused without leaving `waitForNewSettings`
    pub fn reject_confirmation(&mut self, error: StreamError) {
        debug!("Go-live confirmation rejected: {}", error);
        self.error = Some(error);
    }

    /// `waitForNewSettings -> runChecklist`, mirroring the executor's current step states
    pub fn start_checklist(&mut self, states: &BTreeMap<ChecklistStep, ItemState>) -> Result<Lifecycle> {
        let from = self.transition(Lifecycle::RunChecklist)?;
        self.error = None;
        self.checklist = states.clone();
        Ok(from)
    }

    /// Apply a step update from the executor
    pub fn apply_step(&mut self, update: &StepUpdate) {
        self.checklist.insert(update.step, update.state);
        if let Some(error) = &update.error {
            self.error = Some(error.clone());
        }
    }

    /// `runChecklist -> live`; every applicable step must be done
    pub fn go_live(&mut self, plan: &ChecklistPlan) -> Result<Lifecycle> {
        if !plan.is_complete(&self.checklist) {
            return Err(OrchestratorError::InvalidTransition {
                from: self.lifecycle,
                to: Lifecycle::Live,
            });
        }
        self.transition(Lifecycle::Live)
    }

    /// `runChecklist -> waitForNewSettings`, preserving the error for display
    pub fn abort_checklist(&mut self, error: StreamError) -> Result<Lifecycle> {
        let from = self.transition(Lifecycle::WaitForNewSettings)?;
        self.error = Some(error);
        Ok(from)
    }

    /// `live -> empty`; `error` is set when the stream ended on a terminal failure
    pub fn end_stream(&mut self, error: Option<StreamError>) -> Result<Lifecycle> {
        let from = self.transition(Lifecycle::Empty)?;
        self.error = error;
        self.reset_checklist();
        Ok(from)
    }

    fn reset_checklist(&mut self) {
        for state in self.checklist.values_mut() {
            *state = ItemState::NotStarted;
        }
    }
}
