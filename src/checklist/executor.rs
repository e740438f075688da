use super::plan::ChecklistPlan;
use super::step::{ChecklistStep, ItemState};
use crate::error::{OrchestratorError, Result, StreamError};
use crate::platform::Platform;
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Performs the side effect behind a checklist step
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run_step(&self, step: ChecklistStep) -> std::result::Result<(), StreamError>;
}

/// Receives every step state change, in order
pub trait StepObserver: Send + Sync {
    fn step_changed(&self, update: StepUpdate);
}

/// A single step state change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepUpdate {
    pub step: ChecklistStep,
    pub state: ItemState,
    pub error: Option<StreamError>,
}

/// How a checklist run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecklistOutcome {
    /// Every applicable step is done
    Completed,
    /// A step failed; the remaining steps were not started
    Failed(StreamError),
    /// The run was cancelled; in-flight steps were allowed to settle
    Cancelled,
}

/// Runs the checklist plan, tracking per-step state across runs
#[derive(Debug, Clone)]
pub struct ChecklistExecutor {
    plan: ChecklistPlan,
    states: BTreeMap<ChecklistStep, ItemState>,
    errors: BTreeMap<ChecklistStep, StreamError>,
    started_at: HashMap<ChecklistStep, Instant>,
    durations: BTreeMap<ChecklistStep, Duration>,
    step_timeout: Duration,
}

impl ChecklistExecutor {
    pub fn new(plan: ChecklistPlan, step_timeout: Duration) -> Self {
        Self {
            plan,
            states: ChecklistStep::ALL
                .iter()
                .map(|step| (*step, ItemState::NotStarted))
                .collect(),
            errors: BTreeMap::new(),
            started_at: HashMap::new(),
            durations: BTreeMap::new(),
            step_timeout,
        }
    }

    pub fn plan(&self) -> &ChecklistPlan {
        &self.plan
    }

    pub fn state(&self, step: ChecklistStep) -> ItemState {
        self.states.get(&step).copied().unwrap_or_default()
    }

    pub fn states(&self) -> &BTreeMap<ChecklistStep, ItemState> {
        &self.states
    }

    pub fn error(&self, step: ChecklistStep) -> Option<&StreamError> {
        self.errors.get(&step)
    }

    /// How long a finished step took
    pub fn duration(&self, step: ChecklistStep) -> Option<Duration> {
        self.durations.get(&step).copied()
    }

    pub fn steps_in(&self, state: ItemState) -> Vec<ChecklistStep> {
        self.states
            .iter()
            .filter(|(_, s)| **s == state)
            .map(|(step, _)| *step)
            .collect()
    }

    /// Platforms whose broadcast step completed
    pub fn done_platforms(&self) -> Vec<Platform> {
        self.steps_in(ItemState::Done)
            .into_iter()
            .filter_map(|step| step.platform())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.plan.is_complete(&self.states)
    }

    /// Steps that may start now, skipping platforms with an operation in flight
    pub fn ready_steps(&self, busy: &HashSet<Platform>) -> Vec<ChecklistStep> {
        let mut lanes = busy.clone();
        let mut ready = Vec::new();

        for step in self.plan.steps() {
            if !self.plan.is_ready(step, &self.states) {
                continue;
            }
            if let Some(lane) = step.lane() {
                if !lanes.insert(lane) {
                    continue;
                }
            }
            ready.push(step);
        }

        ready
    }

    /// Run every ready step until the plan completes, a step fails, or `cancel` fires.
    ///
    /// A failure stops scheduling immediately; steps already in flight are
    /// awaited so no operation is left dangling.
    pub async fn run(
        &mut self,
        runner: &dyn StepRunner,
        observer: &dyn StepObserver,
        cancel: &CancellationToken,
    ) -> ChecklistOutcome {
        info!("Running go-live checklist ({} applicable steps)", self.plan.len());

        let mut in_flight = FuturesUnordered::new();
        let mut busy: HashSet<Platform> = HashSet::new();
        let mut failure: Option<StreamError> = None;
        let mut cancelled = false;

        loop {
            if failure.is_none() && !cancelled {
                if cancel.is_cancelled() {
                    cancelled = true;
                } else {
                    for step in self.ready_steps(&busy) {
                        if let Some(lane) = step.lane() {
                            busy.insert(lane);
                        }
                        self.started_at.insert(step, Instant::now());
                        self.set_state(step, ItemState::Pending, None, observer);

                        let timeout = self.step_timeout;
                        in_flight.push(async move {
                            let result = match tokio::time::timeout(timeout, runner.run_step(step)).await {
                                Ok(result) => result,
                                Err(_) => Err(StreamError::network(format!(
                                    "{} did not finish within {:?}",
                                    step, timeout
                                ))),
                            };
                            (step, result)
                        });
                    }
                }
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled(), if !cancelled && failure.is_none() => {
                    info!("Checklist cancelled, waiting for {} in-flight steps", in_flight.len());
                    cancelled = true;
                }
                Some((step, result)) = in_flight.next() => {
                    if let Some(lane) = step.lane() {
                        busy.remove(&lane);
                    }
                    if let Some(started) = self.started_at.remove(&step) {
                        self.durations.insert(step, started.elapsed());
                    }

                    match result {
                        Ok(()) => {
                            debug!("Checklist step {} done", step);
                            self.set_state(step, ItemState::Done, None, observer);
                        }
                        Err(error) => {
                            let error = if error.step.is_none() { error.with_step(step) } else { error };
                            warn!("Checklist step {} failed: {}", step, error);
                            self.set_state(step, ItemState::Failed, Some(error.clone()), observer);
                            if failure.is_none() {
                                failure = Some(error);
                            }
                        }
                    }
                }
            }
        }

        if let Some(error) = failure {
            ChecklistOutcome::Failed(error)
        } else if cancelled {
            ChecklistOutcome::Cancelled
        } else if self.is_complete() {
            info!("Go-live checklist completed");
            ChecklistOutcome::Completed
        } else if let Some(error) = self.errors.values().next() {
            ChecklistOutcome::Failed(error.clone())
        } else {
            ChecklistOutcome::Failed(StreamError::settings_invalid(
                "checklist contains steps whose prerequisites can never be met",
            ))
        }
    }

    /// Reset a failed step and everything downstream of it for another run.
    ///
    /// `plan` is derived from the current settings. Done steps whose platform
    /// is no longer enabled are dropped from the run; done steps whose
    /// platform was disabled and re-enabled since the last run are repeated.
    /// Returns the steps that were reset.
    pub fn prepare_retry(
        &mut self,
        step: ChecklistStep,
        plan: ChecklistPlan,
        reenabled: &BTreeSet<Platform>,
    ) -> Result<Vec<ChecklistStep>> {
        if self.state(step) != ItemState::Failed {
            return Err(OrchestratorError::invalid_command(format!(
                "cannot retry {} while it is {}",
                step,
                self.state(step)
            )));
        }

        let mut reset: BTreeSet<ChecklistStep> = self.plan.descendants(step);
        reset.extend(plan.descendants(step));
        reset.insert(step);

        for done in self.steps_in(ItemState::Done) {
            if !plan.is_applicable(done) {
                debug!("Skipping {} on retry, it no longer applies", done);
                reset.insert(done);
            } else if done.platform().is_some_and(|p| reenabled.contains(&p)) {
                debug!("Repeating {} on retry, its platform was re-enabled", done);
                reset.insert(done);
            }
        }

        for s in &reset {
            self.states.insert(*s, ItemState::NotStarted);
            self.errors.remove(s);
            self.durations.remove(s);
        }
        self.plan = plan;

        info!("Retrying checklist from {} ({} steps reset)", step, reset.len());
        Ok(reset.into_iter().collect())
    }

    /// Return steps whose effects were undone by compensation to `not-started`.
    ///
    /// Covers done platform steps, video transmission, and anything done
    /// downstream of them, so a later retry brings them back up. Observers
    /// are not notified; the aborted run stays on display until the retry.
    pub fn mark_compensated(&mut self) -> Vec<ChecklistStep> {
        let mut undone: BTreeSet<ChecklistStep> = self
            .steps_in(ItemState::Done)
            .into_iter()
            .filter(|step| step.platform().is_some() || *step == ChecklistStep::StartVideoTransmission)
            .collect();
        let downstream: Vec<ChecklistStep> = undone
            .iter()
            .flat_map(|step| self.plan.descendants(*step))
            .filter(|step| self.state(*step) == ItemState::Done)
            .collect();
        undone.extend(downstream);

        for s in &undone {
            self.states.insert(*s, ItemState::NotStarted);
            self.durations.remove(s);
        }

        if !undone.is_empty() {
            debug!("Compensation undid {:?}", undone);
        }
        undone.into_iter().collect()
    }

    fn set_state(
        &mut self,
        step: ChecklistStep,
        state: ItemState,
        error: Option<StreamError>,
        observer: &dyn StepObserver,
    ) {
        self.states.insert(step, state);
        match &error {
            Some(error) => {
                self.errors.insert(step, error.clone());
            }
            None => {
                self.errors.remove(&step);
            }
        }
        observer.step_changed(StepUpdate { step, state, error });
    }
}
