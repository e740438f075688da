use super::step::{ChecklistStep, ItemState};
use crate::platform::Platform;
use crate::settings::GoLiveSettings;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Applicable steps of one go-live and the steps each waits for.
///
/// Steps missing from the plan never apply and stay `not-started`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ChecklistPlan {
    dependencies: BTreeMap<ChecklistStep, Vec<ChecklistStep>>,
}

impl ChecklistPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an applicable step with its prerequisites
    pub fn with_step(mut self, step: ChecklistStep, dependencies: &[ChecklistStep]) -> Self {
        self.dependencies.insert(step, dependencies.to_vec());
        self
    }

    /// Derive the dependency graph for the given settings
    pub fn from_settings(settings: &GoLiveSettings) -> Self {
        let mut plan = Self::new();

        let optimize = settings.optimized_profile.is_some();
        if optimize {
            plan = plan.with_step(ChecklistStep::ApplyOptimizedSettings, &[]);
        }

        let platform_deps: &[ChecklistStep] = if optimize {
            &[ChecklistStep::ApplyOptimizedSettings]
        } else {
            &[]
        };

        let enabled = settings.enabled_platforms();
        let platform_steps: Vec<ChecklistStep> = enabled
            .iter()
            .map(|platform| ChecklistStep::for_platform(*platform))
            .collect();
        for step in &platform_steps {
            plan = plan.with_step(*step, platform_deps);
        }

        if platform_steps.is_empty() {
            return plan;
        }

        let transmission_deps = if platform_steps.len() >= 2 {
            plan = plan.with_step(ChecklistStep::SetupRestream, &platform_steps);
            vec![ChecklistStep::SetupRestream]
        } else {
            platform_steps.clone()
        };
        plan = plan.with_step(ChecklistStep::StartVideoTransmission, &transmission_deps);

        if enabled.contains(&Platform::Youtube) {
            plan = plan.with_step(
                ChecklistStep::PublishYoutubeBroadcast,
                &[
                    ChecklistStep::Youtube,
                    ChecklistStep::StartVideoTransmission,
                ],
            );
        }

        if settings.wants_tweet() {
            plan = plan.with_step(
                ChecklistStep::PostTweet,
                &[ChecklistStep::StartVideoTransmission],
            );
        }

        plan
    }

    pub fn is_applicable(&self, step: ChecklistStep) -> bool {
        self.dependencies.contains_key(&step)
    }

    pub fn steps(&self) -> impl Iterator<Item = ChecklistStep> + '_ {
        self.dependencies.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn dependencies(&self, step: ChecklistStep) -> &[ChecklistStep] {
        self.dependencies
            .get(&step)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Steps that list `step` as a direct prerequisite
    pub fn dependents(&self, step: ChecklistStep) -> Vec<ChecklistStep> {
        self.dependencies
            .iter()
            .filter(|(_, deps)| deps.contains(&step))
            .map(|(dependent, _)| *dependent)
            .collect()
    }

    /// Every step downstream of `step`, transitively
    pub fn descendants(&self, step: ChecklistStep) -> BTreeSet<ChecklistStep> {
        let mut found = BTreeSet::new();
        let mut frontier = vec![step];

        while let Some(current) = frontier.pop() {
            for dependent in self.dependents(current) {
                if found.insert(dependent) {
                    frontier.push(dependent);
                }
            }
        }

        found
    }

    /// Whether `step` applies, has not started, and every prerequisite is done
    pub fn is_ready(&self, step: ChecklistStep, states: &BTreeMap<ChecklistStep, ItemState>) -> bool {
        let state_of = |s: &ChecklistStep| states.get(s).copied().unwrap_or_default();

        self.is_applicable(step)
            && state_of(&step) == ItemState::NotStarted
            && self
                .dependencies(step)
                .iter()
                .all(|dep| state_of(dep) == ItemState::Done)
    }

    /// Whether every applicable step is done
    pub fn is_complete(&self, states: &BTreeMap<ChecklistStep, ItemState>) -> bool {
        self.steps()
            .all(|step| states.get(&step).copied() == Some(ItemState::Done))
    }
}
