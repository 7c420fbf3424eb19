//! Start gating of a run on a threshold crossing.

use crate::config::{AcquisitionMode, TriggerSettings};
use crate::types::{SampleGroup, Variable};

/// State of the gate within a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateState {
    /// No gating, every sample passes
    Off,
    /// Waiting for the edge; `previous` is the last watched value
    Armed { previous: Option<f64> },
    /// Edge seen, every sample passes until the next run
    Passed,
}

/// What happened when a new run started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStart {
    /// The gate does not hold anything back
    Ungated,
    /// Output is held until the edge
    Armed,
    /// The watched variable is gone; the gate was forced off
    MissingVariable,
}

#[derive(Debug, Clone)]
pub struct TriggerGate {
    settings: TriggerSettings,
    /// Position of the watched variable in the sample group
    variable_index: Option<usize>,
    state: GateState,
}

impl TriggerGate {
    /// Bind trigger settings to the group's variables.
    ///
    /// Snapshot acquisition gates on the target side, so the gate stays off.
    pub fn new(settings: &TriggerSettings, mode: AcquisitionMode, variables: &[Variable]) -> Self {
        let mut settings = settings.clone();
        if mode == AcquisitionMode::Snapshot {
            settings.mode = crate::config::TriggerMode::Manual;
        }
        let variable_index = variables.iter().position(|v| v.name == settings.variable);
        Self {
            settings,
            variable_index,
            state: GateState::Off,
        }
    }

    /// A gate that never holds anything back
    pub fn disabled() -> Self {
        Self {
            settings: TriggerSettings::default(),
            variable_index: None,
            state: GateState::Off,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn settings(&self) -> &TriggerSettings {
        &self.settings
    }

    /// Whether an enabled trigger refers to a variable that does not exist
    pub fn is_misconfigured(&self) -> bool {
        self.settings.is_enabled() && self.variable_index.is_none()
    }

    /// Re-initialize for a new acquisition run
    pub fn begin_run(&mut self) -> RunStart {
        if !self.settings.is_enabled() {
            self.state = GateState::Off;
            return RunStart::Ungated;
        }
        if self.variable_index.is_none() {
            tracing::warn!(
                variable = %self.settings.variable,
                "Trigger variable missing, trigger forced off"
            );
            self.settings.mode = crate::config::TriggerMode::Manual;
            self.state = GateState::Off;
            return RunStart::MissingVariable;
        }
        self.state = GateState::Armed { previous: None };
        RunStart::Armed
    }

    /// Decide whether a sample group is forwarded.
    ///
    /// The group that completes the edge is itself forwarded.
    pub fn accept(&mut self, group: &SampleGroup) -> bool {
        let GateState::Armed { previous } = self.state else {
            return true;
        };

        let current = self
            .variable_index
            .and_then(|i| group.samples.get(i))
            .and_then(|s| s.value());
        let Some(current) = current else {
            return false;
        };

        match previous {
            Some(previous) if self.settings.crosses(previous, current) => {
                tracing::debug!(
                    threshold = self.settings.threshold,
                    previous,
                    current,
                    "Trigger passed"
                );
                self.state = GateState::Passed;
                true
            }
            _ => {
                self.state = GateState::Armed {
                    previous: Some(current),
                };
                false
            }
        }
    }
}
