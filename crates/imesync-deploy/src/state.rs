//! Deployment state machine

use std::fmt;

/// Where a deployment currently is
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeployState {
    #[default]
    Idle,
    LoadingConfig,
    ApplyingPatch,
    SynchronizingFiles,
    ReinitializingEngine,
    PersistingConfig,
    Done,
    /// Terminal failure; `step` names the state that failed
    Failed { step: String, reason: String },
}

impl DeployState {
    /// Step order of a successful run
    pub const STEPS: [DeployState; 5] = [
        DeployState::LoadingConfig,
        DeployState::ApplyingPatch,
        DeployState::SynchronizingFiles,
        DeployState::ReinitializingEngine,
        DeployState::PersistingConfig,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeployState::Done | DeployState::Failed { .. })
    }

    /// Whether a run is in progress
    pub fn is_running(&self) -> bool {
        !self.is_terminal() && *self != DeployState::Idle
    }

    pub fn name(&self) -> &'static str {
        match self {
            DeployState::Idle => "Idle",
            DeployState::LoadingConfig => "LoadingConfig",
            DeployState::ApplyingPatch => "ApplyingPatch",
            DeployState::SynchronizingFiles => "SynchronizingFiles",
            DeployState::ReinitializingEngine => "ReinitializingEngine",
            DeployState::PersistingConfig => "PersistingConfig",
            DeployState::Done => "Done",
            DeployState::Failed { .. } => "Failed",
        }
    }

    /// Legal transitions: forward one step at a time, `Failed` from any
    /// non-terminal state, and a fresh start from `Idle` or a terminal state.
    pub fn can_transition_to(&self, next: &DeployState) -> bool {
        use DeployState::*;
        match (self, next) {
            (_, Failed { .. }) => !self.is_terminal(),
            (Idle | Done | Failed { .. }, LoadingConfig) => true,
            (Done | Failed { .. }, Idle) => true,
            (LoadingConfig, ApplyingPatch)
            | (ApplyingPatch, SynchronizingFiles)
            | (SynchronizingFiles, ReinitializingEngine)
            | (ReinitializingEngine, PersistingConfig)
            | (PersistingConfig, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for DeployState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployState::Failed { step, reason } => write!(f, "Failed at {}: {}", step, reason),
            other => write!(f, "{}", other.name()),
        }
    }
}
