//! Finite State Machine for machine deployment

use std::fmt;

use serde::{Deserialize, Serialize};

/// Deployment state of a machine node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentState {
    /// Initial state, not deployed
    #[default]
    Pending,

    /// Deployment in progress
    Deploying,

    /// Successfully deployed (terminal)
    Deployed,

    /// Deployment failed
    Failed,
}

impl DeploymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentState::Pending => "pending",
            DeploymentState::Deploying => "deploying",
            DeploymentState::Deployed => "deployed",
            DeploymentState::Failed => "failed",
        }
    }

    /// Whether a direct move to `next` is a defined transition
    pub fn can_transition_to(&self, next: &DeploymentState) -> bool {
        matches!(
            (self, next),
            (DeploymentState::Pending, DeploymentState::Deploying)
                | (DeploymentState::Deploying, DeploymentState::Deployed)
                | (DeploymentState::Deploying, DeploymentState::Failed)
                | (DeploymentState::Failed, DeploymentState::Deploying)
                | (DeploymentState::Failed, DeploymentState::Pending)
        )
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment event
#[derive(Debug, Clone)]
pub enum DeploymentEvent {
    /// Start deployment
    Deploy,

    /// Deployment completed successfully
    DeploySuccess,

    /// Deployment failed
    DeployFailed(String),

    /// Return a failed node to pending
    Reset,
}

/// Deployment FSM
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    state: DeploymentState,
    error: Option<String>,
    attempts: u32,
}

impl DeploymentFsm {
    /// Create a new FSM in pending state
    pub fn new() -> Self {
        Self::with_state(DeploymentState::Pending)
    }

    /// Resume tracking from a persisted status
    pub fn with_state(state: DeploymentState) -> Self {
        Self {
            state,
            error: None,
            attempts: 0,
        }
    }

    /// Get current state
    pub fn state(&self) -> &DeploymentState {
        &self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Number of deploy attempts since creation or last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeploymentEvent) -> Result<(), String> {
        let new_state = match (&self.state, &event) {
            (DeploymentState::Pending, DeploymentEvent::Deploy)
            | (DeploymentState::Failed, DeploymentEvent::Deploy) => {
                self.error = None;
                self.attempts += 1;
                DeploymentState::Deploying
            }

            (DeploymentState::Deploying, DeploymentEvent::DeploySuccess) => {
                DeploymentState::Deployed
            }
            (DeploymentState::Deploying, DeploymentEvent::DeployFailed(err)) => {
                self.error = Some(err.clone());
                DeploymentState::Failed
            }

            (DeploymentState::Failed, DeploymentEvent::Reset) => {
                self.error = None;
                self.attempts = 0;
                DeploymentState::Pending
            }

            // Invalid transitions, including anything out of Deployed
            (state, event) => {
                return Err(format!(
                    "Invalid transition: {:?} -> {:?}",
                    state, event
                ));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new()
    }
}
