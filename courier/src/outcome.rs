use crate::errors::CourierError;
use crate::plan::AbstractAction;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Where an action got to in the executor's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionState {
    Pending,
    Resolving,
    Acting,
    Settled,
    Failed,
}

impl std::fmt::Display for ActionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format!("{self:?}").to_lowercase())
    }
}

/// Result of a single action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "detail", rename_all = "snake_case")]
pub enum ActionOutcome {
    Succeeded,
    /// The selector never became interactable in time
    TimedOut(String),
    Failed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionReport {
    pub index: usize,
    pub action: AbstractAction,
    pub state: ActionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ActionOutcome>,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<PathBuf>,
}

impl ActionReport {
    pub(crate) fn pending(index: usize, action: AbstractAction) -> Self {
        Self {
            index,
            action,
            state: ActionState::Pending,
            outcome: None,
            elapsed_ms: 0,
            diagnostic: None,
        }
    }
}

/// Why a run stopped before completing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunFailure {
    ResolutionTimeout {
        selector: String,
        timeout_ms: u64,
    },
    InteractionFailed {
        selector: String,
        cause: String,
    },
    /// The session reported an error that is neither a timeout nor an interaction failure
    Session {
        selector: String,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed { index: usize, failure: RunFailure },
    Cancelled { index: usize, reason: String },
}

/// Run-level outcome handed back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub provider: String,
    pub status: RunStatus,
    pub actions: Vec<ActionReport>,
    pub duration_ms: u64,
}

impl ExecutionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self.status, RunStatus::Completed)
    }

    /// The report of the action that stopped the run, if any.
    pub fn failed_action(&self) -> Option<&ActionReport> {
        match &self.status {
            RunStatus::Completed => None,
            RunStatus::Failed { index, .. } | RunStatus::Cancelled { index, .. } => {
                self.actions.get(*index)
            }
        }
    }

    /// Diagnostic artifact captured for the failing action.
    pub fn diagnostic(&self) -> Option<&PathBuf> {
        self.failed_action().and_then(|r| r.diagnostic.as_ref())
    }

    pub fn succeeded_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|r| r.outcome == Some(ActionOutcome::Succeeded))
            .count()
    }

    /// Turns a failed or cancelled run into its terminal error.
    pub fn into_result(self) -> Result<ExecutionOutcome, CourierError> {
        match &self.status {
            RunStatus::Completed => Ok(self),
            RunStatus::Failed { index, failure } => Err(match failure {
                RunFailure::ResolutionTimeout {
                    selector,
                    timeout_ms,
                } => CourierError::ResolutionTimeout {
                    provider: self.provider.clone(),
                    index: *index,
                    selector: selector.clone(),
                    timeout: Duration::from_millis(*timeout_ms),
                },
                RunFailure::InteractionFailed { selector, cause } => {
                    CourierError::InteractionFailed {
                        provider: self.provider.clone(),
                        index: *index,
                        selector: selector.clone(),
                        cause: cause.clone(),
                    }
                }
                RunFailure::Session { selector, message } => CourierError::Platform(format!(
                    "action #{index} ({selector}) on {}: {message}",
                    self.provider
                )),
            }),
            RunStatus::Cancelled { index, reason } => Err(CourierError::Cancelled(format!(
                "action #{index} on {}: {reason}",
                self.provider
            ))),
        }
    }
}
