//! Resilient plan execution
//!
//! Each action runs through `Pending → Resolving → Acting → Settled`, or ends in
//! `Failed`. The first failure stops the run: composing actions are not independently
//! idempotent, so nothing after a failed action is attempted and nothing is retried.

use crate::errors::CourierError;
use crate::locator::{Locator, DEFAULT_LOCATOR_TIMEOUT, DEFAULT_POLL_INTERVAL};
use crate::outcome::{
    ActionOutcome, ActionReport, ActionState, ExecutionOutcome, RunFailure, RunStatus,
};
use crate::plan::{check_snapshot, AbstractAction, Plan};
use crate::session::UiSession;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);

/// How the executor lets the UI catch up after an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlePolicy {
    /// Sleep a fixed amount of time
    Fixed(Duration),
    /// Proceed once the session's revision has been stable for `quiet`, or after `max`.
    /// Sessions that cannot report a revision get a plain `max` sleep.
    Quiescent { quiet: Duration, max: Duration },
}

impl Default for SettlePolicy {
    fn default() -> Self {
        SettlePolicy::Fixed(DEFAULT_SETTLE_DELAY)
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Per-action bound on resolution plus visibility
    pub visibility_timeout: Duration,
    pub poll_interval: Duration,
    pub settle: SettlePolicy,
    /// Substring, case-insensitive label matching
    pub fuzzy: bool,
    /// Overall deadline for the whole run
    pub run_timeout: Option<Duration>,
    /// Warn about plan labels missing from the session's snapshot before starting
    pub snapshot_check: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: DEFAULT_LOCATOR_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            settle: SettlePolicy::default(),
            fuzzy: true,
            run_timeout: None,
            snapshot_check: true,
        }
    }
}

impl ExecutorConfig {
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_settle(mut self, settle: SettlePolicy) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_fuzzy(mut self, fuzzy: bool) -> Self {
        self.fuzzy = fuzzy;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn with_snapshot_check(mut self, enabled: bool) -> Self {
        self.snapshot_check = enabled;
        self
    }
}

/// Why a single action stopped.
enum StepError {
    Timeout(String),
    Interaction(String, String),
    Session(String, String),
    Cancelled(String),
}

impl StepError {
    fn tag(&self) -> &'static str {
        match self {
            StepError::Timeout(_) => "timeout",
            StepError::Interaction(..) => "interaction",
            StepError::Session(..) => "session",
            StepError::Cancelled(_) => "cancelled",
        }
    }
}

/// Cancels the run token once the overall deadline passes.
struct DeadlineGuard(JoinHandle<()>);

impl DeadlineGuard {
    fn arm(token: CancellationToken, after: Duration) -> Self {
        Self(tokio::spawn(async move {
            sleep(after).await;
            if !token.is_cancelled() {
                warn!("Run deadline of {:?} exceeded, cancelling", after);
                token.cancel();
            }
        }))
    }
}

impl Drop for DeadlineGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Debug, Clone, Default)]
pub struct Executor {
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Runs the plan to completion or first failure.
    pub async fn execute(&self, plan: Plan, session: &mut dyn UiSession) -> ExecutionOutcome {
        self.execute_with_cancel(plan, session, CancellationToken::new())
            .await
    }

    /// Like [`Executor::execute`], stopping early once `cancel` fires. Cancellation is
    /// observed between actions and during waits, never in the middle of a click or
    /// fill.
    #[instrument(skip_all, fields(provider = %plan.provider, actions = plan.len()))]
    pub async fn execute_with_cancel(
        &self,
        plan: Plan,
        session: &mut dyn UiSession,
        cancel: CancellationToken,
    ) -> ExecutionOutcome {
        // Held mutably for the whole run; nothing else can drive this session meanwhile.
        let session: &dyn UiSession = session;
        let started = Instant::now();
        let token = cancel.child_token();
        let _deadline = self
            .config
            .run_timeout
            .map(|after| DeadlineGuard::arm(token.clone(), after));

        if self.config.snapshot_check {
            match session.snapshot().await {
                Ok(Some(snapshot)) => {
                    let warnings = check_snapshot(&plan, &snapshot);
                    debug!("Snapshot check produced {} warning(s)", warnings.len());
                }
                Ok(None) => {}
                Err(e) => debug!("Session could not produce a snapshot: {e}"),
            }
        }

        let Plan { provider, actions } = plan;
        let total = actions.len();
        let mut reports: Vec<ActionReport> = actions
            .into_iter()
            .enumerate()
            .map(|(index, action)| ActionReport::pending(index, action))
            .collect();
        let mut status = RunStatus::Completed;

        for index in 0..total {
            if token.is_cancelled() {
                status = RunStatus::Cancelled {
                    index,
                    reason: self.cancel_reason(started),
                };
                info!("Run cancelled before action #{index}");
                break;
            }

            let action_started = Instant::now();
            let report = &mut reports[index];
            let result = self.run_action(session, report, &token).await;
            report.elapsed_ms = action_started.elapsed().as_millis() as u64;

            match result {
                Ok(()) => {
                    report.state = ActionState::Settled;
                    report.outcome = Some(ActionOutcome::Succeeded);
                    if let Err(reason) = self.settle(session, &token).await {
                        if index + 1 < total {
                            status = RunStatus::Cancelled {
                                index: index + 1,
                                reason,
                            };
                            info!("Run cancelled while settling after action #{index}");
                            break;
                        }
                    }
                }
                Err(step_error) => {
                    report.state = ActionState::Failed;
                    let tag = format!("{provider}-action{index}-{}", step_error.tag());
                    report.diagnostic = capture_diagnostic(session, &tag).await;
                    let selector = report.action.selector().to_string();
                    status = match step_error {
                        StepError::Timeout(message) => {
                            error!("Action #{index} timed out: {message}");
                            report.outcome = Some(ActionOutcome::TimedOut(selector.clone()));
                            RunStatus::Failed {
                                index,
                                failure: RunFailure::ResolutionTimeout {
                                    selector,
                                    timeout_ms: self.config.visibility_timeout.as_millis()
                                        as u64,
                                },
                            }
                        }
                        StepError::Interaction(selector, cause) => {
                            error!("Action #{index} on {selector} failed: {cause}");
                            report.outcome = Some(ActionOutcome::Failed(cause.clone()));
                            RunStatus::Failed {
                                index,
                                failure: RunFailure::InteractionFailed { selector, cause },
                            }
                        }
                        StepError::Session(selector, message) => {
                            error!("Action #{index} on {selector} hit a session error: {message}");
                            report.outcome = Some(ActionOutcome::Failed(message.clone()));
                            RunStatus::Failed {
                                index,
                                failure: RunFailure::Session { selector, message },
                            }
                        }
                        StepError::Cancelled(detail) => {
                            let reason = format!("{}: {detail}", self.cancel_reason(started));
                            warn!("Action #{index} cancelled: {detail}");
                            report.outcome = Some(ActionOutcome::Failed(reason.clone()));
                            RunStatus::Cancelled { index, reason }
                        }
                    };
                    break;
                }
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        if matches!(status, RunStatus::Completed) {
            info!("Plan for {provider} completed: {total} action(s) in {duration_ms}ms");
        }

        ExecutionOutcome {
            provider,
            status,
            actions: reports,
            duration_ms,
        }
    }

    async fn run_action(
        &self,
        session: &dyn UiSession,
        report: &mut ActionReport,
        token: &CancellationToken,
    ) -> Result<(), StepError> {
        let index = report.index;
        let selector = report.action.selector();
        let selector_string = selector.to_string();

        report.state = ActionState::Resolving;
        debug!("Action #{index} {}: resolving {selector_string}", report.action.kind());

        let handle = Locator::new(session, selector)
            .set_default_timeout(self.config.visibility_timeout)
            .poll_interval(self.config.poll_interval)
            .exact(!self.config.fuzzy)
            .cancel_on(token.clone())
            .wait()
            .await
            .map_err(|e| match e {
                CourierError::Timeout(msg) => StepError::Timeout(msg),
                CourierError::Cancelled(msg) => StepError::Cancelled(msg),
                other => StepError::Session(selector_string.clone(), other.to_string()),
            })?;

        report.state = ActionState::Acting;
        debug!("Action #{index}: acting on {handle}");

        match &report.action {
            AbstractAction::Activate { selector } => {
                session
                    .click(&handle)
                    .await
                    .map_err(|e| StepError::Interaction(selector_string.clone(), e.to_string()))?;
                info!("Clicked {}: {}", selector.role, selector.name);
            }
            AbstractAction::Fill { selector, value } => {
                session
                    .set_value(&handle, value)
                    .await
                    .map_err(|e| StepError::Interaction(selector_string.clone(), e.to_string()))?;
                info!("Filled {} ({} chars)", selector.label, value.chars().count());
            }
        }
        Ok(())
    }

    /// Returns the cancellation reason if cancelled while settling.
    async fn settle(
        &self,
        session: &dyn UiSession,
        token: &CancellationToken,
    ) -> Result<(), String> {
        let wait = async {
            match self.config.settle {
                SettlePolicy::Fixed(delay) => sleep(delay).await,
                SettlePolicy::Quiescent { quiet, max } => {
                    let Some(mut last) = session.revision() else {
                        sleep(max).await;
                        return;
                    };
                    let start = Instant::now();
                    let mut stable_since = start;
                    let step = self.config.poll_interval.min(quiet).max(Duration::from_millis(1));
                    while stable_since.elapsed() < quiet && start.elapsed() < max {
                        sleep(step).await;
                        if let Some(current) = session.revision() {
                            if current != last {
                                last = current;
                                stable_since = Instant::now();
                            }
                        }
                    }
                }
            }
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => Err("cancelled while settling".to_string()),
            _ = wait => Ok(()),
        }
    }

    fn cancel_reason(&self, started: Instant) -> String {
        match self.config.run_timeout {
            Some(limit) if started.elapsed() >= limit => {
                format!("run deadline of {limit:?} exceeded")
            }
            _ => "cancelled by caller".to_string(),
        }
    }
}

/// Capture failures are logged and swallowed; the action's own failure is what gets reported.
async fn capture_diagnostic(session: &dyn UiSession, tag: &str) -> Option<std::path::PathBuf> {
    match session.capture_diagnostic(tag).await {
        Ok(path) => {
            info!("Captured diagnostic {tag} at {}", path.display());
            Some(path)
        }
        Err(e) => {
            let err = CourierError::DiagnosticCaptureFailed(format!("{tag}: {e}"));
            warn!("{err}");
            None
        }
    }
}
