use tracing::{debug, instrument};

use crate::errors::CourierError;
use crate::selector::Selector;
use crate::session::{ElementHandle, UiSession};
use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};
use tokio_util::sync::CancellationToken;

// Default timeout if none is specified on the locator itself
pub const DEFAULT_LOCATOR_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Finds a selector's element and waits until it is interactable.
///
/// Resolution is retried until the deadline because the element the next action needs
/// usually appears only after the previous action has re-rendered the page.
#[derive(Clone)]
pub struct Locator<'a> {
    session: &'a dyn UiSession,
    selector: Selector,
    timeout: Duration,
    poll_interval: Duration,
    fuzzy: bool,
    cancel: Option<CancellationToken>,
}

impl<'a> Locator<'a> {
    pub fn new(session: &'a dyn UiSession, selector: impl Into<Selector>) -> Self {
        Self {
            session,
            selector: selector.into(),
            timeout: DEFAULT_LOCATOR_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            fuzzy: true,
            cancel: None,
        }
    }

    /// Set the deadline shared by resolution and the visibility wait.
    pub fn set_default_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Require whitespace-normalized exact label matches instead of substrings.
    pub fn exact(mut self, exact: bool) -> Self {
        self.fuzzy = !exact;
        self
    }

    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Resolve once, without waiting.
    pub async fn resolve(&self) -> Result<ElementHandle, CourierError> {
        match &self.selector {
            Selector::Control(c) => {
                self.session
                    .resolve_control(&c.role, &c.name, self.fuzzy)
                    .await
            }
            Selector::Field(f) => self.session.resolve_field(&f.label, self.fuzzy).await,
            Selector::Invalid { reason } => Err(CourierError::InvalidSelector(reason.clone())),
        }
    }

    /// Wait for an element matching the locator to be visible, up to the locator's
    /// timeout. Returns [`CourierError::Timeout`] when the deadline passes and
    /// [`CourierError::Cancelled`] when the cancellation token fires first.
    #[instrument(level = "debug", skip(self), fields(selector = %self.selector))]
    pub async fn wait(&self) -> Result<ElementHandle, CourierError> {
        debug!("Waiting for element matching selector: {}", self.selector);
        let deadline = Instant::now() + self.timeout;

        // The outer bound also covers a session call that never returns.
        let bounded = async {
            timeout_at(deadline, self.poll_until(deadline))
                .await
                .unwrap_or_else(|_| Err(self.timeout_error(None)))
        };

        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(CourierError::Cancelled(format!(
                        "cancelled while waiting for {}",
                        self.selector
                    ))),
                    result = bounded => result,
                }
            }
            None => bounded.await,
        }
    }

    async fn poll_until(&self, deadline: Instant) -> Result<ElementHandle, CourierError> {
        let mut last_error: Option<String> = None;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            // Time already spent waiting in this round counts against the poll pause
            let mut waited = Duration::ZERO;
            match self.resolve().await {
                Ok(handle) => {
                    // Wait one poll slice only, so a different match that shows up
                    // meanwhile is picked up by the next resolve.
                    let started = Instant::now();
                    let slice = self
                        .poll_interval
                        .min(deadline.saturating_duration_since(started));
                    match self.session.wait_visible(&handle, slice).await {
                        Ok(()) => {
                            debug!("Resolved {} to {} after {} attempt(s)", self.selector, handle, attempts);
                            return Ok(handle);
                        }
                        // Hidden, disabled or stale: resolve again while time remains
                        Err(CourierError::Timeout(msg))
                        | Err(CourierError::ElementNotVisible(msg))
                        | Err(CourierError::ElementNotEnabled(msg))
                        | Err(CourierError::ElementNotFound(msg)) => {
                            waited = started.elapsed();
                            last_error = Some(msg);
                        }
                        Err(e) => return Err(e),
                    }
                }
                Err(CourierError::ElementNotFound(msg)) => last_error = Some(msg),
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(self.timeout_error(last_error));
            }
            let pause = self.poll_interval.saturating_sub(waited);
            if !pause.is_zero() {
                sleep(pause.min(deadline - now)).await;
            }
        }
    }

    fn timeout_error(&self, last_error: Option<String>) -> CourierError {
        let mut msg = format!(
            "Timed out after {:?} waiting for element {}",
            self.timeout, self.selector
        );
        if let Some(inner) = last_error {
            msg.push_str(&format!(". Last error: {inner}"));
        }
        CourierError::Timeout(msg)
    }
}
